use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{error, info};

use crate::db::{resolve_conversation, ChatStore};
use crate::errors::AppError;
use crate::inference::InferenceClient;
use crate::models::{Message, ProcessRequest, RelayRequest, Role, Turn};
use crate::stream::pump::{pump, Termination};

const MAX_MESSAGE_LENGTH: usize = 8000;
const RELAY_BUFFER: usize = 16;

/// An open relay: the conversation it belongs to and the fragment byte stream.
pub struct RelayStream {
    pub conversation_id: String,
    pub body: ReceiverStream<Bytes>,
    /// Resolves once the assistant turn is stored (`None` if storing failed).
    pub persisted: JoinHandle<Option<Message>>,
}

#[derive(Clone)]
pub struct RelayService {
    store: Arc<dyn ChatStore>,
    inference: InferenceClient,
}

impl RelayService {
    pub fn new(store: Arc<dyn ChatStore>, inference: InferenceClient) -> Self {
        Self { store, inference }
    }

    /// Runs one chat turn.
    ///
    /// Everything up to opening the backend stream happens before this
    /// returns, so setup failures surface as an `Err` with no stream. Once
    /// the stream is open, fragments flow through `RelayStream::body` and the
    /// assistant turn is stored exactly once when the backend stream ends.
    pub async fn relay(
        &self,
        caller_id: &str,
        request: RelayRequest,
        conversation_ref: Option<&str>,
    ) -> Result<RelayStream, AppError> {
        validate_turn(&request.message)?;

        let conversation =
            resolve_conversation(self.store.as_ref(), caller_id, conversation_ref, &request.message.content)
                .await?;
        let conversation_id = conversation.id;

        self.store
            .append_turn(&conversation_id, Role::User, &request.message.content)
            .await?;

        let history: Vec<Turn> = self
            .store
            .list_turns(&conversation_id)
            .await?
            .iter()
            .map(Message::to_turn)
            .collect();

        let backend = self
            .inference
            .open_stream(&ProcessRequest {
                messages: history,
                id: conversation_id.clone(),
                language: request.language,
            })
            .await?;

        let (tx, rx) = mpsc::channel::<Bytes>(RELAY_BUFFER);
        let store = self.store.clone();
        let conv_id = conversation_id.clone();

        let persisted = tokio::spawn(async move {
            let outcome = pump(backend, tx).await;
            match &outcome.termination {
                Termination::Done | Termination::EndOfInput => info!(
                    "Relayed {} fragments ({} chars) for conversation {conv_id}",
                    outcome.fragments,
                    outcome.content.chars().count()
                ),
                Termination::ReadError(e) => error!(
                    "Backend stream for conversation {conv_id} broke after {} fragments: {e}",
                    outcome.fragments
                ),
            }

            let saved = match store.append_turn(&conv_id, Role::Assistant, &outcome.content).await {
                Ok(message) => message,
                Err(e) => {
                    error!("Failed to save assistant reply for conversation {conv_id}: {e}");
                    return None;
                }
            };
            if let Err(e) = store.touch_conversation(&conv_id).await {
                error!("Failed to update conversation timestamp: {e}");
            }
            Some(saved)
        });

        Ok(RelayStream {
            conversation_id,
            body: ReceiverStream::new(rx),
            persisted,
        })
    }
}

fn validate_turn(turn: &Turn) -> Result<(), AppError> {
    if turn.role != Role::User {
        return Err(AppError::InvalidRole { role: turn.role.to_string() });
    }
    if turn.content.trim().is_empty() {
        return Err(AppError::EmptyField { field_name: "content".to_string() });
    }
    if turn.content.len() > MAX_MESSAGE_LENGTH {
        return Err(AppError::FieldTooLong {
            field_name: "content".to_string(),
            max_length: MAX_MESSAGE_LENGTH,
            actual_length: turn.content.len(),
        });
    }
    Ok(())
}
