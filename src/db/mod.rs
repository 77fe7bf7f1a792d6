pub mod conversation_repository;
pub mod memory_store;
pub mod message_repository;
pub mod pg_store;

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use crate::errors::AppError;
use crate::models::{Conversation, Message, Role};

const MAX_TITLE_CHARS: usize = 60;

/// Persistence seam used by the relay.
#[async_trait]
pub trait ChatStore: Send + Sync {
    async fn find_conversation(
        &self,
        id: &str,
        owner_id: &str,
    ) -> Result<Option<Conversation>, AppError>;

    /// Inserts the conversation unless its id is already taken.
    /// Returns `false` when nothing was inserted.
    async fn insert_conversation(&self, conversation: &Conversation) -> Result<bool, AppError>;

    /// Appends a turn after the conversation's existing turns.
    async fn append_turn(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> Result<Message, AppError>;

    async fn list_turns(&self, conversation_id: &str) -> Result<Vec<Message>, AppError>;

    async fn touch_conversation(&self, id: &str) -> Result<(), AppError>;
}

/// Derives a conversation title from the first turn's content.
pub fn title_from(content: &str) -> String {
    let t = content.trim();
    if t.chars().count() > MAX_TITLE_CHARS {
        format!("{}…", t.chars().take(MAX_TITLE_CHARS).collect::<String>())
    } else {
        t.to_string()
    }
}

/// Finds the caller's conversation for `conversation_ref`, or creates exactly one.
///
/// A ref that is a well-formed id but unknown is created under that id, so
/// concurrent requests carrying the same missing ref converge on a single
/// conversation. Refs owned by someone else, malformed refs, and absent refs
/// get a fresh id.
pub async fn resolve_conversation(
    store: &dyn ChatStore,
    owner_id: &str,
    conversation_ref: Option<&str>,
    first_content: &str,
) -> Result<Conversation, AppError> {
    let title = title_from(first_content);

    let requested = conversation_ref
        .map(str::trim)
        .filter(|r| !r.is_empty())
        .and_then(|r| Uuid::parse_str(r).ok())
        .map(|id| id.to_string());

    if let Some(id) = requested {
        if let Some(conv) = store.find_conversation(&id, owner_id).await? {
            return Ok(conv);
        }

        let candidate = Conversation::new(id.clone(), owner_id.to_string(), title.clone());
        store.insert_conversation(&candidate).await?;

        // Either our insert or a concurrent one for the same caller.
        if let Some(conv) = store.find_conversation(&id, owner_id).await? {
            return Ok(conv);
        }
        debug!("Conversation {id} belongs to another caller, starting a new one");
    }

    let conv = Conversation::new(Uuid::new_v4().to_string(), owner_id.to_string(), title);
    if !store.insert_conversation(&conv).await? {
        return Err(AppError::Unexpected(format!("Conversation id collision: {}", conv.id)));
    }
    Ok(conv)
}
