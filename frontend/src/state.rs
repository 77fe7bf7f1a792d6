use leptos::prelude::*;
use leptos::task::spawn_local;
use tokio_util::sync::CancellationToken;

use crate::api;
use crate::decoder::Utf8StreamDecoder;
use crate::models::{Language, Turn};
use crate::reassembler::{ChatEvent, ChatMachine};
use crate::reveal::{reveal, DEFAULT_REVEAL_INTERVAL};

/// Shared application state, provided via Leptos context.
#[derive(Clone, Copy)]
pub struct AppState {
    pub chat: RwSignal<ChatMachine>,
    pub language: RwSignal<Language>,
    /// Cancels the turn currently streaming (if any).
    in_flight: StoredValue<CancellationToken>,
}

impl AppState {
    /// Create a new `AppState` and provide it in the current Leptos context.
    pub fn provide() -> Self {
        let state = Self {
            chat: RwSignal::new(ChatMachine::new()),
            language: RwSignal::new(Language::default()),
            in_flight: StoredValue::new(CancellationToken::new()),
        };
        provide_context(state);
        state
    }

    /// Applies an event; rejected events are logged and otherwise ignored.
    pub fn dispatch(&self, event: ChatEvent) -> bool {
        match self.chat.try_update(|m| m.dispatch(event)) {
            Some(Ok(())) => true,
            Some(Err(rejected)) => {
                log::warn!("Chat event ignored: {rejected}");
                false
            }
            None => false,
        }
    }

    /// Stops the streaming turn, keeping whatever was already revealed.
    pub fn cancel_in_flight(&self) {
        self.in_flight.try_with_value(CancellationToken::cancel);
        if self.chat.try_with_untracked(ChatMachine::in_flight) == Some(true) {
            self.dispatch(ChatEvent::Cancelled);
        }
    }

    /// Drops the current conversation so the next message starts a new one.
    pub fn start_new_chat(&self) {
        self.cancel_in_flight();
        self.dispatch(ChatEvent::NewConversation);
    }

    /// Sends a message and streams the reply into the conversation.
    pub fn send_message(&self, text: String) {
        if !self.dispatch(ChatEvent::Submit(text.clone())) {
            return;
        }

        let state = *self;
        let token = CancellationToken::new();
        self.in_flight.set_value(token.clone());
        let conversation_id = self.chat.with_untracked(|m| m.conversation_id().map(str::to_string));
        let language = self.language.get_untracked();

        spawn_local(async move {
            let turn = Turn::user(text);
            if let Err(e) = state
                .run_turn(&turn, conversation_id.as_deref(), language, &token)
                .await
            {
                if !token.is_cancelled() {
                    log::error!("Streaming error: {e}");
                    state.dispatch(ChatEvent::Failed(e));
                }
            }
        });
    }

    async fn run_turn(
        &self,
        turn: &Turn,
        conversation_id: Option<&str>,
        language: Language,
        token: &CancellationToken,
    ) -> Result<(), String> {
        let opened = token
            .run_until_cancelled(api::open_relay(turn, conversation_id, language.label()))
            .await;
        let Some(response) = opened.transpose()? else {
            return Ok(());
        };
        if let Some(id) = response.conversation_id.clone() {
            self.dispatch(ChatEvent::ConversationAssigned(id));
        }

        let body = response.into_stream()?;
        self.dispatch(ChatEvent::StreamOpened);

        let mut decoder = Utf8StreamDecoder::new();
        loop {
            // A cancel must not wait for the relay's next byte.
            let Some(read) = token.run_until_cancelled(body.next_chunk()).await else {
                body.cancel();
                return Ok(());
            };
            let Some(bytes) = read? else {
                break;
            };
            let chunk = decoder.decode(&bytes);
            if !self.reveal_chunk(chunk, token).await {
                body.cancel();
                return Ok(());
            }
        }
        let tail = decoder.finish();
        self.reveal_chunk(tail, token).await;

        if !token.is_cancelled() {
            self.dispatch(ChatEvent::StreamEnded);
        }
        Ok(())
    }

    /// Types `chunk` into the assistant turn; `false` if cancelled midway.
    async fn reveal_chunk(&self, chunk: String, token: &CancellationToken) -> bool {
        if chunk.is_empty() {
            return !token.is_cancelled();
        }
        let base = self.chat.with_untracked(ChatMachine::received_chars);
        if !self.dispatch(ChatEvent::ChunkReceived(chunk.clone())) {
            return false;
        }
        let state = *self;
        reveal(&chunk, DEFAULT_REVEAL_INTERVAL, token, move |shown| {
            state.dispatch(ChatEvent::Revealed(base + shown));
        })
        .await
    }
}
