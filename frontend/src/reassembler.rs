//! Conversation state for the chat view.
//!
//! All mutation goes through [`ChatMachine::dispatch`]; the view reads
//! [`ChatMachine::snapshot`]. A turn moves `Idle -> Sending -> Streaming`
//! and ends in `Idle` (stream finished or cancelled) or `Errored`.
//!
//! While streaming, the machine keeps the full text received so far and a
//! reveal cursor. The assistant turn's content is always the received text
//! cut at the cursor, so it only ever grows and is always a prefix of the
//! final reply.

use std::fmt;

use crate::models::{Role, Turn};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChatPhase {
    Idle,
    Sending,
    Streaming,
    Errored,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChatEvent {
    Submit(String),
    ConversationAssigned(String),
    StreamOpened,
    ChunkReceived(String),
    /// Characters of the received text now visible (absolute count).
    Revealed(usize),
    StreamEnded,
    Failed(String),
    Cancelled,
    NewConversation,
}

impl ChatEvent {
    fn name(&self) -> &'static str {
        match self {
            ChatEvent::Submit(_) => "Submit",
            ChatEvent::ConversationAssigned(_) => "ConversationAssigned",
            ChatEvent::StreamOpened => "StreamOpened",
            ChatEvent::ChunkReceived(_) => "ChunkReceived",
            ChatEvent::Revealed(_) => "Revealed",
            ChatEvent::StreamEnded => "StreamEnded",
            ChatEvent::Failed(_) => "Failed",
            ChatEvent::Cancelled => "Cancelled",
            ChatEvent::NewConversation => "NewConversation",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Rejected {
    /// A turn is already being sent or streamed.
    TurnInFlight,
    EmptyInput,
    OutOfOrder { event: &'static str, phase: ChatPhase },
}

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejected::TurnInFlight => f.write_str("a reply is still in progress"),
            Rejected::EmptyInput => f.write_str("message is empty"),
            Rejected::OutOfOrder { event, phase } => {
                write!(f, "{event} is not valid while {phase:?}")
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChatSnapshot {
    pub turns: Vec<Turn>,
    /// A reply is expected but none of it has arrived yet.
    pub composing: bool,
    pub phase: ChatPhase,
    pub conversation_id: Option<String>,
    pub last_error: Option<String>,
}

#[derive(Clone, Debug)]
pub struct ChatMachine {
    turns: Vec<Turn>,
    phase: ChatPhase,
    conversation_id: Option<String>,
    received: String,
    received_chars: usize,
    revealed: usize,
    last_error: Option<String>,
}

impl Default for ChatMachine {
    fn default() -> Self {
        Self::new()
    }
}

impl ChatMachine {
    pub fn new() -> Self {
        Self {
            turns: Vec::new(),
            phase: ChatPhase::Idle,
            conversation_id: None,
            received: String::new(),
            received_chars: 0,
            revealed: 0,
            last_error: None,
        }
    }

    pub fn phase(&self) -> ChatPhase {
        self.phase
    }

    pub fn conversation_id(&self) -> Option<&str> {
        self.conversation_id.as_deref()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Characters received so far in the current reply.
    pub fn received_chars(&self) -> usize {
        self.received_chars
    }

    pub fn in_flight(&self) -> bool {
        matches!(self.phase, ChatPhase::Sending | ChatPhase::Streaming)
    }

    pub fn composing(&self) -> bool {
        match self.phase {
            ChatPhase::Sending => true,
            ChatPhase::Streaming => self.received.is_empty(),
            ChatPhase::Idle | ChatPhase::Errored => false,
        }
    }

    pub fn snapshot(&self) -> ChatSnapshot {
        ChatSnapshot {
            turns: self.turns.clone(),
            composing: self.composing(),
            phase: self.phase,
            conversation_id: self.conversation_id.clone(),
            last_error: self.last_error.clone(),
        }
    }

    pub fn dispatch(&mut self, event: ChatEvent) -> Result<(), Rejected> {
        let out_of_order = Rejected::OutOfOrder { event: event.name(), phase: self.phase };

        match event {
            ChatEvent::Submit(text) => {
                if self.in_flight() {
                    return Err(Rejected::TurnInFlight);
                }
                if text.trim().is_empty() {
                    return Err(Rejected::EmptyInput);
                }
                self.turns.push(Turn::user(text));
                self.received.clear();
                self.received_chars = 0;
                self.revealed = 0;
                self.last_error = None;
                self.phase = ChatPhase::Sending;
            }
            ChatEvent::ConversationAssigned(id) => {
                if self.conversation_id.is_none() && !id.is_empty() {
                    self.conversation_id = Some(id);
                }
            }
            ChatEvent::StreamOpened => {
                if self.phase != ChatPhase::Sending {
                    return Err(out_of_order);
                }
                self.turns.push(Turn::assistant(String::new()));
                self.phase = ChatPhase::Streaming;
            }
            ChatEvent::ChunkReceived(chunk) => {
                if self.phase != ChatPhase::Streaming {
                    return Err(out_of_order);
                }
                self.received_chars += chunk.chars().count();
                self.received.push_str(&chunk);
            }
            ChatEvent::Revealed(count) => {
                if self.phase != ChatPhase::Streaming {
                    return Err(out_of_order);
                }
                self.reveal_to(count);
            }
            ChatEvent::StreamEnded => {
                if self.phase != ChatPhase::Streaming {
                    return Err(out_of_order);
                }
                self.reveal_to(self.received_chars);
                self.phase = ChatPhase::Idle;
            }
            ChatEvent::Failed(message) => {
                if !self.in_flight() {
                    return Err(out_of_order);
                }
                self.last_error = Some(message);
                self.phase = ChatPhase::Errored;
            }
            ChatEvent::Cancelled => {
                if self.in_flight() {
                    self.phase = ChatPhase::Idle;
                }
            }
            ChatEvent::NewConversation => {
                if self.in_flight() {
                    return Err(Rejected::TurnInFlight);
                }
                *self = Self::new();
            }
        }
        Ok(())
    }

    fn reveal_to(&mut self, count: usize) {
        let target = count.min(self.received_chars);
        if target <= self.revealed {
            return;
        }
        self.revealed = target;

        let end = self
            .received
            .char_indices()
            .nth(target)
            .map(|(i, _)| i)
            .unwrap_or(self.received.len());
        let visible = &self.received[..end];

        if let Some(turn) = self.turns.iter_mut().rev().find(|t| t.role == Role::Assistant) {
            turn.content.clear();
            turn.content.push_str(visible);
        }
    }
}
