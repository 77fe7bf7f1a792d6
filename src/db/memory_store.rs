use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::db::ChatStore;
use crate::errors::AppError;
use crate::models::{Conversation, Message, Role};

#[derive(Default)]
struct Tables {
    conversations: HashMap<String, Conversation>,
    messages: HashMap<String, Vec<Message>>,
}

/// In-process store used when no database is configured.
#[derive(Default)]
pub struct MemoryChatStore {
    tables: RwLock<Tables>,
}

impl MemoryChatStore {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub async fn conversation_count(&self) -> usize {
        self.tables.read().await.conversations.len()
    }
}

#[async_trait]
impl ChatStore for MemoryChatStore {
    async fn find_conversation(
        &self,
        id: &str,
        owner_id: &str,
    ) -> Result<Option<Conversation>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables
            .conversations
            .get(id)
            .filter(|c| c.owner_id == owner_id)
            .cloned())
    }

    async fn insert_conversation(&self, conversation: &Conversation) -> Result<bool, AppError> {
        let mut tables = self.tables.write().await;
        if tables.conversations.contains_key(&conversation.id) {
            return Ok(false);
        }
        tables
            .conversations
            .insert(conversation.id.clone(), conversation.clone());
        Ok(true)
    }

    async fn append_turn(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> Result<Message, AppError> {
        let mut tables = self.tables.write().await;
        if !tables.conversations.contains_key(conversation_id) {
            return Err(AppError::Unexpected(format!(
                "Cannot append to unknown conversation {conversation_id}"
            )));
        }
        let turns = tables.messages.entry(conversation_id.to_string()).or_default();
        let position = turns.last().map(|m| m.position + 1).unwrap_or(0);
        let message = Message::new(conversation_id.to_string(), role, content.to_string(), position);
        turns.push(message.clone());
        Ok(message)
    }

    async fn list_turns(&self, conversation_id: &str) -> Result<Vec<Message>, AppError> {
        let tables = self.tables.read().await;
        Ok(tables.messages.get(conversation_id).cloned().unwrap_or_default())
    }

    async fn touch_conversation(&self, id: &str) -> Result<(), AppError> {
        let mut tables = self.tables.write().await;
        if let Some(conv) = tables.conversations.get_mut(id) {
            conv.updated_at = Utc::now();
        }
        Ok(())
    }
}
