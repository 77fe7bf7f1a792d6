use async_trait::async_trait;
use sqlx::PgPool;

use crate::db::conversation_repository::ConversationRepository;
use crate::db::message_repository::MessageRepository;
use crate::db::ChatStore;
use crate::errors::AppError;
use crate::models::{Conversation, Message, Role};

/// PostgreSQL-backed [`ChatStore`].
#[derive(Clone)]
pub struct PgChatStore {
    conversation_repo: ConversationRepository,
    message_repo: MessageRepository,
}

impl PgChatStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            conversation_repo: ConversationRepository::new(pool.clone()),
            message_repo: MessageRepository::new(pool),
        }
    }
}

#[async_trait]
impl ChatStore for PgChatStore {
    async fn find_conversation(
        &self,
        id: &str,
        owner_id: &str,
    ) -> Result<Option<Conversation>, AppError> {
        self.conversation_repo.find_owned(id, owner_id).await
    }

    async fn insert_conversation(&self, conversation: &Conversation) -> Result<bool, AppError> {
        self.conversation_repo.insert_if_absent(conversation).await
    }

    async fn append_turn(
        &self,
        conversation_id: &str,
        role: Role,
        content: &str,
    ) -> Result<Message, AppError> {
        self.message_repo.append(conversation_id, role, content).await
    }

    async fn list_turns(&self, conversation_id: &str) -> Result<Vec<Message>, AppError> {
        self.message_repo.find_by_conversation_id(conversation_id).await
    }

    async fn touch_conversation(&self, id: &str) -> Result<(), AppError> {
        self.conversation_repo.update_timestamp(id).await
    }
}
