use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Conversation {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(id: String, owner_id: String, title: String) -> Self {
        let now = Utc::now();
        Self { id, owner_id, title, created_at: now, updated_at: now }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<String> for Role {
    type Error = String;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        match s.to_lowercase().as_str() {
            "user" => Ok(Role::User),
            "assistant" => Ok(Role::Assistant),
            other => Err(format!("Unknown role: {other}")),
        }
    }
}

/// A chat turn as it travels over the wire: `{ role, content }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// A persisted turn.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub position: i32,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(conversation_id: String, role: Role, content: String, position: i32) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            conversation_id,
            role,
            content,
            position,
            created_at: Utc::now(),
        }
    }

    pub fn to_turn(&self) -> Turn {
        Turn { role: self.role, content: self.content.clone() }
    }
}

/// Body of `POST /api/messages`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RelayRequest {
    pub message: Turn,
    #[serde(default)]
    pub language: String,
}

/// Query string of `POST /api/messages`.
#[derive(Debug, Default, Deserialize)]
pub struct RelayQuery {
    #[serde(rename = "conversationRef", default)]
    pub conversation_ref: Option<String>,
}

/// Body sent to the inference backend's `/process` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub messages: Vec<Turn>,
    pub id: String,
    pub language: String,
}

/// One decoded unit of assistant text parsed out of the backend stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamFragment {
    pub content: String,
}
