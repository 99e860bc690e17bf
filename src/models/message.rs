use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
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

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

/// One source surfaced by the service's web search step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSearchSource {
    pub title: String,
    pub link: String,
}

/// Web search metadata attached to an assistant reply.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebSearchResult {
    pub sources: Vec<WebSearchSource>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub conversation_id: String,
    pub role: Role,
    pub content: String,
    pub web_search: Option<WebSearchResult>,
    /// Set when the reply's stream was cancelled before the final-answer
    /// frame; such a reply can be resumed with the continue flag.
    pub interrupted: bool,
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// A finalized user message, ready to send.
    pub fn user(conversation_id: &str, content: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            role: Role::User,
            content: content.to_string(),
            web_search: None,
            interrupted: false,
            created_at: Utc::now(),
        }
    }

    /// An empty assistant placeholder that accumulates streamed tokens.
    pub fn placeholder(conversation_id: &str) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.to_string(),
            role: Role::Assistant,
            content: String::new(),
            web_search: None,
            interrupted: false,
            created_at: Utc::now(),
        }
    }
}
