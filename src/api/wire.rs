use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{ChatModel, Conversation, Message, Role, WebSearchResult, WebSearchSource};

// --- Request types ---

#[derive(Debug, Serialize)]
pub struct PromptBody<'a> {
    pub inputs: &'a str,
    pub id: &'a str,
    pub is_retry: bool,
    pub is_continue: bool,
    pub web_search: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub files: Vec<FilePayload>,
}

#[derive(Debug, Serialize)]
pub struct FilePayload {
    pub name: String,
    pub mime: String,
    pub data: String, // base64-encoded
}

#[derive(Debug, Serialize)]
pub struct NewConversationBody<'a> {
    pub model: &'a str,
}

#[derive(Debug, Serialize)]
pub struct RenameBody<'a> {
    pub title: &'a str,
}

// --- Response types ---

#[derive(Debug, Deserialize)]
pub struct NewConversationResponse {
    #[serde(rename = "conversationId")]
    pub conversation_id: String,
}

#[derive(Debug, Deserialize)]
pub struct ConversationListResponse {
    pub conversations: Vec<WireConversation>,
}

#[derive(Debug, Deserialize)]
pub struct WireConversation {
    pub id: String,
    #[serde(default)]
    pub title: String,
    pub model: String,
    #[serde(default)]
    pub messages: Vec<WireMessage>,
    #[serde(rename = "createdAt")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "updatedAt")]
    pub updated_at: DateTime<Utc>,
}

impl WireConversation {
    pub fn into_conversation(self) -> Conversation {
        let id = self.id;
        let messages = self
            .messages
            .into_iter()
            .filter_map(|m| m.into_message(&id))
            .collect();
        Conversation {
            id,
            title: self.title,
            model: self.model,
            messages,
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct WireMessage {
    pub id: String,
    pub from: String,
    pub content: String,
    #[serde(rename = "webSearch")]
    pub web_search: Option<WebSearchUpdate>,
    #[serde(default)]
    pub interrupted: bool,
    #[serde(rename = "createdAt", default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl WireMessage {
    /// Messages with an unrecognized author (e.g. system) are dropped.
    pub fn into_message(self, conversation_id: &str) -> Option<Message> {
        let role = Role::from_str(&self.from)?;
        Some(Message {
            id: self.id,
            conversation_id: conversation_id.to_string(),
            role,
            content: self.content,
            web_search: self.web_search.map(WebSearchUpdate::into_result),
            interrupted: self.interrupted,
            created_at: self.created_at.unwrap_or_else(Utc::now),
        })
    }
}

#[derive(Debug, Deserialize)]
pub struct SummarizeResponse {
    pub title: String,
}

#[derive(Debug, Deserialize)]
pub struct ModelListResponse {
    pub models: Vec<WireModel>,
}

#[derive(Debug, Deserialize)]
pub struct WireModel {
    pub id: String,
    #[serde(rename = "displayName", default)]
    pub display_name: String,
    #[serde(default)]
    pub websearch: bool,
    #[serde(default)]
    pub multimodal: bool,
}

impl WireModel {
    pub fn into_model(self) -> ChatModel {
        let display_name = if self.display_name.is_empty() {
            self.id.clone()
        } else {
            self.display_name
        };
        ChatModel {
            id: self.id,
            display_name,
            websearch: self.websearch,
            multimodal: self.multimodal,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}

// --- Streaming frame types ---

/// One `data:` payload from the reply stream. The service mixes two shapes:
/// progress frames keyed by a single field (`token`, `webSearch`) and
/// terminal frames tagged with `type`. Anything else that still parses as
/// JSON lands in `Unknown` and is ignored, keeping the decoder forward
/// compatible.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SseFrame {
    Typed(TypedFrame),
    Token {
        token: String,
    },
    WebSearch {
        #[serde(rename = "webSearch")]
        web_search: WebSearchUpdate,
    },
    Unknown(serde_json::Value),
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum TypedFrame {
    #[serde(rename = "finalAnswer")]
    FinalAnswer {
        #[serde(default)]
        text: Option<String>,
    },
    #[serde(rename = "error")]
    Error { message: String },
}

#[derive(Debug, Deserialize)]
pub struct WebSearchUpdate {
    #[serde(default)]
    pub sources: Vec<WebSearchSource>,
}

impl WebSearchUpdate {
    pub fn into_result(self) -> WebSearchResult {
        WebSearchResult {
            sources: self.sources,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_token_frame() {
        let frame: SseFrame = serde_json::from_str(r#"{"token":"Hel"}"#).unwrap();
        match frame {
            SseFrame::Token { token } => assert_eq!(token, "Hel"),
            other => panic!("Expected Token, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_final_answer_frame() {
        let frame: SseFrame =
            serde_json::from_str(r#"{"type":"finalAnswer","text":"Hello"}"#).unwrap();
        match frame {
            SseFrame::Typed(TypedFrame::FinalAnswer { text }) => {
                assert_eq!(text.as_deref(), Some("Hello"));
            }
            other => panic!("Expected FinalAnswer, got {:?}", other),
        }
    }

    #[test]
    fn test_decode_web_search_frame() {
        let frame: SseFrame = serde_json::from_str(
            r#"{"webSearch":{"sources":[{"title":"Docs","link":"https://example.com"}]}}"#,
        )
        .unwrap();
        match frame {
            SseFrame::WebSearch { web_search } => {
                let result = web_search.into_result();
                assert_eq!(result.sources.len(), 1);
                assert_eq!(result.sources[0].title, "Docs");
            }
            other => panic!("Expected WebSearch, got {:?}", other),
        }
    }

    #[test]
    fn test_unrecognized_payload_is_unknown() {
        let frame: SseFrame = serde_json::from_str(r#"{"progress":42}"#).unwrap();
        assert!(matches!(frame, SseFrame::Unknown(_)));
    }

    #[test]
    fn test_wire_message_drops_system_author() {
        let msg = WireMessage {
            id: "m1".to_string(),
            from: "system".to_string(),
            content: "You are a helpful assistant.".to_string(),
            web_search: None,
            interrupted: false,
            created_at: None,
        };
        assert!(msg.into_message("c1").is_none());
    }

    #[test]
    fn test_prompt_body_skips_empty_files() {
        let body = PromptBody {
            inputs: "hi",
            id: "m1",
            is_retry: false,
            is_continue: false,
            web_search: true,
            files: Vec::new(),
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(!json.contains("files"));
        assert!(json.contains(r#""web_search":true"#));
    }
}
