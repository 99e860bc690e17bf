use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::models::WebSearchResult;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Not authenticated")]
    NotAuthenticated,

    #[error("Rate limited: retry after {retry_after_secs:?}s")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Request failed with HTTP {status}: {message}")]
    RequestFailed { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// One decoded event from the reply stream. Arrival order is append order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    Token(String),
    WebSearch(WebSearchResult),
    FinalAnswer,
    Error(String),
}

/// A file attached to a prompt, uploaded inline with the request.
#[derive(Clone)]
pub struct FileAttachment {
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

impl std::fmt::Debug for FileAttachment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileAttachment")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("data", &format!("[{} bytes]", self.data.len()))
            .finish()
    }
}

/// Everything needed to open one reply stream on a conversation.
#[derive(Debug, Clone)]
pub struct PromptRequest {
    pub conversation_id: String,
    /// Client-generated id of the message this stream answers: the new user
    /// message on a plain send, the retried or continued message otherwise.
    pub message_id: String,
    pub inputs: String,
    pub is_retry: bool,
    pub is_continue: bool,
    pub web_search: bool,
    pub files: Vec<FileAttachment>,
}

impl PromptRequest {
    pub fn new(conversation_id: &str, message_id: &str, inputs: &str) -> Self {
        Self {
            conversation_id: conversation_id.to_string(),
            message_id: message_id.to_string(),
            inputs: inputs.to_string(),
            is_retry: false,
            is_continue: false,
            web_search: false,
            files: Vec::new(),
        }
    }
}

/// Seam between the synchronizer and the wire, so streaming logic can be
/// exercised against a scripted transport in tests.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Open the reply stream for `request` and send each decoded event into
    /// `tx`. Returns once a terminal frame was sent, the server closed the
    /// connection, or the receiver was dropped. No automatic retry.
    async fn stream_message(
        &self,
        request: PromptRequest,
        tx: mpsc::Sender<StreamEvent>,
    ) -> Result<(), ApiError>;
}
