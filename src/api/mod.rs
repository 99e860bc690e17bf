pub mod client;
pub mod stream;
pub mod types;
pub mod wire;

pub use client::ChatClient;
pub use types::{ApiError, ChatTransport, FileAttachment, PromptRequest, StreamEvent};
