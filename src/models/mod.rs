pub mod conversation;
pub mod message;
pub mod model;
pub mod store;

pub use conversation::Conversation;
pub use message::{Message, Role, WebSearchResult, WebSearchSource};
pub use model::ChatModel;
pub use store::ConversationStore;
