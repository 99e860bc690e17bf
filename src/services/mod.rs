pub mod auth;
pub mod chat;
pub mod conversations;
pub mod credentials;
pub mod settings;
pub mod synchronizer;

pub use auth::AuthService;
pub use conversations::ConversationService;
pub use credentials::CredentialStore;
pub use settings::{AppSettings, SettingsService};
pub use synchronizer::{ChatError, ConversationSynchronizer, SendOptions, SendOutcome, SyncState};
