pub const APP_ID: &str = "com.hugchat.Hugchat";

pub const DEFAULT_BASE_URL: &str = "https://huggingface.co/chat";
pub const USER_AGENT: &str = concat!("hugchat/", env!("CARGO_PKG_VERSION"));

/// Name of the session cookie carrying the auth token.
pub const TOKEN_COOKIE: &str = "hf-chat";

/// Keyring reference under which the session token is stored.
pub const TOKEN_KEY_REF: &str = "session-token";

pub const CONNECT_TIMEOUT_SECS: u64 = 10;
/// Applies to plain requests only; streaming responses stay open until the
/// final-answer frame or the server closes the connection.
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
