use std::sync::Arc;

use anyhow::{bail, Context, Result};
use url::Url;

use crate::api::ChatClient;
use crate::services::credentials::CredentialStore;

/// Login lifecycle: the browser-based OAuth redirect happens outside this
/// process; this service turns the resulting callback URL into a stored
/// session token and keeps the client's token in sync with the keyring.
pub struct AuthService {
    client: Arc<ChatClient>,
    credentials: CredentialStore,
}

impl AuthService {
    pub fn new(client: Arc<ChatClient>, credentials: CredentialStore) -> Self {
        Self {
            client,
            credentials,
        }
    }

    /// Where the user starts the login flow (opened in a browser).
    pub fn authorize_url(&self) -> String {
        self.client.login_url()
    }

    /// Extract the `code`/`state` pair from the OAuth redirect callback URL.
    pub fn parse_callback(callback_url: &str) -> Result<(String, String)> {
        let url = Url::parse(callback_url).context("Invalid callback URL")?;

        let mut code = None;
        let mut state = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                _ => {}
            }
        }

        match (code, state) {
            (Some(code), Some(state)) => Ok((code, state)),
            (None, _) => bail!("Callback URL is missing the code parameter"),
            (_, None) => bail!("Callback URL is missing the state parameter"),
        }
    }

    /// Exchange the callback for a session token, persist it, and arm the
    /// client with it.
    pub async fn complete_login(&self, callback_url: &str) -> Result<()> {
        let (code, state) = Self::parse_callback(callback_url)?;

        let token = self
            .client
            .exchange_login_code(&code, &state)
            .await
            .context("Failed to exchange login code for a session token")?;

        self.credentials.store_token(&token).await?;
        self.client.set_token(token);

        tracing::info!("Login completed");
        Ok(())
    }

    /// Load a previously stored token into the client. Returns false when no
    /// token is stored; expiry only surfaces on the first authenticated call.
    pub async fn restore_session(&self) -> Result<bool> {
        match self.credentials.token().await? {
            Some(token) => {
                self.client.set_token(token);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn logout(&self) -> Result<()> {
        self.credentials.clear_token().await?;
        self.client.clear_token();
        tracing::info!("Logged out");
        Ok(())
    }
}
