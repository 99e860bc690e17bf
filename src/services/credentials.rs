use std::sync::Arc;

use anyhow::{Context, Result};
use oo7::Keyring;

use crate::config::{APP_ID, TOKEN_KEY_REF};

const KEYRING_ATTR_APP: &str = "application";
const KEYRING_ATTR_REF: &str = "key-ref";

/// Secret Service store for the session token.
#[derive(Debug, Clone)]
pub struct CredentialStore {
    keyring: Arc<Keyring>,
}

impl CredentialStore {
    pub async fn new() -> Result<Self> {
        let keyring = Keyring::new()
            .await
            .context("Failed to initialize keyring")?;
        Ok(Self {
            keyring: Arc::new(keyring),
        })
    }

    pub async fn store_token(&self, token: &str) -> Result<()> {
        let attributes = Self::attributes();
        let attr_refs: Vec<(&str, &str)> =
            attributes.iter().map(|(k, v)| (*k, v.as_str())).collect();

        self.keyring
            .create_item(
                "HugChat Session Token",
                &attr_refs,
                token,
                true, // replace if exists
            )
            .await
            .context("Failed to store session token in keyring")?;

        Ok(())
    }

    pub async fn token(&self) -> Result<Option<String>> {
        let attributes = Self::attributes();
        let attr_refs: Vec<(&str, &str)> =
            attributes.iter().map(|(k, v)| (*k, v.as_str())).collect();

        let items = self
            .keyring
            .search_items(&attr_refs)
            .await
            .context("Failed to search keyring")?;

        if let Some(item) = items.first() {
            let secret = item.secret().await.context("Failed to read secret")?;
            let token =
                String::from_utf8(secret.to_vec()).context("Secret is not valid UTF-8")?;
            Ok(Some(token))
        } else {
            Ok(None)
        }
    }

    pub async fn clear_token(&self) -> Result<()> {
        let attributes = Self::attributes();
        let attr_refs: Vec<(&str, &str)> =
            attributes.iter().map(|(k, v)| (*k, v.as_str())).collect();

        self.keyring
            .delete(&attr_refs)
            .await
            .context("Failed to delete session token from keyring")?;

        Ok(())
    }

    fn attributes() -> Vec<(&'static str, String)> {
        vec![
            (KEYRING_ATTR_APP, APP_ID.to_string()),
            (KEYRING_ATTR_REF, TOKEN_KEY_REF.to_string()),
        ]
    }
}
