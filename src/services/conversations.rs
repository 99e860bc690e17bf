use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api::ChatClient;
use crate::models::{Conversation, ConversationStore, Role};

/// Orchestrates the remote conversation surface against the in-memory cache.
/// The service is the system of record; the cache mirrors what this session
/// has seen.
pub struct ConversationService {
    client: Arc<ChatClient>,
    store: ConversationStore,
}

impl ConversationService {
    pub fn new(client: Arc<ChatClient>) -> Self {
        Self {
            client,
            store: ConversationStore::new(),
        }
    }

    pub fn store(&self) -> &ConversationStore {
        &self.store
    }

    pub async fn create(&mut self, model: &str) -> Result<Conversation> {
        let conversation = self
            .client
            .create_conversation(model)
            .await
            .context("Failed to create conversation")?;
        self.store.upsert(conversation.clone());
        Ok(conversation)
    }

    /// Refresh the cache from the remote listing.
    pub async fn refresh(&mut self) -> Result<()> {
        let conversations = self
            .client
            .list_conversations()
            .await
            .context("Failed to list conversations")?;
        self.store.replace_all(conversations);
        Ok(())
    }

    /// Fetch a conversation with its full message history.
    pub async fn open(&mut self, id: &str) -> Result<Conversation> {
        let conversation = self
            .client
            .fetch_conversation(id)
            .await
            .with_context(|| format!("Failed to fetch conversation {}", id))?;
        self.store.upsert(conversation.clone());
        Ok(conversation)
    }

    pub async fn delete(&mut self, id: &str) -> Result<()> {
        self.client
            .delete_conversation(id)
            .await
            .with_context(|| format!("Failed to delete conversation {}", id))?;
        self.store.remove(id);
        Ok(())
    }

    pub async fn rename(&mut self, id: &str, title: &str) -> Result<()> {
        self.client
            .rename_conversation(id, title)
            .await
            .with_context(|| format!("Failed to rename conversation {}", id))?;
        if let Some(conversation) = self.store.get_mut(id) {
            conversation.title = title.to_string();
        }
        Ok(())
    }

    /// Title a conversation: server-side summarization first, falling back
    /// to a truncation of the first user message.
    pub async fn generate_title(&mut self, id: &str) -> Result<String> {
        match self.client.summarize_conversation(id).await {
            Ok(title) => {
                if let Some(conversation) = self.store.get_mut(id) {
                    conversation.title = title.clone();
                }
                Ok(title)
            }
            Err(e) => {
                tracing::debug!("Summarize failed for {}, falling back: {}", id, e);
                let title = self
                    .store
                    .get(id)
                    .and_then(|c| c.messages.iter().find(|m| m.role == Role::User))
                    .map(|m| truncate_title(&m.content))
                    .context("No user message to derive a title from")?;
                self.rename(id, &title).await?;
                Ok(title)
            }
        }
    }
}

/// Truncate text to a short conversation title.
pub fn truncate_title(text: &str) -> String {
    let first_line = text.lines().next().unwrap_or(text);
    if first_line.len() > 50 {
        let boundary = first_line
            .char_indices()
            .take_while(|(i, _)| *i < 47)
            .last()
            .map(|(i, c)| i + c.len_utf8())
            .unwrap_or(47);
        format!("{}...", &first_line[..boundary])
    } else {
        first_line.to_string()
    }
}
