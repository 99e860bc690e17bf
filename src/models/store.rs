use super::conversation::Conversation;

/// In-memory conversation cache, most recently updated first.
///
/// The service is the system of record; this cache only mirrors what the
/// client has seen during its session.
#[derive(Debug, Default)]
pub struct ConversationStore {
    conversations: Vec<Conversation>,
}

impl ConversationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the cache contents, e.g. after refreshing the remote listing.
    pub fn replace_all(&mut self, conversations: Vec<Conversation>) {
        self.conversations = conversations;
        self.sort();
    }

    /// Insert or update a conversation, keeping recency order.
    pub fn upsert(&mut self, conversation: Conversation) {
        match self
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation.id)
        {
            Some(existing) => *existing = conversation,
            None => self.conversations.push(conversation),
        }
        self.sort();
    }

    pub fn remove(&mut self, id: &str) -> bool {
        let before = self.conversations.len();
        self.conversations.retain(|c| c.id != id);
        self.conversations.len() != before
    }

    pub fn get(&self, id: &str) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Conversation> {
        self.conversations.iter_mut().find(|c| c.id == id)
    }

    pub fn list(&self) -> &[Conversation] {
        &self.conversations
    }

    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }

    fn sort(&mut self) {
        self.conversations
            .sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn conversation(id: &str, age_mins: i64) -> Conversation {
        let ts = Utc::now() - Duration::minutes(age_mins);
        Conversation {
            id: id.to_string(),
            title: format!("Conversation {}", id),
            model: "test-model".to_string(),
            messages: Vec::new(),
            created_at: ts,
            updated_at: ts,
        }
    }

    #[test]
    fn test_upsert_orders_by_recency() {
        let mut store = ConversationStore::new();
        store.upsert(conversation("old", 60));
        store.upsert(conversation("new", 1));
        store.upsert(conversation("middle", 30));

        let ids: Vec<&str> = store.list().iter().map(|c| c.id.as_str()).collect();
        assert_eq!(ids, vec!["new", "middle", "old"]);
    }

    #[test]
    fn test_upsert_replaces_existing() {
        let mut store = ConversationStore::new();
        store.upsert(conversation("a", 60));

        let mut updated = conversation("a", 0);
        updated.title = "Renamed".to_string();
        store.upsert(updated);

        assert_eq!(store.len(), 1);
        assert_eq!(store.get("a").unwrap().title, "Renamed");
    }

    #[test]
    fn test_remove() {
        let mut store = ConversationStore::new();
        store.upsert(conversation("a", 0));

        assert!(store.remove("a"));
        assert!(!store.remove("a"));
        assert!(store.is_empty());
    }

    #[test]
    fn test_replace_all_sorts() {
        let mut store = ConversationStore::new();
        store.replace_all(vec![
            conversation("old", 90),
            conversation("new", 5),
        ]);
        assert_eq!(store.list()[0].id, "new");
    }
}
