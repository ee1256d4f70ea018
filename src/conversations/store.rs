//! In-memory conversation and message store.
//!
//! The store is the only owner of conversation records and message
//! histories. Every operation takes `&mut self`, so a mutation is applied
//! as a whole before any reader can observe the store again; share it
//! across tasks through [`SharedConversationStore`].

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::core::config::SeedConversation;
use crate::core::ids::ConversationId;

use super::types::{Conversation, Message};

/// Store handle shared between the chat controller and the HTTP shell.
pub type SharedConversationStore = Arc<RwLock<ConversationStore>>;

/// Conversation records plus their ordered message sequences.
#[derive(Debug, Default)]
pub struct ConversationStore {
    /// Sidebar order, newest conversation first.
    conversations: Vec<Conversation>,
    messages: HashMap<ConversationId, Vec<Message>>,
    active: Option<ConversationId>,
}

impl ConversationStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with seed conversations.
    ///
    /// The first seed becomes the active conversation.
    #[must_use]
    pub fn with_seed(seeds: &[SeedConversation]) -> Self {
        let conversations: Vec<Conversation> = seeds
            .iter()
            .map(|seed| Conversation::titled(seed.title.clone(), seed.icon.clone()))
            .collect();
        let messages = conversations
            .iter()
            .map(|c| (c.id, Vec::new()))
            .collect();
        let active = conversations.first().map(|c| c.id);
        Self {
            conversations,
            messages,
            active,
        }
    }

    /// Wrap the store into a shared handle.
    #[must_use]
    pub fn into_shared(self) -> SharedConversationStore {
        Arc::new(RwLock::new(self))
    }

    /// Create a conversation, insert it first and make it active.
    pub fn create_conversation(&mut self) -> ConversationId {
        let conversation = Conversation::new();
        let id = conversation.id;
        self.conversations.insert(0, conversation);
        self.messages.insert(id, Vec::new());
        self.active = Some(id);
        info!(conversation = %id, "created conversation");
        id
    }

    /// Append a message and refresh the conversation preview.
    ///
    /// Returns `false` and leaves the store untouched when the conversation
    /// does not exist.
    pub fn append_message(&mut self, conversation_id: ConversationId, message: Message) -> bool {
        let Some(conversation) = self
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        else {
            warn!(conversation = %conversation_id, "append to unknown conversation ignored");
            return false;
        };

        conversation.last_message_preview.clone_from(&message.content);
        debug!(conversation = %conversation_id, sender = %message.sender, "appended message");
        self.messages
            .entry(conversation_id)
            .or_default()
            .push(message);
        true
    }

    /// Remove a conversation and its whole history.
    ///
    /// If it was active, the first remaining conversation becomes active,
    /// or the selection is cleared. Returns `false` if it did not exist.
    pub fn delete_conversation(&mut self, conversation_id: ConversationId) -> bool {
        let before = self.conversations.len();
        self.conversations.retain(|c| c.id != conversation_id);
        let removed_history = self.messages.remove(&conversation_id).is_some();
        let removed = self.conversations.len() != before || removed_history;

        if self.active == Some(conversation_id) {
            self.active = self.conversations.first().map(|c| c.id);
        }

        if removed {
            info!(conversation = %conversation_id, "deleted conversation");
        }
        removed
    }

    /// Update a conversation title. Returns `false` if it does not exist.
    pub fn rename_conversation(
        &mut self,
        conversation_id: ConversationId,
        new_title: impl Into<String>,
    ) -> bool {
        match self
            .conversations
            .iter_mut()
            .find(|c| c.id == conversation_id)
        {
            Some(conversation) => {
                conversation.title = new_title.into();
                debug!(conversation = %conversation_id, title = %conversation.title, "renamed conversation");
                true
            }
            None => false,
        }
    }

    /// Change the active selection. Existence is not checked.
    pub fn select_conversation(&mut self, conversation_id: ConversationId) {
        self.active = Some(conversation_id);
    }

    /// Active conversation id.
    #[must_use]
    pub const fn active(&self) -> Option<ConversationId> {
        self.active
    }

    /// Active conversation record, if it exists.
    #[must_use]
    pub fn active_conversation(&self) -> Option<&Conversation> {
        self.active.and_then(|id| self.get(id))
    }

    /// Conversation by id.
    #[must_use]
    pub fn get(&self, conversation_id: ConversationId) -> Option<&Conversation> {
        self.conversations.iter().find(|c| c.id == conversation_id)
    }

    /// All conversations in sidebar order.
    #[must_use]
    pub fn conversations(&self) -> &[Conversation] {
        &self.conversations
    }

    /// Messages of a conversation; empty if it does not exist.
    #[must_use]
    pub fn messages(&self, conversation_id: ConversationId) -> &[Message] {
        self.messages
            .get(&conversation_id)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }

    /// Conversations whose title or preview contains `query`, ignoring case.
    #[must_use]
    pub fn search(&self, query: &str) -> Vec<&Conversation> {
        let needle = query.to_lowercase();
        self.conversations
            .iter()
            .filter(|c| {
                c.title.to_lowercase().contains(&needle)
                    || c.last_message_preview.to_lowercase().contains(&needle)
            })
            .collect()
    }

    /// Number of conversations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.conversations.len()
    }

    /// Whether the store holds no conversation.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.conversations.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::conversations::types::Sender;

    #[test]
    fn test_create_makes_active_and_empty() {
        let mut store = ConversationStore::new();
        let id = store.create_conversation();
        assert_eq!(store.active(), Some(id));
        assert!(store.messages(id).is_empty());
        assert_eq!(store.get(id).map(|c| c.title.as_str()), Some(""));
    }

    #[test]
    fn test_create_inserts_first() {
        let mut store = ConversationStore::new();
        let first = store.create_conversation();
        let second = store.create_conversation();
        let order: Vec<_> = store.conversations().iter().map(|c| c.id).collect();
        assert_eq!(order, vec![second, first]);
    }

    #[test]
    fn test_append_preserves_order() {
        let mut store = ConversationStore::new();
        let id = store.create_conversation();
        let contents: Vec<String> = (0..20).map(|i| format!("message {i}")).collect();
        for content in &contents {
            assert!(store.append_message(id, Message::user(content.clone())));
        }
        let stored: Vec<_> = store.messages(id).iter().map(|m| m.content.clone()).collect();
        assert_eq!(stored, contents);
    }

    #[test]
    fn test_append_updates_preview() {
        let mut store = ConversationStore::new();
        let id = store.create_conversation();
        store.append_message(id, Message::user("hello"));
        store.append_message(id, Message::assistant("hi there"));
        assert_eq!(
            store.get(id).map(|c| c.last_message_preview.as_str()),
            Some("hi there")
        );
    }

    #[test]
    fn test_append_to_unknown_is_noop() {
        let mut store = ConversationStore::new();
        let id = store.create_conversation();
        let ghost = ConversationId::new();
        assert!(!store.append_message(ghost, Message::user("lost")));
        assert!(store.messages(ghost).is_empty());
        assert_eq!(store.len(), 1);
        assert!(store.messages(id).is_empty());
    }

    #[test]
    fn test_delete_removes_history() {
        let mut store = ConversationStore::new();
        let id = store.create_conversation();
        store.append_message(id, Message::user("hello"));
        assert!(store.delete_conversation(id));
        assert!(store.messages(id).is_empty());
        assert!(store.get(id).is_none());
        assert!(!store.delete_conversation(id));
    }

    #[test]
    fn test_delete_active_falls_back_to_first() {
        let mut store = ConversationStore::new();
        let a = store.create_conversation();
        let b = store.create_conversation();
        let c = store.create_conversation();
        // Sidebar order is c, b, a.
        store.select_conversation(b);
        assert!(store.delete_conversation(b));
        assert_eq!(store.active(), Some(c));

        assert!(store.delete_conversation(c));
        assert_eq!(store.active(), Some(a));

        assert!(store.delete_conversation(a));
        assert_eq!(store.active(), None);
        assert!(store.is_empty());
    }

    #[test]
    fn test_delete_inactive_keeps_selection() {
        let mut store = ConversationStore::new();
        let a = store.create_conversation();
        let b = store.create_conversation();
        assert!(store.delete_conversation(a));
        assert_eq!(store.active(), Some(b));
    }

    #[test]
    fn test_rename_and_select_unknown() {
        let mut store = ConversationStore::new();
        let id = store.create_conversation();
        assert!(store.rename_conversation(id, "tinyllama"));
        assert_eq!(store.get(id).map(|c| c.title.as_str()), Some("tinyllama"));

        let ghost = ConversationId::new();
        assert!(!store.rename_conversation(ghost, "nope"));
        store.select_conversation(ghost);
        assert_eq!(store.active(), Some(ghost));
        assert!(store.active_conversation().is_none());
        assert!(store.messages(ghost).is_empty());
    }

    #[test]
    fn test_seed_and_search() {
        let seeds = vec![
            SeedConversation {
                title: "tinyllama".to_string(),
                icon: None,
            },
            SeedConversation {
                title: "SDXL".to_string(),
                icon: Some("/assets/Stability.png".to_string()),
            },
        ];
        let mut store = ConversationStore::with_seed(&seeds);
        assert_eq!(store.len(), 2);
        let first = store.conversations()[0].id;
        assert_eq!(store.active(), Some(first));

        store.append_message(first, Message::user("Rust borrow checker"));
        assert_eq!(store.search("sdxl").len(), 1);
        assert_eq!(store.search("BORROW").len(), 1);
        assert_eq!(store.search("").len(), 2);
        assert!(store.search("nothing").is_empty());
        assert_eq!(store.messages(first)[0].sender, Sender::User);
    }
}
