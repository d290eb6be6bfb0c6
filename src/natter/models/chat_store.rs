use tracing::debug;

use super::chat::{Chat, DEFAULT_TEMPERATURE, DEFAULT_TITLE, Message};
use crate::natter::repositories::StateData;

/// In-memory registry of all chats plus the active-chat pointer.
///
/// Invariants, enforced by every operation:
/// - the registry is never empty;
/// - the active id always resolves to a member chat.
///
/// Chats are kept in insertion order; display ordering is a projection
/// (see [`ChatStore::list_for_display`]).
pub struct ChatStore {
    chats: Vec<Chat>,
    active_chat_id: String,
}

impl ChatStore {
    /// A fresh store holding exactly one empty chat.
    pub fn new() -> Self {
        let chat = Chat::new(None, DEFAULT_TEMPERATURE);
        let active = chat.id.clone();
        Self {
            chats: vec![chat],
            active_chat_id: active,
        }
    }

    /// Rebuild from persisted data, repairing any violated invariant:
    /// an empty chat list gets one synthesized chat, and a dangling active
    /// pointer falls back to the first chat.
    pub fn from_data(data: StateData) -> Self {
        let mut store = Self {
            chats: data.chats,
            active_chat_id: data.active_chat_id,
        };
        store.repair();
        store
    }

    fn repair(&mut self) {
        if self.chats.is_empty() {
            let chat = Chat::new(None, DEFAULT_TEMPERATURE);
            self.active_chat_id = chat.id.clone();
            self.chats.push(chat);
        } else if !self.chats.iter().any(|c| c.id == self.active_chat_id) {
            self.active_chat_id = self.chats[0].id.clone();
        }
    }

    /// Snapshot for persistence. Storage order is insertion order.
    pub fn to_data(&self) -> StateData {
        StateData {
            chats: self.chats.clone(),
            active_chat_id: self.active_chat_id.clone(),
        }
    }

    /// Create a new empty chat and make it active.
    pub fn create_chat(&mut self, seed_model: Option<&str>, temperature: f64) -> Chat {
        let chat = Chat::new(seed_model, temperature);
        self.active_chat_id = chat.id.clone();
        self.chats.push(chat.clone());
        chat
    }

    /// Point the active pointer at `id`. Returns false when `id` is already
    /// active or unknown.
    pub fn switch_active(&mut self, id: &str) -> bool {
        if self.active_chat_id == id || !self.chats.iter().any(|c| c.id == id) {
            return false;
        }
        self.active_chat_id = id.to_string();
        true
    }

    /// Rename a chat. The title is trimmed; an empty result falls back to
    /// the default title.
    pub fn rename_chat(&mut self, id: &str, new_title: &str) -> bool {
        let Some(chat) = self.chats.iter_mut().find(|c| c.id == id) else {
            return false;
        };
        let trimmed = new_title.trim();
        chat.title = if trimmed.is_empty() {
            DEFAULT_TITLE.to_string()
        } else {
            trimmed.to_string()
        };
        true
    }

    /// Remove a chat. When the registry empties, one fresh chat is
    /// synthesized and activated; when the deleted chat was active, the
    /// pointer falls over to the first remaining chat in insertion order.
    pub fn delete_chat(&mut self, id: &str) -> bool {
        let Some(idx) = self.chats.iter().position(|c| c.id == id) else {
            return false;
        };
        self.chats.remove(idx);
        if self.chats.is_empty() {
            let chat = Chat::new(None, DEFAULT_TEMPERATURE);
            self.active_chat_id = chat.id.clone();
            self.chats.push(chat);
        } else if self.active_chat_id == id {
            self.active_chat_id = self.chats[0].id.clone();
        }
        true
    }

    pub fn active_chat_id(&self) -> &str {
        &self.active_chat_id
    }

    /// Resolve the active chat. Falls back to the first chat if the pointer
    /// ever dangles.
    pub fn active_chat(&self) -> &Chat {
        self.chats
            .iter()
            .find(|c| c.id == self.active_chat_id)
            .unwrap_or(&self.chats[0])
    }

    pub fn active_chat_mut(&mut self) -> &mut Chat {
        let idx = self
            .chats
            .iter()
            .position(|c| c.id == self.active_chat_id)
            .unwrap_or(0);
        &mut self.chats[idx]
    }

    pub fn get_chat_mut(&mut self, id: &str) -> Option<&mut Chat> {
        self.chats.iter_mut().find(|c| c.id == id)
    }

    /// Append a message to a chat by id. Returns false when the chat no
    /// longer exists (e.g. deleted while a response was in flight).
    pub fn push_message(&mut self, chat_id: &str, message: Message) -> bool {
        match self.chats.iter_mut().find(|c| c.id == chat_id) {
            Some(chat) => {
                chat.push_message(message);
                true
            }
            None => {
                debug!(chat_id, "dropping message for deleted chat");
                false
            }
        }
    }

    pub fn clear_active_messages(&mut self) {
        self.active_chat_mut().clear_messages();
    }

    /// Chats in display order: most recently created first, ties broken by
    /// id ascending so the ordering is stable.
    pub fn list_for_display(&self) -> Vec<&Chat> {
        let mut chats: Vec<&Chat> = self.chats.iter().collect();
        chats.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        chats
    }

    pub fn count(&self) -> usize {
        self.chats.len()
    }
}

impl Default for ChatStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::natter::models::chat::Role;

    fn chat_with(id: &str, created_at: i64) -> Chat {
        let mut chat = Chat::new(None, DEFAULT_TEMPERATURE);
        chat.id = id.to_string();
        chat.created_at = created_at;
        chat
    }

    #[test]
    fn test_new_store_has_one_active_chat() {
        let store = ChatStore::new();
        assert_eq!(store.count(), 1);
        assert_eq!(store.active_chat().id, store.active_chat_id());
    }

    #[test]
    fn test_from_data_repairs_empty_chats() {
        let store = ChatStore::from_data(StateData {
            chats: vec![],
            active_chat_id: "gone".to_string(),
        });
        assert_eq!(store.count(), 1);
        assert_eq!(store.active_chat().id, store.active_chat_id());
    }

    #[test]
    fn test_from_data_repairs_dangling_active_pointer() {
        let store = ChatStore::from_data(StateData {
            chats: vec![chat_with("a", 1), chat_with("b", 2)],
            active_chat_id: "missing".to_string(),
        });
        assert_eq!(store.active_chat_id(), "a");
    }

    #[test]
    fn test_create_chat_becomes_active() {
        let mut store = ChatStore::new();
        let chat = store.create_chat(Some("llama3"), 0.7);
        assert_eq!(store.active_chat_id(), chat.id);
        assert_eq!(chat.title, "Chat (llama3)");
        assert_eq!(store.count(), 2);
    }

    #[test]
    fn test_switch_is_noop_when_already_active() {
        let mut store = ChatStore::new();
        let active = store.active_chat_id().to_string();
        assert!(!store.switch_active(&active));
        assert!(!store.switch_active("unknown"));
    }

    #[test]
    fn test_rename_trims_and_falls_back_to_default() {
        let mut store = ChatStore::new();
        let id = store.active_chat_id().to_string();
        assert!(store.rename_chat(&id, "  notes  "));
        assert_eq!(store.active_chat().title, "notes");
        assert!(store.rename_chat(&id, "   "));
        assert_eq!(store.active_chat().title, "Chat");
    }

    #[test]
    fn test_delete_last_chat_synthesizes_fresh_one() {
        let mut store = ChatStore::new();
        let id = store.active_chat_id().to_string();
        assert!(store.delete_chat(&id));
        assert_eq!(store.count(), 1);
        assert_ne!(store.active_chat().id, id);
        assert!(store.active_chat().messages.is_empty());
        assert_eq!(store.active_chat().id, store.active_chat_id());
    }

    #[test]
    fn test_delete_active_falls_over_to_first_remaining() {
        let mut store = ChatStore::from_data(StateData {
            chats: vec![chat_with("a", 1), chat_with("b", 2), chat_with("c", 3)],
            active_chat_id: "b".to_string(),
        });
        assert!(store.delete_chat("b"));
        assert_eq!(store.active_chat_id(), "a");
    }

    #[test]
    fn test_delete_inactive_keeps_active_pointer() {
        let mut store = ChatStore::from_data(StateData {
            chats: vec![chat_with("a", 1), chat_with("b", 2)],
            active_chat_id: "b".to_string(),
        });
        assert!(store.delete_chat("a"));
        assert_eq!(store.active_chat_id(), "b");
    }

    #[test]
    fn test_push_message_to_deleted_chat_is_dropped() {
        let mut store = ChatStore::new();
        assert!(!store.push_message("gone", Message::new(Role::User, "hi")));
    }

    #[test]
    fn test_display_order_is_created_at_desc_with_id_tiebreak() {
        let store = ChatStore::from_data(StateData {
            chats: vec![chat_with("b", 5), chat_with("a", 5), chat_with("c", 9)],
            active_chat_id: "c".to_string(),
        });
        let ids: Vec<&str> = store
            .list_for_display()
            .into_iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(ids, vec!["c", "a", "b"]);
        // canonical storage order is untouched
        let data = store.to_data();
        let stored: Vec<&str> = data.chats.iter().map(|c| c.id.as_str()).collect();
        assert_eq!(stored, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_clear_active_resets_transcript_only() {
        let mut store = ChatStore::new();
        let id = store.active_chat_id().to_string();
        store.push_message(&id, Message::new(Role::User, "hi"));
        store.push_message(&id, Message::new(Role::Assistant, "hello"));
        store.clear_active_messages();
        assert!(store.active_chat().messages.is_empty());
        assert_eq!(store.count(), 1);
    }
}
