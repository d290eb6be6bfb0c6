use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default sampling temperature when a chat has no stored value.
pub const DEFAULT_TEMPERATURE: f64 = 0.2;

/// Title used for chats with no model attached (and as the rename fallback).
pub const DEFAULT_TITLE: &str = "Chat";

/// Author of a transcript message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One transcript entry. Immutable once appended to a chat.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// A single conversation thread with its own model, system prompt,
/// temperature, and append-only message log.
///
/// Serialized in camelCase to stay compatible with the persisted
/// `{ chats, activeChatId }` state record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub system: String,
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    #[serde(default)]
    pub messages: Vec<Message>,
    /// Unix timestamp in milliseconds.
    pub created_at: i64,
}

fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

impl Chat {
    /// Create a fresh empty chat. The id is generated once and never changes.
    pub fn new(seed_model: Option<&str>, temperature: f64) -> Self {
        let model = seed_model.unwrap_or_default().to_string();
        Self {
            id: Uuid::new_v4().to_string(),
            title: derive_title(&model),
            model,
            system: String::new(),
            temperature,
            messages: Vec::new(),
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    pub fn push_message(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn clear_messages(&mut self) {
        self.messages.clear();
    }
}

/// Title for a new or migrated chat: `"Chat (<model>)"` when a model is
/// known, plain `"Chat"` otherwise.
pub fn derive_title(model: &str) -> String {
    if model.is_empty() {
        DEFAULT_TITLE.to_string()
    } else {
        format!("{DEFAULT_TITLE} ({model})")
    }
}
