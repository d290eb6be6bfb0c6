use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};

use super::error::RepositoryResult;
use crate::natter::models::{Chat, Message};

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The single persisted application record: every chat plus the active
/// pointer. CamelCase on disk (`activeChatId`).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateData {
    pub chats: Vec<Chat>,
    #[serde(default)]
    pub active_chat_id: String,
}

impl StateData {
    /// Pre-migration empty state. Not a valid registry on its own; the
    /// store repairs it to one chat if migration contributes nothing.
    pub fn empty() -> Self {
        Self {
            chats: Vec::new(),
            active_chat_id: String::new(),
        }
    }
}

/// The legacy single-thread record: one model/system/temperature plus a
/// per-model history map. Read at most once, then deleted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyStateData {
    #[serde(default)]
    pub model: String,
    #[serde(default)]
    pub system: String,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub history: HashMap<String, Vec<Message>>,
}

/// Serialization boundary for application state. Implementations carry no
/// logic beyond reading and writing the records.
pub trait StateRepository: Send + Sync + 'static {
    /// Load the persisted state. `None` when the record is absent or
    /// unreadable; corruption is treated as absence, never an error.
    fn load(&self) -> BoxFuture<'static, Option<StateData>>;

    /// Serialize and write the full state. Last-write-wins.
    fn save(&self, state: StateData) -> BoxFuture<'static, RepositoryResult<()>>;

    /// Load the legacy record, if any. Same absence semantics as [`load`].
    fn load_legacy(&self) -> BoxFuture<'static, Option<LegacyStateData>>;

    /// Remove the legacy record so it is never consumed twice.
    fn delete_legacy(&self) -> BoxFuture<'static, RepositoryResult<()>>;
}
