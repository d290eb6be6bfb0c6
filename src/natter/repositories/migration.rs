use tracing::{info, warn};

use super::state_repository::{StateData, StateRepository};
use crate::natter::models::chat::{DEFAULT_TEMPERATURE, derive_title};
use crate::natter::models::Chat;

/// History key the legacy client used when it had no model selected.
const LEGACY_DEFAULT_KEY: &str = "__default__";

/// Outcome of the one-shot legacy import.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MigrationReport {
    pub migrated: bool,
}

/// Import the legacy single-thread record into `state`, at most once.
///
/// Runs only when `state` has zero chats (fresh install); builds one chat
/// from the legacy model's history and activates it. Best-effort by design:
/// every failure is swallowed, and the legacy record is deleted whether or
/// not the import succeeded so it is never retried.
pub async fn migrate_legacy_if_present(
    state: &mut StateData,
    repository: &dyn StateRepository,
) -> MigrationReport {
    let Some(legacy) = repository.load_legacy().await else {
        return MigrationReport { migrated: false };
    };

    let mut migrated = false;
    if state.chats.is_empty() {
        let key = if legacy.model.is_empty() {
            LEGACY_DEFAULT_KEY
        } else {
            legacy.model.as_str()
        };
        let messages = legacy.history.get(key).cloned().unwrap_or_default();

        let mut chat = Chat::new(None, legacy.temperature.unwrap_or(DEFAULT_TEMPERATURE));
        chat.title = derive_title(&legacy.model);
        chat.model = legacy.model;
        chat.system = legacy.system;
        chat.messages = messages;

        info!(chat_id = %chat.id, model = %chat.model, "imported legacy chat history");
        state.active_chat_id = chat.id.clone();
        state.chats.push(chat);
        migrated = true;

        if let Err(e) = repository.save(state.clone()).await {
            warn!(error = %e, "failed to write through migrated state");
        }
    }

    // Always remove the legacy record so migration never reruns.
    if let Err(e) = repository.delete_legacy().await {
        warn!(error = %e, "failed to delete legacy state record");
    }

    MigrationReport { migrated }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::natter::models::{Message, Role};
    use crate::natter::repositories::{InMemoryStateRepository, LegacyStateData};

    fn legacy_record() -> LegacyStateData {
        LegacyStateData {
            model: "a".to_string(),
            system: String::new(),
            temperature: None,
            history: HashMap::from([(
                "a".to_string(),
                vec![Message::new(Role::User, "x")],
            )]),
        }
    }

    #[tokio::test]
    async fn test_migrates_legacy_history_into_one_chat() {
        let repo = InMemoryStateRepository::with_legacy(legacy_record());
        let mut state = StateData::empty();

        let report = migrate_legacy_if_present(&mut state, &repo).await;

        assert!(report.migrated);
        assert_eq!(state.chats.len(), 1);
        let chat = &state.chats[0];
        assert_eq!(chat.model, "a");
        assert_eq!(chat.title, "Chat (a)");
        assert_eq!(chat.temperature, DEFAULT_TEMPERATURE);
        assert_eq!(chat.messages, vec![Message::new(Role::User, "x")]);
        assert_eq!(state.active_chat_id, chat.id);
        // written through and legacy record gone
        assert!(repo.persisted().is_some());
        assert!(!repo.has_legacy());
    }

    #[tokio::test]
    async fn test_migration_is_idempotent() {
        let repo = InMemoryStateRepository::with_legacy(legacy_record());
        let mut state = StateData::empty();

        let first = migrate_legacy_if_present(&mut state, &repo).await;
        assert!(first.migrated);

        let mut rerun = StateData::empty();
        let second = migrate_legacy_if_present(&mut rerun, &repo).await;
        assert!(!second.migrated);
        assert!(rerun.chats.is_empty());
    }

    #[tokio::test]
    async fn test_legacy_deleted_even_when_state_has_chats() {
        let repo = InMemoryStateRepository::with_legacy(legacy_record());
        let mut state = StateData {
            chats: vec![Chat::new(None, DEFAULT_TEMPERATURE)],
            active_chat_id: String::new(),
        };

        let report = migrate_legacy_if_present(&mut state, &repo).await;

        assert!(!report.migrated);
        assert_eq!(state.chats.len(), 1);
        assert!(!repo.has_legacy());
    }

    #[tokio::test]
    async fn test_empty_legacy_model_uses_default_history_key() {
        let legacy = LegacyStateData {
            model: String::new(),
            system: "be brief".to_string(),
            temperature: Some(0.7),
            history: HashMap::from([(
                "__default__".to_string(),
                vec![Message::new(Role::Assistant, "hi")],
            )]),
        };
        let repo = InMemoryStateRepository::with_legacy(legacy);
        let mut state = StateData::empty();

        let report = migrate_legacy_if_present(&mut state, &repo).await;

        assert!(report.migrated);
        let chat = &state.chats[0];
        assert_eq!(chat.title, "Chat");
        assert_eq!(chat.system, "be brief");
        assert_eq!(chat.temperature, 0.7);
        assert_eq!(chat.messages.len(), 1);
    }

    #[tokio::test]
    async fn test_no_legacy_record_is_a_noop() {
        let repo = InMemoryStateRepository::new();
        let mut state = StateData::empty();
        let report = migrate_legacy_if_present(&mut state, &repo).await;
        assert!(!report.migrated);
        assert!(state.chats.is_empty());
    }

    #[tokio::test]
    async fn test_missing_history_for_model_yields_empty_chat() {
        let legacy = LegacyStateData {
            model: "b".to_string(),
            ..LegacyStateData::default()
        };
        let repo = InMemoryStateRepository::with_legacy(legacy);
        let mut state = StateData::empty();

        let report = migrate_legacy_if_present(&mut state, &repo).await;

        assert!(report.migrated);
        assert!(state.chats[0].messages.is_empty());
        assert_eq!(state.chats[0].model, "b");
    }
}
