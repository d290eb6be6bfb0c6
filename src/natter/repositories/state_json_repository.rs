use std::path::PathBuf;

use tracing::warn;

use super::error::{RepositoryError, RepositoryResult};
use super::state_repository::{BoxFuture, LegacyStateData, StateData, StateRepository};

const STATE_FILE: &str = "state.json";
const LEGACY_STATE_FILE: &str = "state-v1.json";

/// JSON file-backed state repository.
/// Stores the whole application state as a single record in
/// `~/.config/natter/state.json`; the legacy single-thread record lives next
/// to it as `state-v1.json`.
pub struct StateJsonRepository {
    data_dir: PathBuf,
}

impl StateJsonRepository {
    pub fn new() -> RepositoryResult<Self> {
        let data_dir = dirs::config_dir()
            .ok_or_else(|| RepositoryError::InitializationError {
                message: "Could not determine config directory".to_string(),
            })?
            .join("natter");
        Ok(Self { data_dir })
    }

    /// Repository rooted at a custom directory (tests, `--data-dir`).
    pub fn with_dir(data_dir: PathBuf) -> Self {
        Self { data_dir }
    }

    fn state_path(&self) -> PathBuf {
        self.data_dir.join(STATE_FILE)
    }

    fn legacy_path(&self) -> PathBuf {
        self.data_dir.join(LEGACY_STATE_FILE)
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(path: PathBuf) -> Option<T> {
    let contents = match tokio::fs::read_to_string(&path).await {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return None,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to read state file");
            return None;
        }
    };
    match serde_json::from_str(&contents) {
        Ok(value) => Some(value),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "state file unreadable, treating as absent");
            None
        }
    }
}

impl StateRepository for StateJsonRepository {
    fn load(&self) -> BoxFuture<'static, Option<StateData>> {
        let path = self.state_path();
        Box::pin(read_json(path))
    }

    fn save(&self, state: StateData) -> BoxFuture<'static, RepositoryResult<()>> {
        let dir = self.data_dir.clone();
        let path = self.state_path();
        Box::pin(async move {
            tokio::fs::create_dir_all(&dir).await?;

            let json = serde_json::to_string_pretty(&state)?;

            // Write atomically: temp file, then rename.
            let temp_path = path.with_extension("json.tmp");
            tokio::fs::write(&temp_path, json).await?;
            tokio::fs::rename(&temp_path, &path).await?;

            Ok(())
        })
    }

    fn load_legacy(&self) -> BoxFuture<'static, Option<LegacyStateData>> {
        let path = self.legacy_path();
        Box::pin(read_json(path))
    }

    fn delete_legacy(&self) -> BoxFuture<'static, RepositoryResult<()>> {
        let path = self.legacy_path();
        Box::pin(async move {
            match tokio::fs::remove_file(&path).await {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::natter::models::{Chat, DEFAULT_TEMPERATURE};

    fn repo_in(dir: &tempfile::TempDir) -> StateJsonRepository {
        StateJsonRepository::with_dir(dir.path().to_path_buf())
    }

    #[tokio::test]
    async fn test_load_absent_state_is_none() {
        let dir = tempfile::tempdir().unwrap();
        assert!(repo_in(&dir).load().await.is_none());
    }

    #[tokio::test]
    async fn test_save_then_load_roundtrips() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo_in(&dir);

        let chat = Chat::new(Some("llama3"), DEFAULT_TEMPERATURE);
        let state = StateData {
            active_chat_id: chat.id.clone(),
            chats: vec![chat],
        };
        repo.save(state.clone()).await.unwrap();

        let loaded = repo.load().await.unwrap();
        assert_eq!(loaded.active_chat_id, state.active_chat_id);
        assert_eq!(loaded.chats.len(), 1);
        assert_eq!(loaded.chats[0].model, "llama3");
    }

    #[tokio::test]
    async fn test_malformed_state_is_treated_as_absent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(STATE_FILE), "{not json").unwrap();
        assert!(repo_in(&dir).load().await.is_none());
    }

    #[tokio::test]
    async fn test_save_leaves_no_temp_file() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo_in(&dir);
        repo.save(StateData::empty()).await.unwrap();
        assert!(dir.path().join(STATE_FILE).exists());
        assert!(!dir.path().join("state.json.tmp").exists());
    }

    #[tokio::test]
    async fn test_legacy_load_and_delete() {
        let dir = tempfile::tempdir().unwrap();
        let repo = repo_in(&dir);

        std::fs::write(
            dir.path().join(LEGACY_STATE_FILE),
            r#"{"model":"a","system":"","temperature":0.3,"history":{"a":[{"role":"user","content":"x"}]}}"#,
        )
        .unwrap();

        let legacy = repo.load_legacy().await.unwrap();
        assert_eq!(legacy.model, "a");
        assert_eq!(legacy.history["a"].len(), 1);

        repo.delete_legacy().await.unwrap();
        assert!(repo.load_legacy().await.is_none());
        // deleting again is fine
        repo.delete_legacy().await.unwrap();
    }
}
