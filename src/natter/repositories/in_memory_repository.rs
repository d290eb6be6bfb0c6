use std::sync::Arc;

use parking_lot::Mutex;

use super::error::RepositoryResult;
use super::state_repository::{BoxFuture, LegacyStateData, StateData, StateRepository};

/// In-memory state repository.
/// Useful for testing and development.
#[derive(Clone, Default)]
pub struct InMemoryStateRepository {
    state: Arc<Mutex<Option<StateData>>>,
    legacy: Arc<Mutex<Option<LegacyStateData>>>,
}

impl InMemoryStateRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-seed the legacy record (simulates an old install).
    pub fn with_legacy(legacy: LegacyStateData) -> Self {
        let repo = Self::new();
        *repo.legacy.lock() = Some(legacy);
        repo
    }

    /// Pre-seed the current state record.
    pub fn with_state(state: StateData) -> Self {
        let repo = Self::new();
        *repo.state.lock() = Some(state);
        repo
    }

    /// Peek at the persisted state without going through the trait.
    pub fn persisted(&self) -> Option<StateData> {
        self.state.lock().clone()
    }

    pub fn has_legacy(&self) -> bool {
        self.legacy.lock().is_some()
    }
}

impl StateRepository for InMemoryStateRepository {
    fn load(&self) -> BoxFuture<'static, Option<StateData>> {
        let state = self.state.clone();
        Box::pin(async move { state.lock().clone() })
    }

    fn save(&self, new_state: StateData) -> BoxFuture<'static, RepositoryResult<()>> {
        let state = self.state.clone();
        Box::pin(async move {
            *state.lock() = Some(new_state);
            Ok(())
        })
    }

    fn load_legacy(&self) -> BoxFuture<'static, Option<LegacyStateData>> {
        let legacy = self.legacy.clone();
        Box::pin(async move { legacy.lock().clone() })
    }

    fn delete_legacy(&self) -> BoxFuture<'static, RepositoryResult<()>> {
        let legacy = self.legacy.clone();
        Box::pin(async move {
            *legacy.lock() = None;
            Ok(())
        })
    }
}
