pub mod error;
pub mod in_memory_repository;
pub mod migration;
pub mod state_json_repository;
pub mod state_repository;

pub use in_memory_repository::InMemoryStateRepository;
pub use migration::migrate_legacy_if_present;
pub use state_json_repository::StateJsonRepository;
pub use state_repository::{LegacyStateData, StateData, StateRepository};
