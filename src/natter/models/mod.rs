pub mod chat;
pub mod chat_store;
pub mod stream_manager;

pub use chat::{Chat, DEFAULT_TEMPERATURE, Message, Role};
pub use chat_store::ChatStore;
pub use stream_manager::{StreamManager, StreamStatus};
