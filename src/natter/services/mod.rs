pub mod llm_service;
pub mod model_directory;

pub use llm_service::{ChatBackend, ChatOptions, ChatRequest, HttpChatBackend, LlmError, TextStream};
pub use model_directory::ModelDirectory;
