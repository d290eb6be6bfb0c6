pub mod app;
pub mod chat_view;

pub use app::TuiApp;
