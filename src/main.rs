use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

mod natter;

use natter::ChatSession;
use natter::repositories::{StateJsonRepository, StateRepository};
use natter::services::HttpChatBackend;
use natter::views::TuiApp;

#[derive(Parser)]
#[command(name = "natter", about = "Terminal chat client for a local LLM proxy")]
struct Args {
    /// Base URL of the chat proxy
    #[arg(long, default_value = "http://127.0.0.1:8000")]
    server_url: String,

    /// Directory for the persisted state (default: the user config directory)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Write logs to this file (the terminal belongs to the UI)
    #[arg(long)]
    log_file: Option<PathBuf>,
}

fn init_logging(path: &PathBuf) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create log file {}", path.display()))?;
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Arc::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    if let Some(path) = &args.log_file {
        init_logging(path)?;
    }

    let backend = Arc::new(HttpChatBackend::new(&args.server_url));
    let repository: Arc<dyn StateRepository> = match args.data_dir {
        Some(dir) => Arc::new(StateJsonRepository::with_dir(dir)),
        None => Arc::new(StateJsonRepository::new().context("failed to locate state directory")?),
    };

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let session = ChatSession::new(backend, repository, events_tx);
    session
        .init()
        .await
        .context("failed to initialize session")?;

    let terminal = ratatui::init();
    let result = TuiApp::new(session.clone()).run(terminal, events_rx).await;
    ratatui::restore();
    session.close();
    result
}
