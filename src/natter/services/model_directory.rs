use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, warn};

use super::llm_service::ChatBackend;

/// Retry schedule for the model list: immediate, then after ~0.8s, then ~2s.
const RETRY_DELAYS: [Duration; 3] = [
    Duration::ZERO,
    Duration::from_millis(800),
    Duration::from_millis(2000),
];

/// Model-name substrings that mark a known family. Model names are opaque
/// operator-defined strings; this is the only ranking signal available.
const KNOWN_FAMILIES: [&str; 5] = ["qwen", "llama", "mistral", "phi", "gemma"];

/// Client for the server's model list: bounded retry on fetch, and a shared
/// selectable list the self-heal timer refreshes when it empties.
pub struct ModelDirectory {
    backend: Arc<dyn ChatBackend>,
    models: Mutex<Vec<String>>,
    fetch_in_flight: AtomicBool,
}

impl ModelDirectory {
    pub fn new(backend: Arc<dyn ChatBackend>) -> Self {
        Self {
            backend,
            models: Mutex::new(Vec::new()),
            fetch_in_flight: AtomicBool::new(false),
        }
    }

    /// Current selectable list.
    pub fn models(&self) -> Vec<String> {
        self.models.lock().clone()
    }

    pub fn is_empty(&self) -> bool {
        self.models.lock().is_empty()
    }

    /// Fetch the model list with up to three attempts. Exhausting every
    /// attempt degrades to an empty list, never an error; callers treat
    /// empty as "unavailable". The selectable list is overwritten only on
    /// success.
    pub async fn fetch_with_retry(&self) -> Vec<String> {
        for delay in RETRY_DELAYS {
            if !delay.is_zero() {
                tokio::time::sleep(delay).await;
            }
            match self.backend.fetch_models().await {
                Ok(list) => {
                    debug!(count = list.len(), "model list fetched");
                    *self.models.lock() = list.clone();
                    return list;
                }
                Err(e) => {
                    warn!(error = %e, "model list fetch attempt failed");
                }
            }
        }
        Vec::new()
    }

    /// Background refresh used by the self-heal timer. Concurrent refreshes
    /// are coalesced: when one is already running this returns immediately.
    pub async fn refresh_if_idle(&self) -> bool {
        if self
            .fetch_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("model list fetch already in flight, skipping");
            return false;
        }
        self.fetch_with_retry().await;
        self.fetch_in_flight.store(false, Ordering::Release);
        true
    }

    /// Pick the model to use from `list`: the already-stored `preferred`
    /// when the server still offers it, else the first known-family name,
    /// else the first entry.
    pub fn choose(list: &[String], preferred: Option<&str>) -> Option<String> {
        if let Some(preferred) = preferred
            && !preferred.is_empty()
            && list.iter().any(|m| m == preferred)
        {
            return Some(preferred.to_string());
        }
        list.iter()
            .find(|name| {
                let lower = name.to_lowercase();
                KNOWN_FAMILIES.iter().any(|family| lower.contains(family))
            })
            .or_else(|| list.first())
            .cloned()
    }
}
