use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

/// Terminal state of one streaming attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum StreamStatus {
    Completed,
    Failed(String),
}

struct ActiveStream {
    chat_id: String,
    cancel_flag: Arc<AtomicBool>,
}

/// Lifecycle owner for the single in-flight response stream.
///
/// At most one stream exists per session: beginning a new one raises the
/// previous stream's cancel flag (supersession). The flag is the cooperative
/// abort signal; the worker's read loop checks it around every increment
/// and runs its failure path once it is raised; nothing is aborted forcibly.
pub struct StreamManager {
    active: Option<ActiveStream>,
}

impl StreamManager {
    pub fn new() -> Self {
        Self { active: None }
    }

    /// Cancel any in-flight stream and hand out the cancel flag for a new
    /// one, tied to `chat_id`.
    pub fn begin(&mut self, chat_id: &str) -> Arc<AtomicBool> {
        if let Some(existing) = self.active.take() {
            existing.cancel_flag.store(true, Ordering::Relaxed);
            debug!(chat_id = %existing.chat_id, "cancelled in-flight stream before starting new one");
        }
        let flag = Arc::new(AtomicBool::new(false));
        self.active = Some(ActiveStream {
            chat_id: chat_id.to_string(),
            cancel_flag: flag.clone(),
        });
        flag
    }

    /// Raise the cancel flag on the in-flight stream, if any.
    pub fn cancel_active(&mut self) -> bool {
        match self.active.take() {
            Some(active) => {
                active.cancel_flag.store(true, Ordering::Relaxed);
                debug!(chat_id = %active.chat_id, "stream cancelled");
                true
            }
            None => false,
        }
    }

    /// Forget the stream owning `flag` once its send operation has fully
    /// finished. A stream superseded in the meantime is left alone.
    pub fn finish(&mut self, flag: &Arc<AtomicBool>) {
        if let Some(active) = &self.active
            && Arc::ptr_eq(&active.cancel_flag, flag)
        {
            self.active = None;
        }
    }

    pub fn is_streaming(&self, chat_id: &str) -> bool {
        self.active.as_ref().is_some_and(|a| a.chat_id == chat_id)
    }

    pub fn has_active_stream(&self) -> bool {
        self.active.is_some()
    }
}

impl Default for StreamManager {
    fn default() -> Self {
        Self::new()
    }
}
