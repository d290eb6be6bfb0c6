use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use anyhow::Result;
use futures::StreamExt;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::natter::models::{Chat, ChatStore, Message, Role, StreamManager, StreamStatus};
use crate::natter::repositories::{StateData, StateRepository, migrate_legacy_if_present};
use crate::natter::services::{ChatBackend, ChatOptions, ChatRequest, LlmError, ModelDirectory};

/// One-shot recheck of the model list shortly after startup.
const SELF_HEAL_INITIAL_DELAY: Duration = Duration::from_secs(2);
/// Recurring self-heal cadence.
const SELF_HEAL_INTERVAL: Duration = Duration::from_secs(15);

/// Committed in place of an assistant response that arrived empty.
const EMPTY_RESPONSE_PLACEHOLDER: &str = "(no content)";

/// Notifications from the session to the render layer.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// Chat list or active pointer changed.
    ChatsChanged,
    /// A chat's committed transcript changed; re-render from the store.
    TranscriptChanged { chat_id: String },
    StreamStarted { chat_id: String },
    /// Uncommitted assistant text; the only place partial output is visible.
    StreamDelta { chat_id: String, text: String },
    StreamEnded { chat_id: String, status: StreamStatus },
    ModelsUpdated { models: Vec<String> },
    /// Status line text.
    Status(String),
}

/// Top-level session object: owns the chat registry, the persistence
/// boundary, the model directory, and the single in-flight stream.
///
/// Cheap to clone; all state is shared behind `Arc`s. Locks are never held
/// across awaits; every mutation snapshots the state and then awaits the
/// write-through, so a user-visible render never precedes persistence.
#[derive(Clone)]
pub struct ChatSession {
    store: Arc<Mutex<ChatStore>>,
    repository: Arc<dyn StateRepository>,
    backend: Arc<dyn ChatBackend>,
    directory: Arc<ModelDirectory>,
    streams: Arc<Mutex<StreamManager>>,
    events: mpsc::UnboundedSender<SessionEvent>,
    heal_task: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl ChatSession {
    pub fn new(
        backend: Arc<dyn ChatBackend>,
        repository: Arc<dyn StateRepository>,
        events: mpsc::UnboundedSender<SessionEvent>,
    ) -> Self {
        Self {
            store: Arc::new(Mutex::new(ChatStore::new())),
            repository,
            directory: Arc::new(ModelDirectory::new(backend.clone())),
            backend,
            streams: Arc::new(Mutex::new(StreamManager::new())),
            events,
            heal_task: Arc::new(Mutex::new(None)),
        }
    }

    /// Load persisted state (falling back to a fresh single-chat state),
    /// run the one-shot legacy migration, write the repaired state through,
    /// fetch the initial model list, and start the self-heal timer.
    pub async fn init(&self) -> Result<()> {
        let mut data = self
            .repository
            .load()
            .await
            .unwrap_or_else(StateData::empty);
        let report = migrate_legacy_if_present(&mut data, self.repository.as_ref()).await;
        if report.migrated {
            info!("migrated legacy single-thread state");
        }
        let active_id = {
            let mut store = self.store.lock();
            *store = ChatStore::from_data(data);
            store.active_chat_id().to_string()
        };
        self.persist().await;
        self.emit(SessionEvent::ChatsChanged);
        self.emit(SessionEvent::TranscriptChanged { chat_id: active_id });

        self.emit(SessionEvent::Status("Loading models...".to_string()));
        let list = self.directory.fetch_with_retry().await;
        self.apply_model_selection(&list).await;

        self.spawn_self_heal();
        Ok(())
    }

    /// Stop background work. No state teardown; the session lives for the
    /// whole process.
    pub fn close(&self) {
        self.streams.lock().cancel_active();
        if let Some(task) = self.heal_task.lock().take() {
            task.abort();
        }
    }

    // ----- snapshots for the render layer -----

    pub fn chats_for_display(&self) -> Vec<Chat> {
        self.store
            .lock()
            .list_for_display()
            .into_iter()
            .cloned()
            .collect()
    }

    pub fn active_chat(&self) -> Chat {
        self.store.lock().active_chat().clone()
    }

    pub fn active_chat_id(&self) -> String {
        self.store.lock().active_chat_id().to_string()
    }

    pub fn models(&self) -> Vec<String> {
        self.directory.models()
    }

    pub fn is_streaming(&self) -> bool {
        self.streams.lock().has_active_stream()
    }

    // ----- registry operations (mutate → write through → notify) -----

    /// New empty chat seeded from the current selection, made active.
    pub async fn create_chat(&self) -> String {
        let id = {
            let mut store = self.store.lock();
            let (model, temperature) = {
                let active = store.active_chat();
                (active.model.clone(), active.temperature)
            };
            let seed = (!model.is_empty()).then_some(model.as_str());
            store.create_chat(seed, temperature).id
        };
        self.persist().await;
        self.emit(SessionEvent::ChatsChanged);
        self.emit(SessionEvent::TranscriptChanged {
            chat_id: id.clone(),
        });
        id
    }

    pub async fn switch_chat(&self, id: &str) {
        if !self.store.lock().switch_active(id) {
            return;
        }
        self.persist().await;
        self.emit(SessionEvent::ChatsChanged);
        self.emit(SessionEvent::TranscriptChanged {
            chat_id: id.to_string(),
        });
    }

    pub async fn rename_chat(&self, id: &str, new_title: &str) {
        if !self.store.lock().rename_chat(id, new_title) {
            return;
        }
        self.persist().await;
        self.emit(SessionEvent::ChatsChanged);
    }

    pub async fn delete_chat(&self, id: &str) {
        let active_id = {
            let mut store = self.store.lock();
            if !store.delete_chat(id) {
                return;
            }
            store.active_chat_id().to_string()
        };
        self.persist().await;
        self.emit(SessionEvent::ChatsChanged);
        self.emit(SessionEvent::TranscriptChanged { chat_id: active_id });
    }

    /// Wholesale reset of the active chat's transcript.
    pub async fn clear_active_chat(&self) {
        let chat_id = {
            let mut store = self.store.lock();
            store.clear_active_messages();
            store.active_chat_id().to_string()
        };
        self.persist().await;
        self.emit(SessionEvent::TranscriptChanged { chat_id });
    }

    pub async fn set_active_model(&self, model: &str) {
        {
            self.store.lock().active_chat_mut().model = model.to_string();
        }
        self.persist().await;
    }

    pub async fn set_active_system(&self, system: &str) {
        {
            self.store.lock().active_chat_mut().system = system.to_string();
        }
        self.persist().await;
    }

    pub async fn set_active_temperature(&self, temperature: f64) {
        {
            self.store.lock().active_chat_mut().temperature = temperature;
        }
        self.persist().await;
    }

    // ----- the send state machine -----

    /// Fire off one send operation. Any previously in-flight stream is
    /// superseded once this send reaches its streaming step.
    pub fn send(&self, user_text: String) {
        let session = self.clone();
        tokio::spawn(async move {
            session.send_inner(user_text).await;
        });
    }

    /// Explicit stop: raise the cancel flag on the in-flight stream. The
    /// worker observes it and runs the same failure path as a broken stream.
    pub fn stop(&self) {
        if self.streams.lock().cancel_active() {
            self.emit(SessionEvent::Status("Stopped".to_string()));
        }
    }

    async fn send_inner(&self, user_text: String) {
        let chat_id = self.active_chat_id();

        // Model resolution. The chat's stored model is the current
        // selection; only when there is none do we block on a fetch.
        let stored_model = self.store.lock().active_chat().model.clone();
        let model = if !stored_model.is_empty() {
            stored_model
        } else {
            self.emit(SessionEvent::Status("Loading models...".to_string()));
            let list = self.directory.fetch_with_retry().await;
            self.emit(SessionEvent::ModelsUpdated {
                models: list.clone(),
            });
            match ModelDirectory::choose(&list, None) {
                Some(model) => model,
                None => {
                    // Terminal for this call; the transcript is the audit log.
                    self.append_and_persist(
                        &chat_id,
                        Message::new(
                            Role::Assistant,
                            "Cannot send: no model selected (model list unavailable)",
                        ),
                    )
                    .await;
                    self.emit(SessionEvent::Status("Error".to_string()));
                    return;
                }
            }
        };

        // Snapshot settings into the chat and build the outbound list, then
        // persist before any network activity so settings survive failures.
        let request = {
            let mut store = self.store.lock();
            let Some(chat) = store.get_chat_mut(&chat_id) else {
                debug!(chat_id, "active chat disappeared before send");
                return;
            };
            chat.model = model.clone();

            let mut messages = Vec::new();
            let system = chat.system.trim();
            if !system.is_empty() {
                messages.push(Message::new(Role::System, system));
            }
            messages.extend(chat.messages.iter().cloned());
            messages.push(Message::new(Role::User, user_text.clone()));

            ChatRequest {
                model: model.clone(),
                messages,
                options: ChatOptions {
                    temperature: chat.temperature,
                },
            }
        };
        self.persist().await;

        // Only the user message is persisted; the outbound list never is.
        self.append_and_persist(&chat_id, Message::new(Role::User, user_text))
            .await;
        self.emit(SessionEvent::Status(format!("Thinking with {model}...")));

        // Supersede any in-flight stream, then attempt to stream.
        let cancel = self.streams.lock().begin(&chat_id);
        self.emit(SessionEvent::StreamStarted {
            chat_id: chat_id.clone(),
        });

        match self.backend.stream_chat(&request).await {
            Ok(mut stream) => {
                let mut accumulated = String::new();
                let mut stream_failed = false;
                loop {
                    // Revocation is checked around every increment; a raised
                    // flag fires the failure path as if the stream broke.
                    if cancel.load(Ordering::Relaxed) {
                        debug!(chat_id, "stream cancelled mid-read");
                        stream_failed = true;
                        break;
                    }
                    match stream.next().await {
                        Some(Ok(chunk)) => {
                            if !chunk.is_empty() {
                                accumulated.push_str(&chunk);
                                self.emit(SessionEvent::StreamDelta {
                                    chat_id: chat_id.clone(),
                                    text: chunk,
                                });
                            }
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "stream read failed, falling back to buffered");
                            stream_failed = true;
                            break;
                        }
                        None => break,
                    }
                }

                if !stream_failed {
                    let content = if accumulated.is_empty() {
                        EMPTY_RESPONSE_PLACEHOLDER.to_string()
                    } else {
                        accumulated
                    };
                    self.append_and_persist(&chat_id, Message::new(Role::Assistant, content))
                        .await;
                    self.emit(SessionEvent::StreamEnded {
                        chat_id,
                        status: StreamStatus::Completed,
                    });
                    self.emit(SessionEvent::Status("Ready".to_string()));
                    self.streams.lock().finish(&cancel);
                    return;
                }
                // The accumulator of a failed or cancelled stream is
                // discarded, never committed.
            }
            Err(e) => {
                warn!(error = %e, "streaming request failed, falling back to buffered");
            }
        }

        // Buffered fallback with the identical payload.
        let status = match self.backend.chat(&request).await {
            Ok(body) => {
                let content = if body.is_empty() {
                    EMPTY_RESPONSE_PLACEHOLDER.to_string()
                } else {
                    body
                };
                self.append_and_persist(&chat_id, Message::new(Role::Assistant, content))
                    .await;
                self.emit(SessionEvent::Status("Ready".to_string()));
                StreamStatus::Completed
            }
            Err(LlmError::Status { status, body }) => {
                let text = format!("Error: {status} {body}");
                self.append_and_persist(&chat_id, Message::new(Role::Assistant, text.clone()))
                    .await;
                self.emit(SessionEvent::Status("Error".to_string()));
                StreamStatus::Failed(text)
            }
            Err(e) => {
                let text = format!("Network error: {e}");
                self.append_and_persist(&chat_id, Message::new(Role::Assistant, text.clone()))
                    .await;
                self.emit(SessionEvent::Status("Error".to_string()));
                StreamStatus::Failed(text)
            }
        };
        self.emit(SessionEvent::StreamEnded { chat_id, status });
        self.streams.lock().finish(&cancel);
    }

    // ----- model list upkeep -----

    async fn apply_model_selection(&self, list: &[String]) {
        self.emit(SessionEvent::ModelsUpdated {
            models: list.to_vec(),
        });
        if list.is_empty() {
            self.emit(SessionEvent::Status("No models found".to_string()));
            return;
        }
        let preferred = {
            let store = self.store.lock();
            ModelDirectory::choose(list, Some(&store.active_chat().model))
        };
        if let Some(model) = preferred {
            {
                self.store.lock().active_chat_mut().model = model;
            }
            self.persist().await;
        }
        self.emit(SessionEvent::Status("Ready".to_string()));
    }

    fn spawn_self_heal(&self) {
        let session = self.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(SELF_HEAL_INITIAL_DELAY).await;
            session.heal_models().await;

            let mut ticker = tokio::time::interval(SELF_HEAL_INTERVAL);
            ticker.tick().await; // the first tick completes immediately
            loop {
                ticker.tick().await;
                session.heal_models().await;
            }
        });
        *self.heal_task.lock() = Some(handle);
    }

    /// Refetch the model list in the background when it has gone empty.
    async fn heal_models(&self) {
        if !self.directory.is_empty() {
            return;
        }
        if self.directory.refresh_if_idle().await {
            let list = self.directory.models();
            if !list.is_empty() {
                self.apply_model_selection(&list).await;
            }
        }
    }

    // ----- plumbing -----

    async fn append_and_persist(&self, chat_id: &str, message: Message) {
        let appended = self.store.lock().push_message(chat_id, message);
        if appended {
            self.persist().await;
            self.emit(SessionEvent::TranscriptChanged {
                chat_id: chat_id.to_string(),
            });
        }
    }

    /// Write-through of the full state. Last-write-wins; failures are
    /// logged and the session stays interactive.
    async fn persist(&self) {
        let data = self.store.lock().to_data();
        if let Err(e) = self.repository.save(data).await {
            warn!(error = %e, "failed to persist state");
        }
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.events.send(event);
    }
}
