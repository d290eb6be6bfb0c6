use anyhow::Result;
use crossterm::event::{Event, EventStream, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use futures::StreamExt;
use ratatui::DefaultTerminal;
use ratatui::layout::{Constraint, Layout};
use ratatui::widgets::{Block, Borders};
use tokio::sync::mpsc;
use tui_textarea::TextArea;

use super::chat_view;
use crate::natter::controllers::{ChatSession, SessionEvent};
use crate::natter::models::{Chat, StreamStatus};

const TEMPERATURE_PRESETS: [f64; 5] = [0.0, 0.2, 0.5, 0.8, 1.0];
const SIDEBAR_WIDTH: u16 = 28;

#[derive(PartialEq)]
enum Focus {
    Composer,
    Sidebar,
}

enum Mode {
    Normal,
    /// Renaming the chat with this id; the textarea holds the title.
    Rename {
        chat_id: String,
        editor: TextArea<'static>,
    },
    /// Editing the active chat's system prompt.
    EditSystem {
        editor: TextArea<'static>,
    },
}

/// Terminal frontend: holds render snapshots of the session state and the
/// transient streaming bubble, and translates key events into session calls.
///
/// All chat state lives in the session; this struct only caches what the
/// last session event said is current.
pub struct TuiApp {
    session: ChatSession,
    composer: TextArea<'static>,
    focus: Focus,
    mode: Mode,
    sidebar_index: usize,
    chats: Vec<Chat>,
    active: Chat,
    models: Vec<String>,
    status: String,
    /// Uncommitted assistant text for the chat it belongs to. Discarded as
    /// soon as the committed message lands in the transcript.
    bubble: Option<(String, String)>,
    scroll_up: u16,
    should_quit: bool,
}

impl TuiApp {
    pub fn new(session: ChatSession) -> Self {
        let chats = session.chats_for_display();
        let active = session.active_chat();
        Self {
            session,
            composer: make_editor(" Message (Enter to send) "),
            focus: Focus::Composer,
            mode: Mode::Normal,
            sidebar_index: 0,
            chats,
            active,
            models: Vec::new(),
            status: "Loading models...".to_string(),
            bubble: None,
            scroll_up: 0,
            should_quit: false,
        }
    }

    pub async fn run(
        mut self,
        mut terminal: DefaultTerminal,
        mut session_events: mpsc::UnboundedReceiver<SessionEvent>,
    ) -> Result<()> {
        let mut input = EventStream::new();

        while !self.should_quit {
            terminal.draw(|frame| self.draw(frame))?;

            tokio::select! {
                event = input.next() => {
                    match event {
                        Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                            self.handle_key(key).await;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => return Err(e.into()),
                        None => break,
                    }
                }
                event = session_events.recv() => {
                    let Some(event) = event else { break };
                    self.handle_session_event(event);
                    // drain whatever else is already queued before redrawing
                    while let Ok(event) = session_events.try_recv() {
                        self.handle_session_event(event);
                    }
                }
            }
        }
        Ok(())
    }

    fn draw(&self, frame: &mut ratatui::Frame) {
        let [sidebar, main] =
            Layout::horizontal([Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(1)])
                .areas(frame.area());
        let [transcript, composer, status] = Layout::vertical([
            Constraint::Min(1),
            Constraint::Length(5),
            Constraint::Length(1),
        ])
        .areas(main);

        chat_view::draw_sidebar(
            frame,
            sidebar,
            &self.chats,
            &self.active.id,
            self.sidebar_index,
            self.focus == Focus::Sidebar,
        );

        let bubble = self
            .bubble
            .as_ref()
            .filter(|(chat_id, _)| *chat_id == self.active.id)
            .map(|(_, text)| text.as_str());
        chat_view::draw_transcript(frame, transcript, &self.active, bubble, self.scroll_up);

        match &self.mode {
            Mode::Normal => frame.render_widget(&self.composer, composer),
            Mode::Rename { editor, .. } | Mode::EditSystem { editor } => {
                frame.render_widget(editor, composer)
            }
        }

        chat_view::draw_status(
            frame,
            status,
            &self.status,
            &self.active.model,
            self.active.temperature,
            self.session.is_streaming(),
        );
    }

    async fn handle_key(&mut self, key: KeyEvent) {
        // editing modes capture everything except commit/cancel
        match &mut self.mode {
            Mode::Rename { chat_id, editor } => {
                match key.code {
                    KeyCode::Enter => {
                        let title = editor.lines().join(" ");
                        let chat_id = chat_id.clone();
                        self.mode = Mode::Normal;
                        self.session.rename_chat(&chat_id, &title).await;
                    }
                    KeyCode::Esc => self.mode = Mode::Normal,
                    _ => {
                        editor.input(key);
                    }
                }
                return;
            }
            Mode::EditSystem { editor } => {
                match key.code {
                    KeyCode::Enter => {
                        let system = editor.lines().join("\n");
                        self.mode = Mode::Normal;
                        self.session.set_active_system(&system).await;
                        self.active = self.session.active_chat();
                    }
                    KeyCode::Esc => self.mode = Mode::Normal,
                    _ => {
                        editor.input(key);
                    }
                }
                return;
            }
            Mode::Normal => {}
        }

        if key.modifiers.contains(KeyModifiers::CONTROL) {
            match key.code {
                KeyCode::Char('q') | KeyCode::Char('c') => {
                    self.should_quit = true;
                }
                KeyCode::Char('l') => {
                    self.session.clear_active_chat().await;
                }
                KeyCode::Char('p') => {
                    let mut editor = make_editor(" System prompt (Enter to save, Esc to cancel) ");
                    editor.insert_str(&self.active.system);
                    self.mode = Mode::EditSystem { editor };
                }
                KeyCode::Char('o') => self.cycle_model().await,
                KeyCode::Char('t') => self.cycle_temperature().await,
                _ => {}
            }
            return;
        }

        match key.code {
            KeyCode::Tab => {
                self.focus = match self.focus {
                    Focus::Composer => Focus::Sidebar,
                    Focus::Sidebar => Focus::Composer,
                };
            }
            KeyCode::Esc => self.session.stop(),
            KeyCode::PageUp => self.scroll_up = self.scroll_up.saturating_add(5),
            KeyCode::PageDown => self.scroll_up = self.scroll_up.saturating_sub(5),
            _ => match self.focus {
                Focus::Sidebar => self.handle_sidebar_key(key).await,
                Focus::Composer => self.handle_composer_key(key),
            },
        }
    }

    async fn handle_sidebar_key(&mut self, key: KeyEvent) {
        match key.code {
            KeyCode::Up => {
                self.sidebar_index = self.sidebar_index.saturating_sub(1);
            }
            KeyCode::Down => {
                if self.sidebar_index + 1 < self.chats.len() {
                    self.sidebar_index += 1;
                }
            }
            KeyCode::Enter => {
                if let Some(chat) = self.chats.get(self.sidebar_index) {
                    let id = chat.id.clone();
                    self.session.switch_chat(&id).await;
                    self.focus = Focus::Composer;
                }
            }
            KeyCode::Char('n') => {
                self.session.create_chat().await;
                self.focus = Focus::Composer;
            }
            KeyCode::Char('d') => {
                if let Some(chat) = self.chats.get(self.sidebar_index) {
                    let id = chat.id.clone();
                    self.session.delete_chat(&id).await;
                }
            }
            KeyCode::Char('r') => {
                if let Some(chat) = self.chats.get(self.sidebar_index) {
                    let mut editor = make_editor(" Rename chat (Enter to save, Esc to cancel) ");
                    editor.insert_str(&chat.title);
                    self.mode = Mode::Rename {
                        chat_id: chat.id.clone(),
                        editor,
                    };
                }
            }
            _ => {}
        }
    }

    fn handle_composer_key(&mut self, key: KeyEvent) {
        // plain Enter sends; Alt+Enter inserts a newline through the textarea
        if key.code == KeyCode::Enter && !key.modifiers.contains(KeyModifiers::ALT) {
            let text = self.composer.lines().join("\n");
            if !text.trim().is_empty() {
                self.session.send(text);
                self.composer = make_editor(" Message (Enter to send) ");
                self.scroll_up = 0;
            }
            return;
        }
        self.composer.input(key);
    }

    async fn cycle_model(&mut self) {
        if self.models.is_empty() {
            return;
        }
        let next = match self.models.iter().position(|m| *m == self.active.model) {
            Some(i) => (i + 1) % self.models.len(),
            None => 0,
        };
        let model = self.models[next].clone();
        self.session.set_active_model(&model).await;
        self.active = self.session.active_chat();
    }

    async fn cycle_temperature(&mut self) {
        let current = self.active.temperature;
        let next = match TEMPERATURE_PRESETS
            .iter()
            .position(|p| (p - current).abs() < f64::EPSILON)
        {
            Some(i) => TEMPERATURE_PRESETS[(i + 1) % TEMPERATURE_PRESETS.len()],
            None => TEMPERATURE_PRESETS[0],
        };
        self.session.set_active_temperature(next).await;
        self.active = self.session.active_chat();
    }

    fn handle_session_event(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::ChatsChanged => {
                self.refresh_snapshots();
            }
            SessionEvent::TranscriptChanged { chat_id } => {
                // the committed message replaces the bubble
                if self.bubble.as_ref().is_some_and(|(id, _)| *id == chat_id) {
                    self.bubble = None;
                }
                self.refresh_snapshots();
                self.scroll_up = 0;
            }
            SessionEvent::StreamStarted { chat_id } => {
                self.bubble = Some((chat_id, String::new()));
            }
            SessionEvent::StreamDelta { chat_id, text } => {
                match &mut self.bubble {
                    Some((id, acc)) if *id == chat_id => acc.push_str(&text),
                    _ => self.bubble = Some((chat_id, text)),
                }
                self.scroll_up = 0;
            }
            SessionEvent::StreamEnded { chat_id, status } => {
                if self.bubble.as_ref().is_some_and(|(id, _)| *id == chat_id) {
                    self.bubble = None;
                }
                if let StreamStatus::Failed(reason) = status {
                    tracing::debug!(reason, "stream ended with failure");
                }
            }
            SessionEvent::ModelsUpdated { models } => {
                self.models = models;
            }
            SessionEvent::Status(status) => {
                self.status = status;
            }
        }
    }

    fn refresh_snapshots(&mut self) {
        self.chats = self.session.chats_for_display();
        self.active = self.session.active_chat();
        if !self.chats.is_empty() {
            self.sidebar_index = self.sidebar_index.min(self.chats.len() - 1);
        }
    }
}

fn make_editor(title: &str) -> TextArea<'static> {
    let mut editor = TextArea::default();
    editor.set_block(
        Block::default()
            .borders(Borders::ALL)
            .title(title.to_string()),
    );
    editor.set_cursor_line_style(ratatui::style::Style::default());
    editor
}
