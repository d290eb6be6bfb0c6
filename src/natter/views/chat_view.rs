use ratatui::Frame;
use ratatui::layout::Rect;
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, List, ListItem, ListState, Paragraph, Wrap};

use crate::natter::models::{Chat, Message, Role};

/// Sidebar listing the chats in display order, highlighting the active chat
/// and (when the sidebar has focus) the selection cursor.
pub fn draw_sidebar(
    frame: &mut Frame,
    area: Rect,
    chats: &[Chat],
    active_id: &str,
    selected: usize,
    focused: bool,
) {
    let items: Vec<ListItem> = chats
        .iter()
        .map(|chat| {
            let marker = if chat.id == active_id { "● " } else { "  " };
            let style = if chat.id == active_id {
                Style::default().fg(Color::Cyan)
            } else {
                Style::default()
            };
            ListItem::new(Line::from(vec![
                Span::raw(marker),
                Span::styled(chat.title.clone(), style),
            ]))
        })
        .collect();

    let border_style = if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let list = List::new(items)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_style(border_style)
                .title(" Chats "),
        )
        .highlight_style(Style::default().add_modifier(Modifier::REVERSED));

    let mut state = ListState::default();
    if focused && !chats.is_empty() {
        state.select(Some(selected.min(chats.len() - 1)));
    }
    frame.render_stateful_widget(list, area, &mut state);
}

/// Transcript pane: the committed messages of the active chat plus the live
/// streaming bubble (uncommitted assistant text), scrolled to the bottom
/// unless the user scrolled up.
pub fn draw_transcript(
    frame: &mut Frame,
    area: Rect,
    chat: &Chat,
    bubble: Option<&str>,
    scroll_up: u16,
) {
    let mut lines: Vec<Line> = Vec::new();
    for message in &chat.messages {
        lines.extend(message_lines(message));
    }
    if let Some(text) = bubble {
        lines.extend(bubble_lines(text));
    }

    let viewport = area.height.saturating_sub(2);
    let base = (lines.len() as u16).saturating_sub(viewport);
    let scroll = base.saturating_sub(scroll_up);

    let title = if chat.model.is_empty() {
        format!(" {} ", chat.title)
    } else {
        format!(" {} [{}] ", chat.title, chat.model)
    };
    let paragraph = Paragraph::new(lines)
        .block(Block::default().borders(Borders::ALL).title(title))
        .wrap(Wrap { trim: false })
        .scroll((scroll, 0));
    frame.render_widget(paragraph, area);
}

/// One-line status bar: status text on the left, selection summary on the
/// right.
pub fn draw_status(
    frame: &mut Frame,
    area: Rect,
    status: &str,
    model: &str,
    temperature: f64,
    streaming: bool,
) {
    let status_style = if streaming {
        Style::default().fg(Color::Yellow)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let model_label = if model.is_empty() { "(no model)" } else { model };
    let line = Line::from(vec![
        Span::styled(format!(" {status}"), status_style),
        Span::raw("  "),
        Span::styled(
            format!("model: {model_label}  temp: {temperature:.1}"),
            Style::default().fg(Color::DarkGray),
        ),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

fn message_lines(message: &Message) -> Vec<Line<'static>> {
    let (label, label_style, body_style) = match message.role {
        Role::User => (
            " you ",
            Style::default()
                .fg(Color::Black)
                .bg(Color::Cyan)
                .add_modifier(Modifier::BOLD),
            Style::default().fg(Color::Cyan),
        ),
        Role::Assistant => (
            " assistant ",
            Style::default()
                .fg(Color::Black)
                .bg(Color::Green)
                .add_modifier(Modifier::BOLD),
            Style::default(),
        ),
        Role::System => (
            " system ",
            Style::default().fg(Color::Black).bg(Color::DarkGray),
            Style::default().fg(Color::DarkGray),
        ),
    };

    let mut lines = vec![Line::from(Span::styled(label, label_style))];
    for l in message.content.lines() {
        lines.push(Line::from(Span::styled(format!("  {l}"), body_style)));
    }
    lines.push(Line::raw(""));
    lines
}

fn bubble_lines(text: &str) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from(Span::styled(
        " assistant… ",
        Style::default()
            .fg(Color::Black)
            .bg(Color::Yellow)
            .add_modifier(Modifier::BOLD),
    ))];
    if text.is_empty() {
        lines.push(Line::from(Span::styled(
            "  …",
            Style::default().fg(Color::DarkGray),
        )));
    } else {
        for l in text.lines() {
            lines.push(Line::from(Span::styled(
                format!("  {l}"),
                Style::default().fg(Color::Yellow),
            )));
        }
    }
    lines.push(Line::raw(""));
    lines
}
