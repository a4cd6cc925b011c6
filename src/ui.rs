use chrono::Local;
use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem, Paragraph},
    Frame,
};

use crate::app::{App, Focus};
use crate::formatting::{
    chat_preview, format_time, media_line, non_empty, truncate_to_width, wrap_text,
};
use crate::model::is_group_jid;

pub fn draw(f: &mut Frame, app: &App) {
    let has_status = app.status_message.is_some();
    let main_constraints = if has_status {
        vec![Constraint::Min(0), Constraint::Length(1)]
    } else {
        vec![Constraint::Min(0)]
    };
    let outer = Layout::default()
        .direction(Direction::Vertical)
        .constraints(main_constraints)
        .split(f.area());

    let total_width = outer[0].width;
    let sidebar_width = (total_width.saturating_mul(30) / 100).max(20);
    let chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Length(sidebar_width), Constraint::Min(0)])
        .split(outer[0]);

    draw_chat_list(f, app, chunks[0]);
    draw_thread(f, app, chunks[1]);

    if let Some(ref msg) = app.status_message {
        let status = Paragraph::new(msg.as_str())
            .style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
        f.render_widget(status, outer[1]);
    }
}

fn block<'a>(app: &App, title: String, focused: bool) -> Block<'a> {
    if !app.config.settings.show_borders {
        return Block::default().title(title);
    }
    let border_style = if focused {
        Style::default().fg(Color::Green)
    } else {
        Style::default()
    };
    Block::default()
        .borders(Borders::ALL)
        .title(title)
        .border_style(border_style)
}

fn draw_chat_list(f: &mut Frame, app: &App, area: Rect) {
    let session = &app.session;
    let searching = app.focus == Focus::Search;
    let list_focused = matches!(app.focus, Focus::ChatList | Focus::Search);

    let mut title = "Chats".to_string();
    if session.chats_loading() {
        title.push_str(" (refreshing)");
    }
    let outer = block(app, title, list_focused);
    let inner = outer.inner(area);
    f.render_widget(outer, area);

    let show_search = searching || !session.query().is_empty();
    let show_error = session.chats_error().is_some();
    let mut constraints = Vec::new();
    if show_search {
        constraints.push(Constraint::Length(1));
    }
    if show_error {
        constraints.push(Constraint::Length(1));
    }
    constraints.push(Constraint::Min(0));
    let rows = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(inner);
    let mut row = 0;

    if show_search {
        let cursor = if searching { "▏" } else { "" };
        let line = Paragraph::new(format!("Search: {}{}", session.query(), cursor))
            .style(Style::default().fg(Color::Cyan));
        f.render_widget(line, rows[row]);
        row += 1;
    }
    // The previous snapshot stays listed under the error.
    if let Some(err) = session.chats_error() {
        let line = Paragraph::new(format!("Failed to load chats: {}", err))
            .style(Style::default().fg(Color::Red));
        f.render_widget(line, rows[row]);
        row += 1;
    }
    let list_area = rows[row];

    let chats = session.visible_chats();
    if chats.is_empty() {
        let text = if !session.store().chats_loaded() {
            "Loading chats..."
        } else {
            "No chats found"
        };
        f.render_widget(
            Paragraph::new(text).style(Style::default().fg(Color::DarkGray)),
            list_area,
        );
        return;
    }

    let width = list_area.width.max(1) as usize;
    let now = Local::now();
    let items: Vec<ListItem> = chats
        .iter()
        .enumerate()
        .map(|(idx, chat)| {
            let is_active = session.selection().is_active(&chat.jid);
            let mut name_style = Style::default().add_modifier(Modifier::BOLD);
            if is_active {
                name_style = name_style.fg(Color::Yellow);
            }
            if idx == app.cursor && list_focused {
                name_style = name_style.add_modifier(Modifier::REVERSED);
            }

            let time = chat
                .last_message_time
                .as_deref()
                .map(|t| format_time(t, now))
                .unwrap_or_default();
            let badge = if chat.is_group_chat() { " [Group]" } else { "" };
            let name_width = width.saturating_sub(time.chars().count() + badge.len() + 1);
            let header = Line::from(vec![
                Span::styled(truncate_to_width(&chat.name, name_width), name_style),
                Span::styled(badge, Style::default().fg(Color::Cyan)),
                Span::raw(" "),
                Span::styled(time, Style::default().fg(Color::DarkGray)),
            ]);

            let preview_style = if non_empty(chat.media_type.as_deref()).is_some() {
                Style::default().fg(Color::Magenta)
            } else {
                Style::default().fg(Color::Gray)
            };
            let preview = Line::from(Span::styled(
                truncate_to_width(&chat_preview(chat), width),
                preview_style,
            ));
            ListItem::new(vec![header, preview])
        })
        .collect();

    f.render_widget(List::new(items), list_area);
}

fn draw_thread(f: &mut Frame, app: &App, area: Rect) {
    let session = &app.session;
    let Some(active_jid) = session.active_chat_jid() else {
        let welcome = Paragraph::new("Select a chat to start messaging")
            .block(block(app, "WhatsApp".to_string(), false))
            .style(Style::default().fg(Color::DarkGray));
        f.render_widget(welcome, area);
        return;
    };

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(3)])
        .split(area);

    let title = match session.active_chat() {
        Some(chat) => format!("{} ({})", chat.name, chat.jid),
        None => active_jid.to_string(),
    };
    let outer = block(app, title, false);
    let inner = outer.inner(chunks[0]);
    f.render_widget(outer, chunks[0]);

    let lines = thread_lines(app, active_jid, inner.width.max(1) as usize);
    // Newest at the bottom.
    let height = inner.height as usize;
    let skip = lines.len().saturating_sub(height);
    let visible: Vec<Line> = lines.into_iter().skip(skip).collect();
    f.render_widget(Paragraph::new(visible), inner);

    let input_title = if session.is_sending() {
        "Sending...".to_string()
    } else {
        "Message".to_string()
    };
    let cursor = if app.focus == Focus::Input { "▏" } else { "" };
    let input = Paragraph::new(format!("{}{}", app.input_buffer, cursor))
        .block(block(app, input_title, app.focus == Focus::Input));
    f.render_widget(input, chunks[1]);
}

fn thread_lines(app: &App, active_jid: &str, width: usize) -> Vec<Line<'static>> {
    let session = &app.session;
    let thread = session.active_thread();

    if thread.is_empty() {
        let text = if let Some(err) = session.messages_error() {
            format!("Failed to load messages: {}", err)
        } else if session.messages_loading() {
            "Loading messages...".to_string()
        } else {
            "No messages in this chat".to_string()
        };
        return vec![Line::from(Span::styled(text, Style::default().fg(Color::DarkGray)))];
    }

    let mut lines = Vec::new();
    if let Some(err) = session.messages_error() {
        lines.push(Line::from(Span::styled(
            format!("Failed to load messages: {}", err),
            Style::default().fg(Color::Red),
        )));
    }

    let group = is_group_jid(active_jid);
    let now = Local::now();
    for message in thread {
        let body_style = if message.is_from_me {
            Style::default().fg(Color::Green)
        } else {
            Style::default()
        };
        if group && !message.is_from_me {
            lines.push(Line::from(Span::styled(
                message.sender.clone(),
                Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD),
            )));
        }
        let prefix = if message.is_from_me { "> " } else { "  " };
        if let Some(content) = non_empty(message.content.as_deref()) {
            for (i, line) in wrap_text(content, prefix.len(), width).into_iter().enumerate() {
                let text = if i == 0 { format!("{}{}", prefix, line) } else { line };
                lines.push(Line::from(Span::styled(text, body_style)));
            }
        }
        if let Some(media) = media_line(message) {
            lines.push(Line::from(Span::styled(
                format!("{}{}", prefix, media),
                Style::default().fg(Color::Magenta),
            )));
        }
        if app.config.settings.show_timestamps {
            let mut time = format_time(&message.timestamp, now);
            if message.is_provisional() {
                time.push_str(" · pending");
            }
            lines.push(Line::from(Span::styled(
                format!("{}{}", prefix, time),
                Style::default().fg(Color::DarkGray),
            )));
        }
        lines.push(Line::default());
    }
    lines
}
