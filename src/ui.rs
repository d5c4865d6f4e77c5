use ratatui::{
    layout::{Constraint, Direction, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
    Frame,
};

use crate::app::{App, MenuSection};
use crate::modules::activity::Level;
use crate::modules::api::format_cursor;
use crate::modules::notifications::{Notification, PreferenceToggle, Priority};
use crate::modules::toast::{Toast, stack_offset};

const TOAST_WIDTH: u16 = 48;
const TOAST_HEIGHT: u16 = 4;

pub fn draw(f: &mut Frame, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Min(0),
            Constraint::Length(4),
        ])
        .split(f.area());

    draw_title(f, chunks[0], app);

    let main_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(20), Constraint::Percentage(80)])
        .split(chunks[1]);

    draw_menu(f, app, main_chunks[0]);

    match app.current_section {
        MenuSection::Inbox => draw_inbox(f, app, main_chunks[1]),
        MenuSection::Preferences => draw_preferences(f, app, main_chunks[1]),
        MenuSection::Activity => draw_activity(f, app, main_chunks[1]),
    }

    draw_status(f, app, chunks[2]);
    if !app.center.toasts.is_empty() {
        draw_toasts(f, app.center.toasts.visible(), chunks[1]);
    }

    if app.show_help {
        draw_help_popup(f);
    }
}

fn draw_title(f: &mut Frame, area: Rect, app: &App) {
    let center = &app.center;
    let state = if center.loading {
        "loading"
    } else if center.is_polling() {
        "polling"
    } else {
        "idle"
    };
    let mut spans = vec![
        Span::styled("notifdesk", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD)),
        Span::raw(format!(
            " | unread: {} | since: {} | {}",
            center.cache.unread_count,
            format_cursor(center.cursor()),
            state
        )),
    ];
    if let Some(err) = &center.error {
        spans.push(Span::styled(format!(" | {}", err), Style::default().fg(Color::Red)));
    }

    let title = Paragraph::new(Line::from(spans)).block(Block::default().borders(Borders::ALL));
    f.render_widget(title, area);
}

fn draw_menu(f: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = MenuSection::ALL
        .iter()
        .enumerate()
        .map(|(i, section)| {
            let style = if *section == app.current_section {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            let label = match section {
                MenuSection::Inbox => format!("{} {} ({})", i + 1, section.title(), app.center.cache.unread_count),
                _ => format!("{} {}", i + 1, section.title()),
            };
            ListItem::new(label).style(style)
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title("Menu")
            .borders(Borders::ALL)
            .border_style(Style::default().fg(Color::White)),
    );
    f.render_widget(list, area);
}

fn priority_color(priority: Priority) -> Color {
    match priority {
        Priority::Low => Color::Gray,
        Priority::Medium => Color::Blue,
        Priority::High => Color::Yellow,
        Priority::Urgent => Color::Red,
    }
}

fn draw_inbox(f: &mut Frame, app: &App, area: Rect) {
    let items = &app.center.cache.items;
    if app.center.cache.is_empty() {
        let text = if app.center.loading { "Loading notifications..." } else { "No notifications yet" };
        let empty = Paragraph::new(text).block(Block::default().title("Inbox").borders(Borders::ALL));
        f.render_widget(empty, area);
        return;
    }

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Min(0), Constraint::Length(6)])
        .split(area);

    let window_height = chunks[0].height.saturating_sub(2) as usize;
    let start = app.selected_index.saturating_sub(window_height / 2);
    let end = usize::min(start + window_height, items.len());

    let rows: Vec<ListItem> = items[start..end]
        .iter()
        .enumerate()
        .map(|(offset, n)| {
            let i = start + offset;
            let mut style = Style::default();
            if !n.is_read {
                style = style.add_modifier(Modifier::BOLD);
            }
            if i == app.selected_index {
                style = style.fg(Color::Yellow);
            }
            let marker = if n.is_read { " " } else { "●" };
            ListItem::new(Line::from(vec![
                Span::raw(format!("{} [{}] ", marker, n.timestamp.format("%m-%d %H:%M"))),
                Span::styled(format!("{:<7}", n.priority.label()), Style::default().fg(priority_color(n.priority))),
                Span::raw(format!(" {} - {}", n.title, n.message)),
            ]))
            .style(style)
        })
        .collect();

    let list = List::new(rows).block(
        Block::default()
            .title("Inbox (Enter/o: details, m: mark read, M: mark all, p: poll, r: reload)")
            .borders(Borders::ALL),
    );
    f.render_widget(list, chunks[0]);

    if let Some(n) = items.get(app.selected_index) {
        draw_detail(f, n, chunks[1]);
    }
}

fn draw_detail(f: &mut Frame, n: &Notification, area: Rect) {
    let mut lines = vec![
        Line::from(Span::styled(n.title.as_str(), Style::default().add_modifier(Modifier::BOLD))),
        Line::from(n.message.as_str()),
        Line::from(format!("type: {} | priority: {} | id: {}", n.kind.as_str(), n.priority.label(), n.id)),
    ];
    if let Some(link) = &n.action_url {
        lines.push(Line::from(Span::styled(
            format!("View Details: {}", link),
            Style::default().fg(Color::Cyan),
        )));
    }
    let detail = Paragraph::new(lines)
        .block(Block::default().title("Details").borders(Borders::ALL))
        .wrap(Wrap { trim: true });
    f.render_widget(detail, area);
}

fn draw_preferences(f: &mut Frame, app: &App, area: Rect) {
    let prefs = &app.center.preferences;
    let items: Vec<ListItem> = PreferenceToggle::ALL
        .iter()
        .enumerate()
        .map(|(i, toggle)| {
            let style = if i == app.selected_index {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            let mark = if prefs.get(*toggle) { "[x]" } else { "[ ]" };
            let indent = if matches!(toggle, PreferenceToggle::Category(_)) { "    " } else { "" };
            ListItem::new(format!("{}{} {}", indent, mark, toggle.label())).style(style)
        })
        .collect();

    let list = List::new(items).block(
        Block::default()
            .title("Preferences (Space/Enter: toggle and save)")
            .borders(Borders::ALL),
    );
    f.render_widget(list, area);
}

fn draw_activity(f: &mut Frame, app: &App, area: Rect) {
    let items: Vec<ListItem> = app
        .activity
        .items
        .iter()
        .enumerate()
        .map(|(i, n)| {
            let style = if i == app.selected_index {
                Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD)
            } else {
                Style::default()
            };
            let level_icon = match n.level {
                Level::Error => "❌",
                Level::Warning => "⚠️",
                Level::Info => "ℹ️",
            };
            ListItem::new(format!(
                "{} [{}] {} - {}",
                level_icon,
                n.timestamp.format("%H:%M:%S"),
                n.title,
                n.message
            ))
            .style(style)
        })
        .collect();

    let title = match app.pending_error_reports() {
        0 => "Activity".to_string(),
        n => format!("Activity ({} error report(s) waiting to upload)", n),
    };
    if items.is_empty() {
        let empty = Paragraph::new("Nothing happened yet")
            .block(Block::default().title(title).borders(Borders::ALL));
        f.render_widget(empty, area);
    } else {
        let list = List::new(items).block(Block::default().title(title).borders(Borders::ALL));
        f.render_widget(list, area);
    }
}

/// Top-right toast stack. Index 0 is rendered last so it sits on top.
fn draw_toasts(f: &mut Frame, toasts: &[Toast], area: Rect) {
    let width = TOAST_WIDTH.min(area.width);
    for (i, toast) in toasts.iter().enumerate().rev() {
        let y = area.y + (i as u16) * TOAST_HEIGHT + stack_offset(i);
        if y + TOAST_HEIGHT > area.y + area.height {
            continue;
        }
        let rect = Rect { x: area.x + area.width - width, y, width, height: TOAST_HEIGHT };
        let n = &toast.notification;
        let mut border = Style::default().fg(priority_color(n.priority));
        if toast.is_exiting() {
            border = border.add_modifier(Modifier::DIM);
        }
        let title = if n.priority.is_urgent() { "URGENT (x to dismiss)" } else { "New" };
        let mut lines = vec![
            Line::from(Span::styled(n.title.as_str(), Style::default().add_modifier(Modifier::BOLD))),
            Line::from(n.message.as_str()),
        ];
        if n.action_url.is_some() {
            lines[1] = Line::from(format!("{} (View Details)", n.message));
        }
        let widget = Paragraph::new(lines)
            .block(Block::default().title(title).borders(Borders::ALL).border_style(border))
            .wrap(Wrap { trim: true });
        f.render_widget(Clear, rect);
        f.render_widget(widget, rect);
    }
}

fn draw_status(f: &mut Frame, app: &App, area: Rect) {
    let help_text = "q: Quit | Tab: Next Section | ↑↓/jk: Navigate | Enter: Select | x/X: Dismiss toast(s) | T: Test | ?: Help";

    let status = Paragraph::new(vec![
        Line::from(app.status_message.as_str()),
        Line::from(help_text),
    ])
    .block(Block::default().borders(Borders::ALL));

    f.render_widget(status, area);
}

fn centered_rect(percent_x: u16, percent_y: u16, r: Rect) -> Rect {
    let popup_layout = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(r);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(popup_layout[1])[1]
}

fn draw_help_popup(f: &mut Frame) {
    let area = centered_rect(70, 70, f.area());
    let help = "notifdesk Help\n\nKeys:\n  q / Ctrl-C: Quit\n  Tab / Shift-Tab, 1-3: Switch section\n  j/k or ↑/↓, Home/End: Navigate\n  Enter / o: Open details link (Inbox), toggle (Preferences)\n  Space: Toggle preference\n  m: Mark selected read\n  M: Mark all read\n  p: Poll now\n  r: Reload everything\n  T: Ask the server for a test notification\n  x: Dismiss top toast\n  X: Dismiss all toasts\n  ?: Toggle this help";

    let paragraph = Paragraph::new(help)
        .block(
            Block::default()
                .title("Help")
                .borders(Borders::ALL)
                .border_style(Style::default().fg(Color::Cyan)),
        )
        .wrap(Wrap { trim: false });

    f.render_widget(Clear, area);
    f.render_widget(paragraph, area);
}
