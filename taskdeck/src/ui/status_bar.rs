//! Status bar rendering.

use ratatui::{
    Frame,
    layout::Rect,
    text::{Line, Span},
    widgets::Paragraph,
};

use super::theme;
use crate::app::{App, Focus};

/// Render the status bar at the bottom of the screen.
pub fn render(frame: &mut Frame, area: Rect, app: &App) {
    let help_text = if app.name_gate.is_some() {
        "Enter: save name | Esc: cancel"
    } else {
        match app.focus {
            Focus::Slot(index) if index < app.active.len() => {
                "x: done | d: delete | t: timer | p: pause | Shift-↑↓: move | Tab: panel"
            }
            Focus::Slot(_) => "type a task | Enter: add | Ctrl+T: timer | Tab: panel",
            Focus::Completed => "↑↓: browse | h: heart | c: celebrate | Tab: panel",
        }
    };

    let (dot_color, status_text) = if app.connected {
        (theme::SUCCESS, app.connection_detail.as_str())
    } else if app.connection_detail.is_empty() {
        (theme::OFFLINE, "connecting...")
    } else {
        (theme::OFFLINE, app.connection_detail.as_str())
    };

    let mut spans = vec![
        Span::styled("TaskDeck", theme::bold()),
        Span::raw(" | "),
        Span::styled("●", theme::normal().fg(dot_color)),
        Span::raw(format!(" {status_text}")),
    ];

    match &app.display_name {
        Some(name) => {
            spans.push(Span::raw(" | "));
            spans.push(Span::styled(name.clone(), theme::normal().fg(theme::HIGHLIGHT)));
        }
        None => {
            spans.push(Span::raw(" | "));
            spans.push(Span::styled("no name yet", theme::dimmed()));
        }
    }
    if app.preview {
        spans.push(Span::styled(" [preview]", theme::normal().fg(theme::WARNING)));
    }
    match app.breakout {
        Some(true) => {
            spans.push(Span::raw(" | "));
            spans.push(Span::styled(
                "breakouts: in",
                theme::normal().fg(theme::SUCCESS),
            ));
        }
        Some(false) => {
            spans.push(Span::raw(" | "));
            spans.push(Span::styled("breakouts: out", theme::dimmed()));
        }
        None => {}
    }

    spans.push(Span::raw(" | "));
    if let Some(flash) = &app.flash {
        spans.push(Span::styled(
            flash.message.clone(),
            theme::normal().fg(theme::WARNING),
        ));
    } else {
        spans.push(Span::styled(help_text, theme::dimmed()));
    }

    let paragraph = Paragraph::new(Line::from(spans)).style(theme::status_bar_bg());
    frame.render_widget(paragraph, area);
}
