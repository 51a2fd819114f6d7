//! Recently-completed list rendering.

use chrono::{Local, TimeZone};
use ratatui::{
    Frame,
    layout::Rect,
    text::{Line, Span},
    widgets::{Block, Borders, List, ListItem},
};
use taskdeck_proto::ids::Timestamp;

use super::theme;
use crate::app::{App, Focus};

/// Render the recently-completed panel with reaction counts.
pub fn render(frame: &mut Frame, area: Rect, app: &App) {
    let is_focused = app.focus == Focus::Completed;

    let items: Vec<ListItem> = if app.completed.is_empty() {
        vec![ListItem::new(Line::from(Span::styled(
            "Nothing finished in the last three hours",
            theme::dimmed(),
        )))]
    } else {
        app.completed
            .iter()
            .enumerate()
            .map(|(index, task)| {
                let is_selected = index == app.completed_cursor;

                let mut spans = vec![
                    Span::styled("✓ ", theme::normal().fg(theme::SUCCESS)),
                    Span::styled(task.text.clone(), theme::normal()),
                    Span::styled(
                        format!(
                            "  {} · {}",
                            task.completed_by,
                            format_time(task.completed_at)
                        ),
                        theme::dimmed(),
                    ),
                ];
                if task.hearts > 0 {
                    spans.push(Span::styled(
                        format!(" ♥{}", task.hearts),
                        theme::normal().fg(theme::HEARTS),
                    ));
                }
                if task.celebrations > 0 {
                    spans.push(Span::styled(
                        format!(" 🎉{}", task.celebrations),
                        theme::normal().fg(theme::WARNING),
                    ));
                }

                let style = if is_selected && is_focused {
                    theme::selected()
                } else {
                    theme::normal()
                };
                ListItem::new(Line::from(spans)).style(style)
            })
            .collect()
    };

    let block = Block::default()
        .title(Span::styled(
            "Recently Completed",
            theme::panel_title(theme::COMPLETED_TITLE),
        ))
        .borders(Borders::ALL)
        .border_style(if is_focused {
            theme::highlighted()
        } else {
            theme::normal()
        });

    frame.render_widget(List::new(items).block(block), area);
}

/// Formats a completion time as local wall-clock `HH:MM`.
fn format_time(at: Timestamp) -> String {
    i64::try_from(at.as_millis())
        .ok()
        .and_then(|millis| Local.timestamp_millis_opt(millis).single())
        .map_or_else(|| at.to_string(), |time| time.format("%H:%M").to_string())
}
