//! Display-name prompt overlay.

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
};

use super::theme;
use crate::app::NameGateState;

/// Render the name prompt as a centered overlay on top of the panels.
pub fn render(frame: &mut Frame, area: Rect, gate: &NameGateState) {
    let popup = centered_rect(50, 30, area);
    frame.render_widget(Clear, popup);

    // Insert cursor character at cursor position
    let mut display_text = gate.input.clone();
    if gate.cursor >= display_text.len() {
        display_text.push('█');
    } else {
        display_text.insert(gate.cursor, '█');
    }

    let mut lines = vec![
        Line::from(Span::styled(
            "Pick a name others will see on your tasks.",
            theme::dimmed(),
        )),
        Line::from(""),
        Line::from(Span::styled(display_text, theme::normal())),
        Line::from(""),
    ];
    if let Some(error) = &gate.error {
        lines.push(Line::from(Span::styled(error.clone(), theme::error())));
    } else {
        lines.push(Line::from(Span::styled(
            "Enter: save | Esc: cancel",
            theme::dimmed(),
        )));
    }

    let block = Block::default()
        .title(Span::styled(
            "What's your name?",
            theme::panel_title(theme::HIGHLIGHT),
        ))
        .borders(Borders::ALL)
        .border_style(theme::highlighted());

    frame.render_widget(Paragraph::new(lines).block(block), popup);
}

/// A rectangle centered in `area`, sized by percentage on both axes.
fn centered_rect(percent_x: u16, percent_y: u16, area: Rect) -> Rect {
    let vertical = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Percentage((100 - percent_y) / 2),
            Constraint::Percentage(percent_y),
            Constraint::Percentage((100 - percent_y) / 2),
        ])
        .split(area);

    Layout::default()
        .direction(Direction::Horizontal)
        .constraints([
            Constraint::Percentage((100 - percent_x) / 2),
            Constraint::Percentage(percent_x),
            Constraint::Percentage((100 - percent_x) / 2),
        ])
        .split(vertical[1])[1]
}
