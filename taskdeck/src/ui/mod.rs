//! Terminal UI rendering.

pub mod completed_panel;
pub mod name_prompt;
pub mod status_bar;
pub mod task_panel;
pub mod theme;

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout},
    text::{Line, Span},
    widgets::Paragraph,
};

use crate::app::App;

/// Banner messages cycled through on consecutive completions.
const CELEBRATION_MESSAGES: [&str; 3] = [
    "🎉 Task complete — great work!",
    "✨ Another one done!",
    "🌟 Keep it rolling!",
];

/// Main draw function for the entire UI.
pub fn draw(frame: &mut Frame, app: &App) {
    // Create main layout: celebration banner (when active), content,
    // status bar at the bottom.
    let banner_height = if app.celebration.is_some() { 1 } else { 0 };
    let main_chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(banner_height),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(frame.area());

    if let Some(celebration) = app.celebration {
        let message = CELEBRATION_MESSAGES[celebration.style % CELEBRATION_MESSAGES.len()];
        let banner =
            Paragraph::new(Line::from(Span::styled(message, theme::celebration(celebration.style))))
                .centered();
        frame.render_widget(banner, main_chunks[0]);
    }

    // Task slots on the left, recently completed on the right.
    let content_chunks = Layout::default()
        .direction(Direction::Horizontal)
        .constraints([Constraint::Percentage(60), Constraint::Percentage(40)])
        .split(main_chunks[1]);

    task_panel::render(frame, content_chunks[0], app);
    completed_panel::render(frame, content_chunks[1], app);
    status_bar::render(frame, main_chunks[2], app);

    // The overlay paints over the panels, so it draws last.
    if let Some(gate) = &app.name_gate {
        name_prompt::render(frame, frame.area(), gate);
    }
}
