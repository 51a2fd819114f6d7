//! Theme and styling constants for the TUI.

use ratatui::style::{Color, Modifier, Style};

/// Primary foreground color.
pub const FG_PRIMARY: Color = Color::White;

/// Secondary foreground color (dimmed text).
pub const FG_SECONDARY: Color = Color::Gray;

/// Highlight color for focused elements.
pub const HIGHLIGHT: Color = Color::Cyan;

/// Success/connected indicator color.
pub const SUCCESS: Color = Color::Green;

/// Warning indicator color.
pub const WARNING: Color = Color::Yellow;

/// Error text color.
pub const ERROR: Color = Color::Red;

/// Offline indicator color.
pub const OFFLINE: Color = Color::DarkGray;

/// Heart reaction color.
pub const HEARTS: Color = Color::LightRed;

/// Running timer readout color.
pub const TIMER: Color = Color::LightYellow;

/// Panel title color for the task slots.
pub const TASKS_TITLE: Color = Color::Green;

/// Panel title color for the recently-completed list.
pub const COMPLETED_TITLE: Color = Color::Magenta;

/// Celebration banner colors, one per style index.
pub const CELEBRATION_COLORS: [Color; 3] = [Color::Yellow, Color::LightMagenta, Color::LightCyan];

/// Normal text style.
#[must_use]
pub fn normal() -> Style {
    Style::default().fg(FG_PRIMARY)
}

/// Dimmed text style (timestamps, metadata, hints).
#[must_use]
pub fn dimmed() -> Style {
    Style::default().fg(FG_SECONDARY)
}

/// Bold text style.
#[must_use]
pub fn bold() -> Style {
    Style::default().fg(FG_PRIMARY).add_modifier(Modifier::BOLD)
}

/// Highlighted text style (focused panel borders).
#[must_use]
pub fn highlighted() -> Style {
    Style::default().fg(HIGHLIGHT).add_modifier(Modifier::BOLD)
}

/// Selected item style (in lists and pickers).
#[must_use]
pub fn selected() -> Style {
    Style::default()
        .fg(Color::Black)
        .bg(HIGHLIGHT)
        .add_modifier(Modifier::BOLD)
}

/// Style for the status bar background.
#[must_use]
pub fn status_bar_bg() -> Style {
    Style::default().fg(Color::White).bg(Color::Rgb(30, 30, 50))
}

/// Style for panel titles with a given color (bold).
#[must_use]
pub fn panel_title(color: Color) -> Style {
    Style::default().fg(color).add_modifier(Modifier::BOLD)
}

/// Style for the celebration banner at a given style index.
#[must_use]
pub fn celebration(style: usize) -> Style {
    Style::default()
        .fg(CELEBRATION_COLORS[style % CELEBRATION_COLORS.len()])
        .add_modifier(Modifier::BOLD)
}

/// Style for inline error text.
#[must_use]
pub fn error() -> Style {
    Style::default().fg(ERROR)
}
