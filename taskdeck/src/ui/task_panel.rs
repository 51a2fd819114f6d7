//! Task slot rendering.
//!
//! Each of the three slots draws either the active task at its position or
//! a draft input box, plus the slot's timer line.

use ratatui::{
    Frame,
    layout::{Constraint, Direction, Layout, Rect},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph},
};
use taskdeck_proto::records::TaskRecord;

use super::theme;
use crate::app::{App, Focus, SlotState};
use crate::tasks::MAX_ACTIVE_TASKS;
use crate::timer::{PRESET_MINUTES, TaskTimer, TimerPhase};

/// Render the three task slots, stacked vertically.
pub fn render(frame: &mut Frame, area: Rect, app: &App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([Constraint::Ratio(1, 3); MAX_ACTIVE_TASKS])
        .split(area);

    for (index, chunk) in chunks.iter().enumerate() {
        render_slot(frame, *chunk, app, index);
    }
}

/// Render one slot: a saved task or a draft editor.
fn render_slot(frame: &mut Frame, area: Rect, app: &App, index: usize) {
    let is_focused = app.focus == Focus::Slot(index);
    let slot = &app.slots[index];

    let block = Block::default()
        .title(Span::styled(
            format!("Task {}", index + 1),
            theme::panel_title(theme::TASKS_TITLE),
        ))
        .borders(Borders::ALL)
        .border_style(if is_focused {
            theme::highlighted()
        } else {
            theme::normal()
        });

    let lines = match app.active.get(index) {
        Some(task) => task_lines(task, slot, is_focused),
        None => draft_lines(slot, is_focused),
    };

    frame.render_widget(Paragraph::new(lines).block(block), area);
}

/// Lines for a slot bound to a saved task.
fn task_lines(task: &TaskRecord, slot: &SlotState, is_focused: bool) -> Vec<Line<'static>> {
    let mut lines = vec![Line::from(Span::styled(task.text.clone(), theme::bold()))];
    if !task.owner_name.is_empty() {
        lines.push(Line::from(Span::styled(
            format!("added by {}", task.owner_name),
            theme::dimmed(),
        )));
    }
    lines.extend(timer_lines(&slot.timer, is_focused, false));
    lines
}

/// Lines for a slot acting as a draft editor.
fn draft_lines(slot: &SlotState, is_focused: bool) -> Vec<Line<'static>> {
    let mut display_text = slot.draft.clone();
    if is_focused {
        // Insert cursor character at cursor position
        if slot.cursor >= display_text.len() {
            display_text.push('█');
        } else {
            display_text.insert(slot.cursor, '█');
        }
    }

    let input_line = if display_text.is_empty() {
        Line::from(Span::styled("Type a task...", theme::dimmed()))
    } else {
        Line::from(Span::styled(display_text, theme::normal()))
    };

    let mut lines = vec![input_line];
    lines.extend(timer_lines(&slot.timer, is_focused, true));
    lines
}

/// The timer readout for a slot, varying with the timer phase.
fn timer_lines(timer: &TaskTimer, is_focused: bool, is_draft: bool) -> Vec<Line<'static>> {
    match timer.phase() {
        TimerPhase::Idle => {
            if is_focused {
                let hint = if is_draft { "Ctrl+T: timer" } else { "t: timer" };
                vec![Line::from(Span::styled(hint, theme::dimmed()))]
            } else {
                Vec::new()
            }
        }
        TimerPhase::Running => vec![Line::from(Span::styled(
            format!("⏱ {}", format_clock(timer.remaining_seconds())),
            theme::normal().fg(theme::TIMER),
        ))],
        TimerPhase::Paused => vec![Line::from(vec![
            Span::styled(
                format!("⏱ {}", format_clock(timer.remaining_seconds())),
                theme::dimmed(),
            ),
            Span::styled(" paused", theme::normal().fg(theme::WARNING)),
        ])],
        TimerPhase::Selecting => picker_lines(timer),
    }
}

/// The length-picker row plus an error line when the custom input is bad.
fn picker_lines(timer: &TaskTimer) -> Vec<Line<'static>> {
    let custom_active = !timer.custom_input().is_empty();
    let mut spans = vec![Span::styled("timer: ", theme::dimmed())];
    for (index, minutes) in PRESET_MINUTES.iter().enumerate() {
        let label = format!(" {minutes}m ");
        if index == timer.preset_cursor() && !custom_active {
            spans.push(Span::styled(label, theme::selected()));
        } else {
            spans.push(Span::styled(label, theme::normal()));
        }
        spans.push(Span::raw(" "));
    }
    spans.push(Span::styled(
        format!("custom: {}█", timer.custom_input()),
        if custom_active {
            theme::normal()
        } else {
            theme::dimmed()
        },
    ));

    let mut lines = vec![Line::from(spans)];
    if let Some(error) = timer.input_error() {
        lines.push(Line::from(Span::styled(error.to_string(), theme::error())));
    }
    lines
}

/// Formats remaining seconds as `MM:SS`.
fn format_clock(remaining: Option<u32>) -> String {
    let seconds = remaining.unwrap_or(0);
    format!("{:02}:{:02}", seconds / 60, seconds % 60)
}
