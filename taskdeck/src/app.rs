//! Application state and event handling.
//!
//! [`App`] owns everything the renderer draws: the three task slots, the
//! recently-completed view, the name gate, timers, and transient banners.
//! Input handling is split in two stages: global chords first, then a
//! dispatch on the focused panel. Handlers never talk to the network
//! directly; they return a [`NetCommand`] for the runtime loop to forward.

use std::sync::Arc;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use taskdeck_proto::ids::TaskId;
use taskdeck_proto::records::{CompletedTask, ReactionKind, TaskRecord};
use tokio::sync::{mpsc, watch};

use crate::effects::Chime;
use crate::net::{AddRejection, NetCommand, NetEvent};
use crate::tasks::{Debouncer, DraftCommit, MAX_ACTIVE_TASKS};
use crate::timer::{GlobalTimerStore, TaskTimer, TimerEvent, TimerOwner, TimerPhase, TimerSlot};

/// Celebration banner styles cycled through on consecutive completions.
pub const CELEBRATION_STYLES: usize = 3;

/// Loop iterations a celebration banner stays on screen.
pub const CELEBRATION_TICKS: u8 = 40;

/// Loop iterations a flash message stays on screen.
pub const FLASH_TICKS: u8 = 60;

/// Which panel receives non-global key presses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    /// One of the three task slots, by index.
    Slot(usize),
    /// The recently-completed list.
    Completed,
}

/// One of the three task slots.
///
/// A slot either mirrors a row from the active list (same index) or acts as
/// a draft editor for a task not yet saved. The timer belongs to the slot
/// and follows the task it is bound to across reorders.
pub struct SlotState {
    pub draft: String,
    pub cursor: usize,
    pub timer: TaskTimer,
}

/// State of the display-name prompt overlay.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct NameGateState {
    pub input: String,
    pub cursor: usize,
    pub error: Option<String>,
}

/// A short-lived status-bar message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Flash {
    pub message: String,
    pub ticks_left: u8,
}

/// The completion banner currently on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Celebration {
    pub style: usize,
    pub ticks_left: u8,
}

/// Holds the full client-side state of the task deck.
pub struct App {
    pub focus: Focus,
    pub slots: Vec<SlotState>,
    pub active: Vec<TaskRecord>,
    pub completed: Vec<CompletedTask>,
    pub completed_cursor: usize,
    pub name_gate: Option<NameGateState>,
    pub celebration: Option<Celebration>,
    pub flash: Option<Flash>,
    pub connected: bool,
    pub connection_detail: String,
    pub display_name: Option<String>,
    pub preview: bool,
    pub breakout: Option<bool>,
    pub should_quit: bool,
    name_hint: Option<String>,
    queued_add: Option<String>,
    pending_add_slot: Option<usize>,
    breakout_busy: bool,
    debouncer: Debouncer,
    debounce_slot: Option<usize>,
    celebration_count: usize,
    timers: Arc<GlobalTimerStore>,
    timer_watch: watch::Receiver<TimerSlot>,
    timer_events: mpsc::UnboundedSender<TimerEvent>,
    chime: Arc<dyn Chime>,
    next_draft_id: u64,
}

impl App {
    /// Creates the initial state: three empty draft slots, focus on the
    /// first one. `name_hint` pre-fills the name gate if it ever opens.
    #[must_use]
    pub fn new(
        name_hint: Option<String>,
        chime: Arc<dyn Chime>,
        timer_events: mpsc::UnboundedSender<TimerEvent>,
        draft_events: mpsc::UnboundedSender<DraftCommit>,
    ) -> Self {
        let timers = Arc::new(GlobalTimerStore::new());
        let timer_watch = timers.subscribe();
        let mut app = Self {
            focus: Focus::Slot(0),
            slots: Vec::with_capacity(MAX_ACTIVE_TASKS),
            active: Vec::new(),
            completed: Vec::new(),
            completed_cursor: 0,
            name_gate: None,
            celebration: None,
            flash: None,
            connected: false,
            connection_detail: String::new(),
            display_name: None,
            preview: false,
            breakout: None,
            should_quit: false,
            name_hint,
            queued_add: None,
            pending_add_slot: None,
            breakout_busy: false,
            debouncer: Debouncer::new(draft_events),
            debounce_slot: None,
            celebration_count: 0,
            timers,
            timer_watch,
            timer_events,
            chime,
            next_draft_id: 0,
        };
        while app.slots.len() < MAX_ACTIVE_TASKS {
            let slot = app.draft_slot();
            app.slots.push(slot);
        }
        app
    }

    /// Handles one key press and returns the command to send, if any.
    pub fn handle_key_event(&mut self, key: KeyEvent) -> Option<NetCommand> {
        if key.code == KeyCode::Char('c') && key.modifiers.contains(KeyModifiers::CONTROL) {
            self.should_quit = true;
            return None;
        }
        if self.name_gate.is_some() {
            return self.handle_gate_key(key);
        }
        match (key.code, key.modifiers) {
            (KeyCode::Char('b'), KeyModifiers::CONTROL) => return self.toggle_breakout(),
            (KeyCode::BackTab, _) | (KeyCode::Tab, KeyModifiers::SHIFT) => {
                self.dismiss_focused_picker();
                self.cycle_focus_backward();
                return None;
            }
            (KeyCode::Tab, _) => {
                self.dismiss_focused_picker();
                self.cycle_focus_forward();
                return None;
            }
            _ => {}
        }
        match self.focus {
            Focus::Slot(index) => self.handle_slot_key(index, key),
            Focus::Completed => self.handle_completed_key(key),
        }
    }

    /// Applies a network event to the local state. A returned command is a
    /// follow-up the session should perform, such as a queued add released
    /// by a successful name save.
    pub fn apply_net_event(&mut self, event: NetEvent) -> Option<NetCommand> {
        match event {
            NetEvent::Status { connected, detail } => {
                self.connected = connected;
                self.connection_detail = detail;
                None
            }
            NetEvent::Session {
                display_name,
                preview,
            } => {
                self.display_name = display_name;
                self.preview = preview;
                None
            }
            NetEvent::ActiveTasks(tasks) => {
                self.active = tasks;
                self.sync_slots();
                None
            }
            NetEvent::CompletedTasks(view) => {
                self.completed = view;
                self.completed_cursor = self
                    .completed_cursor
                    .min(self.completed.len().saturating_sub(1));
                None
            }
            NetEvent::TaskAdded(record) => {
                self.bind_pending_slot(record.id);
                None
            }
            NetEvent::AddRejected { reason, text } => self.handle_add_rejected(reason, text),
            NetEvent::TaskCompleted(_) => {
                self.start_celebration();
                None
            }
            NetEvent::NameSaved(name) => {
                self.display_name = Some(name);
                self.name_gate = None;
                self.queued_add
                    .take()
                    .map(|text| NetCommand::AddTask { text })
            }
            NetEvent::NameRejected(message) => {
                if let Some(gate) = &mut self.name_gate {
                    gate.error = Some(message);
                }
                None
            }
            NetEvent::Breakout(joining) => {
                self.breakout = joining;
                self.breakout_busy = false;
                None
            }
        }
    }

    /// Routes a timer event. Started timers on saved tasks are recorded to
    /// the store; draft timers stay local until the task is saved.
    pub fn apply_timer_event(&mut self, event: TimerEvent) -> Option<NetCommand> {
        match event {
            TimerEvent::Tick { run } => {
                for slot in &mut self.slots {
                    slot.timer.on_tick(run);
                }
                None
            }
            TimerEvent::Started {
                owner: TimerOwner::Task(id),
                minutes,
            } => Some(NetCommand::RecordTimerUse { id, minutes }),
            TimerEvent::Started {
                owner: TimerOwner::Draft(_),
                ..
            } => None,
            TimerEvent::Expired { .. } => {
                self.show_flash("time's up — take a break");
                None
            }
        }
    }

    /// Turns a fired draft debounce into an add, unless a newer edit
    /// superseded it.
    pub fn apply_draft_commit(&mut self, commit: DraftCommit) -> Option<NetCommand> {
        if !self.debouncer.try_claim(commit.generation) {
            return None;
        }
        let index = self.debounce_slot.take()?;
        self.pending_add_slot = Some(index);
        Some(NetCommand::AddTask { text: commit.text })
    }

    /// Advances per-iteration state: timer ownership, banner countdowns.
    pub fn tick(&mut self) {
        self.sync_timer_ownership();
        if let Some(celebration) = &mut self.celebration {
            celebration.ticks_left = celebration.ticks_left.saturating_sub(1);
            if celebration.ticks_left == 0 {
                self.celebration = None;
            }
        }
        if let Some(flash) = &mut self.flash {
            flash.ticks_left = flash.ticks_left.saturating_sub(1);
            if flash.ticks_left == 0 {
                self.flash = None;
            }
        }
    }

    /// Fans the latest global timer slot out to every local timer, so a
    /// start elsewhere deactivates timers here.
    fn sync_timer_ownership(&mut self) {
        if self.timer_watch.has_changed().unwrap_or(false) {
            let current = *self.timer_watch.borrow_and_update();
            for slot in &mut self.slots {
                slot.timer.handle_global_change(current);
            }
        }
    }

    fn handle_slot_key(&mut self, index: usize, key: KeyEvent) -> Option<NetCommand> {
        if self.slots[index].timer.phase() == TimerPhase::Selecting {
            self.handle_picker_key(index, key);
            return None;
        }
        if let Some(task) = self.active.get(index) {
            let id = task.id;
            match (key.code, key.modifiers) {
                (KeyCode::Char('x'), _) => return Some(NetCommand::CompleteTask { id }),
                (KeyCode::Char('d'), _) => return Some(NetCommand::DeleteTask { id }),
                (KeyCode::Char('t'), _) => self.slots[index].timer.open_picker(),
                (KeyCode::Char('p'), _) => self.slots[index].timer.toggle_pause(),
                (KeyCode::Up, KeyModifiers::SHIFT) if index > 0 => {
                    self.focus = Focus::Slot(index - 1);
                    return Some(NetCommand::MoveTask {
                        from: index,
                        to: index - 1,
                    });
                }
                (KeyCode::Down, KeyModifiers::SHIFT) if index + 1 < self.active.len() => {
                    self.focus = Focus::Slot(index + 1);
                    return Some(NetCommand::MoveTask {
                        from: index,
                        to: index + 1,
                    });
                }
                _ => {}
            }
            None
        } else {
            self.handle_draft_key(index, key)
        }
    }

    fn handle_draft_key(&mut self, index: usize, key: KeyEvent) -> Option<NetCommand> {
        match (key.code, key.modifiers) {
            (KeyCode::Char('t'), KeyModifiers::CONTROL) => {
                self.slots[index].timer.open_picker();
                None
            }
            (KeyCode::Char('p'), KeyModifiers::CONTROL) => {
                self.slots[index].timer.toggle_pause();
                None
            }
            (KeyCode::Enter, _) => self.submit_draft(index),
            (KeyCode::Esc, _) => {
                let slot = &mut self.slots[index];
                slot.draft.clear();
                slot.cursor = 0;
                self.cancel_debounce(index);
                None
            }
            (KeyCode::Char(c), _) => {
                let slot = &mut self.slots[index];
                insert_char(&mut slot.draft, &mut slot.cursor, c);
                self.schedule_debounce(index);
                None
            }
            (KeyCode::Backspace, _) => {
                let slot = &mut self.slots[index];
                let deleted = delete_char_before(&mut slot.draft, &mut slot.cursor);
                let now_empty = slot.draft.is_empty();
                if deleted && now_empty {
                    self.cancel_debounce(index);
                } else if deleted {
                    self.schedule_debounce(index);
                }
                None
            }
            (KeyCode::Left, _) => {
                let slot = &mut self.slots[index];
                cursor_left(&slot.draft, &mut slot.cursor);
                None
            }
            (KeyCode::Right, _) => {
                let slot = &mut self.slots[index];
                cursor_right(&slot.draft, &mut slot.cursor);
                None
            }
            _ => None,
        }
    }

    fn handle_picker_key(&mut self, index: usize, key: KeyEvent) {
        let timer = &mut self.slots[index].timer;
        match key.code {
            KeyCode::Esc => timer.dismiss_picker(),
            KeyCode::Left => timer.move_preset_cursor(-1),
            KeyCode::Right => timer.move_preset_cursor(1),
            KeyCode::Enter => timer.confirm_selection(),
            KeyCode::Backspace => timer.pop_custom_digit(),
            KeyCode::Char(c) => timer.push_custom_digit(c),
            _ => {}
        }
    }

    fn handle_completed_key(&mut self, key: KeyEvent) -> Option<NetCommand> {
        match key.code {
            KeyCode::Up => {
                self.completed_cursor = self.completed_cursor.saturating_sub(1);
                None
            }
            KeyCode::Down => {
                if self.completed_cursor + 1 < self.completed.len() {
                    self.completed_cursor += 1;
                }
                None
            }
            KeyCode::Char('h') => self.react_at_cursor(ReactionKind::Hearts),
            KeyCode::Char('c') => self.react_at_cursor(ReactionKind::Celebrations),
            _ => None,
        }
    }

    fn handle_gate_key(&mut self, key: KeyEvent) -> Option<NetCommand> {
        let gate = self.name_gate.as_mut()?;
        match key.code {
            KeyCode::Enter => Some(NetCommand::SaveName {
                input: gate.input.clone(),
            }),
            KeyCode::Esc => {
                self.name_gate = None;
                self.queued_add = None;
                self.pending_add_slot = None;
                None
            }
            KeyCode::Char(c) => {
                insert_char(&mut gate.input, &mut gate.cursor, c);
                gate.error = None;
                None
            }
            KeyCode::Backspace => {
                if delete_char_before(&mut gate.input, &mut gate.cursor) {
                    gate.error = None;
                }
                None
            }
            KeyCode::Left => {
                cursor_left(&gate.input, &mut gate.cursor);
                None
            }
            KeyCode::Right => {
                cursor_right(&gate.input, &mut gate.cursor);
                None
            }
            _ => None,
        }
    }

    fn submit_draft(&mut self, index: usize) -> Option<NetCommand> {
        let text = self.slots[index].draft.clone();
        if text.trim().is_empty() {
            return None;
        }
        self.cancel_debounce(index);
        self.pending_add_slot = Some(index);
        Some(NetCommand::AddTask { text })
    }

    fn handle_add_rejected(&mut self, reason: AddRejection, text: String) -> Option<NetCommand> {
        match reason {
            AddRejection::NameNeeded => {
                // The pending slot stays armed: once the gate saves a name
                // the queued add is resent and binds to the same slot.
                self.queued_add = Some(text);
                self.open_name_gate();
            }
            AddRejection::Empty => {
                self.pending_add_slot = None;
            }
            AddRejection::TooLong { chars, max } => {
                self.pending_add_slot = None;
                self.show_flash(format!("task is too long ({chars}/{max} characters)"));
            }
            AddRejection::AtCapacity => {
                self.pending_add_slot = None;
                self.show_flash("all three slots are full — finish a task first");
            }
            AddRejection::StoreFailed => {
                self.pending_add_slot = None;
                self.show_flash("could not save the task, please retry");
            }
        }
        None
    }

    /// Rebinds the slot that submitted the add to the saved task and
    /// clears its draft. The active-list snapshot that follows finds the
    /// timer already owned by the new task id and keeps it in place.
    fn bind_pending_slot(&mut self, id: TaskId) {
        if let Some(index) = self.pending_add_slot.take()
            && let Some(slot) = self.slots.get_mut(index)
        {
            slot.timer.rebind(TimerOwner::Task(id));
            slot.draft.clear();
            slot.cursor = 0;
            self.cancel_debounce(index);
        }
    }

    /// Rebuilds the slot row after an active-list snapshot. Slots whose
    /// timer is bound to a task keep following that task's new position;
    /// draft slots keep their text and fill the remaining positions in
    /// order. Leftover slots are dropped, which releases their timers.
    fn sync_slots(&mut self) {
        let ids: Vec<TaskId> = self
            .active
            .iter()
            .take(MAX_ACTIVE_TASKS)
            .map(|task| task.id)
            .collect();
        let mut old: Vec<Option<SlotState>> = std::mem::take(&mut self.slots)
            .into_iter()
            .map(Some)
            .collect();
        let mut next: Vec<SlotState> = Vec::with_capacity(MAX_ACTIVE_TASKS);
        for id in ids {
            let owner = TimerOwner::Task(id);
            let carried = old
                .iter_mut()
                .find(|slot| slot.as_ref().is_some_and(|s| s.timer.owner() == owner))
                .and_then(Option::take);
            next.push(match carried {
                Some(mut slot) => {
                    slot.draft.clear();
                    slot.cursor = 0;
                    slot
                }
                None => self.bound_slot(owner),
            });
        }
        while next.len() < MAX_ACTIVE_TASKS {
            let carried = old
                .iter_mut()
                .find(|slot| {
                    matches!(
                        slot.as_ref().map(|s| s.timer.owner()),
                        Some(TimerOwner::Draft(_))
                    )
                })
                .and_then(Option::take);
            next.push(carried.unwrap_or_else(|| self.draft_slot()));
        }
        self.slots = next;
        // A debounce armed for a slot that now shows a saved task would
        // double-add; drop it.
        if self
            .debounce_slot
            .is_some_and(|index| index < self.active.len())
        {
            self.debouncer.cancel();
            self.debounce_slot = None;
        }
    }

    fn react_at_cursor(&mut self, kind: ReactionKind) -> Option<NetCommand> {
        self.completed
            .get(self.completed_cursor)
            .map(|task| NetCommand::AddReaction { id: task.id, kind })
    }

    fn toggle_breakout(&mut self) -> Option<NetCommand> {
        if self.breakout_busy {
            return None;
        }
        if self.breakout.is_none() {
            self.show_flash("set your name to join breakouts");
            return None;
        }
        self.breakout_busy = true;
        Some(NetCommand::ToggleBreakout)
    }

    fn open_name_gate(&mut self) {
        let input = self.name_hint.clone().unwrap_or_default();
        let cursor = input.len();
        self.name_gate = Some(NameGateState {
            input,
            cursor,
            error: None,
        });
    }

    fn start_celebration(&mut self) {
        let style = self.celebration_count % CELEBRATION_STYLES;
        self.celebration_count += 1;
        self.celebration = Some(Celebration {
            style,
            ticks_left: CELEBRATION_TICKS,
        });
    }

    /// Shows a short-lived message in the status bar.
    pub fn show_flash(&mut self, message: impl Into<String>) {
        self.flash = Some(Flash {
            message: message.into(),
            ticks_left: FLASH_TICKS,
        });
    }

    fn schedule_debounce(&mut self, index: usize) {
        self.debouncer.schedule(self.slots[index].draft.clone());
        self.debounce_slot = Some(index);
    }

    fn cancel_debounce(&mut self, index: usize) {
        if self.debounce_slot == Some(index) {
            self.debouncer.cancel();
            self.debounce_slot = None;
        }
    }

    fn bound_slot(&self, owner: TimerOwner) -> SlotState {
        SlotState {
            draft: String::new(),
            cursor: 0,
            timer: TaskTimer::new(
                owner,
                Arc::clone(&self.timers),
                Arc::clone(&self.chime),
                self.timer_events.clone(),
            ),
        }
    }

    fn draft_slot(&mut self) -> SlotState {
        self.next_draft_id += 1;
        self.bound_slot(TimerOwner::Draft(self.next_draft_id))
    }

    /// Moving focus off a slot closes its timer picker and drops any
    /// partial custom entry.
    fn dismiss_focused_picker(&mut self) {
        if let Focus::Slot(index) = self.focus {
            self.slots[index].timer.dismiss_picker();
        }
    }

    const fn cycle_focus_forward(&mut self) {
        self.focus = match self.focus {
            Focus::Slot(index) if index + 1 < MAX_ACTIVE_TASKS => Focus::Slot(index + 1),
            Focus::Slot(_) => Focus::Completed,
            Focus::Completed => Focus::Slot(0),
        };
    }

    const fn cycle_focus_backward(&mut self) {
        self.focus = match self.focus {
            Focus::Slot(0) => Focus::Completed,
            Focus::Slot(index) => Focus::Slot(index - 1),
            Focus::Completed => Focus::Slot(MAX_ACTIVE_TASKS - 1),
        };
    }
}

fn insert_char(text: &mut String, cursor: &mut usize, c: char) {
    text.insert(*cursor, c);
    *cursor += c.len_utf8();
}

fn delete_char_before(text: &mut String, cursor: &mut usize) -> bool {
    let Some((index, _)) = text[..*cursor].char_indices().next_back() else {
        return false;
    };
    text.remove(index);
    *cursor = index;
    true
}

fn cursor_left(text: &str, cursor: &mut usize) {
    if let Some((index, _)) = text[..*cursor].char_indices().next_back() {
        *cursor = index;
    }
}

fn cursor_right(text: &str, cursor: &mut usize) {
    if let Some(c) = text[*cursor..].chars().next() {
        *cursor += c.len_utf8();
    }
}
