//! Per-task countdown timers.
//!
//! A [`TaskTimer`] walks `Idle → Selecting → Running ⇄ Paused`, with
//! `Running` falling back to `Idle` when the countdown hits zero. All
//! instances share one [`GlobalTimerStore`]; registering there is what
//! enforces the single-running-timer rule, because every timer deactivates
//! itself when the slot reports a different owner.
//!
//! Ticking is a spawned one-second interval task that feeds
//! [`TimerEvent::Tick`] into the app loop; the timer itself never mutates
//! state off the loop. The tick task's [`AbortOnDropHandle`] is released on
//! pause, expiry, reset, rebind, and supersession, so a stale interval can
//! never fire after deactivation. Each spawn is tagged with a fresh run
//! number — a tick already queued when its task is aborted must not count
//! against a later run.

pub mod global;

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::task::AbortOnDropHandle;

use crate::effects::Chime;

pub use global::{GlobalTimerStore, TimerOwner, TimerSlot};

/// Preset countdown lengths offered by the picker, in minutes.
pub const PRESET_MINUTES: [u32; 3] = [15, 25, 50];

/// Smallest accepted custom length, in minutes.
pub const MIN_CUSTOM_MINUTES: u32 = 1;

/// Largest accepted custom length, in minutes.
pub const MAX_CUSTOM_MINUTES: u32 = 180;

/// Tags tick-task spawns so stale queued ticks are recognizable.
static NEXT_RUN: AtomicU64 = AtomicU64::new(1);

/// Why a custom timer length was rejected.
///
/// Shown to the user verbatim next to the picker input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum MinutesError {
    /// The input is not an integer.
    #[error("enter a number of minutes")]
    NotANumber,
    /// The input is an integer outside the accepted range.
    #[error("timer length must be {min}-{max} minutes")]
    OutOfRange {
        /// Smallest accepted value.
        min: u32,
        /// Largest accepted value.
        max: u32,
    },
}

/// Parses a custom timer length.
///
/// Accepts an integer number of minutes in
/// [`MIN_CUSTOM_MINUTES`]..=[`MAX_CUSTOM_MINUTES`]. Negative numbers are
/// numbers, so they are rejected as out of range rather than as
/// non-numeric.
///
/// # Errors
///
/// Returns the specific [`MinutesError`] for the first rule that fails.
pub fn parse_custom_minutes(input: &str) -> Result<u32, MinutesError> {
    let out_of_range = MinutesError::OutOfRange {
        min: MIN_CUSTOM_MINUTES,
        max: MAX_CUSTOM_MINUTES,
    };
    let value: i64 = input
        .trim()
        .parse()
        .map_err(|_| MinutesError::NotANumber)?;
    let minutes = u32::try_from(value).map_err(|_| out_of_range)?;
    if !(MIN_CUSTOM_MINUTES..=MAX_CUSTOM_MINUTES).contains(&minutes) {
        return Err(out_of_range);
    }
    Ok(minutes)
}

/// Where a timer is in its life cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerPhase {
    /// No countdown and no picker.
    Idle,
    /// The length picker is open.
    Selecting,
    /// Counting down once per second.
    Running,
    /// Frozen with time remaining.
    Paused,
}

/// Events the timers push into the app loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    /// One second elapsed in the tick task spawned as `run`.
    Tick {
        /// The spawn this tick belongs to.
        run: u64,
    },
    /// A countdown started with the given length.
    Started {
        /// Whose countdown started.
        owner: TimerOwner,
        /// Chosen length in minutes.
        minutes: u32,
    },
    /// A countdown reached zero.
    Expired {
        /// Whose countdown expired.
        owner: TimerOwner,
    },
}

/// Countdown state machine for one task slot.
pub struct TaskTimer {
    owner: TimerOwner,
    phase: TimerPhase,
    remaining: Option<u32>,
    custom_input: String,
    input_error: Option<MinutesError>,
    preset_cursor: usize,
    store: Arc<GlobalTimerStore>,
    chime: Arc<dyn Chime>,
    events: mpsc::UnboundedSender<TimerEvent>,
    tick_task: Option<AbortOnDropHandle<()>>,
    tick_run: Option<u64>,
}

impl TaskTimer {
    /// Creates an idle timer bound to `owner`.
    #[must_use]
    pub fn new(
        owner: TimerOwner,
        store: Arc<GlobalTimerStore>,
        chime: Arc<dyn Chime>,
        events: mpsc::UnboundedSender<TimerEvent>,
    ) -> Self {
        Self {
            owner,
            phase: TimerPhase::Idle,
            remaining: None,
            custom_input: String::new(),
            input_error: None,
            preset_cursor: 0,
            store,
            chime,
            events,
            tick_task: None,
            tick_run: None,
        }
    }

    /// The task (or draft) this timer belongs to.
    #[must_use]
    pub const fn owner(&self) -> TimerOwner {
        self.owner
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> TimerPhase {
        self.phase
    }

    /// Seconds left, while running or paused.
    #[must_use]
    pub const fn remaining_seconds(&self) -> Option<u32> {
        self.remaining
    }

    /// The picker's custom-length input.
    #[must_use]
    pub fn custom_input(&self) -> &str {
        &self.custom_input
    }

    /// The last custom-length rejection, until the next keystroke.
    #[must_use]
    pub const fn input_error(&self) -> Option<MinutesError> {
        self.input_error
    }

    /// Which preset the picker cursor is on.
    #[must_use]
    pub const fn preset_cursor(&self) -> usize {
        self.preset_cursor
    }

    /// Opens the length picker. Only meaningful from `Idle`.
    pub fn open_picker(&mut self) {
        if self.phase == TimerPhase::Idle {
            self.phase = TimerPhase::Selecting;
            self.custom_input.clear();
            self.input_error = None;
            self.preset_cursor = 0;
        }
    }

    /// Closes the picker, discarding any partial custom entry.
    pub fn dismiss_picker(&mut self) {
        if self.phase == TimerPhase::Selecting {
            self.phase = TimerPhase::Idle;
            self.custom_input.clear();
            self.input_error = None;
        }
    }

    /// Moves the preset cursor left or right, wrapping around.
    pub fn move_preset_cursor(&mut self, delta: i32) {
        if self.phase != TimerPhase::Selecting {
            return;
        }
        let len = PRESET_MINUTES.len();
        let step = delta.rem_euclid(i32::try_from(len).unwrap_or(1));
        let step = usize::try_from(step).unwrap_or(0);
        self.preset_cursor = (self.preset_cursor + step) % len;
    }

    /// Appends one digit to the custom-length input.
    pub fn push_custom_digit(&mut self, c: char) {
        if self.phase == TimerPhase::Selecting && c.is_ascii_digit() && self.custom_input.len() < 3
        {
            self.custom_input.push(c);
            self.input_error = None;
        }
    }

    /// Removes the last character of the custom-length input.
    pub fn pop_custom_digit(&mut self) {
        if self.phase == TimerPhase::Selecting {
            self.custom_input.pop();
            self.input_error = None;
        }
    }

    /// Confirms the picker selection.
    ///
    /// With custom input present the input is parsed and validated;
    /// rejection records the error and leaves the picker open with nothing
    /// else changed. With an empty input the highlighted preset starts.
    pub fn confirm_selection(&mut self) {
        if self.phase != TimerPhase::Selecting {
            return;
        }
        if self.custom_input.is_empty() {
            self.start(PRESET_MINUTES[self.preset_cursor.min(PRESET_MINUTES.len() - 1)]);
            return;
        }
        match parse_custom_minutes(&self.custom_input) {
            Ok(minutes) => self.start(minutes),
            Err(e) => self.input_error = Some(e),
        }
    }

    /// Pauses a running countdown or resumes a paused one.
    ///
    /// Pausing clears the global slot and stops the tick task but keeps the
    /// remaining time; resuming re-registers and respawns the ticks.
    pub fn toggle_pause(&mut self) {
        match self.phase {
            TimerPhase::Running => {
                self.stop_ticking();
                self.release_global();
                self.phase = TimerPhase::Paused;
            }
            TimerPhase::Paused => {
                if let Some(remaining) = self.remaining {
                    self.store.set_running(self.owner, remaining);
                    self.spawn_tick();
                    self.phase = TimerPhase::Running;
                }
            }
            TimerPhase::Idle | TimerPhase::Selecting => {}
        }
    }

    /// Advances the countdown by one second, if `run` is still current.
    ///
    /// Re-reads the shared slot first: a different running owner means this
    /// timer was superseded and the tick is consumed by deactivation.
    pub fn on_tick(&mut self, run: u64) {
        if self.tick_run != Some(run) || self.phase != TimerPhase::Running {
            return;
        }
        if let Some((owner, _)) = self.store.current()
            && owner != self.owner
        {
            self.deactivate();
            return;
        }
        let remaining = self.remaining.unwrap_or(0).saturating_sub(1);
        self.remaining = Some(remaining);
        if remaining == 0 {
            self.expire();
        } else {
            self.store.set_running(self.owner, remaining);
        }
    }

    /// Reacts to a shared-slot change: a different owner running forces
    /// this timer back to `Idle` with no remaining display.
    pub fn handle_global_change(&mut self, slot: TimerSlot) {
        if self.phase == TimerPhase::Running
            && let Some((owner, _)) = slot
            && owner != self.owner
        {
            self.deactivate();
        }
    }

    /// Re-registers this timer under a new owner.
    ///
    /// Used when a draft is saved as a real task while its timer is live:
    /// the countdown carries its remaining time into the saved task's slot.
    pub fn rebind(&mut self, new_owner: TimerOwner) {
        if self.owner == new_owner {
            return;
        }
        self.owner = new_owner;
        if self.phase == TimerPhase::Running
            && let Some(remaining) = self.remaining
        {
            self.stop_ticking();
            self.store.set_running(new_owner, remaining);
            self.spawn_tick();
        }
    }

    /// Fully deactivates the timer, releasing the slot if it holds it.
    pub fn reset(&mut self) {
        self.release_global();
        self.stop_ticking();
        self.phase = TimerPhase::Idle;
        self.remaining = None;
        self.custom_input.clear();
        self.input_error = None;
    }

    fn start(&mut self, minutes: u32) {
        let remaining = minutes * 60;
        self.remaining = Some(remaining);
        self.custom_input.clear();
        self.input_error = None;
        self.phase = TimerPhase::Running;
        self.store.set_running(self.owner, remaining);
        self.spawn_tick();
        let _ = self.events.send(TimerEvent::Started {
            owner: self.owner,
            minutes,
        });
    }

    fn expire(&mut self) {
        self.stop_ticking();
        self.release_global();
        self.chime.play();
        let _ = self.events.send(TimerEvent::Expired { owner: self.owner });
        self.phase = TimerPhase::Idle;
        self.remaining = None;
    }

    fn deactivate(&mut self) {
        tracing::debug!(owner = ?self.owner, "timer superseded by another countdown");
        self.stop_ticking();
        self.phase = TimerPhase::Idle;
        self.remaining = None;
    }

    fn spawn_tick(&mut self) {
        let run = NEXT_RUN.fetch_add(1, Ordering::Relaxed);
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));
            // The first interval tick completes immediately; skip it so the
            // first Tick event arrives one second after starting.
            interval.tick().await;
            loop {
                interval.tick().await;
                if events.send(TimerEvent::Tick { run }).is_err() {
                    break;
                }
            }
        });
        self.tick_task = Some(AbortOnDropHandle::new(handle));
        self.tick_run = Some(run);
    }

    fn stop_ticking(&mut self) {
        self.tick_task = None;
        self.tick_run = None;
    }

    fn release_global(&self) {
        if let Some((owner, _)) = self.store.current()
            && owner == self.owner
        {
            self.store.clear();
        }
    }
}

impl Drop for TaskTimer {
    fn drop(&mut self) {
        if self.phase == TimerPhase::Running {
            self.release_global();
        }
    }
}
