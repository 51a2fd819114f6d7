//! Process-wide single-flight timer slot.
//!
//! Every [`TaskTimer`](super::TaskTimer) shares one [`GlobalTimerStore`] so
//! that starting a countdown anywhere stops the countdown running anywhere
//! else. The slot is a [`tokio::sync::watch`] channel: writes are visible
//! to every reader synchronously through `borrow()`, and interested parties
//! can also await change notifications.
//!
//! The store is injected (`Arc<GlobalTimerStore>` built by the app), never
//! a hidden singleton, so tests construct as many independent slots as they
//! need.

use taskdeck_proto::ids::TaskId;
use tokio::sync::watch;

/// Who owns a running countdown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimerOwner {
    /// A saved task row.
    Task(TaskId),
    /// The draft being typed into an empty slot; it has no row yet, so the
    /// app keys it by a locally assigned id.
    Draft(u64),
}

/// The shared slot: the running owner and its remaining seconds, if any.
pub type TimerSlot = Option<(TimerOwner, u32)>;

/// Single source of truth for which timer, if any, is currently running.
pub struct GlobalTimerStore {
    slot: watch::Sender<TimerSlot>,
}

impl GlobalTimerStore {
    /// Creates an empty slot.
    #[must_use]
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self { slot }
    }

    /// Records `owner` as the active timer with `remaining_seconds` left.
    ///
    /// Unconditionally overwrites any previous owner: there is no queue and
    /// no rejection, the newest start always wins.
    pub fn set_running(&self, owner: TimerOwner, remaining_seconds: u32) {
        self.slot.send_replace(Some((owner, remaining_seconds)));
    }

    /// Empties the slot.
    ///
    /// Idempotent: clearing an already-empty slot notifies no one.
    pub fn clear(&self) {
        self.slot.send_if_modified(|slot| slot.take().is_some());
    }

    /// The current slot contents.
    #[must_use]
    pub fn current(&self) -> TimerSlot {
        *self.slot.borrow()
    }

    /// A receiver whose `borrow()` always sees the latest write.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<TimerSlot> {
        self.slot.subscribe()
    }
}

impl Default for GlobalTimerStore {
    fn default() -> Self {
        Self::new()
    }
}
