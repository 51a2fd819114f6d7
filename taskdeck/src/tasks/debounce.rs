//! Debounced draft commits.
//!
//! While a draft is being typed, every keystroke reschedules a single
//! pending commit; the commit event only fires after two seconds of
//! silence. Because the event travels through a channel, it can already be
//! queued when the draft changes again — so each schedule gets a
//! generation number, and the consumer calls [`Debouncer::try_claim`] to
//! find out whether a received commit is still the current one.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::task::AbortOnDropHandle;

/// How long a draft must sit unchanged before it commits.
pub const DRAFT_DEBOUNCE: Duration = Duration::from_secs(2);

/// A draft commit that fired after the quiet period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DraftCommit {
    /// Which schedule produced this commit.
    pub generation: u64,
    /// The draft text as it was when scheduled.
    pub text: String,
}

/// Holds at most one pending draft commit.
pub struct Debouncer {
    delay: Duration,
    events: mpsc::UnboundedSender<DraftCommit>,
    pending: Option<AbortOnDropHandle<()>>,
    generation: u64,
}

impl Debouncer {
    /// Creates a debouncer emitting commits on `events` after
    /// [`DRAFT_DEBOUNCE`] of silence.
    #[must_use]
    pub const fn new(events: mpsc::UnboundedSender<DraftCommit>) -> Self {
        Self {
            delay: DRAFT_DEBOUNCE,
            events,
            pending: None,
            generation: 0,
        }
    }

    /// Schedules `text` to commit after the quiet period, replacing any
    /// pending commit.
    pub fn schedule(&mut self, text: String) {
        self.generation += 1;
        let generation = self.generation;
        let delay = self.delay;
        let events = self.events.clone();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = events.send(DraftCommit { generation, text });
        });
        // Assigning drops (and thereby aborts) the previous task.
        self.pending = Some(AbortOnDropHandle::new(task));
    }

    /// Discards the pending commit, if any.
    ///
    /// Also invalidates commits already queued in the channel: their
    /// generation no longer matches, so [`try_claim`] rejects them.
    ///
    /// [`try_claim`]: Self::try_claim
    pub fn cancel(&mut self) {
        self.generation += 1;
        self.pending = None;
    }

    /// Claims a received commit.
    ///
    /// Returns `true` exactly once per scheduled generation, and only when
    /// that generation is still the current one. Stale commits — anything
    /// rescheduled or cancelled after they fired — return `false`.
    pub fn try_claim(&mut self, generation: u64) -> bool {
        if generation == self.generation && self.pending.is_some() {
            self.pending = None;
            true
        } else {
            false
        }
    }

    /// Whether a commit is scheduled or fired-but-unclaimed.
    #[must_use]
    pub const fn is_pending(&self) -> bool {
        self.pending.is_some()
    }
}
