//! Task-list state and the rules around it.
//!
//! [`TaskListController`] owns the active list (at most three tasks) and
//! the recently-completed view, and performs every store round-trip the
//! task panels need. [`Debouncer`] turns idle pauses while typing a draft
//! into commit events.

pub mod controller;
pub mod debounce;

pub use controller::{AddOutcome, COMPLETED_VIEW_CAP, MAX_ACTIVE_TASKS, TaskListController};
pub use debounce::{DRAFT_DEBOUNCE, Debouncer, DraftCommit};
