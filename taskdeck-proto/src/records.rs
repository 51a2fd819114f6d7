//! Row types for the three hub tables and their view projections.
//!
//! Records are created client-side (ids are UUID v7, timestamps from the
//! local clock) and stored by the hub as given. `CompletedTask` is a view
//! projection over `TaskRecord`, never stored independently.

use serde::{Deserialize, Serialize};

use crate::ids::{AccountId, MeetingId, TaskId, Timestamp, UserId};

/// Maximum allowed task text length in characters.
pub const MAX_TASK_TEXT_CHARS: usize = 100;

/// How long a completed task stays in the "recently completed" view.
pub const COMPLETED_WINDOW_MS: u64 = 3 * 60 * 60 * 1000;

/// Display name shown for completed tasks whose record carries no name.
pub const ANONYMOUS_NAME: &str = "Anonymous";

/// Error returned when task text fails validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TaskTextError {
    /// Text is empty after trimming.
    #[error("task text is empty")]
    Empty,
    /// Text exceeds the maximum allowed length.
    #[error("task text too long ({chars} characters, max {max})")]
    TooLong {
        /// Actual length in characters.
        chars: usize,
        /// Maximum allowed length in characters.
        max: usize,
    },
}

/// Validates and trims task text.
///
/// # Errors
///
/// Returns [`TaskTextError::Empty`] if the text is empty after trimming, or
/// [`TaskTextError::TooLong`] if it exceeds [`MAX_TASK_TEXT_CHARS`].
pub fn validate_task_text(text: &str) -> Result<&str, TaskTextError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(TaskTextError::Empty);
    }
    let chars = trimmed.chars().count();
    if chars > MAX_TASK_TEXT_CHARS {
        return Err(TaskTextError::TooLong {
            chars,
            max: MAX_TASK_TEXT_CHARS,
        });
    }
    Ok(trimmed)
}

/// Which reaction counter a reaction targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReactionKind {
    /// The hearts counter.
    Hearts,
    /// The celebrations counter.
    Celebrations,
}

impl std::fmt::Display for ReactionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hearts => write!(f, "hearts"),
            Self::Celebrations => write!(f, "celebrations"),
        }
    }
}

/// One row of the `Tasks` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskRecord {
    /// Unique task identifier (UUID v7, time-ordered).
    pub id: TaskId,
    /// The task text, trimmed, at most [`MAX_TASK_TEXT_CHARS`] characters.
    pub text: String,
    /// Display name of the participant who owns (and later completes) it.
    pub owner_name: String,
    /// Account the task belongs to.
    pub account_id: AccountId,
    /// Meeting the task was created in.
    pub meeting_id: MeetingId,
    /// When the task was created.
    pub created_at: Timestamp,
    /// Whether the task has been completed.
    pub completed: bool,
    /// When the task was completed, if it has been.
    pub completed_at: Option<Timestamp>,
    /// Hearts reaction count.
    pub hearts: u32,
    /// Celebrations reaction count.
    pub celebrations: u32,
    /// Whether a countdown timer was ever started against this task.
    pub timer_used: bool,
    /// Length in minutes of the last timer started, if any.
    pub timer_minutes: Option<u32>,
}

impl TaskRecord {
    /// Creates a fresh, not-yet-completed task row.
    ///
    /// The text is stored as given; callers validate it first with
    /// [`validate_task_text`]. Reaction counters start at zero and no timer
    /// usage is recorded.
    #[must_use]
    pub fn new(
        text: String,
        owner_name: String,
        account_id: AccountId,
        meeting_id: MeetingId,
    ) -> Self {
        Self {
            id: TaskId::new(),
            text,
            owner_name,
            account_id,
            meeting_id,
            created_at: Timestamp::now(),
            completed: false,
            completed_at: None,
            hearts: 0,
            celebrations: 0,
            timer_used: false,
            timer_minutes: None,
        }
    }

    /// Returns the reaction count for the given kind.
    #[must_use]
    pub const fn reaction_count(&self, kind: ReactionKind) -> u32 {
        match kind {
            ReactionKind::Hearts => self.hearts,
            ReactionKind::Celebrations => self.celebrations,
        }
    }
}

/// View projection of a completed [`TaskRecord`].
///
/// Derived for the "recently completed" panel; never stored. A record with
/// an empty owner name projects to [`ANONYMOUS_NAME`], and a record missing
/// its completion timestamp falls back to the projection time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletedTask {
    /// Identifier of the underlying task row.
    pub id: TaskId,
    /// The task text.
    pub text: String,
    /// When the task was completed.
    pub completed_at: Timestamp,
    /// Display name of whoever completed it.
    pub completed_by: String,
    /// Hearts reaction count.
    pub hearts: u32,
    /// Celebrations reaction count.
    pub celebrations: u32,
}

impl CompletedTask {
    /// Projects a task row into the completed view.
    #[must_use]
    pub fn project(record: &TaskRecord) -> Self {
        let completed_by = if record.owner_name.is_empty() {
            ANONYMOUS_NAME.to_string()
        } else {
            record.owner_name.clone()
        };
        Self {
            id: record.id,
            text: record.text.clone(),
            completed_at: record.completed_at.unwrap_or_else(Timestamp::now),
            completed_by,
            hearts: record.hearts,
            celebrations: record.celebrations,
        }
    }
}

/// One row of the `Users` table. One per account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    /// Unique user identifier.
    pub id: UserId,
    /// Account this user belongs to.
    pub account_id: AccountId,
    /// Meeting the user was last seen in.
    pub meeting_id: MeetingId,
    /// Validated display name.
    pub name: String,
    /// When the row was created.
    pub created_at: Timestamp,
}

impl UserRecord {
    /// Creates a fresh user row for an account.
    #[must_use]
    pub fn new(account_id: AccountId, meeting_id: MeetingId, name: String) -> Self {
        Self {
            id: UserId::new(),
            account_id,
            meeting_id,
            name,
            created_at: Timestamp::now(),
        }
    }
}

/// One row of the `breakouts` table, keyed by account + meeting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreakoutRecord {
    /// The user this opt-in belongs to.
    pub user_id: UserId,
    /// Account scope.
    pub account_id: AccountId,
    /// Meeting scope.
    pub meeting_id: MeetingId,
    /// Display name, refreshed whenever the flag is toggled.
    pub user_name: String,
    /// Whether the participant joins breakout rooms today.
    pub joining: bool,
    /// When the flag was last changed.
    pub updated_at: Timestamp,
}

impl BreakoutRecord {
    /// Creates the default opt-in row for a user (joining = true).
    #[must_use]
    pub fn new(user: &UserRecord) -> Self {
        Self {
            user_id: user.id,
            account_id: user.account_id.clone(),
            meeting_id: user.meeting_id.clone(),
            user_name: user.name.clone(),
            joining: true,
            updated_at: Timestamp::now(),
        }
    }
}
