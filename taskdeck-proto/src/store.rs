//! Generic store operations shared by the hub and every store client.
//!
//! The store surface is deliberately narrow: three known tables, a
//! conjunctive row filter covering every query the client makes, a closed
//! set of semantic patches, and a change-feed event. Patch application
//! lives here so the hub and the in-process fake share one implementation.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::ids::{AccountId, MeetingId, Timestamp};
use crate::records::{BreakoutRecord, ReactionKind, TaskRecord, UserRecord};

/// The three tables the hub serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Table {
    /// Task rows, scoped by account.
    Tasks,
    /// User rows, one per account.
    Users,
    /// Breakout opt-in rows, keyed by account + meeting.
    Breakouts,
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Tasks => write!(f, "tasks"),
            Self::Users => write!(f, "users"),
            Self::Breakouts => write!(f, "breakouts"),
        }
    }
}

/// A row of any table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Row {
    /// A `Tasks` row.
    Task(TaskRecord),
    /// A `Users` row.
    User(UserRecord),
    /// A `breakouts` row.
    Breakout(BreakoutRecord),
}

impl Row {
    /// The table this row belongs to.
    #[must_use]
    pub const fn table(&self) -> Table {
        match self {
            Self::Task(_) => Table::Tasks,
            Self::User(_) => Table::Users,
            Self::Breakout(_) => Table::Breakouts,
        }
    }

    /// The row's unique id, if the table has one.
    ///
    /// Breakout rows are keyed by account + meeting and carry no row id of
    /// their own.
    #[must_use]
    pub const fn row_id(&self) -> Option<&Uuid> {
        match self {
            Self::Task(t) => Some(t.id.as_uuid()),
            Self::User(u) => Some(u.id.as_uuid()),
            Self::Breakout(_) => None,
        }
    }

    /// The account the row is scoped to.
    #[must_use]
    pub const fn account_id(&self) -> &AccountId {
        match self {
            Self::Task(t) => &t.account_id,
            Self::User(u) => &u.account_id,
            Self::Breakout(b) => &b.account_id,
        }
    }

    /// The meeting the row is scoped to.
    #[must_use]
    pub const fn meeting_id(&self) -> &MeetingId {
        match self {
            Self::Task(t) => &t.meeting_id,
            Self::User(u) => &u.meeting_id,
            Self::Breakout(b) => &b.meeting_id,
        }
    }

    /// Borrows the task record, if this is a task row.
    #[must_use]
    pub const fn as_task(&self) -> Option<&TaskRecord> {
        match self {
            Self::Task(t) => Some(t),
            _ => None,
        }
    }

    /// Borrows the user record, if this is a user row.
    #[must_use]
    pub const fn as_user(&self) -> Option<&UserRecord> {
        match self {
            Self::User(u) => Some(u),
            _ => None,
        }
    }

    /// Borrows the breakout record, if this is a breakout row.
    #[must_use]
    pub const fn as_breakout(&self) -> Option<&BreakoutRecord> {
        match self {
            Self::Breakout(b) => Some(b),
            _ => None,
        }
    }

    /// Consumes the row into a task record, if this is a task row.
    #[must_use]
    pub fn into_task(self) -> Option<TaskRecord> {
        match self {
            Self::Task(t) => Some(t),
            _ => None,
        }
    }

    /// Consumes the row into a user record, if this is a user row.
    #[must_use]
    pub fn into_user(self) -> Option<UserRecord> {
        match self {
            Self::User(u) => Some(u),
            _ => None,
        }
    }

    /// Consumes the row into a breakout record, if this is a breakout row.
    #[must_use]
    pub fn into_breakout(self) -> Option<BreakoutRecord> {
        match self {
            Self::Breakout(b) => Some(b),
            _ => None,
        }
    }
}

/// Conjunctive row predicate: every set condition must hold.
///
/// A condition on a field the row does not have (a completion bound on a
/// user row, an id on a breakout row) never matches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowFilter {
    /// Match a specific row id.
    pub id: Option<Uuid>,
    /// Match rows scoped to this account.
    pub account_id: Option<AccountId>,
    /// Match rows scoped to this meeting.
    pub meeting_id: Option<MeetingId>,
    /// Match tasks by completion flag.
    pub completed: Option<bool>,
    /// Match tasks completed at or after this instant.
    pub completed_after: Option<Timestamp>,
}

impl RowFilter {
    /// A filter that matches every row.
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    /// Adds a row-id condition.
    #[must_use]
    pub const fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    /// Adds an account condition.
    #[must_use]
    pub fn with_account(mut self, account_id: AccountId) -> Self {
        self.account_id = Some(account_id);
        self
    }

    /// Adds a meeting condition.
    #[must_use]
    pub fn with_meeting(mut self, meeting_id: MeetingId) -> Self {
        self.meeting_id = Some(meeting_id);
        self
    }

    /// Adds a completion-flag condition.
    #[must_use]
    pub const fn with_completed(mut self, completed: bool) -> Self {
        self.completed = Some(completed);
        self
    }

    /// Adds a completed-at-or-after condition.
    #[must_use]
    pub const fn with_completed_after(mut self, after: Timestamp) -> Self {
        self.completed_after = Some(after);
        self
    }

    /// Returns true when every set condition holds for `row`.
    #[must_use]
    pub fn matches(&self, row: &Row) -> bool {
        if let Some(id) = &self.id {
            if row.row_id() != Some(id) {
                return false;
            }
        }
        if let Some(account_id) = &self.account_id {
            if row.account_id() != account_id {
                return false;
            }
        }
        if let Some(meeting_id) = &self.meeting_id {
            if row.meeting_id() != meeting_id {
                return false;
            }
        }
        if let Some(completed) = self.completed {
            match row.as_task() {
                Some(task) if task.completed == completed => {}
                _ => return false,
            }
        }
        if let Some(after) = self.completed_after {
            match row.as_task().and_then(|t| t.completed_at) {
                Some(at) if at >= after => {}
                _ => return false,
            }
        }
        true
    }
}

/// Result ordering for a select.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Order {
    /// Most recently created first.
    CreatedAtDesc,
    /// Most recently completed first.
    CompletedAtDesc,
}

/// Error returned when a patch targets the wrong kind of row.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("patch does not apply to a {0} row")]
pub struct PatchError(pub Table);

/// A semantic row update.
///
/// The set is closed: every mutation the system performs has its own
/// variant, so the store applies updates under its own lock instead of
/// clients racing read-modify-write cycles. `AddReaction` in particular is
/// an atomic increment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Patch {
    /// Mark a task completed, stamping when and by whom.
    CompleteTask {
        /// Completion timestamp.
        at: Timestamp,
        /// Display name of the completer.
        by: String,
    },
    /// Record that a timer of the given length was started on a task.
    RecordTimerUse {
        /// Timer length in minutes.
        minutes: u32,
    },
    /// Increment one reaction counter by exactly one.
    AddReaction(ReactionKind),
    /// Replace a user's display name.
    SetUserName(String),
    /// Replace a user's meeting key.
    SetUserMeeting(MeetingId),
    /// Replace a breakout opt-in flag, refreshing the display name.
    SetBreakout {
        /// The new opt-in value.
        joining: bool,
        /// Current display name of the participant.
        user_name: String,
        /// When the flag was changed.
        at: Timestamp,
    },
}

impl Patch {
    /// Applies this patch to a row in place.
    ///
    /// # Errors
    ///
    /// Returns [`PatchError`] when the patch variant does not apply to the
    /// row's table; the row is left unchanged.
    pub fn apply_to(&self, row: &mut Row) -> Result<(), PatchError> {
        match (self, row) {
            (Self::CompleteTask { at, by }, Row::Task(task)) => {
                task.completed = true;
                task.completed_at = Some(*at);
                task.owner_name.clone_from(by);
                Ok(())
            }
            (Self::RecordTimerUse { minutes }, Row::Task(task)) => {
                task.timer_used = true;
                task.timer_minutes = Some(*minutes);
                Ok(())
            }
            (Self::AddReaction(kind), Row::Task(task)) => {
                match kind {
                    ReactionKind::Hearts => task.hearts = task.hearts.saturating_add(1),
                    ReactionKind::Celebrations => {
                        task.celebrations = task.celebrations.saturating_add(1);
                    }
                }
                Ok(())
            }
            (Self::SetUserName(name), Row::User(user)) => {
                user.name.clone_from(name);
                Ok(())
            }
            (Self::SetUserMeeting(meeting_id), Row::User(user)) => {
                user.meeting_id = meeting_id.clone();
                Ok(())
            }
            (
                Self::SetBreakout {
                    joining,
                    user_name,
                    at,
                },
                Row::Breakout(breakout),
            ) => {
                breakout.joining = *joining;
                breakout.user_name.clone_from(user_name);
                breakout.updated_at = *at;
                Ok(())
            }
            (_, row) => Err(PatchError(row.table())),
        }
    }
}

/// What happened to a row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeKind {
    /// The row was inserted.
    Insert,
    /// The row was updated.
    Update,
    /// The row was deleted.
    Delete,
}

/// One change-feed event: the affected row's new state (for deletes, its
/// last state).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeEvent {
    /// What happened.
    pub kind: ChangeKind,
    /// The affected row.
    pub row: Row,
}
