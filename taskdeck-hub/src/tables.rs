//! In-memory storage for the three hub tables.
//!
//! Rows live in per-table maps behind [`tokio::sync::RwLock`]s. Every
//! mutation runs under the table's write lock and returns the affected
//! rows, so the caller can fan the changes out to the change feed and
//! read-modify-write patches (reaction increments in particular) are
//! atomic.

use std::collections::HashMap;

use taskdeck_proto::ids::{AccountId, MeetingId, TaskId, Timestamp, UserId};
use taskdeck_proto::records::{BreakoutRecord, TaskRecord, UserRecord};
use taskdeck_proto::store::{Order, Patch, PatchError, Row, RowFilter, Table};
use tokio::sync::RwLock;

/// Error returned by a table mutation.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    /// An insert collided with an existing row key.
    #[error("row already exists in {0}")]
    Duplicate(Table),

    /// The patch variant does not apply to the targeted table.
    #[error(transparent)]
    Patch(#[from] PatchError),
}

/// The hub's tables: tasks and users keyed by row id, breakout opt-ins
/// keyed by account + meeting.
pub struct Tables {
    tasks: RwLock<HashMap<TaskId, TaskRecord>>,
    users: RwLock<HashMap<UserId, UserRecord>>,
    breakouts: RwLock<HashMap<(AccountId, MeetingId), BreakoutRecord>>,
}

impl Default for Tables {
    fn default() -> Self {
        Self::new()
    }
}

impl Tables {
    /// Creates empty tables.
    #[must_use]
    pub fn new() -> Self {
        Self {
            tasks: RwLock::new(HashMap::new()),
            users: RwLock::new(HashMap::new()),
            breakouts: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the rows of `table` matching `filter`, sorted by `order` if
    /// one is given.
    pub async fn select(&self, table: Table, filter: &RowFilter, order: Option<Order>) -> Vec<Row> {
        let mut rows: Vec<Row> = match table {
            Table::Tasks => {
                let tasks = self.tasks.read().await;
                tasks.values().cloned().map(Row::Task).collect()
            }
            Table::Users => {
                let users = self.users.read().await;
                users.values().cloned().map(Row::User).collect()
            }
            Table::Breakouts => {
                let breakouts = self.breakouts.read().await;
                breakouts.values().cloned().map(Row::Breakout).collect()
            }
        };
        rows.retain(|row| filter.matches(row));
        if let Some(order) = order {
            sort_rows(&mut rows, order);
        }
        rows
    }

    /// Inserts one row, rejecting key collisions.
    ///
    /// The stored row is echoed back so the caller can publish it.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::Duplicate`] when a row with the same key is
    /// already stored; the table is left unchanged.
    pub async fn insert(&self, row: Row) -> Result<Row, TableError> {
        match row {
            Row::Task(task) => {
                let mut tasks = self.tasks.write().await;
                if tasks.contains_key(&task.id) {
                    return Err(TableError::Duplicate(Table::Tasks));
                }
                tasks.insert(task.id, task.clone());
                Ok(Row::Task(task))
            }
            Row::User(user) => {
                let mut users = self.users.write().await;
                if users.contains_key(&user.id) {
                    return Err(TableError::Duplicate(Table::Users));
                }
                users.insert(user.id, user.clone());
                Ok(Row::User(user))
            }
            Row::Breakout(breakout) => {
                let mut breakouts = self.breakouts.write().await;
                let key = (breakout.account_id.clone(), breakout.meeting_id.clone());
                if breakouts.contains_key(&key) {
                    return Err(TableError::Duplicate(Table::Breakouts));
                }
                breakouts.insert(key, breakout.clone());
                Ok(Row::Breakout(breakout))
            }
        }
    }

    /// Applies `patch` to every row of `table` matching `filter`, returning
    /// the rows in their new state.
    ///
    /// Runs entirely under the table's write lock, so concurrent updates to
    /// the same row serialize instead of losing increments.
    ///
    /// # Errors
    ///
    /// Returns [`TableError::Patch`] when the patch variant does not apply
    /// to the table. All rows of a table share one variant, so a mismatch
    /// fails before any row changes.
    pub async fn update(
        &self,
        table: Table,
        filter: &RowFilter,
        patch: &Patch,
    ) -> Result<Vec<Row>, TableError> {
        let mut updated = Vec::new();
        match table {
            Table::Tasks => {
                let mut tasks = self.tasks.write().await;
                for task in tasks.values_mut() {
                    let mut row = Row::Task(task.clone());
                    if !filter.matches(&row) {
                        continue;
                    }
                    patch.apply_to(&mut row)?;
                    if let Some(new_task) = row.as_task() {
                        *task = new_task.clone();
                        updated.push(row);
                    }
                }
            }
            Table::Users => {
                let mut users = self.users.write().await;
                for user in users.values_mut() {
                    let mut row = Row::User(user.clone());
                    if !filter.matches(&row) {
                        continue;
                    }
                    patch.apply_to(&mut row)?;
                    if let Some(new_user) = row.as_user() {
                        *user = new_user.clone();
                        updated.push(row);
                    }
                }
            }
            Table::Breakouts => {
                let mut breakouts = self.breakouts.write().await;
                for breakout in breakouts.values_mut() {
                    let mut row = Row::Breakout(breakout.clone());
                    if !filter.matches(&row) {
                        continue;
                    }
                    patch.apply_to(&mut row)?;
                    if let Some(new_breakout) = row.as_breakout() {
                        *breakout = new_breakout.clone();
                        updated.push(row);
                    }
                }
            }
        }
        Ok(updated)
    }

    /// Removes every row of `table` matching `filter`, returning the rows
    /// in their last state.
    pub async fn delete(&self, table: Table, filter: &RowFilter) -> Vec<Row> {
        let mut removed = Vec::new();
        match table {
            Table::Tasks => {
                let mut tasks = self.tasks.write().await;
                let mut doomed = Vec::new();
                for task in tasks.values() {
                    if filter.matches(&Row::Task(task.clone())) {
                        doomed.push(task.id);
                    }
                }
                for id in doomed {
                    if let Some(task) = tasks.remove(&id) {
                        removed.push(Row::Task(task));
                    }
                }
            }
            Table::Users => {
                let mut users = self.users.write().await;
                let mut doomed = Vec::new();
                for user in users.values() {
                    if filter.matches(&Row::User(user.clone())) {
                        doomed.push(user.id);
                    }
                }
                for id in doomed {
                    if let Some(user) = users.remove(&id) {
                        removed.push(Row::User(user));
                    }
                }
            }
            Table::Breakouts => {
                let mut breakouts = self.breakouts.write().await;
                let mut doomed = Vec::new();
                for (key, breakout) in breakouts.iter() {
                    if filter.matches(&Row::Breakout(breakout.clone())) {
                        doomed.push(key.clone());
                    }
                }
                for key in doomed {
                    if let Some(breakout) = breakouts.remove(&key) {
                        removed.push(Row::Breakout(breakout));
                    }
                }
            }
        }
        removed
    }

    /// Total row count across all tables.
    pub async fn row_count(&self) -> usize {
        let tasks = self.tasks.read().await.len();
        let users = self.users.read().await.len();
        let breakouts = self.breakouts.read().await.len();
        tasks + users + breakouts
    }
}

/// Sorts rows newest-first by the requested key, tie-breaking on row id so
/// the order is stable across calls.
fn sort_rows(rows: &mut [Row], order: Order) {
    match order {
        Order::CreatedAtDesc => {
            rows.sort_by_key(|row| std::cmp::Reverse((created_key(row), row.row_id().copied())));
        }
        Order::CompletedAtDesc => {
            rows.sort_by_key(|row| std::cmp::Reverse((completed_key(row), row.row_id().copied())));
        }
    }
}

/// Creation instant of a row. Breakout rows have no creation stamp of
/// their own; their update stamp stands in.
fn created_key(row: &Row) -> Timestamp {
    match row {
        Row::Task(task) => task.created_at,
        Row::User(user) => user.created_at,
        Row::Breakout(breakout) => breakout.updated_at,
    }
}

/// Completion instant of a task row; rows without one sort last.
fn completed_key(row: &Row) -> Option<Timestamp> {
    row.as_task().and_then(|task| task.completed_at)
}
