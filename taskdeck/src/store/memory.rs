//! In-process store for tests and offline sessions.
//!
//! Holds the three tables in plain maps behind one [`parking_lot::Mutex`]
//! and applies the same matching, ordering, and patch semantics as the hub,
//! so controller logic behaves identically against either store. Change
//! events are delivered synchronously: by the time a mutation returns,
//! every matching feed already has the event queued.

use std::collections::HashMap;

use parking_lot::Mutex;
use taskdeck_proto::ids::{AccountId, MeetingId, SubscriptionId, TaskId, Timestamp, UserId};
use taskdeck_proto::records::{BreakoutRecord, TaskRecord, UserRecord};
use taskdeck_proto::store::{ChangeEvent, ChangeKind, Order, Patch, Row, RowFilter, Table};
use tokio::sync::mpsc;

use super::{ChangeFeed, StoreClient, StoreError};

struct FeedEntry {
    id: SubscriptionId,
    table: Table,
    filter: RowFilter,
    sender: mpsc::UnboundedSender<ChangeEvent>,
}

#[derive(Default)]
struct Inner {
    tasks: HashMap<TaskId, TaskRecord>,
    users: HashMap<UserId, UserRecord>,
    breakouts: HashMap<(AccountId, MeetingId), BreakoutRecord>,
    feeds: Vec<FeedEntry>,
}

impl Inner {
    fn rows_of(&self, table: Table) -> Vec<Row> {
        match table {
            Table::Tasks => self.tasks.values().cloned().map(Row::Task).collect(),
            Table::Users => self.users.values().cloned().map(Row::User).collect(),
            Table::Breakouts => self
                .breakouts
                .values()
                .cloned()
                .map(Row::Breakout)
                .collect(),
        }
    }

    fn store_row(&mut self, row: Row) {
        match row {
            Row::Task(task) => {
                self.tasks.insert(task.id, task);
            }
            Row::User(user) => {
                self.users.insert(user.id, user);
            }
            Row::Breakout(breakout) => {
                self.breakouts.insert(
                    (breakout.account_id.clone(), breakout.meeting_id.clone()),
                    breakout,
                );
            }
        }
    }

    fn contains(&self, row: &Row) -> bool {
        match row {
            Row::Task(task) => self.tasks.contains_key(&task.id),
            Row::User(user) => self.users.contains_key(&user.id),
            Row::Breakout(breakout) => self
                .breakouts
                .contains_key(&(breakout.account_id.clone(), breakout.meeting_id.clone())),
        }
    }

    fn remove_row(&mut self, row: &Row) {
        match row {
            Row::Task(task) => {
                self.tasks.remove(&task.id);
            }
            Row::User(user) => {
                self.users.remove(&user.id);
            }
            Row::Breakout(breakout) => {
                self.breakouts
                    .remove(&(breakout.account_id.clone(), breakout.meeting_id.clone()));
            }
        }
    }

    /// Sends `event` to every live feed watching its table; dead feeds are
    /// pruned as a side effect.
    fn publish(&mut self, event: &ChangeEvent) {
        let table = event.row.table();
        self.feeds.retain(|feed| {
            if feed.table != table || !feed.filter.matches(&event.row) {
                return !feed.sender.is_closed();
            }
            feed.sender.send(event.clone()).is_ok()
        });
    }
}

/// In-process [`StoreClient`] implementation.
#[derive(Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
}

impl MemoryStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Total row count across all tables, for test assertions.
    #[must_use]
    pub fn row_count(&self) -> usize {
        let inner = self.inner.lock();
        inner.tasks.len() + inner.users.len() + inner.breakouts.len()
    }
}

impl StoreClient for MemoryStore {
    async fn select(
        &self,
        table: Table,
        filter: RowFilter,
        order: Option<Order>,
    ) -> Result<Vec<Row>, StoreError> {
        let mut rows = self.inner.lock().rows_of(table);
        rows.retain(|row| filter.matches(row));
        if let Some(order) = order {
            sort_rows(&mut rows, order);
        }
        Ok(rows)
    }

    async fn insert(&self, row: Row) -> Result<Row, StoreError> {
        let mut inner = self.inner.lock();
        if inner.contains(&row) {
            return Err(StoreError::Rejected(format!(
                "row already exists in {}",
                row.table()
            )));
        }
        inner.store_row(row.clone());
        inner.publish(&ChangeEvent {
            kind: ChangeKind::Insert,
            row: row.clone(),
        });
        Ok(row)
    }

    async fn update(
        &self,
        table: Table,
        filter: RowFilter,
        patch: Patch,
    ) -> Result<Vec<Row>, StoreError> {
        let mut inner = self.inner.lock();
        let mut updated = Vec::new();
        for mut row in inner.rows_of(table) {
            if !filter.matches(&row) {
                continue;
            }
            patch
                .apply_to(&mut row)
                .map_err(|e| StoreError::Rejected(e.to_string()))?;
            updated.push(row);
        }
        for row in &updated {
            inner.store_row(row.clone());
            inner.publish(&ChangeEvent {
                kind: ChangeKind::Update,
                row: row.clone(),
            });
        }
        Ok(updated)
    }

    async fn delete(&self, table: Table, filter: RowFilter) -> Result<usize, StoreError> {
        let mut inner = self.inner.lock();
        let mut doomed = inner.rows_of(table);
        doomed.retain(|row| filter.matches(row));
        for row in &doomed {
            inner.remove_row(row);
            inner.publish(&ChangeEvent {
                kind: ChangeKind::Delete,
                row: row.clone(),
            });
        }
        Ok(doomed.len())
    }

    async fn subscribe(&self, table: Table, filter: RowFilter) -> Result<ChangeFeed, StoreError> {
        let id = SubscriptionId::new();
        let (sender, receiver) = mpsc::unbounded_channel();
        self.inner.lock().feeds.push(FeedEntry {
            id,
            table,
            filter,
            sender,
        });
        Ok(ChangeFeed::new(id, receiver))
    }

    async fn unsubscribe(&self, id: SubscriptionId) -> Result<(), StoreError> {
        self.inner.lock().feeds.retain(|feed| feed.id != id);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        true
    }
}

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

fn created_key(row: &Row) -> Timestamp {
    match row {
        Row::Task(task) => task.created_at,
        Row::User(user) => user.created_at,
        Row::Breakout(breakout) => breakout.updated_at,
    }
}

fn completed_key(row: &Row) -> Option<Timestamp> {
    row.as_task().and_then(|task| task.completed_at)
}
