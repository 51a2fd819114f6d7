//! Store-backed controller for the active list and the completed view.

use std::sync::Arc;

use taskdeck_proto::ids::{AccountId, MeetingId, TaskId, Timestamp};
use taskdeck_proto::records::{
    COMPLETED_WINDOW_MS, CompletedTask, ReactionKind, TaskRecord, TaskTextError,
    validate_task_text,
};
use taskdeck_proto::store::{ChangeEvent, ChangeKind, Order, Patch, Row, RowFilter, Table};

use crate::store::StoreClient;

/// Maximum number of active (not yet completed) tasks per session.
pub const MAX_ACTIVE_TASKS: usize = 3;

/// Maximum number of entries kept in the recently-completed view.
pub const COMPLETED_VIEW_CAP: usize = 50;

/// What came of an [`TaskListController::add_task`] call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    /// The task was stored; the confirmed row is echoed back.
    Added(TaskRecord),
    /// The text was empty after trimming; nothing was sent.
    EmptyText,
    /// The text exceeds the length limit; nothing was sent.
    TooLong {
        /// Actual length in characters.
        chars: usize,
        /// Maximum allowed length in characters.
        max: usize,
    },
    /// Three tasks are already active; nothing was sent.
    AtCapacity,
    /// No display name is set yet; the caller should collect one and retry.
    NameNeeded,
    /// The store refused or the connection is gone; details were logged.
    StoreFailed,
}

/// Owns the session's task lists and performs their store round-trips.
///
/// Remote failures never escape: they are logged and the local state simply
/// does not advance, so the panels always render whatever was last
/// confirmed. The change feed is applied through [`apply_change`], which
/// only ever touches the completed view — the active list changes on
/// confirmed local operations alone.
///
/// [`apply_change`]: TaskListController::apply_change
pub struct TaskListController<S> {
    store: Arc<S>,
    account_id: AccountId,
    meeting_id: MeetingId,
    display_name: Option<String>,
    active: Vec<TaskRecord>,
    completed: Vec<CompletedTask>,
}

impl<S: StoreClient> TaskListController<S> {
    /// Creates a controller with empty lists.
    pub fn new(
        store: Arc<S>,
        account_id: AccountId,
        meeting_id: MeetingId,
        display_name: Option<String>,
    ) -> Self {
        Self {
            store,
            account_id,
            meeting_id,
            display_name,
            active: Vec::new(),
            completed: Vec::new(),
        }
    }

    /// The active tasks, in display order.
    #[must_use]
    pub fn active(&self) -> &[TaskRecord] {
        &self.active
    }

    /// The recently-completed view, most recent first.
    #[must_use]
    pub fn completed(&self) -> &[CompletedTask] {
        &self.completed
    }

    /// The display name currently attached to the session, if any.
    #[must_use]
    pub fn display_name(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    /// Adopts a display name, typically after the name gate saves one.
    pub fn set_display_name(&mut self, name: String) {
        self.display_name = Some(name);
    }

    /// Reloads the active list: the account's non-completed tasks,
    /// most recently created first.
    pub async fn fetch_active(&mut self) {
        let filter = RowFilter::any()
            .with_account(self.account_id.clone())
            .with_completed(false);
        match self
            .store
            .select(Table::Tasks, filter, Some(Order::CreatedAtDesc))
            .await
        {
            Ok(rows) => {
                self.active = rows.into_iter().filter_map(Row::into_task).collect();
            }
            Err(e) => tracing::warn!(error = %e, "could not fetch active tasks"),
        }
    }

    /// Reloads the completed view: tasks completed inside the trailing
    /// three-hour window, most recently completed first, capped at
    /// [`COMPLETED_VIEW_CAP`].
    pub async fn fetch_recently_completed(&mut self) {
        let window_start = Timestamp::now().saturating_sub_millis(COMPLETED_WINDOW_MS);
        let filter = RowFilter::any()
            .with_account(self.account_id.clone())
            .with_completed(true)
            .with_completed_after(window_start);
        match self
            .store
            .select(Table::Tasks, filter, Some(Order::CompletedAtDesc))
            .await
        {
            Ok(rows) => {
                self.completed = rows
                    .iter()
                    .filter_map(Row::as_task)
                    .map(CompletedTask::project)
                    .take(COMPLETED_VIEW_CAP)
                    .collect();
            }
            Err(e) => tracing::warn!(error = %e, "could not fetch completed tasks"),
        }
    }

    /// Validates and stores a new task.
    ///
    /// The local list only grows when the store confirms the row; the
    /// confirmed row lands at the end of the active list so existing tasks
    /// keep their slots.
    pub async fn add_task(&mut self, text: &str) -> AddOutcome {
        let trimmed = match validate_task_text(text) {
            Ok(trimmed) => trimmed,
            Err(TaskTextError::Empty) => return AddOutcome::EmptyText,
            Err(TaskTextError::TooLong { chars, max }) => {
                return AddOutcome::TooLong { chars, max };
            }
        };
        if self.active.len() >= MAX_ACTIVE_TASKS {
            return AddOutcome::AtCapacity;
        }
        let Some(owner_name) = self.display_name.clone() else {
            return AddOutcome::NameNeeded;
        };

        let record = TaskRecord::new(
            trimmed.to_string(),
            owner_name,
            self.account_id.clone(),
            self.meeting_id.clone(),
        );
        match self.store.insert(Row::Task(record)).await {
            Ok(Row::Task(confirmed)) => {
                self.active.push(confirmed.clone());
                AddOutcome::Added(confirmed)
            }
            Ok(row) => {
                tracing::warn!(table = %row.table(), "insert echoed a row from the wrong table");
                AddOutcome::StoreFailed
            }
            Err(e) => {
                tracing::warn!(error = %e, "could not add task");
                AddOutcome::StoreFailed
            }
        }
    }

    /// Marks a task completed, stamping now and the session's display name.
    ///
    /// Returns the completed-view projection when the store confirms, so
    /// the caller can celebrate exactly once per local completion. The row
    /// leaves the active list and enters the completed view at the front.
    pub async fn complete_task(&mut self, id: TaskId) -> Option<CompletedTask> {
        let patch = Patch::CompleteTask {
            at: Timestamp::now(),
            by: self.display_name.clone().unwrap_or_default(),
        };
        let filter = RowFilter::any().with_id(*id.as_uuid());
        match self.store.update(Table::Tasks, filter, patch).await {
            Ok(rows) => {
                let completed = rows.iter().filter_map(Row::as_task).next().map(|task| {
                    let projected = CompletedTask::project(task);
                    self.upsert_completed(projected.clone());
                    projected
                })?;
                self.active.retain(|task| task.id != id);
                Some(completed)
            }
            Err(e) => {
                tracing::warn!(error = %e, %id, "could not complete task");
                None
            }
        }
    }

    /// Deletes a task row outright. There is no undo.
    ///
    /// Returns whether a row was actually removed.
    pub async fn delete_task(&mut self, id: TaskId) -> bool {
        let filter = RowFilter::any().with_id(*id.as_uuid());
        match self.store.delete(Table::Tasks, filter).await {
            Ok(count) => {
                self.active.retain(|task| task.id != id);
                self.completed.retain(|task| task.id != id);
                count > 0
            }
            Err(e) => {
                tracing::warn!(error = %e, %id, "could not delete task");
                false
            }
        }
    }

    /// Sends one atomic reaction increment and adopts the confirmed counts.
    ///
    /// The completed-view entry keeps its position; only its counters
    /// change. Returns the refreshed projection when the store confirms.
    pub async fn add_reaction(
        &mut self,
        id: TaskId,
        kind: ReactionKind,
    ) -> Option<CompletedTask> {
        let filter = RowFilter::any().with_id(*id.as_uuid());
        match self
            .store
            .update(Table::Tasks, filter, Patch::AddReaction(kind))
            .await
        {
            Ok(rows) => {
                let projected = rows
                    .iter()
                    .filter_map(Row::as_task)
                    .next()
                    .map(CompletedTask::project)?;
                self.upsert_completed(projected.clone());
                Some(projected)
            }
            Err(e) => {
                tracing::warn!(error = %e, %id, %kind, "could not add reaction");
                None
            }
        }
    }

    /// Records that a timer of `minutes` was started on a task.
    ///
    /// Fire-and-forget bookkeeping: a failure only means the row keeps its
    /// old timer fields.
    pub async fn record_timer_use(&mut self, id: TaskId, minutes: u32) {
        let filter = RowFilter::any().with_id(*id.as_uuid());
        match self
            .store
            .update(Table::Tasks, filter, Patch::RecordTimerUse { minutes })
            .await
        {
            Ok(rows) => {
                if let Some(confirmed) = rows.into_iter().filter_map(Row::into_task).next()
                    && let Some(local) = self.active.iter_mut().find(|task| task.id == id)
                {
                    *local = confirmed;
                }
            }
            Err(e) => tracing::warn!(error = %e, %id, "could not record timer use"),
        }
    }

    /// Applies one change-feed event.
    ///
    /// Only the completed view reacts: completed rows are upserted, deleted
    /// rows drop out. The active list never moves on feed traffic, so
    /// another client's writes cannot shuffle this session's slots.
    pub fn apply_change(&mut self, event: &ChangeEvent) {
        let Some(task) = event.row.as_task() else {
            return;
        };
        match event.kind {
            ChangeKind::Delete => {
                self.completed.retain(|entry| entry.id != task.id);
            }
            ChangeKind::Insert | ChangeKind::Update => {
                if task.completed {
                    self.upsert_completed(CompletedTask::project(task));
                }
            }
        }
    }

    /// Swaps two active tasks by position. The new order is local only and
    /// is lost on reload.
    pub fn move_task(&mut self, from: usize, to: usize) -> bool {
        if from == to || from >= self.active.len() || to >= self.active.len() {
            return false;
        }
        self.active.swap(from, to);
        true
    }

    /// Inserts or refreshes one completed-view entry.
    ///
    /// A known id is replaced in place so reaction updates do not reorder
    /// the view; a new id enters at the front. The view never exceeds
    /// [`COMPLETED_VIEW_CAP`].
    fn upsert_completed(&mut self, task: CompletedTask) {
        if let Some(existing) = self.completed.iter_mut().find(|entry| entry.id == task.id) {
            *existing = task;
        } else {
            self.completed.insert(0, task);
            self.completed.truncate(COMPLETED_VIEW_CAP);
        }
    }
}
