//! Session coordinator wiring the TUI to the store.
//!
//! Bridges the synchronous TUI event loop (crossterm poll-based) with the
//! async store stack. One background task owns the session state — the
//! [`TaskListController`], the [`BreakoutSwitch`], and the change-feed
//! subscriptions — and talks to the main thread over channels.
//!
//! # Architecture
//!
//! ```text
//! TUI (main thread)  ←── NetEvent ───  session task ── StoreClient ── hub
//!                     ─── NetCommand →              └─ change feeds ─┘
//! ```
//!
//! The main thread sends [`NetCommand`]s and drains [`NetEvent`]s on each
//! tick of the poll-based event loop. The session task serializes every
//! store round-trip, so list state has exactly one owner.

use std::sync::Arc;

use taskdeck_proto::ids::{ClientId, TaskId};
use taskdeck_proto::records::{CompletedTask, ReactionKind, TaskRecord, UserRecord};
use taskdeck_proto::store::{RowFilter, Table};
use tokio::sync::mpsc;

use crate::breakouts::BreakoutSwitch;
use crate::session::{self, NameSaveError, SessionKeys};
use crate::store::memory::MemoryStore;
use crate::store::remote::RemoteStore;
use crate::store::{ChangeFeed, StoreClient};
use crate::tasks::{AddOutcome, TaskListController};

/// Commands sent from the TUI main loop to the session task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NetCommand {
    /// Validate and store a new task.
    AddTask {
        /// Raw draft text; trimming and validation happen here.
        text: String,
    },
    /// Mark a task completed.
    CompleteTask {
        /// The task to complete.
        id: TaskId,
    },
    /// Delete a task outright.
    DeleteTask {
        /// The task to delete.
        id: TaskId,
    },
    /// Add one reaction to a completed task.
    AddReaction {
        /// The task the reaction targets.
        id: TaskId,
        /// Which counter to bump.
        kind: ReactionKind,
    },
    /// Record that a timer was started on a task.
    RecordTimerUse {
        /// The task the timer ran against.
        id: TaskId,
        /// Timer length in minutes.
        minutes: u32,
    },
    /// Swap two active tasks by position (local order only).
    MoveTask {
        /// Position of the task being moved.
        from: usize,
        /// Position it swaps with.
        to: usize,
    },
    /// Validate and persist a display name from the name gate.
    SaveName {
        /// Raw gate input.
        input: String,
    },
    /// Flip the breakout opt-in flag.
    ToggleBreakout,
    /// Gracefully shut down the session task.
    Shutdown,
}

/// Why an add was rejected without a row being stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddRejection {
    /// The text was empty after trimming.
    Empty,
    /// The text exceeds the length limit.
    TooLong {
        /// Actual length in characters.
        chars: usize,
        /// Maximum allowed length.
        max: usize,
    },
    /// Three tasks are already active.
    AtCapacity,
    /// No display name is set; the gate should collect one.
    NameNeeded,
    /// The store refused or is unreachable.
    StoreFailed,
}

/// Events sent from the session task to the TUI main loop.
#[derive(Debug)]
pub enum NetEvent {
    /// Connection status update.
    Status {
        /// Whether writes are synced through a hub.
        connected: bool,
        /// Human-readable description for the status bar.
        detail: String,
    },
    /// The session finished bootstrapping its identity.
    Session {
        /// Display name adopted from the user row, if one exists.
        display_name: Option<String>,
        /// Whether the session runs under generated preview keys.
        preview: bool,
    },
    /// Full snapshot of the active list, in display order.
    ActiveTasks(Vec<TaskRecord>),
    /// Full snapshot of the recently-completed view, most recent first.
    CompletedTasks(Vec<CompletedTask>),
    /// A locally added task was confirmed by the store.
    TaskAdded(TaskRecord),
    /// An add was rejected before or by the store.
    AddRejected {
        /// Why it was rejected.
        reason: AddRejection,
        /// The raw text, so it can be queued or restored.
        text: String,
    },
    /// A locally completed task was confirmed; celebrate exactly once.
    TaskCompleted(CompletedTask),
    /// The name gate's input was saved.
    NameSaved(String),
    /// The name gate's input was rejected; message shown verbatim.
    NameRejected(String),
    /// Current breakout opt-in state (`None` while unresolved).
    Breakout(Option<bool>),
}

/// Configuration for the session task.
#[derive(Debug, Clone)]
pub struct NetConfig {
    /// WebSocket URL of the sync hub; `None` runs an offline session
    /// against an in-process store.
    pub hub_url: Option<String>,
    /// The session's identity keys.
    pub keys: SessionKeys,
}

/// Capacity of the command and event channels.
const CHANNEL_CAPACITY: usize = 256;

/// Connects (or goes offline) and spawns the session task.
///
/// # Errors
///
/// Returns a user-facing error string when the hub is configured but
/// unreachable; the caller decides whether to exit or retry.
pub async fn spawn_net(
    config: NetConfig,
) -> Result<(mpsc::Sender<NetCommand>, mpsc::Receiver<NetEvent>), String> {
    match config.hub_url {
        None => {
            tracing::info!("starting offline session");
            Ok(spawn_session(
                Arc::new(MemoryStore::new()),
                config.keys,
                false,
                "offline session".to_string(),
            ))
        }
        Some(url) => {
            let store = RemoteStore::connect(
                &url,
                ClientId::new(),
                config.keys.account_id.clone(),
                config.keys.meeting_id.clone(),
            )
            .await
            .map_err(|e| e.to_string())?;
            Ok(spawn_session(
                Arc::new(store),
                config.keys,
                true,
                format!("synced via {url}"),
            ))
        }
    }
}

/// Spawns the session task over an already-built store.
///
/// Split out of [`spawn_net`] so tests (and the offline path) can run the
/// full session flow against any [`StoreClient`].
pub fn spawn_session<S: StoreClient + 'static>(
    store: Arc<S>,
    keys: SessionKeys,
    connected: bool,
    detail: String,
) -> (mpsc::Sender<NetCommand>, mpsc::Receiver<NetEvent>) {
    let (cmd_tx, cmd_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (evt_tx, evt_rx) = mpsc::channel(CHANNEL_CAPACITY);
    tokio::spawn(run_session(store, keys, cmd_rx, evt_tx, connected, detail));
    (cmd_tx, evt_rx)
}

/// Session state owned by the background task.
struct Session<S: StoreClient> {
    store: Arc<S>,
    keys: SessionKeys,
    user: Option<UserRecord>,
    controller: TaskListController<S>,
    switch: BreakoutSwitch,
    events: mpsc::Sender<NetEvent>,
    connected: bool,
}

impl<S: StoreClient> Session<S> {
    async fn emit(&self, event: NetEvent) {
        let _ = self.events.send(event).await;
    }

    async fn emit_active(&self) {
        self.emit(NetEvent::ActiveTasks(self.controller.active().to_vec()))
            .await;
    }

    async fn emit_completed(&self) {
        self.emit(NetEvent::CompletedTasks(self.controller.completed().to_vec()))
            .await;
    }

    async fn announce_disconnect(&mut self) {
        if self.connected {
            self.connected = false;
            self.emit(NetEvent::Status {
                connected: false,
                detail: "connection to the hub lost".to_string(),
            })
            .await;
        }
    }

    /// Handles one command; returns `false` on shutdown.
    async fn handle_command(&mut self, cmd: NetCommand) -> bool {
        match cmd {
            NetCommand::AddTask { text } => {
                let rejection = match self.controller.add_task(&text).await {
                    AddOutcome::Added(record) => {
                        self.emit(NetEvent::TaskAdded(record)).await;
                        self.emit_active().await;
                        None
                    }
                    AddOutcome::EmptyText => Some(AddRejection::Empty),
                    AddOutcome::TooLong { chars, max } => {
                        Some(AddRejection::TooLong { chars, max })
                    }
                    AddOutcome::AtCapacity => Some(AddRejection::AtCapacity),
                    AddOutcome::NameNeeded => Some(AddRejection::NameNeeded),
                    AddOutcome::StoreFailed => Some(AddRejection::StoreFailed),
                };
                if let Some(reason) = rejection {
                    self.emit(NetEvent::AddRejected { reason, text }).await;
                }
            }
            NetCommand::CompleteTask { id } => {
                if let Some(completed) = self.controller.complete_task(id).await {
                    self.emit(NetEvent::TaskCompleted(completed)).await;
                    self.emit_active().await;
                    self.emit_completed().await;
                }
            }
            NetCommand::DeleteTask { id } => {
                if self.controller.delete_task(id).await {
                    self.emit_active().await;
                    self.emit_completed().await;
                }
            }
            NetCommand::AddReaction { id, kind } => {
                if self.controller.add_reaction(id, kind).await.is_some() {
                    self.emit_completed().await;
                }
            }
            NetCommand::RecordTimerUse { id, minutes } => {
                self.controller.record_timer_use(id, minutes).await;
                self.emit_active().await;
            }
            NetCommand::MoveTask { from, to } => {
                if self.controller.move_task(from, to) {
                    self.emit_active().await;
                }
            }
            NetCommand::SaveName { input } => self.save_name(&input).await,
            NetCommand::ToggleBreakout => {
                let name = self
                    .user
                    .as_ref()
                    .map(|u| u.name.clone())
                    .unwrap_or_default();
                self.switch.toggle(&*self.store, &name).await;
                self.emit(NetEvent::Breakout(self.switch.joining())).await;
            }
            NetCommand::Shutdown => {
                tracing::info!("session task shutting down");
                return false;
            }
        }
        true
    }

    async fn save_name(&mut self, input: &str) {
        match session::save_name(&*self.store, &self.keys, self.user.as_ref(), input).await {
            Ok(record) => {
                self.controller.set_display_name(record.name.clone());
                self.switch.ensure(&*self.store, &record).await;
                self.emit(NetEvent::NameSaved(record.name.clone())).await;
                self.emit(NetEvent::Breakout(self.switch.joining())).await;
                self.user = Some(record);
            }
            Err(NameSaveError::Invalid(e)) => {
                self.emit(NetEvent::NameRejected(e.to_string())).await;
            }
            Err(NameSaveError::Store(e)) => {
                tracing::warn!(error = %e, "could not persist the display name");
                self.emit(NetEvent::NameRejected(
                    "could not save your name, please try again".to_string(),
                ))
                .await;
            }
        }
    }
}

/// Waits on an optional feed; never resolves once the feed is gone.
async fn next_change(
    feed: &mut Option<ChangeFeed>,
) -> Option<taskdeck_proto::store::ChangeEvent> {
    match feed.as_mut() {
        Some(feed) => feed.next().await,
        None => std::future::pending().await,
    }
}

async fn run_session<S: StoreClient + 'static>(
    store: Arc<S>,
    keys: SessionKeys,
    mut cmd_rx: mpsc::Receiver<NetCommand>,
    events: mpsc::Sender<NetEvent>,
    connected: bool,
    detail: String,
) {
    let user = session::bootstrap_user(&*store, &keys).await;
    let mut controller = TaskListController::new(
        Arc::clone(&store),
        keys.account_id.clone(),
        keys.meeting_id.clone(),
        user.as_ref().map(|u| u.name.clone()),
    );
    let switch = BreakoutSwitch::new(keys.account_id.clone(), keys.meeting_id.clone());

    let _ = events.send(NetEvent::Status { connected, detail }).await;
    let _ = events
        .send(NetEvent::Session {
            display_name: user.as_ref().map(|u| u.name.clone()),
            preview: keys.preview,
        })
        .await;

    controller.fetch_active().await;
    let _ = events
        .send(NetEvent::ActiveTasks(controller.active().to_vec()))
        .await;
    controller.fetch_recently_completed().await;
    let _ = events
        .send(NetEvent::CompletedTasks(controller.completed().to_vec()))
        .await;

    let mut session = Session {
        store,
        keys,
        user,
        controller,
        switch,
        events,
        connected,
    };
    if let Some(user) = session.user.clone() {
        session.switch.ensure(&*session.store, &user).await;
    }

    // Feeds open before the Breakout event goes out, so once a consumer
    // sees it every later store write is guaranteed to flow back.
    let mut task_feed = open_feed(
        &*session.store,
        Table::Tasks,
        RowFilter::any().with_account(session.keys.account_id.clone()),
    )
    .await;
    let mut breakout_feed = open_feed(
        &*session.store,
        Table::Breakouts,
        RowFilter::any()
            .with_account(session.keys.account_id.clone())
            .with_meeting(session.keys.meeting_id.clone()),
    )
    .await;
    session
        .emit(NetEvent::Breakout(session.switch.joining()))
        .await;

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else { break };
                if !session.handle_command(cmd).await {
                    break;
                }
            }
            event = next_change(&mut task_feed) => match event {
                Some(event) => {
                    session.controller.apply_change(&event);
                    session.emit_completed().await;
                }
                None => {
                    task_feed = None;
                    session.announce_disconnect().await;
                }
            },
            event = next_change(&mut breakout_feed) => match event {
                Some(event) => {
                    session.switch.apply_change(&event);
                    session.emit(NetEvent::Breakout(session.switch.joining())).await;
                }
                None => {
                    breakout_feed = None;
                    session.announce_disconnect().await;
                }
            },
        }
    }

    for feed in [task_feed, breakout_feed].into_iter().flatten() {
        if let Err(e) = session.store.unsubscribe(feed.id()).await {
            tracing::debug!(error = %e, "could not close a subscription on shutdown");
        }
    }
    tracing::info!("session task finished");
}

async fn open_feed<S: StoreClient>(
    store: &S,
    table: Table,
    filter: RowFilter,
) -> Option<ChangeFeed> {
    match store.subscribe(table, filter).await {
        Ok(feed) => Some(feed),
        Err(e) => {
            tracing::warn!(error = %e, %table, "could not open a change feed");
            None
        }
    }
}
