//! The full client stack wired together: crossterm key events drive an
//! [`App`] whose commands flow through a live session task to a real hub
//! and back into the panels.
//!
//! Validates:
//! - `spawn_net` against a real hub delivers the whole bootstrap sequence
//! - Keystrokes become hub writes; confirmations bind slots and panels
//! - The name gate interposes once and releases the queued add
//! - Two UIs on one account converge on the completed view
//! - Shutdown closes the event channel; a dead hub is a connect error

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use taskdeck::app::App;
use taskdeck::effects::NullChime;
use taskdeck::net::{NetCommand, NetConfig, NetEvent, spawn_net};
use taskdeck::session::SessionKeys;
use taskdeck::tasks::DraftCommit;
use taskdeck::timer::{TimerEvent, TimerOwner};
use taskdeck_hub::hub::start_server;
use taskdeck_proto::ids::{AccountId, MeetingId};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

async fn start_hub() -> String {
    let (addr, _handle) = start_server("127.0.0.1:0").await.expect("hub should bind");
    format!("ws://{addr}/ws")
}

fn keys(account: &str) -> SessionKeys {
    SessionKeys {
        account_id: AccountId::from(account),
        meeting_id: MeetingId::from("meet-ui"),
        preview: false,
    }
}

/// One connected client: the app plus both ends of its session channels.
struct Ui {
    app: App,
    cmd_tx: mpsc::Sender<NetCommand>,
    evt_rx: mpsc::Receiver<NetEvent>,
    _timer_rx: mpsc::UnboundedReceiver<TimerEvent>,
    _draft_rx: mpsc::UnboundedReceiver<DraftCommit>,
}

/// Connects to the hub and plays the bootstrap into a fresh [`App`].
async fn open_ui(url: &str, account: &str) -> Ui {
    let config = NetConfig {
        hub_url: Some(url.to_string()),
        keys: keys(account),
    };
    let (cmd_tx, evt_rx) = spawn_net(config).await.expect("session should connect");
    let (timer_tx, timer_rx) = mpsc::unbounded_channel();
    let (draft_tx, draft_rx) = mpsc::unbounded_channel();
    let app = App::new(None, Arc::new(NullChime), timer_tx, draft_tx);
    let mut ui = Ui {
        app,
        cmd_tx,
        evt_rx,
        _timer_rx: timer_rx,
        _draft_rx: draft_rx,
    };
    // Status, Session, ActiveTasks, CompletedTasks, Breakout.
    for _ in 0..5 {
        let event = next_event(&mut ui.evt_rx).await;
        apply(&mut ui, event).await;
    }
    ui
}

async fn next_event(rx: &mut mpsc::Receiver<NetEvent>) -> NetEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a session event")
        .expect("session task ended early")
}

/// Applies one session event, forwarding any follow-up command.
async fn apply(ui: &mut Ui, event: NetEvent) {
    if let Some(command) = ui.app.apply_net_event(event) {
        ui.cmd_tx.send(command).await.expect("session task alive");
    }
}

/// Presses one key, forwarding the command it produced, if any.
async fn press(ui: &mut Ui, code: KeyCode) {
    let key = KeyEvent::new(code, KeyModifiers::NONE);
    if let Some(command) = ui.app.handle_key_event(key) {
        ui.cmd_tx.send(command).await.expect("session task alive");
    }
}

async fn type_text(ui: &mut Ui, text: &str) {
    for c in text.chars() {
        press(ui, KeyCode::Char(c)).await;
    }
}

/// Pumps session events into the app until `done` observes the state it is
/// waiting for.
async fn pump_until(ui: &mut Ui, done: impl Fn(&App) -> bool) {
    for _ in 0..100 {
        if done(&ui.app) {
            return;
        }
        let event = next_event(&mut ui.evt_rx).await;
        apply(ui, event).await;
    }
    panic!("app never reached the expected state");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn bootstrap_flows_into_the_app() {
    let url = start_hub().await;
    let ui = open_ui(&url, "acct-ui-boot").await;

    assert!(ui.app.connected);
    assert!(ui.app.connection_detail.contains("synced via"));
    assert_eq!(ui.app.display_name, None);
    assert!(!ui.app.preview);
    assert!(ui.app.active.is_empty());
    assert!(ui.app.completed.is_empty());
    assert_eq!(ui.app.breakout, None);
}

#[tokio::test]
async fn keystrokes_write_through_the_hub_and_bind_the_slot() {
    let url = start_hub().await;
    let mut ui = open_ui(&url, "acct-ui-flow").await;

    // ===== The submitted draft runs into the name gate =====
    type_text(&mut ui, "ship the release").await;
    press(&mut ui, KeyCode::Enter).await;
    pump_until(&mut ui, |app| app.name_gate.is_some()).await;

    // ===== Saving a name releases the queued add =====
    type_text(&mut ui, "Ada").await;
    press(&mut ui, KeyCode::Enter).await;
    pump_until(&mut ui, |app| app.active.len() == 1).await;

    assert_eq!(ui.app.display_name.as_deref(), Some("Ada"));
    assert!(ui.app.name_gate.is_none());
    let added = ui.app.active[0].clone();
    assert_eq!(added.text, "ship the release");
    assert_eq!(added.owner_name, "Ada");
    assert_eq!(ui.app.slots[0].timer.owner(), TimerOwner::Task(added.id));
    assert!(ui.app.slots[0].draft.is_empty());

    // ===== Completing celebrates and fills the other panel =====
    press(&mut ui, KeyCode::Char('x')).await;
    pump_until(&mut ui, |app| app.completed.len() == 1).await;

    assert!(ui.app.active.is_empty());
    assert!(ui.app.celebration.is_some());
    assert_eq!(ui.app.completed[0].text, "ship the release");
    assert_eq!(ui.app.completed[0].completed_by, "Ada");
}

#[tokio::test]
async fn two_uis_converge_on_the_completed_view() {
    let url = start_hub().await;
    let mut ada = open_ui(&url, "acct-ui-share").await;
    let mut grace = open_ui(&url, "acct-ui-share").await;

    // Ada names herself, adds, and completes while Grace only watches.
    type_text(&mut ada, "shared retro notes").await;
    press(&mut ada, KeyCode::Enter).await;
    pump_until(&mut ada, |app| app.name_gate.is_some()).await;
    type_text(&mut ada, "Ada").await;
    press(&mut ada, KeyCode::Enter).await;
    pump_until(&mut ada, |app| app.active.len() == 1).await;
    press(&mut ada, KeyCode::Char('x')).await;
    pump_until(&mut ada, |app| app.completed.len() == 1).await;

    // The change feed carries the completion into Grace's panel. Her slots
    // stay untouched: another client's writes never rearrange them.
    pump_until(&mut grace, |app| app.completed.len() == 1).await;
    assert_eq!(grace.app.completed[0].text, "shared retro notes");
    assert_eq!(grace.app.completed[0].completed_by, "Ada");
    assert!(grace.app.active.is_empty());
}

#[tokio::test]
async fn shutdown_closes_the_session_channel() {
    let url = start_hub().await;
    let mut ui = open_ui(&url, "acct-ui-down").await;

    ui.cmd_tx
        .send(NetCommand::Shutdown)
        .await
        .expect("session task alive");
    loop {
        match tokio::time::timeout(Duration::from_secs(5), ui.evt_rx.recv())
            .await
            .expect("timed out waiting for the channel to close")
        {
            Some(_) => {}
            None => break,
        }
    }
}

#[tokio::test]
async fn unreachable_hub_is_a_connect_error() {
    // The discard port: nothing speaks WebSocket there.
    let config = NetConfig {
        hub_url: Some("ws://127.0.0.1:9/ws".to_string()),
        keys: keys("acct-ui-dead"),
    };
    let err = spawn_net(config)
        .await
        .expect_err("connecting to a dead port must fail");
    assert!(!err.is_empty());
}
