//! Session identity over a live hub: bootstrap order, user rows, and the
//! name gate.
//!
//! Validates:
//! - A fresh account boots connected, nameless, with empty snapshots
//! - A saved display name is adopted by the next connection
//! - Reconnecting from a new meeting refreshes the stored meeting key
//! - The gate queues an add until a name is saved, over the wire

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::time::Duration;

use taskdeck::net::{AddRejection, NetCommand, NetConfig, NetEvent, spawn_net};
use taskdeck::session::SessionKeys;
use taskdeck::store::StoreClient;
use taskdeck::store::remote::RemoteStore;
use taskdeck_hub::hub::start_server;
use taskdeck_proto::ids::{AccountId, ClientId, MeetingId};
use taskdeck_proto::store::{RowFilter, Table};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

async fn start_hub() -> String {
    let (addr, _handle) = start_server("127.0.0.1:0").await.expect("hub should bind");
    format!("ws://{addr}/ws")
}

/// Spawns a full session task against the hub.
async fn spawn(
    url: &str,
    account: &str,
    meeting: &str,
) -> (mpsc::Sender<NetCommand>, mpsc::Receiver<NetEvent>) {
    let config = NetConfig {
        hub_url: Some(url.to_string()),
        keys: SessionKeys {
            account_id: AccountId::from(account),
            meeting_id: MeetingId::from(meeting),
            preview: false,
        },
    };
    spawn_net(config).await.expect("session should connect")
}

async fn next_event(rx: &mut mpsc::Receiver<NetEvent>) -> NetEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("timed out waiting for a session event")
        .expect("session task ended early")
}

/// Drains events until `pick` returns a value.
async fn wait_for<T>(
    rx: &mut mpsc::Receiver<NetEvent>,
    mut pick: impl FnMut(NetEvent) -> Option<T>,
) -> T {
    loop {
        if let Some(value) = pick(next_event(rx).await) {
            return value;
        }
    }
}

async fn drain_bootstrap(rx: &mut mpsc::Receiver<NetEvent>) {
    // Breakout is the last bootstrap event; the feeds are open once it
    // arrives.
    wait_for(rx, |e| matches!(e, NetEvent::Breakout(_)).then_some(())).await;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fresh_account_boots_nameless_and_empty() {
    let url = start_hub().await;
    let (_cmd_tx, mut evt_rx) = spawn(&url, "acct-fresh", "meet-1").await;

    // ===== Status =====
    match next_event(&mut evt_rx).await {
        NetEvent::Status { connected, detail } => {
            assert!(connected);
            assert!(detail.contains("synced via"), "got: {detail}");
        }
        other => panic!("expected Status, got {other:?}"),
    }
    // ===== Session =====
    match next_event(&mut evt_rx).await {
        NetEvent::Session {
            display_name,
            preview,
        } => {
            assert_eq!(display_name, None);
            assert!(!preview);
        }
        other => panic!("expected Session, got {other:?}"),
    }
    // ===== Snapshots =====
    match next_event(&mut evt_rx).await {
        NetEvent::ActiveTasks(tasks) => assert!(tasks.is_empty()),
        other => panic!("expected ActiveTasks, got {other:?}"),
    }
    match next_event(&mut evt_rx).await {
        NetEvent::CompletedTasks(tasks) => assert!(tasks.is_empty()),
        other => panic!("expected CompletedTasks, got {other:?}"),
    }
    // ===== Breakout closes the bootstrap =====
    match next_event(&mut evt_rx).await {
        NetEvent::Breakout(joining) => assert_eq!(joining, None),
        other => panic!("expected Breakout, got {other:?}"),
    }
}

#[tokio::test]
async fn saved_name_is_adopted_on_reconnect() {
    let url = start_hub().await;

    {
        let (cmd_tx, mut evt_rx) = spawn(&url, "acct-ada", "meet-1").await;
        drain_bootstrap(&mut evt_rx).await;
        cmd_tx
            .send(NetCommand::SaveName {
                input: "Ada Lovelace".to_string(),
            })
            .await
            .unwrap();
        let name = wait_for(&mut evt_rx, |e| match e {
            NetEvent::NameSaved(name) => Some(name),
            _ => None,
        })
        .await;
        assert_eq!(name, "Ada Lovelace");
    }

    // The next session starts already named.
    let (_cmd_tx, mut evt_rx) = spawn(&url, "acct-ada", "meet-1").await;
    let display_name = wait_for(&mut evt_rx, |e| match e {
        NetEvent::Session { display_name, .. } => Some(display_name),
        _ => None,
    })
    .await;
    assert_eq!(display_name.as_deref(), Some("Ada Lovelace"));
}

#[tokio::test]
async fn new_meeting_refreshes_the_user_row() {
    let url = start_hub().await;

    {
        let (cmd_tx, mut evt_rx) = spawn(&url, "acct-move", "meet-old").await;
        drain_bootstrap(&mut evt_rx).await;
        cmd_tx
            .send(NetCommand::SaveName {
                input: "Ada".to_string(),
            })
            .await
            .unwrap();
        wait_for(&mut evt_rx, |e| match e {
            NetEvent::NameSaved(name) => Some(name),
            _ => None,
        })
        .await;
    }

    // Reconnect from a different meeting; bootstrap patches the row before
    // the Session event goes out.
    let (_cmd_tx, mut evt_rx) = spawn(&url, "acct-move", "meet-new").await;
    let display_name = wait_for(&mut evt_rx, |e| match e {
        NetEvent::Session { display_name, .. } => Some(display_name),
        _ => None,
    })
    .await;
    assert_eq!(display_name.as_deref(), Some("Ada"));

    let store = RemoteStore::connect(
        &url,
        ClientId::new(),
        AccountId::from("acct-move"),
        MeetingId::from("meet-new"),
    )
    .await
    .expect("client should connect");
    let rows = store
        .select(
            Table::Users,
            RowFilter::any().with_account(AccountId::from("acct-move")),
            None,
        )
        .await
        .expect("select");
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].as_user().expect("user row").meeting_id,
        MeetingId::from("meet-new")
    );
}

#[tokio::test]
async fn gate_queues_the_add_over_the_wire() {
    let url = start_hub().await;
    let (cmd_tx, mut evt_rx) = spawn(&url, "acct-gate", "meet-1").await;
    drain_bootstrap(&mut evt_rx).await;

    cmd_tx
        .send(NetCommand::AddTask {
            text: "prep the retro".to_string(),
        })
        .await
        .unwrap();
    let (reason, text) = wait_for(&mut evt_rx, |e| match e {
        NetEvent::AddRejected { reason, text } => Some((reason, text)),
        _ => None,
    })
    .await;
    assert_eq!(reason, AddRejection::NameNeeded);
    assert_eq!(text, "prep the retro");

    cmd_tx
        .send(NetCommand::SaveName {
            input: "Ada".to_string(),
        })
        .await
        .unwrap();
    wait_for(&mut evt_rx, |e| match e {
        NetEvent::NameSaved(name) => Some(name),
        _ => None,
    })
    .await;

    // Saving a name also resolves the breakout opt-in for the meeting.
    let joining = wait_for(&mut evt_rx, |e| match e {
        NetEvent::Breakout(joining) => Some(joining),
        _ => None,
    })
    .await;
    assert_eq!(joining, Some(true));

    cmd_tx.send(NetCommand::AddTask { text }).await.unwrap();
    let added = wait_for(&mut evt_rx, |e| match e {
        NetEvent::TaskAdded(record) => Some(record),
        _ => None,
    })
    .await;
    assert_eq!(added.text, "prep the retro");
    assert_eq!(added.owner_name, "Ada");
}
