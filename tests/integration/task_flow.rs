//! The shared task deck driven through controllers on separate clients.
//!
//! Validates:
//! - Add, complete, and react flow from one participant to the other
//! - The three-task capacity counts rows already on the hub
//! - Adding without a display name never touches the store
//! - The completed view honors its three-hour window, newest first
//! - Reordering and deleting behave as local versus shared operations

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::time::Duration;

use taskdeck::store::StoreClient;
use taskdeck::store::remote::RemoteStore;
use taskdeck::tasks::{AddOutcome, MAX_ACTIVE_TASKS, TaskListController};
use taskdeck_hub::hub::start_server;
use taskdeck_proto::ids::{AccountId, ClientId, MeetingId, Timestamp};
use taskdeck_proto::records::{COMPLETED_WINDOW_MS, ReactionKind, TaskRecord};
use taskdeck_proto::store::{Row, RowFilter, Table};

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

async fn start_hub() -> String {
    let (addr, _handle) = start_server("127.0.0.1:0").await.expect("hub should bind");
    format!("ws://{addr}/ws")
}

async fn connect(url: &str, account: &str) -> Arc<RemoteStore> {
    let store = RemoteStore::connect(
        url,
        ClientId::new(),
        AccountId::from(account),
        MeetingId::from("meet-flow"),
    )
    .await
    .expect("client should connect");
    Arc::new(store)
}

fn controller(
    store: &Arc<RemoteStore>,
    account: &str,
    name: Option<&str>,
) -> TaskListController<RemoteStore> {
    TaskListController::new(
        Arc::clone(store),
        AccountId::from(account),
        MeetingId::from("meet-flow"),
        name.map(str::to_string),
    )
}

async fn add(list: &mut TaskListController<RemoteStore>, text: &str) -> TaskRecord {
    match list.add_task(text).await {
        AddOutcome::Added(record) => record,
        other => panic!("expected Added, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[tokio::test]
async fn deck_flows_between_two_participants() {
    let url = start_hub().await;
    let ada_store = connect(&url, "acct-flow").await;
    let grace_store = connect(&url, "acct-flow").await;
    let mut ada = controller(&ada_store, "acct-flow", Some("Ada"));
    let mut grace = controller(&grace_store, "acct-flow", Some("Grace"));

    // ===== Ada adds =====
    let added = add(&mut ada, "draft the agenda").await;
    assert_eq!(added.owner_name, "Ada");
    assert_eq!(ada.active().len(), 1);

    // ===== Grace sees it on her next load =====
    grace.fetch_active().await;
    assert_eq!(grace.active().len(), 1);
    assert_eq!(grace.active()[0].id, added.id);

    // ===== Grace completes it =====
    let completed = grace
        .complete_task(added.id)
        .await
        .expect("complete should confirm");
    assert_eq!(completed.completed_by, "Grace");
    assert!(grace.active().is_empty());

    // ===== Ada reacts to the completion =====
    let projected = ada
        .add_reaction(added.id, ReactionKind::Hearts)
        .await
        .expect("reaction should confirm");
    assert_eq!(projected.hearts, 1);
    assert_eq!(projected.completed_by, "Grace");

    // ===== Both land on the same state after a reload =====
    ada.fetch_active().await;
    assert!(ada.active().is_empty());
    grace.fetch_recently_completed().await;
    assert_eq!(grace.completed().len(), 1);
    assert_eq!(grace.completed()[0].hearts, 1);
    assert_eq!(grace.completed()[0].text, "draft the agenda");
}

#[tokio::test]
async fn capacity_counts_rows_already_on_the_hub() {
    let url = start_hub().await;
    let ada_store = connect(&url, "acct-full").await;
    let grace_store = connect(&url, "acct-full").await;
    let mut ada = controller(&ada_store, "acct-full", Some("Ada"));
    let mut grace = controller(&grace_store, "acct-full", Some("Grace"));

    for text in ["one", "two", "three"] {
        add(&mut ada, text).await;
    }

    grace.fetch_active().await;
    assert_eq!(grace.active().len(), MAX_ACTIVE_TASKS);
    let outcome = grace.add_task("a fourth").await;
    assert_eq!(outcome, AddOutcome::AtCapacity);

    let rows = grace_store
        .select(
            Table::Tasks,
            RowFilter::any().with_account(AccountId::from("acct-full")),
            None,
        )
        .await
        .expect("select");
    assert_eq!(rows.len(), MAX_ACTIVE_TASKS);
}

#[tokio::test]
async fn adding_without_a_name_stores_nothing() {
    let url = start_hub().await;
    let store = connect(&url, "acct-anon").await;
    let mut list = controller(&store, "acct-anon", None);

    let outcome = list.add_task("needs a name").await;
    assert_eq!(outcome, AddOutcome::NameNeeded);
    assert!(list.active().is_empty());

    let rows = store
        .select(
            Table::Tasks,
            RowFilter::any().with_account(AccountId::from("acct-anon")),
            None,
        )
        .await
        .expect("select");
    assert!(rows.is_empty());
}

#[tokio::test]
async fn completed_view_honors_its_window_newest_first() {
    let url = start_hub().await;
    let store = connect(&url, "acct-window").await;
    let mut list = controller(&store, "acct-window", Some("Ada"));

    // One completion outside the three-hour window and two inside it,
    // seeded directly so the stamps are explicit.
    let mut stale = TaskRecord::new(
        "forgotten".to_string(),
        "Ada".to_string(),
        AccountId::from("acct-window"),
        MeetingId::from("meet-flow"),
    );
    stale.completed = true;
    stale.completed_at = Some(Timestamp::now().saturating_sub_millis(COMPLETED_WINDOW_MS + 60_000));
    store.insert(Row::Task(stale)).await.expect("insert");

    for text in ["earlier", "latest"] {
        let mut recent = TaskRecord::new(
            text.to_string(),
            "Ada".to_string(),
            AccountId::from("acct-window"),
            MeetingId::from("meet-flow"),
        );
        recent.completed = true;
        recent.completed_at = Some(Timestamp::now());
        store.insert(Row::Task(recent)).await.expect("insert");
        tokio::time::sleep(Duration::from_millis(3)).await;
    }

    list.fetch_recently_completed().await;
    let texts: Vec<&str> = list.completed().iter().map(|t| t.text.as_str()).collect();
    assert_eq!(texts, ["latest", "earlier"]);
}

#[tokio::test]
async fn reorder_is_local_and_lost_on_reload() {
    let url = start_hub().await;
    let ada_store = connect(&url, "acct-swap").await;
    let grace_store = connect(&url, "acct-swap").await;
    let mut ada = controller(&ada_store, "acct-swap", Some("Ada"));
    let mut grace = controller(&grace_store, "acct-swap", Some("Grace"));

    for text in ["one", "two", "three"] {
        add(&mut ada, text).await;
        tokio::time::sleep(Duration::from_millis(3)).await;
    }
    // Local adds append, so the list reads in creation order.
    let local: Vec<&str> = ada.active().iter().map(|t| t.text.as_str()).collect();
    assert_eq!(local, ["one", "two", "three"]);

    assert!(ada.move_task(0, 1));
    let swapped: Vec<&str> = ada.active().iter().map(|t| t.text.as_str()).collect();
    assert_eq!(swapped, ["two", "one", "three"]);

    // Nobody else sees the swap, and Ada's own reload discards it.
    grace.fetch_active().await;
    let theirs: Vec<&str> = grace.active().iter().map(|t| t.text.as_str()).collect();
    assert_eq!(theirs, ["three", "two", "one"]);
    ada.fetch_active().await;
    let reloaded: Vec<&str> = ada.active().iter().map(|t| t.text.as_str()).collect();
    assert_eq!(reloaded, ["three", "two", "one"]);
}

#[tokio::test]
async fn delete_removes_the_row_for_everyone() {
    let url = start_hub().await;
    let ada_store = connect(&url, "acct-del").await;
    let grace_store = connect(&url, "acct-del").await;
    let mut ada = controller(&ada_store, "acct-del", Some("Ada"));
    let mut grace = controller(&grace_store, "acct-del", Some("Grace"));

    let added = add(&mut ada, "never mind").await;
    grace.fetch_active().await;
    assert_eq!(grace.active().len(), 1);

    assert!(ada.delete_task(added.id).await);
    assert!(ada.active().is_empty());

    grace.fetch_active().await;
    assert!(grace.active().is_empty());
    // The row is already gone; a second delete removes nothing.
    assert!(!grace.delete_task(added.id).await);
}
