//! Store operations against a live hub over WebSockets.
//!
//! Validates:
//! - Insert echoes the stored row; duplicate keys are rejected
//! - Select honors the account/completion filter and orderings
//! - Semantic patches apply under the hub's table lock
//! - Delete reports how many rows went away
//! - A patch aimed at the wrong table fails without changing anything

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::time::Duration;

use taskdeck::store::remote::RemoteStore;
use taskdeck::store::{StoreClient, StoreError};
use taskdeck_hub::hub::start_server;
use taskdeck_proto::ids::{AccountId, ClientId, MeetingId, TaskId, Timestamp};
use taskdeck_proto::records::{BreakoutRecord, ReactionKind, TaskRecord, UserRecord};
use taskdeck_proto::store::{Order, Patch, Row, RowFilter, Table};

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

/// Starts a hub on an ephemeral port and returns its WebSocket URL. The
/// server task is detached; it lives for the rest of the test process.
async fn start_hub() -> String {
    let (addr, _handle) = start_server("127.0.0.1:0").await.expect("hub should bind");
    format!("ws://{addr}/ws")
}

/// Connects a fresh client under the given account.
async fn connect(url: &str, account: &str) -> RemoteStore {
    RemoteStore::connect(
        url,
        ClientId::new(),
        AccountId::from(account),
        MeetingId::from("meet-ops"),
    )
    .await
    .expect("client should connect")
}

fn task(account: &str, text: &str) -> TaskRecord {
    TaskRecord::new(
        text.to_string(),
        "Ada".to_string(),
        AccountId::from(account),
        MeetingId::from("meet-ops"),
    )
}

fn by_account(account: &str) -> RowFilter {
    RowFilter::any().with_account(AccountId::from(account))
}

fn by_id(task: &TaskRecord) -> RowFilter {
    RowFilter::any().with_id(*task.id.as_uuid())
}

// ---------------------------------------------------------------------------
// Insert
// ---------------------------------------------------------------------------

#[tokio::test]
async fn insert_echoes_the_stored_row() {
    let url = start_hub().await;
    let store = connect(&url, "acct-echo").await;

    let record = task("acct-echo", "write the minutes");
    let stored = store
        .insert(Row::Task(record.clone()))
        .await
        .expect("insert should succeed");
    assert_eq!(stored, Row::Task(record));
}

#[tokio::test]
async fn duplicate_insert_is_rejected() {
    let url = start_hub().await;
    let store = connect(&url, "acct-dup").await;

    let record = task("acct-dup", "only once");
    store
        .insert(Row::Task(record.clone()))
        .await
        .expect("first insert should succeed");
    let err = store
        .insert(Row::Task(record))
        .await
        .expect_err("second insert must fail");
    match err {
        StoreError::Rejected(reason) => {
            assert!(reason.contains("already exists"), "got: {reason}");
        }
        other => panic!("expected Rejected, got {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Select
// ---------------------------------------------------------------------------

#[tokio::test]
async fn select_scopes_by_account_and_completion() {
    let url = start_hub().await;
    let ours = connect(&url, "acct-a").await;
    let theirs = connect(&url, "acct-b").await;

    ours.insert(Row::Task(task("acct-a", "ours, open")))
        .await
        .expect("insert");
    let mut done = task("acct-a", "ours, done");
    done.completed = true;
    done.completed_at = Some(Timestamp::now());
    ours.insert(Row::Task(done)).await.expect("insert");
    theirs
        .insert(Row::Task(task("acct-b", "not ours")))
        .await
        .expect("insert");

    let open = ours
        .select(Table::Tasks, by_account("acct-a").with_completed(false), None)
        .await
        .expect("select");
    assert_eq!(open.len(), 1);
    assert_eq!(open[0].as_task().expect("task row").text, "ours, open");

    let completed = ours
        .select(Table::Tasks, by_account("acct-a").with_completed(true), None)
        .await
        .expect("select");
    assert_eq!(completed.len(), 1);
    assert_eq!(completed[0].as_task().expect("task row").text, "ours, done");
}

#[tokio::test]
async fn select_orders_newest_first() {
    let url = start_hub().await;
    let store = connect(&url, "acct-order").await;

    // Creation stamps have millisecond resolution; space the rows out.
    for text in ["first", "second", "third"] {
        store
            .insert(Row::Task(task("acct-order", text)))
            .await
            .expect("insert");
        tokio::time::sleep(Duration::from_millis(3)).await;
    }

    let rows = store
        .select(
            Table::Tasks,
            by_account("acct-order"),
            Some(Order::CreatedAtDesc),
        )
        .await
        .expect("select");
    let texts: Vec<&str> = rows
        .iter()
        .map(|row| row.as_task().expect("task row").text.as_str())
        .collect();
    assert_eq!(texts, ["third", "second", "first"]);
}

// ---------------------------------------------------------------------------
// Update
// ---------------------------------------------------------------------------

#[tokio::test]
async fn complete_patch_is_visible_to_every_client() {
    let url = start_hub().await;
    let ada = connect(&url, "acct-share").await;
    let grace = connect(&url, "acct-share").await;

    let record = task("acct-share", "review the deck");
    ada.insert(Row::Task(record.clone()))
        .await
        .expect("insert");

    let rows = grace
        .update(
            Table::Tasks,
            by_id(&record),
            Patch::CompleteTask {
                at: Timestamp::now(),
                by: "Grace".to_string(),
            },
        )
        .await
        .expect("update");
    assert_eq!(rows.len(), 1);
    let updated = rows[0].as_task().expect("task row");
    assert!(updated.completed);
    assert_eq!(updated.owner_name, "Grace");

    // The first client reads the same state back off the hub.
    let seen = ada
        .select(Table::Tasks, by_account("acct-share").with_completed(true), None)
        .await
        .expect("select");
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].as_task().expect("task row").owner_name, "Grace");
}

#[tokio::test]
async fn reaction_increments_from_two_clients_both_survive() {
    let url = start_hub().await;
    let ada = connect(&url, "acct-react").await;
    let grace = connect(&url, "acct-react").await;

    let record = task("acct-react", "celebrate this");
    ada.insert(Row::Task(record.clone()))
        .await
        .expect("insert");

    ada.update(Table::Tasks, by_id(&record), Patch::AddReaction(ReactionKind::Hearts))
        .await
        .expect("first reaction");
    grace
        .update(Table::Tasks, by_id(&record), Patch::AddReaction(ReactionKind::Hearts))
        .await
        .expect("second reaction");

    let rows = ada
        .select(Table::Tasks, by_id(&record), None)
        .await
        .expect("select");
    let seen = rows[0].as_task().expect("task row");
    assert_eq!(seen.hearts, 2);
    assert_eq!(seen.celebrations, 0);
}

#[tokio::test]
async fn update_matching_nothing_returns_no_rows() {
    let url = start_hub().await;
    let store = connect(&url, "acct-miss").await;

    let rows = store
        .update(
            Table::Tasks,
            RowFilter::any().with_id(*TaskId::new().as_uuid()),
            Patch::RecordTimerUse { minutes: 25 },
        )
        .await
        .expect("update");
    assert!(rows.is_empty());
}

#[tokio::test]
async fn mismatched_patch_fails_without_changes() {
    let url = start_hub().await;
    let store = connect(&url, "acct-wrong").await;

    let user = UserRecord::new(
        AccountId::from("acct-wrong"),
        MeetingId::from("meet-ops"),
        "Ada".to_string(),
    );
    store
        .insert(Row::User(user.clone()))
        .await
        .expect("insert");

    let err = store
        .update(
            Table::Users,
            RowFilter::any().with_id(*user.id.as_uuid()),
            Patch::AddReaction(ReactionKind::Hearts),
        )
        .await
        .expect_err("user rows have no reactions");
    match err {
        StoreError::Rejected(reason) => {
            assert!(reason.contains("does not apply"), "got: {reason}");
        }
        other => panic!("expected Rejected, got {other:?}"),
    }

    let rows = store
        .select(Table::Users, by_account("acct-wrong"), None)
        .await
        .expect("select");
    assert_eq!(rows[0].as_user().expect("user row").name, "Ada");
}

// ---------------------------------------------------------------------------
// Delete
// ---------------------------------------------------------------------------

#[tokio::test]
async fn delete_reports_how_many_rows_went() {
    let url = start_hub().await;
    let store = connect(&url, "acct-gone").await;

    store
        .insert(Row::Task(task("acct-gone", "one")))
        .await
        .expect("insert");
    store
        .insert(Row::Task(task("acct-gone", "two")))
        .await
        .expect("insert");

    let removed = store
        .delete(Table::Tasks, by_account("acct-gone"))
        .await
        .expect("delete");
    assert_eq!(removed, 2);

    let rows = store
        .select(Table::Tasks, by_account("acct-gone"), None)
        .await
        .expect("select");
    assert!(rows.is_empty());

    let removed = store
        .delete(Table::Tasks, by_account("acct-gone"))
        .await
        .expect("repeat delete");
    assert_eq!(removed, 0);
}

// ---------------------------------------------------------------------------
// Users and breakouts
// ---------------------------------------------------------------------------

#[tokio::test]
async fn user_rows_rename_and_move_meetings() {
    let url = start_hub().await;
    let store = connect(&url, "acct-user").await;

    let user = UserRecord::new(
        AccountId::from("acct-user"),
        MeetingId::from("meet-1"),
        "Ada".to_string(),
    );
    store
        .insert(Row::User(user.clone()))
        .await
        .expect("insert");
    let filter = RowFilter::any().with_id(*user.id.as_uuid());

    let rows = store
        .update(
            Table::Users,
            filter.clone(),
            Patch::SetUserName("Ada Lovelace".to_string()),
        )
        .await
        .expect("rename");
    assert_eq!(rows[0].as_user().expect("user row").name, "Ada Lovelace");

    let rows = store
        .update(
            Table::Users,
            filter,
            Patch::SetUserMeeting(MeetingId::from("meet-2")),
        )
        .await
        .expect("move meetings");
    let moved = rows[0].as_user().expect("user row");
    assert_eq!(moved.meeting_id, MeetingId::from("meet-2"));
    assert_eq!(moved.name, "Ada Lovelace");
}

#[tokio::test]
async fn breakout_rows_are_keyed_by_account_and_meeting() {
    let url = start_hub().await;
    let store = connect(&url, "acct-break").await;

    let user = UserRecord::new(
        AccountId::from("acct-break"),
        MeetingId::from("meet-ops"),
        "Ada".to_string(),
    );
    store
        .insert(Row::Breakout(BreakoutRecord::new(&user)))
        .await
        .expect("insert");

    // The same account + meeting is a key collision even though breakout
    // rows carry no row id.
    let err = store
        .insert(Row::Breakout(BreakoutRecord::new(&user)))
        .await
        .expect_err("duplicate key must fail");
    assert!(matches!(err, StoreError::Rejected(_)));

    let rows = store
        .update(
            Table::Breakouts,
            by_account("acct-break").with_meeting(MeetingId::from("meet-ops")),
            Patch::SetBreakout {
                joining: false,
                user_name: "Ada".to_string(),
                at: Timestamp::now(),
            },
        )
        .await
        .expect("update");
    assert_eq!(rows.len(), 1);
    assert!(!rows[0].as_breakout().expect("breakout row").joining);
}
