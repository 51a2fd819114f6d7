//! Countdown timers driven through the real tick task.
//!
//! The unit tests feed ticks by hand; here the spawned one-second interval
//! delivers them through the event channel under paused tokio time, the way
//! the app loop consumes them.
//!
//! Validates:
//! - A custom countdown ticks through the channel to expiry, exactly once
//! - Pausing silences the tick stream; resuming continues where it froze
//! - A second countdown supersedes the first through the shared slot
//! - A draft countdown carries into the saved task's slot
//! - Timer usage recorded on a task is visible to other hub clients

#![allow(clippy::expect_used, clippy::unwrap_used)]

use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use taskdeck::effects::Chime;
use taskdeck::store::StoreClient;
use taskdeck::store::remote::RemoteStore;
use taskdeck::tasks::{AddOutcome, TaskListController};
use taskdeck::timer::{GlobalTimerStore, TaskTimer, TimerEvent, TimerOwner, TimerPhase};
use taskdeck_hub::hub::start_server;
use taskdeck_proto::ids::{AccountId, ClientId, MeetingId, TaskId};
use taskdeck_proto::store::{RowFilter, Table};
use tokio::sync::mpsc;

// ---------------------------------------------------------------------------
// Helper functions
// ---------------------------------------------------------------------------

#[derive(Default)]
struct CountingChime {
    rings: AtomicU32,
}

impl CountingChime {
    fn rings(&self) -> u32 {
        self.rings.load(Ordering::SeqCst)
    }
}

impl Chime for CountingChime {
    fn play(&self) {
        self.rings.fetch_add(1, Ordering::SeqCst);
    }
}

struct Rig {
    store: Arc<GlobalTimerStore>,
    chime: Arc<CountingChime>,
    sender: mpsc::UnboundedSender<TimerEvent>,
    events: mpsc::UnboundedReceiver<TimerEvent>,
}

fn rig() -> Rig {
    let (sender, events) = mpsc::unbounded_channel();
    Rig {
        store: Arc::new(GlobalTimerStore::new()),
        chime: Arc::new(CountingChime::default()),
        sender,
        events,
    }
}

fn timer(rig: &Rig, owner: TimerOwner) -> TaskTimer {
    TaskTimer::new(
        owner,
        Arc::clone(&rig.store),
        rig.chime.clone(),
        rig.sender.clone(),
    )
}

async fn recv(events: &mut mpsc::UnboundedReceiver<TimerEvent>) -> TimerEvent {
    tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .expect("timed out waiting for a timer event")
        .expect("timer event channel closed")
}

// ---------------------------------------------------------------------------
// Tick-task behavior (paused time)
// ---------------------------------------------------------------------------

#[tokio::test(start_paused = true)]
async fn custom_countdown_ticks_through_the_channel_to_expiry() {
    let mut rig = rig();
    let mut t = timer(&rig, TimerOwner::Task(TaskId::new()));

    t.open_picker();
    t.push_custom_digit('1'); // one minute
    t.confirm_selection();
    match recv(&mut rig.events).await {
        TimerEvent::Started { minutes, .. } => assert_eq!(minutes, 1),
        other => panic!("expected Started, got {other:?}"),
    }

    // Play the app loop: every delivered tick advances the timer.
    let mut ticks = 0u32;
    loop {
        match recv(&mut rig.events).await {
            TimerEvent::Tick { run } => {
                t.on_tick(run);
                ticks += 1;
                assert!(ticks <= 60, "countdown overran one minute");
            }
            TimerEvent::Expired { .. } => break,
            other => panic!("unexpected event: {other:?}"),
        }
    }

    assert_eq!(ticks, 60);
    assert_eq!(t.phase(), TimerPhase::Idle);
    assert_eq!(t.remaining_seconds(), None);
    assert_eq!(rig.store.current(), None);
    assert_eq!(rig.chime.rings(), 1);
}

#[tokio::test(start_paused = true)]
async fn pause_silences_the_ticks_until_resume() {
    let mut rig = rig();
    let mut t = timer(&rig, TimerOwner::Task(TaskId::new()));

    t.open_picker();
    t.confirm_selection(); // 15-minute preset
    match recv(&mut rig.events).await {
        TimerEvent::Started { minutes, .. } => assert_eq!(minutes, 15),
        other => panic!("expected Started, got {other:?}"),
    }
    match recv(&mut rig.events).await {
        TimerEvent::Tick { run } => t.on_tick(run),
        other => panic!("expected Tick, got {other:?}"),
    }
    assert_eq!(t.remaining_seconds(), Some(899));

    t.toggle_pause();
    assert_eq!(t.phase(), TimerPhase::Paused);
    assert_eq!(t.remaining_seconds(), Some(899));
    assert_eq!(rig.store.current(), None);

    // With the interval stopped the timeout is the only timer left.
    let silent = tokio::time::timeout(Duration::from_secs(3), rig.events.recv()).await;
    assert!(silent.is_err(), "no tick should arrive while paused");

    t.toggle_pause();
    assert_eq!(t.phase(), TimerPhase::Running);
    match recv(&mut rig.events).await {
        TimerEvent::Tick { run } => t.on_tick(run),
        other => panic!("expected a tick after resume, got {other:?}"),
    }
    assert_eq!(t.remaining_seconds(), Some(898));
}

#[tokio::test(start_paused = true)]
async fn second_countdown_supersedes_the_first() {
    let mut rig = rig();
    let mut first = timer(&rig, TimerOwner::Task(TaskId::new()));
    let mut second = timer(&rig, TimerOwner::Task(TaskId::new()));

    first.open_picker();
    first.confirm_selection(); // 15 minutes
    match recv(&mut rig.events).await {
        TimerEvent::Started { .. } => {}
        other => panic!("expected Started, got {other:?}"),
    }

    second.open_picker();
    second.move_preset_cursor(1); // 25 minutes
    second.confirm_selection();
    match recv(&mut rig.events).await {
        TimerEvent::Started { minutes, .. } => assert_eq!(minutes, 25),
        other => panic!("expected Started, got {other:?}"),
    }

    // The app fans the shared slot out to every local timer.
    let current = rig.store.current();
    first.handle_global_change(current);
    second.handle_global_change(current);
    assert_eq!(first.phase(), TimerPhase::Idle);
    assert_eq!(first.remaining_seconds(), None);
    assert_eq!(second.phase(), TimerPhase::Running);

    // Only the second timer's interval is still alive; its ticks count
    // against it alone.
    for expected in [1499, 1498] {
        match recv(&mut rig.events).await {
            TimerEvent::Tick { run } => {
                first.on_tick(run);
                second.on_tick(run);
                assert_eq!(second.remaining_seconds(), Some(expected));
            }
            other => panic!("expected Tick, got {other:?}"),
        }
    }
    assert_eq!(first.phase(), TimerPhase::Idle);
}

#[tokio::test(start_paused = true)]
async fn saved_task_inherits_the_drafts_countdown() {
    let mut rig = rig();
    let mut t = timer(&rig, TimerOwner::Draft(1));

    t.open_picker();
    t.confirm_selection(); // 15 minutes
    match recv(&mut rig.events).await {
        TimerEvent::Started { owner, .. } => assert_eq!(owner, TimerOwner::Draft(1)),
        other => panic!("expected Started, got {other:?}"),
    }
    match recv(&mut rig.events).await {
        TimerEvent::Tick { run } => t.on_tick(run),
        other => panic!("expected Tick, got {other:?}"),
    }
    assert_eq!(t.remaining_seconds(), Some(899));

    let saved = TimerOwner::Task(TaskId::new());
    t.rebind(saved);
    assert_eq!(t.owner(), saved);
    assert_eq!(t.phase(), TimerPhase::Running);
    assert_eq!(t.remaining_seconds(), Some(899));
    assert_eq!(rig.store.current(), Some((saved, 899)));

    // Ticks keep flowing under the rebound owner.
    match recv(&mut rig.events).await {
        TimerEvent::Tick { run } => t.on_tick(run),
        other => panic!("expected Tick, got {other:?}"),
    }
    assert_eq!(t.remaining_seconds(), Some(898));
}

// ---------------------------------------------------------------------------
// Timer usage on the task row (real hub)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn timer_use_lands_on_the_hub_row() {
    let (addr, _handle) = start_server("127.0.0.1:0").await.expect("hub should bind");
    let url = format!("ws://{addr}/ws");

    let ada_store = Arc::new(
        RemoteStore::connect(
            &url,
            ClientId::new(),
            AccountId::from("acct-timer"),
            MeetingId::from("meet-timer"),
        )
        .await
        .expect("client should connect"),
    );
    let mut ada = TaskListController::new(
        Arc::clone(&ada_store),
        AccountId::from("acct-timer"),
        MeetingId::from("meet-timer"),
        Some("Ada".to_string()),
    );
    let added = match ada.add_task("deep work block").await {
        AddOutcome::Added(record) => record,
        other => panic!("expected Added, got {other:?}"),
    };

    ada.record_timer_use(added.id, 25).await;
    assert!(ada.active()[0].timer_used);
    assert_eq!(ada.active()[0].timer_minutes, Some(25));

    let grace_store = RemoteStore::connect(
        &url,
        ClientId::new(),
        AccountId::from("acct-timer"),
        MeetingId::from("meet-timer"),
    )
    .await
    .expect("client should connect");
    let rows = grace_store
        .select(
            Table::Tasks,
            RowFilter::any().with_id(*added.id.as_uuid()),
            None,
        )
        .await
        .expect("select");
    let seen = rows[0].as_task().expect("task row");
    assert!(seen.timer_used);
    assert_eq!(seen.timer_minutes, Some(25));
}
