//! View mount/unmount: no late callbacks, late snapshots discarded.

mod helpers;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time;

use attendsync_core::error::AppError;
use attendsync_realtime::reducer::{Entity, Record};
use attendsync_realtime::{ChannelRegistry, ChannelState, CloseCause, Feed};

use helpers::{LOG_L1, LOG_L2, MockAuthApi, ScriptedServer};

fn record(id: &str) -> Record {
    Record::from_payload(serde_json::json!({"id": id, "action": "snapshot"}).as_object().unwrap())
        .unwrap()
}

#[tokio::test(start_paused = true)]
async fn test_unmount_suppresses_queued_frames_and_pending_retries() {
    let (session, _storage) = helpers::session(Arc::new(MockAuthApi::default()));
    session.login("a@b.com", "pw").await.unwrap();

    let server = ScriptedServer::new();
    let registry = ChannelRegistry::new(
        "session-view",
        server.clone(),
        session.token_source(),
        helpers::realtime_config(),
    );
    let delivered = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&delivered);
    let feed_id = registry
        .open_channel(&Feed::SessionAttendance("42".into()), move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    let feed = registry.channel(feed_id).unwrap();
    helpers::wait_for_state(&feed, ChannelState::Open).await;

    let log_id = registry.open_channel(&Feed::AdminEvents, |_| {}).unwrap();
    let logs = registry.channel(log_id).unwrap();
    helpers::wait_for_state(&logs, ChannelState::Open).await;

    // The admin channel sits in backoff when the view goes away.
    server.drop_connection();
    helpers::wait_for_state(&logs, ChannelState::Reconnecting).await;
    let connects = server.urls().len();

    registry.unmount();
    assert!(feed.is_stopped());
    assert!(logs.is_stopped());
    assert_eq!(feed.connection().close_cause, Some(CloseCause::Stopped));
    assert_eq!(logs.connection().close_cause, Some(CloseCause::Stopped));

    time::sleep(Duration::from_secs(600)).await;
    assert_eq!(delivered.load(Ordering::SeqCst), 0);
    assert_eq!(server.urls().len(), connects);
    assert_eq!(registry.channel_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_frames_after_unmount_never_reach_the_view() {
    let (session, _storage) = helpers::session(Arc::new(MockAuthApi::default()));
    session.login("a@b.com", "pw").await.unwrap();

    let server = ScriptedServer::new();
    let registry = ChannelRegistry::new(
        "admin-dashboard",
        server.clone(),
        session.token_source(),
        helpers::realtime_config(),
    );
    let live = helpers::logs();
    let id = registry.open_feed(&Feed::AdminEvents, &live).unwrap();
    let channel = registry.channel(id).unwrap();
    helpers::wait_for_state(&channel, ChannelState::Open).await;

    server.text(LOG_L1);
    time::sleep(Duration::from_millis(5)).await;
    let version = live.version();

    server.text(LOG_L2);
    registry.unmount();
    time::sleep(Duration::from_secs(5)).await;

    assert_eq!(live.snapshot().ids(), vec!["L1"]);
    assert_eq!(live.version(), version);
    assert_eq!(channel.metrics().snapshot().events_delivered, 1);
}

#[tokio::test(start_paused = true)]
async fn test_snapshot_and_live_events_merge() {
    let (session, _storage) = helpers::session(Arc::new(MockAuthApi::default()));
    session.login("a@b.com", "pw").await.unwrap();

    let server = ScriptedServer::new();
    let registry = ChannelRegistry::new(
        "admin-dashboard",
        server.clone(),
        session.token_source(),
        helpers::realtime_config(),
    );
    let live = helpers::logs();
    let id = registry.open_feed(&Feed::AdminEvents, &live).unwrap();
    helpers::wait_for_state(&registry.channel(id).unwrap(), ChannelState::Open).await;

    let fetch = {
        let server = server.clone();
        async move {
            // The server pushes while the REST call is in flight.
            server.text(LOG_L2);
            time::sleep(Duration::from_millis(50)).await;
            Ok::<_, AppError>(vec![record("L1"), record("L0")])
        }
    };
    assert!(registry.load_snapshot(&live, fetch).await.unwrap());

    let collection = live.snapshot();
    assert_eq!(collection.ids(), vec!["L2", "L1", "L0"]);
    assert_eq!(collection.get("L1").unwrap().get_str("action"), Some("snapshot"));

    // Later events merge into the snapshot entries.
    server.text(r#"{"resource":"log","operation":"update","id":"L0","action":"edited"}"#);
    server.text(r#"{"resource":"log","operation":"delete","id":"L1"}"#);
    time::sleep(Duration::from_millis(5)).await;
    let collection = live.snapshot();
    assert_eq!(collection.ids(), vec!["L2", "L0"]);
    assert_eq!(collection.get("L0").unwrap().get_str("action"), Some("edited"));
}

#[tokio::test(start_paused = true)]
async fn test_late_snapshot_is_discarded_after_unmount() {
    let (session, _storage) = helpers::session(Arc::new(MockAuthApi::default()));
    session.login("a@b.com", "pw").await.unwrap();

    let server = ScriptedServer::new();
    let registry = Arc::new(ChannelRegistry::new(
        "admin-dashboard",
        server.clone(),
        session.token_source(),
        helpers::realtime_config(),
    ));
    let live = helpers::logs();
    registry.open_feed(&Feed::AdminEvents, &live).unwrap();

    let fetched = Arc::new(Mutex::new(false));
    let task = {
        let registry = Arc::clone(&registry);
        let live = live.clone();
        let fetched = Arc::clone(&fetched);
        tokio::spawn(async move {
            registry
                .load_snapshot(&live, async move {
                    time::sleep(Duration::from_secs(2)).await;
                    *fetched.lock().unwrap() = true;
                    Ok(vec![record("L1")])
                })
                .await
        })
    };

    time::sleep(Duration::from_millis(500)).await;
    registry.unmount();

    assert!(!task.await.unwrap().unwrap());
    time::sleep(Duration::from_secs(5)).await;
    assert!(live.is_empty());
    assert!(!live.is_loading());
    assert!(!*fetched.lock().unwrap());
}
