//! End-to-end dashboard scenario: login, live feed, drop, reconnect.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use tokio::time;

use attendsync_core::types::SessionStatus;
use attendsync_realtime::{ChannelRegistry, ChannelState, Feed};

use helpers::{LOG_L1, LOG_L2, MockAuthApi, ScriptedServer};

#[tokio::test(start_paused = true)]
async fn test_login_feed_drop_and_reconnect() {
    let (session, _storage) = helpers::session(Arc::new(MockAuthApi::default()));
    assert_eq!(session.status(), SessionStatus::Anonymous);

    session.login("a@b.com", "pw").await.unwrap();
    assert_eq!(session.status(), SessionStatus::Authenticated);
    assert_eq!(session.current_token().as_deref(), Some("tok1"));

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
    assert_eq!(server.urls(), vec!["ws://test/ws/admin/events?token=tok1"]);

    server.text(LOG_L1);
    time::sleep(Duration::from_millis(10)).await;
    let collection = live.snapshot();
    assert_eq!(collection.ids(), vec!["L1"]);
    assert_eq!(collection.get("L1").unwrap().get_str("action"), Some("x"));

    server.drop_connection();
    let reconnecting = helpers::wait_for_state(&channel, ChannelState::Reconnecting).await;
    assert_eq!(reconnecting.attempt, 1);
    let delay = reconnecting.retry_delay.unwrap();
    assert!(delay >= Duration::from_millis(1000), "{delay:?}");
    assert!(delay <= Duration::from_millis(2 * 1000 + 500), "{delay:?}");

    let reopened = helpers::wait_for_state(&channel, ChannelState::Open).await;
    assert_eq!(reopened.attempt, 0);
    assert_eq!(server.urls().len(), 2);

    // Redelivery after the reconnect does not duplicate the entry.
    server.text(LOG_L1);
    server.text(LOG_L2);
    time::sleep(Duration::from_millis(10)).await;
    assert_eq!(live.snapshot().ids(), vec!["L2", "L1"]);

    registry.unmount();
    session.logout();
}

#[tokio::test(start_paused = true)]
async fn test_backoff_resets_after_successful_open() {
    let (session, _storage) = helpers::session(Arc::new(MockAuthApi::default()));
    session.login("a@b.com", "pw").await.unwrap();

    let server = ScriptedServer::new();
    let registry = ChannelRegistry::new(
        "lecturer-dashboard",
        server.clone(),
        session.token_source(),
        helpers::realtime_config(),
    );
    let id = registry.open_channel(&Feed::LecturerEvents, |_| {}).unwrap();
    let channel = registry.channel(id).unwrap();
    helpers::wait_for_state(&channel, ChannelState::Open).await;

    // Three refused attempts in a row: delays grow, attempt climbs.
    for _ in 0..3 {
        server.plan(Err(attendsync_realtime::connection::ConnectError::Failed(
            "connection refused".to_string(),
        )));
    }
    let mut states = channel.subscribe_state();
    server.drop_connection();

    let mut seen = Vec::new();
    while seen.len() < 4 {
        states.changed().await.unwrap();
        let snapshot = states.borrow_and_update().clone();
        if snapshot.state == ChannelState::Reconnecting {
            seen.push((snapshot.attempt, snapshot.retry_delay.unwrap()));
        }
    }
    let attempts: Vec<u32> = seen.iter().map(|(a, _)| *a).collect();
    assert_eq!(attempts, vec![1, 2, 3, 4]);
    for (attempt, delay) in &seen {
        let base = Duration::from_millis(1000) * 2u32.pow(attempt - 1);
        assert!(*delay >= base, "attempt {attempt}: {delay:?}");
        assert!(*delay <= Duration::from_secs(30));
    }

    let reopened = helpers::wait_for_state(&channel, ChannelState::Open).await;
    assert_eq!(reopened.attempt, 0);

    server.drop_connection();
    let after = helpers::wait_for_state(&channel, ChannelState::Reconnecting).await;
    assert_eq!(after.attempt, 1);
    assert!(after.retry_delay.unwrap() <= Duration::from_millis(1500));
}
