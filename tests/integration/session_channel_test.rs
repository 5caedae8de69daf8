//! Session ↔ channel coupling: token rotation, logout, auth expiry, restore.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use tokio::time;

use attendsync_auth::FileStorage;
use attendsync_core::{AppError, ErrorKind};
use attendsync_core::traits::{DurableStorage, TOKEN_SLOT, USER_SLOT};
use attendsync_core::types::SessionStatus;
use attendsync_realtime::connection::{ConnectError, Inbound};
use attendsync_realtime::{ChannelRegistry, ChannelState, CloseCause, Feed};

use helpers::{MockAuthApi, REFRESH_INTERVAL, ScriptedServer};

#[tokio::test(start_paused = true)]
async fn test_reconnect_uses_rotated_token() {
    let api = Arc::new(MockAuthApi::default());
    let (session, _storage) = helpers::session(api.clone());
    session.login("a@b.com", "pw").await.unwrap();

    let server = ScriptedServer::new();
    let registry = ChannelRegistry::new(
        "admin-dashboard",
        server.clone(),
        session.token_source(),
        helpers::realtime_config(),
    );
    let id = registry.open_channel(&Feed::AdminEvents, |_| {}).unwrap();
    let channel = registry.channel(id).unwrap();
    helpers::wait_for_state(&channel, ChannelState::Open).await;

    time::sleep(REFRESH_INTERVAL + Duration::from_secs(1)).await;
    assert_eq!(api.refresh_calls.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(session.current_token().as_deref(), Some("tok2"));

    // Rotation alone does not force a reconnect.
    assert_eq!(channel.state(), ChannelState::Open);
    assert_eq!(server.urls().len(), 1);

    server.drop_connection();
    helpers::wait_for_state(&channel, ChannelState::Reconnecting).await;
    helpers::wait_for_state(&channel, ChannelState::Open).await;

    let urls = server.urls();
    assert_eq!(urls.len(), 2);
    assert!(urls[0].ends_with("token=tok1"));
    assert!(urls[1].ends_with("token=tok2"));
}

#[tokio::test(start_paused = true)]
async fn test_logout_tears_down_refresh_store_and_channel() {
    let (session, storage) = helpers::session(Arc::new(MockAuthApi::default()));
    session.login("a@b.com", "pw").await.unwrap();
    assert!(session.is_refresh_scheduled());

    let server = ScriptedServer::new();
    let (alerts, on_alert) = helpers::alert_sink();
    let registry = ChannelRegistry::new(
        "admin-dashboard",
        server.clone(),
        session.token_source(),
        helpers::realtime_config(),
    )
    .with_alert_handler(on_alert);
    let id = registry.open_channel(&Feed::AdminEvents, |_| {}).unwrap();
    let channel = registry.channel(id).unwrap();
    helpers::wait_for_state(&channel, ChannelState::Open).await;

    assert!(session.logout());
    assert!(!session.is_refresh_scheduled());
    assert_eq!(session.status(), SessionStatus::Anonymous);
    assert_eq!(session.store().get(), None);
    assert_eq!(storage.read(TOKEN_SLOT).unwrap(), None);
    assert_eq!(storage.read(USER_SLOT).unwrap(), None);
    assert!(!session.logout());

    // The open socket is left alone until it drops.
    assert_eq!(channel.state(), ChannelState::Open);
    server.drop_connection();

    let closed = helpers::wait_for_state(&channel, ChannelState::Closed).await;
    assert_eq!(closed.close_cause, Some(CloseCause::LoggedOut));

    time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(server.urls().len(), 1);
    assert!(alerts.lock().unwrap().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_rejected_token_alerts_once_and_ends_session() {
    let (session, _storage) = helpers::session(Arc::new(MockAuthApi::default()));
    session.login("a@b.com", "pw").await.unwrap();

    let server = ScriptedServer::new();
    let (alerts, on_alert) = helpers::alert_sink();
    let on_alert: attendsync_realtime::channel::AlertHandler = {
        let session = session.clone();
        Arc::new(move |err: &AppError| {
            on_alert(err);
            if err.is(ErrorKind::AuthExpired) {
                session.report_auth_expired();
            }
        })
    };
    let registry = ChannelRegistry::new(
        "admin-dashboard",
        server.clone(),
        session.token_source(),
        helpers::realtime_config(),
    )
    .with_alert_handler(on_alert);

    let id = registry.open_channel(&Feed::AdminEvents, |_| {}).unwrap();
    let channel = registry.channel(id).unwrap();
    helpers::wait_for_state(&channel, ChannelState::Open).await;

    server.plan(Err(ConnectError::Rejected { status: 401 }));
    server.drop_connection();

    let closed = helpers::wait_for_state(&channel, ChannelState::Closed).await;
    assert_eq!(closed.close_cause, Some(CloseCause::AuthExpired));
    assert_eq!(*alerts.lock().unwrap(), vec![ErrorKind::AuthExpired]);
    assert_eq!(session.status(), SessionStatus::Anonymous);
    assert!(!session.is_refresh_scheduled());

    time::sleep(Duration::from_secs(3600)).await;
    assert_eq!(server.urls().len(), 2);
    assert_eq!(alerts.lock().unwrap().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_server_close_with_auth_code_ends_channel() {
    let (session, _storage) = helpers::session(Arc::new(MockAuthApi::default()));
    session.login("a@b.com", "pw").await.unwrap();

    let server = ScriptedServer::new();
    let (alerts, on_alert) = helpers::alert_sink();
    let registry = ChannelRegistry::new(
        "lecturer-dashboard",
        server.clone(),
        session.token_source(),
        helpers::realtime_config(),
    )
    .with_alert_handler(on_alert);
    let id = registry.open_channel(&Feed::LecturerEvents, |_| {}).unwrap();
    let channel = registry.channel(id).unwrap();
    helpers::wait_for_state(&channel, ChannelState::Open).await;

    server.push(Inbound::Closed {
        code: Some(4401),
        reason: "token expired".to_string(),
    });
    let closed = helpers::wait_for_state(&channel, ChannelState::Closed).await;
    assert_eq!(closed.close_cause, Some(CloseCause::AuthExpired));
    assert_eq!(*alerts.lock().unwrap(), vec![ErrorKind::AuthExpired]);
    assert_eq!(server.urls().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_session_survives_restart_through_file_storage() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(MockAuthApi::default());

    {
        let storage = Arc::new(FileStorage::open(dir.path()).unwrap());
        let session = helpers::session_with(api.clone(), storage);
        session.login("a@b.com", "pw").await.unwrap();
    }

    let storage = Arc::new(FileStorage::open(dir.path()).unwrap());
    let session = helpers::session_with(api.clone(), storage);
    assert_eq!(session.restore().await.unwrap(), SessionStatus::Authenticated);
    assert_eq!(session.current_token().as_deref(), Some("tok1"));
    assert_eq!(session.current_user().unwrap().email, "a@b.com");
    assert!(session.is_refresh_scheduled());

    // A second restore is a no-op.
    assert_eq!(session.restore().await.unwrap(), SessionStatus::Authenticated);
}

#[tokio::test(start_paused = true)]
async fn test_expired_persisted_token_restores_anonymous() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(MockAuthApi::default());

    {
        let storage = Arc::new(FileStorage::open(dir.path()).unwrap());
        let session = helpers::session_with(api.clone(), storage);
        session.login("a@b.com", "pw").await.unwrap();
    }
    *api.expire_profile.lock().unwrap() = true;

    let storage = Arc::new(FileStorage::open(dir.path()).unwrap());
    let session = helpers::session_with(api, storage.clone());
    assert_eq!(session.restore().await.unwrap(), SessionStatus::Anonymous);
    assert_eq!(session.current_token(), None);
    assert_eq!(storage.read(TOKEN_SLOT).unwrap(), None);

    let server = ScriptedServer::new();
    let registry = ChannelRegistry::new(
        "admin-dashboard",
        server.clone(),
        session.token_source(),
        helpers::realtime_config(),
    );
    let err = registry.open_channel(&Feed::AdminEvents, |_| {}).unwrap_err();
    assert_eq!(err.kind, ErrorKind::Unauthenticated);
    assert!(server.urls().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_unmount_keeps_persisted_session_for_next_run() {
    let dir = tempfile::tempdir().unwrap();
    let api = Arc::new(MockAuthApi::default());

    {
        let storage = Arc::new(FileStorage::open(dir.path()).unwrap());
        let session = helpers::session_with(api.clone(), storage);
        session.login("a@b.com", "pw").await.unwrap();

        let server = ScriptedServer::new();
        let registry = ChannelRegistry::new(
            "admin-dashboard",
            server.clone(),
            session.token_source(),
            helpers::realtime_config(),
        );
        let id = registry.open_channel(&Feed::AdminEvents, |_| {}).unwrap();
        helpers::wait_for_state(&registry.channel(id).unwrap(), ChannelState::Open).await;

        // Leaving the view (or interrupting the process) is not a logout.
        registry.unmount();
        assert_eq!(session.status(), SessionStatus::Authenticated);
    }

    let storage = Arc::new(FileStorage::open(dir.path()).unwrap());
    let session = helpers::session_with(api, storage);
    assert_eq!(session.restore().await.unwrap(), SessionStatus::Authenticated);
    assert_eq!(session.current_token().as_deref(), Some("tok1"));
}
