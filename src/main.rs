//! AttendSync Monitor: headless dashboard client.
//!
//! Restores (or logs into) a session, opens one live feed, and logs every
//! change of the merged collection until Ctrl-C, the session ends, or the
//! feed gives up. An interrupt keeps the persisted session for the next run.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tracing_subscriber::{EnvFilter, fmt};

use attendsync_auth::storage;
use attendsync_auth::{HttpAuthApi, SessionManager, TokenStore};
use attendsync_core::config::AppConfig;
use attendsync_core::error::AppError;
use attendsync_core::types::SessionStatus;
use attendsync_realtime::connection::{ChannelConnection, ChannelState};
use attendsync_realtime::channel::AlertHandler;
use attendsync_realtime::reducer::Record;
use attendsync_realtime::{
    ChannelRegistry, EntityCollection, Feed, LiveCollection, OrderingPolicy, WsConnector,
};

/// Entries kept by the monitor's live feed.
const FEED_CAP: usize = 200;

#[tokio::main]
async fn main() {
    let env = std::env::var("ATTENDSYNC_ENV").unwrap_or_else(|_| "development".to_string());
    let config = match AppConfig::load(&env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    init_logging(&config);

    if let Err(e) = run(config).await {
        tracing::error!("Monitor error: {e:#}");
        std::process::exit(1);
    }
}

/// Initialize tracing/logging
fn init_logging(config: &AppConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    match config.logging.format.as_str() {
        "json" => {
            fmt()
                .json()
                .with_env_filter(filter)
                .with_target(true)
                .with_thread_ids(true)
                .init();
        }
        _ => {
            fmt()
                .pretty()
                .with_env_filter(filter)
                .with_target(true)
                .init();
        }
    }
}

async fn run(config: AppConfig) -> anyhow::Result<()> {
    tracing::info!("Starting AttendSync Monitor v{}", env!("CARGO_PKG_VERSION"));

    let mut args = std::env::args().skip(1);
    let feed_arg = args
        .next()
        .or_else(|| std::env::var("ATTENDSYNC_FEED").ok())
        .unwrap_or_else(|| "admin".to_string());
    let feed = Feed::parse(&feed_arg)
        .with_context(|| format!("Unknown feed '{feed_arg}' (admin, lecturer, session:<id>, custom:<path>)"))?;
    let resource = args.next().unwrap_or_else(|| "log".to_string());

    // ── Session ──────────────────────────────────────────────────
    let slots = storage::from_config(&config.session).context("Opening session storage")?;
    let store = Arc::new(TokenStore::new(slots));
    let api = Arc::new(HttpAuthApi::new(&config.api)?);
    let session = SessionManager::new(store, api, config.session.clone());

    if session.restore().await? != SessionStatus::Authenticated {
        let email = std::env::var("ATTENDSYNC_EMAIL")
            .context("No persisted session; set ATTENDSYNC_EMAIL and ATTENDSYNC_PASSWORD")?;
        let password = std::env::var("ATTENDSYNC_PASSWORD").context("ATTENDSYNC_PASSWORD is not set")?;
        session.login(&email, &password).await?;
    }
    if let Some(user) = session.current_user() {
        tracing::info!(user = %user.email, role = %user.role, "Session ready");
    }

    // ── Feed ─────────────────────────────────────────────────────
    let on_alert: AlertHandler = {
        let session = session.clone();
        Arc::new(move |err: &AppError| {
            tracing::warn!(kind = ?err.kind, error = %err, "Feed needs attention");
            if err.is(attendsync_core::ErrorKind::AuthExpired) {
                session.report_auth_expired();
            }
        })
    };
    let connector = Arc::new(WsConnector::new(Duration::from_secs(
        config.realtime.connect_timeout_seconds,
    )));
    let registry = ChannelRegistry::new("monitor", connector, session.token_source(), config.realtime.clone())
        .with_alert_handler(on_alert);

    let live: LiveCollection<Record> =
        LiveCollection::new(EntityCollection::new(resource.clone(), OrderingPolicy::newest_first(FEED_CAP)));
    let channel_id = registry.open_feed(&feed, &live)?;
    tracing::info!(%feed, %resource, %channel_id, "Watching feed");

    let channel = registry
        .channel(channel_id)
        .context("Feed channel vanished right after opening")?;
    let mut channel_state = channel.subscribe_state();
    let mut versions = live.subscribe();
    let mut session_status = session.subscribe_status();
    let mut outcome = Ok(());
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Interrupted");
                break;
            }
            changed = versions.changed() => {
                if changed.is_err() {
                    break;
                }
                let version = *versions.borrow_and_update();
                live.with(|collection| {
                    let latest = collection.iter().next().map(|r| r.id.clone());
                    tracing::info!(version, entries = collection.len(), latest = ?latest, "Feed updated");
                });
            }
            changed = session_status.changed() => {
                if changed.is_err() || *session_status.borrow_and_update() == SessionStatus::Anonymous {
                    tracing::warn!("Session ended, stopping monitor");
                    break;
                }
            }
            changed = channel_state.changed() => {
                if changed.is_err() {
                    break;
                }
                let connection = channel_state.borrow_and_update().clone();
                if let Some(err) = feed_closed(&connection) {
                    tracing::error!(cause = ?connection.close_cause, "Feed closed");
                    outcome = Err(err);
                    break;
                }
            }
        }
    }

    registry.unmount();
    tracing::info!("Monitor stopped");
    outcome
}

/// The error to exit with once the feed has closed for good.
fn feed_closed(connection: &ChannelConnection) -> Option<anyhow::Error> {
    (connection.state == ChannelState::Closed)
        .then(|| anyhow::anyhow!("Feed closed: {:?}", connection.close_cause))
}

#[cfg(test)]
mod tests {
    use super::*;
    use attendsync_realtime::CloseCause;

    fn connection(state: ChannelState, close_cause: Option<CloseCause>) -> ChannelConnection {
        ChannelConnection {
            state,
            attempt: 0,
            retry_delay: None,
            last_error: None,
            close_cause,
        }
    }

    #[test]
    fn test_exhausted_feed_ends_the_monitor() {
        let err = feed_closed(&connection(
            ChannelState::Closed,
            Some(CloseCause::ReconnectExhausted),
        ))
        .unwrap();
        assert!(err.to_string().contains("ReconnectExhausted"));
    }

    #[test]
    fn test_live_feed_keeps_the_monitor_running() {
        for state in [ChannelState::Connecting, ChannelState::Open, ChannelState::Reconnecting] {
            assert!(feed_closed(&connection(state, None)).is_none());
        }
    }
}
