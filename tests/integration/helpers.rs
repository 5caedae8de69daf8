//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time;

use attendsync_auth::{MemoryStorage, SessionManager, TokenStore};
use attendsync_core::config::{RealtimeConfig, SessionConfig};
use attendsync_core::error::{AppError, ErrorKind};
use attendsync_core::result::AppResult;
use attendsync_core::traits::{AuthApi, AuthGrant, DurableStorage};
use attendsync_core::types::{Role, UserProfile};
use attendsync_realtime::connection::{ConnectError, Connection, Connector, Inbound};
use attendsync_realtime::reducer::{EntityCollection, OrderingPolicy, Record};
use attendsync_realtime::{ChannelConnection, ChannelState, LiveCollection, RealtimeChannel};

pub const REFRESH_INTERVAL: Duration = Duration::from_secs(600);

pub fn lecturer() -> UserProfile {
    UserProfile {
        id: "u1".to_string(),
        name: "Ada Lovelace".to_string(),
        email: "a@b.com".to_string(),
        role: Role::Lecturer,
    }
}

/// Auth backend accepting `a@b.com` / `pw`.
///
/// Login hands out `tok1`; each refresh returns the next queued result,
/// or `tok2`, `tok3`, ... once the queue is empty.
#[derive(Default)]
pub struct MockAuthApi {
    pub refresh_results: Mutex<VecDeque<AppResult<String>>>,
    pub refresh_calls: AtomicUsize,
    pub expire_profile: Mutex<bool>,
}

#[async_trait]
impl AuthApi for MockAuthApi {
    async fn login(&self, email: &str, password: &str) -> AppResult<AuthGrant> {
        if email != "a@b.com" || password != "pw" {
            return Err(AppError::invalid_credentials("Invalid email or password"));
        }
        Ok(AuthGrant {
            token: "tok1".to_string(),
            user: lecturer(),
        })
    }

    async fn refresh(&self, _token: &str) -> AppResult<String> {
        let n = self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.refresh_results
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(format!("tok{}", n + 2)))
    }

    async fn fetch_profile(&self, token: &str) -> AppResult<UserProfile> {
        if *self.expire_profile.lock().unwrap() || !token.starts_with("tok") {
            return Err(AppError::auth_expired("Token expired"));
        }
        Ok(lecturer())
    }
}

/// Session manager over the given storage.
pub fn session_with(api: Arc<MockAuthApi>, storage: Arc<dyn DurableStorage>) -> SessionManager {
    SessionManager::new(
        Arc::new(TokenStore::new(storage)),
        api,
        SessionConfig {
            refresh_interval_seconds: REFRESH_INTERVAL.as_secs(),
            storage_dir: None,
        },
    )
}

/// Session manager over in-memory storage.
pub fn session(api: Arc<MockAuthApi>) -> (SessionManager, Arc<MemoryStorage>) {
    let storage = Arc::new(MemoryStorage::new());
    (session_with(api, storage.clone()), storage)
}

pub fn realtime_config() -> RealtimeConfig {
    RealtimeConfig {
        ws_base: "ws://test/ws".to_string(),
        base_delay_ms: 1000,
        max_delay_ms: 30_000,
        jitter_max_ms: 500,
        ..RealtimeConfig::default()
    }
}

pub fn logs() -> LiveCollection<Record> {
    LiveCollection::new(EntityCollection::new("log", OrderingPolicy::newest_first(100)))
}

/// Scripted WebSocket server.
///
/// Connect attempts consume `plans` in order (succeeding once it is empty);
/// frames go to the most recently accepted socket.
#[derive(Default)]
pub struct ScriptedServer {
    plans: Mutex<VecDeque<Result<(), ConnectError>>>,
    urls: Mutex<Vec<String>>,
    sockets: Mutex<Vec<mpsc::UnboundedSender<Inbound>>>,
}

impl ScriptedServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn plan(&self, outcome: Result<(), ConnectError>) {
        self.plans.lock().unwrap().push_back(outcome);
    }

    pub fn push(&self, frame: Inbound) {
        let sockets = self.sockets.lock().unwrap();
        let socket = sockets.last().expect("no socket accepted yet");
        // A closed socket just drops the frame, like a real network would.
        let _ = socket.send(frame);
    }

    pub fn text(&self, raw: &str) {
        self.push(Inbound::Text(raw.to_string()));
    }

    /// Abnormal close (1006) of the live socket.
    pub fn drop_connection(&self) {
        self.push(Inbound::Closed {
            code: Some(1006),
            reason: "abnormal closure".to_string(),
        });
    }

    pub fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

struct ScriptedConnection {
    rx: mpsc::UnboundedReceiver<Inbound>,
}

#[async_trait]
impl Connection for ScriptedConnection {
    async fn recv(&mut self) -> Inbound {
        self.rx.recv().await.unwrap_or(Inbound::Closed {
            code: None,
            reason: "server gone".to_string(),
        })
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}

#[async_trait]
impl Connector for ScriptedServer {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>, ConnectError> {
        self.urls.lock().unwrap().push(url.to_string());
        let plan = self.plans.lock().unwrap().pop_front().unwrap_or(Ok(()));
        plan?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.sockets.lock().unwrap().push(tx);
        Ok(Box::new(ScriptedConnection { rx }))
    }
}

/// Collects alert kinds.
pub fn alert_sink() -> (Arc<Mutex<Vec<ErrorKind>>>, attendsync_realtime::channel::AlertHandler) {
    let alerts = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&alerts);
    (alerts, Arc::new(move |e: &AppError| sink.lock().unwrap().push(e.kind)))
}

pub async fn wait_for_state(channel: &RealtimeChannel, state: ChannelState) -> ChannelConnection {
    let mut rx = channel.subscribe_state();
    let snapshot = time::timeout(Duration::from_secs(300), rx.wait_for(|c| c.state == state))
        .await
        .unwrap_or_else(|_| panic!("channel never reached {state:?}"))
        .expect("channel dropped");
    snapshot.clone()
}

pub const LOG_L1: &str = r#"{"resource":"log","operation":"create","payload":{"id":"L1","action":"x"}}"#;
pub const LOG_L2: &str = r#"{"resource":"log","operation":"create","payload":{"id":"L2","action":"y"}}"#;
