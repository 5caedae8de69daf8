//! In-process connector and helpers shared by unit tests.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time;

use attendsync_core::events::Event;
use attendsync_core::traits::TokenSource;

use crate::channel::RealtimeChannel;
use crate::connection::{ChannelConnection, ChannelState, ConnectError, Connection, Connector, Inbound};

/// Connector that hands out in-memory sockets fed by the test.
#[derive(Default)]
pub(crate) struct MockServer {
    /// Outcome of each upcoming connect; `Ok` once exhausted.
    pub(crate) plans: Mutex<VecDeque<Result<(), ConnectError>>>,
    urls: Mutex<Vec<String>>,
    sockets: Mutex<Vec<mpsc::UnboundedSender<Inbound>>>,
}

impl MockServer {
    /// Push a frame onto the most recent socket.
    pub(crate) fn push(&self, frame: Inbound) {
        let sockets = self.sockets.lock().unwrap();
        sockets.last().unwrap().send(frame).unwrap();
    }

    pub(crate) fn text(&self, raw: &str) {
        self.push(Inbound::Text(raw.to_string()));
    }

    pub(crate) fn urls(&self) -> Vec<String> {
        self.urls.lock().unwrap().clone()
    }
}

struct MockConnection {
    rx: mpsc::UnboundedReceiver<Inbound>,
}

#[async_trait]
impl Connection for MockConnection {
    async fn recv(&mut self) -> Inbound {
        self.rx.recv().await.unwrap_or(Inbound::Closed {
            code: None,
            reason: "server gone".into(),
        })
    }

    async fn close(&mut self) {
        self.rx.close();
    }
}

#[async_trait]
impl Connector for MockServer {
    async fn connect(&self, url: &str) -> Result<Box<dyn Connection>, ConnectError> {
        self.urls.lock().unwrap().push(url.to_string());
        let plan = self.plans.lock().unwrap().pop_front().unwrap_or(Ok(()));
        plan?;
        let (tx, rx) = mpsc::unbounded_channel();
        self.sockets.lock().unwrap().push(tx);
        Ok(Box::new(MockConnection { rx }))
    }
}

/// Writable token cell and a source reading it.
pub(crate) fn token_cell(initial: Option<&str>) -> (Arc<Mutex<Option<String>>>, Arc<dyn TokenSource>) {
    let cell = Arc::new(Mutex::new(initial.map(str::to_string)));
    let reader = Arc::clone(&cell);
    let source: Arc<dyn TokenSource> = Arc::new(move || reader.lock().unwrap().clone());
    (cell, source)
}

pub(crate) fn collector() -> (Arc<Mutex<Vec<Event>>>, impl Fn(Event) + Send + Sync + 'static) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    (seen, move |e| sink.lock().unwrap().push(e))
}

pub(crate) async fn wait_for_state(channel: &RealtimeChannel, state: ChannelState) -> ChannelConnection {
    let mut rx = channel.subscribe_state();
    let snapshot = time::timeout(Duration::from_secs(120), rx.wait_for(|c| c.state == state))
        .await
        .expect("state not reached")
        .expect("channel dropped");
    snapshot.clone()
}

pub(crate) const L1: &str = r#"{"resource":"log","operation":"create","payload":{"id":"L1","action":"x"}}"#;
pub(crate) const L2: &str = r#"{"resource":"log","operation":"create","payload":{"id":"L2","action":"y"}}"#;
