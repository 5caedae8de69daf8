//! Tokio driver for one self-healing channel.

use std::cell::Cell;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use attendsync_core::ErrorKind;
use attendsync_core::error::AppError;
use attendsync_core::events::Event;
use attendsync_core::result::AppResult;
use attendsync_core::traits::TokenSource;

use crate::connection::{ChannelConnection, ChannelState, ConnectError, Connection, Connector, Inbound};
use crate::metrics::ChannelMetrics;

use super::machine::{ChannelCommand, ChannelInput, ChannelMachine, Dropped};
use super::options::ChannelOptions;

/// Unique identifier for a channel.
pub type ChannelId = Uuid;

/// Event callback.
pub type EventHandler = Arc<dyn Fn(Event) + Send + Sync>;

/// Alert callback for `AuthExpired` and `ReconnectExhausted`.
pub type AlertHandler = Arc<dyn Fn(&AppError) + Send + Sync>;

thread_local! {
    /// Channel whose callback is running on this thread.
    static DISPATCHING: Cell<Option<ChannelId>> = const { Cell::new(None) };
}

struct DispatchScope {
    previous: Option<ChannelId>,
}

impl DispatchScope {
    fn enter(id: ChannelId) -> Self {
        Self {
            previous: DISPATCHING.with(|d| d.replace(Some(id))),
        }
    }
}

impl Drop for DispatchScope {
    fn drop(&mut self) {
        DISPATCHING.with(|d| d.set(self.previous));
    }
}

/// Returns `true` while any channel callback runs on this thread.
fn in_dispatch() -> bool {
    DISPATCHING.with(|d| d.get().is_some())
}

struct Shared {
    id: ChannelId,
    resource_path: String,
    machine: Mutex<ChannelMachine>,
    state_tx: watch::Sender<ChannelConnection>,
    /// Set by `stop()`; checked under `gate` before every callback.
    stopped: AtomicBool,
    /// Held for the duration of each callback.
    gate: Mutex<()>,
    on_event: Mutex<Option<EventHandler>>,
    on_alert: Option<AlertHandler>,
    metrics: Arc<ChannelMetrics>,
}

impl Shared {
    fn feed(&self, input: ChannelInput) -> Vec<ChannelCommand> {
        let mut machine = lock(&self.machine);
        let before = machine.state();
        let commands = machine.handle(input);
        let snapshot = machine.connection();
        drop(machine);

        if snapshot.state != before {
            debug!(
                channel_id = %self.id,
                path = %self.resource_path,
                from = %before,
                to = %snapshot.state,
                attempt = snapshot.attempt,
                "Channel state changed"
            );
        }
        self.state_tx.send_replace(snapshot);
        commands
    }

    fn dispatch_event(&self, event: Event) {
        let _gate = lock(&self.gate);
        if self.stopped.load(Ordering::SeqCst) {
            self.metrics.late();
            return;
        }
        let Some(handler) = lock(&self.on_event).clone() else {
            return;
        };
        let _scope = DispatchScope::enter(self.id);
        self.metrics.event_delivered();
        handler(event);
    }

    fn dispatch_alert(&self, err: &AppError) {
        warn!(
            channel_id = %self.id,
            path = %self.resource_path,
            kind = %err.kind,
            "Channel closed: {}",
            err.message
        );
        let _gate = lock(&self.gate);
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }
        if let Some(handler) = &self.on_alert {
            let _scope = DispatchScope::enter(self.id);
            handler(err);
        }
    }
}

/// One authenticated, self-healing duplex stream.
///
/// `start` spawns a driver task on the current tokio runtime. Each
/// connection attempt reads the token from the [`TokenSource`] at that
/// moment. After [`RealtimeChannel::stop`] returns no callback runs again,
/// and `stop` may be called from inside a callback (of this or any other
/// channel).
pub struct RealtimeChannel {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    options: ChannelOptions,
    cancel: CancellationToken,
}

impl std::fmt::Debug for RealtimeChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeChannel")
            .field("id", &self.shared.id)
            .field("path", &self.shared.resource_path)
            .field("state", &self.state())
            .finish()
    }
}

impl RealtimeChannel {
    /// Creates an idle channel.
    pub fn new(connector: Arc<dyn Connector>, options: ChannelOptions) -> Self {
        Self::build(connector, options, None)
    }

    /// Creates an idle channel that reports terminal failures to `on_alert`.
    pub fn with_alert_handler(
        connector: Arc<dyn Connector>,
        options: ChannelOptions,
        on_alert: AlertHandler,
    ) -> Self {
        Self::build(connector, options, Some(on_alert))
    }

    fn build(
        connector: Arc<dyn Connector>,
        options: ChannelOptions,
        on_alert: Option<AlertHandler>,
    ) -> Self {
        let machine = ChannelMachine::new(&options);
        let (state_tx, _) = watch::channel(machine.connection());
        Self {
            shared: Arc::new(Shared {
                id: Uuid::new_v4(),
                resource_path: machine.endpoint().resource_path().to_string(),
                machine: Mutex::new(machine),
                state_tx,
                stopped: AtomicBool::new(false),
                gate: Mutex::new(()),
                on_event: Mutex::new(None),
                on_alert,
                metrics: Arc::new(ChannelMetrics::new()),
            }),
            connector,
            options,
            cancel: CancellationToken::new(),
        }
    }

    /// Returns the channel ID.
    pub fn id(&self) -> ChannelId {
        self.shared.id
    }

    /// Returns the resource path.
    pub fn resource_path(&self) -> &str {
        &self.shared.resource_path
    }

    /// Starts connecting.
    ///
    /// Fails with `Unauthenticated` (and never connects) when `tokens` has no
    /// token right now.
    pub fn start<F>(&self, tokens: Arc<dyn TokenSource>, on_event: F) -> AppResult<()>
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|_| AppError::internal("RealtimeChannel::start requires a tokio runtime"))?;

        let commands = self.shared.feed(ChannelInput::Start {
            token: tokens.current_token(),
        });
        if let Some(err) = commands.iter().find_map(|c| match c {
            ChannelCommand::Reject(e) => Some(e.clone()),
            _ => None,
        }) {
            if err.is(ErrorKind::Unauthenticated) {
                error!(path = %self.shared.resource_path, "Channel started without a session");
            }
            return Err(err);
        }

        *lock(&self.shared.on_event) = Some(Arc::new(on_event));

        info!(
            channel_id = %self.shared.id,
            path = %self.shared.resource_path,
            policy = %self.options.policy,
            "Channel starting"
        );

        let driver = Driver {
            shared: Arc::clone(&self.shared),
            connector: Arc::clone(&self.connector),
            tokens,
            options: self.options.clone(),
            cancel: self.cancel.clone(),
            conn: None,
        };
        runtime.spawn(driver.run(commands));
        Ok(())
    }

    /// Stops the channel. Idempotent.
    ///
    /// Cancels the pending retry timer, closes the socket, and moves to
    /// `Closed`. Once this returns no further event or alert callback runs.
    ///
    /// Called from outside any callback, it also waits for a callback already
    /// running on another thread. Called from inside a callback it does not
    /// wait, so two callbacks stopping each other cannot deadlock; no new
    /// callback starts either way.
    pub fn stop(&self) {
        let first = !self.shared.stopped.swap(true, Ordering::SeqCst);
        self.cancel.cancel();
        self.shared.feed(ChannelInput::Stop);

        if !in_dispatch() {
            drop(lock(&self.shared.gate));
        }

        if first {
            *lock(&self.shared.on_event) = None;
            info!(channel_id = %self.shared.id, path = %self.shared.resource_path, "Channel stopped");
        }
    }

    /// Returns `true` once `stop` was called.
    pub fn is_stopped(&self) -> bool {
        self.shared.stopped.load(Ordering::SeqCst)
    }

    /// Returns the current state.
    pub fn state(&self) -> ChannelState {
        self.shared.state_tx.borrow().state
    }

    /// Returns the current connection snapshot.
    pub fn connection(&self) -> ChannelConnection {
        self.shared.state_tx.borrow().clone()
    }

    /// Subscribe to connection snapshots.
    pub fn subscribe_state(&self) -> watch::Receiver<ChannelConnection> {
        self.shared.state_tx.subscribe()
    }

    /// Returns the channel metrics.
    pub fn metrics(&self) -> &Arc<ChannelMetrics> {
        &self.shared.metrics
    }
}

impl Drop for RealtimeChannel {
    fn drop(&mut self) {
        self.stop();
    }
}

struct Driver {
    shared: Arc<Shared>,
    connector: Arc<dyn Connector>,
    tokens: Arc<dyn TokenSource>,
    options: ChannelOptions,
    cancel: CancellationToken,
    conn: Option<Box<dyn Connection>>,
}

impl Driver {
    async fn run(mut self, initial: Vec<ChannelCommand>) {
        let mut pending: VecDeque<ChannelCommand> = initial.into();

        loop {
            while let Some(command) = pending.pop_front() {
                if self.cancel.is_cancelled() {
                    self.close_socket().await;
                    return;
                }
                if let Some(next) = self.execute(command).await {
                    pending.extend(next);
                }
            }

            let Some(conn) = self.conn.as_mut() else {
                break;
            };

            let idle = self.options.idle_timeout;
            let inbound = tokio::select! {
                _ = self.cancel.cancelled() => None,
                frame = next_frame(conn.as_mut(), idle) => Some(frame),
            };

            let input = match inbound {
                None => {
                    self.close_socket().await;
                    return;
                }
                Some(None) => ChannelInput::IdleTimeout,
                Some(Some(Inbound::Text(raw))) => {
                    self.shared.metrics.message_received();
                    ChannelInput::Received(raw)
                }
                Some(Some(Inbound::Unreadable(reason))) => {
                    self.shared.metrics.message_received();
                    ChannelInput::Unreadable(reason)
                }
                Some(Some(Inbound::Closed { code, reason })) => {
                    self.conn = None;
                    ChannelInput::Disconnected { code, reason }
                }
                Some(Some(Inbound::Failed(reason))) => {
                    self.conn = None;
                    ChannelInput::Disconnected { code: None, reason }
                }
            };
            pending.extend(self.shared.feed(input));
        }

        debug!(channel_id = %self.shared.id, "Channel driver finished");
    }

    /// Runs one command; returns follow-up commands from the machine.
    async fn execute(&mut self, command: ChannelCommand) -> Option<Vec<ChannelCommand>> {
        match command {
            ChannelCommand::Connect { url } => {
                self.shared.metrics.connect_attempt();
                let attempt = tokio::select! {
                    _ = self.cancel.cancelled() => return None,
                    result = time::timeout(self.options.connect_timeout, self.connector.connect(&url)) => result,
                };
                let input = match attempt {
                    Ok(Ok(conn)) => {
                        self.conn = Some(conn);
                        self.shared.metrics.connection_opened();
                        info!(channel_id = %self.shared.id, path = %self.shared.resource_path, "Channel open");
                        ChannelInput::Opened
                    }
                    Ok(Err(e)) => {
                        debug!(channel_id = %self.shared.id, error = %e, "Connection attempt failed");
                        ChannelInput::ConnectFailed(e)
                    }
                    Err(_) => ChannelInput::ConnectFailed(ConnectError::Timeout),
                };
                Some(self.shared.feed(input))
            }
            ChannelCommand::ScheduleRetry { delay, attempt } => {
                self.shared.metrics.reconnect_scheduled();
                debug!(
                    channel_id = %self.shared.id,
                    attempt,
                    delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                    "Reconnect scheduled"
                );
                tokio::select! {
                    _ = self.cancel.cancelled() => return None,
                    _ = time::sleep(delay) => {}
                }
                // Read at the point of use so a rotation or logout is seen.
                let token = self.tokens.current_token();
                if token.is_none() {
                    info!(channel_id = %self.shared.id, "No token at reconnect, closing channel");
                }
                Some(self.shared.feed(ChannelInput::RetryDue { token }))
            }
            ChannelCommand::Emit(event) => {
                self.shared.dispatch_event(event);
                None
            }
            ChannelCommand::Discard(Dropped::Malformed(e)) => {
                self.shared.metrics.malformed();
                warn!(channel_id = %self.shared.id, error = %e, "Dropping malformed message");
                None
            }
            ChannelCommand::Discard(Dropped::Ignored(reason)) => {
                self.shared.metrics.ignored();
                debug!(channel_id = %self.shared.id, %reason, "Ignoring message");
                None
            }
            ChannelCommand::Alert(err) => {
                self.shared.dispatch_alert(&err);
                None
            }
            ChannelCommand::Reject(err) => {
                debug!(channel_id = %self.shared.id, error = %err, "Input rejected");
                None
            }
            ChannelCommand::CloseSocket => {
                self.close_socket().await;
                None
            }
        }
    }

    async fn close_socket(&mut self) {
        if let Some(mut conn) = self.conn.take() {
            conn.close().await;
        }
    }
}

/// Next frame, or `None` when the idle timeout elapsed first.
async fn next_frame(conn: &mut dyn Connection, idle: Option<std::time::Duration>) -> Option<Inbound> {
    match idle {
        Some(limit) => time::timeout(limit, conn.recv()).await.ok(),
        None => Some(conn.recv().await),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
