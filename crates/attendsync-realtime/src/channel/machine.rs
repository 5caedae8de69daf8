//! Channel lifecycle as a synchronous state machine.
//!
//! The machine owns every decision (when to connect, how long to back off,
//! when to give up, what to emit) and performs no I/O. The driver in
//! [`super::realtime`] executes the returned commands and feeds the outcomes
//! back in, so all transitions are testable without sockets or timers.

use std::sync::Arc;
use std::time::Duration;

use attendsync_core::error::AppError;
use attendsync_core::events::Event;

use crate::connection::{
    AUTH_CLOSE_CODES, Backoff, ChannelConnection, ChannelState, CloseCause, ConnectError,
    Endpoint, Jitter, ReconnectPolicy,
};
use crate::message::{Decoded, Ignored, ResourceFilter, decode_event};

use super::options::ChannelOptions;

/// Something that happened to the channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelInput {
    /// The owner started the channel. `token` is read at call time.
    Start {
        /// Current access token.
        token: Option<String>,
    },
    /// The handshake succeeded.
    Opened,
    /// The handshake failed.
    ConnectFailed(ConnectError),
    /// A text frame arrived.
    Received(String),
    /// A frame arrived that is not valid text.
    Unreadable(String),
    /// The connection ended without `stop()`.
    Disconnected {
        /// Close code, when the peer sent one.
        code: Option<u16>,
        /// Close reason or transport error.
        reason: String,
    },
    /// No frame arrived within the idle timeout.
    IdleTimeout,
    /// The backoff delay elapsed. `token` is read at this moment.
    RetryDue {
        /// Current access token.
        token: Option<String>,
    },
    /// The owner stopped the channel.
    Stop,
}

/// A frame that produced no event.
#[derive(Debug, Clone)]
pub enum Dropped {
    /// The frame failed to decode.
    Malformed(AppError),
    /// The frame was well formed but not applicable.
    Ignored(Ignored),
}

/// Work for the driver.
#[derive(Debug, Clone)]
pub enum ChannelCommand {
    /// Open a connection to this URL.
    Connect {
        /// Full URL including the token.
        url: String,
    },
    /// Wait `delay`, then feed [`ChannelInput::RetryDue`].
    ScheduleRetry {
        /// Backoff delay.
        delay: Duration,
        /// Attempt number this retry represents (1-based).
        attempt: u32,
    },
    /// Deliver an event to the handler.
    Emit(Event),
    /// Record a dropped frame.
    Discard(Dropped),
    /// Surface an error to the owner. Issued at most once per channel.
    Alert(AppError),
    /// Refuse the input; returned to the caller of `start`.
    Reject(AppError),
    /// Close the live socket, if any.
    CloseSocket,
}

/// Pure channel state machine.
#[derive(Debug)]
pub struct ChannelMachine {
    endpoint: Endpoint,
    policy: ReconnectPolicy,
    backoff: Backoff,
    jitter: Arc<dyn Jitter>,
    filter: ResourceFilter,
    state: ChannelState,
    attempt: u32,
    retry_delay: Option<Duration>,
    last_error: Option<AppError>,
    close_cause: Option<CloseCause>,
}

impl ChannelMachine {
    /// Creates an `Idle` machine.
    pub fn new(options: &ChannelOptions) -> Self {
        Self {
            endpoint: options.endpoint(),
            policy: options.policy,
            backoff: options.backoff,
            jitter: Arc::clone(&options.jitter),
            filter: options.resources.clone(),
            state: ChannelState::Idle,
            attempt: 0,
            retry_delay: None,
            last_error: None,
            close_cause: None,
        }
    }

    /// Returns the current state.
    pub fn state(&self) -> ChannelState {
        self.state
    }

    /// Returns the consecutive failure count.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Returns the endpoint this machine connects to.
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Returns an observable snapshot.
    pub fn connection(&self) -> ChannelConnection {
        ChannelConnection {
            state: self.state,
            attempt: self.attempt,
            retry_delay: self.retry_delay,
            last_error: self.last_error.as_ref().map(|e| e.kind),
            close_cause: self.close_cause,
        }
    }

    /// Single dispatch function.
    pub fn handle(&mut self, input: ChannelInput) -> Vec<ChannelCommand> {
        use ChannelState::{Connecting, Idle, Open, Reconnecting};

        match (self.state, input) {
            (_, ChannelInput::Stop) => self.stop(),

            (Idle, ChannelInput::Start { token: None }) => vec![ChannelCommand::Reject(
                AppError::unauthenticated("No access token; a session is required to open a channel"),
            )],
            (Idle, ChannelInput::Start { token: Some(token) }) => {
                self.state = Connecting;
                vec![ChannelCommand::Connect {
                    url: self.endpoint.url(&token),
                }]
            }
            (_, ChannelInput::Start { .. }) => vec![ChannelCommand::Reject(AppError::validation(
                "Channel can only be started once",
            ))],

            (Connecting, ChannelInput::Opened) => {
                self.state = Open;
                self.attempt = 0;
                self.retry_delay = None;
                self.last_error = None;
                Vec::new()
            }
            // A handshake that completed after the channel moved on.
            (_, ChannelInput::Opened) => vec![ChannelCommand::CloseSocket],

            (Connecting, ChannelInput::ConnectFailed(err)) => {
                if err.is_auth_rejection() {
                    self.close(CloseCause::AuthExpired, err.to_app_error())
                } else {
                    self.retry_or_give_up(err.to_app_error())
                }
            }

            (Open, ChannelInput::Received(raw)) => match decode_event(&raw, &self.filter) {
                Ok(Decoded::Event(event)) => vec![ChannelCommand::Emit(event)],
                Ok(Decoded::Ignored(reason)) => {
                    vec![ChannelCommand::Discard(Dropped::Ignored(reason))]
                }
                Err(e) => vec![ChannelCommand::Discard(Dropped::Malformed(e))],
            },
            (Open, ChannelInput::Unreadable(reason)) => vec![ChannelCommand::Discard(
                Dropped::Malformed(AppError::malformed(format!("Unreadable frame: {reason}"))),
            )],

            (Open, ChannelInput::Disconnected { code, reason }) => match code {
                Some(code) if AUTH_CLOSE_CODES.contains(&code) => self.close(
                    CloseCause::AuthExpired,
                    AppError::auth_expired(format!("Server closed with {code}: {reason}")),
                ),
                _ => self.retry_or_give_up(AppError::transient(format!(
                    "Connection closed ({}): {reason}",
                    code.map_or_else(|| "no code".to_string(), |c| c.to_string())
                ))),
            },

            (Open, ChannelInput::IdleTimeout) => {
                let mut commands = vec![ChannelCommand::CloseSocket];
                commands.extend(
                    self.retry_or_give_up(AppError::transient("No frame within idle timeout")),
                );
                commands
            }

            (Reconnecting, ChannelInput::RetryDue { token: None }) => {
                self.state = ChannelState::Closed;
                self.close_cause = Some(CloseCause::LoggedOut);
                self.retry_delay = None;
                Vec::new()
            }
            (Reconnecting, ChannelInput::RetryDue { token: Some(token) }) => {
                self.state = Connecting;
                self.retry_delay = None;
                vec![ChannelCommand::Connect {
                    url: self.endpoint.url(&token),
                }]
            }

            // Anything else is stale: a frame or timer from a state already left.
            _ => Vec::new(),
        }
    }

    fn stop(&mut self) -> Vec<ChannelCommand> {
        if self.state.is_terminal() {
            return Vec::new();
        }
        self.state = ChannelState::Closed;
        self.close_cause = Some(CloseCause::Stopped);
        self.retry_delay = None;
        vec![ChannelCommand::CloseSocket]
    }

    fn retry_or_give_up(&mut self, err: AppError) -> Vec<ChannelCommand> {
        if !self.policy.allows(self.attempt) {
            let exhausted = AppError::reconnect_exhausted(format!(
                "Gave up after {} reconnect attempts: {}",
                self.attempt, err.message
            ));
            return self.close(CloseCause::ReconnectExhausted, exhausted);
        }

        let jitter = self.jitter.sample(self.backoff.jitter_max);
        let delay = self.backoff.delay(self.attempt, jitter);
        self.attempt += 1;
        self.state = ChannelState::Reconnecting;
        self.retry_delay = Some(delay);
        self.last_error = Some(err);

        vec![ChannelCommand::ScheduleRetry {
            delay,
            attempt: self.attempt,
        }]
    }

    /// Closed is terminal, so the alert fires at most once.
    fn close(&mut self, cause: CloseCause, err: AppError) -> Vec<ChannelCommand> {
        self.state = ChannelState::Closed;
        self.close_cause = Some(cause);
        self.retry_delay = None;
        self.last_error = Some(err.clone());
        vec![ChannelCommand::Alert(err)]
    }
}
