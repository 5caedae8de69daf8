//! Session lifecycle manager: restore, login, periodic refresh, logout.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use attendsync_core::config::SessionConfig;
use attendsync_core::error::AppError;
use attendsync_core::result::AppResult;
use attendsync_core::traits::{AuthApi, TokenSource};
use attendsync_core::types::{Session, SessionStatus, UserProfile};

use crate::token::TokenStore;

/// Why a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogoutReason {
    /// The user asked to log out.
    UserRequested,
    /// The refresh endpoint rejected the token or could not be reached.
    RefreshFailed,
    /// A view reported that the server rejected the token.
    AuthExpired,
}

impl LogoutReason {
    fn as_str(&self) -> &'static str {
        match self {
            LogoutReason::UserRequested => "user_requested",
            LogoutReason::RefreshFailed => "refresh_failed",
            LogoutReason::AuthExpired => "auth_expired",
        }
    }
}

struct RefreshTask {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

struct SessionInner {
    store: Arc<TokenStore>,
    api: Arc<dyn AuthApi>,
    config: SessionConfig,
    status_tx: watch::Sender<SessionStatus>,
    /// Bumped whenever the credential's identity changes (login, restore,
    /// logout). In-flight work compares it after every await.
    epoch: AtomicU64,
    restored: AtomicBool,
    transition: Mutex<()>,
    refresh: Mutex<Option<RefreshTask>>,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if let Some(task) = lock(&self.refresh).take() {
            task.cancel.cancel();
            task.handle.abort();
        }
    }
}

/// Owner of the process-wide session.
///
/// Cheap to clone; every clone drives the same session. Views receive it by
/// reference or clone instead of reaching for ambient state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<SessionInner>,
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("status", &self.status())
            .field("config", &self.inner.config)
            .finish()
    }
}

impl SessionManager {
    /// Creates a session manager. The session starts `Anonymous` until
    /// [`SessionManager::restore`] or [`SessionManager::login`] runs.
    pub fn new(store: Arc<TokenStore>, api: Arc<dyn AuthApi>, config: SessionConfig) -> Self {
        let (status_tx, _) = watch::channel(SessionStatus::Anonymous);
        Self {
            inner: Arc::new(SessionInner {
                store,
                api,
                config,
                status_tx,
                epoch: AtomicU64::new(0),
                restored: AtomicBool::new(false),
                transition: Mutex::new(()),
                refresh: Mutex::new(None),
            }),
        }
    }

    /// Restores the persisted session. Runs at most once per manager;
    /// later calls return the current status.
    pub async fn restore(&self) -> AppResult<SessionStatus> {
        if self.inner.restored.swap(true, Ordering::SeqCst) {
            return Ok(self.status());
        }

        let epoch = {
            let _t = lock(&self.inner.transition);
            self.set_status(SessionStatus::Restoring);
            self.epoch()
        };

        let token = match self.inner.store.load() {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "Failed to read persisted session");
                self.finish_restore_anonymous(epoch);
                return Ok(self.status());
            }
        };

        let Some(token) = token else {
            debug!("No persisted token");
            self.finish_restore_anonymous(epoch);
            return Ok(self.status());
        };

        match self.inner.api.fetch_profile(&token).await {
            Ok(user) => {
                let _t = lock(&self.inner.transition);
                if self.epoch() != epoch {
                    debug!("Session changed during restore, discarding restored profile");
                    return Ok(self.status());
                }
                // A storage failure is logged by the store; the pair is held either way.
                let _ = self.inner.store.set_session(&token, &user);
                self.bump_epoch();
                self.set_status(SessionStatus::Authenticated);
                self.start_refresh();
                info!(user_id = %user.id, role = %user.role, "Session restored");
            }
            Err(e) => {
                info!(error = %e, "Persisted token rejected, starting anonymous");
                self.finish_restore_anonymous(epoch);
            }
        }

        Ok(self.status())
    }

    fn finish_restore_anonymous(&self, epoch: u64) {
        let _t = lock(&self.inner.transition);
        if self.epoch() != epoch {
            return;
        }
        if let Err(e) = self.inner.store.clear() {
            warn!(error = %e, "Failed to clear persisted session");
        }
        self.bump_epoch();
        self.set_status(SessionStatus::Anonymous);
    }

    /// Logs in with email and password.
    ///
    /// On success token and user are stored together and the refresh cycle
    /// starts. On failure the session is left exactly as it was. A session
    /// that could not be persisted still authenticates; it just will not
    /// survive a restart.
    pub async fn login(&self, email: &str, password: &str) -> AppResult<UserProfile> {
        if email.trim().is_empty() || password.is_empty() {
            return Err(AppError::validation("Email and password are required"));
        }

        let grant = match self.inner.api.login(email, password).await {
            Ok(grant) => grant,
            Err(e) => {
                warn!(error = %e, "Login failed");
                return Err(e);
            }
        };

        let _t = lock(&self.inner.transition);
        let _ = self.inner.store.set_session(&grant.token, &grant.user);
        self.cancel_refresh();
        self.bump_epoch();
        self.inner.restored.store(true, Ordering::SeqCst);
        self.set_status(SessionStatus::Authenticated);
        self.start_refresh();

        info!(user_id = %grant.user.id, role = %grant.user.role, "Login successful");
        Ok(grant.user)
    }

    /// Ends the session. Idempotent: returns `false` if nothing was held.
    ///
    /// The refresh timer is cancelled before this returns, and the token is
    /// gone for every subsequent [`TokenSource::current_token`] call.
    pub fn logout(&self) -> bool {
        self.end_session(LogoutReason::UserRequested, None)
    }

    /// Called by views when a channel or REST call reports `AuthExpired`.
    pub fn report_auth_expired(&self) -> bool {
        self.end_session(LogoutReason::AuthExpired, None)
    }

    /// Ends the session. With `expected_epoch`, only the session of that
    /// epoch is ended; the check runs under the transition lock.
    fn end_session(&self, reason: LogoutReason, expected_epoch: Option<u64>) -> bool {
        let _t = lock(&self.inner.transition);

        if expected_epoch.is_some_and(|epoch| epoch != self.epoch()) {
            debug!(reason = reason.as_str(), "Session already replaced, not ending it");
            return false;
        }

        let had_credential = self.inner.store.get().is_some();
        let status = self.status();
        if status == SessionStatus::Anonymous && !had_credential {
            debug!(reason = reason.as_str(), "Logout on anonymous session ignored");
            return false;
        }

        self.cancel_refresh();
        self.bump_epoch();
        if let Err(e) = self.inner.store.clear() {
            warn!(error = %e, "Failed to clear persisted session");
        }
        self.set_status(SessionStatus::Anonymous);

        info!(reason = reason.as_str(), "Logged out");
        true
    }

    /// Starts the periodic refresh cycle if it is not already running.
    ///
    /// Login and restore call this automatically; it is a no-op unless the
    /// session is `Authenticated`.
    pub fn schedule_refresh(&self) {
        let _t = lock(&self.inner.transition);
        if self.status() != SessionStatus::Authenticated {
            return;
        }
        if lock(&self.inner.refresh).is_some() {
            return;
        }
        self.start_refresh();
    }

    /// Returns `true` while a refresh timer is scheduled.
    pub fn is_refresh_scheduled(&self) -> bool {
        lock(&self.inner.refresh)
            .as_ref()
            .is_some_and(|task| !task.handle.is_finished())
    }

    fn start_refresh(&self) {
        let period = Duration::from_secs(self.inner.config.refresh_interval_seconds.max(1));
        let cancel = CancellationToken::new();
        let epoch = self.epoch();
        let weak = Arc::downgrade(&self.inner);
        let task_cancel = cancel.clone();

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                let Some(inner) = weak.upgrade() else { break };
                let manager = SessionManager { inner };
                if !manager.refresh_once(epoch).await {
                    break;
                }
            }
            debug!("Refresh loop ended");
        });

        *lock(&self.inner.refresh) = Some(RefreshTask { cancel, handle });
        debug!(interval_secs = period.as_secs(), "Token refresh scheduled");
    }

    fn cancel_refresh(&self) {
        if let Some(task) = lock(&self.inner.refresh).take() {
            task.cancel.cancel();
            task.handle.abort();
            debug!("Token refresh cancelled");
        }
    }

    /// Performs one refresh round. Returns `false` when the loop should stop.
    async fn refresh_once(&self, epoch: u64) -> bool {
        if self.epoch() != epoch {
            return false;
        }
        let Some(token) = self.inner.store.get() else {
            return false;
        };

        match self.inner.api.refresh(&token).await {
            Ok(new_token) => {
                let _t = lock(&self.inner.transition);
                if self.epoch() != epoch || self.status() != SessionStatus::Authenticated {
                    debug!("Discarding refresh result for a superseded session");
                    return false;
                }
                // The new token is held even if persisting it fails.
                let _ = self.inner.store.set(&new_token);
                info!("Access token refreshed");
                true
            }
            Err(e) => {
                warn!(error = %e, kind = %e.kind, "Token refresh failed");
                self.end_session(LogoutReason::RefreshFailed, Some(epoch));
                false
            }
        }
    }

    /// Returns the current status.
    pub fn status(&self) -> SessionStatus {
        *self.inner.status_tx.borrow()
    }

    /// Subscribe to status transitions.
    pub fn subscribe_status(&self) -> watch::Receiver<SessionStatus> {
        self.inner.status_tx.subscribe()
    }

    /// Returns the authenticated user, if any.
    pub fn current_user(&self) -> Option<UserProfile> {
        if self.status() != SessionStatus::Authenticated {
            return None;
        }
        self.inner.store.user()
    }

    /// Returns the current access token while authenticated.
    pub fn current_token(&self) -> Option<String> {
        if self.status() != SessionStatus::Authenticated {
            return None;
        }
        self.inner.store.get()
    }

    /// Returns a point-in-time copy of the session.
    pub fn session(&self) -> Session {
        let _t = lock(&self.inner.transition);
        let status = self.status();
        match status {
            SessionStatus::Authenticated => {
                let (token, user) = self.inner.store.snapshot();
                Session {
                    token,
                    user,
                    status,
                }
            }
            SessionStatus::Restoring | SessionStatus::Anonymous => Session {
                token: None,
                user: None,
                status,
            },
        }
    }

    /// Returns the underlying token store.
    pub fn store(&self) -> &Arc<TokenStore> {
        &self.inner.store
    }

    /// Token source for real-time channels.
    ///
    /// Reads the token at every call and yields nothing once the session is
    /// no longer authenticated (or the manager was dropped).
    pub fn token_source(&self) -> Arc<dyn TokenSource> {
        Arc::new(SessionTokenSource {
            inner: Arc::downgrade(&self.inner),
        })
    }

    fn epoch(&self) -> u64 {
        self.inner.epoch.load(Ordering::SeqCst)
    }

    fn bump_epoch(&self) {
        self.inner.epoch.fetch_add(1, Ordering::SeqCst);
    }

    fn set_status(&self, status: SessionStatus) {
        let previous = self.inner.status_tx.send_replace(status);
        if previous != status {
            debug!(from = %previous, to = %status, "Session status changed");
        }
    }
}

struct SessionTokenSource {
    inner: Weak<SessionInner>,
}

impl TokenSource for SessionTokenSource {
    fn current_token(&self) -> Option<String> {
        let inner = self.inner.upgrade()?;
        SessionManager { inner }.current_token()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
