//! Process-wide token store with synchronous change notification.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, warn};

use attendsync_core::result::AppResult;
use attendsync_core::traits::{DurableStorage, TOKEN_SLOT, TokenSource, USER_SLOT};
use attendsync_core::types::UserProfile;

/// A change applied to the store, delivered to subscribers in write order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenChange {
    /// A token (and user) was stored where none was held before, or a new
    /// login replaced the previous credential.
    Set {
        /// The stored token.
        token: String,
    },
    /// The token was replaced in place; the user is unchanged.
    Rotated {
        /// The new token.
        token: String,
    },
    /// Token and user were removed.
    Cleared,
}

/// Subscriber callback.
pub type TokenListener = Arc<dyn Fn(&TokenChange) + Send + Sync>;

/// Handle returned by [`TokenStore::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

#[derive(Debug, Default)]
struct Held {
    token: Option<String>,
    user: Option<UserProfile>,
}

/// Holder of the current access token and user profile.
///
/// Every mutation writes durable storage first, then updates the in-memory
/// copy, then notifies subscribers synchronously. Mutations are serialized,
/// so subscribers observe them in program order with no coalescing.
/// Listeners must not mutate the store they are subscribed to.
///
/// The in-memory copy is authoritative. A failed storage write never stops
/// it from changing; the storage error is returned after subscribers were
/// notified, and the only cost is that the change does not survive a restart.
pub struct TokenStore {
    storage: Arc<dyn DurableStorage>,
    held: Mutex<Held>,
    write_lock: Mutex<()>,
    listeners: Mutex<Vec<(ListenerId, TokenListener)>>,
    next_listener: AtomicU64,
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let held = lock(&self.held);
        f.debug_struct("TokenStore")
            .field("has_token", &held.token.is_some())
            .field("user", &held.user.as_ref().map(|u| &u.id))
            .finish()
    }
}

impl TokenStore {
    /// Create an empty store over the given storage backend.
    ///
    /// Nothing is read until [`TokenStore::load`] is called.
    pub fn new(storage: Arc<dyn DurableStorage>) -> Self {
        Self {
            storage,
            held: Mutex::new(Held::default()),
            write_lock: Mutex::new(()),
            listeners: Mutex::new(Vec::new()),
            next_listener: AtomicU64::new(1),
        }
    }

    /// Read the persisted slots into memory and return the token, if any.
    ///
    /// An undecodable profile slot is discarded rather than failing start-up.
    pub fn load(&self) -> AppResult<Option<String>> {
        let _write = lock(&self.write_lock);

        let token = self.storage.read(TOKEN_SLOT)?;
        let user = match self.storage.read(USER_SLOT)? {
            Some(raw) => match serde_json::from_str::<UserProfile>(&raw) {
                Ok(user) => Some(user),
                Err(e) => {
                    warn!(error = %e, "Discarding undecodable persisted user profile");
                    self.storage.remove(USER_SLOT)?;
                    None
                }
            },
            None => None,
        };

        let mut held = lock(&self.held);
        held.token = token.clone();
        held.user = user;

        debug!(has_token = token.is_some(), "Token store loaded");
        Ok(token)
    }

    /// Returns the current token.
    pub fn get(&self) -> Option<String> {
        lock(&self.held).token.clone()
    }

    /// Returns the current user profile.
    pub fn user(&self) -> Option<UserProfile> {
        lock(&self.held).user.clone()
    }

    /// Returns token and user read under one lock.
    pub fn snapshot(&self) -> (Option<String>, Option<UserProfile>) {
        let held = lock(&self.held);
        (held.token.clone(), held.user.clone())
    }

    /// Replace the token, keeping the user.
    pub fn set(&self, token: &str) -> AppResult<()> {
        let _write = lock(&self.write_lock);

        let persisted = self.storage.write(TOKEN_SLOT, token);
        if let Err(e) = &persisted {
            warn!(error = %e, "Failed to persist token");
        }

        let change = {
            let mut held = lock(&self.held);
            let previous = held.token.replace(token.to_string());
            if previous.is_some() {
                TokenChange::Rotated {
                    token: token.to_string(),
                }
            } else {
                TokenChange::Set {
                    token: token.to_string(),
                }
            }
        };

        self.notify(&change);
        persisted
    }

    /// Store token and user together.
    ///
    /// Both are always held together. Durable storage receives both or keeps
    /// its previous pair; a failed write is returned after notification.
    pub fn set_session(&self, token: &str, user: &UserProfile) -> AppResult<()> {
        let _write = lock(&self.write_lock);

        let persisted = self.persist_session(token, user);
        if let Err(e) = &persisted {
            warn!(error = %e, "Failed to persist session");
        }

        {
            let mut held = lock(&self.held);
            held.token = Some(token.to_string());
            held.user = Some(user.clone());
        }

        self.notify(&TokenChange::Set {
            token: token.to_string(),
        });
        persisted
    }

    fn persist_session(&self, token: &str, user: &UserProfile) -> AppResult<()> {
        let user_json = serde_json::to_string(user)?;
        self.storage.write(USER_SLOT, &user_json)?;
        if let Err(e) = self.storage.write(TOKEN_SLOT, token) {
            let previous_user = lock(&self.held).user.clone();
            let rollback = match previous_user {
                Some(prev) => serde_json::to_string(&prev)
                    .map_err(Into::into)
                    .and_then(|json| self.storage.write(USER_SLOT, &json)),
                None => self.storage.remove(USER_SLOT),
            };
            if let Err(rb) = rollback {
                warn!(error = %rb, "Failed to roll back user slot");
            }
            return Err(e);
        }
        Ok(())
    }

    /// Remove token and user.
    ///
    /// The in-memory copy is always cleared, even if durable storage fails;
    /// the storage error is returned after subscribers were notified.
    pub fn clear(&self) -> AppResult<()> {
        let _write = lock(&self.write_lock);

        let token_result = self.storage.remove(TOKEN_SLOT);
        let user_result = self.storage.remove(USER_SLOT);

        let had_anything = {
            let mut held = lock(&self.held);
            let had = held.token.is_some() || held.user.is_some();
            held.token = None;
            held.user = None;
            had
        };

        if had_anything {
            self.notify(&TokenChange::Cleared);
        }

        token_result.and(user_result)
    }

    /// Register a change listener.
    pub fn subscribe(&self, listener: impl Fn(&TokenChange) + Send + Sync + 'static) -> ListenerId {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));
        lock(&self.listeners).push((id, Arc::new(listener)));
        id
    }

    /// Remove a change listener. Returns `false` if it was not registered.
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let mut listeners = lock(&self.listeners);
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() < before
    }

    fn notify(&self, change: &TokenChange) {
        let listeners: Vec<TokenListener> = lock(&self.listeners)
            .iter()
            .map(|(_, l)| Arc::clone(l))
            .collect();
        for listener in listeners {
            listener(change);
        }
    }
}

impl TokenSource for TokenStore {
    fn current_token(&self) -> Option<String> {
        self.get()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
