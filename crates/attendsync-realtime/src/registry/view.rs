//! Per-view channel registry.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard};

use dashmap::DashMap;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use attendsync_core::config::RealtimeConfig;
use attendsync_core::error::AppError;
use attendsync_core::events::Event;
use attendsync_core::result::AppResult;
use attendsync_core::traits::TokenSource;

use crate::channel::{AlertHandler, ChannelId, Feed, RealtimeChannel};
use crate::connection::{Connector, Jitter};
use crate::reducer::Entity;

use super::live::LiveCollection;

/// Owns every channel a dashboard view opened.
///
/// Channels live exactly as long as the view is mounted: [`unmount`]
/// (or dropping the registry) stops all of them before returning, and
/// snapshot loads that complete afterwards are discarded.
///
/// [`unmount`]: ChannelRegistry::unmount
pub struct ChannelRegistry {
    view: String,
    connector: Arc<dyn Connector>,
    tokens: Arc<dyn TokenSource>,
    config: RealtimeConfig,
    channels: DashMap<ChannelId, Arc<RealtimeChannel>>,
    /// Cleared by `unmount`; held while opening channels and applying snapshots.
    mounted: Mutex<bool>,
    cancel: CancellationToken,
    on_alert: Option<AlertHandler>,
    jitter: Option<Arc<dyn Jitter>>,
}

impl std::fmt::Debug for ChannelRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChannelRegistry")
            .field("view", &self.view)
            .field("channels", &self.channels.len())
            .field("mounted", &self.is_mounted())
            .finish_non_exhaustive()
    }
}

impl ChannelRegistry {
    /// Creates a mounted registry for `view`.
    pub fn new(
        view: impl Into<String>,
        connector: Arc<dyn Connector>,
        tokens: Arc<dyn TokenSource>,
        config: RealtimeConfig,
    ) -> Self {
        Self {
            view: view.into(),
            connector,
            tokens,
            config,
            channels: DashMap::new(),
            mounted: Mutex::new(true),
            cancel: CancellationToken::new(),
            on_alert: None,
            jitter: None,
        }
    }

    /// Route `AuthExpired` and `ReconnectExhausted` from every channel to `handler`.
    pub fn with_alert_handler(mut self, handler: AlertHandler) -> Self {
        self.on_alert = Some(handler);
        self
    }

    /// Override the jitter source of every channel opened from now on.
    pub fn with_jitter(mut self, jitter: Arc<dyn Jitter>) -> Self {
        self.jitter = Some(jitter);
        self
    }

    /// Name of the view.
    pub fn view(&self) -> &str {
        &self.view
    }

    /// Opens `feed` and folds its events into `live`.
    pub fn open_feed<T: Entity>(&self, feed: &Feed, live: &LiveCollection<T>) -> AppResult<ChannelId> {
        let live = live.clone();
        self.open_channel(feed, move |event| {
            live.apply(&event);
        })
    }

    /// Opens `feed` with a raw event handler.
    ///
    /// Fails with `Unauthenticated` when there is no session, and with a
    /// validation error once the view is unmounted.
    pub fn open_channel<F>(&self, feed: &Feed, on_event: F) -> AppResult<ChannelId>
    where
        F: Fn(Event) + Send + Sync + 'static,
    {
        let mut options = feed.options(&self.config)?;
        if let Some(jitter) = &self.jitter {
            options = options.with_jitter(Arc::clone(jitter));
        }

        let mounted = lock(&self.mounted);
        if !*mounted {
            return Err(AppError::validation(format!(
                "View '{}' is unmounted",
                self.view
            )));
        }

        let connector = Arc::clone(&self.connector);
        let channel = match &self.on_alert {
            Some(handler) => RealtimeChannel::with_alert_handler(connector, options, Arc::clone(handler)),
            None => RealtimeChannel::new(connector, options),
        };
        channel.start(Arc::clone(&self.tokens), on_event)?;

        let id = channel.id();
        self.channels.insert(id, Arc::new(channel));
        drop(mounted);

        info!(view = %self.view, %feed, channel_id = %id, "Feed opened");
        Ok(id)
    }

    /// Loads the initial contents of `live` from `fetch`.
    ///
    /// Events arriving meanwhile are buffered and replayed on top of the
    /// snapshot. Returns `Ok(false)` when the view unmounted before the
    /// snapshot arrived; the result is then discarded.
    pub async fn load_snapshot<T, Fut>(&self, live: &LiveCollection<T>, fetch: Fut) -> AppResult<bool>
    where
        T: Entity,
        Fut: Future<Output = AppResult<Vec<T>>>,
    {
        if !self.is_mounted() {
            return Ok(false);
        }
        live.begin_load();

        let result = tokio::select! {
            _ = self.cancel.cancelled() => None,
            result = fetch => Some(result),
        };

        let mounted = lock(&self.mounted);
        match result {
            Some(Ok(items)) if *mounted => {
                let count = items.len();
                live.finish_load(items);
                drop(mounted);
                debug!(view = %self.view, count, "Snapshot applied");
                Ok(true)
            }
            Some(Err(e)) => {
                live.abort_load();
                drop(mounted);
                warn!(view = %self.view, error = %e, "Snapshot load failed");
                Err(e)
            }
            _ => {
                live.abort_load();
                drop(mounted);
                debug!(view = %self.view, "Discarding snapshot for unmounted view");
                Ok(false)
            }
        }
    }

    /// Stops and forgets one channel. Returns `false` if it was unknown.
    pub fn close_channel(&self, id: ChannelId) -> bool {
        match self.channels.remove(&id) {
            Some((_, channel)) => {
                channel.stop();
                true
            }
            None => false,
        }
    }

    /// Returns a channel by ID.
    pub fn channel(&self, id: ChannelId) -> Option<Arc<RealtimeChannel>> {
        self.channels.get(&id).map(|c| Arc::clone(c.value()))
    }

    /// All open channels.
    pub fn channels(&self) -> Vec<Arc<RealtimeChannel>> {
        self.channels.iter().map(|c| Arc::clone(c.value())).collect()
    }

    /// Number of open channels.
    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Returns `true` until [`unmount`](Self::unmount) is called.
    pub fn is_mounted(&self) -> bool {
        *lock(&self.mounted)
    }

    /// Stops every channel and discards pending snapshot loads. Idempotent.
    ///
    /// When this returns no event callback of this view runs anymore.
    pub fn unmount(&self) {
        {
            let mut mounted = lock(&self.mounted);
            if !*mounted {
                return;
            }
            *mounted = false;
        }
        self.cancel.cancel();

        let ids: Vec<ChannelId> = self.channels.iter().map(|c| *c.key()).collect();
        let mut closed = 0usize;
        for id in ids {
            if let Some((_, channel)) = self.channels.remove(&id) {
                channel.stop();
                closed += 1;
            }
        }
        info!(view = %self.view, closed, "View unmounted");
    }
}

impl Drop for ChannelRegistry {
    fn drop(&mut self) {
        self.unmount();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}
