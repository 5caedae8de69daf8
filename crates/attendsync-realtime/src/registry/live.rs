//! Shared, observable collection fed by a channel.

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::watch;
use tracing::trace;

use attendsync_core::events::Event;

use crate::reducer::{Applied, Entity, EntityCollection};

#[derive(Debug)]
struct LiveState<T: Entity> {
    collection: EntityCollection<T>,
    /// Events held back while a snapshot load is in flight.
    buffered: Option<Vec<Event>>,
}

/// An [`EntityCollection`] shared between a view and its channels.
///
/// Every change bumps a version counter that views can watch.
#[derive(Debug)]
pub struct LiveCollection<T: Entity> {
    state: Arc<Mutex<LiveState<T>>>,
    version: Arc<watch::Sender<u64>>,
}

impl<T: Entity> Clone for LiveCollection<T> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            version: Arc::clone(&self.version),
        }
    }
}

impl<T: Entity> LiveCollection<T> {
    /// Wraps an (empty or pre-filled) collection.
    pub fn new(collection: EntityCollection<T>) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            state: Arc::new(Mutex::new(LiveState {
                collection,
                buffered: None,
            })),
            version: Arc::new(version),
        }
    }

    /// Cloned copy of the current collection.
    pub fn snapshot(&self) -> EntityCollection<T> {
        self.lock().collection.clone()
    }

    /// Run `f` against the current collection without cloning it.
    pub fn with<R>(&self, f: impl FnOnce(&EntityCollection<T>) -> R) -> R {
        f(&self.lock().collection)
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.lock().collection.len()
    }

    /// Returns `true` if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.lock().collection.is_empty()
    }

    /// Current version; bumped on every change.
    pub fn version(&self) -> u64 {
        *self.version.borrow()
    }

    /// Subscribe to version bumps.
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    /// Returns `true` while a snapshot load is buffering events.
    pub fn is_loading(&self) -> bool {
        self.lock().buffered.is_some()
    }

    /// Apply an event, or buffer it while a snapshot is loading.
    pub fn apply(&self, event: &Event) -> Applied {
        let mut state = self.lock();
        if let Some(buffer) = state.buffered.as_mut() {
            buffer.push(event.clone());
            return Applied::Buffered;
        }
        let applied = state.collection.apply(event);
        drop(state);

        trace!(resource = %event.resource, op = %event.operation, ?applied, "Event applied");
        if applied.changed() {
            self.bump();
        }
        applied
    }

    pub(crate) fn begin_load(&self) {
        let mut state = self.lock();
        if state.buffered.is_none() {
            state.buffered = Some(Vec::new());
        }
    }

    /// Replace the contents with `items`, then replay buffered events on top.
    pub(crate) fn finish_load(&self, items: Vec<T>) {
        let mut state = self.lock();
        state.collection.load(items);
        let buffered = state.buffered.take().unwrap_or_default();
        for event in &buffered {
            state.collection.apply(event);
        }
        drop(state);
        self.bump();
    }

    /// Leave the contents alone and replay buffered events.
    pub(crate) fn abort_load(&self) {
        let mut state = self.lock();
        let buffered = state.buffered.take().unwrap_or_default();
        let mut changed = false;
        for event in &buffered {
            changed |= state.collection.apply(event).changed();
        }
        drop(state);
        if changed {
            self.bump();
        }
    }

    fn bump(&self) {
        self.version.send_modify(|v| *v += 1);
    }

    fn lock(&self) -> MutexGuard<'_, LiveState<T>> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}
