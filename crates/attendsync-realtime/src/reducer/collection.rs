//! Keyed, ordered, optionally capped entity collection and the merge reducer.

use std::cmp::Ordering;

use tracing::warn;

use attendsync_core::events::{Event, Operation};

use super::entity::{Entity, ID_FIELD};
use super::ordering::OrderingPolicy;

/// What an event did to a collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Applied {
    /// A new entity was added.
    Inserted,
    /// A `create` for a known ID replaced the entity.
    Replaced,
    /// An `update` merged into the entity.
    Updated,
    /// The entity was removed.
    Removed,
    /// Held back until a pending snapshot load finishes.
    Buffered,
    /// Nothing changed.
    Unchanged(Skip),
}

impl Applied {
    /// Returns `true` if the collection changed.
    pub fn changed(&self) -> bool {
        !matches!(self, Applied::Unchanged(_) | Applied::Buffered)
    }
}

/// Why an event left the collection unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Skip {
    /// The event is for another resource.
    OtherResource,
    /// The payload has no usable ID.
    MissingId,
    /// `update`/`delete` for an ID that is not present.
    UnknownId,
    /// The payload does not fit the entity type.
    Undecodable(String),
}

#[derive(Debug, Clone, PartialEq)]
struct Entry<T> {
    seq: u64,
    id: String,
    value: T,
}

/// View-local collection of entities of one resource.
///
/// IDs are unique. Entries are kept in the order the policy declares, and
/// when the policy has a cap only the most recently inserted entries stay.
#[derive(Debug, Clone)]
pub struct EntityCollection<T: Entity> {
    resource: String,
    policy: OrderingPolicy<T>,
    entries: Vec<Entry<T>>,
    next_seq: u64,
}

impl<T: Entity> EntityCollection<T> {
    /// Creates an empty collection for `resource`.
    pub fn new(resource: impl Into<String>, policy: OrderingPolicy<T>) -> Self {
        Self {
            resource: resource.into(),
            policy,
            entries: Vec::new(),
            next_seq: 0,
        }
    }

    /// Resource this collection tracks.
    pub fn resource(&self) -> &str {
        &self.resource
    }

    /// The ordering policy.
    pub fn policy(&self) -> &OrderingPolicy<T> {
        &self.policy
    }

    /// Number of entities.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns `true` if the collection is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Looks up an entity by ID.
    pub fn get(&self, id: &str) -> Option<&T> {
        self.position(id).map(|i| &self.entries[i].value)
    }

    /// Returns `true` if an entity with `id` is present.
    pub fn contains(&self, id: &str) -> bool {
        self.position(id).is_some()
    }

    /// Entities in policy order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.entries.iter().map(|e| &e.value)
    }

    /// IDs in policy order.
    pub fn ids(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    /// Cloned entities in policy order.
    pub fn items(&self) -> Vec<T> {
        self.iter().cloned().collect()
    }

    /// Replace the contents with a REST snapshot.
    ///
    /// For `NewestFirst` the snapshot is taken to be newest first already.
    pub fn load(&mut self, items: Vec<T>) {
        self.entries.clear();
        let newest_first = matches!(self.policy, OrderingPolicy::NewestFirst { .. });
        let ordered: Box<dyn Iterator<Item = T>> = if newest_first {
            Box::new(items.into_iter().rev())
        } else {
            Box::new(items.into_iter())
        };
        for item in ordered {
            let id = item.entity_id();
            self.upsert(id, item);
        }
    }

    /// Fold one event into the collection.
    pub fn apply(&mut self, event: &Event) -> Applied {
        if event.resource != self.resource {
            return Applied::Unchanged(Skip::OtherResource);
        }
        let Some(id) = event.entity_id(ID_FIELD) else {
            return Applied::Unchanged(Skip::MissingId);
        };

        match event.operation {
            Operation::Create => match T::from_payload(&event.payload) {
                Ok(value) => self.upsert(id, value),
                Err(e) => {
                    warn!(resource = %self.resource, id = %id, error = %e, "Create payload does not fit entity");
                    Applied::Unchanged(Skip::Undecodable(e.message))
                }
            },
            Operation::Update => {
                let Some(pos) = self.position(&id) else {
                    return Applied::Unchanged(Skip::UnknownId);
                };
                let mut value = self.entries[pos].value.clone();
                if let Err(e) = value.merge(&event.payload) {
                    warn!(resource = %self.resource, id = %id, error = %e, "Update payload does not fit entity");
                    return Applied::Unchanged(Skip::Undecodable(e.message));
                }
                self.entries[pos].value = value;
                self.reposition(pos);
                Applied::Updated
            }
            Operation::Delete => match self.position(&id) {
                Some(pos) => {
                    self.entries.remove(pos);
                    Applied::Removed
                }
                None => Applied::Unchanged(Skip::UnknownId),
            },
        }
    }

    fn upsert(&mut self, id: String, value: T) -> Applied {
        if let Some(pos) = self.position(&id) {
            self.entries[pos].value = value;
            self.reposition(pos);
            return Applied::Replaced;
        }

        let entry = Entry {
            seq: self.next_seq,
            id,
            value,
        };
        self.next_seq += 1;

        match &self.policy {
            OrderingPolicy::Insertion { .. } => self.entries.push(entry),
            OrderingPolicy::NewestFirst { .. } => self.entries.insert(0, entry),
            OrderingPolicy::Sorted { .. } => {
                let at = self.sorted_slot(&entry.value);
                self.entries.insert(at, entry);
            }
        }

        self.enforce_cap();
        Applied::Inserted
    }

    /// Move a changed entry to its sorted slot. Other policies keep position.
    fn reposition(&mut self, pos: usize) {
        if !matches!(self.policy, OrderingPolicy::Sorted { .. }) {
            return;
        }
        let entry = self.entries.remove(pos);
        let at = self.sorted_slot(&entry.value);
        self.entries.insert(at, entry);
    }

    /// Index after every entry that does not sort after `value`.
    fn sorted_slot(&self, value: &T) -> usize {
        self.entries.partition_point(|e| {
            self.policy.compare(&e.value, value) != Some(Ordering::Greater)
        })
    }

    fn enforce_cap(&mut self) {
        let Some(cap) = self.policy.cap() else {
            return;
        };
        while self.entries.len() > cap {
            let oldest = self
                .entries
                .iter()
                .enumerate()
                .min_by_key(|(_, e)| e.seq)
                .map(|(i, _)| i);
            match oldest {
                Some(i) => {
                    self.entries.remove(i);
                }
                None => break,
            }
        }
    }

    fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|e| e.id == id)
    }
}

impl<T: Entity + PartialEq> PartialEq for EntityCollection<T> {
    fn eq(&self, other: &Self) -> bool {
        self.resource == other.resource && self.entries == other.entries
    }
}

/// Pure reducer: returns `collection` with `event` applied.
pub fn apply_event<T: Entity>(collection: &EntityCollection<T>, event: &Event) -> EntityCollection<T> {
    let mut next = collection.clone();
    next.apply(event);
    next
}
