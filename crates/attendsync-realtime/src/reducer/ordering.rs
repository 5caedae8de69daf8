//! Ordering policies for entity collections.

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

/// Comparator used by [`OrderingPolicy::Sorted`].
pub type Comparator<T> = Arc<dyn Fn(&T, &T) -> Ordering + Send + Sync>;

/// How a collection orders its entries and how many it keeps.
///
/// With a cap, the retained entries are always the `cap` most recently
/// inserted ones, whatever the display order.
pub enum OrderingPolicy<T> {
    /// Append new entities at the end.
    Insertion {
        /// Maximum number of entries.
        cap: Option<usize>,
    },
    /// Prepend new entities (live feed).
    NewestFirst {
        /// Maximum number of entries.
        cap: Option<usize>,
    },
    /// Keep entries sorted by `compare`, reversed when `descending`.
    Sorted {
        /// Sort key comparison.
        compare: Comparator<T>,
        /// Reverse the comparator.
        descending: bool,
        /// Maximum number of entries.
        cap: Option<usize>,
    },
}

impl<T> OrderingPolicy<T> {
    /// Prepend and keep the `cap` most recent entries.
    pub fn newest_first(cap: usize) -> Self {
        OrderingPolicy::NewestFirst { cap: Some(cap) }
    }

    /// Sort by a key extracted from each entity.
    pub fn sorted_by_key<K, F>(key: F, descending: bool) -> Self
    where
        K: Ord,
        F: Fn(&T) -> K + Send + Sync + 'static,
    {
        OrderingPolicy::Sorted {
            compare: Arc::new(move |a, b| key(a).cmp(&key(b))),
            descending,
            cap: None,
        }
    }

    /// Set the cap.
    pub fn with_cap(self, cap: usize) -> Self {
        match self {
            OrderingPolicy::Insertion { .. } => OrderingPolicy::Insertion { cap: Some(cap) },
            OrderingPolicy::NewestFirst { .. } => OrderingPolicy::NewestFirst { cap: Some(cap) },
            OrderingPolicy::Sorted {
                compare, descending, ..
            } => OrderingPolicy::Sorted {
                compare,
                descending,
                cap: Some(cap),
            },
        }
    }

    /// Returns the cap, if any.
    pub fn cap(&self) -> Option<usize> {
        match self {
            OrderingPolicy::Insertion { cap }
            | OrderingPolicy::NewestFirst { cap }
            | OrderingPolicy::Sorted { cap, .. } => *cap,
        }
    }

    pub(crate) fn compare(&self, a: &T, b: &T) -> Option<Ordering> {
        match self {
            OrderingPolicy::Sorted {
                compare,
                descending,
                ..
            } => {
                let ord = compare(a, b);
                Some(if *descending { ord.reverse() } else { ord })
            }
            _ => None,
        }
    }
}

impl<T> Default for OrderingPolicy<T> {
    fn default() -> Self {
        OrderingPolicy::Insertion { cap: None }
    }
}

impl<T> Clone for OrderingPolicy<T> {
    fn clone(&self) -> Self {
        match self {
            OrderingPolicy::Insertion { cap } => OrderingPolicy::Insertion { cap: *cap },
            OrderingPolicy::NewestFirst { cap } => OrderingPolicy::NewestFirst { cap: *cap },
            OrderingPolicy::Sorted {
                compare,
                descending,
                cap,
            } => OrderingPolicy::Sorted {
                compare: Arc::clone(compare),
                descending: *descending,
                cap: *cap,
            },
        }
    }
}

impl<T> fmt::Debug for OrderingPolicy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OrderingPolicy::Insertion { cap } => {
                f.debug_struct("Insertion").field("cap", cap).finish()
            }
            OrderingPolicy::NewestFirst { cap } => {
                f.debug_struct("NewestFirst").field("cap", cap).finish()
            }
            OrderingPolicy::Sorted {
                descending, cap, ..
            } => f
                .debug_struct("Sorted")
                .field("descending", descending)
                .field("cap", cap)
                .finish_non_exhaustive(),
        }
    }
}
