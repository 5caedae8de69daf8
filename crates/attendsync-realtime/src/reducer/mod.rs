//! Deterministic merge of event streams into view-local collections.

pub mod collection;
pub mod entity;
pub mod ordering;

pub use collection::{Applied, EntityCollection, Skip, apply_event};
pub use entity::{AttendanceRecord, Entity, ID_FIELD, Record, merge_serde};
pub use ordering::{Comparator, OrderingPolicy};
