//! Core domain logic for generic-entity timelines.
//!
//! This crate contains the fundamental types and logic for:
//! - Registry: which record types are followed, and how
//! - Qualification: whether a record currently belongs in timelines
//! - Synchronization: keeping timeline items consistent with source records
//! - Queries: latest entries globally, per user and per type

pub mod config;
pub mod entity;
pub mod index;
pub mod path;
pub mod qualify;
pub mod query;
pub mod record;
pub mod registry;
pub mod store;
pub mod sync;
pub mod types;

#[cfg(test)]
mod testing;

pub use config::{ConfigError, FollowConfig, FollowSpec};
pub use entity::{EntityType, FieldKind, Linkable, SetFilter, UrlTemplate};
pub use index::{ItemFilter, NEVER_UPDATED, TimelineIndex, TimelineItem, is_never};
pub use path::FieldPath;
pub use qualify::{Disqualified, Qualification, QualifyError};
pub use query::{AdminRow, DEFAULT_FEED_LIMIT, Timeline, TimelineEntry};
pub use record::{FieldValue, Fields, Record};
pub use registry::{Catalog, FollowedType, Registry, ResolutionError};
pub use store::{LifecycleListener, Listeners, RecordStore, StoreError};
pub use sync::{ResyncStats, SyncError, SyncOutcome, Synchronizer};
pub use types::{GenericRef, RecordId, TypeName, UserId, ValidationError};
