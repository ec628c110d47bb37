//! Storage seams: the source-record store and its lifecycle events.
//!
//! The engine never talks to a database directly. Hosts provide a
//! [`RecordStore`] for source records and a
//! [`TimelineIndex`](crate::index::TimelineIndex) for derived items;
//! `tl-db` implements both on SQLite.

use std::error::Error as StdError;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;
use thiserror::Error;

use crate::entity::EntityType;
use crate::record::Record;
use crate::sync::SyncError;
use crate::types::{GenericRef, RecordId, TypeName};

/// Failure reported by a storage backend.
#[derive(Debug, Error)]
#[error("storage error: {source}")]
pub struct StoreError {
    #[source]
    source: Box<dyn StdError + Send + Sync>,
}

impl StoreError {
    pub fn new(source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        Self {
            source: source.into(),
        }
    }
}

/// Access to source records of every type.
pub trait RecordStore: Send + Sync {
    /// Loads a record, or `None` if it does not exist.
    fn fetch(&self, source: &GenericRef) -> Result<Option<Record>, StoreError>;

    /// Inserts or updates a record, assigning an id when it has none.
    ///
    /// Implementations fire lifecycle events after the write commits.
    fn save(&self, record: &mut Record) -> Result<RecordId, StoreError>;

    /// Deletes a record and returns what was removed.
    ///
    /// Implementations fire lifecycle events after the delete commits.
    fn delete(&self, source: &GenericRef) -> Result<Option<Record>, StoreError>;

    /// Ids of every stored record of a type, ascending.
    fn list_ids(&self, type_name: &TypeName) -> Result<Vec<RecordId>, StoreError>;

    /// Loads a record only if it is a member of the named qualifying set.
    fn find_in_set(
        &self,
        entity: &EntityType,
        set: &str,
        source: &GenericRef,
    ) -> Result<Option<Record>, StoreError> {
        let Some(filter) = entity.set_filter(set) else {
            return Ok(None);
        };
        Ok(self.fetch(source)?.filter(|record| filter.matches(record)))
    }
}

/// Receiver of post-commit lifecycle events.
pub trait LifecycleListener: Send + Sync {
    /// A record was created (`created = true`) or updated.
    fn on_save(&self, record: &Record, created: bool) -> Result<(), SyncError>;

    /// A record was deleted.
    fn on_delete(&self, record: &Record) -> Result<(), SyncError>;
}

/// Subscriber list that stores embed to fire lifecycle events.
///
/// Listeners are held weakly, so subscribing never keeps a listener
/// alive; dropped listeners are pruned on the next event.
#[derive(Default)]
pub struct Listeners {
    subscribers: RwLock<Vec<Weak<dyn LifecycleListener>>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Weak<dyn LifecycleListener>) {
        self.subscribers.write().push(listener);
    }

    pub fn len(&self) -> usize {
        self.subscribers
            .read()
            .iter()
            .filter(|listener| listener.strong_count() > 0)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn post_save(&self, record: &Record, created: bool) -> Result<(), SyncError> {
        for listener in self.live() {
            listener.on_save(record, created)?;
        }
        Ok(())
    }

    pub fn post_delete(&self, record: &Record) -> Result<(), SyncError> {
        for listener in self.live() {
            listener.on_delete(record)?;
        }
        Ok(())
    }

    /// Upgrades live listeners and drops dead ones. The lock is released
    /// before any listener runs, so listeners may subscribe or write.
    fn live(&self) -> Vec<Arc<dyn LifecycleListener>> {
        let mut subscribers = self.subscribers.write();
        subscribers.retain(|listener| listener.strong_count() > 0);
        subscribers.iter().filter_map(Weak::upgrade).collect()
    }
}

impl std::fmt::Debug for Listeners {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("subscribers", &self.len())
            .finish()
    }
}
