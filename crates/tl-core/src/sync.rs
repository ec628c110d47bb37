//! Keeps the timeline index in step with source-record lifecycle events.
//!
//! The [`Synchronizer`] is the only writer of timeline items. It is
//! subscribed to the record store as a [`LifecycleListener`] and also
//! exposes backfill through [`Synchronizer::resync_type`].

use std::cell::RefCell;
use std::collections::HashSet;
use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, trace, warn};

use crate::index::{TimelineIndex, TimelineItem};
use crate::qualify::{Qualification, QualifyError, evaluate};
use crate::record::Record;
use crate::registry::{FollowedType, Registry};
use crate::store::{LifecycleListener, RecordStore, StoreError};
use crate::types::{GenericRef, RecordId, TypeName};

#[derive(Debug, Error)]
pub enum SyncError {
    #[error(transparent)]
    Qualify(#[from] QualifyError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("type {0} is not followed")]
    NotFollowed(TypeName),
}

/// What a synchronize or delete did to the index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The record's type is not followed.
    Ignored,
    /// A nested event raised while auto-saving the same record.
    Suppressed,
    Upserted(TimelineItem),
    /// The record no longer qualifies, or was deleted; its item was removed.
    Removed,
    /// The record does not qualify and had no item.
    Absent,
}

/// Counts from a backfill run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResyncStats {
    pub scanned: usize,
    pub upserted: usize,
    pub removed: usize,
}

impl std::ops::AddAssign for ResyncStats {
    fn add_assign(&mut self, other: Self) {
        self.scanned += other.scanned;
        self.upserted += other.upserted;
        self.removed += other.removed;
    }
}

type GuardKey = (TypeName, Option<RecordId>);

thread_local! {
    static SAVING: RefCell<HashSet<GuardKey>> = RefCell::new(HashSet::new());
}

/// Marks a record as being saved by the synchronizer on this thread.
///
/// Lifecycle events for the record raised while the guard is held are
/// suppressed. The mark is cleared on drop, including on unwind.
struct SaveGuard {
    key: GuardKey,
}

impl SaveGuard {
    fn enter(type_name: &TypeName, id: Option<RecordId>) -> Self {
        let key = (type_name.clone(), id);
        SAVING.with(|saving| saving.borrow_mut().insert(key.clone()));
        Self { key }
    }

    /// Whether an event for this record was raised by our own save.
    fn is_active(type_name: &TypeName, id: Option<RecordId>) -> bool {
        SAVING.with(|saving| {
            let saving = saving.borrow();
            saving.contains(&(type_name.clone(), id))
                || (id.is_some() && saving.contains(&(type_name.clone(), None)))
        })
    }
}

impl Drop for SaveGuard {
    fn drop(&mut self) {
        SAVING.with(|saving| saving.borrow_mut().remove(&self.key));
    }
}

/// Maintains timeline items for followed types.
pub struct Synchronizer<S, I> {
    registry: Arc<Registry>,
    store: Arc<S>,
    index: Arc<I>,
    locks: DashMap<GenericRef, Arc<Mutex<()>>>,
}

impl<S, I> Synchronizer<S, I>
where
    S: RecordStore,
    I: TimelineIndex,
{
    pub fn new(registry: Arc<Registry>, store: Arc<S>, index: Arc<I>) -> Self {
        Self {
            registry,
            store,
            index,
            locks: DashMap::new(),
        }
    }

    pub const fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    /// Brings the index in line with a record's current state.
    ///
    /// An unsaved record of a followed type is saved first so that it has
    /// an id; the event that save raises is suppressed.
    pub fn synchronize(&self, record: &mut Record) -> Result<SyncOutcome, SyncError> {
        let Some(followed) = self.registry.get(&record.type_name) else {
            return Ok(SyncOutcome::Ignored);
        };
        if SaveGuard::is_active(&record.type_name, record.id) {
            trace!(type_name = %record.type_name, id = ?record.id, "suppressing nested save event");
            return Ok(SyncOutcome::Suppressed);
        }

        if record.id.is_none() {
            let guard = SaveGuard::enter(&record.type_name, None);
            let id = self.store.save(record)?;
            drop(guard);
            record.id = Some(id);
            debug!(type_name = %record.type_name, %id, "saved unpersisted record before synchronizing");
        }

        self.synchronize_followed(followed, record)
    }

    /// Synchronizes a record that already has an id.
    pub fn synchronize_persisted(&self, record: &Record) -> Result<SyncOutcome, SyncError> {
        let Some(followed) = self.registry.get(&record.type_name) else {
            return Ok(SyncOutcome::Ignored);
        };
        if SaveGuard::is_active(&record.type_name, record.id) {
            trace!(type_name = %record.type_name, id = ?record.id, "suppressing nested save event");
            return Ok(SyncOutcome::Suppressed);
        }
        self.synchronize_followed(followed, record)
    }

    fn synchronize_followed(
        &self,
        followed: &FollowedType,
        record: &Record,
    ) -> Result<SyncOutcome, SyncError> {
        let Some(source) = record.generic_ref() else {
            return Ok(SyncOutcome::Absent);
        };

        self.with_key(&source, || -> Result<SyncOutcome, SyncError> {
            let qualification = match evaluate(record, followed, self.store.as_ref()) {
                Ok(qualification) => qualification,
                Err(err @ (QualifyError::NotATimestamp(_) | QualifyError::NotAUser { .. })) => {
                    // The item must not outlive the values it was built from.
                    let removed = self.index.delete_by(&source)?;
                    warn!(%source, error = %err, removed, "record holds a mismatched value");
                    return Err(err.into());
                }
                Err(err) => return Err(err.into()),
            };
            match qualification {
                Qualification::Qualified { user, timestamp } => {
                    let item = self.index.upsert(&user, &source, timestamp)?;
                    debug!(%source, %user, %timestamp, item = item.id, "timeline item upserted");
                    Ok(SyncOutcome::Upserted(item))
                }
                Qualification::Disqualified(reason) => {
                    let removed = self.index.delete_by(&source)?;
                    debug!(%source, reason = reason.as_str(), removed, "record does not qualify");
                    Ok(if removed {
                        SyncOutcome::Removed
                    } else {
                        SyncOutcome::Absent
                    })
                }
            }
        })
    }

    /// Removes the timeline item of a deleted record. Absence is not an error.
    pub fn remove_orphan(&self, source: &GenericRef) -> Result<SyncOutcome, SyncError> {
        if !self.registry.is_followed(&source.type_name) {
            return Ok(SyncOutcome::Ignored);
        }
        let removed = self.with_key(source, || self.index.delete_by(source))?;
        debug!(%source, removed, "source record deleted");
        Ok(if removed {
            SyncOutcome::Removed
        } else {
            SyncOutcome::Absent
        })
    }

    /// Re-synchronizes every stored record of a followed type, then drops
    /// items whose source record no longer exists.
    pub fn resync_type(&self, type_name: &TypeName) -> Result<ResyncStats, SyncError> {
        if !self.registry.is_followed(type_name) {
            return Err(SyncError::NotFollowed(type_name.clone()));
        }

        let ids = self.store.list_ids(type_name)?;
        let outcomes = ids
            .par_iter()
            .map(|id| -> Result<SyncOutcome, SyncError> {
                let source = GenericRef::new(type_name.clone(), *id);
                match self.store.fetch(&source)? {
                    Some(record) => self.synchronize_persisted(&record),
                    None => Ok(SyncOutcome::Absent),
                }
            })
            .collect::<Result<Vec<_>, SyncError>>()?;

        let mut stats = ResyncStats {
            scanned: ids.len(),
            ..ResyncStats::default()
        };
        for outcome in &outcomes {
            match outcome {
                SyncOutcome::Upserted(_) => stats.upserted += 1,
                SyncOutcome::Removed => stats.removed += 1,
                _ => {}
            }
        }

        for source in self.index.sources(type_name)? {
            let removed = self.with_key(&source, || -> Result<bool, SyncError> {
                if self.store.fetch(&source)?.is_some() {
                    return Ok(false);
                }
                Ok(self.index.delete_by(&source)?)
            })?;
            if removed {
                debug!(%source, "orphaned item removed");
                stats.removed += 1;
            }
        }

        debug!(
            %type_name,
            scanned = stats.scanned,
            upserted = stats.upserted,
            removed = stats.removed,
            "resync complete"
        );
        Ok(stats)
    }

    /// Resyncs every followed type, in name order.
    pub fn resync_all(&self) -> Result<Vec<(TypeName, ResyncStats)>, SyncError> {
        self.registry
            .type_names()
            .map(|type_name| -> Result<_, SyncError> {
                Ok((type_name.clone(), self.resync_type(type_name)?))
            })
            .collect()
    }

    /// Runs `f` while holding the lock for one record identity.
    fn with_key<T>(&self, source: &GenericRef, f: impl FnOnce() -> T) -> T {
        // Clone the Arc so the map shard is not held while waiting.
        let lock = self.locks.entry(source.clone()).or_default().clone();
        let result = {
            let _held = lock.lock();
            f()
        };
        drop(lock);
        self.locks
            .remove_if(source, |_, lock| Arc::strong_count(lock) == 1);
        result
    }
}

impl<S, I> LifecycleListener for Synchronizer<S, I>
where
    S: RecordStore,
    I: TimelineIndex,
{
    fn on_save(&self, record: &Record, created: bool) -> Result<(), SyncError> {
        trace!(type_name = %record.type_name, id = ?record.id, created, "save event");
        self.synchronize_persisted(record).map(drop)
    }

    fn on_delete(&self, record: &Record) -> Result<(), SyncError> {
        match record.generic_ref() {
            Some(source) => self.remove_orphan(&source).map(drop),
            None => Ok(()),
        }
    }
}

impl<S, I> std::fmt::Debug for Synchronizer<S, I> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Synchronizer")
            .field("followed", &self.registry.len())
            .field("locked_keys", &self.locks.len())
            .finish_non_exhaustive()
    }
}
