//! In-memory store and index used by unit tests.

use std::collections::BTreeMap;
use std::sync::Weak;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::index::{ItemFilter, NEVER_UPDATED, TimelineIndex, TimelineItem};
use crate::record::Record;
use crate::store::{LifecycleListener, Listeners, RecordStore, StoreError};
use crate::types::{GenericRef, RecordId, TypeName, UserId};

#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<BTreeMap<GenericRef, Record>>,
    listeners: Listeners,
}

impl MemoryStore {
    pub fn subscribe(&self, listener: Weak<dyn LifecycleListener>) {
        self.listeners.subscribe(listener);
    }

    /// Writes a record without firing events.
    pub fn put_quietly(&self, record: Record) {
        let source = record.generic_ref().unwrap();
        self.records.lock().insert(source, record);
    }

    pub fn remove_quietly(&self, source: &GenericRef) {
        self.records.lock().remove(source);
    }
}

impl RecordStore for MemoryStore {
    fn fetch(&self, source: &GenericRef) -> Result<Option<Record>, StoreError> {
        Ok(self.records.lock().get(source).cloned())
    }

    fn save(&self, record: &mut Record) -> Result<RecordId, StoreError> {
        let created = {
            let mut records = self.records.lock();
            let created = record.id.is_none();
            if created {
                let next = records
                    .keys()
                    .filter(|source| source.type_name == record.type_name)
                    .map(|source| source.id.get())
                    .max()
                    .unwrap_or(0)
                    + 1;
                record.id = Some(RecordId::new(next).map_err(StoreError::new)?);
            }
            let source = record.generic_ref().ok_or_else(|| StoreError::new("no id"))?;
            records.insert(source, record.clone());
            created
        };
        self.listeners
            .post_save(record, created)
            .map_err(StoreError::new)?;
        record.id.ok_or_else(|| StoreError::new("no id"))
    }

    fn delete(&self, source: &GenericRef) -> Result<Option<Record>, StoreError> {
        let removed = self.records.lock().remove(source);
        if let Some(record) = &removed {
            self.listeners.post_delete(record).map_err(StoreError::new)?;
        }
        Ok(removed)
    }

    fn list_ids(&self, type_name: &TypeName) -> Result<Vec<RecordId>, StoreError> {
        Ok(self
            .records
            .lock()
            .keys()
            .filter(|source| &source.type_name == type_name)
            .map(|source| source.id)
            .collect())
    }
}

#[derive(Debug, Default)]
pub struct MemoryIndex {
    items: Mutex<Vec<TimelineItem>>,
}

impl MemoryIndex {
    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    fn sorted(mut items: Vec<TimelineItem>, limit: usize) -> Vec<TimelineItem> {
        items.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.id.cmp(&a.id)));
        items.truncate(limit);
        items
    }

    fn filtered(&self, keep: impl Fn(&TimelineItem) -> bool) -> Vec<TimelineItem> {
        self.items.lock().iter().filter(|item| keep(item)).cloned().collect()
    }
}

impl TimelineIndex for MemoryIndex {
    fn upsert(
        &self,
        user: &UserId,
        source: &GenericRef,
        timestamp: DateTime<Utc>,
    ) -> Result<TimelineItem, StoreError> {
        let mut items = self.items.lock();
        if let Some(item) = items.iter_mut().find(|item| &item.source == source) {
            item.user = user.clone();
            item.timestamp = timestamp;
            return Ok(item.clone());
        }
        let id = items.iter().map(|item| item.id).max().unwrap_or(0) + 1;
        let item = TimelineItem {
            id,
            user: user.clone(),
            source: source.clone(),
            timestamp,
        };
        items.push(item.clone());
        Ok(item)
    }

    fn get(&self, source: &GenericRef) -> Result<Option<TimelineItem>, StoreError> {
        Ok(self.filtered(|item| &item.source == source).pop())
    }

    fn delete_by(&self, source: &GenericRef) -> Result<bool, StoreError> {
        let mut items = self.items.lock();
        let before = items.len();
        items.retain(|item| &item.source != source);
        Ok(items.len() != before)
    }

    fn query_by_user(&self, user: &UserId, limit: usize) -> Result<Vec<TimelineItem>, StoreError> {
        Ok(Self::sorted(self.filtered(|item| &item.user == user), limit))
    }

    fn query_global(&self, limit: usize) -> Result<Vec<TimelineItem>, StoreError> {
        Ok(Self::sorted(self.filtered(|_| true), limit))
    }

    fn query_by_type(
        &self,
        type_name: &TypeName,
        limit: usize,
    ) -> Result<Vec<TimelineItem>, StoreError> {
        Ok(Self::sorted(
            self.filtered(|item| &item.source.type_name == type_name),
            limit,
        ))
    }

    fn last_update_for(
        &self,
        type_name: &TypeName,
        filter: &ItemFilter,
    ) -> Result<DateTime<Utc>, StoreError> {
        Ok(self
            .filtered(|item| {
                &item.source.type_name == type_name
                    && filter.user.as_ref().is_none_or(|user| &item.user == user)
                    && filter.before.is_none_or(|before| item.timestamp < before)
                    && filter.after.is_none_or(|after| item.timestamp >= after)
            })
            .into_iter()
            .map(|item| item.timestamp)
            .max()
            .unwrap_or(NEVER_UPDATED))
    }

    fn sources(&self, type_name: &TypeName) -> Result<Vec<GenericRef>, StoreError> {
        Ok(self
            .filtered(|item| &item.source.type_name == type_name)
            .into_iter()
            .map(|item| item.source)
            .collect())
    }
}
