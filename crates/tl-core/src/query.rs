//! Read side: timelines with their source records attached.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::index::{ItemFilter, TimelineIndex, TimelineItem};
use crate::record::Record;
use crate::registry::Registry;
use crate::store::{RecordStore, StoreError};
use crate::types::{TypeName, UserId};

/// Number of entries shown in a feed when no limit is given.
pub const DEFAULT_FEED_LIMIT: usize = 15;

/// A timeline item with its source record materialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimelineEntry {
    pub item: TimelineItem,
    /// `None` when the source record no longer exists.
    pub record: Option<Record>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    pub label: String,
}

/// One line of the inspection listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AdminRow {
    pub label: String,
    pub user: UserId,
    pub type_name: TypeName,
    pub timestamp: DateTime<Utc>,
}

/// Read façade over the timeline index.
pub struct Timeline<S, I> {
    registry: Arc<Registry>,
    store: Arc<S>,
    index: Arc<I>,
}

impl<S, I> Timeline<S, I>
where
    S: RecordStore,
    I: TimelineIndex,
{
    pub const fn new(registry: Arc<Registry>, store: Arc<S>, index: Arc<I>) -> Self {
        Self {
            registry,
            store,
            index,
        }
    }

    /// Latest entries across all users.
    pub fn latest(&self, limit: usize) -> Result<Vec<TimelineEntry>, StoreError> {
        self.materialize(self.index.query_global(limit)?)
    }

    pub fn latest_for_user(
        &self,
        user: &UserId,
        limit: usize,
    ) -> Result<Vec<TimelineEntry>, StoreError> {
        self.materialize(self.index.query_by_user(user, limit)?)
    }

    pub fn latest_for_type(
        &self,
        type_name: &TypeName,
        limit: usize,
    ) -> Result<Vec<TimelineEntry>, StoreError> {
        self.materialize(self.index.query_by_type(type_name, limit)?)
    }

    /// Watermark of a type; see [`crate::index::NEVER_UPDATED`].
    pub fn last_update(
        &self,
        type_name: &TypeName,
        filter: &ItemFilter,
    ) -> Result<DateTime<Utc>, StoreError> {
        self.index.last_update_for(type_name, filter)
    }

    pub fn admin_rows(&self, limit: usize) -> Result<Vec<AdminRow>, StoreError> {
        Ok(self
            .latest(limit)?
            .into_iter()
            .map(|entry| AdminRow {
                label: entry.label,
                user: entry.item.user,
                type_name: entry.item.source.type_name,
                timestamp: entry.item.timestamp,
            })
            .collect())
    }

    fn materialize(&self, items: Vec<TimelineItem>) -> Result<Vec<TimelineEntry>, StoreError> {
        items
            .into_iter()
            .map(|item| -> Result<TimelineEntry, StoreError> {
                let record = self.store.fetch(&item.source)?;
                let entity = self.registry.entity(&item.source.type_name);
                let link = entity
                    .and_then(|entity| entity.linkable())
                    .zip(record.as_ref())
                    .and_then(|(linkable, record)| linkable.absolute_url(record));
                let label = match entity {
                    Some(entity) => entity.label(item.source.id, record.as_ref()),
                    None => item.source.to_string(),
                };
                Ok(TimelineEntry {
                    item,
                    record,
                    link,
                    label,
                })
            })
            .collect()
    }
}
