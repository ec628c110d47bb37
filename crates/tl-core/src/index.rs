//! Timeline items and the index that stores them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::store::StoreError;
use crate::types::{GenericRef, TypeName, UserId};

/// Watermark returned when a type has no timeline items.
///
/// This is a sentinel, not a real timestamp: check it with [`is_never`].
pub const NEVER_UPDATED: DateTime<Utc> = DateTime::UNIX_EPOCH;

/// Whether a watermark is the "never updated" sentinel.
pub fn is_never(watermark: DateTime<Utc>) -> bool {
    watermark == NEVER_UPDATED
}

/// A derived timeline entry pointing at a source record.
///
/// At most one item exists per source record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimelineItem {
    pub id: i64,
    pub user: UserId,
    pub source: GenericRef,
    /// Copy of the source record's qualifying timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Extra conditions for watermark queries.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ItemFilter {
    pub user: Option<UserId>,
    /// Only items strictly before this instant.
    pub before: Option<DateTime<Utc>>,
    /// Only items at or after this instant.
    pub after: Option<DateTime<Utc>>,
}

impl ItemFilter {
    #[must_use]
    pub fn user(mut self, user: UserId) -> Self {
        self.user = Some(user);
        self
    }

    #[must_use]
    pub fn before(mut self, before: DateTime<Utc>) -> Self {
        self.before = Some(before);
        self
    }

    #[must_use]
    pub fn after(mut self, after: DateTime<Utc>) -> Self {
        self.after = Some(after);
        self
    }
}

/// Storage of timeline items.
///
/// Query results are ordered by timestamp, newest first, with ties broken
/// by item id descending.
pub trait TimelineIndex: Send + Sync {
    /// Creates the item for `source` or overwrites its user and timestamp.
    fn upsert(
        &self,
        user: &UserId,
        source: &GenericRef,
        timestamp: DateTime<Utc>,
    ) -> Result<TimelineItem, StoreError>;

    fn get(&self, source: &GenericRef) -> Result<Option<TimelineItem>, StoreError>;

    /// Removes the item for `source`. Returns whether a row was removed.
    fn delete_by(&self, source: &GenericRef) -> Result<bool, StoreError>;

    fn query_by_user(&self, user: &UserId, limit: usize) -> Result<Vec<TimelineItem>, StoreError>;

    fn query_global(&self, limit: usize) -> Result<Vec<TimelineItem>, StoreError>;

    fn query_by_type(
        &self,
        type_name: &TypeName,
        limit: usize,
    ) -> Result<Vec<TimelineItem>, StoreError>;

    /// Latest timestamp among matching items, or [`NEVER_UPDATED`].
    fn last_update_for(
        &self,
        type_name: &TypeName,
        filter: &ItemFilter,
    ) -> Result<DateTime<Utc>, StoreError>;

    /// Sources of every item of a type.
    fn sources(&self, type_name: &TypeName) -> Result<Vec<GenericRef>, StoreError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;

    #[test]
    fn sentinel_is_unix_epoch() {
        assert_eq!(NEVER_UPDATED.timestamp(), 0);
        assert!(is_never(NEVER_UPDATED));
        assert!(!is_never(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()));
    }

    #[test]
    fn filter_builder_sets_fields() {
        let at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let filter = ItemFilter::default()
            .user(UserId::new("u1").unwrap())
            .before(at)
            .after(at);
        assert_eq!(filter.user.as_ref().map(UserId::as_str), Some("u1"));
        assert_eq!(filter.before, Some(at));
        assert_eq!(filter.after, Some(at));
    }
}
