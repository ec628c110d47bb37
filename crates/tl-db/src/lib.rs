//! Storage layer for timelines.
//!
//! Provides persistence for source records and timeline items using
//! `rusqlite`. [`Database`] implements both
//! [`RecordStore`] and [`TimelineIndex`].
//!
//! # Thread Safety
//!
//! The connection is held behind a `parking_lot::Mutex`, so a `Database`
//! can be shared across threads in an `Arc`. Every operation holds the
//! lock for a single statement or transaction. Lifecycle events are fired
//! after the lock is released, so listeners may read and write the
//! database again.
//!
//! # Schema
//!
//! ## Timestamp Format
//!
//! Timestamps are stored as TEXT in RFC 3339 format with nanosecond
//! precision and a `Z` suffix (e.g., `2024-01-15T10:30:00.000000000Z`),
//! so an item keeps the exact timestamp of its source record. The
//! fixed width means lexicographic ordering matches chronological
//! ordering, which the timeline queries rely on.
//!
//! ## Record Payload Storage
//!
//! The `records.data` column stores the record's fields as JSON, each
//! value tagged with its kind (`{"kind":"timestamp","value":"..."}`).

use std::path::Path;
use std::sync::Weak;

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use rusqlite::{Connection, OptionalExtension, Row, params, params_from_iter};
use thiserror::Error;

use tl_core::{
    Fields, GenericRef, ItemFilter, LifecycleListener, Listeners, NEVER_UPDATED, Record, RecordId,
    RecordStore, StoreError, SyncError, TimelineIndex, TimelineItem, TypeName, UserId,
};

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A stored timestamp could not be parsed.
    #[error("invalid timestamp in {table}: {timestamp}")]
    TimestampParse {
        table: &'static str,
        timestamp: String,
        #[source]
        source: chrono::ParseError,
    },
    /// A stored row holds a value the domain types reject.
    #[error("invalid row in {table}: {message}")]
    InvalidRow { table: &'static str, message: String },
    /// Record fields could not be encoded or decoded as JSON.
    #[error("invalid record data for {record}")]
    Payload {
        record: String,
        #[source]
        source: serde_json::Error,
    },
    /// A lifecycle listener failed after the write committed.
    #[error("lifecycle listener failed")]
    Listener(#[from] SyncError),
}

impl From<DbError> for StoreError {
    fn from(err: DbError) -> Self {
        Self::new(err)
    }
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    conn: Mutex<Connection>,
    listeners: Listeners,
}

/// A raw `timeline_items` row.
#[derive(Debug, Clone, PartialEq, Eq)]
struct ItemRow {
    id: i64,
    user_id: String,
    type_name: String,
    object_id: i64,
    timestamp: String,
}

const ITEM_COLUMNS: &str = "id, user_id, type_name, object_id, timestamp";

impl ItemRow {
    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            user_id: row.get(1)?,
            type_name: row.get(2)?,
            object_id: row.get(3)?,
            timestamp: row.get(4)?,
        })
    }

    fn into_item(self) -> Result<TimelineItem, DbError> {
        let invalid = |err: tl_core::ValidationError| DbError::InvalidRow {
            table: "timeline_items",
            message: format!("item {}: {err}", self.id),
        };
        let user = UserId::new(self.user_id.as_str()).map_err(invalid)?;
        let type_name = TypeName::new(&self.type_name).map_err(invalid)?;
        let object_id = RecordId::new(self.object_id).map_err(invalid)?;
        Ok(TimelineItem {
            id: self.id,
            user,
            source: GenericRef::new(type_name, object_id),
            timestamp: parse_timestamp(&self.timestamp, "timeline_items")?,
        })
    }
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        Self::from_connection(Connection::open(path)?)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> Result<Self, DbError> {
        init(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
            listeners: Listeners::new(),
        })
    }

    /// Registers a listener for post-commit record events.
    pub fn subscribe(&self, listener: Weak<dyn LifecycleListener>) {
        self.listeners.subscribe(listener);
    }

    /// Inserts or updates a record, assigning the next id of its type when
    /// it has none, then fires `post_save`.
    ///
    /// Assigned ids are never reused, even after the highest one is deleted.
    pub fn save_record(&self, record: &mut Record) -> Result<RecordId, DbError> {
        let data = encode_fields(record)?;
        let (id, created) = {
            let mut conn = self.conn.lock();
            let tx = conn.transaction()?;
            let (id, created) = match record.id {
                Some(id) => {
                    let exists = tx
                        .query_row(
                            "SELECT 1 FROM records WHERE type_name = ? AND id = ?",
                            params![record.type_name.as_str(), id.get()],
                            |_| Ok(()),
                        )
                        .optional()?
                        .is_some();
                    tx.execute(
                        "
                        INSERT INTO record_sequences (type_name, last_id) VALUES (?, ?)
                        ON CONFLICT (type_name) DO UPDATE SET last_id = MAX(last_id, excluded.last_id)
                        ",
                        params![record.type_name.as_str(), id.get()],
                    )?;
                    (id, !exists)
                }
                None => {
                    let next: i64 = tx.query_row(
                        "
                        INSERT INTO record_sequences (type_name, last_id) VALUES (?, 1)
                        ON CONFLICT (type_name) DO UPDATE SET last_id = last_id + 1
                        RETURNING last_id
                        ",
                        [record.type_name.as_str()],
                        |row| row.get(0),
                    )?;
                    let id = RecordId::new(next).map_err(|err| DbError::InvalidRow {
                        table: "records",
                        message: err.to_string(),
                    })?;
                    (id, true)
                }
            };
            tx.execute(
                "
                INSERT INTO records (type_name, id, data) VALUES (?, ?, ?)
                ON CONFLICT (type_name, id) DO UPDATE SET data = excluded.data
                ",
                params![record.type_name.as_str(), id.get(), data],
            )?;
            tx.commit()?;
            (id, created)
        };

        record.id = Some(id);
        tracing::debug!(type_name = %record.type_name, %id, created, "record saved");
        self.listeners.post_save(record, created)?;
        Ok(id)
    }

    /// Deletes a record and fires `post_delete` if one was removed.
    pub fn delete_record(&self, source: &GenericRef) -> Result<Option<Record>, DbError> {
        let removed = {
            let mut conn = self.conn.lock();
            let tx = conn.transaction()?;
            let data: Option<String> = tx
                .query_row(
                    "SELECT data FROM records WHERE type_name = ? AND id = ?",
                    params![source.type_name.as_str(), source.id.get()],
                    |row| row.get(0),
                )
                .optional()?;
            tx.execute(
                "DELETE FROM records WHERE type_name = ? AND id = ?",
                params![source.type_name.as_str(), source.id.get()],
            )?;
            tx.commit()?;
            data.map(|data| decode_record(source, &data)).transpose()?
        };

        if let Some(record) = &removed {
            tracing::debug!(%source, "record deleted");
            self.listeners.post_delete(record)?;
        }
        Ok(removed)
    }

    pub fn fetch_record(&self, source: &GenericRef) -> Result<Option<Record>, DbError> {
        let data: Option<String> = self
            .conn
            .lock()
            .query_row(
                "SELECT data FROM records WHERE type_name = ? AND id = ?",
                params![source.type_name.as_str(), source.id.get()],
                |row| row.get(0),
            )
            .optional()?;
        data.map(|data| decode_record(source, &data)).transpose()
    }

    /// Lists record ids of a type in ascending order.
    pub fn list_record_ids(&self, type_name: &TypeName) -> Result<Vec<RecordId>, DbError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id FROM records WHERE type_name = ? ORDER BY id ASC")?;
        let rows = stmt.query_map([type_name.as_str()], |row| row.get::<_, i64>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            let id = RecordId::new(row?).map_err(|err| DbError::InvalidRow {
                table: "records",
                message: err.to_string(),
            })?;
            ids.push(id);
        }
        Ok(ids)
    }

    /// Creates the item for `source`, or overwrites its user and timestamp.
    pub fn upsert_item(
        &self,
        user: &UserId,
        source: &GenericRef,
        timestamp: DateTime<Utc>,
    ) -> Result<TimelineItem, DbError> {
        let row = self.conn.lock().query_row(
            &format!(
                "
                INSERT INTO timeline_items (user_id, type_name, object_id, timestamp)
                VALUES (?, ?, ?, ?)
                ON CONFLICT (type_name, object_id)
                DO UPDATE SET user_id = excluded.user_id, timestamp = excluded.timestamp
                RETURNING {ITEM_COLUMNS}
                "
            ),
            params![
                user.as_str(),
                source.type_name.as_str(),
                source.id.get(),
                format_timestamp(timestamp),
            ],
            ItemRow::from_row,
        )?;
        row.into_item()
    }

    pub fn get_item(&self, source: &GenericRef) -> Result<Option<TimelineItem>, DbError> {
        let row = self
            .conn
            .lock()
            .query_row(
                &format!(
                    "SELECT {ITEM_COLUMNS} FROM timeline_items WHERE type_name = ? AND object_id = ?"
                ),
                params![source.type_name.as_str(), source.id.get()],
                ItemRow::from_row,
            )
            .optional()?;
        row.map(ItemRow::into_item).transpose()
    }

    pub fn delete_item(&self, source: &GenericRef) -> Result<bool, DbError> {
        let deleted = self.conn.lock().execute(
            "DELETE FROM timeline_items WHERE type_name = ? AND object_id = ?",
            params![source.type_name.as_str(), source.id.get()],
        )?;
        Ok(deleted > 0)
    }

    /// Lists items newest first, optionally filtered by one column.
    fn list_items(
        &self,
        filter: Option<(&str, &str)>,
        limit: usize,
    ) -> Result<Vec<TimelineItem>, DbError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let conn = self.conn.lock();
        let rows = match filter {
            Some((column, value)) => {
                let mut stmt = conn.prepare(&format!(
                    "
                    SELECT {ITEM_COLUMNS} FROM timeline_items
                    WHERE {column} = ?
                    ORDER BY timestamp DESC, id DESC
                    LIMIT ?
                    "
                ))?;
                let rows = stmt.query_map(params![value, limit], ItemRow::from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
            None => {
                let mut stmt = conn.prepare(&format!(
                    "
                    SELECT {ITEM_COLUMNS} FROM timeline_items
                    ORDER BY timestamp DESC, id DESC
                    LIMIT ?
                    "
                ))?;
                let rows = stmt.query_map([limit], ItemRow::from_row)?;
                rows.collect::<Result<Vec<_>, _>>()?
            }
        };
        drop(conn);
        rows.into_iter().map(ItemRow::into_item).collect()
    }

    pub fn items_for_user(&self, user: &UserId, limit: usize) -> Result<Vec<TimelineItem>, DbError> {
        self.list_items(Some(("user_id", user.as_str())), limit)
    }

    pub fn latest_items(&self, limit: usize) -> Result<Vec<TimelineItem>, DbError> {
        self.list_items(None, limit)
    }

    pub fn items_for_type(
        &self,
        type_name: &TypeName,
        limit: usize,
    ) -> Result<Vec<TimelineItem>, DbError> {
        self.list_items(Some(("type_name", type_name.as_str())), limit)
    }

    /// Latest item timestamp of a type, or [`NEVER_UPDATED`] if none match.
    pub fn last_item_timestamp(
        &self,
        type_name: &TypeName,
        filter: &ItemFilter,
    ) -> Result<DateTime<Utc>, DbError> {
        let mut sql = String::from("SELECT MAX(timestamp) FROM timeline_items WHERE type_name = ?");
        let mut values = vec![type_name.as_str().to_string()];
        if let Some(user) = &filter.user {
            sql.push_str(" AND user_id = ?");
            values.push(user.as_str().to_string());
        }
        if let Some(before) = filter.before {
            sql.push_str(" AND timestamp < ?");
            values.push(format_timestamp(before));
        }
        if let Some(after) = filter.after {
            sql.push_str(" AND timestamp >= ?");
            values.push(format_timestamp(after));
        }

        let latest: Option<String> =
            self.conn
                .lock()
                .query_row(&sql, params_from_iter(values.iter()), |row| row.get(0))?;
        latest.map_or(Ok(NEVER_UPDATED), |ts| {
            parse_timestamp(&ts, "timeline_items")
        })
    }

    /// Sources of every item of a type, by object id.
    pub fn item_sources(&self, type_name: &TypeName) -> Result<Vec<GenericRef>, DbError> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT object_id FROM timeline_items WHERE type_name = ? ORDER BY object_id ASC",
        )?;
        let rows = stmt.query_map([type_name.as_str()], |row| row.get::<_, i64>(0))?;
        let mut sources = Vec::new();
        for row in rows {
            let id = RecordId::new(row?).map_err(|err| DbError::InvalidRow {
                table: "timeline_items",
                message: err.to_string(),
            })?;
            sources.push(GenericRef::new(type_name.clone(), id));
        }
        Ok(sources)
    }
}

/// Initializes the database schema.
///
/// This is idempotent - safe to call on an already-initialized database.
fn init(conn: &Connection) -> Result<(), DbError> {
    conn.execute_batch(
        "
        -- Source records of every type
        -- data: JSON object of tagged field values
        CREATE TABLE IF NOT EXISTS records (
            type_name TEXT NOT NULL,
            id INTEGER NOT NULL,
            data TEXT NOT NULL,
            PRIMARY KEY (type_name, id)
        );

        -- Highest id ever used per type; deleted ids are not handed out again
        CREATE TABLE IF NOT EXISTS record_sequences (
            type_name TEXT PRIMARY KEY,
            last_id INTEGER NOT NULL
        );

        INSERT OR IGNORE INTO record_sequences (type_name, last_id)
            SELECT type_name, MAX(id) FROM records GROUP BY type_name;

        -- Timeline items: one per qualifying source record
        -- timestamp: RFC 3339 with nanoseconds (e.g., '2024-01-15T10:30:00.000000000Z')
        CREATE TABLE IF NOT EXISTS timeline_items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            user_id TEXT NOT NULL,
            type_name TEXT NOT NULL,
            object_id INTEGER NOT NULL,
            timestamp TEXT NOT NULL,
            UNIQUE (type_name, object_id)
        );

        CREATE INDEX IF NOT EXISTS idx_timeline_items_timestamp ON timeline_items(timestamp);
        CREATE INDEX IF NOT EXISTS idx_timeline_items_user ON timeline_items(user_id, timestamp);
        CREATE INDEX IF NOT EXISTS idx_timeline_items_type ON timeline_items(type_name, timestamp);
        ",
    )?;
    Ok(())
}

fn encode_fields(record: &Record) -> Result<String, DbError> {
    serde_json::to_string(&record.fields).map_err(|source| DbError::Payload {
        record: record.type_name.to_string(),
        source,
    })
}

fn decode_record(source: &GenericRef, data: &str) -> Result<Record, DbError> {
    let fields: Fields = serde_json::from_str(data).map_err(|err| DbError::Payload {
        record: source.to_string(),
        source: err,
    })?;
    let mut record = Record::new(source.type_name.clone()).with_id(source.id);
    record.fields = fields;
    Ok(record)
}

fn parse_timestamp(timestamp: &str, table: &'static str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|parsed| parsed.with_timezone(&Utc))
        .map_err(|source| DbError::TimestampParse {
            table,
            timestamp: timestamp.to_string(),
            source,
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

impl RecordStore for Database {
    fn fetch(&self, source: &GenericRef) -> Result<Option<Record>, StoreError> {
        Ok(self.fetch_record(source)?)
    }

    fn save(&self, record: &mut Record) -> Result<RecordId, StoreError> {
        Ok(self.save_record(record)?)
    }

    fn delete(&self, source: &GenericRef) -> Result<Option<Record>, StoreError> {
        Ok(self.delete_record(source)?)
    }

    fn list_ids(&self, type_name: &TypeName) -> Result<Vec<RecordId>, StoreError> {
        Ok(self.list_record_ids(type_name)?)
    }
}

impl TimelineIndex for Database {
    fn upsert(
        &self,
        user: &UserId,
        source: &GenericRef,
        timestamp: DateTime<Utc>,
    ) -> Result<TimelineItem, StoreError> {
        Ok(self.upsert_item(user, source, timestamp)?)
    }

    fn get(&self, source: &GenericRef) -> Result<Option<TimelineItem>, StoreError> {
        Ok(self.get_item(source)?)
    }

    fn delete_by(&self, source: &GenericRef) -> Result<bool, StoreError> {
        Ok(self.delete_item(source)?)
    }

    fn query_by_user(&self, user: &UserId, limit: usize) -> Result<Vec<TimelineItem>, StoreError> {
        Ok(self.items_for_user(user, limit)?)
    }

    fn query_global(&self, limit: usize) -> Result<Vec<TimelineItem>, StoreError> {
        Ok(self.latest_items(limit)?)
    }

    fn query_by_type(
        &self,
        type_name: &TypeName,
        limit: usize,
    ) -> Result<Vec<TimelineItem>, StoreError> {
        Ok(self.items_for_type(type_name, limit)?)
    }

    fn last_update_for(
        &self,
        type_name: &TypeName,
        filter: &ItemFilter,
    ) -> Result<DateTime<Utc>, StoreError> {
        Ok(self.last_item_timestamp(type_name, filter)?)
    }

    fn sources(&self, type_name: &TypeName) -> Result<Vec<GenericRef>, StoreError> {
        Ok(self.item_sources(type_name)?)
    }
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database")
            .field("listeners", &self.listeners)
            .finish_non_exhaustive()
    }
}
