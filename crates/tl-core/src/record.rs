//! Source records as seen by the timeline engine.
//!
//! Records are owned by their domain modules; the engine only needs a
//! generic view of them: a type, an optional primary key, and a bag of
//! tagged field values.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{GenericRef, RecordId, TypeName, UserId};

/// Field values keyed by field name.
pub type Fields = BTreeMap<String, FieldValue>;

/// A tagged record field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Timestamp(DateTime<Utc>),
    User(UserId),
    /// An embedded or related record whose fields can be walked.
    Object(Fields),
}

impl FieldValue {
    /// Returns the kind name used in diagnostics.
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Text(_) => "text",
            Self::Timestamp(_) => "timestamp",
            Self::User(_) => "user",
            Self::Object(_) => "object",
        }
    }

    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(value: DateTime<Utc>) -> Self {
        Self::Timestamp(value)
    }
}

impl From<UserId> for FieldValue {
    fn from(value: UserId) -> Self {
        Self::User(value)
    }
}

impl From<Fields> for FieldValue {
    fn from(value: Fields) -> Self {
        Self::Object(value)
    }
}

/// A record instance passed to lifecycle hooks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub type_name: TypeName,
    /// `None` until the record has been persisted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<RecordId>,
    #[serde(default)]
    pub fields: Fields,
}

impl Record {
    /// Creates an unpersisted record with no fields.
    pub const fn new(type_name: TypeName) -> Self {
        Self {
            type_name,
            id: None,
            fields: BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_id(mut self, id: RecordId) -> Self {
        self.id = Some(id);
        self
    }

    /// Sets a field, replacing any previous value.
    #[must_use]
    pub fn with(mut self, field: &str, value: impl Into<FieldValue>) -> Self {
        self.set(field, value);
        self
    }

    pub fn set(&mut self, field: &str, value: impl Into<FieldValue>) {
        self.fields.insert(field.to_string(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.fields.get(field)
    }

    /// The generic reference for a persisted record.
    pub fn generic_ref(&self) -> Option<GenericRef> {
        self.id.map(|id| GenericRef::new(self.type_name.clone(), id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_json_uses_tagged_fields() {
        let record = Record::new(TypeName::new("blog.post").unwrap())
            .with_id(RecordId::new(1).unwrap())
            .with("title", "Hello")
            .with("published", true)
            .with("author", UserId::new("u1").unwrap());

        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type_name"], "blog.post");
        assert_eq!(json["id"], 1);
        assert_eq!(json["fields"]["published"]["kind"], "bool");
        assert_eq!(json["fields"]["author"]["value"], "u1");

        let parsed: Record = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, record);
    }

    #[test]
    fn unpersisted_record_has_no_ref() {
        let record = Record::new(TypeName::new("blog.post").unwrap());
        assert!(record.generic_ref().is_none());
        let record = record.with_id(RecordId::new(9).unwrap());
        assert_eq!(record.generic_ref().unwrap().to_string(), "blog.post#9");
    }

    #[test]
    fn null_field_deserializes_without_value() {
        let value: FieldValue = serde_json::from_str(r#"{"kind":"null"}"#).unwrap();
        assert!(value.is_null());
        assert_eq!(value.kind_name(), "null");
    }
}
