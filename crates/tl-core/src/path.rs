//! Dot-separated field paths and timestamp extraction.
//!
//! A path such as `event.starts_at` is walked one segment at a time.
//! Every segment resolves to an explicit [`Step`]: descend into an
//! embedded object, stop on a timestamp, or give up. Stopping on a
//! timestamp before the last segment is allowed; stopping on anything
//! else is an error.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::record::{FieldValue, Fields};

/// A path was not usable as a field path.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid field path {path:?}: segments must be non-empty")]
pub struct InvalidPath {
    pub path: String,
}

/// A path resolved to a value that is not a timestamp.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("field path {path} stops at `{segment}` on a {found} value, expected a timestamp")]
pub struct NotATimestamp {
    pub path: String,
    pub segment: String,
    pub found: &'static str,
}

/// A validated, non-empty sequence of field names.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FieldPath {
    segments: Vec<String>,
}

/// Outcome of resolving a single path segment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Step<'a> {
    /// The segment is an embedded object; continue with its fields.
    Descend(&'a Fields),
    /// The segment holds a timestamp; traversal ends here.
    Terminal(DateTime<Utc>),
    /// The segment is missing or null.
    Absent,
    /// The segment holds a value that can neither be descended into nor used.
    Mismatch(&'static str),
}

fn step(value: Option<&FieldValue>) -> Step<'_> {
    match value {
        None | Some(FieldValue::Null) => Step::Absent,
        Some(FieldValue::Timestamp(ts)) => Step::Terminal(*ts),
        Some(FieldValue::Object(fields)) => Step::Descend(fields),
        Some(other) => Step::Mismatch(other.kind_name()),
    }
}

impl FieldPath {
    pub fn parse(path: &str) -> Result<Self, InvalidPath> {
        let segments: Vec<String> = path.split('.').map(str::to_string).collect();
        if segments.iter().any(String::is_empty) {
            return Err(InvalidPath {
                path: path.to_string(),
            });
        }
        Ok(Self { segments })
    }

    /// A single-segment path naming one field.
    pub(crate) fn field(name: &str) -> Self {
        Self {
            segments: vec![name.to_string()],
        }
    }

    /// The field looked up on the record itself.
    pub fn first(&self) -> &str {
        &self.segments[0]
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn len(&self) -> usize {
        self.segments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// Walks the path and returns the timestamp it leads to.
    ///
    /// Returns `Ok(None)` when a segment is missing or null. An
    /// intermediate timestamp ends the walk early and is used as the
    /// result. Ending on an object, or meeting any other scalar, is an
    /// error.
    pub fn resolve_timestamp(&self, fields: &Fields) -> Result<Option<DateTime<Utc>>, NotATimestamp> {
        let mut current = fields;
        for (index, segment) in self.segments.iter().enumerate() {
            let last = index + 1 == self.segments.len();
            match step(current.get(segment)) {
                Step::Absent => return Ok(None),
                Step::Terminal(ts) => {
                    if !last {
                        tracing::trace!(path = %self, %segment, "timestamp reached before end of path");
                    }
                    return Ok(Some(ts));
                }
                Step::Descend(next) if !last => current = next,
                Step::Descend(_) => return Err(self.not_a_timestamp(segment, "object")),
                Step::Mismatch(found) => return Err(self.not_a_timestamp(segment, found)),
            }
        }
        Ok(None)
    }

    fn not_a_timestamp(&self, segment: &str, found: &'static str) -> NotATimestamp {
        NotATimestamp {
            path: self.to_string(),
            segment: segment.to_string(),
            found,
        }
    }
}

impl FromStr for FieldPath {
    type Err = InvalidPath;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for FieldPath {
    type Error = InvalidPath;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<FieldPath> for String {
    fn from(path: FieldPath) -> Self {
        path.to_string()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.segments.join("."))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::TimeZone;

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 1, hour, 0, 0).unwrap()
    }

    fn fields(entries: &[(&str, FieldValue)]) -> Fields {
        entries
            .iter()
            .map(|(name, value)| ((*name).to_string(), value.clone()))
            .collect()
    }

    #[test]
    fn parse_rejects_empty_segments() {
        for bad in ["", ".", "a.", ".a", "a..b"] {
            assert!(FieldPath::parse(bad).is_err(), "{bad:?} should be rejected");
        }
        let path = FieldPath::parse("event.starts_at").unwrap();
        assert_eq!(path.first(), "event");
        assert_eq!(path.len(), 2);
        assert_eq!(path.to_string(), "event.starts_at");
    }

    #[test]
    fn single_segment_timestamp() {
        let path = FieldPath::parse("published_at").unwrap();
        let record = fields(&[("published_at", FieldValue::Timestamp(ts(1)))]);
        assert_eq!(path.resolve_timestamp(&record), Ok(Some(ts(1))));
    }

    #[test]
    fn nested_timestamp_descends_objects() {
        let path = FieldPath::parse("event.starts_at").unwrap();
        let event = fields(&[("starts_at", FieldValue::Timestamp(ts(2)))]);
        let record = fields(&[("event", FieldValue::Object(event))]);
        assert_eq!(path.resolve_timestamp(&record), Ok(Some(ts(2))));
    }

    #[test]
    fn intermediate_timestamp_stops_early() {
        let path = FieldPath::parse("published_at.date").unwrap();
        let record = fields(&[("published_at", FieldValue::Timestamp(ts(3)))]);
        assert_eq!(path.resolve_timestamp(&record), Ok(Some(ts(3))));
    }

    #[test]
    fn missing_or_null_segment_is_absent() {
        let path = FieldPath::parse("event.starts_at").unwrap();
        assert_eq!(path.resolve_timestamp(&Fields::new()), Ok(None));

        let record = fields(&[("event", FieldValue::Null)]);
        assert_eq!(path.resolve_timestamp(&record), Ok(None));

        let record = fields(&[("event", FieldValue::Object(Fields::new()))]);
        assert_eq!(path.resolve_timestamp(&record), Ok(None));
    }

    #[test]
    fn path_ending_on_object_is_rejected() {
        let path = FieldPath::parse("event").unwrap();
        let record = fields(&[("event", FieldValue::Object(Fields::new()))]);
        let err = path.resolve_timestamp(&record).unwrap_err();
        assert_eq!(err.segment, "event");
        assert_eq!(err.found, "object");
    }

    #[test]
    fn intermediate_scalar_is_rejected() {
        let path = FieldPath::parse("title.length").unwrap();
        let record = fields(&[("title", FieldValue::Text("hello".into()))]);
        let err = path.resolve_timestamp(&record).unwrap_err();
        assert_eq!(
            err.to_string(),
            "field path title.length stops at `title` on a text value, expected a timestamp"
        );
    }

    #[test]
    fn serde_uses_dotted_text() {
        let path: FieldPath = serde_json::from_str("\"a.b\"").unwrap();
        assert_eq!(path.segments(), ["a", "b"]);
        assert!(serde_json::from_str::<FieldPath>("\"a..b\"").is_err());
    }
}
