//! Put command: save a source record from JSON fields.
//!
//! Fields declared on the record type are converted to their declared
//! kind. Undeclared fields, and fields inside objects, are inferred:
//! RFC 3339 strings become timestamps, other JSON scalars map directly.

use std::io::Write;

use anyhow::{Context, Result, bail};
use serde_json::{Map, Value};
use tl_core::{
    EntityType, FieldKind, FieldValue, Fields, GenericRef, Record, RecordId, TimelineIndex, UserId,
};

use tl_db::DbError;

use super::util::{format_time, parse_datetime};
use crate::App;

pub fn run<W: Write>(
    writer: &mut W,
    app: &App,
    type_label: &str,
    id: Option<i64>,
    fields_json: &str,
) -> Result<()> {
    let type_name = App::type_name(type_label)?;
    let entity = app.catalog.resolve(type_label).ok();

    let json: Value = serde_json::from_str(fields_json).context("fields must be valid JSON")?;
    let Value::Object(map) = json else {
        bail!("fields must be a JSON object");
    };

    let mut record = Record::new(type_name);
    record.fields = coerce_fields(entity, map)?;
    if let Some(id) = id {
        record.id = Some(RecordId::new(id)?);
    }

    let id = match app.db.save_record(&mut record) {
        Ok(id) => id,
        Err(DbError::Listener(err)) => {
            let saved = record
                .generic_ref()
                .map_or_else(|| record.type_name.to_string(), |source| source.to_string());
            return Err(anyhow::Error::new(err)
                .context(format!("saved {saved}, but its timeline item could not be updated")));
        }
        Err(err) => return Err(anyhow::Error::new(err).context("failed to save record")),
    };
    let source = GenericRef::new(record.type_name.clone(), id);
    writeln!(writer, "Saved {source}")?;

    if !app.registry().is_followed(&source.type_name) {
        writeln!(writer, "Type is not followed.")?;
    } else if let Some(item) = app.db.get(&source)? {
        writeln!(
            writer,
            "In timeline for {} at {}",
            item.user,
            format_time(item.timestamp)
        )?;
    } else {
        writeln!(writer, "Not in timeline.")?;
    }
    Ok(())
}

/// Converts a JSON object into record fields.
pub fn coerce_fields(entity: Option<&EntityType>, map: Map<String, Value>) -> Result<Fields> {
    map.into_iter()
        .map(|(name, value)| -> Result<(String, FieldValue)> {
            let kind = entity.and_then(|entity| entity.field_kind(&name));
            let value = match kind {
                Some(kind) => coerce(kind, value)
                    .with_context(|| format!("field {name:?} must be a {kind}"))?,
                None => infer(value)?,
            };
            Ok((name, value))
        })
        .collect()
}

fn coerce(kind: FieldKind, value: Value) -> Result<FieldValue> {
    let coerced = match (kind, value) {
        (_, Value::Null) => FieldValue::Null,
        (FieldKind::Bool, Value::Bool(b)) => FieldValue::Bool(b),
        (FieldKind::Int, Value::Number(n)) => {
            FieldValue::Int(n.as_i64().context("not an integer")?)
        }
        (FieldKind::Text, Value::String(s)) => FieldValue::Text(s),
        (FieldKind::Timestamp, Value::String(s)) => FieldValue::Timestamp(parse_datetime(&s)?),
        (FieldKind::User, Value::String(s)) => FieldValue::User(UserId::new(s)?),
        (FieldKind::Object, Value::Object(map)) => FieldValue::Object(coerce_fields(None, map)?),
        (_, other) => bail!("got {other}"),
    };
    Ok(coerced)
}

fn infer(value: Value) -> Result<FieldValue> {
    let inferred = match value {
        Value::Null => FieldValue::Null,
        Value::Bool(b) => FieldValue::Bool(b),
        Value::Number(n) => match n.as_i64() {
            Some(n) => FieldValue::Int(n),
            None => bail!("only integer numbers are supported, got {n}"),
        },
        Value::String(s) => match chrono::DateTime::parse_from_rfc3339(&s) {
            Ok(ts) => FieldValue::Timestamp(ts.with_timezone(&chrono::Utc)),
            Err(_) => FieldValue::Text(s),
        },
        Value::Object(map) => FieldValue::Object(coerce_fields(None, map)?),
        Value::Array(_) => bail!("arrays are not supported as field values"),
    };
    Ok(inferred)
}

#[cfg(test)]
mod tests {
    use super::*;

    use chrono::{TimeZone, Utc};
    use insta::assert_snapshot;

    use crate::app::test_support;

    fn put(app: &App, type_label: &str, id: Option<i64>, json: &str) -> Result<String> {
        let mut output = Vec::new();
        run(&mut output, app, type_label, id, json)?;
        Ok(String::from_utf8(output).unwrap())
    }

    #[test]
    fn published_post_lands_in_timeline() {
        let app = test_support::app();
        let output = put(
            &app,
            "blog.Post",
            None,
            r#"{"author":"alice","title":"Hi","published":true,"published_at":"2025-02-01T09:00:00Z"}"#,
        )
        .unwrap();
        assert_snapshot!(output, @r"
        Saved blog.post#1
        In timeline for alice at 2025-02-01T09:00:00Z
        ");

        let output = put(&app, "blog.post", Some(1), r#"{"author":"alice","published":false}"#).unwrap();
        assert_snapshot!(output, @r"
        Saved blog.post#1
        Not in timeline.
        ");
    }

    #[test]
    fn mismatched_nested_timestamp_is_reported_as_saved() {
        let mut config = test_support::config();
        config.follow[1].date_field = "event.starts_at".to_string();
        let app = App::with_database(config, tl_db::Database::open_in_memory().unwrap());

        let output = put(
            &app,
            "photos.upload",
            None,
            r#"{"user":"bob","event":{"starts_at":"2025-03-01T10:00:00Z"}}"#,
        )
        .unwrap();
        assert_snapshot!(output, @r"
        Saved photos.upload#1
        In timeline for bob at 2025-03-01T10:00:00Z
        ");

        let err = put(
            &app,
            "photos.upload",
            Some(1),
            r#"{"user":"bob","event":{"starts_at":"soon"}}"#,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "saved photos.upload#1, but its timeline item could not be updated"
        );
        let source = GenericRef::new(
            App::type_name("photos.upload").unwrap(),
            RecordId::new(1).unwrap(),
        );
        assert!(app.db.get(&source).unwrap().is_none());
        assert!(app.db.fetch_record(&source).unwrap().is_some());
    }

    #[test]
    fn unfollowed_type_is_saved_but_not_tracked() {
        let app = test_support::app();
        let output = put(&app, "blog.comment", None, r#"{"body":"nice"}"#).unwrap();
        assert_snapshot!(output, @r"
        Saved blog.comment#1
        Type is not followed.
        ");
    }

    #[test]
    fn declared_kinds_are_enforced() {
        let app = test_support::app();
        let err = put(&app, "blog.post", None, r#"{"published":"yes"}"#).unwrap_err();
        assert_eq!(err.to_string(), "field \"published\" must be a bool");

        assert!(put(&app, "blog.post", None, "[1, 2]").is_err());
        assert!(put(&app, "blog.post", None, "not json").is_err());
        assert!(put(&app, "blog.post", Some(0), "{}").is_err());
    }

    #[test]
    fn undeclared_and_nested_fields_are_inferred() {
        let map = serde_json::from_str::<Map<String, Value>>(
            r#"{"event":{"starts_at":"2025-03-01T10:00:00Z","name":"Launch"},"views":3,"note":null}"#,
        )
        .unwrap();
        let fields = coerce_fields(None, map).unwrap();

        let Some(FieldValue::Object(event)) = fields.get("event") else {
            panic!("event should be an object");
        };
        assert_eq!(
            event.get("starts_at"),
            Some(&FieldValue::Timestamp(
                Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap()
            ))
        );
        assert_eq!(event.get("name"), Some(&FieldValue::from("Launch")));
        assert_eq!(fields.get("views"), Some(&FieldValue::Int(3)));
        assert_eq!(fields.get("note"), Some(&FieldValue::Null));
    }
}
