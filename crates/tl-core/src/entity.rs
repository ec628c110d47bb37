//! Runtime descriptors for record types.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::record::{FieldValue, Record};
use crate::types::{RecordId, TypeName, ValidationError};

/// Name of the qualifying set that every entity type has implicitly.
pub const ALL_SET: &str = "all";

static ALL_FILTER: SetFilter = SetFilter::All;

/// Declared kind of a record field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldKind {
    Bool,
    Int,
    Text,
    Timestamp,
    User,
    Object,
}

impl FieldKind {
    /// Whether a value is of this kind. `Null` fits every kind.
    pub const fn admits(self, value: &FieldValue) -> bool {
        matches!(
            (self, value),
            (_, FieldValue::Null)
                | (Self::Bool, FieldValue::Bool(_))
                | (Self::Int, FieldValue::Int(_))
                | (Self::Text, FieldValue::Text(_))
                | (Self::Timestamp, FieldValue::Timestamp(_))
                | (Self::User, FieldValue::User(_))
                | (Self::Object, FieldValue::Object(_))
        )
    }
}

impl fmt::Display for FieldKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Bool => "bool",
            Self::Int => "int",
            Self::Text => "text",
            Self::Timestamp => "timestamp",
            Self::User => "user",
            Self::Object => "object",
        };
        f.write_str(s)
    }
}

/// Membership rule of a qualifying set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "filter", rename_all = "snake_case")]
pub enum SetFilter {
    /// Every persisted record.
    All,
    /// Records whose field equals the given value. A missing field counts as `Null`.
    FieldEquals { field: String, value: FieldValue },
}

impl SetFilter {
    pub fn matches(&self, record: &Record) -> bool {
        match self {
            Self::All => true,
            Self::FieldEquals { field, value } => {
                record.get(field).unwrap_or(&FieldValue::Null) == value
            }
        }
    }
}

/// Optional capability of record types that can be linked to.
pub trait Linkable {
    /// The absolute URL of a record, if one can be built.
    fn absolute_url(&self, record: &Record) -> Option<String>;
}

/// A URL pattern with `{id}` and `{field}` placeholders.
///
/// Placeholders may reference `Text` and `Int` fields. A placeholder that
/// cannot be filled yields no link.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UrlTemplate(String);

impl UrlTemplate {
    pub fn new(template: impl Into<String>) -> Self {
        Self(template.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Linkable for UrlTemplate {
    fn absolute_url(&self, record: &Record) -> Option<String> {
        let mut url = String::with_capacity(self.0.len());
        let mut rest = self.0.as_str();
        while let Some(open) = rest.find('{') {
            url.push_str(&rest[..open]);
            let close = rest[open..].find('}')? + open;
            let name = &rest[open + 1..close];
            let value = if name == "id" {
                record.id?.to_string()
            } else {
                match record.get(name)? {
                    FieldValue::Text(text) => text.clone(),
                    FieldValue::Int(n) => n.to_string(),
                    _ => return None,
                }
            };
            url.push_str(&value);
            rest = &rest[close + 1..];
        }
        url.push_str(rest);
        Some(url)
    }
}

/// Runtime descriptor of a record type.
///
/// Declares the fields the type carries, the qualifying sets that can
/// be followed, and how records of the type are presented.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityType {
    pub app_label: String,
    pub model: String,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldKind>,
    #[serde(default)]
    pub sets: BTreeMap<String, SetFilter>,
    /// Text field used for the record's textual representation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_field: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url_template: Option<UrlTemplate>,
}

impl EntityType {
    pub fn new(app_label: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            app_label: app_label.into(),
            model: model.into(),
            fields: BTreeMap::new(),
            sets: BTreeMap::new(),
            display_field: None,
            url_template: None,
        }
    }

    #[must_use]
    pub fn field(mut self, name: &str, kind: FieldKind) -> Self {
        self.fields.insert(name.to_string(), kind);
        self
    }

    #[must_use]
    pub fn set(mut self, name: &str, filter: SetFilter) -> Self {
        self.sets.insert(name.to_string(), filter);
        self
    }

    #[must_use]
    pub fn display_field(mut self, field: &str) -> Self {
        self.display_field = Some(field.to_string());
        self
    }

    #[must_use]
    pub fn url_template(mut self, template: &str) -> Self {
        self.url_template = Some(UrlTemplate::new(template));
        self
    }

    pub fn type_name(&self) -> Result<TypeName, ValidationError> {
        TypeName::from_parts(&self.app_label, &self.model)
    }

    pub fn field_kind(&self, name: &str) -> Option<FieldKind> {
        self.fields.get(name).copied()
    }

    /// Looks up a qualifying set. `all` exists even when undeclared.
    pub fn set_filter(&self, name: &str) -> Option<&SetFilter> {
        match self.sets.get(name) {
            Some(filter) => Some(filter),
            None if name == ALL_SET => Some(&ALL_FILTER),
            None => None,
        }
    }

    /// The linking capability, when the type has one.
    pub fn linkable(&self) -> Option<&dyn Linkable> {
        self.url_template
            .as_ref()
            .map(|template| template as &dyn Linkable)
    }

    /// Textual representation of a record of this type: `Model: display`.
    ///
    /// Falls back to `#id` without a display field, and to `(missing)`
    /// when the record could not be loaded.
    pub fn label(&self, id: RecordId, record: Option<&Record>) -> String {
        let shown = match record {
            None => "(missing)".to_string(),
            Some(record) => self
                .display_field
                .as_deref()
                .and_then(|field| match record.get(field) {
                    Some(FieldValue::Text(text)) => Some(text.clone()),
                    Some(FieldValue::Int(n)) => Some(n.to_string()),
                    _ => None,
                })
                .unwrap_or_else(|| format!("#{id}")),
        };
        format!("{}: {shown}", self.model)
    }
}
