//! Core type definitions with validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// A type label was not of the form `app_label.model`.
    #[error("invalid type name {value:?}: expected `app_label.model`")]
    InvalidTypeName { value: String },

    /// Record primary keys are positive.
    #[error("record id must be positive, got {value}")]
    InvalidRecordId { value: i64 },
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                if id.is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                Ok(Self(id))
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// A validated account identifier.
    ///
    /// Identifies the user who owns a timeline item. The account itself
    /// lives outside this system; only the identifier is stored.
    UserId, "user ID"
);

/// Lower-cased `app_label.model` label of a record type.
///
/// `Blog.Post` and `blog.post` name the same type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TypeName(String);

impl TypeName {
    /// Parses and normalizes a type label.
    pub fn new(label: impl AsRef<str>) -> Result<Self, ValidationError> {
        let label = label.as_ref().trim();
        if label.is_empty() {
            return Err(ValidationError::Empty { field: "type name" });
        }
        match label.split_once('.') {
            Some((app, model)) if !app.is_empty() && !model.is_empty() && !model.contains('.') => {
                Ok(Self(label.to_lowercase()))
            }
            _ => Err(ValidationError::InvalidTypeName {
                value: label.to_string(),
            }),
        }
    }

    /// Builds a type name from its two halves.
    pub fn from_parts(app_label: &str, model: &str) -> Result<Self, ValidationError> {
        Self::new(format!("{app_label}.{model}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The application half of the label.
    pub fn app_label(&self) -> &str {
        self.0.split_once('.').map_or("", |(app, _)| app)
    }

    /// The model half of the label.
    pub fn model(&self) -> &str {
        self.0.split_once('.').map_or("", |(_, model)| model)
    }
}

impl TryFrom<String> for TypeName {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<TypeName> for String {
    fn from(name: TypeName) -> Self {
        name.0
    }
}

impl fmt::Display for TypeName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TypeName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Primary key of a persisted source record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct RecordId(i64);

impl RecordId {
    pub fn new(value: i64) -> Result<Self, ValidationError> {
        if value <= 0 {
            return Err(ValidationError::InvalidRecordId { value });
        }
        Ok(Self(value))
    }

    #[must_use]
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl TryFrom<i64> for RecordId {
    type Error = ValidationError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<RecordId> for i64 {
    fn from(id: RecordId) -> Self {
        id.0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A polymorphic pointer to a source record: type plus primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GenericRef {
    pub type_name: TypeName,
    pub id: RecordId,
}

impl GenericRef {
    pub const fn new(type_name: TypeName, id: RecordId) -> Self {
        Self { type_name, id }
    }
}

impl fmt::Display for GenericRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}#{}", self.type_name, self.id)
    }
}
