//! Follow configuration for record types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::entity::{ALL_SET, FieldKind};
use crate::path::{FieldPath, InvalidPath};
use crate::types::{TypeName, ValidationError};

/// Default qualifying set.
pub const DEFAULT_MANAGER: &str = ALL_SET;
/// Default timestamp field path.
pub const DEFAULT_DATE_FIELD: &str = "date_published";
/// Default owning-user field.
pub const DEFAULT_USER_FIELD: &str = "user";

/// Static misconfiguration of a followed type.
///
/// Raised at registration; a type with a bad configuration is not followed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error(transparent)]
    InvalidTypeName(#[from] ValidationError),

    #[error(transparent)]
    InvalidPath(#[from] InvalidPath),

    /// The config names a different type than the descriptor it is registered with.
    #[error("config for {config} cannot be registered with descriptor {entity}")]
    TypeMismatch { config: TypeName, entity: TypeName },

    #[error("{type_name} has no qualifying set named {set:?}")]
    UnknownSet { type_name: TypeName, set: String },

    #[error("{type_name} has no field named {field:?}")]
    UnknownField { type_name: TypeName, field: String },

    #[error("{type_name}.{field} is a {actual} field, expected {expected}")]
    FieldKind {
        type_name: TypeName,
        field: String,
        expected: &'static str,
        actual: FieldKind,
    },
}

fn default_manager() -> String {
    DEFAULT_MANAGER.to_string()
}

fn default_date_field() -> String {
    DEFAULT_DATE_FIELD.to_string()
}

fn default_user_field() -> String {
    DEFAULT_USER_FIELD.to_string()
}

/// One entry of the static follow list, as written in configuration.
///
/// ```toml
/// [[follow]]
/// model = "blog.Post"
/// manager = "published"
/// date_field = "published_at"
/// user_field = "author"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FollowSpec {
    /// `app_label.ModelName` reference.
    pub model: String,
    #[serde(default = "default_manager")]
    pub manager: String,
    #[serde(default = "default_date_field")]
    pub date_field: String,
    #[serde(default = "default_user_field")]
    pub user_field: String,
}

impl FollowSpec {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            manager: default_manager(),
            date_field: default_date_field(),
            user_field: default_user_field(),
        }
    }
}

/// Validated, immutable configuration of a followed type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FollowConfig {
    type_name: TypeName,
    qualifying_set: String,
    timestamp_path: FieldPath,
    user_field: String,
}

impl FollowConfig {
    /// A config with the default set, date field and user field.
    pub fn new(type_name: TypeName) -> Self {
        Self {
            type_name,
            qualifying_set: default_manager(),
            timestamp_path: FieldPath::field(DEFAULT_DATE_FIELD),
            user_field: default_user_field(),
        }
    }

    /// Resolves a configuration entry, filling defaults.
    pub fn from_spec(spec: &FollowSpec) -> Result<Self, ConfigError> {
        Ok(Self::new(TypeName::new(&spec.model)?)
            .qualifying_set(&spec.manager)
            .timestamp_path(&spec.date_field)?
            .user_field(&spec.user_field))
    }

    #[must_use]
    pub fn qualifying_set(mut self, set: &str) -> Self {
        self.qualifying_set = set.to_string();
        self
    }

    pub fn timestamp_path(mut self, path: &str) -> Result<Self, ConfigError> {
        self.timestamp_path = FieldPath::parse(path)?;
        Ok(self)
    }

    #[must_use]
    pub fn user_field(mut self, field: &str) -> Self {
        self.user_field = field.to_string();
        self
    }

    pub const fn type_name(&self) -> &TypeName {
        &self.type_name
    }

    pub fn set_name(&self) -> &str {
        &self.qualifying_set
    }

    pub const fn path(&self) -> &FieldPath {
        &self.timestamp_path
    }

    pub fn user_field_name(&self) -> &str {
        &self.user_field
    }
}
