//! Decides whether a record currently belongs in timelines.

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::{ConfigError, FollowConfig};
use crate::entity::{EntityType, FieldKind};
use crate::path::NotATimestamp;
use crate::record::{FieldValue, Record};
use crate::registry::FollowedType;
use crate::store::{RecordStore, StoreError};
use crate::types::{TypeName, UserId};

/// Result of evaluating a record against its follow configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Qualification {
    Qualified {
        user: UserId,
        timestamp: DateTime<Utc>,
    },
    Disqualified(Disqualified),
}

/// Why a record does not belong in timelines.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disqualified {
    /// The record has no primary key yet.
    Unsaved,
    /// The record is not in the qualifying set.
    NotInSet,
    /// The timestamp path led to a missing or null value.
    NoTimestamp,
    /// The user field is missing or null.
    NoUser,
}

impl Disqualified {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Unsaved => "unsaved",
            Self::NotInSet => "not_in_set",
            Self::NoTimestamp => "no_timestamp",
            Self::NoUser => "no_user",
        }
    }
}

/// Evaluation failures. Absence is never an error; these are type
/// mismatches the registration checks could not rule out, or storage
/// failures.
#[derive(Debug, Error)]
pub enum QualifyError {
    #[error(transparent)]
    NotATimestamp(#[from] NotATimestamp),

    #[error("{type_name}.{field} holds a {found} value, expected a user")]
    NotAUser {
        type_name: TypeName,
        field: String,
        found: &'static str,
    },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Evaluates a record of a followed type.
///
/// Set membership is checked against the store; the timestamp and user
/// are read from the given in-memory record.
pub fn evaluate<S>(
    record: &Record,
    followed: &FollowedType,
    store: &S,
) -> Result<Qualification, QualifyError>
where
    S: RecordStore + ?Sized,
{
    let Some(source) = record.generic_ref() else {
        return Ok(Qualification::Disqualified(Disqualified::Unsaved));
    };
    let config = &followed.config;

    if store
        .find_in_set(&followed.entity, config.set_name(), &source)?
        .is_none()
    {
        return Ok(Qualification::Disqualified(Disqualified::NotInSet));
    }

    let Some(timestamp) = config.path().resolve_timestamp(&record.fields)? else {
        return Ok(Qualification::Disqualified(Disqualified::NoTimestamp));
    };

    let user = match record.get(config.user_field_name()) {
        None | Some(FieldValue::Null) => {
            return Ok(Qualification::Disqualified(Disqualified::NoUser));
        }
        Some(FieldValue::User(user)) => user.clone(),
        Some(other) => {
            return Err(QualifyError::NotAUser {
                type_name: record.type_name.clone(),
                field: config.user_field_name().to_string(),
                found: other.kind_name(),
            });
        }
    };

    Ok(Qualification::Qualified { user, timestamp })
}

/// Checks a follow configuration against the type's declared fields.
///
/// Everything that can be known without a record is checked here: the
/// qualifying set exists, the user field is a user, and the first
/// segment of the timestamp path can lead to a timestamp.
pub fn check_config(entity: &EntityType, config: &FollowConfig) -> Result<(), ConfigError> {
    let type_name = entity.type_name()?;
    if &type_name != config.type_name() {
        return Err(ConfigError::TypeMismatch {
            config: config.type_name().clone(),
            entity: type_name,
        });
    }

    if entity.set_filter(config.set_name()).is_none() {
        return Err(ConfigError::UnknownSet {
            type_name,
            set: config.set_name().to_string(),
        });
    }

    let user_field = config.user_field_name();
    match entity.field_kind(user_field) {
        None => {
            return Err(ConfigError::UnknownField {
                type_name,
                field: user_field.to_string(),
            });
        }
        Some(FieldKind::User) => {}
        Some(actual) => {
            return Err(ConfigError::FieldKind {
                type_name,
                field: user_field.to_string(),
                expected: "user",
                actual,
            });
        }
    }

    let path = config.path();
    let first = path.first();
    match entity.field_kind(first) {
        None => Err(ConfigError::UnknownField {
            type_name,
            field: first.to_string(),
        }),
        Some(FieldKind::Timestamp) => {
            if path.len() > 1 {
                tracing::debug!(
                    %type_name,
                    path = %path,
                    "timestamp path stops early at its first segment"
                );
            }
            Ok(())
        }
        Some(FieldKind::Object) if path.len() > 1 => Ok(()),
        Some(actual) => Err(ConfigError::FieldKind {
            type_name,
            field: first.to_string(),
            expected: if path.len() > 1 {
                "timestamp or object"
            } else {
                "timestamp"
            },
            actual,
        }),
    }
}
