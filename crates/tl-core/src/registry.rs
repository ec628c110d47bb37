//! Registry of followed record types.
//!
//! Built once at startup, then shared read-only behind an `Arc`.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::config::{ConfigError, FollowConfig, FollowSpec};
use crate::entity::EntityType;
use crate::qualify::check_config;
use crate::types::{TypeName, ValidationError};

/// A model reference could not be resolved against the catalog.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ResolutionError {
    #[error("invalid model reference {label:?}: {source}")]
    InvalidLabel {
        label: String,
        #[source]
        source: ValidationError,
    },

    #[error("unknown model {0}")]
    UnknownModel(TypeName),
}

/// Record types known to the host, whether followed or not.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entities: BTreeMap<TypeName, EntityType>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a catalog, skipping descriptors with an invalid name.
    pub fn from_entities(entities: impl IntoIterator<Item = EntityType>) -> Self {
        let mut catalog = Self::new();
        for entity in entities {
            if let Err(e) = catalog.insert(entity) {
                tracing::warn!(error = %e, "skipping entity type with invalid name");
            }
        }
        catalog
    }

    /// Adds a descriptor, replacing any earlier one with the same name.
    pub fn insert(&mut self, entity: EntityType) -> Result<TypeName, ValidationError> {
        let type_name = entity.type_name()?;
        self.entities.insert(type_name.clone(), entity);
        Ok(type_name)
    }

    /// Resolves an `app_label.ModelName` reference, case-insensitively.
    pub fn resolve(&self, label: &str) -> Result<&EntityType, ResolutionError> {
        let type_name = TypeName::new(label).map_err(|source| ResolutionError::InvalidLabel {
            label: label.to_string(),
            source,
        })?;
        self.entities
            .get(&type_name)
            .ok_or(ResolutionError::UnknownModel(type_name))
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}

/// A followed type: its descriptor and validated configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct FollowedType {
    pub entity: EntityType,
    pub config: FollowConfig,
}

impl FollowedType {
    pub const fn type_name(&self) -> &TypeName {
        self.config.type_name()
    }
}

/// Followed types keyed by lowercase type name.
#[derive(Debug, Clone, Default)]
pub struct Registry {
    followed: BTreeMap<TypeName, FollowedType>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Follows a type.
    ///
    /// Returns `Ok(false)` if the type is already followed; the first
    /// registration is kept.
    pub fn register(&mut self, entity: EntityType, config: FollowConfig) -> Result<bool, ConfigError> {
        check_config(&entity, &config)?;
        let type_name = config.type_name().clone();
        if self.followed.contains_key(&type_name) {
            tracing::warn!(%type_name, "type is already followed, keeping first registration");
            return Ok(false);
        }
        tracing::debug!(
            %type_name,
            set = config.set_name(),
            path = %config.path(),
            user_field = config.user_field_name(),
            "following type"
        );
        self.followed
            .insert(type_name, FollowedType { entity, config });
        Ok(true)
    }

    /// Builds a registry from configuration entries.
    ///
    /// Entries that cannot be resolved or validated are logged and skipped.
    pub fn from_specs(specs: &[FollowSpec], catalog: &Catalog) -> Self {
        let mut registry = Self::new();
        for spec in specs {
            let entity = match catalog.resolve(&spec.model) {
                Ok(entity) => entity.clone(),
                Err(e) => {
                    tracing::warn!(model = %spec.model, error = %e, "skipping unresolvable follow entry");
                    continue;
                }
            };
            let registered = FollowConfig::from_spec(spec)
                .and_then(|config| registry.register(entity, config));
            if let Err(e) = registered {
                tracing::warn!(model = %spec.model, error = %e, "skipping invalid follow entry");
            }
        }
        registry
    }

    /// Looks up a followed type by name, case-insensitively.
    pub fn resolve(&self, label: &str) -> Option<&FollowedType> {
        let type_name = TypeName::new(label).ok()?;
        self.followed.get(&type_name)
    }

    pub fn get(&self, type_name: &TypeName) -> Option<&FollowedType> {
        self.followed.get(type_name)
    }

    pub fn entity(&self, type_name: &TypeName) -> Option<&EntityType> {
        self.get(type_name).map(|followed| &followed.entity)
    }

    pub fn is_followed(&self, type_name: &TypeName) -> bool {
        self.followed.contains_key(type_name)
    }

    /// Followed types in name order.
    pub fn iter(&self) -> impl Iterator<Item = &FollowedType> {
        self.followed.values()
    }

    pub fn type_names(&self) -> impl Iterator<Item = &TypeName> {
        self.followed.keys()
    }

    pub fn len(&self) -> usize {
        self.followed.len()
    }

    pub fn is_empty(&self) -> bool {
        self.followed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::entity::FieldKind;

    fn post_type() -> EntityType {
        EntityType::new("blog", "Post")
            .field("user", FieldKind::User)
            .field("date_published", FieldKind::Timestamp)
    }

    fn photo_type() -> EntityType {
        EntityType::new("photos", "Upload")
            .field("owner", FieldKind::User)
            .field("taken_at", FieldKind::Timestamp)
    }

    fn catalog() -> Catalog {
        Catalog::from_entities([post_type(), photo_type()])
    }

    #[test]
    fn catalog_resolves_case_insensitively() {
        let catalog = catalog();
        assert_eq!(catalog.resolve("blog.Post").unwrap().model, "Post");
        assert_eq!(catalog.resolve("BLOG.POST").unwrap().model, "Post");
        assert!(matches!(
            catalog.resolve("blog.comment"),
            Err(ResolutionError::UnknownModel(_))
        ));
        assert!(matches!(
            catalog.resolve("post"),
            Err(ResolutionError::InvalidLabel { .. })
        ));
    }

    #[test]
    fn catalog_skips_invalid_descriptors() {
        let catalog = Catalog::from_entities([post_type(), EntityType::new("", "Thing")]);
        assert_eq!(catalog.len(), 1);
    }

    #[test]
    fn register_then_resolve() {
        let mut registry = Registry::new();
        let config = FollowConfig::new(TypeName::new("blog.post").unwrap());
        assert_eq!(registry.register(post_type(), config), Ok(true));

        let followed = registry.resolve("Blog.Post").unwrap();
        assert_eq!(followed.type_name().as_str(), "blog.post");
        assert!(registry.resolve("photos.upload").is_none());
        assert!(registry.resolve("not a label").is_none());
    }

    #[test]
    fn first_registration_wins() {
        let mut registry = Registry::new();
        let first = FollowConfig::new(TypeName::new("blog.post").unwrap());
        let second = first.clone().timestamp_path("date_published.date").unwrap();
        assert_eq!(registry.register(post_type(), first.clone()), Ok(true));
        assert_eq!(registry.register(post_type(), second), Ok(false));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.iter().next().unwrap().config, first);
    }

    #[test]
    fn invalid_config_is_not_registered() {
        let mut registry = Registry::new();
        let config = FollowConfig::new(TypeName::new("photos.upload").unwrap());
        let err = registry.register(photo_type(), config).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownField { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn from_specs_skips_bad_entries() {
        let specs = vec![
            FollowSpec::new("blog.Post"),
            FollowSpec::new("blog.Comment"),
            FollowSpec::new("nodot"),
            // default user/date fields do not exist on uploads
            FollowSpec::new("photos.Upload"),
            FollowSpec {
                model: "photos.Upload".to_string(),
                manager: "all".to_string(),
                date_field: "taken_at".to_string(),
                user_field: "owner".to_string(),
            },
        ];
        let registry = Registry::from_specs(&specs, &catalog());
        let names: Vec<&str> = registry.type_names().map(TypeName::as_str).collect();
        assert_eq!(names, ["blog.post", "photos.upload"]);
        assert_eq!(
            registry
                .get(&TypeName::new("photos.upload").unwrap())
                .unwrap()
                .config
                .user_field_name(),
            "owner"
        );
    }
}
