//! Startup wiring: database, registry and synchronizer.

use std::sync::{Arc, Weak};

use anyhow::{Context, Result};
use tl_core::{Catalog, LifecycleListener, Registry, Synchronizer, Timeline, TypeName};
use tl_db::Database;

use crate::Config;

/// The running engine, with the synchronizer subscribed to the database.
pub struct App {
    pub config: Config,
    pub catalog: Catalog,
    pub db: Arc<Database>,
    pub sync: Arc<Synchronizer<Database, Database>>,
    pub timeline: Timeline<Database, Database>,
}

impl App {
    /// Opens the configured database, creating its directory if needed.
    pub fn open(config: Config) -> Result<Self> {
        if let Some(parent) = config.database_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create database directory")?;
        }
        let db = Database::open(&config.database_path)
            .with_context(|| format!("failed to open {}", config.database_path.display()))?;
        Ok(Self::with_database(config, db))
    }

    /// Wires the engine over an already-open database.
    pub fn with_database(config: Config, db: Database) -> Self {
        let catalog = Catalog::from_entities(config.entity_types.iter().cloned());
        let registry = Arc::new(Registry::from_specs(&config.follow, &catalog));
        tracing::debug!(
            known = catalog.len(),
            followed = registry.len(),
            "registry built"
        );

        let db = Arc::new(db);
        let sync = Arc::new(Synchronizer::new(
            Arc::clone(&registry),
            Arc::clone(&db),
            Arc::clone(&db),
        ));
        let listener: Weak<dyn LifecycleListener> = Arc::downgrade(&sync) as Weak<_>;
        db.subscribe(listener);
        let timeline = Timeline::new(registry, Arc::clone(&db), Arc::clone(&db));

        Self {
            config,
            catalog,
            db,
            sync,
            timeline,
        }
    }

    pub fn registry(&self) -> &Registry {
        self.sync.registry()
    }

    /// Parses a type label given on the command line.
    pub fn type_name(label: &str) -> Result<TypeName> {
        TypeName::new(label).with_context(|| format!("invalid type {label:?}"))
    }

    /// Limit for feed commands: the explicit one, else the configured default.
    pub fn feed_limit(&self, limit: Option<usize>) -> usize {
        limit.unwrap_or(self.config.feed_limit)
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    use tl_core::{EntityType, FieldKind, FieldValue, FollowSpec, SetFilter};

    /// Config following `blog.Post` (published set) and `photos.Upload`.
    pub fn config() -> Config {
        let post = EntityType::new("blog", "Post")
            .field("author", FieldKind::User)
            .field("title", FieldKind::Text)
            .field("published", FieldKind::Bool)
            .field("published_at", FieldKind::Timestamp)
            .set(
                "published",
                SetFilter::FieldEquals {
                    field: "published".to_string(),
                    value: FieldValue::Bool(true),
                },
            )
            .display_field("title")
            .url_template("/blog/{id}/");
        let upload = EntityType::new("photos", "Upload")
            .field("user", FieldKind::User)
            .field("date_published", FieldKind::Timestamp)
            .field("event", FieldKind::Object);

        Config {
            database_path: "unused.db".into(),
            feed_limit: 15,
            entity_types: vec![post, upload],
            follow: vec![
                FollowSpec {
                    model: "blog.Post".to_string(),
                    manager: "published".to_string(),
                    date_field: "published_at".to_string(),
                    user_field: "author".to_string(),
                },
                FollowSpec::new("photos.Upload"),
            ],
        }
    }

    pub fn app() -> App {
        App::with_database(config(), Database::open_in_memory().expect("open in-memory db"))
    }
}
