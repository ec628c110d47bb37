//! Configuration loading and management.

use std::fmt;
use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use serde::{Deserialize, Serialize};
use tl_core::{DEFAULT_FEED_LIMIT, EntityType, FollowSpec};

const fn default_feed_limit() -> usize {
    DEFAULT_FEED_LIMIT
}

/// Application configuration.
///
/// ```toml
/// database_path = "/var/lib/tl/tl.db"
/// feed_limit = 15
///
/// [[entity_types]]
/// app_label = "blog"
/// model = "Post"
/// display_field = "title"
/// fields = { author = "user", title = "text", published_at = "timestamp" }
///
/// [[follow]]
/// model = "blog.Post"
/// date_field = "published_at"
/// user_field = "author"
/// ```
#[derive(Clone, Serialize, Deserialize)]
pub struct Config {
    /// Path to the database file.
    pub database_path: PathBuf,

    /// Entries shown by feed commands when no limit is given.
    #[serde(default = "default_feed_limit")]
    pub feed_limit: usize,

    /// Record types known to this installation.
    #[serde(default)]
    pub entity_types: Vec<EntityType>,

    /// Record types to follow.
    #[serde(default)]
    pub follow: Vec<FollowSpec>,
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("database_path", &self.database_path)
            .field("feed_limit", &self.feed_limit)
            .field("entity_types", &self.entity_types.len())
            .field("follow", &self.follow)
            .finish()
    }
}

impl Default for Config {
    fn default() -> Self {
        let data_dir = dirs_data_path().unwrap_or_else(|| PathBuf::from("."));
        Self {
            database_path: data_dir.join("tl.db"),
            feed_limit: DEFAULT_FEED_LIMIT,
            entity_types: Vec::new(),
            follow: Vec::new(),
        }
    }
}

impl Config {
    /// Loads configuration from default locations, optionally merging a
    /// specific file on top.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (TL_*)
        figment = figment.merge(Env::prefixed("TL_"));

        figment.extract()
    }
}

/// Returns the platform-specific config directory for tl.
fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("tl"))
}

/// Returns the platform-specific data directory for tl.
///
/// On Linux: `~/.local/share/tl`
pub fn dirs_data_path() -> Option<PathBuf> {
    dirs::data_dir().map(|p| p.join("tl"))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::io::Write;

    use tl_core::{FieldKind, SetFilter};

    #[test]
    fn test_dirs_data_path_ends_with_tl() {
        let path = dirs_data_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "tl");
    }

    #[test]
    fn test_default_config_uses_data_dir_for_db() {
        let config = Config::default();
        let data_dir = dirs_data_path().unwrap();
        assert_eq!(config.database_path, data_dir.join("tl.db"));
        assert_eq!(config.feed_limit, 15);
        assert!(config.follow.is_empty());
    }

    #[test]
    fn test_config_file_declares_types_and_follows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
database_path = "/tmp/tl-test.db"
feed_limit = 5

[[entity_types]]
app_label = "blog"
model = "Post"
display_field = "title"
fields = {{ author = "user", published = "bool", published_at = "timestamp" }}

[entity_types.sets.published]
filter = "field_equals"
field = "published"
value = {{ kind = "bool", value = true }}

[[follow]]
model = "blog.Post"
manager = "published"
date_field = "published_at"
user_field = "author"

[[follow]]
model = "photos.Upload"
"#
        )
        .unwrap();
        file.flush().unwrap();

        let config = Config::load_from(Some(file.path())).unwrap();
        assert_eq!(config.database_path, PathBuf::from("/tmp/tl-test.db"));
        assert_eq!(config.feed_limit, 5);

        let post = &config.entity_types[0];
        assert_eq!(post.field_kind("author"), Some(FieldKind::User));
        assert!(matches!(
            post.set_filter("published"),
            Some(SetFilter::FieldEquals { field, .. }) if field == "published"
        ));

        assert_eq!(config.follow.len(), 2);
        assert_eq!(config.follow[0].user_field, "author");
        assert_eq!(config.follow[1], FollowSpec::new("photos.Upload"));
    }
}
