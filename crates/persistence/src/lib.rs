#![deny(warnings)]

//! Persistence layer: catalog loading and saved custom builds.
//!
//! The catalog is read once from a JSON or YAML file and handed to the
//! engine as an immutable [`rig_core::Catalog`]. Finished builds are
//! stored in SQLite through `sqlx`.

mod builds;
mod catalog;

pub use builds::{
    generate_slug, init_db, validate_payload, BuildStore, BuildSummary, PayloadError, SavedBuild,
    MIN_BUILD_COMPONENTS,
};
pub use catalog::{load_catalog, parse_catalog, CatalogFormat, ComponentRecord};

use rig_core::ValidationError;
use thiserror::Error;

/// Errors from catalog files and the build database.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error("build rejected: {0}")]
    Payload(#[from] PayloadError),
    #[error("database: {0}")]
    Database(#[from] sqlx::Error),
    /// A stored row could not be mapped back to engine types.
    #[error("corrupt build record: {0}")]
    Corrupt(String),
}

/// Returns the default SQLite URL used for saved builds.
pub fn default_sqlite_url() -> &'static str {
    "sqlite://./saves/builds.db"
}

/// Filesystem path behind a `sqlite:` URL, if it names a file.
pub fn sqlite_path(url: &str) -> Option<&str> {
    let path = url
        .strip_prefix("sqlite://")
        .or_else(|| url.strip_prefix("sqlite:"))?;
    let path = path.split('?').next().unwrap_or(path);
    (!path.is_empty() && path != ":memory:").then_some(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_is_sqlite() {
        assert!(default_sqlite_url().starts_with("sqlite://"));
        assert_eq!(sqlite_path(default_sqlite_url()), Some("./saves/builds.db"));
    }

    #[test]
    fn memory_urls_have_no_path() {
        assert_eq!(sqlite_path("sqlite::memory:"), None);
        assert_eq!(sqlite_path("sqlite://:memory:"), None);
        assert_eq!(sqlite_path("sqlite:data/x.db?mode=rwc"), Some("data/x.db"));
        assert_eq!(sqlite_path("postgres://db"), None);
    }
}
