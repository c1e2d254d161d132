//! Optional YAML settings for the CLI. Command-line flags take precedence.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

pub const DEFAULT_CATALOG: &str = "assets/catalog.json";

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    pub catalog_path: Option<PathBuf>,
    pub database_url: Option<String>,
    /// `EnvFilter` directive used when `RUST_LOG` is unset.
    pub log_filter: Option<String>,
}

impl CliConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        Ok(serde_yaml::from_str(text)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_all_keys() {
        let cfg = CliConfig::parse(
            "catalog_path: data/parts.yaml\ndatabase_url: 'sqlite::memory:'\nlog_filter: debug\n",
        )
        .unwrap();
        assert_eq!(cfg.catalog_path, Some(PathBuf::from("data/parts.yaml")));
        assert_eq!(cfg.database_url.as_deref(), Some("sqlite::memory:"));
        assert_eq!(cfg.log_filter.as_deref(), Some("debug"));
    }

    #[test]
    fn empty_file_is_default() {
        assert_eq!(CliConfig::parse("\n").unwrap(), CliConfig::default());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(CliConfig::parse("catalog: x.json\n").is_err());
    }
}
