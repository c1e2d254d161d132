//! Catalog files: JSON or YAML lists of component records.

use std::path::Path;

use rig_core::{
    sort_recommended_first, validate_catalog, Catalog, Compatibility, Component, ComponentId,
    ComponentKind,
};
use serde::Deserialize;
use serde_json::Value;
use tracing::{info, warn};

use crate::StoreError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CatalogFormat {
    Json,
    Yaml,
}

impl CatalogFormat {
    /// `.yaml`/`.yml` files are YAML, everything else is JSON.
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("yaml") || ext.eq_ignore_ascii_case("yml") => {
                CatalogFormat::Yaml
            }
            _ => CatalogFormat::Json,
        }
    }
}

/// One component as written by the catalog provider.
///
/// `compatibility` may be an embedded object or a JSON document stored as a
/// string; either way an unreadable descriptor degrades to "no constraints".
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRecord {
    #[serde(alias = "slug")]
    pub id: String,
    pub kind: String,
    pub name: String,
    #[serde(default)]
    pub brand: String,
    #[serde(default)]
    pub description: String,
    pub price_cents: u64,
    #[serde(default)]
    pub is_recommended: bool,
    #[serde(default)]
    pub compatibility: Option<Value>,
}

impl ComponentRecord {
    pub fn into_component(self) -> Result<Component, StoreError> {
        let kind: ComponentKind = self.kind.parse()?;
        let id = ComponentId::new(self.id);
        let compatibility = match self.compatibility {
            None | Some(Value::Null) => Compatibility::default(),
            Some(Value::String(raw)) => Compatibility::parse_or_default(&id, Some(&raw)),
            Some(value) => Compatibility::from_value(value).unwrap_or_else(|err| {
                warn!(component = %id, %err, "ignoring compatibility descriptor");
                Compatibility::default()
            }),
        };
        Ok(Component {
            id,
            kind,
            name: self.name,
            brand: self.brand,
            description: self.description,
            price_cents: self.price_cents,
            is_recommended: self.is_recommended,
            compatibility,
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CatalogFile {
    Wrapped { components: Vec<ComponentRecord> },
    Bare(Vec<ComponentRecord>),
}

impl CatalogFile {
    fn into_records(self) -> Vec<ComponentRecord> {
        match self {
            CatalogFile::Wrapped { components } | CatalogFile::Bare(components) => components,
        }
    }
}

/// Parse, validate and order a catalog document.
///
/// Components come back recommended-first, then by ascending price.
pub fn parse_catalog(text: &str, format: CatalogFormat) -> Result<Catalog, StoreError> {
    let file: CatalogFile = match format {
        CatalogFormat::Json => serde_json::from_str(text)?,
        CatalogFormat::Yaml => serde_yaml::from_str(text)?,
    };
    let mut components = file
        .into_records()
        .into_iter()
        .map(ComponentRecord::into_component)
        .collect::<Result<Vec<_>, _>>()?;
    validate_catalog(&components)?;
    sort_recommended_first(&mut components);
    Ok(Catalog::new(components))
}

/// Read a catalog file. The format follows the file extension.
pub async fn load_catalog(path: impl AsRef<Path>) -> Result<Catalog, StoreError> {
    let path = path.as_ref();
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| StoreError::Io {
            path: path.display().to_string(),
            source,
        })?;
    let catalog = parse_catalog(&text, CatalogFormat::from_path(path))?;
    info!(path = %path.display(), components = catalog.len(), "catalog loaded");
    Ok(catalog)
}
