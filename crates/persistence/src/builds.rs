//! Saved custom builds in SQLite.

use std::collections::BTreeSet;
use std::str::FromStr;

use chrono::{Local, Utc};
use rand::Rng;
use rig_core::{ComponentId, ComponentKind};
use rig_session::BuildPayload;
use serde::Serialize;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use thiserror::Error;
use tracing::{debug, info};

use crate::{sqlite_path, StoreError};

/// Fewest lines a build may have and still be saved.
pub const MIN_BUILD_COMPONENTS: usize = 4;

const SLUG_PREFIX: &str = "custom-";
const SLUG_LEN: usize = 10;
const SLUG_ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";

const SCHEMA: [&str; 2] = [
    "CREATE TABLE IF NOT EXISTS custom_builds (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        slug TEXT NOT NULL UNIQUE,
        name TEXT NOT NULL,
        summary TEXT NOT NULL,
        subtotal_cents INTEGER NOT NULL,
        estimated_wattage INTEGER NOT NULL,
        minimum_psu_wattage INTEGER NOT NULL,
        configuration TEXT NOT NULL,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS custom_build_components (
        build_id INTEGER NOT NULL REFERENCES custom_builds(id) ON DELETE CASCADE,
        position INTEGER NOT NULL,
        kind TEXT NOT NULL,
        component_id TEXT NOT NULL,
        PRIMARY KEY (build_id, position)
    )",
];

/// Reasons a payload is refused before anything is written.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("build has no components")]
    Empty,
    #[error("build needs at least {min} components, found {found}")]
    TooFewComponents { found: usize, min: usize },
    #[error("build lists more than one {0}")]
    DuplicateKind(ComponentKind),
    #[error("subtotal {declared} does not match line prices {computed}")]
    SubtotalMismatch { declared: u64, computed: u64 },
    #[error("subtotal {0} is out of range")]
    SubtotalOutOfRange(u64),
}

/// Check a payload coming from a session or an outside caller.
pub fn validate_payload(payload: &BuildPayload) -> Result<(), PayloadError> {
    let found = payload.components.len();
    if found == 0 {
        return Err(PayloadError::Empty);
    }
    if found < MIN_BUILD_COMPONENTS {
        return Err(PayloadError::TooFewComponents {
            found,
            min: MIN_BUILD_COMPONENTS,
        });
    }
    let mut kinds = BTreeSet::new();
    for line in &payload.components {
        if !kinds.insert(line.kind) {
            return Err(PayloadError::DuplicateKind(line.kind));
        }
    }
    let computed = payload
        .components
        .iter()
        .fold(0u64, |acc, line| acc.saturating_add(line.price_cents));
    if computed != payload.subtotal_cents {
        return Err(PayloadError::SubtotalMismatch {
            declared: payload.subtotal_cents,
            computed,
        });
    }
    if i64::try_from(computed).is_err() {
        return Err(PayloadError::SubtotalOutOfRange(computed));
    }
    Ok(())
}

/// `custom-` followed by ten URL-safe characters.
pub fn generate_slug<R: Rng + ?Sized>(rng: &mut R) -> String {
    let mut slug = String::with_capacity(SLUG_PREFIX.len() + SLUG_LEN);
    slug.push_str(SLUG_PREFIX);
    for _ in 0..SLUG_LEN {
        slug.push(char::from(SLUG_ALPHABET[rng.gen_range(0..SLUG_ALPHABET.len())]));
    }
    slug
}

/// Handle returned after a successful save.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedBuild {
    pub id: i64,
    pub slug: String,
    pub name: String,
}

/// One row of [`BuildStore::list`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildSummary {
    pub id: i64,
    pub slug: String,
    pub name: String,
    pub subtotal_cents: u64,
    pub estimated_wattage: u32,
    pub created_at: String,
}

/// Open (creating if needed) the database at `url` and ensure the schema.
pub async fn init_db(url: &str) -> Result<SqlitePool, StoreError> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true);
    // An in-memory database lives only as long as its connection.
    let pool = match sqlite_path(url) {
        Some(_) => SqlitePoolOptions::new().max_connections(4),
        None => SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None),
    }
    .connect_with(options)
    .await?;
    for statement in SCHEMA {
        sqlx::query(statement).execute(&pool).await?;
    }
    info!(%url, "build database ready");
    Ok(pool)
}

/// Saved-build repository over a SQLite pool.
#[derive(Clone, Debug)]
pub struct BuildStore {
    pool: SqlitePool,
}

impl BuildStore {
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        Ok(Self {
            pool: init_db(url).await?,
        })
    }

    pub fn from_pool(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Validate and store `payload`. Without a `name` the build is called
    /// "Custom Build" plus today's date.
    pub async fn save(
        &self,
        payload: &BuildPayload,
        name: Option<&str>,
    ) -> Result<SavedBuild, StoreError> {
        validate_payload(payload)?;
        let slug = generate_slug(&mut rand::thread_rng());
        let name = match name.map(str::trim).filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => format!("Custom Build {}", Local::now().format("%Y-%m-%d")),
        };
        let subtotal = i64::try_from(payload.subtotal_cents)
            .map_err(|_| PayloadError::SubtotalOutOfRange(payload.subtotal_cents))?;
        let configuration = serde_json::to_string(payload)?;

        let mut tx = self.pool.begin().await?;
        let id = sqlx::query(
            "INSERT INTO custom_builds
                (slug, name, summary, subtotal_cents, estimated_wattage,
                 minimum_psu_wattage, configuration, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&slug)
        .bind(&name)
        .bind("Saved from builder")
        .bind(subtotal)
        .bind(i64::from(payload.estimated_wattage))
        .bind(i64::from(payload.minimum_psu_wattage))
        .bind(&configuration)
        .bind(Utc::now().to_rfc3339())
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();
        for (position, line) in payload.components.iter().enumerate() {
            sqlx::query(
                "INSERT INTO custom_build_components (build_id, position, kind, component_id)
                 VALUES (?, ?, ?, ?)",
            )
            .bind(id)
            .bind(position as i64)
            .bind(line.kind.as_str())
            .bind(line.component_id.as_str())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        info!(id, %slug, lines = payload.components.len(), "saved build");
        Ok(SavedBuild { id, slug, name })
    }

    /// Stored `(kind, id)` pairs of a build in their saved order, or `None`
    /// for an unknown slug. Feed the result to `Selection::prefill`.
    pub async fn load_components(
        &self,
        slug: &str,
    ) -> Result<Option<Vec<(ComponentKind, ComponentId)>>, StoreError> {
        let Some(build) = sqlx::query("SELECT id FROM custom_builds WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?
        else {
            debug!(%slug, "no saved build");
            return Ok(None);
        };
        let build_id: i64 = build.try_get("id")?;
        let rows = sqlx::query(
            "SELECT kind, component_id FROM custom_build_components
             WHERE build_id = ? ORDER BY position",
        )
        .bind(build_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| -> Result<_, StoreError> {
                let kind: String = row.try_get("kind")?;
                let id: String = row.try_get("component_id")?;
                let kind = kind
                    .parse::<ComponentKind>()
                    .map_err(|err| StoreError::Corrupt(err.to_string()))?;
                Ok((kind, ComponentId::new(id)))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some)
    }

    /// The payload exactly as it was saved.
    pub async fn load_payload(&self, slug: &str) -> Result<Option<BuildPayload>, StoreError> {
        let row = sqlx::query("SELECT configuration FROM custom_builds WHERE slug = ?")
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?;
        match row {
            Some(row) => {
                let configuration: String = row.try_get("configuration")?;
                Ok(Some(serde_json::from_str(&configuration)?))
            }
            None => Ok(None),
        }
    }

    /// Every saved build, newest first.
    pub async fn list(&self) -> Result<Vec<BuildSummary>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, slug, name, subtotal_cents, estimated_wattage, created_at
             FROM custom_builds ORDER BY id DESC",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(summary_from_row).collect()
    }
}

fn summary_from_row(row: &SqliteRow) -> Result<BuildSummary, StoreError> {
    let subtotal: i64 = row.try_get("subtotal_cents")?;
    let wattage: i64 = row.try_get("estimated_wattage")?;
    Ok(BuildSummary {
        id: row.try_get("id")?,
        slug: row.try_get("slug")?,
        name: row.try_get("name")?,
        subtotal_cents: u64::try_from(subtotal)
            .map_err(|_| StoreError::Corrupt(format!("negative subtotal {subtotal}")))?,
        estimated_wattage: u32::try_from(wattage)
            .map_err(|_| StoreError::Corrupt(format!("wattage {wattage} out of range")))?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load_catalog;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;
    use rig_core::Catalog;
    use rig_session::{BuildLine, BuilderSession};
    use std::path::PathBuf;
    use std::sync::Arc;

    fn line(kind: ComponentKind, id: &str, price: u64) -> BuildLine {
        BuildLine {
            kind,
            component_id: ComponentId::new(id),
            price_cents: price,
        }
    }

    fn payload(lines: Vec<BuildLine>) -> BuildPayload {
        BuildPayload {
            subtotal_cents: lines.iter().map(|l| l.price_cents).sum(),
            estimated_wattage: 400,
            minimum_psu_wattage: 500,
            components: lines,
        }
    }

    fn four_lines() -> Vec<BuildLine> {
        vec![
            line(ComponentKind::Cpu, "cpu-1", 30000),
            line(ComponentKind::Motherboard, "mb-1", 20000),
            line(ComponentKind::Memory, "ram-1", 9000),
            line(ComponentKind::Case, "case-1", 8000),
        ]
    }

    async fn memory_store() -> BuildStore {
        BuildStore::connect("sqlite::memory:").await.unwrap()
    }

    #[test]
    fn payload_rules() {
        assert_eq!(validate_payload(&payload(vec![])), Err(PayloadError::Empty));
        let mut short = four_lines();
        short.pop();
        assert_eq!(
            validate_payload(&payload(short)),
            Err(PayloadError::TooFewComponents { found: 3, min: 4 })
        );
        let mut dup = four_lines();
        dup.push(line(ComponentKind::Cpu, "cpu-2", 1));
        assert_eq!(
            validate_payload(&payload(dup)),
            Err(PayloadError::DuplicateKind(ComponentKind::Cpu))
        );
        let mut wrong = payload(four_lines());
        wrong.subtotal_cents += 1;
        assert_eq!(
            validate_payload(&wrong),
            Err(PayloadError::SubtotalMismatch {
                declared: 67001,
                computed: 67000
            })
        );
        assert_eq!(validate_payload(&payload(four_lines())), Ok(()));
    }

    #[test]
    fn slugs_are_prefixed_and_seeded() {
        let a = generate_slug(&mut ChaCha8Rng::seed_from_u64(7));
        let b = generate_slug(&mut ChaCha8Rng::seed_from_u64(7));
        assert_eq!(a, b);
        assert_eq!(a.len(), 17);
        let suffix = a.strip_prefix("custom-").unwrap();
        assert!(suffix.bytes().all(|ch| SLUG_ALPHABET.contains(&ch)));
    }

    #[tokio::test]
    async fn save_then_reload() {
        let store = memory_store().await;
        let build = payload(four_lines());
        let saved = store.save(&build, None).await.unwrap();
        assert!(saved.slug.starts_with("custom-"));
        assert!(saved.name.starts_with("Custom Build "));

        let entries = store.load_components(&saved.slug).await.unwrap().unwrap();
        assert_eq!(entries, build.entries().collect::<Vec<_>>());
        assert_eq!(store.load_payload(&saved.slug).await.unwrap(), Some(build));

        let listed = store.list().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, saved.id);
        assert_eq!(listed[0].subtotal_cents, 67000);
        assert_eq!(listed[0].estimated_wattage, 400);
    }

    #[tokio::test]
    async fn custom_names_are_kept_and_listed_newest_first() {
        let store = memory_store().await;
        let first = store.save(&payload(four_lines()), Some("  ")).await.unwrap();
        let second = store
            .save(&payload(four_lines()), Some("Studio rig"))
            .await
            .unwrap();
        assert_eq!(second.name, "Studio rig");
        assert_ne!(first.slug, second.slug);
        let names: Vec<_> = store.list().await.unwrap().into_iter().map(|b| b.name).collect();
        assert_eq!(names[0], "Studio rig");
        assert!(names[1].starts_with("Custom Build "));
    }

    #[tokio::test]
    async fn invalid_payload_writes_nothing() {
        let store = memory_store().await;
        let mut lines = four_lines();
        lines.truncate(2);
        let err = store.save(&payload(lines), None).await.unwrap_err();
        assert!(matches!(
            err,
            StoreError::Payload(PayloadError::TooFewComponents { found: 2, .. })
        ));
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn unknown_slug_is_none() {
        let store = memory_store().await;
        assert_eq!(store.load_components("custom-nope").await.unwrap(), None);
        assert_eq!(store.load_payload("custom-nope").await.unwrap(), None);
    }

    #[tokio::test]
    async fn schema_creation_is_idempotent() {
        let store = memory_store().await;
        for statement in SCHEMA {
            sqlx::query(statement).execute(store.pool()).await.unwrap();
        }
        assert!(store.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn sample_catalog_build_round_trips() {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../assets/catalog.json");
        let catalog: Arc<Catalog> = Arc::new(load_catalog(path).await.unwrap());
        let mut session = BuilderSession::new(Arc::clone(&catalog));
        for (kind, id) in [
            (ComponentKind::Cpu, "intel-core-i9-14900k"),
            (ComponentKind::Motherboard, "asus-rog-maximus-z790-hero"),
            (ComponentKind::Gpu, "nvidia-geforce-rtx-4090"),
            (ComponentKind::Memory, "corsair-dominator-32gb-ddr5-6000"),
            (ComponentKind::Storage, "samsung-990-pro-2tb"),
            (ComponentKind::PowerSupply, "corsair-hx1000i"),
            (ComponentKind::Cooling, "nzxt-kraken-elite-360"),
            (ComponentKind::Case, "lian-li-o11-dynamic-evo"),
        ] {
            session.select_id(kind, &ComponentId::new(id)).unwrap();
        }
        assert!(session.is_complete());
        // 150 + 253 + 450 + 1000 W rated PSU.
        assert_eq!(session.totals().estimated_wattage, 1853);
        assert_eq!(session.totals().minimum_psu_wattage, 2317);

        // The rest of the build needs 1067 W, so a 1000 W unit falls short.
        let conflicts = session.conflicts();
        assert_eq!(conflicts.len(), 1);
        assert_eq!(conflicts[0].kind, ComponentKind::PowerSupply);
        session
            .select_id(
                ComponentKind::PowerSupply,
                &ComponentId::new("seasonic-vertex-1200"),
            )
            .unwrap();
        assert!(session.conflicts().is_empty());
        assert_eq!(session.totals().estimated_wattage, 2053);

        let store = memory_store().await;
        let build = session.serialize();
        let saved = store.save(&build, Some("Creator tower")).await.unwrap();
        let entries = store.load_components(&saved.slug).await.unwrap().unwrap();
        let restored = BuilderSession::prefilled(catalog, entries);
        assert_eq!(restored.selection(), session.selection());
        assert_eq!(restored.serialize(), build);
    }
}
