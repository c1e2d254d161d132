#![deny(warnings)]

//! Headless PC builder: load a catalog, apply selections, report
//! compatibility and totals, optionally save the build.

mod config;

use std::fmt::{self, Write as _};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use config::{CliConfig, DEFAULT_CATALOG};
use persistence::{default_sqlite_url, sqlite_path, BuildStore};
use rig_core::ComponentId;
use rig_power::format_cents;
use rig_session::BuilderSession;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: rig [--catalog PATH] [--config PATH] [--db URL] \
[--build SLUG] [--select ID[,ID...]]... [--save [--name NAME]] [--list] [--json] [--version]";

#[derive(Debug, Default, PartialEq, Eq)]
struct Args {
    catalog: Option<PathBuf>,
    config: Option<PathBuf>,
    db: Option<String>,
    build: Option<String>,
    select: Vec<String>,
    save: bool,
    name: Option<String>,
    list: bool,
    json: bool,
    version: bool,
}

fn parse_args<I: IntoIterator<Item = String>>(args: I) -> Result<Args> {
    let mut parsed = Args::default();
    let mut it = args.into_iter();
    while let Some(arg) = it.next() {
        let mut value = |flag: &str| it.next().with_context(|| format!("{flag} needs a value"));
        match arg.as_str() {
            "--catalog" => parsed.catalog = Some(value("--catalog")?.into()),
            "--config" => parsed.config = Some(value("--config")?.into()),
            "--db" => parsed.db = Some(value("--db")?),
            "--build" => parsed.build = Some(value("--build")?),
            "--select" => parsed.select.extend(
                value("--select")?
                    .split(',')
                    .map(str::trim)
                    .filter(|id| !id.is_empty())
                    .map(String::from),
            ),
            "--name" => parsed.name = Some(value("--name")?),
            "--save" => parsed.save = true,
            "--list" => parsed.list = true,
            "--json" => parsed.json = true,
            "--version" | "-V" => parsed.version = true,
            other => bail!("unknown argument {other:?}\n{USAGE}"),
        }
    }
    Ok(parsed)
}

async fn open_store(url: &str) -> Result<BuildStore> {
    if let Some(parent) = sqlite_path(url).and_then(|p| std::path::Path::new(p).parent()) {
        std::fs::create_dir_all(parent)?;
    }
    Ok(BuildStore::connect(url).await?)
}

/// Human-readable report of the current session.
fn render_summary(session: &BuilderSession) -> Result<String, fmt::Error> {
    let snapshot = session.snapshot();
    let mut out = String::new();
    writeln!(
        out,
        "Build progress: {}/{} required steps",
        snapshot.completed, snapshot.required
    )?;
    for step in session.steps() {
        let options = snapshot.candidates.get(step.kind).len();
        match snapshot.selection.get(step.kind) {
            Some(c) => {
                writeln!(
                    out,
                    "  {:<18} {:<44} {:>12}",
                    step.label,
                    c.name,
                    format_cents(c.price_cents)
                )?;
            }
            None => {
                let hint = if step.optional { "optional" } else { "required" };
                writeln!(
                    out,
                    "  {:<18} - ({hint}, {options} compatible options)",
                    step.label
                )?;
            }
        }
    }
    let totals = snapshot.totals;
    writeln!(
        out,
        "Subtotal: {} | Estimated draw: {} W | Minimum PSU: {} W",
        format_cents(totals.subtotal_cents),
        totals.estimated_wattage,
        totals.minimum_psu_wattage
    )?;
    if !snapshot.conflicts.is_empty() {
        writeln!(out, "Conflicts:")?;
        for conflict in &snapshot.conflicts {
            writeln!(
                out,
                "  {} {}: {}",
                conflict.kind, conflict.component_id, conflict.reason
            )?;
        }
    }
    Ok(out)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = parse_args(std::env::args().skip(1))?;
    if args.version {
        println!(
            "rig {} ({} {})",
            env!("CARGO_PKG_VERSION"),
            env!("GIT_SHA"),
            env!("BUILD_DATE")
        );
        return Ok(());
    }
    let cfg = match &args.config {
        Some(path) => CliConfig::load(path)?,
        None => CliConfig::default(),
    };

    // Logging setup; stdout is reserved for reports and JSON.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.log_filter.as_deref().unwrap_or("info")));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let db_url = args
        .db
        .clone()
        .or(cfg.database_url.clone())
        .unwrap_or_else(|| default_sqlite_url().to_string());

    if args.list {
        let store = open_store(&db_url).await?;
        let builds = store.list().await?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&builds)?);
        } else {
            for b in &builds {
                println!(
                    "{:<18} {:<32} {:>12} {:>6} W  {}",
                    b.slug,
                    b.name,
                    format_cents(b.subtotal_cents),
                    b.estimated_wattage,
                    b.created_at
                );
            }
        }
        return Ok(());
    }

    let catalog_path = args
        .catalog
        .clone()
        .or(cfg.catalog_path.clone())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CATALOG));
    let catalog = Arc::new(persistence::load_catalog(&catalog_path).await?);
    info!(path = %catalog_path.display(), parts = catalog.len(), "starting builder");

    let mut store = None;
    let mut session = match &args.build {
        Some(slug) => {
            let opened = open_store(&db_url).await?;
            let Some(entries) = opened.load_components(slug).await? else {
                bail!("no saved build named {slug}");
            };
            store = Some(opened);
            BuilderSession::prefilled(Arc::clone(&catalog), entries)
        }
        None => BuilderSession::new(Arc::clone(&catalog)),
    };

    for id in &args.select {
        let id = ComponentId::new(id.as_str());
        let kind = catalog
            .get(&id)
            .map(|c| c.kind)
            .with_context(|| format!("component not in catalog: {id}"))?;
        if let Some(replaced) = session.select_id(kind, &id)? {
            info!(%kind, replaced = %replaced.id, with = %id, "replaced selection");
        }
    }

    let payload = session.serialize();
    if args.json {
        println!("{}", serde_json::to_string_pretty(&payload)?);
    } else {
        print!("{}", render_summary(&session)?);
    }

    if args.save {
        let conflicts = session.conflicts();
        if !conflicts.is_empty() {
            warn!(count = conflicts.len(), "saving a build with unresolved conflicts");
        }
        let store = match store {
            Some(store) => store,
            None => open_store(&db_url).await?,
        };
        let saved = store.save(&payload, args.name.as_deref()).await?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&saved)?);
        } else {
            println!("Saved \"{}\" as {}", saved.name, saved.slug);
        }
    }
    Ok(())
}
