#![deny(warnings)]

//! Create the saved-build database and its tables.

use persistence::{default_sqlite_url, sqlite_path, BuildStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| default_sqlite_url().to_string());
    if let Some(parent) = sqlite_path(&url).and_then(|p| std::path::Path::new(p).parent()) {
        std::fs::create_dir_all(parent)?;
    }
    let store = BuildStore::connect(&url).await?;
    let saved = store.list().await?.len();
    println!("DB migrated at {} ({} saved builds)", url, saved);
    Ok(())
}
