//! SQLite persistence for messages, usage and learned model capabilities.
//!
//! All three stores share one database file. Each store creates its own
//! tables when constructed; [`open_database`] additionally pins the schema
//! version so an incompatible file is rejected up front.

pub mod capabilities;
pub mod history;
pub mod usage;

pub use capabilities::{ModelCapabilityStore, SqliteCapabilityStore};
pub use history::{HistoryStore, SqliteHistoryStore};
pub use usage::{ModelPricing, ModelUsage, SqliteUsageRecorder, UsageRecorder, UsageSummary};

use anyhow::{Context, Result};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;
use std::str::FromStr;

const SCHEMA_META_TABLE: &str = "
CREATE TABLE IF NOT EXISTS relaychat_schema_meta (
    key   TEXT PRIMARY KEY,
    value TEXT NOT NULL
)";
const SCHEMA_VERSION_KEY: &str = "schema_version";
const SCHEMA_VERSION: u32 = 1;

/// Open (creating if needed) the database at `path`.
pub async fn open_database(path: &Path) -> Result<SqlitePool> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create database directory: {}", parent.display()))?;
    }

    let options = SqliteConnectOptions::from_str(&format!("sqlite://{}", path.display()))
        .with_context(|| format!("Invalid database path: {}", path.display()))?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(4)
        .connect_with(options)
        .await
        .with_context(|| format!("Failed to open database: {}", path.display()))?;

    ensure_schema_version(&pool).await?;
    Ok(pool)
}

/// Single-connection in-memory database, mainly for tests.
pub async fn open_in_memory() -> Result<SqlitePool> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .context("Failed to open in-memory database")?;
    ensure_schema_version(&pool).await?;
    Ok(pool)
}

async fn ensure_schema_version(pool: &SqlitePool) -> Result<()> {
    sqlx::query(SCHEMA_META_TABLE)
        .execute(pool)
        .await
        .context("create relaychat_schema_meta table")?;

    let stored: Option<(String,)> =
        sqlx::query_as("SELECT value FROM relaychat_schema_meta WHERE key = $1")
            .bind(SCHEMA_VERSION_KEY)
            .fetch_optional(pool)
            .await
            .context("load schema version")?;

    if let Some((value,)) = stored {
        let parsed = value
            .parse::<u32>()
            .with_context(|| format!("invalid schema version value: {value}"))?;
        anyhow::ensure!(
            parsed == SCHEMA_VERSION,
            "incompatible database schema version: stored={parsed}, expected={SCHEMA_VERSION}"
        );
        return Ok(());
    }

    sqlx::query("INSERT INTO relaychat_schema_meta (key, value) VALUES ($1, $2)")
        .bind(SCHEMA_VERSION_KEY)
        .bind(SCHEMA_VERSION.to_string())
        .execute(pool)
        .await
        .context("persist schema version")?;
    Ok(())
}
