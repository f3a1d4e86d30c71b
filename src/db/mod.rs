pub mod markets;
pub mod signals;
pub mod snapshots;

pub use markets::MarketStore;
pub use signals::{ReconcileStats, SignalStore};
pub use snapshots::SnapshotStore;

use std::str::FromStr;

use anyhow::{Context, Result};
use sqlx::{
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
    Pool, Sqlite,
};
use tracing::info;

/// Open the SQLite database and initialize the schema
pub async fn connect(database_url: &str) -> Result<Pool<Sqlite>> {
    let in_memory = database_url.contains(":memory:");

    // Create data directory if needed
    if !in_memory {
        if let Some(path) = database_url.strip_prefix("sqlite:") {
            if let Some(parent) = std::path::Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)
                        .context("Failed to create database directory")?;
                }
            }
        }
    }

    // Parse connection options and enable create_if_missing
    let options = SqliteConnectOptions::from_str(database_url)
        .context("Invalid database URL")?
        .create_if_missing(true);

    // Every connection to :memory: is its own database, so keep exactly one alive
    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(5)
    };

    let pool = pool_options
        .connect_with(options)
        .await
        .context("Failed to connect to database")?;

    init_schema(&pool).await?;

    info!("Database initialized");
    Ok(pool)
}

/// Initialize database schema
async fn init_schema(pool: &Pool<Sqlite>) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS markets (
            id TEXT PRIMARY KEY,
            title TEXT NOT NULL,
            category TEXT,
            status TEXT NOT NULL,
            outcomes TEXT NOT NULL,
            outcome_prices TEXT NOT NULL,
            resolution_result TEXT,
            created_at TEXT NOT NULL,
            updated_at TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create markets table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS market_snapshots (
            market_id TEXT NOT NULL REFERENCES markets (id),
            ts INTEGER NOT NULL,
            price TEXT,
            volume TEXT NOT NULL,
            liquidity TEXT NOT NULL,
            PRIMARY KEY (market_id, ts)
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create market_snapshots table")?;

    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS signals (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            market_id TEXT NOT NULL REFERENCES markets (id),
            signal_type TEXT NOT NULL,
            confidence REAL NOT NULL,
            status TEXT NOT NULL,
            metadata TEXT NOT NULL,
            detected_at TEXT NOT NULL,
            last_seen TEXT NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await
    .context("Failed to create signals table")?;

    // Create indexes for common queries
    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_markets_status
        ON markets (status)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_markets_category
        ON markets (category)
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_snapshots_ts
        ON market_snapshots (ts)
        "#,
    )
    .execute(pool)
    .await?;

    // At most one active signal per market and type
    sqlx::query(
        r#"
        CREATE UNIQUE INDEX IF NOT EXISTS idx_signals_one_active
        ON signals (market_id, signal_type)
        WHERE status = 'active'
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        r#"
        CREATE INDEX IF NOT EXISTS idx_signals_detected
        ON signals (detected_at)
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Fixed-width RFC 3339 so TEXT ordering matches time ordering
pub(crate) fn format_ts(ts: chrono::DateTime<chrono::Utc>) -> String {
    ts.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

pub(crate) fn parse_ts(s: &str) -> Result<chrono::DateTime<chrono::Utc>> {
    chrono::DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&chrono::Utc))
        .with_context(|| format!("Invalid timestamp {}", s))
}

#[cfg(test)]
pub(crate) async fn memory_pool() -> Pool<Sqlite> {
    connect("sqlite::memory:").await.unwrap()
}
