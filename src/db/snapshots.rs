use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{Pool, Sqlite};

use crate::models::{MarketStatus, Snapshot};

/// SQLite store for the per-market snapshot time series
#[derive(Clone)]
pub struct SnapshotStore {
    pool: Pool<Sqlite>,
}

impl SnapshotStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Append snapshots in a single transaction; an existing (market, ts) is kept
    pub async fn insert_snapshots(&self, snapshots: &[Snapshot]) -> Result<u64> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let mut inserted = 0;

        for snapshot in snapshots {
            let result = sqlx::query(
                r#"
                INSERT OR IGNORE INTO market_snapshots (
                    market_id,
                    ts,
                    price,
                    volume,
                    liquidity
                ) VALUES (?, ?, ?, ?, ?)
                "#,
            )
            .bind(&snapshot.market_id)
            .bind(snapshot.ts.timestamp_millis())
            .bind(snapshot.price.map(|p| p.to_string()))
            .bind(snapshot.volume.to_string())
            .bind(snapshot.liquidity.to_string())
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to insert snapshot for {}", snapshot.market_id))?;

            inserted += result.rows_affected();
        }

        tx.commit().await.context("Failed to commit snapshots")?;
        Ok(inserted)
    }

    /// Snapshots for a market, oldest first, optionally only those at or after `since`
    pub async fn history(
        &self,
        market_id: &str,
        since: Option<DateTime<Utc>>,
    ) -> Result<Vec<Snapshot>> {
        let since_ms = since.map(|s| s.timestamp_millis()).unwrap_or(i64::MIN);

        let rows = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT * FROM market_snapshots
            WHERE market_id = ? AND ts >= ?
            ORDER BY ts ASC
            "#,
        )
        .bind(market_id)
        .bind(since_ms)
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch snapshot history")?;

        rows.into_iter().map(Snapshot::try_from).collect()
    }

    /// Most recent snapshot for a market
    pub async fn latest(&self, market_id: &str) -> Result<Option<Snapshot>> {
        let row = sqlx::query_as::<_, SnapshotRow>(
            r#"
            SELECT * FROM market_snapshots
            WHERE market_id = ?
            ORDER BY ts DESC
            LIMIT 1
            "#,
        )
        .bind(market_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch latest snapshot")?;

        row.map(Snapshot::try_from).transpose()
    }

    /// Delete snapshots of open markets taken before `cutoff`.
    ///
    /// Closed markets keep their full history for calibration.
    pub async fn purge_open_before(&self, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let result = sqlx::query(
            r#"
            DELETE FROM market_snapshots
            WHERE ts < ?
              AND market_id IN (SELECT id FROM markets WHERE status = ?)
            "#,
        )
        .bind(cutoff.timestamp_millis())
        .bind(MarketStatus::Open.as_str())
        .execute(&mut *tx)
        .await
        .context("Failed to delete old snapshots")?;

        tx.commit().await.context("Failed to commit snapshot cleanup")?;
        Ok(result.rows_affected())
    }

    /// Get count of snapshots
    pub async fn count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM market_snapshots")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count snapshots")?;

        Ok(row.0)
    }
}

/// Database row representation
#[derive(sqlx::FromRow)]
struct SnapshotRow {
    market_id: String,
    ts: i64,
    price: Option<String>,
    volume: String,
    liquidity: String,
}

impl TryFrom<SnapshotRow> for Snapshot {
    type Error = anyhow::Error;

    fn try_from(row: SnapshotRow) -> Result<Self> {
        let ts = DateTime::from_timestamp_millis(row.ts)
            .with_context(|| format!("Invalid snapshot timestamp {}", row.ts))?;
        let price = row
            .price
            .as_deref()
            .map(Decimal::from_str)
            .transpose()
            .context("Invalid snapshot price")?;

        Ok(Snapshot {
            market_id: row.market_id,
            ts,
            price,
            volume: Decimal::from_str(&row.volume).context("Invalid snapshot volume")?,
            liquidity: Decimal::from_str(&row.liquidity).context("Invalid snapshot liquidity")?,
        })
    }
}
