use std::collections::HashSet;

use anyhow::{Context, Result};
use chrono::Utc;
use sqlx::{Pool, Sqlite};

use super::format_ts;
use crate::models::{Market, MarketStatus, Resolution};

/// SQLite store for tracked markets
#[derive(Clone)]
pub struct MarketStore {
    pool: Pool<Sqlite>,
}

impl MarketStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Insert new markets and refresh known ones in a single transaction.
    ///
    /// A resolved market keeps status `closed` and its final prices regardless
    /// of what the feed reports.
    pub async fn upsert_markets(&self, markets: &[Market]) -> Result<usize> {
        let now = format_ts(Utc::now());
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        for market in markets {
            sqlx::query(
                r#"
                INSERT INTO markets (
                    id,
                    title,
                    category,
                    status,
                    outcomes,
                    outcome_prices,
                    created_at,
                    updated_at
                ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
                ON CONFLICT (id) DO UPDATE SET
                    title = excluded.title,
                    category = excluded.category,
                    status = CASE
                        WHEN markets.resolution_result IS NOT NULL THEN 'closed'
                        ELSE excluded.status
                    END,
                    outcomes = excluded.outcomes,
                    outcome_prices = CASE
                        WHEN markets.resolution_result IS NOT NULL THEN markets.outcome_prices
                        ELSE excluded.outcome_prices
                    END,
                    updated_at = excluded.updated_at
                "#,
            )
            .bind(&market.id)
            .bind(&market.title)
            .bind(&market.category)
            .bind(market.status.as_str())
            .bind(serde_json::to_string(&market.outcomes)?)
            .bind(serde_json::to_string(&market.outcome_prices)?)
            .bind(&now)
            .bind(&now)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to upsert market {}", market.id))?;
        }

        tx.commit().await.context("Failed to commit market upsert")?;
        Ok(markets.len())
    }

    /// Record inferred resolutions in a single transaction.
    ///
    /// Markets that already carry a result are left untouched; returns the
    /// number of markets actually resolved.
    pub async fn apply_resolutions(&self, resolutions: &[Resolution]) -> Result<u64> {
        let now = format_ts(Utc::now());
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        let mut updated = 0;

        for resolution in resolutions {
            let result = sqlx::query(
                r#"
                UPDATE markets
                SET resolution_result = ?,
                    status = 'closed',
                    outcome_prices = ?,
                    updated_at = ?
                WHERE id = ? AND resolution_result IS NULL
                "#,
            )
            .bind(&resolution.result)
            .bind(serde_json::to_string(&resolution.outcome_prices)?)
            .bind(&now)
            .bind(&resolution.market_id)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to resolve market {}", resolution.market_id))?;

            updated += result.rows_affected();
        }

        tx.commit().await.context("Failed to commit resolutions")?;
        Ok(updated)
    }

    /// Get a market by id
    pub async fn get(&self, id: &str) -> Result<Option<Market>> {
        let row = sqlx::query_as::<_, MarketRow>("SELECT * FROM markets WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .context("Failed to fetch market")?;

        row.map(Market::try_from).transpose()
    }

    /// Ids of every tracked market
    pub async fn known_ids(&self) -> Result<HashSet<String>> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT id FROM markets")
            .fetch_all(&self.pool)
            .await
            .context("Failed to fetch market ids")?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    /// Ids of tracked markets with no resolution yet
    pub async fn unresolved_ids(&self) -> Result<HashSet<String>> {
        let rows: Vec<(String,)> =
            sqlx::query_as("SELECT id FROM markets WHERE resolution_result IS NULL")
                .fetch_all(&self.pool)
                .await
                .context("Failed to fetch unresolved market ids")?;

        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    /// All markets currently open
    pub async fn open_markets(&self) -> Result<Vec<Market>> {
        let rows = sqlx::query_as::<_, MarketRow>(
            "SELECT * FROM markets WHERE status = ? ORDER BY id",
        )
        .bind(MarketStatus::Open.as_str())
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch open markets")?;

        rows.into_iter().map(Market::try_from).collect()
    }

    /// Resolved markets, optionally restricted to one category
    pub async fn resolved_markets(&self, category: Option<&str>) -> Result<Vec<Market>> {
        let rows = match category {
            Some(category) => {
                sqlx::query_as::<_, MarketRow>(
                    r#"
                    SELECT * FROM markets
                    WHERE resolution_result IS NOT NULL AND category = ?
                    ORDER BY id
                    "#,
                )
                .bind(category)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, MarketRow>(
                    "SELECT * FROM markets WHERE resolution_result IS NOT NULL ORDER BY id",
                )
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("Failed to fetch resolved markets")?;

        rows.into_iter().map(Market::try_from).collect()
    }
}

/// Database row representation
#[derive(sqlx::FromRow)]
struct MarketRow {
    id: String,
    title: String,
    category: Option<String>,
    status: String,
    outcomes: String,
    outcome_prices: String,
    resolution_result: Option<String>,
}

impl TryFrom<MarketRow> for Market {
    type Error = anyhow::Error;

    fn try_from(row: MarketRow) -> Result<Self> {
        let status = MarketStatus::parse(&row.status)
            .with_context(|| format!("Unknown market status {}", row.status))?;

        Ok(Market {
            outcomes: serde_json::from_str(&row.outcomes)
                .with_context(|| format!("Invalid outcomes for market {}", row.id))?,
            outcome_prices: serde_json::from_str(&row.outcome_prices)
                .with_context(|| format!("Invalid outcome prices for market {}", row.id))?,
            id: row.id,
            title: row.title,
            category: row.category,
            status,
            resolution_result: row.resolution_result,
        })
    }
}
