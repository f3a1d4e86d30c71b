use std::collections::HashMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{Pool, Sqlite};
use tracing::debug;

use super::{format_ts, parse_ts};
use crate::analysis::lifecycle::{plan_reconciliation, SignalKey, Transition};
use crate::models::{Evidence, Signal, SignalStatus, SignalType};

/// Maximum rows returned by [`SignalStore::active_signals`]
pub const ACTIVE_SIGNALS_MAX_LIMIT: i64 = 100;

/// Maximum rows returned by [`SignalStore::history_for_market`]
pub const HISTORY_MAX_LIMIT: i64 = 200;

/// Counts of state changes applied by one reconciliation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub opened: usize,
    pub refreshed: usize,
    pub resolved: usize,
}

/// SQLite store for signal lifecycle
#[derive(Clone)]
pub struct SignalStore {
    pool: Pool<Sqlite>,
}

impl SignalStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Reconcile one detection cycle against the stored signals.
    ///
    /// Runs as a single transaction: on any error nothing from this cycle is
    /// written.
    pub async fn reconcile(
        &self,
        detected: &[Evidence],
        evaluated: &[SignalType],
        now: DateTime<Utc>,
    ) -> Result<ReconcileStats> {
        let now = format_ts(now);
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        let rows: Vec<(i64, String, String)> = sqlx::query_as(
            "SELECT id, market_id, signal_type FROM signals WHERE status = ?",
        )
        .bind(SignalStatus::Active.as_str())
        .fetch_all(&mut *tx)
        .await
        .context("Failed to fetch active signals")?;

        let mut active = HashMap::with_capacity(rows.len());
        for (id, market_id, signal_type) in rows {
            match SignalType::parse(&signal_type) {
                Some(signal_type) => {
                    active.insert(SignalKey::new(market_id, signal_type), id);
                }
                None => debug!("Ignoring active signal {} of unknown type {}", id, signal_type),
            }
        }

        let plan = plan_reconciliation(&active, detected, evaluated);

        for transition in &plan.transitions {
            match transition {
                Transition::Open { evidence } => {
                    sqlx::query(
                        r#"
                        INSERT INTO signals (
                            market_id,
                            signal_type,
                            confidence,
                            status,
                            metadata,
                            detected_at,
                            last_seen
                        ) VALUES (?, ?, ?, ?, ?, ?, ?)
                        "#,
                    )
                    .bind(&evidence.market_id)
                    .bind(evidence.signal_type.as_str())
                    .bind(evidence.confidence)
                    .bind(SignalStatus::Active.as_str())
                    .bind(serde_json::to_string(&evidence.details)?)
                    .bind(&now)
                    .bind(&now)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to insert signal")?;
                }
                Transition::Refresh { id, evidence } => {
                    sqlx::query(
                        r#"
                        UPDATE signals
                        SET last_seen = ?, confidence = ?, metadata = ?
                        WHERE id = ?
                        "#,
                    )
                    .bind(&now)
                    .bind(evidence.confidence)
                    .bind(serde_json::to_string(&evidence.details)?)
                    .bind(id)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to update signal")?;
                }
                Transition::Resolve { id, .. } => {
                    sqlx::query("UPDATE signals SET status = ? WHERE id = ?")
                        .bind(SignalStatus::Resolved.as_str())
                        .bind(id)
                        .execute(&mut *tx)
                        .await
                        .context("Failed to resolve signal")?;
                }
            }
        }

        tx.commit().await.context("Failed to commit signal reconciliation")?;

        Ok(ReconcileStats {
            opened: plan.opened(),
            refreshed: plan.refreshed(),
            resolved: plan.resolved(),
        })
    }

    /// Active signals, newest first, optionally of one type
    pub async fn active_signals(
        &self,
        signal_type: Option<SignalType>,
        limit: i64,
    ) -> Result<Vec<Signal>> {
        let limit = limit.clamp(1, ACTIVE_SIGNALS_MAX_LIMIT);

        let rows = match signal_type {
            Some(signal_type) => {
                sqlx::query_as::<_, SignalRow>(
                    r#"
                    SELECT * FROM signals
                    WHERE status = ? AND signal_type = ?
                    ORDER BY detected_at DESC, id DESC
                    LIMIT ?
                    "#,
                )
                .bind(SignalStatus::Active.as_str())
                .bind(signal_type.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query_as::<_, SignalRow>(
                    r#"
                    SELECT * FROM signals
                    WHERE status = ?
                    ORDER BY detected_at DESC, id DESC
                    LIMIT ?
                    "#,
                )
                .bind(SignalStatus::Active.as_str())
                .bind(limit)
                .fetch_all(&self.pool)
                .await
            }
        }
        .context("Failed to fetch active signals")?;

        rows.into_iter().map(Signal::try_from).collect()
    }

    /// Every signal recorded for a market, newest first
    pub async fn history_for_market(&self, market_id: &str, limit: i64) -> Result<Vec<Signal>> {
        let rows = sqlx::query_as::<_, SignalRow>(
            r#"
            SELECT * FROM signals
            WHERE market_id = ?
            ORDER BY detected_at DESC, id DESC
            LIMIT ?
            "#,
        )
        .bind(market_id)
        .bind(limit.clamp(1, HISTORY_MAX_LIMIT))
        .fetch_all(&self.pool)
        .await
        .context("Failed to fetch signal history")?;

        rows.into_iter().map(Signal::try_from).collect()
    }
}

/// Database row representation
#[derive(sqlx::FromRow)]
struct SignalRow {
    id: i64,
    market_id: String,
    signal_type: String,
    confidence: f64,
    status: String,
    metadata: String,
    detected_at: String,
    last_seen: String,
}

impl TryFrom<SignalRow> for Signal {
    type Error = anyhow::Error;

    fn try_from(row: SignalRow) -> Result<Self> {
        Ok(Signal {
            id: row.id,
            signal_type: SignalType::parse(&row.signal_type)
                .with_context(|| format!("Unknown signal type {}", row.signal_type))?,
            status: SignalStatus::parse(&row.status)
                .with_context(|| format!("Unknown signal status {}", row.status))?,
            metadata: serde_json::from_str(&row.metadata)
                .with_context(|| format!("Invalid metadata for signal {}", row.id))?,
            detected_at: parse_ts(&row.detected_at)?,
            last_seen: parse_ts(&row.last_seen)?,
            market_id: row.market_id,
            confidence: row.confidence,
        })
    }
}
