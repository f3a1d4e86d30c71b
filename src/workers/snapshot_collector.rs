use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use tracing::info;

use crate::api::{GammaEvent, PolymarketClient};
use crate::db::{MarketStore, SnapshotStore};
use crate::models::Snapshot;

/// Take one snapshot of every tracked market trading at least `min_volume`
pub async fn collect_snapshots(
    client: &PolymarketClient,
    markets: &MarketStore,
    snapshots: &SnapshotStore,
    limit: u32,
    min_volume: Decimal,
) -> Result<u64> {
    let events = client
        .get_events(limit, false)
        .await
        .context("Snapshot collection failed to fetch events")?;

    let now = Utc::now();
    let saved = store_snapshots(markets, snapshots, &events, min_volume, now).await?;
    info!("[{}] Saved {} snapshots", now.to_rfc3339(), saved);
    Ok(saved)
}

/// Build snapshots at `now` from the feed and append them
pub async fn store_snapshots(
    markets: &MarketStore,
    snapshots: &SnapshotStore,
    events: &[GammaEvent],
    min_volume: Decimal,
    now: DateTime<Utc>,
) -> Result<u64> {
    let known = markets.known_ids().await?;
    let mut batch = Vec::new();

    for event in events {
        let liquidity = event.liquidity();

        for market in event.markets() {
            if !known.contains(&market.id) {
                continue;
            }

            let volume = market.volume();
            if volume < min_volume {
                continue;
            }

            batch.push(Snapshot {
                market_id: market.id.clone(),
                ts: now,
                price: market.first_outcome_price(),
                volume,
                liquidity,
            });
        }
    }

    snapshots.insert_snapshots(&batch).await
}

/// Drop open markets' snapshots older than `days`
pub async fn cleanup_old_snapshots(snapshots: &SnapshotStore, days: i64) -> Result<u64> {
    let cutoff = Utc::now() - Duration::days(days);
    let deleted = snapshots.purge_open_before(cutoff).await?;
    info!("Cleaned up {} old snapshots", deleted);
    Ok(deleted)
}
