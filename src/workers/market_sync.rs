use anyhow::{Context, Result};
use tracing::{debug, info};

use crate::analysis::infer_resolution;
use crate::api::{GammaEvent, PolymarketClient};
use crate::db::MarketStore;
use crate::models::{Market, Resolution};

/// Upsert every market listed in the open-events feed
pub async fn sync_markets(
    client: &PolymarketClient,
    markets: &MarketStore,
    limit: u32,
) -> Result<usize> {
    let events = client
        .get_events(limit, false)
        .await
        .context("Market sync failed to fetch events")?;

    let count = upsert_events(markets, &events).await?;
    info!("Synced {} markets from {} events", count, events.len());
    Ok(count)
}

/// Store the markets of `events`, each under its event's category
pub async fn upsert_events(markets: &MarketStore, events: &[GammaEvent]) -> Result<usize> {
    let batch: Vec<Market> = events
        .iter()
        .flat_map(|event| {
            let category = event.category();
            event
                .markets()
                .iter()
                .map(move |m| m.to_market(category.clone()))
        })
        .collect();

    markets.upsert_markets(&batch).await
}

/// Record outcomes for known markets the closed-events feed reports as settled
pub async fn sync_resolved_market(
    client: &PolymarketClient,
    markets: &MarketStore,
    limit: u32,
) -> Result<u64> {
    let events = client
        .get_events(limit, true)
        .await
        .context("Resolution sync failed to fetch closed events")?;

    let resolved = apply_resolved_events(markets, &events).await?;
    info!("Resolved {} markets", resolved);
    Ok(resolved)
}

/// Infer and store resolutions from closed events.
///
/// Only closed markets that are tracked and still unresolved are considered;
/// an existing result is never overwritten.
pub async fn apply_resolved_events(markets: &MarketStore, events: &[GammaEvent]) -> Result<u64> {
    let unresolved = markets.unresolved_ids().await?;
    let mut resolutions = Vec::new();

    for market in events.iter().flat_map(|e| e.markets()) {
        if !market.is_closed() || !unresolved.contains(&market.id) {
            continue;
        }

        match infer_resolution(market.outcome_prices.as_ref(), market.outcomes.as_ref()) {
            Ok(result) => resolutions.push(Resolution {
                market_id: market.id.clone(),
                result,
                outcome_prices: market.price_strings(),
            }),
            Err(reason) => debug!("Market {} not resolved: {}", market.id, reason),
        }
    }

    markets.apply_resolutions(&resolutions).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::models::MarketStatus;

    fn feed(json: &str) -> Vec<GammaEvent> {
        serde_json::from_str(json).unwrap()
    }

    const OPEN_EVENTS: &str = r#"[
        {
            "tags": [{"label": "crypto"}],
            "liquidity": "5000",
            "markets": [
                {"id": "m1", "question": "BTC above 100k?", "outcomes": "[\"Yes\",\"No\"]",
                 "outcomePrices": "[\"0.4\",\"0.6\"]", "volume": "20000", "closed": false},
                {"id": "m2", "question": "ETH above 5k?", "outcomes": "[\"Yes\",\"No\"]",
                 "outcomePrices": "[\"0.2\",\"0.8\"]", "volume": "5000", "closed": false}
            ]
        },
        {
            "tags": [],
            "markets": [
                {"id": "m3", "question": "Who wins?", "outcomes": ["A","B","C"],
                 "outcomePrices": ["0.3","0.3","0.4"], "volume": 30000}
            ]
        }
    ]"#;

    const CLOSED_EVENTS: &str = r#"[
        {
            "tags": [{"label": "crypto"}],
            "markets": [
                {"id": "m1", "outcomes": "[\"Yes\",\"No\"]",
                 "outcomePrices": "[\"0.9999995\",\"0.0000005\"]", "closed": true},
                {"id": "m2", "outcomes": "[\"Yes\",\"No\"]",
                 "outcomePrices": "[\"0.5\",\"0.5\"]", "closed": true},
                {"id": "m9", "outcomes": "[\"Yes\",\"No\"]",
                 "outcomePrices": "[\"0\",\"1\"]", "closed": true}
            ]
        }
    ]"#;

    #[tokio::test]
    async fn test_upsert_events_assigns_categories() {
        let store = MarketStore::new(memory_pool().await);

        let count = upsert_events(&store, &feed(OPEN_EVENTS)).await.unwrap();
        assert_eq!(count, 3);

        let m1 = store.get("m1").await.unwrap().unwrap();
        assert_eq!(m1.category.as_deref(), Some("Crypto"));
        assert_eq!(m1.status, MarketStatus::Open);
        assert_eq!(m1.title, "BTC above 100k?");

        let m3 = store.get("m3").await.unwrap().unwrap();
        assert_eq!(m3.category, None);
        assert_eq!(m3.outcomes, vec!["A", "B", "C"]);
    }

    #[tokio::test]
    async fn test_resolved_events_applied_once() {
        let store = MarketStore::new(memory_pool().await);
        upsert_events(&store, &feed(OPEN_EVENTS)).await.unwrap();

        // m1 resolves; m2 is indecisive; m9 is unknown locally
        let resolved = apply_resolved_events(&store, &feed(CLOSED_EVENTS))
            .await
            .unwrap();
        assert_eq!(resolved, 1);

        let m1 = store.get("m1").await.unwrap().unwrap();
        assert_eq!(m1.resolution_result.as_deref(), Some("Yes"));
        assert_eq!(m1.status, MarketStatus::Closed);
        assert!(store.get("m9").await.unwrap().is_none());

        // A flipped feed on the next sync leaves the first result in place
        let flipped = CLOSED_EVENTS.replace(
            r#"[\"0.9999995\",\"0.0000005\"]"#,
            r#"[\"0.02\",\"0.98\"]"#,
        );
        let resolved = apply_resolved_events(&store, &feed(&flipped))
            .await
            .unwrap();
        assert_eq!(resolved, 0);

        let m1 = store.get("m1").await.unwrap().unwrap();
        assert_eq!(m1.resolution_result.as_deref(), Some("Yes"));
    }
}
