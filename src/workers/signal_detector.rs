use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info};

use crate::analysis::detectors::{DetectionConfig, Detector};
use crate::db::{MarketStore, SignalStore, SnapshotStore};
use crate::models::{Evidence, SignalType};

/// Outcome of one detection cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DetectionSummary {
    pub volume_spikes: usize,
    pub price_momentum: usize,
    pub opened: usize,
    pub refreshed: usize,
    pub resolved: usize,
}

/// Runs every detector over open markets and reconciles the results
pub struct SignalDetector {
    markets: MarketStore,
    snapshots: SnapshotStore,
    signals: SignalStore,
    detectors: Vec<Box<dyn Detector>>,
}

impl SignalDetector {
    pub fn new(
        markets: MarketStore,
        snapshots: SnapshotStore,
        signals: SignalStore,
        config: &DetectionConfig,
    ) -> Self {
        Self {
            markets,
            snapshots,
            signals,
            detectors: config.detectors(),
        }
    }

    /// Evaluate all open markets at `now` and persist the reconciled signals
    pub async fn run_detections(&self, now: DateTime<Utc>) -> Result<DetectionSummary> {
        info!("Running signal detectors...");

        let mut detected: Vec<Evidence> = Vec::new();
        for market in self.markets.open_markets().await? {
            let history = self.snapshots.history(&market.id, None).await?;

            for detector in &self.detectors {
                match detector.evaluate(&market, &history, now) {
                    Ok(evidence) => detected.push(evidence),
                    Err(reason) => debug!(
                        "{} skipped for {}: {}",
                        detector.signal_type(),
                        market.id,
                        reason
                    ),
                }
            }
        }

        let count = |t: SignalType| detected.iter().filter(|e| e.signal_type == t).count();
        let volume_spikes = count(SignalType::VolumeSpike);
        let price_momentum = count(SignalType::PriceMomentum);
        info!("Volume spikes: {}, price momentum: {}", volume_spikes, price_momentum);

        for evidence in &detected {
            info!(
                "[{} {}] (confidence: {})",
                evidence.signal_type,
                evidence.title.chars().take(50).collect::<String>(),
                evidence.confidence
            );
        }

        let evaluated: Vec<SignalType> = self.detectors.iter().map(|d| d.signal_type()).collect();
        let stats = self.signals.reconcile(&detected, &evaluated, now).await?;

        Ok(DetectionSummary {
            volume_spikes,
            price_momentum,
            opened: stats.opened,
            refreshed: stats.refreshed,
            resolved: stats.resolved,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::models::{Market, MarketStatus, Snapshot};
    use chrono::Duration;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn market(id: &str) -> Market {
        Market {
            id: id.to_string(),
            title: format!("Question {}", id),
            category: None,
            status: MarketStatus::Open,
            resolution_result: None,
            outcomes: vec!["Yes".to_string(), "No".to_string()],
            outcome_prices: Vec::new(),
        }
    }

    async fn detector() -> (SignalDetector, MarketStore, SnapshotStore, SignalStore) {
        let pool = memory_pool().await;
        let markets = MarketStore::new(pool.clone());
        let snapshots = SnapshotStore::new(pool.clone());
        let signals = SignalStore::new(pool);
        let worker = SignalDetector::new(
            markets.clone(),
            snapshots.clone(),
            signals.clone(),
            &DetectionConfig::default(),
        );
        (worker, markets, snapshots, signals)
    }

    /// Hourly snapshots ending at `now`, one per price
    fn series(market_id: &str, now: DateTime<Utc>, prices: &[Decimal]) -> Vec<Snapshot> {
        let n = prices.len() as i64;
        prices
            .iter()
            .enumerate()
            .map(|(i, price)| Snapshot {
                market_id: market_id.to_string(),
                ts: now - Duration::hours(n - 1 - i as i64),
                price: Some(*price),
                volume: Decimal::from(20_000 + 100 * i as i64),
                liquidity: dec!(1000),
            })
            .collect()
    }

    #[tokio::test]
    async fn test_momentum_opens_then_resolves() {
        let (worker, markets, snapshots, signals) = detector().await;
        markets
            .upsert_markets(&[market("m1"), market("m2")])
            .await
            .unwrap();

        let now = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let mut prices = vec![dec!(0.40); 7];
        prices.push(dec!(0.62));
        snapshots
            .insert_snapshots(&series("m1", now, &prices))
            .await
            .unwrap();
        snapshots
            .insert_snapshots(&series("m2", now, &[dec!(0.5); 8]))
            .await
            .unwrap();

        let summary = worker.run_detections(now).await.unwrap();
        assert_eq!(summary.price_momentum, 1);
        assert_eq!(summary.volume_spikes, 0);
        assert_eq!(summary.opened, 1);

        let active = signals
            .active_signals(Some(SignalType::PriceMomentum), 10)
            .await
            .unwrap();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].market_id, "m1");

        // Price reverts: the momentum signal goes stale
        let later = now + Duration::hours(1);
        snapshots
            .insert_snapshots(&series("m1", later, &[dec!(0.40)]))
            .await
            .unwrap();
        let summary = worker.run_detections(later).await.unwrap();
        assert_eq!(summary.price_momentum, 0);
        assert_eq!(summary.resolved, 1);
        assert!(signals.active_signals(None, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_no_markets_is_a_quiet_cycle() {
        let (worker, ..) = detector().await;
        let summary = worker.run_detections(Utc::now()).await.unwrap();
        assert_eq!(summary, DetectionSummary::default());
    }
}
