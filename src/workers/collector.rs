use std::time::Duration;

use chrono::Utc;
use tokio::time;
use tracing::{error, info, warn};

use super::market_sync::{sync_markets, sync_resolved_market};
use super::signal_detector::SignalDetector;
use super::snapshot_collector::{cleanup_old_snapshots, collect_snapshots};
use crate::api::PolymarketClient;
use crate::config::Config;
use crate::db::{MarketStore, SnapshotStore};

/// Worker that snapshots markets and runs detection on a fixed interval,
/// with a slower market/resolution sync folded into the same loop
pub struct CollectorWorker {
    client: PolymarketClient,
    markets: MarketStore,
    snapshots: SnapshotStore,
    detector: SignalDetector,
    config: Config,
}

impl CollectorWorker {
    pub fn new(
        client: PolymarketClient,
        markets: MarketStore,
        snapshots: SnapshotStore,
        detector: SignalDetector,
        config: Config,
    ) -> Self {
        Self {
            client,
            markets,
            snapshots,
            detector,
            config,
        }
    }

    /// Number of snapshot cycles between two syncs, at least one
    fn cycles_per_sync(&self) -> u64 {
        (self.config.sync_interval / self.config.snapshot_interval.max(1)).max(1)
    }

    /// Run the worker loop
    pub async fn run(&self) {
        let interval = Duration::from_secs(self.config.snapshot_interval.max(1));
        info!(
            "Collector started (snapshot interval: {:?}, sync every {} cycles)",
            interval,
            self.cycles_per_sync()
        );

        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        let mut cycles_to_sync = 0;
        loop {
            // First tick completes immediately
            ticker.tick().await;

            let sync_due = cycles_to_sync == 0;
            self.run_cycle(sync_due).await;

            cycles_to_sync = if sync_due {
                self.cycles_per_sync() - 1
            } else {
                cycles_to_sync - 1
            };
        }
    }

    /// One collection cycle. Each phase commits on its own; a failed phase is
    /// logged and the remaining phases still run.
    pub async fn run_cycle(&self, sync_due: bool) {
        let cfg = &self.config;

        if sync_due {
            info!("Syncing markets...");

            if let Err(e) = cleanup_old_snapshots(&self.snapshots, cfg.snapshot_retention_days).await {
                error!("Snapshot cleanup failed: {:#}", e);
            }

            if let Err(e) = sync_markets(&self.client, &self.markets, cfg.event_fetch_limit).await {
                error!("Market sync failed: {:#}", e);
            }

            if let Err(e) =
                sync_resolved_market(&self.client, &self.markets, cfg.event_fetch_limit).await
            {
                error!("Resolution sync failed: {:#}", e);
            }
        }

        match collect_snapshots(
            &self.client,
            &self.markets,
            &self.snapshots,
            cfg.event_fetch_limit,
            cfg.min_snapshot_volume,
        )
        .await
        {
            Ok(0) => warn!("No snapshots collected this cycle"),
            Ok(_) => {}
            Err(e) => error!("Snapshot collection failed: {:#}", e),
        }

        match self.detector.run_detections(Utc::now()).await {
            Ok(summary) => info!(
                "Detection complete: {} opened, {} refreshed, {} resolved",
                summary.opened, summary.refreshed, summary.resolved
            ),
            Err(e) => error!("Signal detection failed: {:#}", e),
        }
    }
}
