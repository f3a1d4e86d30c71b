pub mod collector;
pub mod market_sync;
pub mod signal_detector;
pub mod snapshot_collector;

pub use collector::CollectorWorker;
pub use market_sync::{sync_markets, sync_resolved_market};
pub use signal_detector::{DetectionSummary, SignalDetector};
pub use snapshot_collector::{cleanup_old_snapshots, collect_snapshots};
