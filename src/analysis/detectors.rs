use chrono::{DateTime, Duration, Utc};

use super::round_dp;
use crate::error::{Evaluation, SkipReason};
use crate::models::{Direction, Evidence, Market, SignalDetails, SignalType, Snapshot};

/// A pure anomaly detector over one market's snapshot history.
///
/// `history` must be ordered by timestamp ascending.
pub trait Detector: Send + Sync {
    fn signal_type(&self) -> SignalType;

    fn evaluate(
        &self,
        market: &Market,
        history: &[Snapshot],
        now: DateTime<Utc>,
    ) -> Evaluation<Evidence>;
}

/// Thresholds for [`VolumeSpikeDetector`]
#[derive(Debug, Clone, PartialEq)]
pub struct VolumeSpikeConfig {
    /// Trailing window of snapshots considered
    pub lookback: Duration,
    /// Minimum raw snapshots inside the window
    pub min_snapshots: usize,
    /// Minimum positive volume deltas inside the window
    pub min_positive_deltas: usize,
    /// Latest delta must be at least this many USD
    pub min_volume_delta: f64,
    /// z-score the latest delta must exceed
    pub sigma_threshold: f64,
    /// z-score at which confidence saturates to 1.0
    pub confidence_saturation: f64,
}

impl Default for VolumeSpikeConfig {
    fn default() -> Self {
        Self {
            lookback: Duration::days(7),
            min_snapshots: 10,
            min_positive_deltas: 5,
            min_volume_delta: 1000.0,
            sigma_threshold: 3.0,
            confidence_saturation: 5.0,
        }
    }
}

/// Thresholds for [`PriceMomentumDetector`]
#[derive(Debug, Clone, PartialEq)]
pub struct PriceMomentumConfig {
    /// How far back the comparison snapshot must be
    pub lookback: Duration,
    /// Absolute price change that must be exceeded
    pub threshold: f64,
    /// Price change at which confidence saturates to 1.0
    pub confidence_saturation: f64,
}

impl Default for PriceMomentumConfig {
    fn default() -> Self {
        Self {
            lookback: Duration::hours(6),
            threshold: 0.15,
            confidence_saturation: 0.3,
        }
    }
}

/// Configuration for every detector run in a cycle
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DetectionConfig {
    pub volume_spike: VolumeSpikeConfig,
    pub price_momentum: PriceMomentumConfig,
}

impl DetectionConfig {
    pub fn detectors(&self) -> Vec<Box<dyn Detector>> {
        vec![
            Box::new(VolumeSpikeDetector::new(self.volume_spike.clone())),
            Box::new(PriceMomentumDetector::new(self.price_momentum.clone())),
        ]
    }
}

/// Flags a latest volume delta that is a z-score outlier against the
/// positive deltas of the trailing window.
#[derive(Debug, Clone, Default)]
pub struct VolumeSpikeDetector {
    config: VolumeSpikeConfig,
}

impl VolumeSpikeDetector {
    pub fn new(config: VolumeSpikeConfig) -> Self {
        Self { config }
    }
}

impl Detector for VolumeSpikeDetector {
    fn signal_type(&self) -> SignalType {
        SignalType::VolumeSpike
    }

    fn evaluate(
        &self,
        market: &Market,
        history: &[Snapshot],
        now: DateTime<Utc>,
    ) -> Evaluation<Evidence> {
        let cfg = &self.config;
        let cutoff = now - cfg.lookback;

        let volumes: Vec<f64> = history
            .iter()
            .filter(|s| s.ts >= cutoff)
            .map(Snapshot::volume_f64)
            .collect();

        if volumes.len() < cfg.min_snapshots.max(2) {
            return Err(SkipReason::InsufficientSnapshots {
                have: volumes.len(),
                need: cfg.min_snapshots.max(2),
            });
        }

        let deltas: Vec<f64> = volumes
            .windows(2)
            .map(|w| w[1] - w[0])
            .filter(|d| *d > 0.0)
            .collect();

        if deltas.len() < cfg.min_positive_deltas.max(1) {
            return Err(SkipReason::InsufficientDeltas {
                have: deltas.len(),
                need: cfg.min_positive_deltas.max(1),
            });
        }

        let (avg_delta, std_delta) = mean_and_std(&deltas);

        if is_constant(avg_delta, std_delta) {
            return Err(SkipReason::ZeroVariance);
        }

        let latest_delta = volumes[volumes.len() - 1] - volumes[volumes.len() - 2];
        if latest_delta < cfg.min_volume_delta {
            return Err(SkipReason::BelowFloor {
                latest: latest_delta,
                floor: cfg.min_volume_delta,
            });
        }

        let z_score = (latest_delta - avg_delta) / std_delta;
        if !(z_score > cfg.sigma_threshold) {
            return Err(SkipReason::BelowThreshold {
                metric: "z-score",
                value: z_score,
                threshold: cfg.sigma_threshold,
            });
        }

        let confidence = (z_score / cfg.confidence_saturation).min(1.0);

        Ok(Evidence {
            market_id: market.id.clone(),
            title: market.title.clone(),
            signal_type: SignalType::VolumeSpike,
            confidence: round_dp(confidence, 2),
            details: SignalDetails::VolumeSpike {
                current_volume: round_dp(latest_delta, 2),
                avg_volume: round_dp(avg_delta, 2),
                std_dev: round_dp(std_delta, 2),
                z_score: round_dp(z_score, 2),
            },
        })
    }
}

/// Flags a large absolute price move between the latest snapshot and the
/// latest snapshot at or before the lookback horizon.
#[derive(Debug, Clone, Default)]
pub struct PriceMomentumDetector {
    config: PriceMomentumConfig,
}

impl PriceMomentumDetector {
    pub fn new(config: PriceMomentumConfig) -> Self {
        Self { config }
    }
}

impl Detector for PriceMomentumDetector {
    fn signal_type(&self) -> SignalType {
        SignalType::PriceMomentum
    }

    fn evaluate(
        &self,
        market: &Market,
        history: &[Snapshot],
        now: DateTime<Utc>,
    ) -> Evaluation<Evidence> {
        let cfg = &self.config;
        let horizon = now - cfg.lookback;

        let latest = history.last().ok_or(SkipReason::NoSnapshot("in history"))?;
        let earlier = history
            .iter()
            .rev()
            .find(|s| s.ts <= horizon)
            .ok_or(SkipReason::NoSnapshot("before lookback horizon"))?;

        let current_price = latest.price_f64().ok_or(SkipReason::NoPrice("latest"))?;
        let earlier_price = earlier.price_f64().ok_or(SkipReason::NoPrice("earlier"))?;
        if earlier_price == 0.0 {
            return Err(SkipReason::ZeroBaseline);
        }

        let diff = (current_price - earlier_price).abs();
        if !(diff > cfg.threshold) {
            return Err(SkipReason::BelowThreshold {
                metric: "price change",
                value: diff,
                threshold: cfg.threshold,
            });
        }

        let direction = if current_price > earlier_price {
            Direction::Up
        } else {
            Direction::Down
        };
        let confidence = (diff / cfg.confidence_saturation).min(1.0);

        Ok(Evidence {
            market_id: market.id.clone(),
            title: market.title.clone(),
            signal_type: SignalType::PriceMomentum,
            confidence: round_dp(confidence, 2),
            details: SignalDetails::PriceMomentum {
                current_price,
                earlier_price,
                change: round_dp(diff, 4),
                direction,
            },
        })
    }
}

/// Largest std, relative to the mean, still treated as no variance.
///
/// Identical deltas can leave floating-point noise instead of an exact zero.
pub const ZERO_VARIANCE_TOLERANCE: f64 = 1e-12;

fn is_constant(mean: f64, std: f64) -> bool {
    std <= mean.abs() * ZERO_VARIANCE_TOLERANCE
}

/// Mean and population standard deviation
fn mean_and_std(values: &[f64]) -> (f64, f64) {
    let n = values.len() as f64;
    let mean = values.iter().sum::<f64>() / n;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
    (mean, variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::MarketStatus;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn market() -> Market {
        Market {
            id: "m1".to_string(),
            title: "Test Market".to_string(),
            category: None,
            status: MarketStatus::Open,
            resolution_result: None,
            outcomes: vec!["Yes".to_string(), "No".to_string()],
            outcome_prices: Vec::new(),
        }
    }

    fn snapshot(ts: DateTime<Utc>, volume: Decimal, price: Option<Decimal>) -> Snapshot {
        Snapshot {
            market_id: "m1".to_string(),
            ts,
            price,
            volume,
            liquidity: dec!(5000),
        }
    }

    /// Hourly snapshots ending at `now`, with the given volume steps
    fn volume_series(now: DateTime<Utc>, start: Decimal, steps: &[Decimal]) -> Vec<Snapshot> {
        let mut volume = start;
        let mut history = vec![snapshot(
            now - Duration::hours(steps.len() as i64),
            volume,
            Some(dec!(0.5)),
        )];
        for (i, step) in steps.iter().enumerate() {
            volume += *step;
            let ts = now - Duration::hours((steps.len() - i - 1) as i64);
            history.push(snapshot(ts, volume, Some(dec!(0.5))));
        }
        history
    }

    #[test]
    fn test_volume_no_snapshots() {
        let detector = VolumeSpikeDetector::default();
        let result = detector.evaluate(&market(), &[], Utc::now());
        assert_eq!(
            result,
            Err(SkipReason::InsufficientSnapshots { have: 0, need: 10 })
        );
    }

    #[test]
    fn test_volume_fewer_than_min_snapshots() {
        let now = Utc::now();
        let history = volume_series(now, dec!(0), &[dec!(1000); 4]);
        let result = VolumeSpikeDetector::default().evaluate(&market(), &history, now);
        assert_eq!(
            result,
            Err(SkipReason::InsufficientSnapshots { have: 5, need: 10 })
        );
    }

    #[test]
    fn test_volume_spike_detected() {
        let now = Utc::now();
        let mut steps = vec![dec!(1000); 14];
        steps.push(dec!(51000));
        let history = volume_series(now, dec!(100000), &steps);

        let evidence = VolumeSpikeDetector::default()
            .evaluate(&market(), &history, now)
            .unwrap();

        assert_eq!(evidence.market_id, "m1");
        assert_eq!(evidence.signal_type, SignalType::VolumeSpike);
        // mean 4333.33, std 12472.19, z 3.74
        assert_eq!(evidence.confidence, 0.75);
        match evidence.details {
            SignalDetails::VolumeSpike {
                current_volume,
                avg_volume,
                std_dev,
                z_score,
            } => {
                assert_eq!(current_volume, 51000.0);
                assert_eq!(avg_volume, 4333.33);
                assert_eq!(std_dev, 12472.19);
                assert_eq!(z_score, 3.74);
            }
            other => panic!("unexpected details {:?}", other),
        }
    }

    #[test]
    fn test_volume_flat_deltas_never_fire() {
        let now = Utc::now();
        let mut steps = vec![dec!(1000); 14];
        steps.push(dec!(1000));
        let history = volume_series(now, dec!(100000), &steps);

        let result = VolumeSpikeDetector::default().evaluate(&market(), &history, now);
        assert_eq!(result, Err(SkipReason::ZeroVariance));

        let tiny = volume_series(now, dec!(100000), &[dec!(5); 14]);
        let result = VolumeSpikeDetector::default().evaluate(&market(), &tiny, now);
        assert_eq!(result, Err(SkipReason::ZeroVariance));
    }

    #[test]
    fn test_zero_variance_tolerance_is_relative() {
        assert!(is_constant(1000.0, 0.0));
        assert!(is_constant(1000.0, 1000.0 * ZERO_VARIANCE_TOLERANCE));
        assert!(!is_constant(1000.0, 1e-6));
        assert!(!is_constant(0.0, 1e-300));

        // One delta of 1001 among 1000s is a real spread, not noise
        let now = Utc::now();
        let mut steps = vec![dec!(1000); 14];
        steps.push(dec!(1001));
        let history = volume_series(now, dec!(100000), &steps);
        let result = VolumeSpikeDetector::default().evaluate(&market(), &history, now);
        assert_ne!(result.err(), Some(SkipReason::ZeroVariance));
    }

    #[test]
    fn test_volume_below_absolute_floor() {
        let now = Utc::now();
        let mut steps = vec![dec!(10), dec!(20), dec!(10), dec!(20), dec!(10), dec!(20)];
        steps.extend([dec!(10), dec!(20), dec!(10), dec!(20), dec!(900)]);
        let history = volume_series(now, dec!(0), &steps);

        let result = VolumeSpikeDetector::default().evaluate(&market(), &history, now);
        assert!(matches!(result, Err(SkipReason::BelowFloor { latest, .. }) if latest == 900.0));
    }

    #[test]
    fn test_volume_ignores_snapshots_outside_lookback() {
        let now = Utc::now();
        let mut steps = vec![dec!(1000); 14];
        steps.push(dec!(51000));
        let mut history = volume_series(now - Duration::days(8), dec!(100000), &steps);
        history.push(snapshot(now, dec!(300000), Some(dec!(0.5))));

        let result = VolumeSpikeDetector::default().evaluate(&market(), &history, now);
        assert_eq!(
            result,
            Err(SkipReason::InsufficientSnapshots { have: 1, need: 10 })
        );
    }

    #[test]
    fn test_volume_lower_sigma_config() {
        let now = Utc::now();
        let mut steps = vec![dec!(1000), dec!(2000)];
        steps = steps.repeat(7);
        steps.push(dec!(4000));
        let history = volume_series(now, dec!(0), &steps);

        let strict = VolumeSpikeDetector::default().evaluate(&market(), &history, now);
        assert!(matches!(strict, Err(SkipReason::BelowThreshold { .. })));

        let loose = VolumeSpikeDetector::new(VolumeSpikeConfig {
            sigma_threshold: 2.0,
            ..Default::default()
        })
        .evaluate(&market(), &history, now);
        assert!(loose.is_ok());
    }

    #[test]
    fn test_momentum_no_snapshots() {
        let result = PriceMomentumDetector::default().evaluate(&market(), &[], Utc::now());
        assert!(matches!(result, Err(SkipReason::NoSnapshot(_))));
    }

    #[test]
    fn test_momentum_detected_up() {
        let now = Utc::now();
        let history = vec![
            snapshot(now - Duration::hours(7), dec!(100000), Some(dec!(0.50))),
            snapshot(now, dec!(100000), Some(dec!(0.75))),
        ];

        let evidence = PriceMomentumDetector::default()
            .evaluate(&market(), &history, now)
            .unwrap();

        assert_eq!(evidence.signal_type, SignalType::PriceMomentum);
        assert_eq!(evidence.confidence, 0.83);
        assert_eq!(
            evidence.details,
            SignalDetails::PriceMomentum {
                current_price: 0.75,
                earlier_price: 0.5,
                change: 0.25,
                direction: Direction::Up,
            }
        );
    }

    #[test]
    fn test_momentum_detected_down_saturates() {
        let now = Utc::now();
        let history = vec![
            snapshot(now - Duration::hours(12), dec!(1), Some(dec!(0.90))),
            snapshot(now - Duration::hours(6), dec!(1), Some(dec!(0.80))),
            snapshot(now - Duration::hours(1), dec!(1), Some(dec!(0.50))),
            snapshot(now, dec!(1), Some(dec!(0.40))),
        ];

        let evidence = PriceMomentumDetector::default()
            .evaluate(&market(), &history, now)
            .unwrap();

        assert_eq!(evidence.confidence, 1.0);
        assert!(matches!(
            evidence.details,
            SignalDetails::PriceMomentum {
                earlier_price,
                direction: Direction::Down,
                ..
            } if earlier_price == 0.8
        ));
    }

    #[test]
    fn test_momentum_stable_price() {
        let now = Utc::now();
        let history = vec![
            snapshot(now - Duration::hours(7), dec!(1), Some(dec!(0.48))),
            snapshot(now, dec!(1), Some(dec!(0.50))),
        ];

        let result = PriceMomentumDetector::default().evaluate(&market(), &history, now);
        assert!(matches!(result, Err(SkipReason::BelowThreshold { .. })));
    }

    #[test]
    fn test_momentum_requires_earlier_snapshot() {
        let now = Utc::now();
        let history = vec![
            snapshot(now - Duration::hours(2), dec!(1), Some(dec!(0.10))),
            snapshot(now, dec!(1), Some(dec!(0.90))),
        ];

        let result = PriceMomentumDetector::default().evaluate(&market(), &history, now);
        assert_eq!(
            result,
            Err(SkipReason::NoSnapshot("before lookback horizon"))
        );
    }

    #[test]
    fn test_momentum_guards() {
        let now = Utc::now();
        let zero = vec![
            snapshot(now - Duration::hours(7), dec!(1), Some(dec!(0))),
            snapshot(now, dec!(1), Some(dec!(0.9))),
        ];
        assert_eq!(
            PriceMomentumDetector::default().evaluate(&market(), &zero, now),
            Err(SkipReason::ZeroBaseline)
        );

        let missing = vec![
            snapshot(now - Duration::hours(7), dec!(1), Some(dec!(0.2))),
            snapshot(now, dec!(1), None),
        ];
        assert_eq!(
            PriceMomentumDetector::default().evaluate(&market(), &missing, now),
            Err(SkipReason::NoPrice("latest"))
        );
    }
}
