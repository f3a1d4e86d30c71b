//! Signal detection, resolution inference, signal reconciliation and
//! calibration scoring. Everything here is pure apart from
//! [`calibration::compute_calibration`], which loads its inputs from the stores.

pub mod calibration;
pub mod detectors;
pub mod lifecycle;
pub mod resolution;

pub use calibration::{compute_calibration, score_forecasts};
pub use detectors::{Detector, PriceMomentumDetector, VolumeSpikeDetector};
pub use lifecycle::{plan_reconciliation, ReconcilePlan, SignalKey, Transition};
pub use resolution::infer_resolution;

use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use rust_decimal::Decimal;

/// Round to `dp` decimal places, ties to even (`Decimal::round_dp` is banker's rounding).
pub fn round_dp(value: f64, dp: u32) -> f64 {
    Decimal::from_f64(value)
        .map(|d| d.round_dp(dp))
        .and_then(|d| d.to_f64())
        .unwrap_or(value)
}
