use std::collections::BTreeMap;

use anyhow::Result;
use tracing::debug;

use super::round_dp;
use crate::db::{MarketStore, SnapshotStore};
use crate::error::{Evaluation, SkipReason};
use crate::models::{CalibrationBin, CalibrationReport, CategoryScore, Forecast, Market, Snapshot};

/// Number of fixed-width bins in the reliability curve
pub const CALIBRATION_BINS: usize = 10;

/// Label for markets without a category
pub const UNCATEGORIZED: &str = "Uncategorized";

/// Build a calibration report for resolved markets, optionally restricted to
/// one category.
pub async fn compute_calibration(
    markets: &MarketStore,
    snapshots: &SnapshotStore,
    category: Option<&str>,
) -> Result<CalibrationReport> {
    let resolved = markets.resolved_markets(category).await?;

    let mut forecasts = Vec::with_capacity(resolved.len());
    for market in &resolved {
        let latest = snapshots.latest(&market.id).await?;
        match forecast_for(market, latest.as_ref()) {
            Ok(forecast) => forecasts.push(forecast),
            Err(reason) => debug!("Skipping market {} for calibration: {}", market.id, reason),
        }
    }

    debug!(
        "Calibration over {} of {} resolved markets",
        forecasts.len(),
        resolved.len()
    );

    Ok(score_forecasts(&forecasts))
}

/// Last belief vs. outcome for a resolved binary market.
///
/// `outcomes[0]` is the reference outcome: `actual` is 1.0 when it won.
pub fn forecast_for(market: &Market, latest: Option<&Snapshot>) -> Evaluation<Forecast> {
    let result = market
        .resolution_result
        .as_deref()
        .ok_or(SkipReason::Unresolved)?;

    if !market.is_binary() {
        return Err(SkipReason::NotBinary(market.outcomes.len()));
    }

    let snapshot = latest.ok_or(SkipReason::NoSnapshot("for market"))?;
    let predicted = snapshot.price_f64().ok_or(SkipReason::NoPrice("latest"))?;
    if !(0.0..=1.0).contains(&predicted) {
        return Err(SkipReason::OutOfRange(predicted));
    }

    let actual = if result == market.outcomes[0] { 1.0 } else { 0.0 };

    Ok(Forecast {
        predicted,
        actual,
        category: market.category.clone(),
    })
}

/// Brier score, reliability curve and per-category breakdown.
///
/// No forecasts yields [`CalibrationReport::empty`], without the bin skeleton.
pub fn score_forecasts(forecasts: &[Forecast]) -> CalibrationReport {
    if forecasts.is_empty() {
        return CalibrationReport::empty();
    }

    CalibrationReport {
        brier_score: Some(round_dp(brier_score(forecasts), 4)),
        market_count: forecasts.len(),
        calibration_curve: calibration_bins(forecasts, CALIBRATION_BINS),
        category_breakdown: category_breakdown(forecasts),
    }
}

fn brier_score<'a>(forecasts: impl IntoIterator<Item = &'a Forecast>) -> f64 {
    let (sum, n) = forecasts
        .into_iter()
        .fold((0.0, 0usize), |(sum, n), f| {
            (sum + (f.predicted - f.actual).powi(2), n + 1)
        });
    sum / n as f64
}

fn calibration_bins(forecasts: &[Forecast], n_bins: usize) -> Vec<CalibrationBin> {
    (0..n_bins)
        .map(|i| {
            // Division keeps edges at their decimal values (0.3, not 0.30000000000000004),
            // so exactly 0.3 falls in bin 3. Accumulating `i * 0.1` would put it in bin 2.
            let bin_start = i as f64 / n_bins as f64;
            let bin_end = (i + 1) as f64 / n_bins as f64;
            let last = i == n_bins - 1;

            let in_bin: Vec<&Forecast> = forecasts
                .iter()
                .filter(|f| {
                    (bin_start <= f.predicted && f.predicted < bin_end)
                        || (last && f.predicted == 1.0)
                })
                .collect();

            let (avg_predicted, actual_frequency) = if in_bin.is_empty() {
                ((bin_start + bin_end) / 2.0, None)
            } else {
                let n = in_bin.len() as f64;
                (
                    in_bin.iter().map(|f| f.predicted).sum::<f64>() / n,
                    Some(in_bin.iter().map(|f| f.actual).sum::<f64>() / n),
                )
            };

            CalibrationBin {
                bin_start: round_dp(bin_start, 2),
                bin_end: round_dp(bin_end, 2),
                avg_predicted: round_dp(avg_predicted, 4),
                actual_frequency: actual_frequency.map(|f| round_dp(f, 4)),
                count: in_bin.len(),
            }
        })
        .collect()
}

fn category_breakdown(forecasts: &[Forecast]) -> Vec<CategoryScore> {
    let mut groups: BTreeMap<&str, Vec<&Forecast>> = BTreeMap::new();
    for forecast in forecasts {
        let category = forecast.category.as_deref().unwrap_or(UNCATEGORIZED);
        groups.entry(category).or_default().push(forecast);
    }

    let mut breakdown: Vec<CategoryScore> = groups
        .into_iter()
        .map(|(category, group)| CategoryScore {
            category: category.to_string(),
            brier_score: round_dp(brier_score(group.iter().copied()), 4),
            count: group.len(),
        })
        .collect();

    // Stable sort: equal scores stay in name order
    breakdown.sort_by(|a, b| a.brier_score.total_cmp(&b.brier_score));
    breakdown
}
