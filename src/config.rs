use std::env;
use std::str::FromStr;

use anyhow::{Context, Result};
use chrono::Duration;
use rust_decimal::Decimal;

use crate::analysis::detectors::DetectionConfig;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Polymarket Gamma API URL
    pub polymarket_api_url: String,

    /// SQLite database path
    pub database_url: String,

    /// Seconds between snapshot and detection cycles
    pub snapshot_interval: u64,

    /// Seconds between market and resolution syncs
    pub sync_interval: u64,

    /// Days of snapshots kept for open markets
    pub snapshot_retention_days: i64,

    /// Markets trading below this cumulative volume are not snapshotted
    pub min_snapshot_volume: Decimal,

    /// Events requested per feed call
    pub event_fetch_limit: u32,

    /// HTTP request timeout in seconds
    pub request_timeout: u64,

    /// Detector thresholds
    pub detection: DetectionConfig,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut detection = DetectionConfig::default();
        detection.volume_spike.sigma_threshold =
            parse_or(&lookup, "VOLUME_SPIKE_SIGMA", detection.volume_spike.sigma_threshold)?;
        detection.volume_spike.min_volume_delta = parse_or(
            &lookup,
            "VOLUME_SPIKE_MIN_DELTA",
            detection.volume_spike.min_volume_delta,
        )?;
        detection.price_momentum.threshold =
            parse_or(&lookup, "MOMENTUM_THRESHOLD", detection.price_momentum.threshold)?;
        detection.price_momentum.lookback =
            Duration::hours(parse_or(&lookup, "MOMENTUM_LOOKBACK_HOURS", 6)?);

        Ok(Config {
            polymarket_api_url: lookup("POLYMARKET_API_URL")
                .unwrap_or_else(|| "https://gamma-api.polymarket.com".to_string()),

            database_url: lookup("DATABASE_URL")
                .unwrap_or_else(|| "sqlite:data/polywatch.db".to_string()),

            snapshot_interval: parse_or(&lookup, "SNAPSHOT_INTERVAL", 300)?,
            sync_interval: parse_or(&lookup, "SYNC_INTERVAL", 43_200)?,
            snapshot_retention_days: parse_or(&lookup, "SNAPSHOT_RETENTION_DAYS", 5)?,
            min_snapshot_volume: parse_or(&lookup, "MIN_SNAPSHOT_VOLUME", Decimal::from(10_000))?,
            event_fetch_limit: parse_or(&lookup, "EVENT_FETCH_LIMIT", 100)?,
            request_timeout: parse_or(&lookup, "REQUEST_TIMEOUT", 30)?,
            detection,
        })
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("{} must be a valid number", key)),
        None => Ok(default),
    }
}
