use std::env;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use polywatch::analysis::compute_calibration;
use polywatch::api::PolymarketClient;
use polywatch::config::Config;
use polywatch::db::signals::{ACTIVE_SIGNALS_MAX_LIMIT, HISTORY_MAX_LIMIT};
use polywatch::db::{self, MarketStore, SignalStore, SnapshotStore};
use polywatch::models::SignalType;
use polywatch::workers::{CollectorWorker, SignalDetector};

const USAGE: &str = "usage: polywatch <run | once | calibration [--category C] | signals [--type T] [--market M] [--limit N]>";

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "polywatch=info,warn".into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let command = args.first().map(String::as_str).unwrap_or("run");

    // Load configuration
    let config = Config::from_env()?;

    // Initialize database
    let pool = db::connect(&config.database_url).await?;
    let markets = MarketStore::new(pool.clone());
    let snapshots = SnapshotStore::new(pool.clone());
    let signals = SignalStore::new(pool);

    match command {
        "run" | "once" => {
            let client = PolymarketClient::new(
                &config.polymarket_api_url,
                Duration::from_secs(config.request_timeout),
            )?;
            let detector = SignalDetector::new(
                markets.clone(),
                snapshots.clone(),
                signals,
                &config.detection,
            );
            let worker = CollectorWorker::new(client, markets, snapshots, detector, config);

            if command == "once" {
                info!("Running a single collection cycle");
                worker.run_cycle(true).await;
                return Ok(());
            }

            info!("Starting polywatch collector");
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {
                    info!("Shutdown signal received");
                }
                _ = worker.run() => {
                    error!("Collector exited unexpectedly");
                }
            }

            info!("Shutting down polywatch");
        }
        "calibration" => {
            let category = flag(&args, "--category");
            let report = compute_calibration(&markets, &snapshots, category).await?;
            print_json(&report)?;
        }
        "signals" => {
            let signal_type = match flag(&args, "--type") {
                Some(raw) => Some(
                    SignalType::parse(raw)
                        .with_context(|| format!("Unknown signal type {}", raw))?,
                ),
                None => None,
            };

            let found = match flag(&args, "--market") {
                Some(market_id) => {
                    let limit = parse_limit(&args, HISTORY_MAX_LIMIT)?;
                    let mut history = signals.history_for_market(market_id, limit).await?;
                    if let Some(signal_type) = signal_type {
                        history.retain(|s| s.signal_type == signal_type);
                    }
                    history
                }
                None => {
                    let limit = parse_limit(&args, ACTIVE_SIGNALS_MAX_LIMIT)?;
                    signals.active_signals(signal_type, limit).await?
                }
            };
            print_json(&found)?;
        }
        other => {
            anyhow::bail!("Unknown command {}\n{}", other, USAGE);
        }
    }

    Ok(())
}

/// Value following `name` on the command line
fn flag<'a>(args: &'a [String], name: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == name)
        .and_then(|i| args.get(i + 1))
        .map(String::as_str)
}

/// `--limit` value, defaulting to `max`; the stores cap it
fn parse_limit(args: &[String], max: i64) -> Result<i64> {
    match flag(args, "--limit") {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("--limit must be a number, got {}", raw)),
        None => Ok(max),
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", out);
    Ok(())
}
