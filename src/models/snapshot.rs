use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One timestamped observation of a market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub market_id: String,

    pub ts: DateTime<Utc>,

    /// Price of the first outcome (0.0 - 1.0)
    pub price: Option<Decimal>,

    /// Cumulative traded volume in USD
    pub volume: Decimal,

    /// Event liquidity in USD
    pub liquidity: Decimal,
}

impl Snapshot {
    pub fn price_f64(&self) -> Option<f64> {
        self.price.and_then(|p| p.to_f64())
    }

    pub fn volume_f64(&self) -> f64 {
        self.volume.to_f64().unwrap_or(0.0)
    }
}
