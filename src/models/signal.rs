use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted anomaly signal
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Signal {
    /// Row id
    pub id: i64,

    /// Market the anomaly was detected on
    pub market_id: String,

    pub signal_type: SignalType,

    /// Confidence level (0.0 - 1.0)
    pub confidence: f64,

    pub status: SignalStatus,

    /// Detector evidence from the latest detection
    pub metadata: SignalDetails,

    /// When the condition was first flagged
    pub detected_at: DateTime<Utc>,

    /// When the condition was last re-flagged
    pub last_seen: DateTime<Utc>,
}

/// Kind of anomaly
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    /// Latest volume delta is a statistical outlier
    VolumeSpike,
    /// Price moved sharply over the lookback horizon
    PriceMomentum,
}

impl SignalType {
    pub const ALL: [SignalType; 2] = [SignalType::VolumeSpike, SignalType::PriceMomentum];

    pub fn as_str(&self) -> &'static str {
        match self {
            SignalType::VolumeSpike => "volume_spike",
            SignalType::PriceMomentum => "price_momentum",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "volume_spike" => Some(SignalType::VolumeSpike),
            "price_momentum" => Some(SignalType::PriceMomentum),
            _ => None,
        }
    }
}

impl std::fmt::Display for SignalType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Signal lifecycle state
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    /// Condition flagged by the latest detection cycle
    Active,
    /// Condition no longer flagged
    Resolved,
}

impl SignalStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SignalStatus::Active => "active",
            SignalStatus::Resolved => "resolved",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "active" => Some(SignalStatus::Active),
            "resolved" => Some(SignalStatus::Resolved),
            _ => None,
        }
    }
}

/// Direction of a price move
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Up,
    Down,
}

/// Detector-specific evidence, stored as the signal's metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SignalDetails {
    VolumeSpike {
        current_volume: f64,
        avg_volume: f64,
        std_dev: f64,
        z_score: f64,
    },
    PriceMomentum {
        current_price: f64,
        earlier_price: f64,
        change: f64,
        direction: Direction,
    },
}

/// A freshly detected anomaly, before reconciliation against stored signals
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evidence {
    pub market_id: String,
    pub title: String,
    pub signal_type: SignalType,
    pub confidence: f64,
    pub details: SignalDetails,
}
