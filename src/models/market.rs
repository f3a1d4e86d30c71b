use serde::{Deserialize, Serialize};

/// A Polymarket market tracked locally
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Market {
    /// Gamma market id
    pub id: String,

    /// Market question
    pub title: String,

    /// Title-cased label of the parent event's first tag
    pub category: Option<String>,

    /// Open or closed, as last reported by the feed
    pub status: MarketStatus,

    /// Winning outcome label once resolved (never cleared)
    pub resolution_result: Option<String>,

    /// Outcome labels in feed order; `outcomes[0]` is the reference outcome
    pub outcomes: Vec<String>,

    /// Last known outcome prices as received
    pub outcome_prices: Vec<String>,
}

impl Market {
    pub fn is_binary(&self) -> bool {
        self.outcomes.len() == 2
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum MarketStatus {
    Open,
    Closed,
}

impl MarketStatus {
    pub fn from_closed(closed: bool) -> Self {
        if closed {
            MarketStatus::Closed
        } else {
            MarketStatus::Open
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MarketStatus::Open => "open",
            MarketStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(MarketStatus::Open),
            "closed" => Some(MarketStatus::Closed),
            _ => None,
        }
    }
}

/// A newly inferred resolution for a closed market
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    pub market_id: String,

    /// Winning outcome label
    pub result: String,

    /// Final outcome prices the result was inferred from
    pub outcome_prices: Vec<String>,
}
