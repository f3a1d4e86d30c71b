use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use reqwest::Client;
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::{debug, warn};

use crate::analysis::resolution::{decode_list, parse_labels};
use crate::models::{Market, MarketStatus};

/// Client for Polymarket Gamma API
pub struct PolymarketClient {
    client: Client,
    base_url: String,
}

/// Event from the Gamma `/events` listing
#[derive(Debug, Clone, Deserialize)]
pub struct GammaEvent {
    #[serde(default)]
    pub tags: Option<Vec<GammaTag>>,

    /// Markets that decoded; malformed entries are dropped
    #[serde(default, deserialize_with = "lenient_markets")]
    pub markets: Vec<GammaMarket>,

    /// Event liquidity, number or numeric string
    #[serde(default)]
    pub liquidity: Option<Value>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GammaTag {
    #[serde(default)]
    pub label: Option<String>,
}

/// Market within an event
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GammaMarket {
    /// String or numeric id, normalised to a string
    #[serde(deserialize_with = "market_id")]
    pub id: String,

    #[serde(default)]
    pub question: Option<String>,

    /// JSON-encoded string or array of labels
    #[serde(default)]
    pub outcomes: Option<Value>,

    /// JSON-encoded string or array of prices
    #[serde(default)]
    pub outcome_prices: Option<Value>,

    /// Cumulative volume, number or numeric string
    #[serde(default)]
    pub volume: Option<Value>,

    #[serde(default)]
    pub closed: Option<bool>,
}

impl PolymarketClient {
    /// Create a new Polymarket client
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Fetch events with their markets
    pub async fn get_events(&self, limit: u32, closed: bool) -> Result<Vec<GammaEvent>> {
        let url = format!("{}/events", self.base_url);
        debug!("Fetching events from: {} (closed: {})", url, closed);

        let response = self
            .client
            .get(&url)
            .query(&[("limit", limit.to_string()), ("closed", closed.to_string())])
            .header("Accept", "application/json")
            .send()
            .await
            .context("Failed to fetch events")?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            warn!("Polymarket API error: {} - {}", status, text);
            anyhow::bail!("Events API error: {} - {}", status, text);
        }

        let body: Value = response
            .json()
            .await
            .context("Failed to parse events response")?;

        let events = parse_events(body)?;
        debug!("Fetched {} events", events.len());
        Ok(events)
    }
}

/// Decode an `/events` body, skipping events that do not decode
pub fn parse_events(body: Value) -> Result<Vec<GammaEvent>> {
    let Value::Array(items) = body else {
        anyhow::bail!("Events response is not a list");
    };

    Ok(items
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<GammaEvent>(item) {
            Ok(event) => Some(event),
            Err(e) => {
                debug!("Skipping malformed event: {}", e);
                None
            }
        })
        .collect())
}

impl GammaEvent {
    pub fn markets(&self) -> &[GammaMarket] {
        &self.markets
    }

    /// First tag's label, title-cased
    pub fn category(&self) -> Option<String> {
        self.tags
            .as_ref()?
            .first()?
            .label
            .as_deref()
            .map(title_case)
    }

    pub fn liquidity(&self) -> Decimal {
        self.liquidity
            .as_ref()
            .and_then(decimal_value)
            .unwrap_or(Decimal::ZERO)
    }
}

impl GammaMarket {
    /// Convert to the local market model under the event's category
    pub fn to_market(&self, category: Option<String>) -> Market {
        Market {
            id: self.id.clone(),
            title: self.question.clone().unwrap_or_default(),
            category,
            status: MarketStatus::from_closed(self.is_closed()),
            resolution_result: None,
            outcomes: parse_labels(self.outcomes.as_ref()).unwrap_or_default(),
            outcome_prices: self.price_strings(),
        }
    }

    /// A null or missing flag counts as open
    pub fn is_closed(&self) -> bool {
        self.closed.unwrap_or(false)
    }

    pub fn volume(&self) -> Decimal {
        self.volume
            .as_ref()
            .and_then(decimal_value)
            .unwrap_or(Decimal::ZERO)
    }

    /// Price of the first outcome, if the price vector parses
    pub fn first_outcome_price(&self) -> Option<Decimal> {
        decode_list(self.outcome_prices.as_ref(), "outcome_prices")
            .ok()?
            .first()
            .and_then(decimal_value)
    }

    /// Outcome prices as strings, empty if the vector is malformed
    pub fn price_strings(&self) -> Vec<String> {
        decode_list(self.outcome_prices.as_ref(), "outcome_prices")
            .map(|prices| {
                prices
                    .iter()
                    .map(|p| match p {
                        Value::String(s) => s.clone(),
                        other => other.to_string(),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn lenient_markets<'de, D>(deserializer: D) -> std::result::Result<Vec<GammaMarket>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<Value>> = Option::deserialize(deserializer)?;

    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|item| match serde_json::from_value::<GammaMarket>(item) {
            Ok(market) => Some(market),
            Err(e) => {
                debug!("Skipping malformed market: {}", e);
                None
            }
        })
        .collect())
}

fn market_id<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) if !s.trim().is_empty() => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!("unusable market id {}", other))),
    }
}

/// Decimal from a JSON number or numeric string
fn decimal_value(value: &Value) -> Option<Decimal> {
    match value {
        Value::String(s) => {
            let s = s.trim();
            Decimal::from_str(s)
                .or_else(|_| Decimal::from_scientific(s))
                .ok()
        }
        Value::Number(n) => n.as_f64().and_then(Decimal::from_f64),
        _ => None,
    }
}

/// Capitalize the first letter of every word and lowercase the rest
pub fn title_case(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut prev_alpha = false;
    for c in s.chars() {
        if c.is_alphabetic() {
            if prev_alpha {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_alpha = true;
        } else {
            out.push(c);
            prev_alpha = false;
        }
    }
    out
}
