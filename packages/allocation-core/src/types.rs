//! Core data types for the allocation engine.

use crate::{Error, Result};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fs;
use std::path::Path;

/// Tolerance used when checking that weights are fully invested.
pub const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

/// Slack allowed on the per-asset box bounds.
pub const BOUND_TOLERANCE: f64 = 1e-9;

/// One adjusted price observation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PricePoint {
    /// Observation time
    pub timestamp: DateTime<Utc>,
    /// Adjusted close price
    pub price: f64,
}

impl PricePoint {
    /// Create a new price observation.
    pub fn new(timestamp: DateTime<Utc>, price: f64) -> Self {
        Self { timestamp, price }
    }
}

/// Time-ordered price history for a single asset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PriceSeries {
    /// Asset ticker symbol (uppercase)
    pub symbol: String,
    /// Observations, strictly increasing by timestamp
    pub prices: Vec<PricePoint>,
}

impl PriceSeries {
    /// Create a new price series. The symbol is normalized to uppercase.
    pub fn new(symbol: &str, prices: Vec<PricePoint>) -> Self {
        Self {
            symbol: symbol.to_uppercase(),
            prices,
        }
    }

    /// Build a daily series from consecutive closes starting at `start`.
    pub fn from_closes(symbol: &str, start: DateTime<Utc>, closes: &[f64]) -> Self {
        let prices = closes
            .iter()
            .enumerate()
            .map(|(i, &price)| PricePoint::new(start + Duration::days(i as i64), price))
            .collect();
        Self::new(symbol, prices)
    }

    /// Number of observations.
    pub fn len(&self) -> usize {
        self.prices.len()
    }

    /// Whether the series has no observations.
    pub fn is_empty(&self) -> bool {
        self.prices.is_empty()
    }

    /// Iterate over the observation timestamps.
    pub fn timestamps(&self) -> impl Iterator<Item = DateTime<Utc>> + '_ {
        self.prices.iter().map(|p| p.timestamp)
    }
}

/// Price histories for a fixed, ordered set of assets.
///
/// The order of `assets` is the canonical asset order: every mean vector,
/// covariance matrix and weight vector derived from this history is indexed
/// the same way.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct PriceHistory {
    /// One series per asset
    pub assets: Vec<PriceSeries>,
}

impl PriceHistory {
    /// Create a history from already aligned series.
    pub fn new(assets: Vec<PriceSeries>) -> Self {
        Self { assets }
    }

    /// Parse a history from its JSON representation.
    pub fn from_json(content: &str) -> Result<Self> {
        Ok(serde_json::from_str(content)?)
    }

    /// Load a history from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// Symbols in canonical order.
    pub fn symbols(&self) -> Vec<String> {
        self.assets.iter().map(|a| a.symbol.clone()).collect()
    }

    /// Number of assets.
    pub fn asset_count(&self) -> usize {
        self.assets.len()
    }

    /// Return a copy of this history with assets arranged in `symbols` order.
    ///
    /// Every requested symbol must be present exactly once; assets not named
    /// in `symbols` are dropped.
    pub fn reorder<S: AsRef<str>>(&self, symbols: &[S]) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut assets = Vec::with_capacity(symbols.len());

        for symbol in symbols {
            let wanted = symbol.as_ref().to_uppercase();
            if !seen.insert(wanted.clone()) {
                return Err(Error::InputAlignment(format!(
                    "symbol {} requested more than once",
                    wanted
                )));
            }

            let series = self
                .assets
                .iter()
                .find(|a| a.symbol == wanted)
                .ok_or_else(|| {
                    Error::InputAlignment(format!("symbol {} not present in history", wanted))
                })?;
            assets.push(series.clone());
        }

        Ok(Self { assets })
    }
}

/// Period-over-period simple returns for one asset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ReturnSeries {
    /// Asset ticker symbol
    pub symbol: String,
    /// End-of-period timestamps (the first price has no return)
    pub timestamps: Vec<DateTime<Utc>>,
    /// Fractional returns, one per timestamp
    pub returns: Vec<f64>,
}

impl ReturnSeries {
    /// Number of return periods.
    pub fn len(&self) -> usize {
        self.returns.len()
    }

    /// Whether the series has no periods.
    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }

    /// Arithmetic mean return, or `None` for an empty series.
    pub fn mean(&self) -> Option<f64> {
        if self.returns.is_empty() {
            return None;
        }
        Some(self.returns.iter().sum::<f64>() / self.returns.len() as f64)
    }
}

/// Per-asset weight bounds applied uniformly to every asset.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WeightBounds {
    /// Minimum weight per asset
    pub lower: f64,
    /// Maximum weight per asset
    pub upper: f64,
}

impl Default for WeightBounds {
    fn default() -> Self {
        Self {
            lower: 0.0,
            upper: 1.0,
        }
    }
}

impl WeightBounds {
    /// Create bounds, rejecting anything outside long-only `[0, 1]`.
    pub fn new(lower: f64, upper: f64) -> Result<Self> {
        let bounds = Self { lower, upper };
        bounds.validate()?;
        Ok(bounds)
    }

    /// Check that the bounds describe a long-only, unlevered box.
    pub fn validate(&self) -> Result<()> {
        if !self.lower.is_finite() || !self.upper.is_finite() {
            return Err(Error::InvalidConfig(
                "weight bounds must be finite".to_string(),
            ));
        }
        if self.lower < 0.0 || self.upper > 1.0 || self.lower > self.upper {
            return Err(Error::InvalidConfig(format!(
                "weight bounds [{}, {}] must satisfy 0 <= lower <= upper <= 1",
                self.lower, self.upper
            )));
        }
        Ok(())
    }

    /// Whether a fully invested portfolio of `n` assets can satisfy the bounds.
    pub fn is_feasible_for(&self, n: usize) -> bool {
        let n = n as f64;
        n > 0.0
            && n * self.lower <= 1.0 + WEIGHT_SUM_TOLERANCE
            && n * self.upper >= 1.0 - WEIGHT_SUM_TOLERANCE
    }

    /// Clamp a value into the box.
    pub fn clamp(&self, value: f64) -> f64 {
        value.max(self.lower).min(self.upper)
    }

    /// Whether a weight lies in the box, allowing [`BOUND_TOLERANCE`] slack.
    pub fn contains(&self, weight: f64) -> bool {
        weight >= self.lower - BOUND_TOLERANCE && weight <= self.upper + BOUND_TOLERANCE
    }
}

/// Annualized risk, return and Sharpe ratio of one portfolio.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct PortfolioMetrics {
    /// Annualized standard deviation of return
    pub risk: f64,
    /// Annualized expected return
    #[serde(rename = "return")]
    pub expected_return: f64,
    /// (return - risk-free rate) / risk
    pub sharpe_ratio: f64,
}

/// A sampled portfolio together with its metrics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FrontierPoint {
    /// Weights in canonical asset order
    pub weights: Vec<f64>,
    /// Annualized metrics for these weights
    #[serde(flatten)]
    pub metrics: PortfolioMetrics,
}

/// Frontier points in draw order.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct FrontierSet {
    /// Sampled portfolios, never sorted
    pub points: Vec<FrontierPoint>,
}

impl FrontierSet {
    /// Number of sampled portfolios.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    /// Whether nothing was sampled.
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Iterate over points in draw order.
    pub fn iter(&self) -> std::slice::Iter<'_, FrontierPoint> {
        self.points.iter()
    }
}

/// API response wrapper for CLI output.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiResponse<T> {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl<T> ApiResponse<T> {
    /// Create a successful response.
    pub fn ok(data: T) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    /// Create an error response.
    pub fn err(error: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(error.into()),
        }
    }
}
