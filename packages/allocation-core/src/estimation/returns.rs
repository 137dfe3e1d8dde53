//! Simple periodic returns and mean-return vectors.

use crate::types::{PriceHistory, PriceSeries, ReturnSeries};
use crate::{Error, Result};
use nalgebra::DVector;
use std::collections::HashSet;

/// Mean per-period returns in canonical asset order.
#[derive(Debug, Clone, PartialEq)]
pub struct MeanReturns {
    /// Asset symbols, same order as `values`
    pub symbols: Vec<String>,
    /// Arithmetic mean return per asset
    pub values: DVector<f64>,
}

impl MeanReturns {
    /// Mean return for a symbol.
    pub fn get(&self, symbol: &str) -> Option<f64> {
        let symbol = symbol.to_uppercase();
        self.symbols
            .iter()
            .position(|s| *s == symbol)
            .map(|i| self.values[i])
    }

    /// Number of assets.
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the vector is empty.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// Return series for every asset plus their means.
#[derive(Debug, Clone, PartialEq)]
pub struct ReturnsEstimate {
    /// One series per asset, canonical order
    pub series: Vec<ReturnSeries>,
    /// Mean of each series
    pub mean: MeanReturns,
}

/// Calculate simple returns for one price series.
///
/// `return[t] = (price[t] - price[t-1]) / price[t-1]`; the first observation
/// has no predecessor and produces no return.
///
/// # Errors
///
/// * `InsufficientData` if the series has fewer than two prices
/// * `InputAlignment` if timestamps are not strictly increasing
/// * `NonFinitePrice` if a price is zero or non-finite so that a return is undefined
pub fn simple_returns(series: &PriceSeries) -> Result<ReturnSeries> {
    if series.len() < 2 {
        return Err(Error::InsufficientData(format!(
            "{} has {} price(s); at least two are needed for a return",
            series.symbol,
            series.len()
        )));
    }

    let mut timestamps = Vec::with_capacity(series.len() - 1);
    let mut returns = Vec::with_capacity(series.len() - 1);

    for pair in series.prices.windows(2) {
        let (prev, curr) = (pair[0], pair[1]);

        if curr.timestamp <= prev.timestamp {
            return Err(Error::InputAlignment(format!(
                "{} timestamps are not strictly increasing at {}",
                series.symbol, curr.timestamp
            )));
        }

        let r = (curr.price - prev.price) / prev.price;
        if !r.is_finite() {
            return Err(Error::NonFinitePrice {
                symbol: series.symbol.clone(),
                timestamp: curr.timestamp,
            });
        }

        timestamps.push(curr.timestamp);
        returns.push(r);
    }

    Ok(ReturnSeries {
        symbol: series.symbol.clone(),
        timestamps,
        returns,
    })
}

/// Check that every asset is observed on exactly the same timestamps.
///
/// Alignment is the market-data collaborator's job; this only verifies it.
pub fn validate_alignment(history: &PriceHistory) -> Result<()> {
    let Some(first) = history.assets.first() else {
        return Err(Error::NoAssets);
    };

    let mut seen = HashSet::new();
    for asset in &history.assets {
        if !seen.insert(asset.symbol.as_str()) {
            return Err(Error::InputAlignment(format!(
                "duplicate symbol {}",
                asset.symbol
            )));
        }

        if asset.len() != first.len() {
            return Err(Error::InputAlignment(format!(
                "{} has {} prices but {} has {}",
                asset.symbol,
                asset.len(),
                first.symbol,
                first.len()
            )));
        }

        if let Some((i, _)) = asset
            .timestamps()
            .zip(first.timestamps())
            .enumerate()
            .find(|(_, (a, b))| a != b)
        {
            return Err(Error::InputAlignment(format!(
                "{} and {} disagree on timestamp at row {}",
                asset.symbol, first.symbol, i
            )));
        }
    }

    Ok(())
}

/// Estimate return series and mean returns for an aligned price history.
pub fn estimate_returns(history: &PriceHistory) -> Result<ReturnsEstimate> {
    validate_alignment(history)?;

    let series = history
        .assets
        .iter()
        .map(simple_returns)
        .collect::<Result<Vec<_>>>()?;

    let mut means = Vec::with_capacity(series.len());
    for s in &series {
        let mean = s.mean().ok_or_else(|| {
            Error::InsufficientData(format!("{} has no return periods", s.symbol))
        })?;
        means.push(mean);
    }

    tracing::debug!(
        assets = series.len(),
        periods = series.first().map(|s| s.len()).unwrap_or(0),
        "Estimated simple returns"
    );

    Ok(ReturnsEstimate {
        mean: MeanReturns {
            symbols: series.iter().map(|s| s.symbol.clone()).collect(),
            values: DVector::from_vec(means),
        },
        series,
    })
}
