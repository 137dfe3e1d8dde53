//! Statistical estimation from price history.
//!
//! - **Returns**: simple period-over-period returns and their means
//! - **Covariance**: sample covariance over the same aligned window
//!
//! [`estimate`] runs both over one shared window so that the mean vector and
//! the covariance matrix always describe the same periods.

mod covariance;
mod returns;

pub use covariance::{sample_covariance, CovarianceMatrix};
pub use returns::{
    estimate_returns, simple_returns, validate_alignment, MeanReturns, ReturnsEstimate,
};

use crate::types::{PriceHistory, ReturnSeries};
use crate::Result;

/// Mean returns and covariance estimated from one aligned window.
#[derive(Debug, Clone, PartialEq)]
pub struct Estimates {
    /// Per-asset return series
    pub returns: Vec<ReturnSeries>,
    /// Mean per-period return per asset
    pub mean: MeanReturns,
    /// Per-period sample covariance
    pub covariance: CovarianceMatrix,
}

impl Estimates {
    /// Symbols in canonical order.
    pub fn symbols(&self) -> &[String] {
        &self.mean.symbols
    }

    /// Number of assets.
    pub fn asset_count(&self) -> usize {
        self.mean.len()
    }
}

/// Estimate mean returns and covariance from an aligned price history.
pub fn estimate(history: &PriceHistory) -> Result<Estimates> {
    let ReturnsEstimate { series, mean } = estimate_returns(history)?;
    let covariance = sample_covariance(&series)?;

    Ok(Estimates {
        returns: series,
        mean,
        covariance,
    })
}
