//! End-to-end allocation and the result handed to presentation code.

use crate::config::AllocationConfig;
use crate::estimation::estimate;
use crate::frontier::FrontierSampler;
use crate::optimize::{MeanVarianceModel, OptimalPortfolio, SharpeOptimizer};
use crate::types::{FrontierSet, PortfolioMetrics, PriceHistory};
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Weight assigned to one asset.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AssetWeight {
    /// Asset ticker symbol
    pub symbol: String,
    /// Fraction of capital
    pub weight: f64,
}

/// The maximum Sharpe-ratio portfolio, keyed by symbol.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptimalAllocation {
    /// Weights in canonical asset order
    pub weights: Vec<AssetWeight>,
    /// Annualized risk, return and Sharpe ratio
    pub metrics: PortfolioMetrics,
}

/// Everything one allocation run produces.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AllocationResult {
    /// Asset symbols in canonical order; frontier weights use the same order
    pub symbols: Vec<String>,
    /// Optimizer output
    pub optimal: OptimalAllocation,
    /// Sampled portfolios in draw order
    pub frontier: FrontierSet,
}

impl AllocationResult {
    /// Optimal weight for a symbol.
    pub fn weight_of(&self, symbol: &str) -> Option<f64> {
        let symbol = symbol.to_uppercase();
        self.optimal
            .weights
            .iter()
            .find(|w| w.symbol == symbol)
            .map(|w| w.weight)
    }

    /// `(symbol, weight)` pairs of the optimal portfolio in canonical order.
    pub fn weights_by_symbol(&self) -> Vec<(&str, f64)> {
        self.optimal
            .weights
            .iter()
            .map(|w| (w.symbol.as_str(), w.weight))
            .collect()
    }
}

/// Package optimizer output and frontier samples into one result.
///
/// Fails with `InputAlignment` if the weight vectors do not match the symbols.
pub fn assemble(
    symbols: &[String],
    optimal: OptimalPortfolio,
    frontier: FrontierSet,
) -> Result<AllocationResult> {
    if optimal.weights.len() != symbols.len() {
        return Err(Error::InputAlignment(format!(
            "{} optimal weights for {} symbols",
            optimal.weights.len(),
            symbols.len()
        )));
    }
    if let Some(point) = frontier.iter().find(|p| p.weights.len() != symbols.len()) {
        return Err(Error::InputAlignment(format!(
            "frontier point has {} weights for {} symbols",
            point.weights.len(),
            symbols.len()
        )));
    }

    let weights = symbols
        .iter()
        .zip(optimal.weights)
        .map(|(symbol, weight)| AssetWeight {
            symbol: symbol.clone(),
            weight,
        })
        .collect();

    Ok(AllocationResult {
        symbols: symbols.to_vec(),
        optimal: OptimalAllocation {
            weights,
            metrics: optimal.metrics,
        },
        frontier,
    })
}

/// Estimate, optimize and sample the frontier for one price history.
pub fn allocate(history: &PriceHistory, config: &AllocationConfig) -> Result<AllocationResult> {
    config.validate()?;

    let estimates = estimate(history)?;
    let model = MeanVarianceModel::from_estimates(
        &estimates,
        config.risk_free_rate,
        config.annualization_factor,
    )?;

    let n = model.asset_count();
    let optimal =
        SharpeOptimizer::from_config(config).optimize_model(&model, &vec![1.0 / n as f64; n])?;
    let frontier = FrontierSampler::from_config(config).sample_model(&model)?;

    tracing::info!(
        assets = n,
        periods = estimates.returns.first().map(|r| r.len()).unwrap_or(0),
        sharpe = optimal.metrics.sharpe_ratio,
        frontier_points = frontier.len(),
        "Allocation complete"
    );

    assemble(estimates.symbols(), optimal, frontier)
}
