//! Allocation Core - Mean-variance portfolio allocation library.
//!
//! This crate turns an aligned price history into a long-only, fully invested
//! allocation and an approximate efficient frontier:
//!
//! - **Estimation**: periodic simple returns, mean returns, sample covariance
//! - **Optimization**: Sharpe-ratio maximization on the weight simplex
//! - **Frontier sampling**: seeded Monte-Carlo portfolios with risk/return/Sharpe
//! - **Allocation**: one result value handed to reporting and charting code
//!
//! # Example
//!
//! ```rust,no_run
//! use allocation_core::{allocate, AllocationConfig, PriceHistory};
//!
//! let history = PriceHistory::load("prices.json")?;
//! let config = AllocationConfig::load_default()?;
//!
//! let result = allocate(&history, &config)?;
//! for (symbol, weight) in result.weights_by_symbol() {
//!     println!("{symbol}: {weight:.4}");
//! }
//! println!("Sharpe: {:.4}", result.optimal.metrics.sharpe_ratio);
//! # Ok::<(), allocation_core::Error>(())
//! ```

pub mod allocation;
pub mod config;
pub mod estimation;
pub mod frontier;
pub mod optimize;
pub mod types;

use chrono::{DateTime, Utc};

// Re-export commonly used types
pub use types::{
    ApiResponse, FrontierPoint, FrontierSet, PortfolioMetrics, PricePoint, PriceHistory,
    PriceSeries, ReturnSeries, WeightBounds,
};

// Re-export main functionality
pub use allocation::{allocate, assemble, AllocationResult, AssetWeight, OptimalAllocation};
pub use config::AllocationConfig;
pub use estimation::{estimate, sample_covariance, simple_returns, CovarianceMatrix, Estimates};
pub use frontier::FrontierSampler;
pub use optimize::{MeanVarianceModel, OptimalPortfolio, SharpeOptimizer};

/// Error types for allocation-core operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Input alignment error: {0}")]
    InputAlignment(String),

    #[error("Non-finite return for {symbol} at {timestamp}")]
    NonFinitePrice {
        symbol: String,
        timestamp: DateTime<Utc>,
    },

    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    #[error("No assets supplied")]
    NoAssets,

    #[error("Degenerate optimization: {0}")]
    DegenerateOptimization(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),
}

/// Result type for allocation-core operations.
pub type Result<T> = std::result::Result<T, Error>;
