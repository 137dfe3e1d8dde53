//! Monte-Carlo approximation of the efficient frontier.
//!
//! Each sample normalizes `n` i.i.d. uniform draws by their sum. The result
//! is a long-only, fully invested weight vector, but it is NOT uniformly
//! distributed over the simplex: portfolios near equal weight are
//! over-represented. That bias is accepted for a scatter of the risk/return
//! surface.
//!
//! Sample `i` draws from its own ChaCha stream keyed by `(seed, i)`, so the
//! frontier is a pure function of the seed and inputs, independent of whether
//! samples run sequentially or on the rayon pool.

use crate::config::AllocationConfig;
use crate::optimize::MeanVarianceModel;
use crate::types::{FrontierPoint, FrontierSet};
use crate::{Error, Result};
use nalgebra::{DMatrix, DVector};
use rand::distributions::OpenClosed01;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;

/// Draws random long-only portfolios and evaluates their metrics.
#[derive(Debug, Clone)]
pub struct FrontierSampler {
    num_portfolios: usize,
    seed: u64,
    risk_free_rate: f64,
    annualization_factor: u32,
    parallel: bool,
}

impl Default for FrontierSampler {
    fn default() -> Self {
        Self::from_config(&AllocationConfig::default())
    }
}

impl FrontierSampler {
    /// Create a sampler drawing `num_portfolios` portfolios from `seed`.
    pub fn new(num_portfolios: usize, seed: u64) -> Self {
        Self {
            num_portfolios,
            seed,
            ..Self::default()
        }
    }

    /// Create a sampler from run configuration.
    pub fn from_config(config: &AllocationConfig) -> Self {
        Self {
            num_portfolios: config.num_portfolios,
            seed: config.random_seed,
            risk_free_rate: config.risk_free_rate,
            annualization_factor: config.annualization_factor,
            parallel: config.parallel,
        }
    }

    /// Set the annual risk-free rate.
    pub fn with_risk_free_rate(mut self, risk_free_rate: f64) -> Self {
        self.risk_free_rate = risk_free_rate;
        self
    }

    /// Set the number of return periods per year.
    pub fn with_annualization_factor(mut self, annualization_factor: u32) -> Self {
        self.annualization_factor = annualization_factor;
        self
    }

    /// Run samples on the rayon thread pool.
    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    /// Sample the frontier for per-period mean returns and covariance.
    ///
    /// # Errors
    ///
    /// * `NoAssets` for an empty mean vector
    /// * `InvalidConfig` when `num_portfolios` is zero
    /// * `DegenerateOptimization` if a drawn portfolio has zero variance
    pub fn sample(&self, mean: &DVector<f64>, covariance: &DMatrix<f64>) -> Result<FrontierSet> {
        let model = MeanVarianceModel::new(
            mean,
            covariance,
            self.risk_free_rate,
            self.annualization_factor,
        )?;
        self.sample_model(&model)
    }

    /// Sample the frontier of an already validated model.
    pub fn sample_model(&self, model: &MeanVarianceModel) -> Result<FrontierSet> {
        if self.num_portfolios == 0 {
            return Err(Error::InvalidConfig(
                "num_portfolios must be positive".to_string(),
            ));
        }

        let n = model.asset_count();
        tracing::debug!(
            samples = self.num_portfolios,
            assets = n,
            seed = self.seed,
            parallel = self.parallel,
            "Sampling frontier"
        );

        let evaluate = |index: usize| -> Result<FrontierPoint> {
            let weights = self.draw_weights(index, n);
            let metrics = model.metrics(&weights)?;
            Ok(FrontierPoint { weights, metrics })
        };

        // Both paths collect by sample index, never by completion order
        let points = if self.parallel {
            (0..self.num_portfolios)
                .into_par_iter()
                .map(evaluate)
                .collect::<Result<Vec<_>>>()?
        } else {
            (0..self.num_portfolios)
                .map(evaluate)
                .collect::<Result<Vec<_>>>()?
        };

        Ok(FrontierSet { points })
    }

    /// Random weights for sample `index`, normalized to sum to one.
    fn draw_weights(&self, index: usize, n: usize) -> Vec<f64> {
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed);
        rng.set_stream(index as u64);

        // Draws lie in (0, 1], so the sum is strictly positive
        let draws: Vec<f64> = (0..n).map(|_| rng.sample(OpenClosed01)).collect();
        let total: f64 = draws.iter().sum();
        draws.into_iter().map(|d| d / total).collect()
    }
}
