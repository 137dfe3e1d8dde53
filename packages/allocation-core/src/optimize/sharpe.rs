//! Maximum Sharpe-ratio allocation.

use super::model::MeanVarianceModel;
use super::solver::{Objective, ProjectedGradient, SolverSettings, Termination};
use crate::config::AllocationConfig;
use crate::types::{PortfolioMetrics, WeightBounds, WEIGHT_SUM_TOLERANCE};
use crate::{Error, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Optimal weights and their metrics.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OptimalPortfolio {
    /// Weights in canonical asset order
    pub weights: Vec<f64>,
    /// Annualized metrics of `weights`
    pub metrics: PortfolioMetrics,
    /// Solver steps taken
    pub iterations: usize,
    /// Why the solver stopped
    pub termination: Termination,
}

/// Negative Sharpe ratio, so that minimizing it maximizes the Sharpe ratio.
struct NegativeSharpe<'a> {
    model: &'a MeanVarianceModel,
}

impl Objective for NegativeSharpe<'_> {
    fn value(&self, x: &[f64]) -> Result<f64> {
        Ok(-self.model.metrics(x)?.sharpe_ratio)
    }

    fn gradient(&self, x: &[f64]) -> Result<Vec<f64>> {
        let (_, grad) = self.model.sharpe_gradient(x)?;
        Ok(grad.into_iter().map(|g| -g).collect())
    }

    fn hessian(&self, x: &[f64]) -> Result<Option<DMatrix<f64>>> {
        Ok(Some(-self.model.sharpe_hessian(x)?))
    }
}

/// Finds long-only weights maximizing the annualized Sharpe ratio.
///
/// Solves `max (w.mu*k - rf) / sqrt(k * w'Sigma w)` subject to `sum(w) = 1`
/// and `lower <= w_i <= upper`, seeded from equal weights.
#[derive(Debug, Clone)]
pub struct SharpeOptimizer {
    risk_free_rate: f64,
    annualization_factor: u32,
    bounds: WeightBounds,
    solver: ProjectedGradient,
}

impl Default for SharpeOptimizer {
    fn default() -> Self {
        Self::from_config(&AllocationConfig::default())
    }
}

impl SharpeOptimizer {
    /// Create an optimizer with an annual risk-free rate and periods per year.
    pub fn new(risk_free_rate: f64, annualization_factor: u32) -> Self {
        Self {
            risk_free_rate,
            annualization_factor,
            ..Self::default()
        }
    }

    /// Create an optimizer from run configuration.
    pub fn from_config(config: &AllocationConfig) -> Self {
        Self {
            risk_free_rate: config.risk_free_rate,
            annualization_factor: config.annualization_factor,
            bounds: config.bounds,
            solver: ProjectedGradient::new(config.solver),
        }
    }

    /// Use custom per-asset weight bounds.
    pub fn with_bounds(mut self, bounds: WeightBounds) -> Self {
        self.bounds = bounds;
        self
    }

    /// Use custom solver settings.
    pub fn with_solver(mut self, settings: SolverSettings) -> Self {
        self.solver = ProjectedGradient::new(settings);
        self
    }

    /// Maximize the Sharpe ratio for per-period mean returns and covariance.
    pub fn optimize(
        &self,
        mean: &DVector<f64>,
        covariance: &DMatrix<f64>,
    ) -> Result<OptimalPortfolio> {
        let n = mean.len();
        self.optimize_from(mean, covariance, &vec![1.0 / n.max(1) as f64; n])
    }

    /// Maximize the Sharpe ratio starting the search from `initial`.
    ///
    /// # Errors
    ///
    /// * `NoAssets` for an empty mean vector
    /// * `DegenerateOptimization` if an explored portfolio has zero variance or
    ///   the solver does not converge
    /// * `ConstraintViolation` if the solved weights break the simplex or bounds
    pub fn optimize_from(
        &self,
        mean: &DVector<f64>,
        covariance: &DMatrix<f64>,
        initial: &[f64],
    ) -> Result<OptimalPortfolio> {
        let model = MeanVarianceModel::new(
            mean,
            covariance,
            self.risk_free_rate,
            self.annualization_factor,
        )?;
        self.optimize_model(&model, initial)
    }

    /// Maximize the Sharpe ratio of an already validated model.
    pub fn optimize_model(
        &self,
        model: &MeanVarianceModel,
        initial: &[f64],
    ) -> Result<OptimalPortfolio> {
        self.bounds.validate()?;

        if initial.len() != model.asset_count() {
            return Err(Error::InvalidInput(format!(
                "initial guess has {} weights for {} assets",
                initial.len(),
                model.asset_count()
            )));
        }

        let objective = NegativeSharpe { model };
        let solution = self.solver.minimize(&objective, initial, &self.bounds)?;

        check_constraints(&solution.point, &self.bounds)?;
        let metrics = model.metrics(&solution.point)?;

        tracing::debug!(
            assets = model.asset_count(),
            iterations = solution.iterations,
            termination = ?solution.termination,
            sharpe = metrics.sharpe_ratio,
            "Sharpe optimization finished"
        );

        Ok(OptimalPortfolio {
            weights: solution.point,
            metrics,
            iterations: solution.iterations,
            termination: solution.termination,
        })
    }
}

/// Verify `|sum(w) - 1| < 1e-6` and every weight inside the bounds.
///
/// A failure here means the solver produced an infeasible point; weights are
/// never clamped to hide it.
pub fn check_constraints(weights: &[f64], bounds: &WeightBounds) -> Result<()> {
    if let Some((i, w)) = weights
        .iter()
        .enumerate()
        .find(|(_, w)| !w.is_finite() || !bounds.contains(**w))
    {
        return Err(Error::ConstraintViolation(format!(
            "weight {} = {} outside [{}, {}]",
            i, w, bounds.lower, bounds.upper
        )));
    }

    let total: f64 = weights.iter().sum();
    if (total - 1.0).abs() >= WEIGHT_SUM_TOLERANCE {
        return Err(Error::ConstraintViolation(format!(
            "weights sum to {} instead of 1",
            total
        )));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::{assert_abs_diff_eq, assert_relative_eq};
    use proptest::prelude::*;

    fn scenario_inputs() -> (DVector<f64>, DMatrix<f64>) {
        (
            DVector::from_vec(vec![0.001, 0.0005]),
            DMatrix::from_row_slice(2, 2, &[0.0004, 0.0001, 0.0001, 0.0009]),
        )
    }

    fn assert_on_simplex(weights: &[f64]) {
        assert!((weights.iter().sum::<f64>() - 1.0).abs() < 1e-6);
        assert!(weights.iter().all(|&w| (0.0..=1.0 + 1e-9).contains(&w)));
    }

    #[test]
    fn test_two_asset_beats_equal_weight() {
        let (mean, cov) = scenario_inputs();
        let optimizer = SharpeOptimizer::new(0.02, 252);

        let optimal = optimizer.optimize(&mean, &cov).unwrap();
        assert_on_simplex(&optimal.weights);

        let model = MeanVarianceModel::new(&mean, &cov, 0.02, 252).unwrap();
        let equal = model.metrics(&[0.5, 0.5]).unwrap();
        assert!(optimal.metrics.sharpe_ratio >= equal.sharpe_ratio);

        // The higher-return, lower-variance asset dominates
        assert!(optimal.weights[0] > optimal.weights[1]);
    }

    #[test]
    fn test_two_asset_first_order_optimality() {
        let (mean, cov) = scenario_inputs();
        let optimal = SharpeOptimizer::new(0.02, 252).optimize(&mean, &cov).unwrap();

        // Small feasible perturbations cannot improve the Sharpe ratio
        let model = MeanVarianceModel::new(&mean, &cov, 0.02, 252).unwrap();
        for delta in [-1e-3, 1e-3] {
            let w0 = (optimal.weights[0] + delta).clamp(0.0, 1.0);
            let nearby = model.metrics(&[w0, 1.0 - w0]).unwrap();
            assert!(nearby.sharpe_ratio <= optimal.metrics.sharpe_ratio + 1e-9);
        }
    }

    #[test]
    fn test_single_asset_gets_full_weight() {
        let mean = DVector::from_vec(vec![0.0006]);
        let cov = DMatrix::from_row_slice(1, 1, &[0.0003]);

        let optimal = SharpeOptimizer::new(0.02, 252).optimize(&mean, &cov).unwrap();

        assert_eq!(optimal.weights, vec![1.0]);
        let expected = (0.0006 * 252.0 - 0.02) / (0.0003_f64.sqrt() * 252.0_f64.sqrt());
        assert_relative_eq!(optimal.metrics.sharpe_ratio, expected, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_variance_asset_does_not_divide_by_zero() {
        // Constant-price asset alongside one with positive drift
        let mean = DVector::from_vec(vec![0.0, 0.0008]);
        let cov = DMatrix::from_row_slice(2, 2, &[0.0, 0.0, 0.0, 0.0004]);

        let optimal = SharpeOptimizer::new(0.02, 252).optimize(&mean, &cov).unwrap();

        assert_on_simplex(&optimal.weights);
        assert!(optimal.metrics.sharpe_ratio.is_finite());
        assert!(optimal.weights[1] > 0.99);
    }

    fn risky_block() -> (Vec<f64>, Vec<f64>) {
        (
            vec![0.0012, 0.0009, 0.0004],
            vec![
                0.00040, 0.00012, 0.00003, //
                0.00012, 0.00035, 0.00006, //
                0.00003, 0.00006, 0.00020,
            ],
        )
    }

    /// Prepend a constant-price asset (zero mean, zero row and column).
    fn with_cash(mean: &[f64], cov: &[f64]) -> (DVector<f64>, DMatrix<f64>) {
        let n = mean.len();
        let mean = DVector::from_fn(n + 1, |i, _| if i == 0 { 0.0 } else { mean[i - 1] });
        let cov = DMatrix::from_fn(n + 1, n + 1, |i, j| {
            if i == 0 || j == 0 {
                0.0
            } else {
                cov[(i - 1) * n + (j - 1)]
            }
        });
        (mean, cov)
    }

    #[test]
    fn test_constant_asset_among_risky_assets() {
        let (mean, cov) = risky_block();
        let optimizer = SharpeOptimizer::new(0.02, 252);

        let risky = optimizer
            .optimize(
                &DVector::from_vec(mean.clone()),
                &DMatrix::from_row_slice(3, 3, &cov),
            )
            .unwrap();

        let (mean, cov) = with_cash(&mean, &cov);
        let optimal = optimizer.optimize(&mean, &cov).unwrap();

        assert!(check_constraints(&optimal.weights, &WeightBounds::default()).is_ok());
        assert!(optimal.iterations < 500);
        assert_abs_diff_eq!(optimal.weights[0], 0.0, epsilon = 1e-9);
        for i in 0..3 {
            assert_abs_diff_eq!(optimal.weights[i + 1], risky.weights[i], epsilon = 1e-6);
        }
        assert_relative_eq!(
            optimal.metrics.sharpe_ratio,
            risky.metrics.sharpe_ratio,
            max_relative = 1e-9
        );
    }

    #[test]
    fn test_all_zero_variance_is_degenerate() {
        let mean = DVector::from_vec(vec![0.0, 0.0]);
        let cov = DMatrix::<f64>::zeros(2, 2);

        let result = SharpeOptimizer::new(0.02, 252).optimize(&mean, &cov);
        assert!(matches!(result, Err(Error::DegenerateOptimization(_))));
    }

    #[test]
    fn test_empty_assets() {
        let mean = DVector::<f64>::zeros(0);
        let cov = DMatrix::<f64>::zeros(0, 0);

        let result = SharpeOptimizer::new(0.02, 252).optimize(&mean, &cov);
        assert!(matches!(result, Err(Error::NoAssets)));
    }

    #[test]
    fn test_upper_bound_caps_weights() {
        let mean = DVector::from_vec(vec![0.0012, 0.0003, 0.0002]);
        let cov = DMatrix::from_row_slice(
            3,
            3,
            &[
                0.0004, 0.00005, 0.00002, //
                0.00005, 0.0003, 0.00001, //
                0.00002, 0.00001, 0.0002,
            ],
        );
        let bounds = WeightBounds::new(0.0, 0.5).unwrap();

        let optimal = SharpeOptimizer::new(0.02, 252)
            .with_bounds(bounds)
            .optimize(&mean, &cov)
            .unwrap();

        assert!(optimal.weights.iter().all(|&w| w <= 0.5 + 1e-9));
        assert!((optimal.weights.iter().sum::<f64>() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_initial_guess_length_checked() {
        let (mean, cov) = scenario_inputs();
        let result = SharpeOptimizer::new(0.02, 252).optimize_from(&mean, &cov, &[1.0]);
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[test]
    fn test_check_constraints() {
        let bounds = WeightBounds::default();
        assert!(check_constraints(&[0.4, 0.6], &bounds).is_ok());
        assert!(matches!(
            check_constraints(&[0.4, 0.5], &bounds),
            Err(Error::ConstraintViolation(_))
        ));
        assert!(matches!(
            check_constraints(&[1.2, -0.2], &bounds),
            Err(Error::ConstraintViolation(_))
        ));
        assert!(matches!(
            check_constraints(&[f64::NAN, 1.0], &bounds),
            Err(Error::ConstraintViolation(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn optimizer_output_is_feasible_and_beats_equal_weight(
            (factors, mean) in (2usize..6).prop_flat_map(|n| (
                prop::collection::vec(-0.02f64..0.02, n * n),
                prop::collection::vec(0.0002f64..0.002, n),
            )),
            add_cash in any::<bool>(),
        ) {
            // Sigma = A A' + small ridge keeps the risky block positive definite
            let n = mean.len();
            let a = DMatrix::from_row_slice(n, n, &factors);
            let risky_cov = &a * a.transpose() + DMatrix::<f64>::identity(n, n) * 1e-6;
            let risky_cov: Vec<f64> = (0..n * n).map(|k| risky_cov[(k / n, k % n)]).collect();

            let (mean, cov) = if add_cash {
                with_cash(&mean, &risky_cov)
            } else {
                (DVector::from_vec(mean), DMatrix::from_row_slice(n, n, &risky_cov))
            };
            let assets = mean.len();

            let optimal = SharpeOptimizer::new(0.02, 252).optimize(&mean, &cov).unwrap();
            prop_assert!(check_constraints(&optimal.weights, &WeightBounds::default()).is_ok());

            let model = MeanVarianceModel::new(&mean, &cov, 0.02, 252).unwrap();
            let equal = model.metrics(&vec![1.0 / assets as f64; assets]).unwrap();
            prop_assert!(
                optimal.metrics.sharpe_ratio
                    >= equal.sharpe_ratio - 1e-9 * equal.sharpe_ratio.abs().max(1.0)
            );
        }
    }
}
