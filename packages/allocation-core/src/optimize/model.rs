//! Annualized mean-variance evaluation of weight vectors.

use crate::estimation::Estimates;
use crate::types::PortfolioMetrics;
use crate::{Error, Result};
use nalgebra::{DMatrix, DVector};

/// Relative tolerance for the covariance symmetry check.
const SYMMETRY_TOLERANCE: f64 = 1e-12;

/// Per-period mean returns and covariance plus the annualization settings.
///
/// Both the optimizer and the frontier sampler evaluate portfolios through
/// this type, so their metrics are computed identically.
#[derive(Debug, Clone, PartialEq)]
pub struct MeanVarianceModel {
    mean: DVector<f64>,
    covariance: DMatrix<f64>,
    risk_free_rate: f64,
    annualization_factor: f64,
}

impl MeanVarianceModel {
    /// Build a model from per-period mean returns and covariance.
    ///
    /// # Errors
    ///
    /// * `NoAssets` if `mean` is empty
    /// * `InvalidInput` if the shapes disagree, an entry is non-finite, the
    ///   covariance is asymmetric or has a negative variance
    /// * `InvalidConfig` for a non-finite risk-free rate or zero annualization factor
    pub fn new(
        mean: &DVector<f64>,
        covariance: &DMatrix<f64>,
        risk_free_rate: f64,
        annualization_factor: u32,
    ) -> Result<Self> {
        let n = mean.len();
        if n == 0 {
            return Err(Error::NoAssets);
        }

        if covariance.nrows() != n || covariance.ncols() != n {
            return Err(Error::InvalidInput(format!(
                "covariance is {}x{} but there are {} mean returns",
                covariance.nrows(),
                covariance.ncols(),
                n
            )));
        }

        if mean.iter().any(|m| !m.is_finite()) {
            return Err(Error::InvalidInput(
                "mean returns contain a non-finite value".to_string(),
            ));
        }
        if covariance.iter().any(|c| !c.is_finite()) {
            return Err(Error::InvalidInput(
                "covariance contains a non-finite value".to_string(),
            ));
        }

        for i in 0..n {
            if covariance[(i, i)] < 0.0 {
                return Err(Error::InvalidInput(format!(
                    "negative variance {} for asset {}",
                    covariance[(i, i)],
                    i
                )));
            }
            for j in i + 1..n {
                let (a, b) = (covariance[(i, j)], covariance[(j, i)]);
                if (a - b).abs() > SYMMETRY_TOLERANCE * a.abs().max(b.abs()).max(1.0) {
                    return Err(Error::InvalidInput(format!(
                        "covariance is not symmetric at ({}, {})",
                        i, j
                    )));
                }
            }
        }

        if !risk_free_rate.is_finite() {
            return Err(Error::InvalidConfig(
                "risk-free rate must be finite".to_string(),
            ));
        }
        if annualization_factor == 0 {
            return Err(Error::InvalidConfig(
                "annualization factor must be positive".to_string(),
            ));
        }

        Ok(Self {
            mean: mean.clone(),
            covariance: covariance.clone(),
            risk_free_rate,
            annualization_factor: annualization_factor as f64,
        })
    }

    /// Build a model from estimates sharing one aligned window.
    pub fn from_estimates(
        estimates: &Estimates,
        risk_free_rate: f64,
        annualization_factor: u32,
    ) -> Result<Self> {
        Self::new(
            &estimates.mean.values,
            &estimates.covariance.matrix,
            risk_free_rate,
            annualization_factor,
        )
    }

    /// Number of assets.
    pub fn asset_count(&self) -> usize {
        self.mean.len()
    }

    /// Annual risk-free rate.
    pub fn risk_free_rate(&self) -> f64 {
        self.risk_free_rate
    }

    /// Periods per year.
    pub fn annualization_factor(&self) -> f64 {
        self.annualization_factor
    }

    fn to_vector(&self, weights: &[f64]) -> Result<DVector<f64>> {
        if weights.len() != self.asset_count() {
            return Err(Error::InvalidInput(format!(
                "expected {} weights, got {}",
                self.asset_count(),
                weights.len()
            )));
        }
        Ok(DVector::from_column_slice(weights))
    }

    /// Annualized expected return `w . mu * k`.
    pub fn annual_return(&self, weights: &[f64]) -> Result<f64> {
        let w = self.to_vector(weights)?;
        Ok(self.mean.dot(&w) * self.annualization_factor)
    }

    /// Annualized variance `k * w' Sigma w`.
    pub fn annual_variance(&self, weights: &[f64]) -> Result<f64> {
        let w = self.to_vector(weights)?;
        Ok(w.dot(&(&self.covariance * &w)) * self.annualization_factor)
    }

    /// Risk, return and Sharpe ratio of a weight vector.
    ///
    /// Fails with `DegenerateOptimization` when the portfolio variance is not
    /// strictly positive, since the Sharpe ratio is then undefined.
    pub fn metrics(&self, weights: &[f64]) -> Result<PortfolioMetrics> {
        let (metrics, _) = self.evaluate(weights, false)?;
        Ok(metrics)
    }

    /// Metrics plus the gradient of the Sharpe ratio with respect to the weights.
    pub fn sharpe_gradient(&self, weights: &[f64]) -> Result<(PortfolioMetrics, Vec<f64>)> {
        let (metrics, gradient) = self.evaluate(weights, true)?;
        Ok((metrics, gradient.unwrap_or_default()))
    }

    fn evaluate(
        &self,
        weights: &[f64],
        with_gradient: bool,
    ) -> Result<(PortfolioMetrics, Option<Vec<f64>>)> {
        let w = self.to_vector(weights)?;
        let k = self.annualization_factor;

        let sigma_w = &self.covariance * &w;
        let expected_return = self.mean.dot(&w) * k;
        let variance = positive_variance(w.dot(&sigma_w) * k)?;

        let risk = variance.sqrt();
        let excess = expected_return - self.risk_free_rate;
        let metrics = PortfolioMetrics {
            risk,
            expected_return,
            sharpe_ratio: excess / risk,
        };

        // dS/dw = k*mu/risk - excess * k*Sigma*w / risk^3
        let gradient = with_gradient.then(|| {
            let risk_cubed = risk * variance;
            self.mean
                .iter()
                .zip(sigma_w.iter())
                .map(|(m, sw)| k * m / risk - excess * k * sw / risk_cubed)
                .collect()
        });

        Ok((metrics, gradient))
    }

    /// Hessian of the Sharpe ratio with respect to the weights.
    ///
    /// With `e = k*mu`, `q = k*Sigma*w`, excess `E` and risk `R`:
    /// `-(e q' + q e')/R^3 - E k Sigma/R^3 + 3 E q q'/R^5`.
    pub fn sharpe_hessian(&self, weights: &[f64]) -> Result<DMatrix<f64>> {
        let w = self.to_vector(weights)?;
        let k = self.annualization_factor;

        let e = &self.mean * k;
        let q = (&self.covariance * &w) * k;
        let variance = positive_variance(w.dot(&q))?;

        let risk = variance.sqrt();
        let excess = e.dot(&w) - self.risk_free_rate;
        let risk_cubed = risk * variance;
        let risk_fifth = risk_cubed * variance;

        let cross = &e * q.transpose();
        let hessian = -(&cross + cross.transpose()) / risk_cubed
            - &self.covariance * (k * excess / risk_cubed)
            + (&q * q.transpose()) * (3.0 * excess / risk_fifth);

        Ok(hessian)
    }
}

fn positive_variance(variance: f64) -> Result<f64> {
    if !(variance > 0.0) || !variance.is_finite() {
        return Err(Error::DegenerateOptimization(format!(
            "portfolio variance is {}; Sharpe ratio undefined",
            variance
        )));
    }
    Ok(variance)
}
