//! Sample covariance of aligned return series.

use crate::types::ReturnSeries;
use crate::{Error, Result};
use nalgebra::DMatrix;

/// Square, symmetric covariance matrix in canonical asset order.
#[derive(Debug, Clone, PartialEq)]
pub struct CovarianceMatrix {
    /// Asset symbols indexing both rows and columns
    pub symbols: Vec<String>,
    /// Per-period covariances
    pub matrix: DMatrix<f64>,
}

impl CovarianceMatrix {
    /// Number of assets.
    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    /// Whether the matrix is empty.
    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    /// Covariance between the assets at positions `i` and `j`, if both exist.
    pub fn get(&self, i: usize, j: usize) -> Option<f64> {
        self.matrix.get((i, j)).copied()
    }

    /// Variance of one asset by symbol.
    pub fn variance(&self, symbol: &str) -> Option<f64> {
        let symbol = symbol.to_uppercase();
        self.symbols
            .iter()
            .position(|s| *s == symbol)
            .map(|i| self.matrix[(i, i)])
    }

    /// Whether `matrix[(i, j)] == matrix[(j, i)]` for every pair.
    pub fn is_symmetric(&self) -> bool {
        let n = self.matrix.nrows();
        (0..n).all(|i| (i + 1..n).all(|j| self.matrix[(i, j)] == self.matrix[(j, i)]))
    }
}

/// Calculate the sample covariance matrix of aligned return series.
///
/// `Cov(i, j) = 1/(n-1) * sum_t (r_i[t] - mean_i) * (r_j[t] - mean_j)`, with
/// the means taken over the same window.
///
/// # Errors
///
/// * `NoAssets` for an empty slice
/// * `InputAlignment` when series differ in length or timestamps
/// * `InsufficientData` with fewer than two periods
pub fn sample_covariance(series: &[ReturnSeries]) -> Result<CovarianceMatrix> {
    let Some(first) = series.first() else {
        return Err(Error::NoAssets);
    };

    let periods = first.len();
    for s in series {
        if s.len() != periods || s.timestamps.len() != periods {
            return Err(Error::InputAlignment(format!(
                "{} has {} return periods but {} has {}",
                s.symbol,
                s.len(),
                first.symbol,
                periods
            )));
        }
        if s.timestamps != first.timestamps {
            return Err(Error::InputAlignment(format!(
                "{} and {} are not observed on the same timestamps",
                s.symbol, first.symbol
            )));
        }
    }

    if periods < 2 {
        return Err(Error::InsufficientData(format!(
            "covariance needs at least two periods, got {}",
            periods
        )));
    }

    let n = series.len();
    let denom = (periods - 1) as f64;

    let means: Vec<f64> = series
        .iter()
        .map(|s| s.returns.iter().sum::<f64>() / periods as f64)
        .collect();

    // Demeaned returns, one column per asset
    let centered = DMatrix::from_fn(periods, n, |t, i| series[i].returns[t] - means[i]);

    // Fill the upper triangle and mirror it so the result is exactly symmetric
    let mut matrix = DMatrix::zeros(n, n);
    for i in 0..n {
        for j in i..n {
            let cov = centered.column(i).dot(&centered.column(j)) / denom;
            matrix[(i, j)] = cov;
            matrix[(j, i)] = cov;
        }
    }

    tracing::debug!(assets = n, periods, "Estimated sample covariance");

    Ok(CovarianceMatrix {
        symbols: series.iter().map(|s| s.symbol.clone()).collect(),
        matrix,
    })
}
