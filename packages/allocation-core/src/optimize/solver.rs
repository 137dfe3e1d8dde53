//! Projected-gradient solver on the bounded simplex.
//!
//! Minimizes a smooth objective over `{x : sum(x) = 1, lower <= x_i <= upper}`.
//! Each step moves against the gradient and projects back onto the feasible
//! set, so every iterate satisfies both the budget and the box constraints.
//!
//! When the objective supplies a Hessian, every gradient step is followed by
//! a Newton step on the current face: coordinates sitting on a bound stay
//! fixed and the rest solve the reduced quadratic model. Flat directions that
//! lead onto a bound are then crossed in one step instead of crept along.

use crate::types::{WeightBounds, BOUND_TOLERANCE};
use crate::{Error, Result};
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};

/// Smallest step tried by the backtracking line search.
const MIN_STEP: f64 = 1e-14;

/// Largest step the line search is allowed to grow to.
const MAX_STEP: f64 = 1e4;

/// Bisection rounds for the projection threshold.
const PROJECTION_ROUNDS: usize = 200;

/// Sufficient-decrease factor for the Newton line search.
const ARMIJO: f64 = 1e-4;

/// A differentiable function to minimize.
pub trait Objective {
    /// Objective value at `x`.
    fn value(&self, x: &[f64]) -> Result<f64>;

    /// Gradient at `x`.
    fn gradient(&self, x: &[f64]) -> Result<Vec<f64>>;

    /// Hessian at `x`, if the objective can provide one.
    fn hessian(&self, _x: &[f64]) -> Result<Option<DMatrix<f64>>> {
        Ok(None)
    }
}

/// Iteration limit and stationarity tolerance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SolverSettings {
    /// Maximum number of accepted steps
    pub max_iterations: usize,
    /// Stop when a unit projected gradient step moves no coordinate more than
    /// this, relative to the largest gradient component
    pub tolerance: f64,
}

impl Default for SolverSettings {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            tolerance: 1e-10,
        }
    }
}

impl SolverSettings {
    /// Reject zero iterations or a non-positive tolerance.
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(Error::InvalidConfig(
                "solver max_iterations must be positive".to_string(),
            ));
        }
        if !(self.tolerance > 0.0) || !self.tolerance.is_finite() {
            return Err(Error::InvalidConfig(
                "solver tolerance must be a positive number".to_string(),
            ));
        }
        Ok(())
    }
}

/// Why the solver stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Termination {
    /// The projected gradient step vanished
    Stationary,
    /// No step length gave sufficient decrease; the point is optimal to machine precision
    LineSearchExhausted,
}

/// A feasible local minimizer.
#[derive(Debug, Clone, PartialEq)]
pub struct Solution {
    /// Minimizing point
    pub point: Vec<f64>,
    /// Objective value at `point`
    pub value: f64,
    /// Accepted steps taken
    pub iterations: usize,
    /// Stopping reason
    pub termination: Termination,
}

/// Projected gradient descent with backtracking line search.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProjectedGradient {
    settings: SolverSettings,
}

impl ProjectedGradient {
    /// Create a solver with the given settings.
    pub fn new(settings: SolverSettings) -> Self {
        Self { settings }
    }

    /// Solver settings.
    pub fn settings(&self) -> &SolverSettings {
        &self.settings
    }

    /// Minimize `objective` from `initial` subject to `sum(x) = 1` and `bounds`.
    ///
    /// # Errors
    ///
    /// * `NoAssets` for an empty starting point
    /// * `InvalidConfig` if the bounds cannot hold a fully invested portfolio
    /// * `DegenerateOptimization` if the iteration limit is reached
    /// * any error raised by the objective itself
    pub fn minimize<O: Objective>(
        &self,
        objective: &O,
        initial: &[f64],
        bounds: &WeightBounds,
    ) -> Result<Solution> {
        self.settings.validate()?;
        bounds.validate()?;

        if initial.is_empty() {
            return Err(Error::NoAssets);
        }
        if !bounds.is_feasible_for(initial.len()) {
            return Err(Error::InvalidConfig(format!(
                "bounds [{}, {}] cannot hold a fully invested portfolio of {} assets",
                bounds.lower,
                bounds.upper,
                initial.len()
            )));
        }

        let mut x = project_onto_simplex_box(initial, bounds);
        let mut fx = objective.value(&x)?;
        let mut step = 1.0;

        for iteration in 0..self.settings.max_iterations {
            let grad = objective.gradient(&x)?;

            // Stationarity: a unit projected step no longer moves the point
            let unit_step: Vec<f64> = x.iter().zip(&grad).map(|(xi, gi)| xi - gi).collect();
            let unit_step = project_onto_simplex_box(&unit_step, bounds);
            let scale = grad.iter().fold(1.0_f64, |m, g| m.max(g.abs()));
            if max_abs_diff(&unit_step, &x) <= self.settings.tolerance * scale {
                tracing::debug!(iterations = iteration, value = fx, "Solver reached stationarity");
                return Ok(Solution {
                    point: x,
                    value: fx,
                    iterations: iteration,
                    termination: Termination::Stationary,
                });
            }

            match self.line_search(objective, &x, fx, &grad, bounds, step)? {
                Some((next, f_next, accepted_step)) => {
                    x = next;
                    fx = f_next;
                    step = (accepted_step * 2.0).min(MAX_STEP);
                }
                None => {
                    tracing::debug!(
                        iterations = iteration,
                        value = fx,
                        "Line search exhausted before stationarity test passed"
                    );
                    return Ok(Solution {
                        point: x,
                        value: fx,
                        iterations: iteration,
                        termination: Termination::LineSearchExhausted,
                    });
                }
            }

            if let Some((next, f_next)) = self.face_newton_step(objective, &x, fx, bounds)? {
                x = next;
                fx = f_next;
            }
        }

        Err(Error::DegenerateOptimization(format!(
            "solver did not converge within {} iterations",
            self.settings.max_iterations
        )))
    }

    /// Backtrack from `step` until the projected step gives sufficient decrease.
    ///
    /// Accepts `x+` when `f(x+) <= f(x) + g.(x+ - x) + |x+ - x|^2 / (2t)`.
    fn line_search<O: Objective>(
        &self,
        objective: &O,
        x: &[f64],
        fx: f64,
        grad: &[f64],
        bounds: &WeightBounds,
        step: f64,
    ) -> Result<Option<(Vec<f64>, f64, f64)>> {
        let mut t = step;

        while t >= MIN_STEP {
            let candidate: Vec<f64> = x.iter().zip(grad).map(|(xi, gi)| xi - t * gi).collect();
            let candidate = project_onto_simplex_box(&candidate, bounds);

            let (linear, squared) = x.iter().zip(&candidate).zip(grad).fold(
                (0.0, 0.0),
                |(lin, sq), ((xi, ci), gi)| {
                    let d = ci - xi;
                    (lin + gi * d, sq + d * d)
                },
            );

            if squared == 0.0 {
                return Ok(None);
            }

            let f_candidate = objective.value(&candidate)?;
            if f_candidate <= fx + linear + squared / (2.0 * t) && f_candidate < fx {
                return Ok(Some((candidate, f_candidate, t)));
            }

            t *= 0.5;
        }

        Ok(None)
    }

    /// Newton step over the coordinates strictly inside the bounds.
    ///
    /// Coordinates on a bound stay fixed and the step keeps `sum(x) = 1`. The
    /// step is cut at the first bound it reaches, which then becomes active.
    /// Returns `None` without a Hessian, when the reduced Hessian is not
    /// positive definite, or when no step length gives sufficient decrease.
    fn face_newton_step<O: Objective>(
        &self,
        objective: &O,
        x: &[f64],
        fx: f64,
        bounds: &WeightBounds,
    ) -> Result<Option<(Vec<f64>, f64)>> {
        let Some(hessian) = objective.hessian(x)? else {
            return Ok(None);
        };

        let free: Vec<usize> = (0..x.len())
            .filter(|&i| {
                x[i] > bounds.lower + BOUND_TOLERANCE && x[i] < bounds.upper - BOUND_TOLERANCE
            })
            .collect();
        let m = free.len();
        if m < 2 {
            return Ok(None);
        }

        let grad = objective.gradient(x)?;
        let g_free = DVector::from_iterator(m, free.iter().map(|&i| grad[i]));
        let h_free = DMatrix::from_fn(m, m, |r, c| hessian[(free[r], free[c])]);

        // Null space of the budget constraint: d = Z p with Z = [I; -1']
        let z = DMatrix::from_fn(m, m - 1, |r, c| {
            if r == m - 1 {
                -1.0
            } else if r == c {
                1.0
            } else {
                0.0
            }
        });
        let reduced_hessian = z.transpose() * &h_free * &z;
        let reduced_gradient = z.transpose() * &g_free;

        let Some(cholesky) = reduced_hessian.cholesky() else {
            return Ok(None);
        };
        let direction = &z * cholesky.solve(&(-reduced_gradient));

        let slope = g_free.dot(&direction);
        if !(slope < 0.0) || direction.iter().any(|d| !d.is_finite()) {
            return Ok(None);
        }

        let mut max_step = 1.0_f64;
        for (k, &i) in free.iter().enumerate() {
            let d = direction[k];
            if d < 0.0 {
                max_step = max_step.min((x[i] - bounds.lower) / -d);
            } else if d > 0.0 {
                max_step = max_step.min((bounds.upper - x[i]) / d);
            }
        }

        let mut t = max_step;
        while t >= MIN_STEP {
            let mut candidate = x.to_vec();
            for (k, &i) in free.iter().enumerate() {
                candidate[i] = bounds.clamp(x[i] + t * direction[k]);
            }

            // A zero-variance candidate only rejects this step length
            match objective.value(&candidate) {
                Ok(f_candidate) if f_candidate <= fx + ARMIJO * t * slope => {
                    return Ok(Some((candidate, f_candidate)));
                }
                Ok(_) | Err(Error::DegenerateOptimization(_)) => {}
                Err(e) => return Err(e),
            }

            t *= 0.5;
        }

        Ok(None)
    }
}

/// Euclidean projection onto `{x : sum(x) = 1, lower <= x_i <= upper}`.
///
/// Finds the shift `theta` with `sum(clamp(v_i - theta)) = 1` by bisection.
/// The caller must ensure the set is non-empty (see [`WeightBounds::is_feasible_for`]).
pub fn project_onto_simplex_box(v: &[f64], bounds: &WeightBounds) -> Vec<f64> {
    match v.len() {
        0 => return Vec::new(),
        1 => return vec![bounds.clamp(1.0)],
        _ => {}
    }

    let shifted_sum = |theta: f64| -> f64 { v.iter().map(|x| bounds.clamp(x - theta)).sum() };

    // At `lo` every coordinate sits at `upper`, at `hi` every coordinate sits at `lower`
    let max = v.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
    let min = v.iter().cloned().fold(f64::INFINITY, f64::min);
    let mut lo = min - bounds.upper;
    let mut hi = max - bounds.lower;

    for _ in 0..PROJECTION_ROUNDS {
        let mid = 0.5 * (lo + hi);
        if shifted_sum(mid) > 1.0 {
            lo = mid;
        } else {
            hi = mid;
        }
        if hi - lo <= f64::EPSILON * (lo.abs().max(hi.abs()).max(1.0)) {
            break;
        }
    }

    let theta = 0.5 * (lo + hi);
    let mut projected: Vec<f64> = v.iter().map(|x| bounds.clamp(x - theta)).collect();

    // Push the rounding residual into the coordinates with room to absorb it
    let residual = 1.0 - projected.iter().sum::<f64>();
    if residual != 0.0 {
        let mut remaining = residual;
        for w in projected.iter_mut() {
            let adjusted = bounds.clamp(*w + remaining);
            remaining -= adjusted - *w;
            *w = adjusted;
            if remaining == 0.0 {
                break;
            }
        }
    }

    projected
}

fn max_abs_diff(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y).abs())
        .fold(0.0, f64::max)
}
