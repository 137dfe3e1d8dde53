//! Portfolio optimization.
//!
//! - **Model**: annualized risk, return and Sharpe ratio of a weight vector
//! - **Solver**: projected gradient descent on the bounded simplex
//! - **Sharpe**: maximum Sharpe-ratio allocation built on the two

mod model;
mod sharpe;
mod solver;

pub use model::MeanVarianceModel;
pub use sharpe::{check_constraints, OptimalPortfolio, SharpeOptimizer};
pub use solver::{
    project_onto_simplex_box, Objective, ProjectedGradient, Solution, SolverSettings, Termination,
};
