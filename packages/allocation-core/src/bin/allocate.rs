//! Allocation CLI - Sharpe-optimal weights and efficient frontier from price files.
//!
//! Every command prints a JSON `ApiResponse` envelope on stdout; logs go to stderr.

use allocation_core::{
    allocate, AllocationConfig, AllocationResult, ApiResponse, FrontierPoint, PriceHistory,
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use serde_json::json;
use std::cmp::Ordering;
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[derive(Parser)]
#[command(name = "allocate")]
#[command(about = "Mean-variance portfolio allocation - max Sharpe weights and efficient frontier")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the maximum Sharpe-ratio portfolio
    Optimize {
        #[command(flatten)]
        run: RunArgs,
        /// Number of best frontier portfolios to report
        #[arg(long, default_value = "5")]
        top: usize,
    },
    /// Emit the full risk/return/Sharpe scatter of sampled portfolios
    Frontier {
        #[command(flatten)]
        run: RunArgs,
    },
    /// Show the effective configuration
    Config {
        /// Configuration file (defaults to ~/.zee/allocation/config.toml)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// JSON price history file
    #[arg(short, long)]
    prices: PathBuf,
    /// Configuration file (defaults to ~/.zee/allocation/config.toml)
    #[arg(short, long)]
    config: Option<PathBuf>,
    /// Asset order for the output (comma-separated)
    #[arg(short = 'y', long)]
    symbols: Option<String>,
    /// Annual risk-free rate (0.02 = 2%)
    #[arg(short, long)]
    risk_free_rate: Option<f64>,
    /// Number of random frontier portfolios
    #[arg(short = 'n', long)]
    portfolios: Option<usize>,
    /// Frontier sampler seed
    #[arg(short, long)]
    seed: Option<u64>,
    /// Sample the frontier on all cores
    #[arg(long)]
    parallel: bool,
}

fn main() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let output = match cli.command {
        Commands::Optimize { run, top } => handle_optimize(run, top),
        Commands::Frontier { run } => handle_frontier(run),
        Commands::Config { config } => handle_config(config),
    };

    println!("{}", output);
}

fn handle_optimize(run: RunArgs, top: usize) -> String {
    let result = match run_allocation(&run) {
        Ok(result) => result,
        Err(e) => return failure("optimize", e),
    };

    let weights: serde_json::Map<String, serde_json::Value> = result
        .weights_by_symbol()
        .into_iter()
        .map(|(symbol, weight)| (symbol.to_string(), json!(weight)))
        .collect();

    let best: Vec<_> = top_by_sharpe(&result, top)
        .into_iter()
        .map(|point| scatter_row(&result.symbols, point))
        .collect();

    render(&ApiResponse::ok(json!({
        "symbols": result.symbols,
        "weights": weights,
        "metrics": result.optimal.metrics,
        "top_portfolios": best,
        "frontier_size": result.frontier.len(),
    })))
}

fn handle_frontier(run: RunArgs) -> String {
    let result = match run_allocation(&run) {
        Ok(result) => result,
        Err(e) => return failure("frontier", e),
    };

    let points: Vec<_> = result
        .frontier
        .iter()
        .map(|point| scatter_row(&result.symbols, point))
        .collect();

    render(&ApiResponse::ok(json!({
        "symbols": result.symbols,
        "optimal": result.optimal,
        "points": points,
    })))
}

fn handle_config(path: Option<PathBuf>) -> String {
    let path = path.unwrap_or_else(AllocationConfig::default_path);
    match AllocationConfig::load(&path) {
        Ok(config) => render(&ApiResponse::ok(json!({
            "path": path.display().to_string(),
            "exists": path.exists(),
            "config": config,
        }))),
        Err(e) => failure("config", e),
    }
}

/// Load config and prices, apply command-line overrides, then run the pipeline.
fn run_allocation(run: &RunArgs) -> allocation_core::Result<AllocationResult> {
    let mut config = match &run.config {
        Some(path) => AllocationConfig::load(path)?,
        None => AllocationConfig::load_default()?,
    };
    if let Some(rate) = run.risk_free_rate {
        config.risk_free_rate = rate;
    }
    if let Some(count) = run.portfolios {
        config.num_portfolios = count;
    }
    if let Some(seed) = run.seed {
        config.random_seed = seed;
    }
    config.parallel |= run.parallel;

    let mut history = PriceHistory::load(&run.prices)?;
    if let Some(symbols) = &run.symbols {
        let order: Vec<&str> = symbols.split(',').map(|s| s.trim()).collect();
        history = history.reorder(&order)?;
    }

    allocate(&history, &config)
}

/// Frontier points ranked by Sharpe ratio, best first.
fn top_by_sharpe(result: &AllocationResult, n: usize) -> Vec<&FrontierPoint> {
    let mut ranked: Vec<_> = result.frontier.iter().collect();
    ranked.sort_by(|a, b| compare_sharpe(b, a));
    ranked.truncate(n);
    ranked
}

fn compare_sharpe(a: &FrontierPoint, b: &FrontierPoint) -> Ordering {
    a.metrics.sharpe_ratio.total_cmp(&b.metrics.sharpe_ratio)
}

fn scatter_row(symbols: &[String], point: &FrontierPoint) -> serde_json::Value {
    let weights: Vec<_> = symbols
        .iter()
        .zip(&point.weights)
        .map(|(symbol, weight)| json!({ "symbol": symbol, "weight": weight }))
        .collect();

    json!({
        "risk": point.metrics.risk,
        "return": point.metrics.expected_return,
        "sharpe_ratio": point.metrics.sharpe_ratio,
        "weights": weights,
    })
}

fn failure(command: &str, error: allocation_core::Error) -> String {
    tracing::warn!(command, error = %error, "Command failed");
    render(&ApiResponse::<()>::err(error.to_string()))
}

fn render<T: Serialize>(response: &ApiResponse<T>) -> String {
    serde_json::to_string_pretty(response).unwrap_or_else(|e| {
        format!(
            "{{\"ok\":false,\"data\":null,\"error\":\"failed to encode response: {}\"}}",
            e
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use allocation_core::optimize::Termination;
    use allocation_core::{assemble, FrontierSet, OptimalPortfolio, PortfolioMetrics};

    fn point(w0: f64, sharpe: f64) -> FrontierPoint {
        FrontierPoint {
            weights: vec![w0, 1.0 - w0],
            metrics: PortfolioMetrics {
                risk: 0.2,
                expected_return: 0.1,
                sharpe_ratio: sharpe,
            },
        }
    }

    fn result() -> AllocationResult {
        let symbols = vec!["AAPL".to_string(), "MSFT".to_string()];
        let optimal = OptimalPortfolio {
            weights: vec![0.7, 0.3],
            metrics: point(0.7, 1.4).metrics,
            iterations: 12,
            termination: Termination::Stationary,
        };
        let frontier = FrontierSet {
            points: vec![point(0.1, 0.3), point(0.6, 1.2), point(0.4, 0.9), point(0.8, 1.3)],
        };
        assemble(&symbols, optimal, frontier).unwrap()
    }

    #[test]
    fn test_top_by_sharpe_descending() {
        let result = result();
        let top = top_by_sharpe(&result, 2);

        assert_eq!(top.len(), 2);
        assert_eq!(top[0].metrics.sharpe_ratio, 1.3);
        assert_eq!(top[1].metrics.sharpe_ratio, 1.2);
        assert_eq!(top_by_sharpe(&result, 10).len(), 4);
    }

    #[test]
    fn test_scatter_row_labels_weights() {
        let result = result();
        let row = scatter_row(&result.symbols, &result.frontier.points[1]);

        assert_eq!(row["sharpe_ratio"], 1.2);
        assert_eq!(row["weights"][0]["symbol"], "AAPL");
        assert_eq!(row["weights"][0]["weight"], 0.6);
    }

    #[test]
    fn test_failure_is_error_envelope() {
        let output = failure("optimize", allocation_core::Error::NoAssets);
        let value: serde_json::Value = serde_json::from_str(&output).unwrap();

        assert_eq!(value["ok"], false);
        assert!(value["error"].as_str().unwrap().contains("No assets"));
    }
}
