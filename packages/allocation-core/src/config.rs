//! Run configuration and its TOML persistence.

use crate::optimize::SolverSettings;
use crate::types::WeightBounds;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the configuration file location.
pub const CONFIG_FILE_ENV: &str = "ALLOCATION_CONFIG_FILE";

/// Settings for one allocation run.
///
/// Every field has a default, so a TOML file only needs the keys it changes:
///
/// ```toml
/// risk_free_rate = 0.04
/// num_portfolios = 5000
///
/// [bounds]
/// upper = 0.6
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AllocationConfig {
    /// Annual risk-free rate (e.g., 0.02 for 2%)
    pub risk_free_rate: f64,
    /// Return periods per year (252 for daily trading data)
    pub annualization_factor: u32,
    /// Number of random portfolios drawn for the frontier
    pub num_portfolios: usize,
    /// Seed for the frontier sampler
    pub random_seed: u64,
    /// Per-asset weight bounds for the optimizer
    pub bounds: WeightBounds,
    /// Draw frontier samples on the rayon thread pool
    pub parallel: bool,
    /// Optimizer iteration limit and tolerance
    pub solver: SolverSettings,
}

impl Default for AllocationConfig {
    fn default() -> Self {
        Self {
            risk_free_rate: 0.02,
            annualization_factor: 252,
            num_portfolios: 10_000,
            random_seed: 42,
            bounds: WeightBounds::default(),
            parallel: false,
            solver: SolverSettings::default(),
        }
    }
}

impl AllocationConfig {
    /// Get the default configuration file path.
    ///
    /// Default path: `~/.zee/allocation/config.toml`
    /// Can be overridden with the `ALLOCATION_CONFIG_FILE` environment variable.
    pub fn default_path() -> PathBuf {
        if let Ok(path) = env::var(CONFIG_FILE_ENV) {
            return PathBuf::from(path);
        }

        directories::BaseDirs::new()
            .map(|dirs| dirs.home_dir().join(".zee/allocation/config.toml"))
            .unwrap_or_else(|| PathBuf::from("allocation.toml"))
    }

    /// Load and validate configuration from the default path.
    pub fn load_default() -> Result<Self> {
        Self::load(Self::default_path())
    }

    /// Load and validate configuration from a TOML file.
    ///
    /// A missing file yields the defaults.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "Loaded allocation config");
        Ok(config)
    }

    /// Parse and validate configuration from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject settings no run could use.
    pub fn validate(&self) -> Result<()> {
        if !self.risk_free_rate.is_finite() {
            return Err(Error::InvalidConfig(
                "risk_free_rate must be finite".to_string(),
            ));
        }
        if self.annualization_factor == 0 {
            return Err(Error::InvalidConfig(
                "annualization_factor must be positive".to_string(),
            ));
        }
        if self.num_portfolios == 0 {
            return Err(Error::InvalidConfig(
                "num_portfolios must be positive".to_string(),
            ));
        }
        self.bounds.validate()?;
        self.solver.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_defaults() {
        let config = AllocationConfig::default();
        assert_eq!(config.risk_free_rate, 0.02);
        assert_eq!(config.annualization_factor, 252);
        assert_eq!(config.num_portfolios, 10_000);
        assert_eq!(config.random_seed, 42);
        assert_eq!(config.bounds, WeightBounds::default());
        assert!(!config.parallel);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = AllocationConfig::from_toml_str(
            r#"
            risk_free_rate = 0.04
            num_portfolios = 500

            [bounds]
            upper = 0.6

            [solver]
            max_iterations = 50
            "#,
        )
        .unwrap();

        assert_eq!(config.risk_free_rate, 0.04);
        assert_eq!(config.num_portfolios, 500);
        assert_eq!(config.annualization_factor, 252);
        assert_eq!(config.bounds.lower, 0.0);
        assert_eq!(config.bounds.upper, 0.6);
        assert_eq!(config.solver.max_iterations, 50);
        assert_eq!(config.solver.tolerance, SolverSettings::default().tolerance);
    }

    #[test]
    fn test_invalid_values_rejected() {
        for content in [
            "annualization_factor = 0",
            "num_portfolios = 0",
            "[bounds]\nlower = 0.7\nupper = 0.2",
            "[bounds]\nupper = 1.5",
            "[solver]\ntolerance = 0.0",
        ] {
            let result = AllocationConfig::from_toml_str(content);
            assert!(
                matches!(result, Err(Error::InvalidConfig(_))),
                "accepted invalid config: {}",
                content
            );
        }
    }

    #[test]
    fn test_malformed_toml() {
        let result = AllocationConfig::from_toml_str("risk_free_rate = \"high\"");
        assert!(matches!(result, Err(Error::Toml(_))));
    }

    #[test]
    fn test_default_path_uses_allocation_dir() {
        if env::var(CONFIG_FILE_ENV).is_ok() {
            return;
        }
        let path = AllocationConfig::default_path();
        match directories::BaseDirs::new() {
            Some(dirs) => assert_eq!(path, dirs.home_dir().join(".zee/allocation/config.toml")),
            None => assert_eq!(path, PathBuf::from("allocation.toml")),
        }
    }

    #[test]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempdir().unwrap();
        let config = AllocationConfig::load(dir.path().join("missing.toml")).unwrap();
        assert_eq!(config, AllocationConfig::default());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("allocation.toml");
        fs::write(&path, "random_seed = 7\nparallel = true\n").unwrap();

        let config = AllocationConfig::load(&path).unwrap();
        assert_eq!(config.random_seed, 7);
        assert!(config.parallel);
    }
}
