//! Engine configuration.
//!
//! Every section has working defaults. [`EngineConfig::load`] overlays
//! environment variables with the `BEHAVIORAL` prefix, using `__` to separate
//! nested keys:
//!
//! - `BEHAVIORAL__SOLVER__MAX_ITERATIONS=500` -> `solver.max_iterations = 500`
//! - `BEHAVIORAL__DETECTOR__MIN_TRADES=20` -> `detector.min_trades = 20`

use serde::{Deserialize, Serialize};

use super::error::{BehavioralError, Result};

/// Root configuration for all engines.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub solver: SolverConfig,
    pub detector: DetectorConfig,
    pub backtest: BacktestConfig,
}

impl EngineConfig {
    /// Load configuration from the environment on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns `ConfigLoad` if a variable cannot be parsed into its field type.
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(
                config::Environment::default()
                    .prefix("BEHAVIORAL")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()?;

        Ok(config)
    }

    /// Check semantic ranges of every section.
    pub fn validate(&self) -> Result<()> {
        self.solver.validate()?;
        self.detector.validate()?;
        self.backtest.validate()?;
        Ok(())
    }
}

/// Constrained solver settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SolverConfig {
    /// Cap on inner iterations across the whole solve.
    pub max_iterations: usize,
    /// Stationarity tolerance on the projected gradient.
    pub tolerance: f64,
    /// Maximum constraint violation accepted as feasible.
    pub feasibility_tolerance: f64,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iterations: 1000,
            tolerance: 1e-9,
            feasibility_tolerance: 1e-8,
        }
    }
}

impl SolverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.max_iterations == 0 {
            return Err(BehavioralError::invalid_config(
                "solver.max_iterations must be at least 1",
            ));
        }
        if !(self.tolerance > 0.0 && self.feasibility_tolerance > 0.0) {
            return Err(BehavioralError::invalid_config(
                "solver tolerances must be positive",
            ));
        }
        Ok(())
    }
}

/// Event thresholds per ledger bias. A score strictly above the threshold
/// emits an event.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BiasThresholds {
    pub disposition_effect: f64,
    pub loss_aversion: f64,
    pub overconfidence: f64,
    pub recency_bias: f64,
    pub herding_behavior: f64,
    pub confirmation_bias: f64,
    pub anchoring_bias: f64,
    pub regret_aversion: f64,
}

impl Default for BiasThresholds {
    fn default() -> Self {
        Self {
            disposition_effect: 0.7,
            loss_aversion: 0.6,
            overconfidence: 0.7,
            recency_bias: 0.6,
            herding_behavior: 0.6,
            confirmation_bias: 0.5,
            anchoring_bias: 0.7,
            regret_aversion: 0.2,
        }
    }
}

/// Bias detector settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// Ledgers shorter than this produce a zero score vector.
    pub min_trades: usize,
    pub thresholds: BiasThresholds,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            min_trades: 10,
            thresholds: BiasThresholds::default(),
        }
    }
}

impl DetectorConfig {
    pub fn validate(&self) -> Result<()> {
        let t = &self.thresholds;
        let all = [
            t.disposition_effect,
            t.loss_aversion,
            t.overconfidence,
            t.recency_bias,
            t.herding_behavior,
            t.confirmation_bias,
            t.anchoring_bias,
            t.regret_aversion,
        ];
        if all.iter().any(|v| !(0.0..=1.0).contains(v)) {
            return Err(BehavioralError::invalid_config(
                "detector thresholds must lie in [0, 1]",
            ));
        }
        Ok(())
    }
}

/// Backtest evaluation settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Periods per year used for annualization.
    pub periods_per_year: f64,
    /// Default annual risk-free rate.
    pub risk_free_rate: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            periods_per_year: 252.0,
            risk_free_rate: 0.02,
        }
    }
}

impl BacktestConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.periods_per_year.is_finite() && self.periods_per_year > 0.0) {
            return Err(BehavioralError::invalid_config(
                "backtest.periods_per_year must be positive",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;
    use std::sync::Mutex;

    // Env vars are process-global
    static ENV_MUTEX: Mutex<()> = Mutex::new(());

    #[test]
    fn test_defaults_validate() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.solver.max_iterations, 1000);
        assert_eq!(config.detector.min_trades, 10);
        assert!((config.backtest.periods_per_year - 252.0).abs() < 1e-12);
    }

    #[test]
    fn test_load_from_environment() {
        let _guard = ENV_MUTEX.lock().unwrap();
        env::set_var("BEHAVIORAL__SOLVER__MAX_ITERATIONS", "250");
        env::set_var("BEHAVIORAL__DETECTOR__MIN_TRADES", "20");
        let result = EngineConfig::load();
        env::remove_var("BEHAVIORAL__SOLVER__MAX_ITERATIONS");
        env::remove_var("BEHAVIORAL__DETECTOR__MIN_TRADES");

        let config = result.expect("config should load");
        assert_eq!(config.solver.max_iterations, 250);
        assert_eq!(config.detector.min_trades, 20);
        // Untouched sections keep their defaults
        assert!((config.backtest.risk_free_rate - 0.02).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_values_rejected() {
        let mut config = EngineConfig::default();
        config.solver.max_iterations = 0;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.detector.thresholds.herding_behavior = 1.5;
        assert!(config.validate().is_err());

        let mut config = EngineConfig::default();
        config.backtest.periods_per_year = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_deserialize_partial_json() {
        let json = r#"{ "solver": { "tolerance": 1e-6 } }"#;
        let config: EngineConfig = serde_json::from_str(json).unwrap();
        assert!((config.solver.tolerance - 1e-6).abs() < 1e-18);
        assert_eq!(config.solver.max_iterations, 1000);
    }
}
