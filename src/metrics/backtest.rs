//! Performance statistics for a per-period return series.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::drawdown::{growth_curve, max_drawdown};
use crate::core::config::BacktestConfig;
use crate::core::error::{BehavioralError, Result};

/// Annualized volatility below this is rounding residue of a constant series.
const VOLATILITY_EPSILON: f64 = 1e-12;

/// Summary statistics of a return series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BacktestMetrics {
    /// `Π(1 + r) − 1`.
    pub total_return: f64,
    pub annual_return: f64,
    /// Annualized population standard deviation.
    pub volatility: f64,
    /// 0 when volatility is 0.
    pub sharpe_ratio: f64,
    /// Deepest fall from a running peak, ≤ 0.
    pub max_drawdown: f64,
    /// Number of return observations.
    pub periods: usize,
}

/// Evaluates return series with a configurable annualization factor.
#[derive(Debug, Clone, Copy, Default)]
pub struct BacktestEvaluator {
    config: BacktestConfig,
}

impl BacktestEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: BacktestConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Evaluate against the configured risk-free rate.
    pub fn evaluate_default(&self, returns: &[f64]) -> Result<BacktestMetrics> {
        self.evaluate(returns, self.config.risk_free_rate)
    }

    /// Compute total, annualized and risk statistics of `returns`.
    ///
    /// Fails on an empty series, non-finite values, or a period losing more
    /// than everything.
    pub fn evaluate(&self, returns: &[f64], risk_free_rate: f64) -> Result<BacktestMetrics> {
        if returns.is_empty() {
            return Err(BehavioralError::invalid_input("return series is empty"));
        }
        if let Some(bad) = returns.iter().find(|r| !r.is_finite() || **r < -1.0) {
            return Err(BehavioralError::invalid_input(format!(
                "invalid periodic return {bad}"
            )));
        }
        if !risk_free_rate.is_finite() {
            return Err(BehavioralError::invalid_input("risk-free rate must be finite"));
        }

        let n = returns.len();
        let periods_per_year = self.config.periods_per_year;

        let curve = growth_curve(returns);
        let total_return = curve.last().copied().unwrap_or(1.0) - 1.0;
        let annual_return = (1.0 + total_return).powf(periods_per_year / n as f64) - 1.0;

        let mean = returns.iter().sum::<f64>() / n as f64;
        let variance = returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / n as f64;
        let volatility = match variance.sqrt() * periods_per_year.sqrt() {
            v if v < VOLATILITY_EPSILON => 0.0,
            v => v,
        };

        let sharpe_ratio = if volatility > 0.0 {
            (annual_return - risk_free_rate) / volatility
        } else {
            0.0
        };

        let metrics = BacktestMetrics {
            total_return,
            annual_return,
            volatility,
            sharpe_ratio,
            max_drawdown: max_drawdown(&curve),
            periods: n,
        };
        debug!(
            periods = n,
            total_return = metrics.total_return,
            sharpe = metrics.sharpe_ratio,
            "backtest evaluated"
        );
        Ok(metrics)
    }
}

/// Evaluate a return series with daily annualization.
pub fn evaluate_backtest(returns: &[f64], risk_free_rate: f64) -> Result<BacktestMetrics> {
    BacktestEvaluator::new().evaluate(returns, risk_free_rate)
}
