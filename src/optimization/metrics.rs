//! Closed-form statistics for a weight vector.

use serde::{Deserialize, Serialize};

use crate::core::error::{BehavioralError, Result};

/// Share of variance attributed to the downside in the Sortino approximation.
const DOWNSIDE_VARIANCE_SHARE: f64 = 0.7;

/// Multiple of volatility used as a drawdown estimate without price history.
const DRAWDOWN_VOLATILITY_MULTIPLE: f64 = 2.0;

/// Ex-ante statistics of an allocation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PortfolioMetrics {
    pub expected_return: f64,
    pub variance: f64,
    pub volatility: f64,
    pub sharpe_ratio: f64,
    /// Uses a fixed 70% downside share of variance.
    pub sortino_ratio: f64,
    /// Twice the volatility; a placeholder until history is available.
    pub max_drawdown: f64,
}

/// `Σ · w`.
pub fn mat_vec(matrix: &[Vec<f64>], v: &[f64]) -> Vec<f64> {
    matrix
        .iter()
        .map(|row| row.iter().zip(v.iter()).map(|(a, b)| a * b).sum())
        .collect()
}

/// `w · r`.
#[inline]
pub fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// `wᵀ Σ w`.
pub fn quadratic_form(matrix: &[Vec<f64>], w: &[f64]) -> f64 {
    dot(w, &mat_vec(matrix, w))
}

/// Volatility, floored at zero variance so slightly non-PSD inputs stay finite.
#[inline]
pub fn volatility(matrix: &[Vec<f64>], w: &[f64]) -> f64 {
    quadratic_form(matrix, w).max(0.0).sqrt()
}

/// Check that `covariance` is `n × n`.
pub fn validate_square(covariance: &[Vec<f64>], n: usize) -> Result<()> {
    if covariance.len() != n {
        return Err(BehavioralError::length_mismatch(n, covariance.len()));
    }
    if let Some(row) = covariance.iter().find(|row| row.len() != n) {
        return Err(BehavioralError::length_mismatch(n, row.len()));
    }
    Ok(())
}

/// Compute return, risk and risk-adjusted ratios for `weights`.
pub fn portfolio_metrics(
    weights: &[f64],
    expected_returns: &[f64],
    covariance: &[Vec<f64>],
    risk_free_rate: f64,
) -> Result<PortfolioMetrics> {
    let n = weights.len();
    if n == 0 {
        return Err(BehavioralError::invalid_input("weights are empty"));
    }
    if expected_returns.len() != n {
        return Err(BehavioralError::length_mismatch(n, expected_returns.len()));
    }
    validate_square(covariance, n)?;

    let expected_return = dot(weights, expected_returns);
    let variance = quadratic_form(covariance, weights);
    let volatility = variance.max(0.0).sqrt();
    let excess = expected_return - risk_free_rate;

    let sharpe_ratio = if volatility > 0.0 { excess / volatility } else { 0.0 };
    let downside = (variance.max(0.0) * DOWNSIDE_VARIANCE_SHARE).sqrt();
    let sortino_ratio = if downside > 0.0 { excess / downside } else { 0.0 };

    Ok(PortfolioMetrics {
        expected_return,
        variance,
        volatility,
        sharpe_ratio,
        sortino_ratio,
        max_drawdown: volatility * DRAWDOWN_VOLATILITY_MULTIPLE,
    })
}
