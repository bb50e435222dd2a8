//! PyO3 function bindings for the behavioral engines.

use numpy::{PyReadonlyArray1, PyReadonlyArray2};
use pyo3::prelude::*;
use pyo3::types::PyDict;

use crate::behavior::{recommendation, BehavioralBiasDetector, RealTimeBiasMonitor};
use crate::core::error::BehavioralError;
use crate::core::types::{
    LiveTrade, MarketContext, OptimizationConstraints, Timestamp, TradeAction, TradeRecord,
    UserBehavioralProfile,
};
use crate::metrics::evaluate_backtest as evaluate_returns;
use crate::optimization::PortfolioOptimizationEngine;
use crate::portfolio::{simulate_allocation_forward, MonteCarloConfig};

use super::numpy_bridge::*;

/// Python-exposed investor profile.
#[pyclass]
#[derive(Debug, Clone)]
pub struct PyBehavioralProfile {
    #[pyo3(get, set)]
    pub risk_tolerance: f64,
    #[pyo3(get, set)]
    pub loss_aversion_coefficient: f64,
    #[pyo3(get, set)]
    pub overconfidence_score: f64,
    #[pyo3(get, set)]
    pub experience_years: u32,
}

#[pymethods]
impl PyBehavioralProfile {
    #[new]
    #[pyo3(signature = (risk_tolerance=0.5, loss_aversion_coefficient=2.25, overconfidence_score=0.5, experience_years=0))]
    fn new(
        risk_tolerance: f64,
        loss_aversion_coefficient: f64,
        overconfidence_score: f64,
        experience_years: u32,
    ) -> Self {
        Self {
            risk_tolerance,
            loss_aversion_coefficient,
            overconfidence_score,
            experience_years,
        }
    }

    fn __repr__(&self) -> String {
        format!(
            "BehavioralProfile(loss_aversion={:.2}, overconfidence={:.2})",
            self.loss_aversion_coefficient, self.overconfidence_score
        )
    }
}

impl From<&PyBehavioralProfile> for UserBehavioralProfile {
    fn from(py_profile: &PyBehavioralProfile) -> Self {
        UserBehavioralProfile {
            risk_tolerance: py_profile.risk_tolerance,
            loss_aversion_coefficient: py_profile.loss_aversion_coefficient,
            overconfidence_score: py_profile.overconfidence_score,
            experience_years: py_profile.experience_years,
            ..Default::default()
        }
    }
}

/// Optimize an allocation. Returns a dict with a numpy `weights` array.
#[pyfunction]
#[pyo3(signature = (expected_returns, covariance, method="behavioral_mvo", profile=None, min_weight=0.01, max_weight=0.30, min_positions=5))]
#[allow(clippy::too_many_arguments)]
pub fn optimize_portfolio(
    py: Python<'_>,
    expected_returns: PyReadonlyArray1<f64>,
    covariance: PyReadonlyArray2<f64>,
    method: &str,
    profile: Option<PyRef<'_, PyBehavioralProfile>>,
    min_weight: f64,
    max_weight: f64,
    min_positions: usize,
) -> PyResult<PyObject> {
    let returns = numpy_to_vec_f64(expected_returns);
    let cov = numpy_to_matrix_f64(covariance);
    let profile = profile
        .map(|p| UserBehavioralProfile::from(&*p))
        .unwrap_or_default();
    let constraints = OptimizationConstraints::new(min_weight, max_weight, min_positions);

    let engine = PortfolioOptimizationEngine::new(profile);
    let result = py.allow_threads(|| engine.optimize_with_key(&returns, &cov, &constraints, method))?;

    let dict = PyDict::new(py);
    dict.set_item("weights", vec_to_numpy_f64(py, result.weights.clone()))?;
    dict.set_item("expected_return", result.expected_return)?;
    dict.set_item("expected_volatility", result.expected_volatility)?;
    dict.set_item("sharpe_ratio", result.sharpe_ratio)?;
    dict.set_item("method", result.method.key())?;
    dict.set_item("behavioral_adjustments", to_py(py, &result.behavioral_adjustments)?)?;
    dict.set_item("converged", result.converged)?;
    dict.set_item("iterations", result.iterations)?;
    Ok(dict.into())
}

fn parse_timestamp(raw: &str) -> Result<Timestamp, BehavioralError> {
    raw.parse::<Timestamp>()
        .map_err(|e| BehavioralError::invalid_input(format!("bad timestamp {raw:?}: {e}")))
}

/// Score a trade ledger given as `(symbol, action, quantity, price, rfc3339_timestamp)` tuples.
///
/// Returns `{"scores": {...}, "events": [...]}`.
#[pyfunction]
#[pyo3(signature = (trades, min_trades=10))]
pub fn analyze_trades(
    py: Python<'_>,
    trades: Vec<(String, String, f64, f64, String)>,
    min_trades: usize,
) -> PyResult<PyObject> {
    let records = trades
        .into_iter()
        .map(|(symbol, action, quantity, price, timestamp)| {
            let action: TradeAction = action.parse()?;
            TradeRecord::new(symbol, action, quantity, price, parse_timestamp(&timestamp)?)
        })
        .collect::<Result<Vec<_>, BehavioralError>>()?;

    let detector = BehavioralBiasDetector::new().with_min_trades(min_trades);
    let (scores, events) = py.allow_threads(|| detector.analyze(&records));

    let dict = PyDict::new(py);
    dict.set_item("scores", to_py(py, &scores)?)?;
    dict.set_item("events", to_py(py, &events)?)?;
    Ok(dict.into())
}

/// Classify a trade about to execute. Returns `{"event": dict | None, "recommendation": str}`.
#[pyfunction]
#[pyo3(signature = (symbol, action, last_price_change, market_down_percent=0.0, market_up_percent=0.0, sentiment_score=0.0, trading_volume=0.0))]
#[allow(clippy::too_many_arguments)]
pub fn detect_realtime_bias(
    py: Python<'_>,
    symbol: &str,
    action: &str,
    last_price_change: f64,
    market_down_percent: f64,
    market_up_percent: f64,
    sentiment_score: f64,
    trading_volume: f64,
) -> PyResult<PyObject> {
    let trade = LiveTrade::new(symbol, action.parse()?, last_price_change);
    let market = MarketContext {
        market_down_percent,
        market_up_percent,
        sentiment_score,
        trading_volume,
    };
    let event = RealTimeBiasMonitor::new().detect(&trade, &market);

    let dict = PyDict::new(py);
    dict.set_item("recommendation", recommendation(&event))?;
    dict.set_item("event", to_py(py, &event)?)?;
    Ok(dict.into())
}

/// Performance statistics of a periodic return series.
#[pyfunction]
#[pyo3(signature = (returns, risk_free_rate=0.02))]
pub fn evaluate_backtest(
    py: Python<'_>,
    returns: PyReadonlyArray1<f64>,
    risk_free_rate: f64,
) -> PyResult<PyObject> {
    let returns = numpy_to_vec_f64(returns);
    let metrics = evaluate_returns(&returns, risk_free_rate)?;
    to_py(py, &metrics)
}

/// Monte Carlo projection of an allocation.
///
/// The seed comes from `seed` if given, else from `identifier`, else the default.
#[pyfunction]
#[pyo3(signature = (weights, expected_returns, covariance, initial_value=100000.0, n_simulations=10000, horizon_days=252, seed=None, identifier=None))]
#[allow(clippy::too_many_arguments)]
pub fn simulate_allocation(
    py: Python<'_>,
    weights: PyReadonlyArray1<f64>,
    expected_returns: PyReadonlyArray1<f64>,
    covariance: PyReadonlyArray2<f64>,
    initial_value: f64,
    n_simulations: usize,
    horizon_days: usize,
    seed: Option<u64>,
    identifier: Option<&str>,
) -> PyResult<PyObject> {
    let weights = numpy_to_vec_f64(weights);
    let returns = numpy_to_vec_f64(expected_returns);
    let cov = numpy_to_matrix_f64(covariance);

    let mut config = identifier
        .map(MonteCarloConfig::seeded_from)
        .unwrap_or_default()
        .with_simulations(n_simulations)
        .with_horizon(horizon_days);
    if let Some(seed) = seed {
        config.seed = seed;
    }

    let result = py.allow_threads(|| {
        simulate_allocation_forward(&weights, &returns, &cov, initial_value, &config)
    })?;

    let dict = PyDict::new(py);
    let paths = PyDict::new(py);
    for path in &result.percentile_paths {
        paths.set_item(path.percentile, vec_to_numpy_f64(py, path.values.clone()))?;
    }
    dict.set_item("percentile_paths", paths)?;
    dict.set_item("final_values", vec_to_numpy_f64(py, result.final_values))?;
    dict.set_item("expected_return", result.expected_return)?;
    dict.set_item("probability_of_loss", result.probability_of_loss)?;
    dict.set_item("var_95", result.var_95)?;
    dict.set_item("cvar_95", result.cvar_95)?;
    Ok(dict.into())
}
