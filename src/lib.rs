// Suppress warning from PyO3 macro expansion (fixed in newer PyO3 versions)
#![allow(non_local_definitions)]

//! behavioral-core: behavioral finance engines.
//!
//! This crate provides:
//! - Prospect-theory adjusted portfolio optimization (behavioral MVO,
//!   Black-Litterman, risk parity) over a pluggable constrained solver
//! - Detection of eight cognitive biases from a trade ledger
//! - A real-time panic-selling / FOMO monitor
//! - Backtest statistics and Monte Carlo projection of allocations
//! - Optional Python bindings (`python` feature)

pub mod behavior;
pub mod core;
pub mod market;
pub mod metrics;
pub mod optimization;
pub mod portfolio;
#[cfg(feature = "python")]
pub mod python;
pub mod telemetry;

pub use behavior::{analyze_trades, detect_realtime_bias};
pub use crate::core::{BehavioralError, EngineConfig, Result};
pub use metrics::evaluate_backtest;
pub use optimization::optimize;

#[cfg(feature = "python")]
use pyo3::prelude::*;

/// Python module entry point
#[cfg(feature = "python")]
#[pymodule]
fn _behavioral_core(_py: Python<'_>, m: &PyModule) -> PyResult<()> {
    telemetry::init_tracing();

    m.add_class::<python::bindings::PyBehavioralProfile>()?;

    m.add_function(wrap_pyfunction!(python::bindings::optimize_portfolio, m)?)?;
    m.add_function(wrap_pyfunction!(python::bindings::analyze_trades, m)?)?;
    m.add_function(wrap_pyfunction!(python::bindings::detect_realtime_bias, m)?)?;
    m.add_function(wrap_pyfunction!(python::bindings::evaluate_backtest, m)?)?;
    m.add_function(wrap_pyfunction!(python::bindings::simulate_allocation, m)?)?;

    Ok(())
}
