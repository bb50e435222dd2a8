//! Backtest performance metrics.

pub mod backtest;
pub mod drawdown;

pub use backtest::{evaluate_backtest, BacktestEvaluator, BacktestMetrics};
pub use drawdown::{drawdown_periods, max_drawdown, DrawdownPeriod};
