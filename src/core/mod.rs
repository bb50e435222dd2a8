//! Core types, configuration and errors shared by every engine.

pub mod config;
pub mod error;
pub mod types;

pub use config::{BacktestConfig, BiasThresholds, DetectorConfig, EngineConfig, SolverConfig};
pub use error::{BehavioralError, Result};
pub use types::*;
