//! Behavioral bias detection over trade histories and live trades.

pub mod detector;
pub mod ledger;
pub mod realtime;

pub use detector::{analyze_trades, BehavioralBiasDetector, Detection};
pub use ledger::TradeLedger;
pub use realtime::{detect_realtime_bias, recommendation, RealTimeBiasMonitor};
