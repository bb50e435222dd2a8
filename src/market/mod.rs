//! Market-side inputs to the real-time monitor.

pub mod sentiment;

pub use sentiment::{MockSentiment, SentimentProvider, SentimentReading};
