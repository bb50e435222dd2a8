//! News sentiment lookups used to enrich a [`MarketContext`].

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::core::error::{BehavioralError, Result};
use crate::core::types::MarketContext;

/// Sentiment snapshot for one symbol.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentReading {
    /// Upper-cased symbol.
    pub symbol: String,
    /// In [-1, 1].
    pub sentiment_score: f64,
    pub confidence: f64,
    pub volume_mentions: u64,
    pub source: String,
}

/// Source of sentiment readings.
///
/// Lets the real-time monitor run against a live feed in production and a
/// deterministic mock in tests.
pub trait SentimentProvider: Send + Sync {
    fn sentiment(&self, symbol: &str) -> Result<SentimentReading>;
}

/// Deterministic sentiment derived from SHA-256 of the upper-cased symbol.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockSentiment;

impl MockSentiment {
    pub const SOURCE: &'static str = "mocked";
}

impl SentimentProvider for MockSentiment {
    fn sentiment(&self, symbol: &str) -> Result<SentimentReading> {
        let symbol = symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(BehavioralError::invalid_input("symbol is empty"));
        }
        let digest = Sha256::digest(symbol.as_bytes());

        let score = (digest_mod(&digest, 200) as f64 - 100.0) / 100.0;
        let confidence = 0.6 + digest_mod(&digest, 30) as f64 / 100.0;

        Ok(SentimentReading {
            symbol,
            sentiment_score: round2(score),
            confidence: round2(confidence),
            volume_mentions: 100 + digest_mod(&digest, 1000),
            source: Self::SOURCE.to_string(),
        })
    }
}

/// Remainder of the digest, read as a big-endian integer, modulo `m`.
fn digest_mod(digest: &[u8], m: u64) -> u64 {
    digest
        .iter()
        .fold(0u64, |acc, &byte| (acc * 256 + u64::from(byte)) % m)
}

#[inline]
fn round2(x: f64) -> f64 {
    (x * 100.0).round() / 100.0
}

impl MarketContext {
    /// Copy of the context with `sentiment_score` taken from `provider`.
    pub fn with_sentiment(self, provider: &dyn SentimentProvider, symbol: &str) -> Result<Self> {
        let reading = provider.sentiment(symbol)?;
        Ok(Self {
            sentiment_score: reading.sentiment_score,
            ..self
        })
    }
}
