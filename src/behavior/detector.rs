//! Ledger-based detection of eight cognitive biases.
//!
//! Every detector reads the same [`TradeLedger`] and returns a score in
//! [0, 1] together with the raw quantities behind it. Sells are always
//! matched against the average cost of the same symbol's earlier buys.

use chrono::Utc;
use serde_json::json;
use tracing::{debug, info};

use super::ledger::TradeLedger;
use crate::core::config::{BiasThresholds, DetectorConfig};
use crate::core::types::{
    clamp_unit, BehavioralEvent, BiasKind, BiasScoreVector, ContextMap, Timestamp, TradeRecord,
};

/// A reasonable investor trades one to two times a month.
const BENCHMARK_TRADES_PER_DAY: f64 = 1.5 / 30.0;

/// Buy counts above this multiple of the mean mark a symbol as repeatedly bought.
const REPEAT_BUY_MULTIPLE: f64 = 1.5;

/// Realized return below which a sale counts as a significant loss.
const SIGNIFICANT_LOSS: f64 = -0.1;

/// Sells required before regret aversion is scored.
const MIN_SELLS_FOR_REGRET: usize = 5;

/// Score and supporting evidence from one detector.
#[derive(Debug, Clone, Default)]
pub struct Detection {
    pub score: f64,
    pub context: ContextMap,
}

impl Detection {
    fn none() -> Self {
        Self::default()
    }

    fn new(score: f64, context: ContextMap) -> Self {
        Self {
            score: clamp_unit(score),
            context,
        }
    }
}

/// Scores the eight ledger biases and emits threshold-crossing events.
#[derive(Debug, Clone, Default)]
pub struct BehavioralBiasDetector {
    config: DetectorConfig,
}

impl BehavioralBiasDetector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: DetectorConfig) -> Self {
        Self { config }
    }

    /// Set the minimum ledger length.
    pub fn with_min_trades(mut self, min_trades: usize) -> Self {
        self.config.min_trades = min_trades;
        self
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Analyze a ledger, stamping events with the current time.
    pub fn analyze(&self, trades: &[TradeRecord]) -> (BiasScoreVector, Vec<BehavioralEvent>) {
        self.analyze_at(trades, Utc::now())
    }

    /// Analyze a ledger, stamping events with `now`.
    ///
    /// Ledgers shorter than `min_trades` yield a zero vector and no events.
    pub fn analyze_at(
        &self,
        trades: &[TradeRecord],
        now: Timestamp,
    ) -> (BiasScoreVector, Vec<BehavioralEvent>) {
        if trades.len() < self.config.min_trades {
            debug!(
                trades = trades.len(),
                min_trades = self.config.min_trades,
                "insufficient trades for bias analysis"
            );
            return (BiasScoreVector::default(), Vec::new());
        }

        let ledger = TradeLedger::new(trades);
        let detections = [
            detect_disposition_effect(&ledger),
            detect_loss_aversion(&ledger),
            detect_overconfidence(&ledger),
            detect_recency_bias(&ledger),
            detect_herding_behavior(&ledger),
            detect_confirmation_bias(&ledger),
            detect_anchoring_bias(&ledger),
            detect_regret_aversion(&ledger),
        ];

        let thresholds = threshold_array(&self.config.thresholds);
        let mut events = Vec::new();
        for ((kind, detection), threshold) in BiasKind::LEDGER_BIASES
            .iter()
            .zip(detections.iter())
            .zip(thresholds.iter())
        {
            if detection.score > *threshold {
                events.push(BehavioralEvent::new(
                    *kind,
                    detection.score,
                    now,
                    detection.context.clone(),
                ));
            }
        }

        let scores = BiasScoreVector::from_components(detections.map(|d| d.score));

        info!(
            trades = trades.len(),
            overall_score = scores.overall_score,
            events = events.len(),
            "bias analysis complete"
        );
        (scores, events)
    }
}

/// Analyze a ledger with the default configuration.
pub fn analyze_trades(trades: &[TradeRecord]) -> (BiasScoreVector, Vec<BehavioralEvent>) {
    BehavioralBiasDetector::new().analyze(trades)
}

fn threshold_array(t: &BiasThresholds) -> [f64; 8] {
    [
        t.disposition_effect,
        t.loss_aversion,
        t.overconfidence,
        t.recency_bias,
        t.herding_behavior,
        t.confirmation_bias,
        t.anchoring_bias,
        t.regret_aversion,
    ]
}

/// Realized return of a sell against its average cost, if any buys precede it.
fn realized_return(ledger: &TradeLedger<'_>, sell: &TradeRecord) -> Option<f64> {
    ledger
        .average_cost_before(&sell.symbol, sell.timestamp)
        .map(|avg_cost| (sell.price - avg_cost) / avg_cost)
}

/// Selling winners more readily than losers, weighted by quantity.
pub fn detect_disposition_effect(ledger: &TradeLedger<'_>) -> Detection {
    let mut realized_gains = 0.0;
    let mut realized_losses = 0.0;
    let mut sold_positions = 0usize;

    for sell in ledger.sells() {
        if let Some(ret) = realized_return(ledger, sell) {
            if ret > 0.0 {
                realized_gains += sell.quantity * ret;
            } else {
                realized_losses += (sell.quantity * ret).abs();
            }
            sold_positions += 1;
        }
    }

    let total = realized_gains + realized_losses;
    if total <= 0.0 {
        return Detection::none();
    }

    let ratio = realized_gains / total;
    let score = (ratio - 0.5).max(0.0) * 2.0;

    let mut ctx = ContextMap::new();
    ctx.insert("realized_gains".into(), json!(realized_gains));
    ctx.insert("realized_losses".into(), json!(realized_losses));
    ctx.insert("ratio".into(), json!(ratio));
    ctx.insert("sold_positions".into(), json!(sold_positions));
    Detection::new(score, ctx)
}

/// Holding losers longer than winners.
///
/// Each buy is paired with the first sell of the same symbol dated strictly
/// after it; the pair is a loss when the sell price is below the buy price.
pub fn detect_loss_aversion(ledger: &TradeLedger<'_>) -> Detection {
    let mut loss_days = Vec::new();
    let mut gain_days = Vec::new();

    for buy in ledger.buys() {
        if let Some(sell) = ledger.first_sell_after(&buy.symbol, buy.timestamp) {
            let held = (sell.timestamp - buy.timestamp).num_days() as f64;
            if sell.price < buy.price {
                loss_days.push(held);
            } else {
                gain_days.push(held);
            }
        }
    }

    if loss_days.is_empty() || gain_days.is_empty() {
        return Detection::none();
    }

    let avg_loss = mean(&loss_days);
    let avg_gain = mean(&gain_days);
    let score = (avg_loss / (avg_gain + 1.0)).min(1.0);

    let mut ctx = ContextMap::new();
    ctx.insert("avg_loss_holding_days".into(), json!(avg_loss));
    ctx.insert("avg_gain_holding_days".into(), json!(avg_gain));
    ctx.insert("loss_pairs".into(), json!(loss_days.len()));
    ctx.insert("gain_pairs".into(), json!(gain_days.len()));
    Detection::new(score, ctx)
}

/// Trading far more often than a benchmark investor.
pub fn detect_overconfidence(ledger: &TradeLedger<'_>) -> Detection {
    let (first, last) = match (ledger.first_timestamp(), ledger.last_timestamp()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Detection::none(),
    };
    let period_days = (last - first).num_days() + 1;
    if period_days < 1 {
        return Detection::none();
    }

    let total_trades = ledger.len();
    let trades_per_day = total_trades as f64 / period_days as f64;
    let score = (trades_per_day / BENCHMARK_TRADES_PER_DAY).min(1.0);

    let mut ctx = ContextMap::new();
    ctx.insert("trades_per_day".into(), json!(trades_per_day));
    ctx.insert("total_trades".into(), json!(total_trades));
    ctx.insert("period_days".into(), json!(period_days));
    Detection::new(score, ctx)
}

/// Activity concentrated in the second half of the ledger's time span.
pub fn detect_recency_bias(ledger: &TradeLedger<'_>) -> Detection {
    let (first, last) = match (ledger.first_timestamp(), ledger.last_timestamp()) {
        (Some(first), Some(last)) => (first, last),
        _ => return Detection::none(),
    };
    let midpoint = first + (last - first) / 2;

    let recent = ledger.trades().iter().filter(|t| t.timestamp > midpoint).count();
    let old = ledger.len() - recent;
    if old == 0 {
        return Detection::none();
    }

    let ratio = recent as f64 / ledger.len() as f64;
    let score = ((ratio - 0.5) * 2.0).min(1.0);

    let mut ctx = ContextMap::new();
    ctx.insert("recent_trade_ratio".into(), json!(ratio));
    ctx.insert("recent_trades".into(), json!(recent));
    ctx.insert("old_trades".into(), json!(old));
    Detection::new(score, ctx)
}

/// Trading concentrated in a few symbols (normalized Herfindahl index).
pub fn detect_herding_behavior(ledger: &TradeLedger<'_>) -> Detection {
    let symbols = ledger.symbols();
    if symbols.len() < 2 {
        return Detection::none();
    }

    let total = ledger.len() as f64;
    let counts: Vec<(&str, usize)> = symbols
        .iter()
        .map(|s| (*s, ledger.trade_count(s)))
        .collect();
    let herfindahl: f64 = counts
        .iter()
        .map(|(_, c)| (*c as f64 / total).powi(2))
        .sum();
    let floor = 1.0 / counts.len() as f64;
    let normalized = (herfindahl - floor) / (1.0 - floor);
    let score = normalized.min(1.0);

    // Highest count wins; ties go to the symbol traded first
    let (top_symbol, top_count) = counts
        .iter()
        .fold(counts[0], |best, cur| if cur.1 > best.1 { *cur } else { best });

    let mut ctx = ContextMap::new();
    ctx.insert("top_symbol".into(), json!(top_symbol));
    ctx.insert("top_symbol_concentration".into(), json!(top_count as f64 / total));
    ctx.insert("unique_symbols".into(), json!(counts.len()));
    ctx.insert("herfindahl_index".into(), json!(herfindahl));
    Detection::new(score, ctx)
}

/// Repeatedly adding to the same names.
pub fn detect_confirmation_bias(ledger: &TradeLedger<'_>) -> Detection {
    let buy_counts: Vec<usize> = ledger
        .symbols()
        .iter()
        .map(|s| ledger.buy_count(s))
        .filter(|&c| c > 0)
        .collect();
    if buy_counts.is_empty() {
        return Detection::none();
    }

    let avg_buys = buy_counts.iter().sum::<usize>() as f64 / buy_counts.len() as f64;
    let repeated = buy_counts
        .iter()
        .filter(|&&c| c as f64 > avg_buys * REPEAT_BUY_MULTIPLE)
        .count();
    let ratio = repeated as f64 / buy_counts.len() as f64;
    let score = (ratio * 2.0).min(1.0);

    let mut ctx = ContextMap::new();
    ctx.insert("repeatedly_bought_symbols".into(), json!(repeated));
    ctx.insert("avg_buys_per_symbol".into(), json!(avg_buys));
    ctx.insert(
        "max_buys_single_symbol".into(),
        json!(buy_counts.iter().copied().max().unwrap_or(0)),
    );
    Detection::new(score, ctx)
}

/// Trading close to the first observed price of each symbol.
pub fn detect_anchoring_bias(ledger: &TradeLedger<'_>) -> Detection {
    let mut deviations = Vec::new();
    for symbol in ledger.symbols() {
        let mut trades = ledger.symbol_trades(symbol);
        let anchor = match trades.next() {
            Some(first) => first.price,
            None => continue,
        };
        deviations.extend(trades.map(|t| (t.price - anchor).abs() / anchor));
    }

    if deviations.is_empty() {
        return Detection::none();
    }

    let avg_deviation = mean(&deviations);
    let score = 1.0 - avg_deviation;

    let mut ctx = ContextMap::new();
    ctx.insert("avg_price_deviation".into(), json!(avg_deviation));
    ctx.insert("symbols_analyzed".into(), json!(ledger.symbols().len()));
    Detection::new(score, ctx)
}

/// Share of sells that locked in a loss of more than 10%.
pub fn detect_regret_aversion(ledger: &TradeLedger<'_>) -> Detection {
    let total_sells = ledger.sells().count();
    if total_sells < MIN_SELLS_FOR_REGRET {
        return Detection::none();
    }

    let losses: Vec<f64> = ledger
        .sells()
        .filter_map(|sell| realized_return(ledger, sell))
        .filter(|&ret| ret < SIGNIFICANT_LOSS)
        .collect();
    if losses.is_empty() {
        return Detection::none();
    }

    let score = (losses.len() as f64 / total_sells as f64).min(1.0);

    let mut ctx = ContextMap::new();
    ctx.insert("significant_losses".into(), json!(losses.len()));
    ctx.insert("avg_loss_magnitude".into(), json!(mean(&losses)));
    ctx.insert("total_sells".into(), json!(total_sells));
    Detection::new(score, ctx)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TradeAction;
    use chrono::{Duration, TimeZone};

    fn at(day: i64) -> Timestamp {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::days(day)
    }

    fn trade(symbol: &str, action: TradeAction, qty: f64, price: f64, day: i64) -> TradeRecord {
        TradeRecord::new(symbol, action, qty, price, at(day)).unwrap()
    }

    #[test]
    fn test_short_ledger_is_neutral() {
        let trades: Vec<_> = (0..9)
            .map(|d| trade("AAPL", TradeAction::Buy, 1.0, 100.0, d))
            .collect();
        let (scores, events) = BehavioralBiasDetector::new().analyze_at(&trades, at(30));

        assert_eq!(scores, BiasScoreVector::default());
        assert!(events.is_empty());
    }

    #[test]
    fn test_disposition_all_gains() {
        let records = vec![
            trade("A", TradeAction::Buy, 10.0, 100.0, 0),
            trade("A", TradeAction::Sell, 5.0, 110.0, 1),
            trade("A", TradeAction::Sell, 5.0, 120.0, 2),
        ];
        let ledger = TradeLedger::new(&records);
        let d = detect_disposition_effect(&ledger);

        assert!((d.score - 1.0).abs() < 1e-12);
        assert!((d.context["ratio"].as_f64().unwrap() - 1.0).abs() < 1e-12);
        assert_eq!(d.context["realized_losses"].as_f64().unwrap(), 0.0);
    }

    #[test]
    fn test_disposition_ignores_unmatched_sells() {
        let records = vec![trade("A", TradeAction::Sell, 5.0, 110.0, 1)];
        let ledger = TradeLedger::new(&records);
        assert_eq!(detect_disposition_effect(&ledger).score, 0.0);
    }

    #[test]
    fn test_loss_aversion_holding_periods() {
        let records = vec![
            // gain held 2 days
            trade("A", TradeAction::Buy, 1.0, 100.0, 0),
            trade("A", TradeAction::Sell, 1.0, 110.0, 2),
            // loss held 30 days
            trade("B", TradeAction::Buy, 1.0, 100.0, 0),
            trade("B", TradeAction::Sell, 1.0, 80.0, 30),
        ];
        let ledger = TradeLedger::new(&records);
        let d = detect_loss_aversion(&ledger);

        // min(1, 30 / (2 + 1))
        assert!((d.score - 1.0).abs() < 1e-12);
        assert!((d.context["avg_loss_holding_days"].as_f64().unwrap() - 30.0).abs() < 1e-12);
    }

    #[test]
    fn test_overconfidence_rate() {
        // 10 trades over 100 days -> 0.1 per day, benchmark 0.05 -> capped at 1
        let records: Vec<_> = (0..10)
            .map(|i| trade("A", TradeAction::Buy, 1.0, 100.0, i * 11))
            .collect();
        let ledger = TradeLedger::new(&records);
        let d = detect_overconfidence(&ledger);
        assert_eq!(d.context["period_days"].as_i64().unwrap(), 100);
        assert!((d.score - 1.0).abs() < 1e-12);

        // 2 trades over 100 days -> 0.02 per day -> 0.4
        let records = vec![
            trade("A", TradeAction::Buy, 1.0, 100.0, 0),
            trade("A", TradeAction::Sell, 1.0, 100.0, 99),
        ];
        let ledger = TradeLedger::new(&records);
        assert!((detect_overconfidence(&ledger).score - 0.4).abs() < 1e-12);
    }

    #[test]
    fn test_recency_never_negative() {
        // Most trades early -> raw score negative, clamped to 0
        let mut records: Vec<_> = (0..8)
            .map(|i| trade("A", TradeAction::Buy, 1.0, 100.0, i))
            .collect();
        records.push(trade("A", TradeAction::Buy, 1.0, 100.0, 100));
        let ledger = TradeLedger::new(&records);
        assert_eq!(detect_recency_bias(&ledger).score, 0.0);
    }

    #[test]
    fn test_herding_single_symbol_is_zero() {
        let records: Vec<_> = (0..12)
            .map(|i| trade("A", TradeAction::Buy, 1.0, 100.0, i))
            .collect();
        let ledger = TradeLedger::new(&records);
        let d = detect_herding_behavior(&ledger);
        assert_eq!(d.score, 0.0);
        assert!(!d.score.is_nan());
    }

    #[test]
    fn test_herding_even_split_is_zero() {
        let records = vec![
            trade("A", TradeAction::Buy, 1.0, 100.0, 0),
            trade("B", TradeAction::Buy, 1.0, 100.0, 1),
            trade("A", TradeAction::Buy, 1.0, 100.0, 2),
            trade("B", TradeAction::Buy, 1.0, 100.0, 3),
        ];
        let ledger = TradeLedger::new(&records);
        let d = detect_herding_behavior(&ledger);
        assert!(d.score.abs() < 1e-12);
        assert_eq!(d.context["top_symbol"], json!("A"));
    }

    #[test]
    fn test_confirmation_repeated_buys() {
        // A bought 6 times, B/C/D once: mean 2.25, threshold 3.375 -> A only
        let mut records: Vec<_> = (0..6)
            .map(|i| trade("A", TradeAction::Buy, 1.0, 100.0, i))
            .collect();
        for (i, s) in ["B", "C", "D"].iter().enumerate() {
            records.push(trade(s, TradeAction::Buy, 1.0, 50.0, 10 + i as i64));
        }
        let ledger = TradeLedger::new(&records);
        let d = detect_confirmation_bias(&ledger);
        // ratio 1/4 -> score 0.5
        assert!((d.score - 0.5).abs() < 1e-12);
        assert_eq!(d.context["max_buys_single_symbol"].as_u64().unwrap(), 6);
    }

    #[test]
    fn test_anchoring_clamped() {
        let records = vec![
            trade("A", TradeAction::Buy, 1.0, 10.0, 0),
            trade("A", TradeAction::Buy, 1.0, 40.0, 1),
        ];
        let ledger = TradeLedger::new(&records);
        // deviation 3.0 -> 1 - 3 clamped to 0
        assert_eq!(detect_anchoring_bias(&ledger).score, 0.0);

        let records = vec![
            trade("A", TradeAction::Buy, 1.0, 100.0, 0),
            trade("A", TradeAction::Buy, 1.0, 110.0, 1),
            trade("A", TradeAction::Buy, 1.0, 90.0, 2),
        ];
        let ledger = TradeLedger::new(&records);
        assert!((detect_anchoring_bias(&ledger).score - 0.9).abs() < 1e-12);
    }

    #[test]
    fn test_regret_requires_five_sells() {
        let mut records = vec![trade("A", TradeAction::Buy, 1.0, 100.0, 0)];
        for i in 0..4 {
            records.push(trade("A", TradeAction::Sell, 1.0, 50.0, 1 + i));
        }
        let ledger = TradeLedger::new(&records);
        assert_eq!(detect_regret_aversion(&ledger).score, 0.0);

        records.push(trade("A", TradeAction::Sell, 1.0, 99.0, 10));
        let ledger = TradeLedger::new(&records);
        let d = detect_regret_aversion(&ledger);
        // 4 of 5 sells lost 50%
        assert!((d.score - 0.8).abs() < 1e-12);
        assert_eq!(d.context["total_sells"].as_u64().unwrap(), 5);
    }
}
