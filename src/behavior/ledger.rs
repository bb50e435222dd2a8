//! Chronological trade ledger with a per-symbol index.
//!
//! Built once per analysis so the detectors can answer average-cost and
//! next-sell lookups with binary searches instead of rescanning the ledger.

use std::collections::HashMap;

use crate::core::types::{Timestamp, TradeRecord};

/// Per-symbol view of the ledger.
#[derive(Debug, Default)]
struct SymbolIndex {
    /// Positions in the chronological trade list, ordered.
    trades: Vec<usize>,
    buy_times: Vec<Timestamp>,
    /// `buy_price_prefix[k]` = sum of the first `k` buy prices.
    buy_price_prefix: Vec<f64>,
    sells: Vec<usize>,
    sell_times: Vec<Timestamp>,
}

/// Trades sorted by timestamp (stable for equal timestamps) plus a
/// per-symbol index.
#[derive(Debug)]
pub struct TradeLedger<'a> {
    trades: Vec<&'a TradeRecord>,
    index: HashMap<&'a str, SymbolIndex>,
    /// Symbols in order of first appearance.
    symbols: Vec<&'a str>,
}

impl<'a> TradeLedger<'a> {
    pub fn new(records: &'a [TradeRecord]) -> Self {
        let mut trades: Vec<&TradeRecord> = records.iter().collect();
        trades.sort_by_key(|t| t.timestamp);

        let mut index: HashMap<&str, SymbolIndex> = HashMap::new();
        let mut symbols = Vec::new();

        for (pos, &trade) in trades.iter().enumerate() {
            let entry = index.entry(trade.symbol.as_str()).or_insert_with(|| {
                symbols.push(trade.symbol.as_str());
                SymbolIndex {
                    buy_price_prefix: vec![0.0],
                    ..Default::default()
                }
            });
            entry.trades.push(pos);
            if trade.is_buy() {
                let running = entry.buy_price_prefix.last().copied().unwrap_or(0.0);
                entry.buy_times.push(trade.timestamp);
                entry.buy_price_prefix.push(running + trade.price);
            } else {
                entry.sells.push(pos);
                entry.sell_times.push(trade.timestamp);
            }
        }

        Self {
            trades,
            index,
            symbols,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.trades.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.trades.is_empty()
    }

    /// All trades in chronological order.
    pub fn trades(&self) -> &[&'a TradeRecord] {
        &self.trades
    }

    pub fn buys(&self) -> impl Iterator<Item = &'a TradeRecord> + '_ {
        self.trades.iter().copied().filter(|t| t.is_buy())
    }

    pub fn sells(&self) -> impl Iterator<Item = &'a TradeRecord> + '_ {
        self.trades.iter().copied().filter(|t| t.is_sell())
    }

    /// Distinct symbols in order of first appearance.
    pub fn symbols(&self) -> &[&'a str] {
        &self.symbols
    }

    /// Trades of one symbol in chronological order.
    pub fn symbol_trades(&self, symbol: &str) -> impl Iterator<Item = &'a TradeRecord> + '_ {
        self.index
            .get(symbol)
            .map(|idx| idx.trades.as_slice())
            .unwrap_or(&[])
            .iter()
            .map(move |&pos| self.trades[pos])
    }

    /// Number of trades for `symbol`.
    pub fn trade_count(&self, symbol: &str) -> usize {
        self.index.get(symbol).map_or(0, |idx| idx.trades.len())
    }

    /// Number of buys for `symbol`.
    pub fn buy_count(&self, symbol: &str) -> usize {
        self.index.get(symbol).map_or(0, |idx| idx.buy_times.len())
    }

    pub fn first_timestamp(&self) -> Option<Timestamp> {
        self.trades.first().map(|t| t.timestamp)
    }

    pub fn last_timestamp(&self) -> Option<Timestamp> {
        self.trades.last().map(|t| t.timestamp)
    }

    /// Mean price of all buys of `symbol` dated strictly before `at`.
    pub fn average_cost_before(&self, symbol: &str, at: Timestamp) -> Option<f64> {
        let idx = self.index.get(symbol)?;
        let count = idx.buy_times.partition_point(|t| *t < at);
        if count == 0 {
            return None;
        }
        Some(idx.buy_price_prefix[count] / count as f64)
    }

    /// First sell of `symbol` dated strictly after `at`.
    pub fn first_sell_after(&self, symbol: &str, at: Timestamp) -> Option<&'a TradeRecord> {
        let idx = self.index.get(symbol)?;
        let k = idx.sell_times.partition_point(|t| *t <= at);
        idx.sells.get(k).map(|&pos| self.trades[pos])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::TradeAction;
    use chrono::{Duration, TimeZone, Utc};

    fn trade(symbol: &str, action: TradeAction, price: f64, day: i64) -> TradeRecord {
        let base = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        TradeRecord::new(symbol, action, 1.0, price, base + Duration::days(day)).unwrap()
    }

    #[test]
    fn test_sorted_chronologically() {
        let records = vec![
            trade("B", TradeAction::Buy, 10.0, 5),
            trade("A", TradeAction::Buy, 20.0, 1),
            trade("A", TradeAction::Sell, 25.0, 3),
        ];
        let ledger = TradeLedger::new(&records);
        let prices: Vec<_> = ledger.trades().iter().map(|t| t.price).collect();
        assert_eq!(prices, vec![20.0, 25.0, 10.0]);
        assert_eq!(ledger.symbols(), &["A", "B"]);
    }

    #[test]
    fn test_average_cost_strictly_before() {
        let records = vec![
            trade("A", TradeAction::Buy, 10.0, 0),
            trade("A", TradeAction::Buy, 20.0, 1),
            trade("A", TradeAction::Buy, 90.0, 2),
            trade("A", TradeAction::Sell, 30.0, 2),
        ];
        let ledger = TradeLedger::new(&records);
        let sell = ledger.sells().next().unwrap();

        // The same-day buy is excluded
        let avg = ledger.average_cost_before("A", sell.timestamp).unwrap();
        assert!((avg - 15.0).abs() < 1e-12);
        assert!(ledger.average_cost_before("A", records[0].timestamp).is_none());
        assert!(ledger.average_cost_before("Z", sell.timestamp).is_none());
    }

    #[test]
    fn test_first_sell_after() {
        let records = vec![
            trade("A", TradeAction::Buy, 10.0, 0),
            trade("A", TradeAction::Sell, 11.0, 0),
            trade("A", TradeAction::Sell, 12.0, 4),
            trade("A", TradeAction::Sell, 13.0, 9),
        ];
        let ledger = TradeLedger::new(&records);
        let buy = ledger.buys().next().unwrap();
        let sell = ledger.first_sell_after("A", buy.timestamp).unwrap();
        assert!((sell.price - 12.0).abs() < 1e-12);
        assert_eq!(ledger.buy_count("A"), 1);
        assert_eq!(ledger.trade_count("A"), 4);
    }
}
