//! Single-trade panic and FOMO classification.

use chrono::Utc;
use serde_json::json;
use tracing::debug;

use crate::core::types::{
    BehavioralEvent, BiasKind, ContextMap, LiveTrade, MarketContext, Timestamp, TradeAction,
};

/// Market and instrument move (percent) beyond which a trade is emotional.
const MOVE_TRIGGER_PERCENT: f64 = 5.0;

/// Market move (percent) that maps to full severity.
const FULL_SEVERITY_PERCENT: f64 = 20.0;

/// Stateless classifier for trades about to execute.
#[derive(Debug, Clone, Copy, Default)]
pub struct RealTimeBiasMonitor;

impl RealTimeBiasMonitor {
    pub fn new() -> Self {
        Self
    }

    pub fn detect(&self, trade: &LiveTrade, market: &MarketContext) -> Option<BehavioralEvent> {
        self.detect_at(trade, market, Utc::now())
    }

    /// Classify `trade`. The sell rule is checked before the buy rule.
    pub fn detect_at(
        &self,
        trade: &LiveTrade,
        market: &MarketContext,
        now: Timestamp,
    ) -> Option<BehavioralEvent> {
        let event = match trade.action {
            TradeAction::Sell
                if market.market_down_percent > MOVE_TRIGGER_PERCENT
                    && trade.last_price_change < -MOVE_TRIGGER_PERCENT =>
            {
                let mut ctx = ContextMap::new();
                ctx.insert("market_down".into(), json!(market.market_down_percent));
                ctx.insert("stock_down".into(), json!(trade.last_price_change));
                ctx.insert("trading_volume".into(), json!(market.trading_volume));
                let severity = (market.market_down_percent.abs() / FULL_SEVERITY_PERCENT).min(1.0);
                BehavioralEvent::new(BiasKind::PanicSelling, severity, now, ctx)
            }
            TradeAction::Buy
                if market.market_up_percent > MOVE_TRIGGER_PERCENT
                    && trade.last_price_change > MOVE_TRIGGER_PERCENT =>
            {
                let mut ctx = ContextMap::new();
                ctx.insert("market_up".into(), json!(market.market_up_percent));
                ctx.insert("stock_up".into(), json!(trade.last_price_change));
                ctx.insert("news_sentiment".into(), json!(market.sentiment_score));
                let severity = (market.market_up_percent / FULL_SEVERITY_PERCENT).min(1.0);
                BehavioralEvent::new(BiasKind::FomoBuying, severity, now, ctx)
            }
            _ => return None,
        };

        debug!(
            symbol = %trade.symbol,
            bias = %event.event_type,
            severity = event.severity,
            "real-time bias detected"
        );
        Some(event)
    }
}

/// Classify a live trade with the default monitor.
pub fn detect_realtime_bias(trade: &LiveTrade, market: &MarketContext) -> Option<BehavioralEvent> {
    RealTimeBiasMonitor::new().detect(trade, market)
}

/// Advice shown to the investor for a detection outcome.
pub fn recommendation(event: &Option<BehavioralEvent>) -> String {
    match event {
        Some(event) => format!(
            "You may be exhibiting {}. Consider waiting 5 minutes before executing.",
            event.event_type
        ),
        None => "Trade appears rationally motivated".to_string(),
    }
}
