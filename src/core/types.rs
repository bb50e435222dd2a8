//! Core data types shared by the behavioral engines.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::error::{BehavioralError, Result};

/// Type alias for trade and event timestamps.
pub type Timestamp = DateTime<Utc>;

/// Key-value evidence attached to results and events.
pub type ContextMap = BTreeMap<String, Value>;

/// Side of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TradeAction {
    Buy,
    Sell,
}

impl TradeAction {
    pub fn as_str(self) -> &'static str {
        match self {
            TradeAction::Buy => "BUY",
            TradeAction::Sell => "SELL",
        }
    }
}

impl FromStr for TradeAction {
    type Err = BehavioralError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_uppercase().as_str() {
            "BUY" => Ok(TradeAction::Buy),
            "SELL" => Ok(TradeAction::Sell),
            other => Err(BehavioralError::invalid_input(format!(
                "unknown trade action '{other}'"
            ))),
        }
    }
}

/// A single executed trade from the investor's ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradeRecord {
    /// Instrument symbol.
    pub symbol: String,
    /// Buy or sell.
    pub action: TradeAction,
    /// Number of shares/contracts (positive).
    pub quantity: f64,
    /// Execution price (positive).
    pub price: f64,
    /// Execution time.
    pub timestamp: Timestamp,
}

impl TradeRecord {
    /// Create a validated trade record.
    pub fn new(
        symbol: impl Into<String>,
        action: TradeAction,
        quantity: f64,
        price: f64,
        timestamp: Timestamp,
    ) -> Result<Self> {
        let symbol = symbol.into();
        if symbol.trim().is_empty() {
            return Err(BehavioralError::invalid_input("trade symbol is empty"));
        }
        if !(quantity.is_finite() && quantity > 0.0) {
            return Err(BehavioralError::invalid_input(format!(
                "trade quantity must be positive, got {quantity}"
            )));
        }
        if !(price.is_finite() && price > 0.0) {
            return Err(BehavioralError::invalid_input(format!(
                "trade price must be positive, got {price}"
            )));
        }
        Ok(Self {
            symbol,
            action,
            quantity,
            price,
            timestamp,
        })
    }

    #[inline]
    pub fn is_buy(&self) -> bool {
        self.action == TradeAction::Buy
    }

    #[inline]
    pub fn is_sell(&self) -> bool {
        self.action == TradeAction::Sell
    }
}

/// Investor's stated objective.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvestmentObjective {
    Conservative,
    #[default]
    Balanced,
    Aggressive,
}

impl FromStr for InvestmentObjective {
    type Err = BehavioralError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "conservative" => Ok(InvestmentObjective::Conservative),
            "balanced" => Ok(InvestmentObjective::Balanced),
            "aggressive" => Ok(InvestmentObjective::Aggressive),
            other => Err(BehavioralError::invalid_input(format!(
                "unknown investment objective '{other}'"
            ))),
        }
    }
}

/// Baseline loss-aversion coefficient (Kahneman & Tversky).
pub const DEFAULT_LOSS_AVERSION: f64 = 2.25;

/// Behavioral profile of an investor.
///
/// Engines read a snapshot per call and never mutate it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserBehavioralProfile {
    pub risk_tolerance: f64,
    pub loss_aversion_coefficient: f64,
    pub overconfidence_score: f64,
    pub experience_years: u32,
    pub investment_objective: InvestmentObjective,
}

impl Default for UserBehavioralProfile {
    fn default() -> Self {
        Self {
            risk_tolerance: 0.5,
            loss_aversion_coefficient: DEFAULT_LOSS_AVERSION,
            overconfidence_score: 0.5,
            experience_years: 0,
            investment_objective: InvestmentObjective::Balanced,
        }
    }
}

impl UserBehavioralProfile {
    /// Set loss-aversion coefficient.
    pub fn with_loss_aversion(mut self, coefficient: f64) -> Self {
        self.loss_aversion_coefficient = coefficient;
        self
    }

    /// Set overconfidence score.
    pub fn with_overconfidence(mut self, score: f64) -> Self {
        self.overconfidence_score = score;
        self
    }

    /// Set risk tolerance.
    pub fn with_risk_tolerance(mut self, tolerance: f64) -> Self {
        self.risk_tolerance = tolerance;
        self
    }

    /// Derive an updated profile from measured bias scores.
    ///
    /// Loss aversion is raised from the baseline by up to 0.5 and the
    /// overconfidence score is replaced by the measured one.
    pub fn calibrated(&self, scores: &BiasScoreVector) -> Self {
        Self {
            loss_aversion_coefficient: DEFAULT_LOSS_AVERSION + scores.loss_aversion * 0.5,
            overconfidence_score: scores.overconfidence,
            ..self.clone()
        }
    }
}

/// Allocation constraints for the optimizer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizationConstraints {
    /// Lower bound for each weight.
    pub min_weight: f64,
    /// Upper bound for each weight.
    pub max_weight: f64,
    /// Desired minimum number of positions above 1%.
    pub min_positions: usize,
}

impl Default for OptimizationConstraints {
    fn default() -> Self {
        Self {
            min_weight: 0.01,
            max_weight: 0.30,
            min_positions: 5,
        }
    }
}

impl OptimizationConstraints {
    pub fn new(min_weight: f64, max_weight: f64, min_positions: usize) -> Self {
        Self {
            min_weight,
            max_weight,
            min_positions,
        }
    }

    /// Whether these constraints admit a fully invested portfolio of `n_assets`.
    pub fn is_feasible_for(&self, n_assets: usize) -> bool {
        self.max_weight * n_assets as f64 >= 1.0 && self.min_positions <= n_assets
    }

    /// Repair the constraints for `n_assets`: widen `max_weight` to `1/n`
    /// when the budget cannot be met and clamp `min_positions` to `n`.
    pub fn repaired(&self, n_assets: usize) -> Self {
        let mut repaired = *self;
        if n_assets == 0 {
            return repaired;
        }
        if repaired.max_weight * (n_assets as f64) < 1.0 {
            repaired.max_weight = 1.0 / n_assets as f64;
        }
        if repaired.min_positions > n_assets {
            repaired.min_positions = n_assets;
        }
        repaired
    }
}

/// Allocation method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OptimizationMethod {
    /// Prospect-theory mean-variance.
    #[default]
    BehavioralMvo,
    /// Equilibrium/view blend with confidence shrinkage.
    BlackLitterman,
    /// Equal risk contribution.
    RiskParity,
}

impl OptimizationMethod {
    pub fn key(self) -> &'static str {
        match self {
            OptimizationMethod::BehavioralMvo => "behavioral_mvo",
            OptimizationMethod::BlackLitterman => "black_litterman",
            OptimizationMethod::RiskParity => "risk_parity",
        }
    }
}

impl fmt::Display for OptimizationMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

impl FromStr for OptimizationMethod {
    type Err = BehavioralError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "behavioral_mvo" => Ok(OptimizationMethod::BehavioralMvo),
            "black_litterman" => Ok(OptimizationMethod::BlackLitterman),
            "risk_parity" => Ok(OptimizationMethod::RiskParity),
            other => Err(BehavioralError::invalid_method(other)),
        }
    }
}

/// Outcome of a single optimization call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizationResult {
    /// One weight per asset, in input order, summing to 1.
    pub weights: Vec<f64>,
    /// Expected portfolio return. `None` for methods without a return input.
    pub expected_return: Option<f64>,
    /// Portfolio volatility under the unadjusted covariance.
    pub expected_volatility: f64,
    /// Return over volatility. `None` when no return is reported.
    pub sharpe_ratio: Option<f64>,
    /// Method that produced the weights.
    pub method: OptimizationMethod,
    /// Behavioral parameters and diagnostics applied during the solve.
    pub behavioral_adjustments: ContextMap,
    /// Whether the solver met its tolerances within the iteration cap.
    pub converged: bool,
    /// Solver iterations used.
    pub iterations: usize,
}

impl OptimizationResult {
    /// Sum of the weight vector.
    pub fn weight_sum(&self) -> f64 {
        self.weights.iter().sum()
    }
}

/// Behavioral event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BiasKind {
    DispositionEffect,
    LossAversion,
    Overconfidence,
    RecencyBias,
    HerdingBehavior,
    ConfirmationBias,
    AnchoringBias,
    RegretAversion,
    PanicSelling,
    FomoBuying,
}

impl BiasKind {
    /// The eight biases scored from a trade ledger, in scoring order.
    pub const LEDGER_BIASES: [BiasKind; 8] = [
        BiasKind::DispositionEffect,
        BiasKind::LossAversion,
        BiasKind::Overconfidence,
        BiasKind::RecencyBias,
        BiasKind::HerdingBehavior,
        BiasKind::ConfirmationBias,
        BiasKind::AnchoringBias,
        BiasKind::RegretAversion,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            BiasKind::DispositionEffect => "disposition_effect",
            BiasKind::LossAversion => "loss_aversion",
            BiasKind::Overconfidence => "overconfidence",
            BiasKind::RecencyBias => "recency_bias",
            BiasKind::HerdingBehavior => "herding_behavior",
            BiasKind::ConfirmationBias => "confirmation_bias",
            BiasKind::AnchoringBias => "anchoring_bias",
            BiasKind::RegretAversion => "regret_aversion",
            BiasKind::PanicSelling => "panic_selling",
            BiasKind::FomoBuying => "fomo_buying",
        }
    }
}

impl fmt::Display for BiasKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bias intensity scores, each in [0, 1].
///
/// `overall_score` is the arithmetic mean of the eight components.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BiasScoreVector {
    pub disposition_effect: f64,
    pub loss_aversion: f64,
    pub overconfidence: f64,
    pub recency_bias: f64,
    pub herding_behavior: f64,
    pub confirmation_bias: f64,
    pub anchoring_bias: f64,
    pub regret_aversion: f64,
    pub overall_score: f64,
}

impl BiasScoreVector {
    /// Build from scores ordered as [`BiasKind::LEDGER_BIASES`].
    ///
    /// Each component is clamped to [0, 1] before the mean is taken.
    pub fn from_components(scores: [f64; 8]) -> Self {
        let s = scores.map(clamp_unit);
        let overall_score = s.iter().sum::<f64>() / s.len() as f64;
        Self {
            disposition_effect: s[0],
            loss_aversion: s[1],
            overconfidence: s[2],
            recency_bias: s[3],
            herding_behavior: s[4],
            confirmation_bias: s[5],
            anchoring_bias: s[6],
            regret_aversion: s[7],
            overall_score,
        }
    }

    /// Scores in [`BiasKind::LEDGER_BIASES`] order.
    pub fn components(&self) -> [f64; 8] {
        [
            self.disposition_effect,
            self.loss_aversion,
            self.overconfidence,
            self.recency_bias,
            self.herding_behavior,
            self.confirmation_bias,
            self.anchoring_bias,
            self.regret_aversion,
        ]
    }

    /// Score for a ledger bias; `None` for the real-time-only kinds.
    pub fn get(&self, kind: BiasKind) -> Option<f64> {
        BiasKind::LEDGER_BIASES
            .iter()
            .position(|k| *k == kind)
            .map(|i| self.components()[i])
    }
}

/// A detected behavioral event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BehavioralEvent {
    pub event_type: BiasKind,
    /// Intensity in [0, 1].
    pub severity: f64,
    pub timestamp: Timestamp,
    /// Raw quantities supporting the detection.
    pub context: ContextMap,
}

impl BehavioralEvent {
    pub fn new(event_type: BiasKind, severity: f64, timestamp: Timestamp, context: ContextMap) -> Self {
        Self {
            event_type,
            severity: clamp_unit(severity),
            timestamp,
            context,
        }
    }
}

/// Live market conditions at the moment of a trade.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct MarketContext {
    /// Broad market decline in percent (positive = down).
    pub market_down_percent: f64,
    /// Broad market rise in percent.
    pub market_up_percent: f64,
    /// News sentiment in [-1, 1].
    pub sentiment_score: f64,
    /// Market trading volume.
    pub trading_volume: f64,
}

/// A trade about to be executed, as seen by the real-time monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveTrade {
    pub symbol: String,
    pub action: TradeAction,
    /// Recent price change of the instrument in percent.
    pub last_price_change: f64,
}

impl LiveTrade {
    pub fn new(symbol: impl Into<String>, action: TradeAction, last_price_change: f64) -> Self {
        Self {
            symbol: symbol.into(),
            action,
            last_price_change,
        }
    }
}

#[inline]
pub(crate) fn clamp_unit(value: f64) -> f64 {
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}
