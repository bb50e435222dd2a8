//! Post-solve behavioral guardrails.
//!
//! Keeps an allocation psychologically sustainable: overconfident investors
//! get a tighter concentration cap, and a thinly spread book is topped up to
//! the requested number of positions.

use crate::core::types::{OptimizationConstraints, UserBehavioralProfile};

/// Weight above which a position counts as held.
pub const POSITION_THRESHOLD: f64 = 0.01;

/// Floor given to positions added to meet `min_positions`.
pub const DIVERSIFICATION_FLOOR: f64 = 0.05;

/// Apply concentration and diversification guardrails, then renormalize.
///
/// The returned weights sum to 1; if every weight is zero the uniform
/// allocation is returned.
pub fn apply_behavioral_guardrails(
    weights: &[f64],
    constraints: &OptimizationConstraints,
    profile: &UserBehavioralProfile,
) -> Vec<f64> {
    let n = weights.len();
    if n == 0 {
        return vec![];
    }

    let cap = constraints.max_weight / (1.0 + profile.overconfidence_score * 0.5);
    let mut adjusted: Vec<f64> = weights.iter().map(|&w| w.max(0.0).min(cap)).collect();

    let held = adjusted.iter().filter(|&&w| w > POSITION_THRESHOLD).count();
    if held < constraints.min_positions {
        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| {
            adjusted[b]
                .partial_cmp(&adjusted[a])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        for &i in order.iter().take(constraints.min_positions.min(n)) {
            adjusted[i] = adjusted[i].max(DIVERSIFICATION_FLOOR);
        }
    }

    normalize(&mut adjusted);
    adjusted
}

/// Clip negatives and scale to sum to 1, falling back to uniform weights.
pub fn normalize(weights: &mut [f64]) {
    let n = weights.len();
    if n == 0 {
        return;
    }
    for w in weights.iter_mut() {
        if !w.is_finite() || *w < 0.0 {
            *w = 0.0;
        }
    }
    let total: f64 = weights.iter().sum();
    if total > 0.0 {
        for w in weights.iter_mut() {
            *w /= total;
        }
    } else {
        let uniform = 1.0 / n as f64;
        for w in weights.iter_mut() {
            *w = uniform;
        }
    }
}
