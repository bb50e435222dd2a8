//! Drawdown analysis over a compounded growth curve.
//!
//! Drawdowns are signed fractions: 0 at a running peak, negative below it.

use serde::{Deserialize, Serialize};

/// Compound per-period returns into a growth curve, `Π(1 + r)` up to each period.
///
/// The curve starts at the first period, not at the initial unit of capital.
pub fn growth_curve(returns: &[f64]) -> Vec<f64> {
    returns
        .iter()
        .scan(1.0, |acc, &r| {
            *acc *= 1.0 + r;
            Some(*acc)
        })
        .collect()
}

/// Drawdown at each point relative to the running maximum.
pub fn drawdown_curve(curve: &[f64]) -> Vec<f64> {
    let mut peak = f64::NEG_INFINITY;
    curve
        .iter()
        .map(|&value| {
            peak = peak.max(value);
            drawdown_from_peak(peak, value)
        })
        .collect()
}

/// Deepest drawdown of the curve (≤ 0); 0 for an empty curve.
pub fn max_drawdown(curve: &[f64]) -> f64 {
    drawdown_curve(curve).into_iter().fold(0.0, f64::min)
}

#[inline]
fn drawdown_from_peak(peak: f64, value: f64) -> f64 {
    if peak > 0.0 {
        (value - peak) / peak
    } else {
        // Capital wiped out before any peak above zero
        -1.0
    }
}

/// One stretch spent below a previous peak.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DrawdownPeriod {
    /// Index of the peak the period started from.
    pub start: usize,
    /// Index of the deepest point.
    pub trough: usize,
    /// Last index below the peak.
    pub end: usize,
    /// Drawdown at the trough (≤ 0).
    pub depth: f64,
    /// Whether the curve climbed back above the peak.
    pub recovered: bool,
}

impl DrawdownPeriod {
    /// Periods from peak to the last point under water.
    #[inline]
    pub fn duration(&self) -> usize {
        self.end - self.start
    }
}

/// Split the curve into drawdown periods.
pub fn drawdown_periods(curve: &[f64]) -> Vec<DrawdownPeriod> {
    let n = curve.len();
    if n < 2 {
        return vec![];
    }

    let mut periods = Vec::new();
    let mut peak = curve[0];
    let mut peak_idx = 0;
    let mut current: Option<DrawdownPeriod> = None;

    for (i, &value) in curve.iter().enumerate().skip(1) {
        if value > peak {
            if let Some(mut period) = current.take() {
                period.recovered = true;
                periods.push(period);
            }
            peak = value;
            peak_idx = i;
            continue;
        }

        let dd = drawdown_from_peak(peak, value);
        if dd >= 0.0 {
            continue;
        }
        let period = current.get_or_insert(DrawdownPeriod {
            start: peak_idx,
            trough: i,
            end: i,
            depth: dd,
            recovered: false,
        });
        period.end = i;
        if dd < period.depth {
            period.depth = dd;
            period.trough = i;
        }
    }

    if let Some(period) = current {
        periods.push(period);
    }
    periods
}
