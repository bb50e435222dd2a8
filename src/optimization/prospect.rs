//! Prospect-theory value function and perceived-risk adjustment.

/// Curvature of the value function (Tversky & Kahneman, 1992).
pub const VALUE_EXPONENT: f64 = 0.88;

/// Share of excess loss aversion passed on to perceived variance.
pub const RISK_PERCEPTION_SCALE: f64 = 0.2;

/// Prospect-theory transform for a fixed loss-aversion coefficient.
#[derive(Debug, Clone, Copy)]
pub struct ProspectTheoryTransform {
    loss_aversion: f64,
}

impl ProspectTheoryTransform {
    pub fn new(loss_aversion: f64) -> Self {
        Self { loss_aversion }
    }

    #[inline]
    pub fn loss_aversion(&self) -> f64 {
        self.loss_aversion
    }

    /// Perceived value of return `r` relative to `reference`.
    ///
    /// Gains are compressed (`(r - p)^0.88 + p`); losses are compressed by
    /// the same curvature and then amplified by the loss-aversion
    /// coefficient (`-λ (p - r)^0.88 + p`).
    #[inline]
    pub fn value(&self, r: f64, reference: f64) -> f64 {
        if r >= reference {
            (r - reference).powf(VALUE_EXPONENT) + reference
        } else {
            -self.loss_aversion * (reference - r).powf(VALUE_EXPONENT) + reference
        }
    }

    /// Transform a return vector against an explicit reference point.
    pub fn adjust_returns(&self, returns: &[f64], reference: f64) -> Vec<f64> {
        returns.iter().map(|&r| self.value(r, reference)).collect()
    }

    /// Transform a return vector against its own mean.
    pub fn adjust_returns_to_mean(&self, returns: &[f64]) -> Vec<f64> {
        if returns.is_empty() {
            return vec![];
        }
        let mean = returns.iter().sum::<f64>() / returns.len() as f64;
        self.adjust_returns(returns, mean)
    }

    /// Multiplier applied to variances: `1 + (λ - 1) * 0.2`.
    #[inline]
    pub fn variance_scale(&self) -> f64 {
        1.0 + (self.loss_aversion - 1.0) * RISK_PERCEPTION_SCALE
    }

    /// Scale the covariance diagonal by [`Self::variance_scale`].
    ///
    /// Off-diagonal covariances are left unchanged, so the result is not
    /// guaranteed to stay positive semidefinite.
    pub fn perceived_covariance(&self, covariance: &[Vec<f64>]) -> Vec<Vec<f64>> {
        let scale = self.variance_scale();
        covariance
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let mut row = row.clone();
                if let Some(v) = row.get_mut(i) {
                    *v *= scale;
                }
                row
            })
            .collect()
    }
}
