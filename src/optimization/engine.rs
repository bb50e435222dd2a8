//! Behavioral portfolio optimization engine.

use std::sync::Arc;

use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::guardrails::{normalize, POSITION_THRESHOLD};
use super::metrics::{dot, mat_vec, quadratic_form, validate_square, volatility};
use super::prospect::ProspectTheoryTransform;
use super::solver::{AugmentedLagrangianSolver, ConstrainedOptimizer, Constraint, SolverOutcome};
use crate::core::config::SolverConfig;
use crate::core::error::{BehavioralError, Result};
use crate::core::types::{
    ContextMap, OptimizationConstraints, OptimizationMethod, OptimizationResult,
    UserBehavioralProfile,
};

/// Objective value returned when risk parity sees an all-zero allocation.
const DEGENERATE_OBJECTIVE: f64 = 1e10;

/// Solves allocation problems under a behavioral profile.
///
/// The engine holds a profile snapshot and a solver; it keeps no state
/// between calls and can be shared across threads.
#[derive(Clone)]
pub struct PortfolioOptimizationEngine {
    profile: UserBehavioralProfile,
    solver: Arc<dyn ConstrainedOptimizer>,
}

impl std::fmt::Debug for PortfolioOptimizationEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PortfolioOptimizationEngine")
            .field("profile", &self.profile)
            .finish_non_exhaustive()
    }
}

impl PortfolioOptimizationEngine {
    /// Create an engine with the default solver.
    pub fn new(profile: UserBehavioralProfile) -> Self {
        Self {
            profile,
            solver: Arc::new(AugmentedLagrangianSolver::default()),
        }
    }

    /// Use the default solver with custom settings.
    pub fn with_solver_config(mut self, config: SolverConfig) -> Self {
        self.solver = Arc::new(AugmentedLagrangianSolver::new(config));
        self
    }

    /// Substitute the solver backend.
    pub fn with_solver(mut self, solver: Arc<dyn ConstrainedOptimizer>) -> Self {
        self.solver = solver;
        self
    }

    pub fn profile(&self) -> &UserBehavioralProfile {
        &self.profile
    }

    /// Optimize an allocation.
    ///
    /// # Arguments
    /// * `expected_returns` - Expected (or market-implied) return per asset
    /// * `covariance` - Symmetric `n × n` covariance matrix
    /// * `constraints` - Weight bounds and position count; repaired for `n`
    /// * `method` - Allocation method
    ///
    /// # Errors
    /// `InvalidInput` for empty or non-finite inputs, inverted bounds, or a
    /// covariance that is not `n × n`.
    pub fn optimize(
        &self,
        expected_returns: &[f64],
        covariance: &[Vec<f64>],
        constraints: &OptimizationConstraints,
        method: OptimizationMethod,
    ) -> Result<OptimizationResult> {
        let n = expected_returns.len();
        validate_inputs(expected_returns, covariance)?;
        let constraints = self.prepare_constraints(constraints, n)?;

        debug!(%method, n_assets = n, "optimizing portfolio");

        let result = match method {
            OptimizationMethod::BehavioralMvo => {
                self.behavioral_mean_variance(expected_returns, covariance, &constraints)
            }
            OptimizationMethod::BlackLitterman => {
                self.black_litterman(expected_returns, covariance, &constraints)
            }
            OptimizationMethod::RiskParity => self.risk_parity(covariance, &constraints),
        };

        if !result.converged {
            warn!(
                %method,
                iterations = result.iterations,
                "solver did not converge; returning best iterate"
            );
        }
        info!(
            %method,
            expected_volatility = result.expected_volatility,
            converged = result.converged,
            "portfolio optimized"
        );
        Ok(result)
    }

    /// Optimize using a method key such as `"black_litterman"`.
    ///
    /// # Errors
    /// `InvalidMethod` for an unknown key, otherwise as [`Self::optimize`].
    pub fn optimize_with_key(
        &self,
        expected_returns: &[f64],
        covariance: &[Vec<f64>],
        constraints: &OptimizationConstraints,
        method: &str,
    ) -> Result<OptimizationResult> {
        let method: OptimizationMethod = method.parse()?;
        self.optimize(expected_returns, covariance, constraints, method)
    }

    fn prepare_constraints(
        &self,
        constraints: &OptimizationConstraints,
        n: usize,
    ) -> Result<OptimizationConstraints> {
        if !(constraints.min_weight.is_finite() && constraints.max_weight.is_finite()) {
            return Err(BehavioralError::invalid_input("weight bounds must be finite"));
        }
        let repaired = constraints.repaired(n);
        if repaired != *constraints {
            warn!(
                n_assets = n,
                max_weight = repaired.max_weight,
                min_positions = repaired.min_positions,
                "repaired infeasible constraints"
            );
        }
        if repaired.min_weight > repaired.max_weight {
            return Err(BehavioralError::invalid_input(format!(
                "min_weight {} exceeds max_weight {}",
                repaired.min_weight, repaired.max_weight
            )));
        }
        Ok(repaired)
    }

    /// Prospect-theory mean-variance.
    fn behavioral_mean_variance(
        &self,
        expected_returns: &[f64],
        covariance: &[Vec<f64>],
        constraints: &OptimizationConstraints,
    ) -> OptimizationResult {
        let n = expected_returns.len();
        let loss_aversion = self.profile.loss_aversion_coefficient;
        let transform = ProspectTheoryTransform::new(loss_aversion);

        let adjusted_returns = transform.adjust_returns_to_mean(expected_returns);
        let adjusted_cov = transform.perceived_covariance(covariance);

        let objective = |w: &[f64]| {
            let portfolio_return = dot(w, &adjusted_returns);
            let portfolio_variance = quadratic_form(&adjusted_cov, w);
            let utility = if portfolio_return < 0.0 {
                -loss_aversion * portfolio_return.abs()
            } else {
                portfolio_return
            };
            -utility + 0.5 * portfolio_variance
        };

        // Continuous stand-in for a position count; `- min + 1` leaves one
        // position of slack.
        let min_positions = constraints.min_positions as f64;
        let general = vec![
            budget_constraint(),
            Constraint::inequality(move |w: &[f64]| {
                let held = w.iter().filter(|&&x| x > POSITION_THRESHOLD).count() as f64;
                held - min_positions + 1.0
            }),
        ];

        let outcome = self.solve(&objective, constraints, &general, n);
        let weights = finalize_weights(&outcome.x);

        let expected_return = dot(&weights, expected_returns);
        let expected_volatility = volatility(covariance, &weights);

        let mut adjustments = ContextMap::new();
        adjustments.insert("loss_aversion_coefficient".into(), json!(loss_aversion));
        adjustments.insert("adjusted_returns_applied".into(), Value::Bool(true));
        adjustments.insert("risk_perception_adjusted".into(), Value::Bool(true));
        adjustments.insert("variance_scale".into(), json!(transform.variance_scale()));
        insert_solver_diagnostics(&mut adjustments, &outcome);

        OptimizationResult {
            weights,
            expected_return: Some(expected_return),
            expected_volatility,
            sharpe_ratio: Some(sharpe(expected_return, expected_volatility)),
            method: OptimizationMethod::BehavioralMvo,
            behavioral_adjustments: adjustments,
            converged: outcome.converged,
            iterations: outcome.iterations,
        }
    }

    /// Black-Litterman with loss-aversion-scaled risk aversion and
    /// overconfidence-discounted views.
    fn black_litterman(
        &self,
        implied_returns: &[f64],
        covariance: &[Vec<f64>],
        constraints: &OptimizationConstraints,
    ) -> OptimizationResult {
        let n = implied_returns.len();
        let risk_aversion = 2.5 / (1.0 + self.profile.loss_aversion_coefficient * 0.5);

        let market_weights = vec![1.0 / n as f64; n];
        let equilibrium: Vec<f64> = mat_vec(covariance, &market_weights)
            .into_iter()
            .map(|v| risk_aversion * v)
            .collect();

        let confidence = 0.5 / (1.0 + self.profile.overconfidence_score);
        let blended: Vec<f64> = equilibrium
            .iter()
            .zip(implied_returns.iter())
            .map(|(eq, view)| eq + confidence * (view - eq))
            .collect();

        let objective = |w: &[f64]| -dot(w, &blended) + 0.5 * risk_aversion * quadratic_form(covariance, w);

        let general = vec![budget_constraint()];
        let outcome = self.solve(&objective, constraints, &general, n);
        let weights = finalize_weights(&outcome.x);

        let expected_return = dot(&weights, implied_returns);
        let expected_volatility = volatility(covariance, &weights);

        let mut adjustments = ContextMap::new();
        adjustments.insert("risk_aversion".into(), json!(risk_aversion));
        adjustments.insert("confidence_in_views".into(), json!(confidence));
        adjustments.insert("blended_returns".into(), json!(blended));
        insert_solver_diagnostics(&mut adjustments, &outcome);

        OptimizationResult {
            weights,
            expected_return: Some(expected_return),
            expected_volatility,
            sharpe_ratio: Some(sharpe(expected_return, expected_volatility)),
            method: OptimizationMethod::BlackLitterman,
            behavioral_adjustments: adjustments,
            converged: outcome.converged,
            iterations: outcome.iterations,
        }
    }

    /// Equal risk contribution. No return input, so no return is reported.
    fn risk_parity(
        &self,
        covariance: &[Vec<f64>],
        constraints: &OptimizationConstraints,
    ) -> OptimizationResult {
        let n = covariance.len();

        let objective = |w: &[f64]| {
            let mut clipped: Vec<f64> = w.iter().map(|&x| x.max(0.0)).collect();
            let total: f64 = clipped.iter().sum();
            if total == 0.0 {
                return DEGENERATE_OBJECTIVE;
            }
            clipped.iter_mut().for_each(|x| *x /= total);

            let contributions = risk_contributions(covariance, &clipped);
            let target = contributions.iter().sum::<f64>() / n as f64;
            contributions.iter().map(|rc| (rc - target).powi(2)).sum()
        };

        let general = vec![budget_constraint()];
        let outcome = self.solve(&objective, constraints, &general, n);
        let weights = finalize_weights(&outcome.x);
        let expected_volatility = volatility(covariance, &weights);

        let mut adjustments = ContextMap::new();
        adjustments.insert("risk_contribution_equal".into(), Value::Bool(true));
        adjustments.insert(
            "risk_contributions".into(),
            json!(risk_contributions(covariance, &weights)),
        );
        insert_solver_diagnostics(&mut adjustments, &outcome);

        OptimizationResult {
            weights,
            expected_return: None,
            expected_volatility,
            sharpe_ratio: None,
            method: OptimizationMethod::RiskParity,
            behavioral_adjustments: adjustments,
            converged: outcome.converged,
            iterations: outcome.iterations,
        }
    }

    fn solve(
        &self,
        objective: &dyn Fn(&[f64]) -> f64,
        constraints: &OptimizationConstraints,
        general: &[Constraint<'_>],
        n: usize,
    ) -> SolverOutcome {
        let bounds = vec![(constraints.min_weight, constraints.max_weight); n];
        let x0 = vec![1.0 / n as f64; n];
        self.solver.minimize(objective, &bounds, general, &x0)
    }
}

/// Per-asset risk contribution `w_i (Σw)_i`.
pub fn risk_contributions(covariance: &[Vec<f64>], weights: &[f64]) -> Vec<f64> {
    mat_vec(covariance, weights)
        .iter()
        .zip(weights.iter())
        .map(|(marginal, w)| w * marginal)
        .collect()
}

/// Optimize with a fresh engine for `profile`.
pub fn optimize(
    expected_returns: &[f64],
    covariance: &[Vec<f64>],
    constraints: &OptimizationConstraints,
    method: OptimizationMethod,
    profile: &UserBehavioralProfile,
) -> Result<OptimizationResult> {
    PortfolioOptimizationEngine::new(profile.clone()).optimize(
        expected_returns,
        covariance,
        constraints,
        method,
    )
}

/// Fully invested; enforced by projection in the default solver.
fn budget_constraint<'a>() -> Constraint<'a> {
    Constraint::budget(1.0)
}

/// Clip negatives and renormalize. This may lift a weight above the
/// requested `max_weight`.
fn finalize_weights(raw: &[f64]) -> Vec<f64> {
    let mut weights = raw.to_vec();
    normalize(&mut weights);
    weights
}

#[inline]
fn sharpe(expected_return: f64, volatility: f64) -> f64 {
    if volatility > 0.0 {
        expected_return / volatility
    } else {
        0.0
    }
}

fn insert_solver_diagnostics(adjustments: &mut ContextMap, outcome: &SolverOutcome) {
    adjustments.insert("converged".into(), Value::Bool(outcome.converged));
    adjustments.insert("iterations".into(), json!(outcome.iterations));
    adjustments.insert("max_constraint_violation".into(), json!(outcome.max_violation));
}

fn validate_inputs(expected_returns: &[f64], covariance: &[Vec<f64>]) -> Result<()> {
    let n = expected_returns.len();
    if n == 0 {
        return Err(BehavioralError::invalid_input("no assets to optimize"));
    }
    validate_square(covariance, n)?;
    let finite = expected_returns.iter().all(|r| r.is_finite())
        && covariance.iter().flatten().all(|c| c.is_finite());
    if !finite {
        return Err(BehavioralError::invalid_input(
            "returns and covariance must be finite",
        ));
    }
    Ok(())
}
