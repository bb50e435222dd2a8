//! Constrained nonlinear minimization.
//!
//! The allocation methods only see the [`ConstrainedOptimizer`] trait, so the
//! backend can be swapped without touching them. The bundled backend is an
//! augmented Lagrangian method. Box bounds and a budget constraint
//! (`Σx = total`) are enforced exactly by projecting onto their intersection.
//! Other constraints go through multipliers and a quadratic penalty. Each
//! subproblem is solved by a spectral projected gradient (SPG) iteration with
//! a non-monotone line search.

use std::collections::VecDeque;

use tracing::debug;

use crate::core::config::SolverConfig;

/// Constraint type. Inequalities are satisfied when `fun(x) >= 0`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConstraintKind {
    Equality,
    Inequality,
}

/// A general (non-box) constraint on the decision vector.
pub struct Constraint<'a> {
    pub kind: ConstraintKind,
    budget: Option<f64>,
    fun: Box<dyn Fn(&[f64]) -> f64 + Send + Sync + 'a>,
}

impl<'a> Constraint<'a> {
    /// `fun(x) == 0`.
    pub fn equality(fun: impl Fn(&[f64]) -> f64 + Send + Sync + 'a) -> Self {
        Self {
            kind: ConstraintKind::Equality,
            budget: None,
            fun: Box::new(fun),
        }
    }

    /// `fun(x) >= 0`.
    pub fn inequality(fun: impl Fn(&[f64]) -> f64 + Send + Sync + 'a) -> Self {
        Self {
            kind: ConstraintKind::Inequality,
            budget: None,
            fun: Box::new(fun),
        }
    }

    /// `Σx == total`. Solvers that recognize it may enforce it by projection.
    pub fn budget(total: f64) -> Self {
        Self {
            kind: ConstraintKind::Equality,
            budget: Some(total),
            fun: Box::new(move |x: &[f64]| x.iter().sum::<f64>() - total),
        }
    }

    /// Budget total when this is a budget constraint.
    pub fn budget_total(&self) -> Option<f64> {
        self.budget
    }

    #[inline]
    pub fn eval(&self, x: &[f64]) -> f64 {
        (self.fun)(x)
    }

    /// Amount by which `x` violates this constraint (0 when satisfied).
    pub fn violation(&self, x: &[f64]) -> f64 {
        let v = self.eval(x);
        match self.kind {
            ConstraintKind::Equality => v.abs(),
            ConstraintKind::Inequality => (-v).max(0.0),
        }
    }
}

/// Result of a minimization.
#[derive(Debug, Clone)]
pub struct SolverOutcome {
    /// Best iterate found.
    pub x: Vec<f64>,
    /// Objective at `x`.
    pub objective: f64,
    /// Largest constraint violation at `x`.
    pub max_violation: f64,
    /// Whether stationarity and feasibility tolerances were met.
    pub converged: bool,
    /// Inner iterations consumed.
    pub iterations: usize,
}

/// Constrained local optimizer capability.
pub trait ConstrainedOptimizer: Send + Sync {
    /// Minimize `objective` subject to `bounds` (per coordinate, inclusive)
    /// and `constraints`, starting from `x0`.
    ///
    /// Never fails: when the iteration cap is hit the best iterate is
    /// returned with `converged == false`.
    fn minimize(
        &self,
        objective: &dyn Fn(&[f64]) -> f64,
        bounds: &[(f64, f64)],
        constraints: &[Constraint<'_>],
        x0: &[f64],
    ) -> SolverOutcome;
}

const MAX_OUTER_ITERATIONS: usize = 50;
const INITIAL_PENALTY: f64 = 10.0;
const MAX_PENALTY: f64 = 1e8;
const NONMONOTONE_MEMORY: usize = 10;
const ARMIJO_GAMMA: f64 = 1e-4;
const STEP_MIN: f64 = 1e-10;
const STEP_MAX: f64 = 1e10;

/// Augmented Lagrangian solver with an SPG inner loop.
#[derive(Debug, Clone, Default)]
pub struct AugmentedLagrangianSolver {
    config: SolverConfig,
}

impl AugmentedLagrangianSolver {
    pub fn new(config: SolverConfig) -> Self {
        Self { config }
    }

    /// Set the iteration cap.
    pub fn with_max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.max_iterations = max_iterations.max(1);
        self
    }

    pub fn config(&self) -> &SolverConfig {
        &self.config
    }
}

impl ConstrainedOptimizer for AugmentedLagrangianSolver {
    fn minimize(
        &self,
        objective: &dyn Fn(&[f64]) -> f64,
        bounds: &[(f64, f64)],
        constraints: &[Constraint<'_>],
        x0: &[f64],
    ) -> SolverOutcome {
        let budget = self.config.max_iterations;
        let feas_tol = self.config.feasibility_tolerance;

        let feasible = FeasibleSet {
            bounds,
            budget: constraints.iter().find_map(Constraint::budget_total),
        };
        let general: Vec<&Constraint<'_>> =
            constraints.iter().filter(|c| c.budget.is_none()).collect();

        let mut x = feasible.project(x0);
        let mut multipliers = vec![0.0; general.len()];
        let mut penalty = INITIAL_PENALTY;
        let mut iterations = 0;
        let mut converged = false;
        let mut prev_violation = f64::INFINITY;

        let mut best = Candidate::evaluate(&x, objective, constraints);

        for _ in 0..MAX_OUTER_ITERATIONS {
            let lagrangian = |z: &[f64]| {
                let mut value = objective(z);
                for (c, &m) in general.iter().zip(multipliers.iter()) {
                    value += augmented_term(c.kind, c.eval(z), m, penalty);
                }
                value
            };

            let inner = spg(
                &lagrangian,
                &feasible,
                &x,
                budget.saturating_sub(iterations),
                self.config.tolerance,
            );
            iterations += inner.iterations;
            x = inner.x;

            let candidate = Candidate::evaluate(&x, objective, constraints);
            let violation = candidate.violation;
            if candidate.is_better_than(&best, feas_tol) {
                best = candidate;
            }

            if violation <= feas_tol && inner.stationary {
                converged = true;
                break;
            }
            if iterations >= budget {
                break;
            }

            for (c, m) in general.iter().zip(multipliers.iter_mut()) {
                let value = c.eval(&x);
                *m = match c.kind {
                    ConstraintKind::Equality => *m + penalty * value,
                    ConstraintKind::Inequality => (*m - penalty * value).max(0.0),
                };
            }
            if violation > 0.25 * prev_violation {
                penalty = (penalty * 10.0).min(MAX_PENALTY);
            }
            prev_violation = violation;
        }

        debug!(
            iterations,
            converged,
            objective = best.objective,
            max_violation = best.violation,
            "constrained minimization finished"
        );

        SolverOutcome {
            x: best.x,
            objective: best.objective,
            max_violation: best.violation,
            converged,
            iterations,
        }
    }
}

/// Iterate bookkeeping for best-point selection.
struct Candidate {
    x: Vec<f64>,
    objective: f64,
    violation: f64,
}

impl Candidate {
    fn evaluate(x: &[f64], objective: &dyn Fn(&[f64]) -> f64, constraints: &[Constraint<'_>]) -> Self {
        let violation = constraints
            .iter()
            .map(|c| c.violation(x))
            .fold(0.0f64, f64::max);
        Self {
            x: x.to_vec(),
            objective: objective(x),
            violation,
        }
    }

    /// Feasible points beat infeasible ones; among feasible points the lower
    /// objective wins, otherwise the lower violation.
    fn is_better_than(&self, other: &Candidate, feas_tol: f64) -> bool {
        if !self.objective.is_finite() {
            return false;
        }
        let self_feasible = self.violation <= feas_tol;
        let other_feasible = other.violation <= feas_tol;
        match (self_feasible, other_feasible) {
            (true, true) => self.objective <= other.objective || !other.objective.is_finite(),
            (true, false) => true,
            (false, true) => false,
            (false, false) => self.violation < other.violation,
        }
    }
}

/// Powell-Hestenes-Rockafellar augmentation for one constraint.
#[inline]
fn augmented_term(kind: ConstraintKind, value: f64, multiplier: f64, penalty: f64) -> f64 {
    match kind {
        ConstraintKind::Equality => multiplier * value + 0.5 * penalty * value * value,
        ConstraintKind::Inequality => {
            if multiplier - penalty * value > 0.0 {
                -multiplier * value + 0.5 * penalty * value * value
            } else {
                -multiplier * multiplier / (2.0 * penalty)
            }
        }
    }
}

struct InnerResult {
    x: Vec<f64>,
    iterations: usize,
    stationary: bool,
}

/// Spectral projected gradient on a box.
fn spg(
    f: &dyn Fn(&[f64]) -> f64,
    feasible: &FeasibleSet<'_>,
    x0: &[f64],
    max_iterations: usize,
    tolerance: f64,
) -> InnerResult {
    let n = x0.len();
    let mut x = feasible.project(x0);
    let mut fx = f(&x);
    let mut g = gradient(f, &x);
    let mut history: VecDeque<f64> = VecDeque::with_capacity(NONMONOTONE_MEMORY);
    history.push_back(fx);

    let mut alpha = {
        let pg = feasible.projected_gradient_norm(&x, &g);
        if pg > 0.0 {
            (1.0 / pg).clamp(STEP_MIN, STEP_MAX)
        } else {
            1.0
        }
    };

    for k in 0..max_iterations {
        if feasible.projected_gradient_norm(&x, &g) <= tolerance {
            return InnerResult {
                x,
                iterations: k,
                stationary: true,
            };
        }

        let trial: Vec<f64> = x.iter().zip(g.iter()).map(|(xi, gi)| xi - alpha * gi).collect();
        let d: Vec<f64> = feasible
            .project(&trial)
            .iter()
            .zip(x.iter())
            .map(|(p, xi)| p - xi)
            .collect();
        let gtd: f64 = g.iter().zip(d.iter()).map(|(a, b)| a * b).sum();
        let f_ref = history.iter().cloned().fold(f64::NEG_INFINITY, f64::max);

        // Non-monotone backtracking with safeguarded quadratic interpolation
        let mut lambda = 1.0;
        let (x_new, f_new) = loop {
            let candidate: Vec<f64> = x.iter().zip(d.iter()).map(|(xi, di)| xi + lambda * di).collect();
            let f_candidate = f(&candidate);
            if f_candidate.is_finite() && f_candidate <= f_ref + ARMIJO_GAMMA * lambda * gtd {
                break (candidate, f_candidate);
            }
            if lambda < 1e-12 {
                // Stalled at numerical precision
                return InnerResult {
                    x,
                    iterations: k + 1,
                    stationary: true,
                };
            }
            let denom = f_candidate - fx - lambda * gtd;
            let lambda_q = if denom > 0.0 && f_candidate.is_finite() {
                -0.5 * lambda * lambda * gtd / denom
            } else {
                lambda / 2.0
            };
            lambda = if lambda_q >= 0.1 * lambda && lambda_q <= 0.9 * lambda {
                lambda_q
            } else {
                lambda / 2.0
            };
        };

        let g_new = gradient(f, &x_new);
        let mut sts = 0.0;
        let mut sty = 0.0;
        for i in 0..n {
            let s = x_new[i] - x[i];
            let y = g_new[i] - g[i];
            sts += s * s;
            sty += s * y;
        }
        alpha = if sty > 0.0 {
            (sts / sty).clamp(STEP_MIN, STEP_MAX)
        } else {
            STEP_MAX
        };

        x = x_new;
        fx = f_new;
        g = g_new;
        if history.len() == NONMONOTONE_MEMORY {
            history.pop_front();
        }
        history.push_back(fx);

        if sts.sqrt() < 1e-15 {
            return InnerResult {
                x,
                iterations: k + 1,
                stationary: true,
            };
        }
    }

    let stationary = feasible.projected_gradient_norm(&x, &g) <= tolerance;
    InnerResult {
        x,
        iterations: max_iterations,
        stationary,
    }
}

/// Clamp each coordinate into its bounds.
///
/// Uses `max`/`min` rather than `clamp` so inverted bounds cannot panic.
pub(crate) fn project(x: &[f64], bounds: &[(f64, f64)]) -> Vec<f64> {
    x.iter()
        .enumerate()
        .map(|(i, &xi)| match bounds.get(i) {
            Some(&(lo, hi)) => xi.max(lo).min(hi),
            None => xi,
        })
        .collect()
}

/// Box bounds, optionally intersected with the hyperplane `Σx = budget`.
struct FeasibleSet<'b> {
    bounds: &'b [(f64, f64)],
    budget: Option<f64>,
}

impl FeasibleSet<'_> {
    /// Euclidean projection onto the set.
    fn project(&self, x: &[f64]) -> Vec<f64> {
        match self.budget {
            Some(total) => project_capped_simplex(x, self.bounds, total),
            None => project(x, self.bounds),
        }
    }

    /// Infinity norm of `P(x - g) - x`.
    fn projected_gradient_norm(&self, x: &[f64], g: &[f64]) -> f64 {
        let trial: Vec<f64> = x.iter().zip(g.iter()).map(|(xi, gi)| xi - gi).collect();
        self.project(&trial)
            .iter()
            .zip(x.iter())
            .map(|(p, xi)| (p - xi).abs())
            .fold(0.0, f64::max)
    }
}

/// Effective interval for coordinate `i`, matching [`project`] on inverted bounds.
#[inline]
fn interval(bounds: &[(f64, f64)], i: usize) -> (f64, f64) {
    match bounds.get(i) {
        Some(&(lo, hi)) => (lo.min(hi), hi),
        None => (f64::NEG_INFINITY, f64::INFINITY),
    }
}

/// Projection onto `{x : lo ≤ x ≤ hi, Σx = total}`.
///
/// The projection is `clamp(y - τ)` for a scalar shift `τ`. The clamped sum is
/// piecewise linear and non-increasing in `τ` with kinks at `y_i - hi_i` and
/// `y_i - lo_i`, so the segment holding the root is found by binary search
/// over the kinks and `τ` is then solved for exactly. When the budget lies
/// outside `[Σlo, Σhi]` the nearest box corner is returned.
pub(crate) fn project_capped_simplex(y: &[f64], bounds: &[(f64, f64)], total: f64) -> Vec<f64> {
    let n = y.len();
    if n == 0 {
        return Vec::new();
    }
    let clamped = |i: usize, tau: f64| {
        let (lo, hi) = interval(bounds, i);
        (y[i] - tau).max(lo).min(hi)
    };
    let mass = |tau: f64| (0..n).map(|i| clamped(i, tau)).sum::<f64>();

    let mut kinks: Vec<f64> = (0..n)
        .flat_map(|i| {
            let (lo, hi) = interval(bounds, i);
            [y[i] - hi, y[i] - lo]
        })
        .filter(|k| k.is_finite())
        .collect();
    kinks.sort_by(f64::total_cmp);

    // mass(a) >= total > mass(b)
    let split = kinks.partition_point(|&k| mass(k) >= total);
    let a = if split > 0 { kinks[split - 1] } else { f64::NEG_INFINITY };
    let b = kinks.get(split).copied().unwrap_or(f64::INFINITY);
    let probe = match (a.is_finite(), b.is_finite()) {
        (true, true) => 0.5 * (a + b),
        (true, false) => a + 1.0,
        (false, true) => b - 1.0,
        (false, false) => 0.0,
    };

    // Coordinates strictly inside their interval move with τ; the rest are pinned.
    let mut free_sum = 0.0;
    let mut free_count = 0usize;
    let mut pinned_sum = 0.0;
    for i in 0..n {
        let (lo, hi) = interval(bounds, i);
        let v = y[i] - probe;
        if v > lo && v < hi {
            free_sum += y[i];
            free_count += 1;
        } else {
            pinned_sum += clamped(i, probe);
        }
    }

    let tau = if free_count > 0 {
        (free_sum + pinned_sum - total) / free_count as f64
    } else {
        probe
    };
    (0..n).map(|i| clamped(i, tau)).collect()
}

/// Central-difference gradient.
fn gradient(f: &dyn Fn(&[f64]) -> f64, x: &[f64]) -> Vec<f64> {
    let mut probe = x.to_vec();
    let mut grad = vec![0.0; x.len()];
    for i in 0..x.len() {
        let h = 1e-6 * x[i].abs().max(1.0);
        let original = probe[i];
        probe[i] = original + h;
        let f_plus = f(&probe);
        probe[i] = original - h;
        let f_minus = f(&probe);
        probe[i] = original;
        grad[i] = (f_plus - f_minus) / (2.0 * h);
    }
    grad
}
