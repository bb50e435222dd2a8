//! Integration tests for the portfolio optimization engine.

use std::sync::Arc;

use behavioral_core::core::types::{
    OptimizationConstraints, OptimizationMethod, OptimizationResult, UserBehavioralProfile,
};
use behavioral_core::optimize;
use behavioral_core::optimization::{
    apply_behavioral_guardrails, portfolio_metrics, risk_contributions, AugmentedLagrangianSolver,
    ConstrainedOptimizer, Constraint, PortfolioOptimizationEngine, SolverOutcome,
};
use behavioral_core::portfolio::{simulate_allocation_forward, MonteCarloConfig};
use proptest::prelude::*;

fn sample_covariance() -> Vec<Vec<f64>> {
    vec![
        vec![0.0400, 0.0120, 0.0080, 0.0050, 0.0030],
        vec![0.0120, 0.0625, 0.0150, 0.0070, 0.0040],
        vec![0.0080, 0.0150, 0.0900, 0.0100, 0.0060],
        vec![0.0050, 0.0070, 0.0100, 0.0225, 0.0020],
        vec![0.0030, 0.0040, 0.0060, 0.0020, 0.0100],
    ]
}

fn sample_returns() -> Vec<f64> {
    vec![0.09, 0.11, 0.14, 0.07, 0.04]
}

const METHODS: [OptimizationMethod; 3] = [
    OptimizationMethod::BehavioralMvo,
    OptimizationMethod::BlackLitterman,
    OptimizationMethod::RiskParity,
];

#[test]
fn test_every_method_produces_a_budget() {
    let profile = UserBehavioralProfile::default();
    for method in METHODS {
        let result = optimize(
            &sample_returns(),
            &sample_covariance(),
            &OptimizationConstraints::default(),
            method,
            &profile,
        )
        .unwrap();

        assert_eq!(result.method, method);
        assert_eq!(result.weights.len(), 5);
        assert!((result.weight_sum() - 1.0).abs() < 1e-6, "{method}: {:?}", result.weights);
        assert!(result.weights.iter().all(|&w| w >= 0.0));
        assert!(result.expected_volatility > 0.0);
        assert!(result.behavioral_adjustments.contains_key("converged"));
    }
}

fn optimize_sample(method: OptimizationMethod) -> OptimizationResult {
    optimize(
        &sample_returns(),
        &sample_covariance(),
        &OptimizationConstraints::default(),
        method,
        &UserBehavioralProfile::default(),
    )
    .unwrap()
}

fn largest_departure_from_uniform(weights: &[f64]) -> f64 {
    let uniform = 1.0 / weights.len() as f64;
    weights.iter().map(|w| (w - uniform).abs()).fold(0.0, f64::max)
}

#[test]
fn test_black_litterman_improves_on_uniform_start() {
    let result = optimize_sample(OptimizationMethod::BlackLitterman);

    assert!(result.converged, "{:?}", result.behavioral_adjustments);
    assert!(result.iterations < 1000);
    assert!(largest_departure_from_uniform(&result.weights) > 0.05, "{:?}", result.weights);
    for w in &result.weights {
        assert!(*w >= 0.01 - 1e-9 && *w <= 0.30 + 1e-9, "{:?}", result.weights);
    }

    let risk_aversion = result.behavioral_adjustments["risk_aversion"].as_f64().unwrap();
    let blended: Vec<f64> = result.behavioral_adjustments["blended_returns"]
        .as_array()
        .unwrap()
        .iter()
        .map(|v| v.as_f64().unwrap())
        .collect();
    let cov = sample_covariance();
    let objective = |w: &[f64]| {
        let ret: f64 = w.iter().zip(&blended).map(|(a, b)| a * b).sum();
        let var: f64 = (0..5)
            .flat_map(|i| (0..5).map(move |j| (i, j)))
            .map(|(i, j)| w[i] * w[j] * cov[i][j])
            .sum();
        -ret + 0.5 * risk_aversion * var
    };
    assert!(objective(&result.weights) < objective(&[0.2; 5]) - 1e-4);
}

#[test]
fn test_risk_parity_equalizes_unequal_variances() {
    // Uncorrelated assets: equal risk means weights proportional to 1 / sigma
    let vols = [0.20, 0.25, 0.30, 0.15, 0.18];
    let cov: Vec<Vec<f64>> = (0..5)
        .map(|i| (0..5).map(|j| if i == j { vols[i] * vols[i] } else { 0.0 }).collect())
        .collect();
    let result = optimize(
        &[0.0; 5],
        &cov,
        &OptimizationConstraints::default(),
        OptimizationMethod::RiskParity,
        &UserBehavioralProfile::default(),
    )
    .unwrap();

    assert!(result.converged, "{:?}", result.behavioral_adjustments);
    assert!(largest_departure_from_uniform(&result.weights) > 0.05);

    let inverse_total: f64 = vols.iter().map(|v| 1.0 / v).sum();
    for (w, v) in result.weights.iter().zip(vols.iter()) {
        assert!((w - 1.0 / v / inverse_total).abs() < 1e-4, "{:?}", result.weights);
    }

    let contributions = risk_contributions(&cov, &result.weights);
    let mean = contributions.iter().sum::<f64>() / 5.0;
    for rc in &contributions {
        assert!((rc - mean).abs() / mean < 1e-3, "{contributions:?}");
    }
}

#[test]
fn test_risk_parity_underweights_volatile_assets_in_sample() {
    let result = optimize_sample(OptimizationMethod::RiskParity);

    assert!(result.converged, "{:?}", result.behavioral_adjustments);
    assert!(largest_departure_from_uniform(&result.weights) > 0.05);
    // Variance 0.01 against 0.09
    assert!(result.weights[4] > result.weights[2], "{:?}", result.weights);
}

#[test]
fn test_min_positions_proxy_holds_one_short() {
    // One dominant return pulls everything into the first asset when uncapped
    let cov: Vec<Vec<f64>> = (0..5)
        .map(|i| (0..5).map(|j| if i == j { 0.01 } else { 0.0 }).collect())
        .collect();
    let constraints = OptimizationConstraints::new(0.0, 1.0, 4);
    let result = optimize(
        &[0.30, 0.02, 0.01, 0.01, 0.01],
        &cov,
        &constraints,
        OptimizationMethod::BehavioralMvo,
        &UserBehavioralProfile::default(),
    )
    .unwrap();

    let held = result.weights.iter().filter(|&&w| w > 0.01).count();
    assert!(held >= 3, "{:?}", result.weights);
    let largest = result.weights.iter().copied().fold(0.0, f64::max);
    assert_eq!(largest, result.weights[0]);
    assert!((result.weight_sum() - 1.0).abs() < 1e-9);
}

#[test]
fn test_risk_parity_never_reports_return() {
    let result = optimize(
        &sample_returns(),
        &sample_covariance(),
        &OptimizationConstraints::default(),
        OptimizationMethod::RiskParity,
        &UserBehavioralProfile::default(),
    )
    .unwrap();

    assert!(result.expected_return.is_none());
    assert!(result.sharpe_ratio.is_none());
    let contributions = result.behavioral_adjustments["risk_contributions"]
        .as_array()
        .unwrap();
    assert_eq!(contributions.len(), 5);
}

#[test]
fn test_infeasible_constraints_are_repaired() {
    // max_weight 0.3 with 2 assets cannot reach a full budget
    let constraints = OptimizationConstraints::new(0.01, 0.30, 5);
    let repaired = constraints.repaired(2);
    assert!(repaired.max_weight * 2.0 >= 1.0);
    assert_eq!(repaired.min_positions, 2);

    let cov = vec![vec![0.04, 0.01], vec![0.01, 0.09]];
    let result = optimize(
        &[0.08, 0.12],
        &cov,
        &constraints,
        OptimizationMethod::BehavioralMvo,
        &UserBehavioralProfile::default(),
    )
    .unwrap();
    assert!((result.weight_sum() - 1.0).abs() < 1e-6);
}

#[test]
fn test_renormalized_weights_may_exceed_max_weight() {
    // Weights are renormalized after the solve without re-applying the cap,
    // so the reported allocation is only approximately within max_weight.
    let result = optimize(
        &sample_returns(),
        &sample_covariance(),
        &OptimizationConstraints::default(),
        OptimizationMethod::BehavioralMvo,
        &UserBehavioralProfile::default(),
    )
    .unwrap();

    let largest = result.weights.iter().copied().fold(0.0, f64::max);
    assert!(largest <= 0.30 + 1e-3, "largest weight {largest}");
}

#[test]
fn test_loss_aversion_is_reported() {
    let profile = UserBehavioralProfile::default().with_loss_aversion(3.0);
    let engine = PortfolioOptimizationEngine::new(profile);
    let result = engine
        .optimize_with_key(
            &sample_returns(),
            &sample_covariance(),
            &OptimizationConstraints::default(),
            "behavioral_mvo",
        )
        .unwrap();

    assert_eq!(
        result.behavioral_adjustments["loss_aversion_coefficient"].as_f64(),
        Some(3.0)
    );
}

/// Returns the starting point untouched; exercises solver injection.
struct StartingPoint;

impl ConstrainedOptimizer for StartingPoint {
    fn minimize(
        &self,
        objective: &dyn Fn(&[f64]) -> f64,
        _bounds: &[(f64, f64)],
        _constraints: &[Constraint<'_>],
        x0: &[f64],
    ) -> SolverOutcome {
        SolverOutcome {
            x: x0.to_vec(),
            objective: objective(x0),
            max_violation: 0.0,
            converged: false,
            iterations: 0,
        }
    }
}

#[test]
fn test_injected_solver_is_used() {
    let engine = PortfolioOptimizationEngine::new(UserBehavioralProfile::default())
        .with_solver(Arc::new(StartingPoint));
    let result = engine
        .optimize(
            &sample_returns(),
            &sample_covariance(),
            &OptimizationConstraints::default(),
            OptimizationMethod::BlackLitterman,
        )
        .unwrap();

    assert!(!result.converged);
    assert_eq!(result.iterations, 0);
    for w in &result.weights {
        assert!((w - 0.2).abs() < 1e-12);
    }
}

#[test]
fn test_iteration_cap_is_flagged_not_fatal() {
    let solver = AugmentedLagrangianSolver::default().with_max_iterations(2);
    let engine = PortfolioOptimizationEngine::new(UserBehavioralProfile::default())
        .with_solver(Arc::new(solver));
    let result = engine
        .optimize(
            &sample_returns(),
            &sample_covariance(),
            &OptimizationConstraints::default(),
            OptimizationMethod::RiskParity,
        )
        .unwrap();

    assert!(!result.converged);
    assert!((result.weight_sum() - 1.0).abs() < 1e-6);
}

#[test]
fn test_guardrails_and_metrics_on_result() {
    let profile = UserBehavioralProfile::default().with_overconfidence(0.8);
    let result = optimize(
        &sample_returns(),
        &sample_covariance(),
        &OptimizationConstraints::default(),
        OptimizationMethod::BehavioralMvo,
        &profile,
    )
    .unwrap();

    let guarded =
        apply_behavioral_guardrails(&result.weights, &OptimizationConstraints::default(), &profile);
    assert!((guarded.iter().sum::<f64>() - 1.0).abs() < 1e-12);

    let metrics = portfolio_metrics(&guarded, &sample_returns(), &sample_covariance(), 0.02).unwrap();
    assert!(metrics.volatility > 0.0);
    assert!((metrics.max_drawdown - 2.0 * metrics.volatility).abs() < 1e-12);
}

#[test]
fn test_projection_of_optimized_weights() {
    let result = optimize(
        &sample_returns(),
        &sample_covariance(),
        &OptimizationConstraints::default(),
        OptimizationMethod::RiskParity,
        &UserBehavioralProfile::default(),
    )
    .unwrap();

    let config = MonteCarloConfig::seeded_from("user-42:portfolio-7")
        .with_simulations(500)
        .with_horizon(63);
    let a = simulate_allocation_forward(
        &result.weights,
        &sample_returns(),
        &sample_covariance(),
        10_000.0,
        &config,
    )
    .unwrap();
    let b = simulate_allocation_forward(
        &result.weights,
        &sample_returns(),
        &sample_covariance(),
        10_000.0,
        &config,
    )
    .unwrap();

    assert_eq!(a.final_values, b.final_values);
    assert_eq!(a.percentile_paths.len(), 5);
}

#[test]
fn test_risk_contributions_sum_to_variance() {
    let w = vec![0.2; 5];
    let cov = sample_covariance();
    let total: f64 = risk_contributions(&cov, &w).iter().sum();
    let variance: f64 = (0..5)
        .flat_map(|i| (0..5).map(move |j| (i, j)))
        .map(|(i, j)| w[i] * w[j] * cov[i][j])
        .sum();
    assert!((total - variance).abs() < 1e-15);
}

fn arb_problem() -> impl Strategy<Value = (Vec<f64>, Vec<Vec<f64>>)> {
    (1usize..6).prop_flat_map(|n| {
        (
            prop::collection::vec(-0.05f64..0.25, n),
            prop::collection::vec(0.005f64..0.12, n),
        )
            .prop_map(|(returns, variances)| {
                let n = returns.len();
                let cov = (0..n)
                    .map(|i| {
                        (0..n)
                            .map(|j| {
                                if i == j {
                                    variances[i]
                                } else {
                                    0.2 * (variances[i] * variances[j]).sqrt()
                                }
                            })
                            .collect()
                    })
                    .collect();
                (returns, cov)
            })
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn prop_weights_sum_to_one((returns, cov) in arb_problem(), method_idx in 0usize..3) {
        let result = optimize(
            &returns,
            &cov,
            &OptimizationConstraints::default(),
            METHODS[method_idx],
            &UserBehavioralProfile::default(),
        )
        .unwrap();

        prop_assert!((result.weight_sum() - 1.0).abs() < 1e-6);
        prop_assert!(result.weights.iter().all(|w| w.is_finite() && *w >= 0.0));
    }
}
