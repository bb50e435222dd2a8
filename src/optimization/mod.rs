//! Behavioral portfolio optimization.

pub mod engine;
pub mod guardrails;
pub mod metrics;
pub mod prospect;
pub mod solver;

pub use engine::{optimize, risk_contributions, PortfolioOptimizationEngine};
pub use guardrails::apply_behavioral_guardrails;
pub use metrics::{portfolio_metrics, PortfolioMetrics};
pub use prospect::ProspectTheoryTransform;
pub use solver::{
    AugmentedLagrangianSolver, ConstrainedOptimizer, Constraint, ConstraintKind, SolverOutcome,
};
