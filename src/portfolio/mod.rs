//! Forward projection of optimized allocations.

pub mod monte_carlo;

pub use monte_carlo::{
    simulate_allocation_forward, MonteCarloConfig, MonteCarloResult, PercentilePath,
};
