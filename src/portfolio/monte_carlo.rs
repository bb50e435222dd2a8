//! Monte Carlo projection of an optimized allocation.
//!
//! Each asset follows geometric Brownian motion with daily drift and
//! volatility derived from annual expected returns and covariance. Shocks are
//! correlated through the Cholesky factor of the implied correlation matrix.
//! Simulations run in fixed-size blocks, each with its own jumped RNG stream,
//! so results depend only on the seed and not on the rayon thread count.

use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::core::error::{BehavioralError, Result};
use crate::optimization::metrics::validate_square;

const TRADING_DAYS_PER_YEAR: f64 = 252.0;

/// Simulations drawn from one RNG stream.
const BLOCK_SIZE: usize = 256;

const PERCENTILES: [f64; 5] = [5.0, 25.0, 50.0, 75.0, 95.0];

/// Monte Carlo settings. The seed is always explicit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MonteCarloConfig {
    pub n_simulations: usize,
    pub horizon_days: usize,
    pub seed: u64,
}

impl Default for MonteCarloConfig {
    fn default() -> Self {
        Self {
            n_simulations: 10_000,
            horizon_days: 252,
            seed: 42,
        }
    }
}

impl MonteCarloConfig {
    /// Default settings with a seed derived from SHA-256 of `identifier`.
    ///
    /// The same identifier (a portfolio or user id) always reproduces the
    /// same projection.
    pub fn seeded_from(identifier: &str) -> Self {
        let digest = Sha256::digest(identifier.as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest[..8]);
        Self {
            seed: u64::from_be_bytes(bytes),
            ..Self::default()
        }
    }

    pub fn with_simulations(mut self, n_simulations: usize) -> Self {
        self.n_simulations = n_simulations;
        self
    }

    pub fn with_horizon(mut self, horizon_days: usize) -> Self {
        self.horizon_days = horizon_days;
        self
    }
}

/// Simulated path whose terminal value sits at a given percentile.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PercentilePath {
    pub percentile: f64,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonteCarloResult {
    /// Paths at the 5th, 25th, 50th, 75th and 95th percentile.
    pub percentile_paths: Vec<PercentilePath>,
    /// Terminal values, sorted ascending.
    pub final_values: Vec<f64>,
    /// Mean terminal return over the horizon, in percent.
    pub expected_return: f64,
    /// Share of simulations ending below the initial value.
    pub probability_of_loss: f64,
    /// 95% value at risk, in percent of initial value.
    pub var_95: f64,
    /// 95% conditional value at risk, in percent of initial value.
    pub cvar_95: f64,
}

impl MonteCarloResult {
    pub fn percentile_path(&self, percentile: f64) -> Option<&[f64]> {
        self.percentile_paths
            .iter()
            .find(|p| (p.percentile - percentile).abs() < f64::EPSILON)
            .map(|p| p.values.as_slice())
    }
}

/// Lower-triangular `L` with `A = L Lᵀ`.
///
/// Non-positive pivots are replaced by a small epsilon so near-singular
/// correlation matrices still factor.
fn cholesky(matrix: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = matrix.len();
    let mut l = vec![vec![0.0; n]; n];

    for i in 0..n {
        for j in 0..=i {
            let sum: f64 = (0..j).map(|k| l[i][k] * l[j][k]).sum();
            if i == j {
                let diag = matrix[i][i] - sum;
                l[i][j] = if diag > 0.0 { diag.sqrt() } else { diag.abs().max(1e-10).sqrt() };
            } else if l[j][j].abs() > 1e-15 {
                l[i][j] = (matrix[i][j] - sum) / l[j][j];
            }
        }
    }
    l
}

/// Correlation matrix implied by a covariance matrix. Zero-variance assets
/// are treated as uncorrelated with everything.
fn correlation_from_covariance(covariance: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let std_devs: Vec<f64> = (0..covariance.len())
        .map(|i| covariance[i][i].max(0.0).sqrt())
        .collect();
    covariance
        .iter()
        .enumerate()
        .map(|(i, row)| {
            row.iter()
                .enumerate()
                .map(|(j, &c)| {
                    if i == j {
                        1.0
                    } else if std_devs[i] > 0.0 && std_devs[j] > 0.0 {
                        (c / (std_devs[i] * std_devs[j])).clamp(-1.0, 1.0)
                    } else {
                        0.0
                    }
                })
                .collect()
        })
        .collect()
}

/// xoshiro256** with SplitMix64 seeding and a 2^128 jump for independent streams.
#[derive(Clone)]
struct Xoshiro256 {
    s: [u64; 4],
}

impl Xoshiro256 {
    fn new(seed: u64) -> Self {
        let mut z = seed;
        let mut s = [0u64; 4];
        for word in &mut s {
            z = z.wrapping_add(0x9e3779b97f4a7c15);
            let mut x = z;
            x = (x ^ (x >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
            x = (x ^ (x >> 27)).wrapping_mul(0x94d049bb133111eb);
            *word = x ^ (x >> 31);
        }
        Self { s }
    }

    fn jump(&mut self) {
        const JUMP: [u64; 4] = [
            0x180ec6d33cfd0aba,
            0xd5a61266f0c9392c,
            0xa9582618e03fc9aa,
            0x39abdc4529b1661c,
        ];
        let mut acc = [0u64; 4];
        for word in JUMP {
            for bit in 0..64 {
                if word & (1u64 << bit) != 0 {
                    for (a, s) in acc.iter_mut().zip(self.s.iter()) {
                        *a ^= *s;
                    }
                }
                self.next_u64();
            }
        }
        self.s = acc;
    }

    fn next_u64(&mut self) -> u64 {
        let result = self.s[1].wrapping_mul(5).rotate_left(7).wrapping_mul(9);
        let t = self.s[1] << 17;
        self.s[2] ^= self.s[0];
        self.s[3] ^= self.s[1];
        self.s[1] ^= self.s[2];
        self.s[0] ^= self.s[3];
        self.s[2] ^= t;
        self.s[3] = self.s[3].rotate_left(45);
        result
    }

    /// Uniform in [0, 1).
    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 * (1.0 / (1u64 << 53) as f64)
    }

    /// Standard normal via Box-Muller.
    fn next_normal(&mut self) -> f64 {
        let u1 = self.next_f64().max(1e-15);
        let u2 = self.next_f64();
        (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
    }
}

/// Per-asset daily GBM parameters and the shock factor.
struct PathModel<'a> {
    weights: &'a [f64],
    /// Itô-corrected daily log drift.
    log_drift: Vec<f64>,
    daily_sigma: Vec<f64>,
    chol: Vec<Vec<f64>>,
}

impl PathModel<'_> {
    fn simulate(&self, rng: &mut Xoshiro256, initial_value: f64, horizon: usize) -> Vec<f64> {
        let n = self.weights.len();
        let mut shocks = vec![0.0; n];
        let mut correlated = vec![0.0; n];
        let mut value = initial_value;
        let mut path = Vec::with_capacity(horizon + 1);
        path.push(value);

        for _ in 0..horizon {
            for z in shocks.iter_mut() {
                *z = rng.next_normal();
            }
            for (i, c) in correlated.iter_mut().enumerate() {
                *c = (0..=i).map(|j| self.chol[i][j] * shocks[j]).sum();
            }

            let period_return: f64 = (0..n)
                .map(|i| {
                    let log_return = self.log_drift[i] + self.daily_sigma[i] * correlated[i];
                    self.weights[i] * (log_return.exp() - 1.0)
                })
                .sum();

            value *= 1.0 + period_return;
            path.push(value);
        }
        path
    }
}

/// Project `weights` forward from `initial_value`.
///
/// `expected_returns` and `covariance` are annual, as fed to the optimizer.
pub fn simulate_allocation_forward(
    weights: &[f64],
    expected_returns: &[f64],
    covariance: &[Vec<f64>],
    initial_value: f64,
    config: &MonteCarloConfig,
) -> Result<MonteCarloResult> {
    let n_assets = weights.len();
    if n_assets == 0 {
        return Err(BehavioralError::invalid_input("weights are empty"));
    }
    if expected_returns.len() != n_assets {
        return Err(BehavioralError::length_mismatch(n_assets, expected_returns.len()));
    }
    validate_square(covariance, n_assets)?;
    if config.n_simulations == 0 {
        return Err(BehavioralError::invalid_input("n_simulations must be positive"));
    }
    if !(initial_value.is_finite() && initial_value > 0.0) {
        return Err(BehavioralError::invalid_input("initial value must be positive"));
    }

    let daily_sigma: Vec<f64> = (0..n_assets)
        .map(|i| (covariance[i][i].max(0.0) / TRADING_DAYS_PER_YEAR).sqrt())
        .collect();
    let log_drift: Vec<f64> = expected_returns
        .iter()
        .zip(daily_sigma.iter())
        .map(|(&mu, &sigma)| mu / TRADING_DAYS_PER_YEAR - 0.5 * sigma * sigma)
        .collect();
    let model = PathModel {
        weights,
        log_drift,
        daily_sigma,
        chol: cholesky(&correlation_from_covariance(covariance)),
    };

    let n_blocks = config.n_simulations.div_ceil(BLOCK_SIZE);
    let mut base_rng = Xoshiro256::new(config.seed);
    let block_rngs: Vec<Xoshiro256> = (0..n_blocks)
        .map(|_| {
            let rng = base_rng.clone();
            base_rng.jump();
            rng
        })
        .collect();

    let paths: Vec<Vec<f64>> = block_rngs
        .into_par_iter()
        .enumerate()
        .flat_map_iter(|(block, mut rng)| {
            let start = block * BLOCK_SIZE;
            let end = (start + BLOCK_SIZE).min(config.n_simulations);
            (start..end)
                .map(|_| model.simulate(&mut rng, initial_value, config.horizon_days))
                .collect::<Vec<_>>()
        })
        .collect();

    let terminal = |path: &Vec<f64>| path.last().copied().unwrap_or(initial_value);
    let mut final_values: Vec<f64> = paths.iter().map(terminal).collect();
    final_values.sort_by(|a, b| a.total_cmp(b));
    let n = final_values.len();
    let rank = |pct: f64| (((pct / 100.0) * (n as f64 - 1.0)).round() as usize).min(n - 1);

    let percentile_paths = PERCENTILES
        .iter()
        .map(|&pct| {
            let target = final_values[rank(pct)];
            let closest = paths
                .iter()
                .min_by(|a, b| {
                    (terminal(*a) - target)
                        .abs()
                        .total_cmp(&(terminal(*b) - target).abs())
                })
                .cloned()
                .unwrap_or_default();
            PercentilePath {
                percentile: pct,
                values: closest,
            }
        })
        .collect();

    let mean_final = final_values.iter().sum::<f64>() / n as f64;
    let expected_return = (mean_final / initial_value - 1.0) * 100.0;
    let probability_of_loss =
        final_values.iter().filter(|&&v| v < initial_value).count() as f64 / n as f64;

    let loss_pct = |value: f64| ((initial_value - value) / initial_value * 100.0).max(0.0);
    let tail_idx = rank(5.0);
    let var_95 = loss_pct(final_values[tail_idx]);
    let tail = &final_values[..=tail_idx];
    let cvar_95 = loss_pct(tail.iter().sum::<f64>() / tail.len() as f64);

    debug!(
        simulations = n,
        horizon_days = config.horizon_days,
        expected_return,
        probability_of_loss,
        "monte carlo projection complete"
    );

    Ok(MonteCarloResult {
        percentile_paths,
        final_values,
        expected_return,
        probability_of_loss,
        var_95,
        cvar_95,
    })
}
