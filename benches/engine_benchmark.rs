//! Benchmarks for the optimization and bias-detection engines.

use behavioral_core::behavior::BehavioralBiasDetector;
use behavioral_core::core::types::{
    OptimizationConstraints, OptimizationMethod, TradeAction, TradeRecord, UserBehavioralProfile,
};
use behavioral_core::evaluate_backtest;
use behavioral_core::optimization::PortfolioOptimizationEngine;
use chrono::{Duration, TimeZone, Utc};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// Covariance with a common factor plus idiosyncratic variance.
fn generate_problem(n: usize) -> (Vec<f64>, Vec<Vec<f64>>) {
    let returns = (0..n).map(|i| 0.04 + 0.01 * (i % 7) as f64).collect();
    let vols: Vec<f64> = (0..n).map(|i| 0.12 + 0.02 * (i % 5) as f64).collect();
    let cov = (0..n)
        .map(|i| {
            (0..n)
                .map(|j| {
                    let rho = if i == j { 1.0 } else { 0.3 };
                    rho * vols[i] * vols[j]
                })
                .collect()
        })
        .collect();
    (returns, cov)
}

/// Generate a ledger cycling through a handful of symbols.
fn generate_ledger(n: usize) -> Vec<TradeRecord> {
    let symbols = ["AAPL", "MSFT", "GOOG", "AMZN", "NVDA", "META", "TSLA", "JPM"];
    let start = Utc.with_ymd_and_hms(2022, 1, 3, 14, 30, 0).unwrap();
    (0..n)
        .map(|i| {
            let action = if i % 3 == 2 { TradeAction::Sell } else { TradeAction::Buy };
            let price = 100.0 + ((i as f64) * 0.37).sin() * 15.0;
            TradeRecord::new(
                symbols[i % symbols.len()],
                action,
                10.0,
                price,
                start + Duration::hours(6 * i as i64),
            )
            .unwrap()
        })
        .collect()
}

fn bench_optimize(c: &mut Criterion) {
    let mut group = c.benchmark_group("optimize");
    let engine = PortfolioOptimizationEngine::new(UserBehavioralProfile::default());
    let constraints = OptimizationConstraints::default();

    for method in [
        OptimizationMethod::BehavioralMvo,
        OptimizationMethod::BlackLitterman,
        OptimizationMethod::RiskParity,
    ] {
        for size in [5, 10, 20].iter() {
            let (returns, cov) = generate_problem(*size);
            group.bench_with_input(BenchmarkId::new(method.key(), size), size, |b, _| {
                b.iter(|| {
                    let result =
                        engine.optimize(black_box(&returns), black_box(&cov), &constraints, method);
                    black_box(result)
                });
            });
        }
    }

    group.finish();
}

fn bench_detect(c: &mut Criterion) {
    let mut group = c.benchmark_group("detect_biases");
    let detector = BehavioralBiasDetector::new();

    for size in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::new("trades", size), size, |b, &size| {
            let trades = generate_ledger(size);
            b.iter(|| black_box(detector.analyze(black_box(&trades))));
        });
    }

    group.finish();
}

fn bench_backtest(c: &mut Criterion) {
    let returns: Vec<f64> = (0..2520).map(|i| ((i as f64) * 0.3).sin() * 0.01).collect();
    c.bench_function("evaluate_backtest_10y", |b| {
        b.iter(|| black_box(evaluate_backtest(black_box(&returns), 0.02)))
    });
}

criterion_group!(benches, bench_optimize, bench_detect, bench_backtest);
criterion_main!(benches);
