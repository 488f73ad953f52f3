use std::collections::BTreeMap;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use exposure::{
    AbTestEngine, BayesianOptimizer, BreakerConfig, CircuitBreaker, ExperimentConfig,
    OptimizerConfig, ParamBound, Variant,
};

fn bench_breaker(c: &mut Criterion) {
    c.bench_function("breaker_record_and_gate", |b| {
        let mut breaker = CircuitBreaker::new(BreakerConfig::default());
        let mut t = 0u64;
        b.iter(|| {
            t += 1;
            if t % 3 == 0 {
                breaker.record_failure(t, None);
            } else {
                breaker.record_success(t);
            }
            black_box(breaker.can_execute(t))
        });
    });
}

fn bench_assignment(c: &mut Criterion) {
    let mut engine = AbTestEngine::new();
    let variants = vec![
        Variant {
            id: "control".to_string(),
            name: "control".to_string(),
            weight: 0.5,
            is_control: true,
            parameters: BTreeMap::new(),
        },
        Variant {
            id: "treatment".to_string(),
            name: "treatment".to_string(),
            weight: 0.5,
            is_control: false,
            parameters: BTreeMap::new(),
        },
    ];
    let id = engine
        .create_experiment(ExperimentConfig::new("bench", variants), 0)
        .unwrap()
        .id
        .clone();
    engine.start_experiment(&id, 0).unwrap();

    c.bench_function("assign_variant", |b| {
        let mut i = 0u64;
        b.iter(|| {
            i += 1;
            let user = format!("user-{i}");
            black_box(engine.assign_variant(&id, &user).unwrap().id.len())
        });
    });
}

fn bench_posterior(c: &mut Criterion) {
    let mut opt = BayesianOptimizer::new(OptimizerConfig {
        space: vec![ParamBound::new("x", 0.0, 1.0), ParamBound::new("y", 0.0, 1.0)],
        seed: 1,
        ..OptimizerConfig::default()
    });
    for _ in 0..30 {
        let params = opt.suggest_next();
        let value = -((params[0] - 0.5).powi(2) + (params[1] - 0.5).powi(2));
        opt.record_evaluation(&params, value, 0).unwrap();
    }

    c.bench_function("gp_posterior_30_obs", |b| {
        b.iter(|| black_box(opt.posterior(&[0.25, 0.75])));
    });

    c.bench_function("suggest_next_30_obs", |b| {
        b.iter(|| black_box(opt.suggest_next()));
    });
}

criterion_group!(benches, bench_breaker, bench_assignment, bench_posterior);
criterion_main!(benches);
