// benches/coupling_benchmarks.rs

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use qsfw_sim::filter::{butter_lowpass, filtfilt};
use qsfw_sim::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::StandardNormal;

fn benchmark_coupling_step(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(42);
    let network = OscillatorNetwork::init(100, PHI, 1.2, &mut rng).unwrap();
    let cache = OperatorCache::new();
    let ops = cache.get(4).unwrap();
    let state = init_state(4, &mut rng).unwrap();

    c.bench_function("kuramoto_step_n100", |b| {
        b.iter(|| black_box(network.step(black_box(0.1))));
    });

    c.bench_function("lindblad_micro_step_d4", |b| {
        let h = build_hamiltonian(&network, &ops);
        b.iter(|| black_box(evolve(&state, &h, 0.01, 0.01, &ops).unwrap()));
    });

    c.bench_function("coupled_tick_d4_n100", |b| {
        let config = SimulationConfig {
            duration: 0.1,
            seed: Some(1),
            ..SimulationConfig::default()
        };
        let params = CouplingParameters::default();
        b.iter(|| {
            black_box(run_simulation(&config, &params, &cache, &CancelToken::new()).unwrap())
        });
    });
}

fn benchmark_spectral(c: &mut Criterion) {
    let mut rng = StdRng::seed_from_u64(7);
    let series: Vec<f64> = (0..10_000).map(|_| rng.sample(StandardNormal)).collect();

    c.bench_function("welch_psd_10k", |b| {
        b.iter(|| {
            black_box(power_spectral_density(&series, 10.0, &WelchConfig::default()).unwrap())
        });
    });

    c.bench_function("filtfilt_butter3_10k", |b| {
        let tf = butter_lowpass(3, 0.2).unwrap();
        b.iter(|| black_box(filtfilt(&tf.b, &tf.a, &series).unwrap()));
    });
}

criterion_group!(benches, benchmark_coupling_step, benchmark_spectral);
criterion_main!(benches);
