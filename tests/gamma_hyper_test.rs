//! Tests verifying that the joint (shape, rate) slice update recovers the
//! parameters of gamma-distributed data.

use btyd_slice::distributions::sample_shape_rate;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Gamma};

#[test]
fn shape_rate_posterior_recovers_generating_parameters() {
    const N_OBS: usize = 10_000;
    const N_DRAWS: usize = 2_000;
    const BURNIN: usize = 200;
    const SEED: u64 = 7;

    const SHAPE: f64 = 1.4;
    const RATE: f64 = 3.5;

    // Simulate observations from gamma(1.4, rate 3.5).
    let gamma = Gamma::new(SHAPE, 1.0 / RATE).unwrap();
    let mut rng = SmallRng::seed_from_u64(SEED);
    let obs: Vec<f64> = (0..N_OBS).map(|_| gamma.sample(&mut rng)).collect();

    // Run the chain under diffuse gamma(1e-3, 1e-3) hyperpriors.
    let prior = (1e-3, 1e-3);
    let mut cur = (1.0, 1.0);
    let mut shape_sum = 0.0;
    let mut rate_sum = 0.0;
    for i in 0..N_DRAWS {
        cur = sample_shape_rate(&obs, cur, prior, prior, 20, 1.0, &mut rng)
            .expect("hyperparameter update failed");
        if i >= BURNIN {
            shape_sum += cur.0;
            rate_sum += cur.1;
        }
    }
    let kept = (N_DRAWS - BURNIN) as f64;
    let shape_mean = shape_sum / kept;
    let rate_mean = rate_sum / kept;

    // With 10k observations the posterior concentrates tightly around the
    // generating values.
    assert!(
        (shape_mean - SHAPE).abs() < 0.1,
        "Posterior shape mean {} too far from {}",
        shape_mean,
        SHAPE
    );
    assert!(
        (rate_mean - RATE).abs() < 0.1,
        "Posterior rate mean {} too far from {}",
        rate_mean,
        RATE
    );
}
