//! Tests verifying slice draws from a truncated gamma density against
//! rejection sampling from the untruncated distribution.

use btyd_slice::distributions::sample_truncated_gamma;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Gamma};

#[test]
fn truncated_gamma_matches_rejection_sampling() {
    const SAMPLE_SIZE: usize = 10_000;
    const SEED: u64 = 42;
    const LOWER: f64 = 0.3;
    const UPPER: f64 = 0.8;

    // Slice draws from gamma(2, rate 5) restricted to (0.3, 0.8).
    let mut rng = SmallRng::seed_from_u64(SEED);
    let slice_draws: Vec<f64> = (0..SAMPLE_SIZE)
        .map(|_| sample_truncated_gamma(2.0, 5.0, LOWER, UPPER, &mut rng).unwrap())
        .collect();
    assert!(slice_draws.iter().all(|&v| (LOWER..=UPPER).contains(&v)));

    // Reference draws by rejection: sample gamma(2, scale 1/5) and keep
    // what lands in the window.
    let gamma = Gamma::new(2.0, 0.2).unwrap();
    let mut ref_rng = SmallRng::seed_from_u64(SEED + 1);
    let mut ref_draws = Vec::with_capacity(SAMPLE_SIZE);
    while ref_draws.len() < SAMPLE_SIZE {
        let v = gamma.sample(&mut ref_rng);
        if v > LOWER && v < UPPER {
            ref_draws.push(v);
        }
    }

    let slice_mean = slice_draws.iter().sum::<f64>() / SAMPLE_SIZE as f64;
    let ref_mean = ref_draws.iter().sum::<f64>() / SAMPLE_SIZE as f64;
    assert!(
        (slice_mean - ref_mean).abs() < 0.05,
        "Mean deviation too large: slice {} vs rejection {}",
        slice_mean,
        ref_mean
    );
}
