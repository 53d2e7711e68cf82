/*!
# Slice Sampler

This module implements a multivariate slice sampler (Neal, R.M. 2003. Slice
sampling. Annals of Statistics 31:705-767) for any target distribution `D`
implementing the [`Target`] trait. Unlike Metropolis–Hastings there is no
proposal distribution to tune, and like a Gibbs sampler every update is
accepted; all the sampler needs is the ability to evaluate the unnormalized
log-density at any point of the continuous parameter space.

## Overview

Let `x` be the current position and `y` its log-density. One sweep updates
each coordinate in turn:

1. Draw a threshold `z = y − Exp(1)`, which is a draw of `ln Uniform(0, e^y)`
   without the underflow of exponentiating `y`.
2. **Stepping out**: place an interval of length `width` randomly around
   `x[j]` and grow it in `width`-sized increments until both ends either fall
   below `z` in log-density or hit the domain bounds.
3. **Shrinkage**: draw uniformly from the (clipped) interval. A draw above
   `z` is accepted; a rejected draw becomes the new interval endpoint on its
   side of `x[j]`, so the interval always retains `x[j]` and shrinks until a
   draw is accepted.

After `steps` sweeps the final position is returned as the draw. The sampler
keeps no chain history; each call is self-contained.

## Example Usage

```rust
use btyd_slice::distributions::Gamma;
use btyd_slice::slice::SliceSampler;

// Draw from a gamma(2, 5) density restricted to (0.3, 0.8).
let target = Gamma {
    shape: 2.0,
    rate: 5.0,
};
let mut sampler = SliceSampler::new(target)
    .width(0.85)
    .bounds(0.3, 0.8)
    .set_seed(42);
let draw = sampler.sample(&[0.4]).unwrap();
assert!(draw[0] > 0.3 && draw[0] < 0.8);
```
*/

use rand::rngs::SmallRng;
use rand::{thread_rng, Rng, SeedableRng};
use rand_distr::Exp1;

use crate::distributions::Target;
use crate::error::{Error, Result};

/// Default number of full sweeps over all coordinates.
pub const DEFAULT_STEPS: usize = 10;

/// Default initial interval width for the stepping-out phase.
pub const DEFAULT_WIDTH: f64 = 1.0;

/// Default ceiling on log-density evaluations per coordinate update.
///
/// Under any well-behaved target the stepping-out and shrinkage loops finish
/// after a handful of evaluations; the ceiling only exists to turn a
/// pathological target (e.g. one with the slice disconnected from the current
/// point) into an [`Error::ExceededIterationBound`] instead of a hang.
pub const DEFAULT_MAX_ITERATIONS: usize = 10_000;

/**
A slice sampler for a target distribution `D`.

The sampler owns the target, the sweep count, the stepping-out width, the
domain bounds (applied to every coordinate) and its own seeded RNG; call
[`set_seed`](SliceSampler::set_seed) for reproducible draws, or
[`sample_with`](SliceSampler::sample_with) to supply an external entropy
source.

Each call to [`sample`](SliceSampler::sample) performs one complete run of
`steps` sweeps starting from the supplied position and returns the final
position as an owned vector; no state is carried between calls besides the
RNG stream.

# Examples

```rust
use btyd_slice::distributions::Gamma;
use btyd_slice::slice::SliceSampler;

let target = Gamma {
    shape: 2.0,
    rate: 5.0,
};
let mut sampler = SliceSampler::new(target)
    .bounds(0.0, f64::INFINITY)
    .set_seed(7);
let a = sampler.sample(&[0.4]).unwrap();
let b = sampler.sample(&[0.4]).unwrap();
assert_ne!(a, b); // the RNG stream advances between calls
```
*/
#[derive(Debug, Clone)]
pub struct SliceSampler<D> {
    /// The target distribution to draw from.
    pub target: D,
    /// Number of full sweeps over all coordinates per call.
    pub steps: usize,
    /// Initial interval width for stepping out.
    pub width: f64,
    /// Lower domain bound, applied to every coordinate.
    pub lower: f64,
    /// Upper domain bound, applied to every coordinate.
    pub upper: f64,
    /// Ceiling on log-density evaluations per coordinate update.
    pub max_iterations: usize,
    /// Random seed for reproducibility.
    pub seed: u64,
    /// RNG for this sampler.
    rng: SmallRng,
}

impl<D: Target> SliceSampler<D> {
    /// Creates a sampler with the default sweep count (10), width (1.0) and
    /// unbounded domain, seeded from the thread RNG.
    pub fn new(target: D) -> Self {
        let seed = thread_rng().gen::<u64>();
        Self {
            target,
            steps: DEFAULT_STEPS,
            width: DEFAULT_WIDTH,
            lower: f64::NEG_INFINITY,
            upper: f64::INFINITY,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            seed,
            rng: SmallRng::seed_from_u64(seed),
        }
    }

    /// Sets the number of full sweeps per call.
    pub fn steps(mut self, steps: usize) -> Self {
        self.steps = steps;
        self
    }

    /// Sets the initial stepping-out interval width.
    pub fn width(mut self, width: f64) -> Self {
        self.width = width;
        self
    }

    /// Sets the domain bounds applied to every coordinate.
    pub fn bounds(mut self, lower: f64, upper: f64) -> Self {
        self.lower = lower;
        self.upper = upper;
        self
    }

    /// Sets the per-coordinate-update iteration ceiling.
    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    /// Sets a new seed and reinitializes the RNG accordingly.
    pub fn set_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self.rng = SmallRng::seed_from_u64(seed);
        self
    }

    /// Runs `steps` sweeps from `x0` using the sampler's own RNG and returns
    /// the final position.
    ///
    /// With `steps == 0` this returns `x0` unchanged. Fails fast when the
    /// bounds are malformed, `x0` lies outside them, or the log-density at
    /// `x0` is not finite.
    pub fn sample(&mut self, x0: &[f64]) -> Result<Vec<f64>> {
        Self::run(
            &self.target,
            x0,
            self.steps,
            self.width,
            self.lower,
            self.upper,
            self.max_iterations,
            &mut self.rng,
        )
    }

    /// Like [`sample`](SliceSampler::sample), but consuming entropy from a
    /// caller-supplied source instead of the sampler's own RNG.
    pub fn sample_with<R: Rng + ?Sized>(&self, x0: &[f64], rng: &mut R) -> Result<Vec<f64>> {
        Self::run(
            &self.target,
            x0,
            self.steps,
            self.width,
            self.lower,
            self.upper,
            self.max_iterations,
            rng,
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn run<R: Rng + ?Sized>(
        target: &D,
        x0: &[f64],
        steps: usize,
        width: f64,
        lower: f64,
        upper: f64,
        max_iterations: usize,
        rng: &mut R,
    ) -> Result<Vec<f64>> {
        if !(lower < upper) {
            return Err(Error::InvalidBounds { lower, upper });
        }
        if !(width.is_finite() && width > 0.0) {
            return Err(Error::InvalidWidth { width });
        }
        for (coord, &value) in x0.iter().enumerate() {
            if !(lower <= value && value <= upper) {
                return Err(Error::StartOutOfBounds {
                    coord,
                    value,
                    lower,
                    upper,
                });
            }
        }

        let mut x = x0.to_vec();
        let mut logy = target.unnorm_log_prob(&x);
        if !logy.is_finite() {
            return Err(Error::NonFiniteDensity { value: logy });
        }

        for _ in 0..steps {
            for j in 0..x.len() {
                logy = Self::update_coordinate(
                    target,
                    &mut x,
                    j,
                    logy,
                    width,
                    lower,
                    upper,
                    max_iterations,
                    rng,
                )?;
            }
        }
        Ok(x)
    }

    /// Updates coordinate `j` in place, holding all others fixed, and returns
    /// the log-density of the accepted position.
    #[allow(clippy::too_many_arguments)]
    fn update_coordinate<R: Rng + ?Sized>(
        target: &D,
        x: &mut [f64],
        j: usize,
        logy: f64,
        width: f64,
        lower: f64,
        upper: f64,
        max_iterations: usize,
        rng: &mut R,
    ) -> Result<f64> {
        let xj = x[j];
        let mut budget = max_iterations;
        let ceiling = |x: &mut [f64]| {
            x[j] = xj;
            Error::ExceededIterationBound {
                coord: j,
                limit: max_iterations,
            }
        };

        // Draw the slice threshold uniformly under the density on the log
        // scale: logy - Exp(1) rather than ln(U * e^logy).
        let logz = logy - rng.sample::<f64, _>(Exp1);

        // Stepping out: the random placement keeps xj inside [l, r].
        let u = rng.gen::<f64>() * width;
        let mut l = xj - u;
        let mut r = xj + (width - u);
        while l > lower {
            if budget == 0 {
                return Err(ceiling(x));
            }
            budget -= 1;
            x[j] = l;
            if !(target.unnorm_log_prob(x) > logz) {
                break;
            }
            l -= width;
        }
        while r < upper {
            if budget == 0 {
                return Err(ceiling(x));
            }
            budget -= 1;
            x[j] = r;
            if !(target.unnorm_log_prob(x) > logz) {
                break;
            }
            r += width;
        }

        // Shrinkage: draw within the clipped interval; rejected draws become
        // the new endpoint on their side of xj, so xj is never excluded and
        // the interval width strictly decreases.
        let mut r0 = l.max(lower);
        let mut r1 = r.min(upper);
        loop {
            if budget == 0 {
                return Err(ceiling(x));
            }
            budget -= 1;
            let xs = r0 + rng.gen::<f64>() * (r1 - r0);
            x[j] = xs;
            let logys = target.unnorm_log_prob(x);
            if logys > logz {
                return Ok(logys);
            }
            if xs < xj {
                r0 = xs;
            } else {
                r1 = xs;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distributions::Gamma;
    use std::cell::RefCell;

    /// Wraps a target and records every position it is evaluated at.
    struct Recording<D> {
        inner: D,
        seen: RefCell<Vec<f64>>,
    }

    impl<D: Target> Target for Recording<D> {
        fn unnorm_log_prob(&self, theta: &[f64]) -> f64 {
            self.seen.borrow_mut().push(theta[0]);
            self.inner.unnorm_log_prob(theta)
        }
    }

    /// A density that is positive at exactly one point and effectively zero
    /// everywhere else, so the shrinkage loop can never accept a new draw.
    struct Spike;

    impl Target for Spike {
        fn unnorm_log_prob(&self, theta: &[f64]) -> f64 {
            if theta[0] == 5.0 {
                0.0
            } else {
                -1e30
            }
        }
    }

    fn gamma25() -> Gamma {
        Gamma {
            shape: 2.0,
            rate: 5.0,
        }
    }

    #[test]
    fn zero_steps_returns_start_unchanged() {
        let mut sampler = SliceSampler::new(gamma25())
            .steps(0)
            .bounds(0.0, f64::INFINITY)
            .set_seed(1);
        let draw = sampler.sample(&[0.4]).unwrap();
        assert_eq!(draw, vec![0.4]);
    }

    #[test]
    fn same_seed_reproduces_draws() {
        let mut a = SliceSampler::new(gamma25())
            .bounds(0.0, f64::INFINITY)
            .set_seed(99);
        let mut b = SliceSampler::new(gamma25())
            .bounds(0.0, f64::INFINITY)
            .set_seed(99);
        assert_eq!(a.sample(&[0.4]).unwrap(), b.sample(&[0.4]).unwrap());
    }

    #[test]
    fn draws_respect_bounds() {
        let (lower, upper) = (0.3, 0.8);
        let mut sampler = SliceSampler::new(gamma25())
            .width(0.85)
            .bounds(lower, upper)
            .set_seed(3);
        for _ in 0..500 {
            let draw = sampler.sample(&[0.4]).unwrap();
            assert!(
                draw[0] >= lower && draw[0] <= upper,
                "draw {} escaped [{}, {}]",
                draw[0],
                lower,
                upper
            );
        }
    }

    #[test]
    fn every_evaluation_stays_within_bounds() {
        // Stepping out checks the bound before evaluating the endpoint and
        // the shrinkage interval is clipped, so the target is never asked
        // about a point outside the domain.
        let (lower, upper) = (0.3, 0.8);
        let target = Recording {
            inner: gamma25(),
            seen: RefCell::new(Vec::new()),
        };
        let mut sampler = SliceSampler::new(target)
            .width(0.1)
            .bounds(lower, upper)
            .set_seed(11);
        for _ in 0..100 {
            sampler.sample(&[0.4]).unwrap();
        }
        for &v in sampler.target.seen.borrow().iter() {
            assert!(
                v >= lower && v <= upper,
                "evaluated {} outside [{}, {}]",
                v,
                lower,
                upper
            );
        }
    }

    #[test]
    fn malformed_bounds_fail_fast() {
        let mut sampler = SliceSampler::new(gamma25()).bounds(1.0, 1.0).set_seed(1);
        assert!(matches!(
            sampler.sample(&[1.0]),
            Err(Error::InvalidBounds { .. })
        ));

        let mut sampler = SliceSampler::new(gamma25()).bounds(2.0, 1.0).set_seed(1);
        assert!(matches!(
            sampler.sample(&[1.5]),
            Err(Error::InvalidBounds { .. })
        ));
    }

    #[test]
    fn non_positive_width_fails_fast() {
        let mut sampler = SliceSampler::new(gamma25())
            .width(0.0)
            .bounds(0.0, f64::INFINITY)
            .set_seed(1);
        assert!(matches!(
            sampler.sample(&[0.4]),
            Err(Error::InvalidWidth { .. })
        ));
    }

    #[test]
    fn start_outside_bounds_fails_fast() {
        let mut sampler = SliceSampler::new(gamma25()).bounds(0.3, 0.8).set_seed(1);
        assert!(matches!(
            sampler.sample(&[0.1]),
            Err(Error::StartOutOfBounds { coord: 0, .. })
        ));
    }

    #[test]
    fn non_finite_initial_density_fails_fast() {
        // gamma log-density is -inf off the support
        let mut sampler = SliceSampler::new(gamma25()).set_seed(1);
        assert!(matches!(
            sampler.sample(&[-1.0]),
            Err(Error::NonFiniteDensity { .. })
        ));
    }

    #[test]
    fn pathological_target_hits_iteration_ceiling() {
        let mut sampler = SliceSampler::new(Spike).max_iterations(1_000).set_seed(5);
        assert!(matches!(
            sampler.sample(&[5.0]),
            Err(Error::ExceededIterationBound { coord: 0, .. })
        ));
    }

    #[test]
    fn injected_rng_is_deterministic() {
        use rand::rngs::SmallRng;
        use rand::SeedableRng;

        let sampler = SliceSampler::new(gamma25()).bounds(0.0, f64::INFINITY);
        let mut rng1 = SmallRng::seed_from_u64(21);
        let mut rng2 = SmallRng::seed_from_u64(21);
        assert_eq!(
            sampler.sample_with(&[0.4], &mut rng1).unwrap(),
            sampler.sample_with(&[0.4], &mut rng2).unwrap()
        );
    }

    #[test]
    fn multivariate_updates_every_coordinate() {
        use crate::distributions::BivariateNormal;
        use ndarray::{arr1, arr2};

        let target = BivariateNormal {
            mean: arr1(&[0.0, 0.0]),
            cov: arr2(&[[1.0, 0.0], [0.0, 1.0]]),
        };
        let mut sampler = SliceSampler::new(target).steps(5).set_seed(17);
        let draw = sampler.sample(&[0.2, 0.3]).unwrap();
        assert_eq!(draw.len(), 2);
        assert_ne!(draw[0], 0.2);
        assert_ne!(draw[1], 0.3);
    }
}
