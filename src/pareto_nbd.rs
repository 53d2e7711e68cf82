/*!
# Pareto/NBD individual-level draws

Per-customer posteriors for the Pareto/NBD purchase/death process in the
Ma/Liu formulation, plus the batch driver that updates one latent parameter
(λ: purchase rate, μ: dropout rate) for every customer of a cohort.

A customer is summarized by the transaction count `x`, the recency `t_x` and
the calibration horizon `t_cal`; the population-level gamma hyperparameters
`(r, α)` for λ and `(s, β)` for μ are shared across the cohort. Records are
mutually independent, so the batch driver draws them in parallel, one seeded
slice-sampling run per customer.

## Example Usage

```rust
use btyd_slice::pareto_nbd::{Param, ParetoNbd};

let model = ParetoNbd::new(2.0, 2.0, 1.0, 10.0);
let x = [3.0, 0.0];
let t_x = [5.0, 0.0];
let t_cal = [10.0, 10.0];
let lambda = [0.8, 0.2];
let mu = [0.05, 0.05];

let draws = model
    .draw(Param::Lambda, &x, &t_x, &t_cal, &lambda, &mu, 42)
    .unwrap();
assert_eq!(draws.len(), 2);
assert!(draws.iter().all(|&v| v > 0.0));
```
*/

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;

use crate::distributions::Target;
use crate::error::{Error, Result};
use crate::slice::SliceSampler;

/// Posterior of one customer's purchase rate λ, holding the dropout rate μ
/// fixed at its current draw.
#[derive(Debug, Clone, Copy)]
pub struct LambdaPosterior {
    /// Number of repeat transactions in the calibration period.
    pub x: f64,
    /// Time of the last observed transaction.
    pub t_x: f64,
    /// End of the calibration period.
    pub t_cal: f64,
    /// Current draw of the dropout rate.
    pub mu: f64,
    /// Shape of the gamma prior on λ.
    pub r: f64,
    /// Rate of the gamma prior on λ.
    pub alpha: f64,
}

impl Target for LambdaPosterior {
    fn unnorm_log_prob(&self, theta: &[f64]) -> f64 {
        let lam = theta[0];
        if lam <= 0.0 {
            return f64::NEG_INFINITY;
        }
        let total = lam + self.mu;
        (self.r - 1.0) * lam.ln() - lam * self.alpha + self.x * lam.ln() - total.ln()
            + (self.mu * (-self.t_x * total).exp() + lam * (-self.t_cal * total).exp()).ln()
    }
}

/// Posterior of one customer's dropout rate μ, holding the purchase rate λ
/// fixed at its current draw.
#[derive(Debug, Clone, Copy)]
pub struct MuPosterior {
    /// Number of repeat transactions in the calibration period.
    pub x: f64,
    /// Time of the last observed transaction.
    pub t_x: f64,
    /// End of the calibration period.
    pub t_cal: f64,
    /// Current draw of the purchase rate.
    pub lambda: f64,
    /// Shape of the gamma prior on μ.
    pub s: f64,
    /// Rate of the gamma prior on μ.
    pub beta: f64,
}

impl Target for MuPosterior {
    fn unnorm_log_prob(&self, theta: &[f64]) -> f64 {
        let mu = theta[0];
        if mu <= 0.0 {
            return f64::NEG_INFINITY;
        }
        let total = self.lambda + mu;
        (self.s - 1.0) * mu.ln() - mu * self.beta + self.x * self.lambda.ln() - total.ln()
            + (mu * (-self.t_x * total).exp() + self.lambda * (-self.t_cal * total).exp()).ln()
    }
}

/// Which latent parameter a batch draw updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    Lambda,
    Mu,
}

/// The shared gamma hyperparameters of a Pareto/NBD cohort.
#[derive(Debug, Clone, Copy)]
pub struct ParetoNbd {
    /// Shape of the gamma prior on λ.
    pub r: f64,
    /// Rate of the gamma prior on λ.
    pub alpha: f64,
    /// Shape of the gamma prior on μ.
    pub s: f64,
    /// Rate of the gamma prior on μ.
    pub beta: f64,
}

impl ParetoNbd {
    pub fn new(r: f64, alpha: f64, s: f64, beta: f64) -> Self {
        Self { r, alpha, s, beta }
    }

    /// Draws one new value of `what` for every customer.
    ///
    /// All slices must share one length; record `i` is seeded with
    /// `seed + i`, so a fixed seed reproduces the whole batch regardless of
    /// the parallel schedule. λ updates run 3 sweeps with width `3√r/α`, μ
    /// updates 6 sweeps with width `3√s/β`, both on `(0, ∞)`.
    #[allow(clippy::too_many_arguments)]
    pub fn draw(
        &self,
        what: Param,
        x: &[f64],
        t_x: &[f64],
        t_cal: &[f64],
        lambda: &[f64],
        mu: &[f64],
        seed: u64,
    ) -> Result<Vec<f64>> {
        self.draw_impl(what, x, t_x, t_cal, lambda, mu, seed, None)
    }

    /// Like [`draw`](ParetoNbd::draw), advancing a progress bar as records
    /// complete.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_with_progress(
        &self,
        what: Param,
        x: &[f64],
        t_x: &[f64],
        t_cal: &[f64],
        lambda: &[f64],
        mu: &[f64],
        seed: u64,
    ) -> Result<Vec<f64>> {
        let pb = ProgressBar::new(x.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
                .unwrap()
                .progress_chars("##-"),
        );
        pb.set_prefix(match what {
            Param::Lambda => "lambda",
            Param::Mu => "mu",
        });
        let out = self.draw_impl(what, x, t_x, t_cal, lambda, mu, seed, Some(&pb));
        pb.finish_with_message("Done!");
        out
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_impl(
        &self,
        what: Param,
        x: &[f64],
        t_x: &[f64],
        t_cal: &[f64],
        lambda: &[f64],
        mu: &[f64],
        seed: u64,
        pb: Option<&ProgressBar>,
    ) -> Result<Vec<f64>> {
        let n = x.len();
        for arr in [t_x, t_cal, lambda, mu] {
            if arr.len() != n {
                return Err(Error::LengthMismatch {
                    expected: n,
                    got: arr.len(),
                });
            }
        }

        (0..n)
            .into_par_iter()
            .map(|i| {
                let draw = match what {
                    Param::Lambda => {
                        let target = LambdaPosterior {
                            x: x[i],
                            t_x: t_x[i],
                            t_cal: t_cal[i],
                            mu: mu[i],
                            r: self.r,
                            alpha: self.alpha,
                        };
                        let mut sampler = SliceSampler::new(target)
                            .steps(3)
                            .width(3.0 * self.r.sqrt() / self.alpha)
                            .bounds(0.0, f64::INFINITY)
                            .set_seed(seed + i as u64);
                        sampler.sample(&[lambda[i]])?[0]
                    }
                    Param::Mu => {
                        let target = MuPosterior {
                            x: x[i],
                            t_x: t_x[i],
                            t_cal: t_cal[i],
                            lambda: lambda[i],
                            s: self.s,
                            beta: self.beta,
                        };
                        let mut sampler = SliceSampler::new(target)
                            .steps(6)
                            .width(3.0 * self.s.sqrt() / self.beta)
                            .bounds(0.0, f64::INFINITY)
                            .set_seed(seed + i as u64);
                        sampler.sample(&[mu[i]])?[0]
                    }
                };
                if let Some(pb) = pb {
                    pb.inc(1);
                }
                Ok(draw)
            })
            .collect()
    }
}
