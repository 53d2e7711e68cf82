/*!
# Pareto/CNBD individual-level draws

Per-customer posteriors for the Pareto/CNBD process, in which interpurchase
times are Erlang-k rather than exponential: every customer carries a
regularity parameter `k`, a purchase rate `λ` and a latent lifetime `τ`. The
batch driver updates one of the three for every customer of a cohort, and
[`p_alive`] computes the posterior probability that a customer's lifetime has
not yet ended.

Two things distinguish these draws from the Pareto/NBD ones:

- the τ update has a *dynamic* domain `[t_x, t_cal]` per customer, and falls
  back to a uniform draw over that domain whenever the posterior is too flat
  to slice-sample (the interpurchase survival at `t_x` underflows past the
  configurable [`ParetoCnbd::flatness_threshold`]);
- the posteriors involve the gamma survival function, so a draw of `k` or `λ`
  far into a tail can legitimately see `-∞` log-densities during shrinkage.
*/

use indicatif::{ProgressBar, ProgressStyle};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use statrs::function::gamma::{gamma_ur, ln_gamma};

use crate::distributions::Target;
use crate::error::{Error, Result};
use crate::quadrature::{integrate, QuadratureConfig};
use crate::slice::SliceSampler;

/// Default log-scale threshold below which the τ posterior counts as too
/// flat to sample and the batch driver draws uniformly over the support
/// instead.
pub const DEFAULT_FLATNESS_THRESHOLD: f64 = -100.0;

/// Upper tail P(X > q) of a gamma(shape, rate) variable.
fn gamma_sf(q: f64, shape: f64, rate: f64) -> f64 {
    if q <= 0.0 {
        1.0
    } else {
        gamma_ur(shape, rate * q)
    }
}

/// Log of the upper tail P(X > q) of a gamma(shape, rate) variable.
///
/// Where the tail probability itself underflows to zero, falls back to the
/// asymptotic expansion `ln Q(a, x) ≈ (a−1)·ln x − x − ln Γ(a) + ln Σ`, with
/// `Σ = 1 + (a−1)/x + (a−1)(a−2)/x² + …`, so the k and λ posteriors stay
/// finite arbitrarily deep into the tail.
fn gamma_ln_sf(q: f64, shape: f64, rate: f64) -> f64 {
    if q <= 0.0 {
        return 0.0;
    }
    let x = rate * q;
    let sf = gamma_ur(shape, x);
    if sf > 0.0 {
        return sf.ln();
    }
    let mut series = 1.0;
    let mut term = 1.0;
    for n in 1..16 {
        term *= (shape - n as f64) / x;
        if term.abs() < f64::EPSILON {
            break;
        }
        series += term;
    }
    (shape - 1.0) * x.ln() - x - ln_gamma(shape) + series.ln()
}

/// Density of a gamma(shape, rate) variable at `q`.
fn gamma_pdf(q: f64, shape: f64, rate: f64) -> f64 {
    if q <= 0.0 {
        0.0
    } else {
        (shape * rate.ln() + (shape - 1.0) * q.ln() - rate * q - ln_gamma(shape)).exp()
    }
}

/// Posterior of one customer's regularity parameter `k`, holding λ and τ
/// fixed at their current draws.
#[derive(Debug, Clone, Copy)]
pub struct KPosterior {
    /// Number of repeat transactions in the calibration period.
    pub x: f64,
    /// Time of the last observed transaction.
    pub t_x: f64,
    /// End of the calibration period.
    pub t_cal: f64,
    /// Sum of the log interpurchase times.
    pub litt: f64,
    /// Current draw of the purchase rate.
    pub lambda: f64,
    /// Current draw of the lifetime.
    pub tau: f64,
    /// Shape of the gamma prior on k.
    pub t: f64,
    /// Rate of the gamma prior on k.
    pub gamma: f64,
}

impl Target for KPosterior {
    fn unnorm_log_prob(&self, theta: &[f64]) -> f64 {
        let k = theta[0];
        if k <= 0.0 {
            return f64::NEG_INFINITY;
        }
        let horizon = self.t_cal.min(self.tau) - self.t_x;
        let log_sf = gamma_ln_sf(horizon, k, k * self.lambda);
        (self.t - 1.0) * k.ln() - k * self.gamma + k * self.x * (k * self.lambda).ln()
            - self.x * ln_gamma(k)
            - k * self.lambda * self.t_x
            + (k - 1.0) * self.litt
            + log_sf
    }
}

/// Posterior of one customer's purchase rate λ, holding k and τ fixed at
/// their current draws.
#[derive(Debug, Clone, Copy)]
pub struct LambdaPosterior {
    /// Number of repeat transactions in the calibration period.
    pub x: f64,
    /// Time of the last observed transaction.
    pub t_x: f64,
    /// End of the calibration period.
    pub t_cal: f64,
    /// Current draw of the regularity parameter.
    pub k: f64,
    /// Current draw of the lifetime.
    pub tau: f64,
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
        let horizon = self.t_cal.min(self.tau) - self.t_x;
        let log_sf = gamma_ln_sf(horizon, self.k, self.k * lam);
        (self.r - 1.0) * lam.ln() - lam * self.alpha + self.k * self.x * lam.ln()
            - self.k * lam * self.t_x
            + log_sf
    }
}

/// Posterior of one customer's lifetime τ on `[t_x, t_cal]`, holding k, λ
/// and μ fixed at their current draws.
#[derive(Debug, Clone, Copy)]
pub struct TauPosterior {
    /// Current draw of the regularity parameter.
    pub k: f64,
    /// Current draw of the purchase rate.
    pub lambda: f64,
    /// Current draw of the dropout rate.
    pub mu: f64,
}

impl Target for TauPosterior {
    fn unnorm_log_prob(&self, theta: &[f64]) -> f64 {
        let tau = theta[0];
        if tau <= 0.0 {
            return f64::NEG_INFINITY;
        }
        let rate = self.k * self.lambda;
        let sf = gamma_sf(tau, self.k, rate);
        let f = gamma_pdf(tau, self.k, rate);
        -self.mu * tau + (self.mu * sf + f).ln()
    }
}

/// Which latent parameter a batch draw updates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Param {
    K,
    Lambda,
    Tau,
}

/// The shared hyperparameters of a Pareto/CNBD cohort.
#[derive(Debug, Clone, Copy)]
pub struct ParetoCnbd {
    /// Shape of the gamma prior on k.
    pub t: f64,
    /// Rate of the gamma prior on k.
    pub gamma: f64,
    /// Shape of the gamma prior on λ.
    pub r: f64,
    /// Rate of the gamma prior on λ.
    pub alpha: f64,
    /// Shape of the gamma prior on μ.
    pub s: f64,
    /// Rate of the gamma prior on μ.
    pub beta: f64,
    /// Log-scale survival threshold for the τ uniform fallback.
    pub flatness_threshold: f64,
}

impl ParetoCnbd {
    pub fn new(t: f64, gamma: f64, r: f64, alpha: f64, s: f64, beta: f64) -> Self {
        Self {
            t,
            gamma,
            r,
            alpha,
            s,
            beta,
            flatness_threshold: DEFAULT_FLATNESS_THRESHOLD,
        }
    }

    /// Sets the τ flatness threshold (log scale).
    pub fn flatness_threshold(mut self, threshold: f64) -> Self {
        self.flatness_threshold = threshold;
        self
    }

    /// Draws one new value of `what` for every customer.
    ///
    /// All slices must share one length; record `i` is seeded with
    /// `seed + i`. k and λ updates run 3 sweeps on `(0, ∞)` with widths
    /// `3√t/γ` and `3√r/α`; τ updates run 6 sweeps on the per-customer
    /// domain `[t_x, t_cal]` with width `(t_cal − t_x)/2`, or fall back to a
    /// uniform draw when the posterior is flatter than
    /// [`flatness_threshold`](ParetoCnbd::flatness_threshold).
    #[allow(clippy::too_many_arguments)]
    pub fn draw(
        &self,
        what: Param,
        x: &[f64],
        t_x: &[f64],
        t_cal: &[f64],
        litt: &[f64],
        k: &[f64],
        lambda: &[f64],
        mu: &[f64],
        tau: &[f64],
        seed: u64,
    ) -> Result<Vec<f64>> {
        self.draw_impl(what, x, t_x, t_cal, litt, k, lambda, mu, tau, seed, None)
    }

    /// Like [`draw`](ParetoCnbd::draw), advancing a progress bar as records
    /// complete.
    #[allow(clippy::too_many_arguments)]
    pub fn draw_with_progress(
        &self,
        what: Param,
        x: &[f64],
        t_x: &[f64],
        t_cal: &[f64],
        litt: &[f64],
        k: &[f64],
        lambda: &[f64],
        mu: &[f64],
        tau: &[f64],
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
            Param::K => "k",
            Param::Lambda => "lambda",
            Param::Tau => "tau",
        });
        let out = self.draw_impl(what, x, t_x, t_cal, litt, k, lambda, mu, tau, seed, Some(&pb));
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
        litt: &[f64],
        k: &[f64],
        lambda: &[f64],
        mu: &[f64],
        tau: &[f64],
        seed: u64,
        pb: Option<&ProgressBar>,
    ) -> Result<Vec<f64>> {
        let n = x.len();
        for arr in [t_x, t_cal, litt, k, lambda, mu, tau] {
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
                let mut rng = SmallRng::seed_from_u64(seed + i as u64);
                let draw = match what {
                    Param::K => {
                        let target = KPosterior {
                            x: x[i],
                            t_x: t_x[i],
                            t_cal: t_cal[i],
                            litt: litt[i],
                            lambda: lambda[i],
                            tau: tau[i],
                            t: self.t,
                            gamma: self.gamma,
                        };
                        let sampler = SliceSampler::new(target)
                            .steps(3)
                            .width(3.0 * self.t.sqrt() / self.gamma)
                            .bounds(0.0, f64::INFINITY);
                        sampler.sample_with(&[k[i]], &mut rng)?[0]
                    }
                    Param::Lambda => {
                        let target = LambdaPosterior {
                            x: x[i],
                            t_x: t_x[i],
                            t_cal: t_cal[i],
                            k: k[i],
                            tau: tau[i],
                            r: self.r,
                            alpha: self.alpha,
                        };
                        let sampler = SliceSampler::new(target)
                            .steps(3)
                            .width(3.0 * self.r.sqrt() / self.alpha)
                            .bounds(0.0, f64::INFINITY);
                        sampler.sample_with(&[lambda[i]], &mut rng)?[0]
                    }
                    Param::Tau => self.draw_tau(
                        t_x[i],
                        t_cal[i],
                        k[i],
                        lambda[i],
                        mu[i],
                        tau[i],
                        &mut rng,
                    )?,
                };
                if let Some(pb) = pb {
                    pb.inc(1);
                }
                Ok(draw)
            })
            .collect()
    }

    #[allow(clippy::too_many_arguments)]
    fn draw_tau<R: Rng + ?Sized>(
        &self,
        t_x: f64,
        t_cal: f64,
        k: f64,
        lambda: f64,
        mu: f64,
        tau: f64,
        rng: &mut R,
    ) -> Result<f64> {
        if gamma_ln_sf(t_x, k, k * lambda) < self.flatness_threshold {
            // Posterior mass below t_x has underflowed; the conditional on
            // [t_x, t_cal] is indistinguishable from uniform.
            return Ok(t_x + rng.gen::<f64>() * (t_cal - t_x));
        }
        let tau_init = if tau > t_cal || tau < t_x {
            t_x + (t_cal - t_x) / 2.0
        } else {
            tau
        };
        let target = TauPosterior { k, lambda, mu };
        let sampler = SliceSampler::new(target)
            .steps(6)
            .width((t_cal - t_x) / 2.0)
            .bounds(t_x, t_cal);
        Ok(sampler.sample_with(&[tau_init], rng)?[0])
    }
}

/// Posterior probability that each customer is still active at the end of
/// the calibration period.
///
/// Computes `numer / (numer + μ·∫_{t_x}^{t_cal} S(y − t_x)·e^{−μy} dy)` per
/// record, where `S` is the survival function of the Erlang-k interpurchase
/// time and `numer = S(t_cal − t_x)·e^{−μ·t_cal}`. The integral runs through
/// [`integrate`] with the supplied tolerances.
pub fn p_alive(
    t_x: &[f64],
    t_cal: &[f64],
    k: &[f64],
    lambda: &[f64],
    mu: &[f64],
    config: &QuadratureConfig,
) -> Result<Vec<f64>> {
    let n = t_x.len();
    for arr in [t_cal, k, lambda, mu] {
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
            let rate = k[i] * lambda[i];
            let numer = gamma_sf(t_cal[i] - t_x[i], k[i], rate) * (-mu[i] * t_cal[i]).exp();
            let integral = integrate(
                |y| gamma_sf(y - t_x[i], k[i], rate) * (-mu[i] * y).exp(),
                t_x[i],
                t_cal[i],
                config,
            )?;
            let denom = numer + mu[i] * integral;
            Ok(numer / denom)
        })
        .collect()
}
