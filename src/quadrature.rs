/*!
Adaptive quadrature over a bounded interval, used by the Pareto/CNBD
probability-alive computation.

The integrator is an adaptive Simpson rule: each subinterval is accepted once
the Richardson error estimate of its two-panel refinement falls within the
requested tolerance, and is bisected otherwise, up to a configurable
subdivision budget. Running out of budget or meeting a non-finite integrand
value is reported as an error rather than returning an unreliable estimate.
*/

use crate::error::{Error, Result};

/// Tolerances and budget for [`integrate`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QuadratureConfig {
    /// Absolute tolerance on the integral estimate.
    pub abs_tol: f64,
    /// Relative tolerance on the integral estimate.
    pub rel_tol: f64,
    /// Maximum number of interval bisections.
    pub max_subdivisions: usize,
}

impl Default for QuadratureConfig {
    fn default() -> Self {
        Self {
            abs_tol: 1e-4,
            rel_tol: 1e-4,
            max_subdivisions: 100,
        }
    }
}

/// Integrates `f` over `[a, b]` to the configured tolerance.
pub fn integrate<F: Fn(f64) -> f64>(
    f: F,
    a: f64,
    b: f64,
    config: &QuadratureConfig,
) -> Result<f64> {
    if a == b {
        return Ok(0.0);
    }
    if !(a < b) {
        return Err(Error::InvalidBounds { lower: a, upper: b });
    }

    let fa = eval(&f, a)?;
    let fb = eval(&f, b)?;
    let m = 0.5 * (a + b);
    let fm = eval(&f, m)?;
    let whole = simpson(a, b, fa, fm, fb);
    let tol = config.abs_tol.max(config.rel_tol * whole.abs());

    let mut budget = config.max_subdivisions;
    refine(&f, a, m, b, fa, fm, fb, whole, tol, &mut budget, config)
}

fn eval<F: Fn(f64) -> f64>(f: &F, at: f64) -> Result<f64> {
    let v = f(at);
    if v.is_finite() {
        Ok(v)
    } else {
        Err(Error::NonFiniteIntegrand { at })
    }
}

fn simpson(a: f64, b: f64, fa: f64, fm: f64, fb: f64) -> f64 {
    (b - a) / 6.0 * (fa + 4.0 * fm + fb)
}

#[allow(clippy::too_many_arguments)]
fn refine<F: Fn(f64) -> f64>(
    f: &F,
    a: f64,
    m: f64,
    b: f64,
    fa: f64,
    fm: f64,
    fb: f64,
    whole: f64,
    tol: f64,
    budget: &mut usize,
    config: &QuadratureConfig,
) -> Result<f64> {
    let lm = 0.5 * (a + m);
    let rm = 0.5 * (m + b);
    let flm = eval(f, lm)?;
    let frm = eval(f, rm)?;
    let left = simpson(a, m, fa, flm, fm);
    let right = simpson(m, b, fm, frm, fb);
    let delta = left + right - whole;

    if delta.abs() <= 15.0 * tol {
        return Ok(left + right + delta / 15.0);
    }
    if *budget == 0 {
        return Err(Error::SubdivisionLimit {
            a,
            b,
            limit: config.max_subdivisions,
        });
    }
    *budget -= 1;

    let half_tol = 0.5 * tol;
    let l = refine(f, a, lm, m, fa, flm, fm, left, half_tol, budget, config)?;
    let r = refine(f, m, rm, b, fm, frm, fb, right, half_tol, budget, config)?;
    Ok(l + r)
}
