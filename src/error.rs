//! Crate-wide error type.
//!
//! Every failure is either a caller precondition violation (malformed bounds,
//! a starting point with undefined log-density, mismatched batch inputs) or a
//! numerical safety net firing (iteration ceiling, quadrature budget). A
//! failed draw is never retried internally, since retrying with different
//! parameters would bias the resulting distribution.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    /// The sampling domain is empty or inverted.
    #[error("invalid bounds: lower ({lower}) must be strictly below upper ({upper})")]
    InvalidBounds { lower: f64, upper: f64 },

    /// The stepping-out width is zero, negative or non-finite.
    #[error("invalid stepping-out width ({width}); must be a positive real")]
    InvalidWidth { width: f64 },

    /// A coordinate of the starting point lies outside the domain.
    #[error("coordinate {coord} of the starting point ({value}) lies outside [{lower}, {upper}]")]
    StartOutOfBounds {
        coord: usize,
        value: f64,
        lower: f64,
        upper: f64,
    },

    /// The log-density at the starting point is NaN or infinite, so no slice
    /// threshold can be drawn.
    #[error("log-density at the starting point is not finite ({value})")]
    NonFiniteDensity { value: f64 },

    /// The stepping-out or shrinkage loop for one coordinate update ran past
    /// the configured ceiling. Under a well-behaved target this never fires.
    #[error("slice update of coordinate {coord} exceeded the iteration bound of {limit}")]
    ExceededIterationBound { coord: usize, limit: usize },

    /// Per-record input slices of a batch draw disagree in length.
    #[error("per-record inputs must share one length: expected {expected}, got {got}")]
    LengthMismatch { expected: usize, got: usize },

    /// Adaptive quadrature did not reach the requested tolerance within its
    /// subdivision budget.
    #[error("quadrature on [{a}, {b}] exceeded {limit} subdivisions")]
    SubdivisionLimit { a: f64, b: f64, limit: usize },

    /// The integrand returned NaN or an infinity.
    #[error("integrand is not finite at {at}")]
    NonFiniteIntegrand { at: f64 },
}
