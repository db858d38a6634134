//! Error types of the power flow engine.
//!
//! Only structural problems with the supplied snapshot leave [`crate::basic::engine::solve`]
//! as an `Err`. Data-quality issues and non-convergence are reported through
//! [`crate::basic::diagnostics::Diagnostics`] and the convergence reports instead.

use thiserror::Error;

/// Structural errors: malformed connectivity or mismatched array lengths.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PowerFlowError {
    #[error("the snapshot has no buses")]
    EmptyNetwork,

    #[error("{device} {index} references bus {bus}, but the snapshot only has {n_bus} buses")]
    BusOutOfRange {
        device: &'static str,
        index: usize,
        bus: usize,
        n_bus: usize,
    },

    #[error("branch {index} connects bus {bus} to itself")]
    SelfLoop { index: usize, bus: usize },

    #[error("{what} has length {found}, expected {expected}")]
    LengthMismatch {
        what: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{device} {index} has a non-finite value in field `{field}`")]
    NonFinite {
        device: &'static str,
        index: usize,
        field: &'static str,
    },

    #[error("the system base power must be positive, got {0}")]
    InvalidBase(f64),
}

/// Failure of the sparse linear solver inside one method iteration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinearSolveError {
    #[error("matrix is not square: {rows}x{cols}")]
    NotSquare { rows: usize, cols: usize },

    #[error("right hand side has length {found}, expected {expected}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("factorization failed: {0}")]
    Factorization(&'static str),

    #[error("solution contains non-finite values")]
    NonFinite,
}
