use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;

use super::error::LinearSolveError;

#[cfg(feature = "faer")]
mod faer;
#[cfg(feature = "faer")]
pub use faer::*;

#[cfg(feature = "rsparse")]
mod rsparse;
#[cfg(feature = "rsparse")]
pub use rsparse::*;

#[cfg(feature = "faer")]
pub type DefaultSolver = FaerSolver;

#[cfg(all(not(feature = "faer"), feature = "rsparse"))]
pub type DefaultSolver = RSparseSolver;

#[allow(non_snake_case)]
/// A trait for solving sparse linear systems.
///
/// Implementations cache their symbolic analysis between calls and redo it
/// whenever the sparsity pattern of the matrix changes.
pub trait Solve {
    /// Solves the sparse linear system in place.
    ///
    /// # Parameters
    ///
    /// * `Ap` - Column pointers of the matrix.
    /// * `Ai` - Row indices of the matrix.
    /// * `Ax` - Non-zero values of the matrix.
    /// * `b` - Right-hand side vector, overwritten with the solution.
    /// * `n` - Dimension of the system.
    fn solve(
        &mut self,
        Ap: &mut [usize],
        Ai: &mut [usize],
        Ax: &mut [f64],
        b: &mut [f64],
        n: usize,
    ) -> Result<(), &'static str>;

    /// Drops the cached symbolic factorization.
    fn reset(&mut self);
}

/// Cached sparsity pattern used by the backends to decide when to re-analyse.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct PatternKey {
    col_ptr: Vec<usize>,
    row_idx: Vec<usize>,
}

impl PatternKey {
    pub(crate) fn matches(&self, ap: &[usize], ai: &[usize]) -> bool {
        self.col_ptr == ap && self.row_idx == ai
    }

    pub(crate) fn new(ap: &[usize], ai: &[usize]) -> Self {
        Self {
            col_ptr: ap.to_vec(),
            row_idx: ai.to_vec(),
        }
    }
}

/// Solves `a x = b` in place of `b`.
pub fn solve_csc<S: Solve>(
    solver: &mut S,
    a: CscMatrix<f64>,
    b: &mut DVector<f64>,
) -> Result<(), LinearSolveError> {
    if a.nrows() != a.ncols() {
        return Err(LinearSolveError::NotSquare {
            rows: a.nrows(),
            cols: a.ncols(),
        });
    }
    let n = a.nrows();
    if b.len() != n {
        return Err(LinearSolveError::DimensionMismatch {
            expected: n,
            found: b.len(),
        });
    }
    if n == 0 {
        return Ok(());
    }
    if n == 1 {
        // scalar systems bypass the backends; their fill-reducing orderings expect n > 1
        let pivot: f64 = a.values().iter().sum();
        if pivot == 0.0 {
            return Err(LinearSolveError::Factorization("zero pivot"));
        }
        b[0] /= pivot;
        return if b[0].is_finite() { Ok(()) } else { Err(LinearSolveError::NonFinite) };
    }
    let (mut ap, mut ai, mut ax) = a.disassemble();
    solver
        .solve(&mut ap, &mut ai, &mut ax, b.as_mut_slice(), n)
        .map_err(LinearSolveError::Factorization)?;
    if b.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(LinearSolveError::NonFinite)
    }
}
