use faer::{
    MatMut,
    linalg::solvers::Solve,
    sparse::{
        SparseColMatRef, SymbolicSparseColMatRef,
        linalg::solvers::{Lu, SymbolicLu},
    },
};

use super::{PatternKey, Solve as PoSolve};

/// Sparse LU from `faer` with a cached symbolic factorization.
#[derive(Default)]
pub struct FaerSolver {
    symbolic: Option<SymbolicLu<usize>>,
    pattern: PatternKey,
}

#[allow(non_snake_case)]
impl PoSolve for FaerSolver {
    fn solve(
        &mut self,
        Ap: &mut [usize],
        Ai: &mut [usize],
        Ax: &mut [f64],
        b: &mut [f64],
        n: usize,
    ) -> Result<(), &'static str> {
        if Ap.len() != n + 1 || b.len() != n {
            return Err("inconsistent system dimensions");
        }
        let s = SymbolicSparseColMatRef::new_checked(n, n, Ap, None, Ai);
        let mat = SparseColMatRef::new(s, Ax);
        if self.symbolic.is_none() || !self.pattern.matches(Ap, Ai) {
            self.symbolic = Some(SymbolicLu::try_new(s).map_err(|_| "Faer symbolic error")?);
            self.pattern = PatternKey::new(Ap, Ai);
        }
        let symbolic = self.symbolic.as_ref().ok_or("missing symbolic analysis")?.clone();
        let lu = Lu::try_new_with_symbolic(symbolic, mat).map_err(|_| "Faer numerical error")?;
        let rhs = MatMut::from_column_major_slice_mut(b, n, 1);
        lu.solve_in_place(rhs);
        Ok(())
    }

    fn reset(&mut self) {
        self.symbolic = None;
        self.pattern = PatternKey::default();
    }
}
