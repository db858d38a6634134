use rsparse::{
    data::{self, Numeric, Symb},
    lsolve, lu, sqr, usolve,
};

use super::{PatternKey, Solve};

/// Sparse LU from `rsparse` with a cached column ordering.
#[derive(Default)]
pub struct RSparseSolver {
    x: Vec<f64>,
    symbolic: Option<Symb>,
    pattern: PatternKey,
}

#[allow(non_snake_case)]
impl Solve for RSparseSolver {
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
        let a = data::Sprs {
            m: n,
            n,
            i: Ai.to_vec(),
            p: Ap.iter().map(|&v| v as isize).collect(),
            x: Ax.to_vec(),
            nzmax: Ax.len(),
        };
        if self.symbolic.is_none() || !self.pattern.matches(Ap, Ai) {
            // natural ordering below three columns, AMD underflows on n < 2
            let order = if n > 2 { 1 } else { -1 };
            self.symbolic = Some(sqr(&a, order, false));
            self.pattern = PatternKey::new(Ap, Ai);
        }
        self.x.resize(n, 0.0);
        let s = self.symbolic.as_mut().ok_or("missing symbolic analysis")?;
        let num = lu(&a, s, 1e-6).map_err(|_| "LU factorization failed")?;
        ipvec(&num.pinv, b, &mut self.x); // x = P*b
        lsolve(&num.l, &mut self.x); // x = L\x
        usolve(&num.u, &mut self.x); // x = U\x
        ipvec(&s.q, &self.x, b); // b = Q*x
        Ok(())
    }

    fn reset(&mut self) {
        self.symbolic = None;
        self.pattern = PatternKey::default();
    }
}

fn ipvec<T: Numeric<T>>(p: &Option<Vec<isize>>, b: &[T], x: &mut [T]) {
    match p {
        Some(perm) => perm.iter().zip(b).for_each(|(&k, &v)| x[k as usize] = v),
        None => x.copy_from_slice(b),
    }
}
