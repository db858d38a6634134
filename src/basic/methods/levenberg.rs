use nalgebra::DVector;
use nalgebra_sparse::CscMatrix;

use super::{MethodKind, MethodOutcome, PowerFlowMethod};
use crate::basic::{
    formulation::{IndexSets, IslandSystem, SolverState, inf_norm},
    solver::{DefaultSolver, solve_csc},
    sparse::slice::diag_csc,
};

/// Damped Gauss-Newton: `(J'J + lambda I) dx = J'F`, with the damping updated
/// from the gain ratio of each step (Nielsen's rule).
#[derive(Debug, Clone, Copy, Default)]
pub struct LevenbergMarquardt;

impl PowerFlowMethod for LevenbergMarquardt {
    fn kind(&self) -> MethodKind {
        MethodKind::LevenbergMarquardt
    }

    fn supports_controls(&self) -> bool {
        true
    }

    fn attempt(&self, system: &IslandSystem, state: &mut SolverState) -> MethodOutcome {
        let sets = system.index_sets(&state.types);
        let tol = system.options.tolerance;
        let mut solver = DefaultSolver::default();

        let mut f = mismatch(system, state, &sets);
        let mut norm = inf_norm(&f);
        let mut lambda: Option<f64> = None;
        let mut nu = 2.0;

        for iterations in 1..=system.options.max_iter {
            if norm < tol {
                return MethodOutcome {
                    converged: true,
                    residual: norm,
                    iterations: iterations - 1,
                };
            }
            let jac = {
                let adm = system.admittance(&state.taps);
                system.jacobian(&adm, state, &sets)
            };
            let jt = jac.transpose();
            let jtj = &jt * &jac;
            let g = &jt * &f;
            let lam = *lambda.get_or_insert_with(|| 1e-3 * max_diagonal(&jtj).max(1e-12));

            let a = &jtj + &diag_csc(&vec![lam; jtj.nrows()]);
            let mut dx = g.clone();
            if let Err(err) = solve_csc(&mut solver, a, &mut dx) {
                tracing::debug!(%err, iterations, "singular damped system");
                return MethodOutcome::failed(iterations);
            }

            let (v0, taps0) = (state.v.clone(), state.taps.clone());
            system.apply_step(&sets, state, &dx, 1.0);
            let f_new = mismatch(system, state, &sets);

            let actual = f.norm_squared() - f_new.norm_squared();
            let predicted = dx.dot(&(&dx * lam + &g));
            let rho = if predicted > 0.0 { actual / predicted } else { -1.0 };

            if rho > 0.0 && f_new.iter().all(|v| v.is_finite()) {
                f = f_new;
                norm = inf_norm(&f);
                lambda = Some(lam * (1.0 / 3.0_f64).max(1.0 - (2.0 * rho - 1.0).powi(3)));
                nu = 2.0;
            } else {
                state.v.copy_from(&v0);
                state.taps.clone_from(&taps0);
                lambda = Some(lam * nu);
                nu *= 2.0;
            }
            tracing::trace!(iterations, norm, lambda = lam, "levenberg-marquardt iteration");
        }
        MethodOutcome {
            converged: norm < tol,
            residual: norm,
            iterations: system.options.max_iter,
        }
    }
}

fn mismatch(system: &IslandSystem, state: &SolverState, sets: &IndexSets) -> DVector<f64> {
    let adm = system.admittance(&state.taps);
    system.mismatch_vector(&adm.ybus, state, sets)
}

fn max_diagonal(m: &CscMatrix<f64>) -> f64 {
    m.triplet_iter()
        .filter(|(r, c, _)| r == c)
        .fold(0.0, |acc, (_, _, v)| acc.max(v.abs()))
}
