use nalgebra::{Complex, DVector};

use super::{MethodKind, MethodOutcome, PowerFlowMethod};
use crate::basic::{
    bus_types::BusType,
    formulation::{IslandSystem, SolverState, without_controls},
    solver::{DefaultSolver, solve_csc},
    sparse::slice::select_csc,
};

/// XB fast-decoupled load flow: alternating angle and magnitude half
/// iterations with the constant matrices `B'` and `B''`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FastDecoupled;

impl PowerFlowMethod for FastDecoupled {
    fn kind(&self) -> MethodKind {
        MethodKind::FastDecoupled
    }

    fn attempt(&self, system: &IslandSystem, state: &mut SolverState) -> MethodOutcome {
        let types = without_controls(&state.types);
        let pvpq: Vec<usize> = (0..types.len()).filter(|&i| types[i] != BusType::Slack).collect();
        let pq: Vec<usize> = (0..types.len()).filter(|&i| types[i] == BusType::Load).collect();
        let tol = system.options.tolerance;

        let adm = system.admittance(&state.taps);
        let (bp, bpp) = system.builder.fast_decoupled(&state.taps);
        let bp = select_csc(&bp, &pvpq, &pvpq);
        let bpp = select_csc(&bpp, &pq, &pq);
        let mut p_solver = DefaultSolver::default();
        let mut q_solver = DefaultSolver::default();

        let mut vm = state.vm();
        let mut va = state.va();
        let norms = |state: &SolverState, vm: &DVector<f64>| {
            let mis = system.power_mismatch(&adm.ybus, state);
            let dp = DVector::from_iterator(pvpq.len(), pvpq.iter().map(|&i| mis[i].re / vm[i]));
            let dq = DVector::from_iterator(pq.len(), pq.iter().map(|&i| mis[i].im / vm[i]));
            let norm = pvpq
                .iter()
                .map(|&i| mis[i].re.abs())
                .chain(pq.iter().map(|&i| mis[i].im.abs()))
                .fold(0.0_f64, |a, b| if b.is_finite() { a.max(b) } else { f64::INFINITY });
            (dp, dq, norm)
        };

        let (mut dp, _, mut norm) = norms(state, &vm);
        for iterations in 1..=system.options.max_iter {
            if norm < tol {
                return MethodOutcome {
                    converged: true,
                    residual: norm,
                    iterations: iterations - 1,
                };
            }
            if solve_csc(&mut p_solver, bp.clone(), &mut dp).is_err() {
                return MethodOutcome::failed(iterations);
            }
            for (k, &i) in pvpq.iter().enumerate() {
                va[i] -= dp[k];
            }
            state.v = vm.zip_map(&va, Complex::from_polar);

            let (_, mut dq, _) = norms(state, &vm);
            if solve_csc(&mut q_solver, bpp.clone(), &mut dq).is_err() {
                return MethodOutcome::failed(iterations);
            }
            for (k, &i) in pq.iter().enumerate() {
                vm[i] -= dq[k];
            }
            state.v = vm.zip_map(&va, Complex::from_polar);

            (dp, _, norm) = norms(state, &vm);
            tracing::trace!(iterations, norm, "fast decoupled iteration");
            if !norm.is_finite() {
                return MethodOutcome::failed(iterations);
            }
        }
        MethodOutcome {
            converged: norm < tol,
            residual: norm,
            iterations: system.options.max_iter,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::{
        bus_types::SupportLevel,
        methods::{newtonpf::NewtonRaphson, testing::Prepared},
        options::PowerFlowOptions,
    };
    use crate::testcases;

    #[test]
    fn test_fast_decoupled_matches_newton() {
        let opts = PowerFlowOptions {
            max_iter: 100,
            ..Default::default()
        };
        let prep = Prepared::new(testcases::five_bus(), opts);
        let sys = prep.system(SupportLevel::Full);
        let mut fd = prep.state(&sys);
        let out = FastDecoupled.attempt(&sys, &mut fd);
        assert!(out.converged, "{out:?}");
        let mut nr = prep.state(&sys);
        assert!(NewtonRaphson.attempt(&sys, &mut nr).converged);
        let diff = (fd.v - nr.v).camax();
        assert!(diff < 1e-5, "fast decoupled differs from newton by {diff}");
    }

    #[test]
    fn test_fast_decoupled_single_load_bus() {
        let opts = PowerFlowOptions {
            max_iter: 100,
            ..Default::default()
        };
        let prep = Prepared::new(testcases::two_bus(), opts);
        let sys = prep.system(SupportLevel::Full);
        let mut fd = prep.state(&sys);
        let out = FastDecoupled.attempt(&sys, &mut fd);
        assert!(out.converged, "{out:?}");
        let mut nr = prep.state(&sys);
        assert!(NewtonRaphson.attempt(&sys, &mut nr).converged);
        assert!((fd.v - nr.v).camax() < 1e-5);
    }
}
