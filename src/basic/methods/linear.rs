//! Non-iterative approximations. Both solve one sparse linear system and leave
//! the acceptance decision to the dispatcher's AC residual.

use nalgebra::{Complex, DVector};
use nalgebra_sparse::CscMatrix;

use super::{MethodKind, MethodOutcome, PowerFlowMethod};
use crate::basic::{
    bus_types::BusType,
    formulation::{IslandSystem, SolverState, without_controls},
    solver::{DefaultSolver, solve_csc},
    sparse::{conj::RealImage, slice::select_csc, stack::csc_block},
};

/// DC power flow: `P = B θ` with unit magnitudes on load buses.
#[derive(Debug, Clone, Copy, Default)]
pub struct DcLinear;

/// Linear AC power flow on the series admittances: angles and magnitude
/// deviations from a first-order expansion around the flat profile.
#[derive(Debug, Clone, Copy, Default)]
pub struct LinearAc;

struct Partition {
    pvpq: Vec<usize>,
    pq: Vec<usize>,
}

fn partition(state: &SolverState) -> Partition {
    let types = without_controls(&state.types);
    Partition {
        pvpq: (0..types.len()).filter(|&i| types[i] != BusType::Slack).collect(),
        pq: (0..types.len()).filter(|&i| types[i] == BusType::Load).collect(),
    }
}

/// Zeroes the entries of `x` at `unknown`.
fn known_only(x: &DVector<f64>, unknown: &[usize]) -> DVector<f64> {
    let mut out = x.clone();
    unknown.iter().for_each(|&i| out[i] = 0.0);
    out
}

fn gather(x: &DVector<f64>, idx: &[usize]) -> DVector<f64> {
    DVector::from_iterator(idx.len(), idx.iter().map(|&i| x[i]))
}

impl PowerFlowMethod for DcLinear {
    fn kind(&self) -> MethodKind {
        MethodKind::DcLinear
    }

    fn attempt(&self, system: &IslandSystem, state: &mut SolverState) -> MethodOutcome {
        let Partition { pvpq, pq } = partition(state);
        let bbus = system.builder.bbus();
        let va = state.va();
        let mut vm = state.vm();
        pq.iter().for_each(|&i| vm[i] = 1.0);

        let p = system.injections.specified(&state.s_spec, &vm).map(|s| s.re);
        let known = &bbus * &known_only(&va, &pvpq);
        let mut rhs = gather(&(p - known), &pvpq);
        if solve_csc(&mut DefaultSolver::default(), select_csc(&bbus, &pvpq, &pvpq), &mut rhs).is_err() {
            return MethodOutcome::failed(1);
        }
        let mut va = va;
        for (k, &i) in pvpq.iter().enumerate() {
            va[i] = rhs[k];
        }
        state.v = vm.zip_map(&va, Complex::from_polar);
        MethodOutcome {
            converged: true,
            residual: system.residual(state),
            iterations: 1,
        }
    }
}

impl PowerFlowMethod for LinearAc {
    fn kind(&self) -> MethodKind {
        MethodKind::LinearAc
    }

    fn attempt(&self, system: &IslandSystem, state: &mut SolverState) -> MethodOutcome {
        let Partition { pvpq, pq } = partition(state);
        let (g, b): (CscMatrix<f64>, CscMatrix<f64>) = system.builder.series_ybus(&state.taps).real_imag();
        let va = state.va();
        let vm = state.vm();
        let s = system.injections.specified(&state.s_spec, &DVector::from_element(vm.len(), 1.0));

        // P = G dVm - B theta, Q = -G theta - B dVm around the flat profile
        let dvm_known = known_only(&vm.map(|m| m - 1.0), &pq);
        let va_known = known_only(&va, &pvpq);
        let p_known = &g * &dvm_known - &b * &va_known;
        let q_known = -(&b * &dvm_known) - &g * &va_known;
        let rhs_p = gather(&(s.map(|x| x.re) - p_known), &pvpq);
        let rhs_q = gather(&(s.map(|x| x.im) - q_known), &pq);

        let neg = |m: CscMatrix<f64>| m * -1.0;
        let a11 = neg(select_csc(&b, &pvpq, &pvpq));
        let a12 = select_csc(&g, &pvpq, &pq);
        let a21 = neg(select_csc(&g, &pq, &pvpq));
        let a22 = neg(select_csc(&b, &pq, &pq));
        let a = csc_block(&[&[&a11, &a12], &[&a21, &a22]]);

        let mut x = DVector::from_iterator(pvpq.len() + pq.len(), rhs_p.iter().chain(rhs_q.iter()).copied());
        if solve_csc(&mut DefaultSolver::default(), a, &mut x).is_err() {
            return MethodOutcome::failed(1);
        }
        let (mut va, mut vm) = (va, vm);
        for (k, &i) in pvpq.iter().enumerate() {
            va[i] = x[k];
        }
        for (k, &i) in pq.iter().enumerate() {
            vm[i] = 1.0 + x[pvpq.len() + k];
        }
        state.v = vm.zip_map(&va, Complex::from_polar);
        MethodOutcome {
            converged: true,
            residual: system.residual(state),
            iterations: 1,
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

    fn compare(method: &dyn PowerFlowMethod, angle_tol: f64) {
        let prep = Prepared::new(testcases::five_bus(), PowerFlowOptions::default());
        let sys = prep.system(SupportLevel::Full);
        let mut approx = prep.state(&sys);
        let out = method.attempt(&sys, &mut approx);
        assert!(out.residual.is_finite(), "{:?} produced {out:?}", method.kind());
        let mut exact = prep.state(&sys);
        assert!(NewtonRaphson.attempt(&sys, &mut exact).converged);
        for i in 0..exact.v.len() {
            let d = (approx.v[i].arg() - exact.v[i].arg()).abs();
            assert!(d < angle_tol, "{:?}: angle error {d} at bus {i}", method.kind());
        }
    }

    #[test]
    fn test_dc_linear_close_to_ac() {
        compare(&DcLinear, 0.05);
    }

    #[test]
    fn test_linear_ac_close_to_ac() {
        compare(&LinearAc, 0.05);
        let prep = Prepared::new(testcases::two_bus(), PowerFlowOptions::default());
        let sys = prep.system(SupportLevel::Full);
        let mut state = prep.state(&sys);
        LinearAc.attempt(&sys, &mut state);
        let vm = state.v[1].norm();
        assert!(vm > 0.9 && vm < 1.0, "linear AC gave |V| = {vm}");
    }

    #[test]
    fn test_dc_linear_two_bus() {
        // one unknown angle: theta = P / (1/x)
        let prep = Prepared::new(testcases::two_bus(), PowerFlowOptions::default());
        let sys = prep.system(SupportLevel::Full);
        let mut state = prep.state(&sys);
        let out = DcLinear.attempt(&sys, &mut state);
        assert!(out.residual.is_finite(), "{out:?}");
        assert!((state.v[1].arg() + 0.05).abs() < 1e-12, "angle {}", state.v[1].arg());
        assert!((state.v[1].norm() - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_known_only() {
        let x = DVector::from_vec(vec![1.0, 2.0, 3.0]);
        assert_eq!(known_only(&x, &[1]), DVector::from_vec(vec![1.0, 0.0, 3.0]));
        assert_eq!(gather(&x, &[2, 0]), DVector::from_vec(vec![3.0, 1.0]));
    }
}
