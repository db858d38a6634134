use nalgebra::DVector;

use super::{MethodKind, MethodOutcome, PowerFlowMethod};
use crate::basic::{
    formulation::{IndexSets, IslandSystem, SolverState, inf_norm},
    solver::{DefaultSolver, Solve, solve_csc},
};

/// Step halvings tried before the smallest step is taken anyway.
const MAX_BACKTRACK: usize = 10;

/// Full Newton-Raphson with a backtracking line search.
#[derive(Debug, Clone, Copy, Default)]
pub struct NewtonRaphson;

/// Newton-Raphson with the Iwamoto optimal step multiplier.
#[derive(Debug, Clone, Copy, Default)]
pub struct Iwamoto;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepRule {
    LineSearch,
    OptimalMultiplier,
}

impl PowerFlowMethod for NewtonRaphson {
    fn kind(&self) -> MethodKind {
        MethodKind::NewtonRaphson
    }

    fn supports_controls(&self) -> bool {
        true
    }

    fn attempt(&self, system: &IslandSystem, state: &mut SolverState) -> MethodOutcome {
        newton_pf(system, state, StepRule::LineSearch, &mut DefaultSolver::default())
    }
}

impl PowerFlowMethod for Iwamoto {
    fn kind(&self) -> MethodKind {
        MethodKind::Iwamoto
    }

    fn supports_controls(&self) -> bool {
        true
    }

    fn attempt(&self, system: &IslandSystem, state: &mut SolverState) -> MethodOutcome {
        newton_pf(system, state, StepRule::OptimalMultiplier, &mut DefaultSolver::default())
    }
}

/// Solves the island equations with Newton's method.
///
/// # Arguments
///
/// * `system` - Equations of the island.
/// * `state` - Initial guess, overwritten with the last iterate.
/// * `rule` - How the length of each Newton step is chosen.
/// * `solver` - Sparse LU backend; its symbolic analysis is reused while the
///   Jacobian pattern stays the same.
pub fn newton_pf<S: Solve>(
    system: &IslandSystem,
    state: &mut SolverState,
    rule: StepRule,
    solver: &mut S,
) -> MethodOutcome {
    let sets = system.index_sets(&state.types);
    let tol = system.options.tolerance;

    let mut f = mismatch(system, state, &sets);
    let mut norm = inf_norm(&f);
    if norm < tol {
        return MethodOutcome {
            converged: true,
            residual: norm,
            iterations: 0,
        };
    }

    for iterations in 1..=system.options.max_iter {
        let jacobian = {
            let adm = system.admittance(&state.taps);
            system.jacobian(&adm, state, &sets)
        };
        let mut dx = f.clone();
        if let Err(err) = solve_csc(solver, jacobian, &mut dx) {
            tracing::debug!(%err, iterations, "singular Newton step");
            return MethodOutcome::failed(iterations);
        }

        let (v0, taps0) = (state.v.clone(), state.taps.clone());
        match rule {
            StepRule::LineSearch => {
                let mut scale = 1.0;
                for tries in 0..=MAX_BACKTRACK {
                    system.apply_step(&sets, state, &dx, scale);
                    f = mismatch(system, state, &sets);
                    if inf_norm(&f) < norm || tries == MAX_BACKTRACK {
                        break;
                    }
                    state.v.copy_from(&v0);
                    state.taps.clone_from(&taps0);
                    scale *= 0.5;
                }
            }
            StepRule::OptimalMultiplier => {
                system.apply_step(&sets, state, &dx, 1.0);
                let full = mismatch(system, state, &sets);
                state.v.copy_from(&v0);
                state.taps.clone_from(&taps0);
                let mu = optimal_multiplier(&f, &full);
                system.apply_step(&sets, state, &dx, mu);
                f = mismatch(system, state, &sets);
            }
        }

        norm = inf_norm(&f);
        tracing::trace!(iterations, norm, "newton iteration");
        if norm < tol {
            return MethodOutcome {
                converged: true,
                residual: norm,
                iterations,
            };
        }
        if !norm.is_finite() {
            return MethodOutcome::failed(iterations);
        }
    }
    MethodOutcome {
        converged: false,
        residual: norm,
        iterations: system.options.max_iter,
    }
}

#[inline(always)]
fn mismatch(system: &IslandSystem, state: &SolverState, sets: &IndexSets) -> DVector<f64> {
    let adm = system.admittance(&state.taps);
    system.mismatch_vector(&adm.ybus, state, sets)
}

/// Step multiplier minimizing `|a + mu b + mu^2 c|^2` with `b = -a`, where `a`
/// is the mismatch before the step and `c` the mismatch after the full step.
///
/// S. Iwamoto, Y. Tamura, "A Load Flow Calculation Method for Ill-Conditioned
/// Power Systems", IEEE Trans. PAS-100, 1981.
fn optimal_multiplier(a: &DVector<f64>, c: &DVector<f64>) -> f64 {
    let b = -a;
    let g0 = a.dot(&b);
    let g1 = b.dot(&b) + 2.0 * a.dot(c);
    let g2 = 3.0 * b.dot(c);
    let g3 = 2.0 * c.dot(c);

    let mut mu = 1.0_f64;
    for _ in 0..20 {
        let g = g0 + mu * (g1 + mu * (g2 + mu * g3));
        let dg = g1 + mu * (2.0 * g2 + 3.0 * mu * g3);
        if dg.abs() < 1e-14 {
            break;
        }
        let next = mu - g / dg;
        let done = (next - mu).abs() < 1e-10;
        mu = next;
        if done {
            break;
        }
    }
    if mu.is_finite() { mu.clamp(0.05, 1.0) } else { 1.0 }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::{bus_types::SupportLevel, methods::testing::Prepared, options::PowerFlowOptions};
    use crate::testcases;

    #[test]
    fn test_two_bus() {
        let prep = Prepared::new(testcases::two_bus(), PowerFlowOptions::default());
        let sys = prep.system(SupportLevel::Full);
        let mut state = prep.state(&sys);
        let out = NewtonRaphson.attempt(&sys, &mut state);
        assert!(out.converged, "two bus case did not converge: {out:?}");
        assert!(out.iterations <= 5, "took {} iterations", out.iterations);
        let vm = state.v[1].norm();
        assert!(vm > 0.9 && vm < 1.0, "unexpected |V| {vm}");
        assert!(sys.residual(&state) < 1e-6);
    }

    #[test]
    fn test_flat_network_needs_no_iteration() {
        let mut net = testcases::five_bus();
        net.loads.clear();
        net.generators.iter_mut().for_each(|g| {
            g.p = 0.0;
            g.q = 0.0;
            g.vset = 1.0;
        });
        net.branches.iter_mut().for_each(|b| b.b = 0.0);
        let prep = Prepared::new(net, PowerFlowOptions::default());
        let sys = prep.system(SupportLevel::Full);
        let mut state = prep.state(&sys);
        let out = NewtonRaphson.attempt(&sys, &mut state);
        assert!(out.converged && out.iterations <= 2, "{out:?}");
        for v in state.v.iter() {
            assert!((v.norm() - 1.0).abs() < 1e-9 && v.arg().abs() < 1e-9, "voltage moved to {v}");
        }
    }

    #[test]
    fn test_five_bus_newton_and_iwamoto_agree() {
        let prep = Prepared::new(testcases::five_bus(), PowerFlowOptions::default());
        let sys = prep.system(SupportLevel::Full);
        let mut nr = prep.state(&sys);
        let out = NewtonRaphson.attempt(&sys, &mut nr);
        assert!(out.converged, "newton: {out:?}");
        let mut iw = prep.state(&sys);
        let out = Iwamoto.attempt(&sys, &mut iw);
        assert!(out.converged, "iwamoto: {out:?}");
        let diff = (nr.v - iw.v).camax();
        assert!(diff < 1e-5, "solutions differ by {diff}");
    }

    #[test]
    fn test_regulating_tap() {
        let prep = Prepared::new(testcases::tap_controlled(), PowerFlowOptions::default());
        let sys = prep.system(SupportLevel::Full);
        let ctrl = sys.classification.controls[0];
        let mut state = prep.state(&sys);
        let out = NewtonRaphson.attempt(&sys, &mut state);
        assert!(out.converged, "{out:?}");
        assert!((state.v[ctrl.bus].norm() - ctrl.vset).abs() < 1e-9);
        assert!(state.taps[ctrl.branch] != prep.builder.base_taps()[ctrl.branch]);
    }

    #[test]
    fn test_optimal_multiplier() {
        // a linear problem lands exactly after the full step
        let a = DVector::from_vec(vec![1.0, -2.0]);
        let c = DVector::zeros(2);
        assert!((optimal_multiplier(&a, &c) - 1.0).abs() < 1e-12);
        // overshooting steps are shortened
        let c = DVector::from_vec(vec![2.0, -4.0]);
        let mu = optimal_multiplier(&a, &c);
        assert!(mu < 1.0 && mu > 0.05, "mu = {mu}");
    }
}
