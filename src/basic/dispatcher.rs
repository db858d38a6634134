//! Quality-based selection between power flow methods for one island.

use std::time::{Duration, Instant};

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use super::{
    bus_types::SupportLevel,
    diagnostics::{DeviceKind, DeviceRef, Diagnostics, IssueKind, Severity},
    formulation::{IslandSystem, SolverState},
    methods::MethodKind,
    qlimits::solve_with_outer_loop,
};

/// Residual below which a nonlinear attempt may replace the current best one,
/// whatever the configured tolerance.
pub const ACCEPTABLE_RESIDUAL: f64 = 0.1;

/// One method run, accepted or not.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverAttempt {
    pub method: MethodKind,
    pub level: SupportLevel,
    pub converged: bool,
    pub residual: f64,
    pub iterations: usize,
    pub elapsed: Duration,
    /// Whether this attempt became the island's best solution.
    pub accepted: bool,
}

/// Append-only log of the attempts made on one island.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConvergenceReport {
    attempts: Vec<SolverAttempt>,
}

impl ConvergenceReport {
    pub fn push(&mut self, attempt: SolverAttempt) {
        self.attempts.push(attempt);
    }

    pub fn extend(&mut self, other: ConvergenceReport) {
        self.attempts.extend(other.attempts);
    }

    pub fn attempts(&self) -> &[SolverAttempt] {
        &self.attempts
    }

    pub fn converged(&self) -> bool {
        self.attempts.iter().any(|a| a.accepted && a.converged)
    }

    pub fn best_residual(&self) -> Option<f64> {
        self.attempts
            .iter()
            .filter(|a| a.accepted)
            .map(|a| OrderedFloat(a.residual))
            .min()
            .map(|r| r.0)
    }

    pub fn elapsed(&self) -> Duration {
        self.attempts.iter().map(|a| a.elapsed).sum()
    }
}

/// Best state found by [`dispatch`].
#[derive(Debug, Clone)]
pub struct DispatchResult {
    pub state: SolverState,
    pub converged: bool,
    pub residual: f64,
    pub method: Option<MethodKind>,
    pub level: SupportLevel,
    pub report: ConvergenceReport,
}

impl DispatchResult {
    /// Ordering key: converged first, then lower residual.
    pub fn quality(&self) -> (bool, OrderedFloat<f64>) {
        (self.converged, OrderedFloat(-self.residual))
    }
}

/// Tries the configured methods in order and keeps the best acceptable result.
///
/// Every attempt starts from `initial`. A linear method is accepted whenever it
/// improves the residual; a nonlinear one only if its residual is also below
/// [`ACCEPTABLE_RESIDUAL`]. The loop stops at the first converged best.
/// Methods without control support are left to the limited tier when the
/// system carries regulating taps or PartialP buses.
///
/// With no accepted attempt the result is `initial`, reported with its own
/// residual so that state and residual always describe the same point.
pub fn dispatch(
    system: &IslandSystem,
    initial: &SolverState,
    island: usize,
    diagnostics: &mut Diagnostics,
) -> DispatchResult {
    let options = system.options;
    let tol = options.tolerance;
    let mut report = ConvergenceReport::default();
    let mut best: Option<(SolverState, f64, MethodKind)> = None;
    let mut best_residual = f64::INFINITY;

    let controlled = system.has_controls();
    for kind in options.method_sequence() {
        let method = kind.method();
        if controlled && !method.supports_controls() {
            tracing::debug!(method = %kind, level = %system.level, "method skipped, controls not supported");
            continue;
        }
        let mut state = initial.clone();
        let start = Instant::now();
        let outcome = solve_with_outer_loop(method.as_ref(), system, &mut state);
        let elapsed = start.elapsed();

        let residual = system.residual(&state);
        let converged = residual < tol;
        let improves = residual < best_residual;
        let accepted = improves && (method.is_linear() || residual < ACCEPTABLE_RESIDUAL);
        tracing::debug!(
            method = %kind,
            level = %system.level,
            iterations = outcome.iterations,
            residual,
            accepted,
            "power flow attempt"
        );
        if improves && !accepted {
            diagnostics.report_value(
                Severity::Info,
                IssueKind::RejectedSolution,
                DeviceRef::new(DeviceKind::Island, island),
                residual,
                Some(ACCEPTABLE_RESIDUAL),
            );
        }
        report.push(SolverAttempt {
            method: kind,
            level: system.level,
            converged,
            residual,
            iterations: outcome.iterations,
            elapsed,
            accepted,
        });
        if accepted {
            best_residual = residual;
            best = Some((state, residual, kind));
            if converged {
                break;
            }
        }
    }

    match best {
        Some((state, residual, method)) => DispatchResult {
            state,
            converged: residual < tol,
            residual,
            method: Some(method),
            level: system.level,
            report,
        },
        None => DispatchResult {
            residual: system.residual(initial),
            state: initial.clone(),
            converged: false,
            method: None,
            level: system.level,
            report,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::{methods::testing::Prepared, options::PowerFlowOptions};
    use crate::testcases;

    #[test]
    fn test_primary_method_converges_first() {
        let prep = Prepared::new(testcases::five_bus(), PowerFlowOptions::default());
        let sys = prep.system(SupportLevel::Full);
        let init = prep.state(&sys);
        let mut diag = Diagnostics::new();
        let res = dispatch(&sys, &init, 0, &mut diag);
        assert!(res.converged);
        assert_eq!(res.method, Some(MethodKind::NewtonRaphson));
        assert_eq!(res.report.attempts().len(), 1);
        assert!(res.report.converged());
    }

    #[test]
    fn test_failed_primary_falls_back() {
        // a single iteration is not enough for the five bus case
        let opts = PowerFlowOptions {
            max_iter: 1,
            tolerance: 1e-10,
            ..Default::default()
        }
        .with_method(MethodKind::DcLinear);
        let prep = Prepared::new(testcases::five_bus(), opts);
        let sys = prep.system(SupportLevel::Full);
        let init = prep.state(&sys);
        let mut diag = Diagnostics::new();
        let res = dispatch(&sys, &init, 0, &mut diag);
        let attempts = res.report.attempts();
        assert_eq!(attempts[0].method, MethodKind::DcLinear);
        assert!(attempts[0].accepted, "an improving linear result is always accepted");
        assert_eq!(
            attempts.iter().map(|a| a.method).collect::<Vec<_>>(),
            opts_sequence(&sys)
        );
        assert!(!res.converged);
        assert_eq!(res.report.best_residual(), Some(res.residual));
    }

    fn opts_sequence(sys: &IslandSystem) -> Vec<MethodKind> {
        sys.options.method_sequence()
    }

    #[test]
    fn test_controlled_system_skips_uncontrolled_methods() {
        let opts = PowerFlowOptions {
            solver_order: vec![MethodKind::FastDecoupled, MethodKind::GaussSeidel, MethodKind::NewtonRaphson],
            ..Default::default()
        }
        .without_retry();
        let prep = Prepared::new(testcases::tap_controlled(), opts);
        let full = prep.system(SupportLevel::Full);
        assert!(full.has_controls());
        let mut diag = Diagnostics::new();
        let res = dispatch(&full, &prep.state(&full), 0, &mut diag);
        let methods: Vec<MethodKind> = res.report.attempts().iter().map(|a| a.method).collect();
        assert_eq!(methods, vec![MethodKind::NewtonRaphson]);
        assert!(res.converged);

        let limited = prep.system(SupportLevel::Limited);
        assert!(!limited.has_controls());
        let res = dispatch(&limited, &prep.state(&limited), 0, &mut diag);
        assert_eq!(res.report.attempts()[0].method, MethodKind::FastDecoupled);
    }

    #[test]
    fn test_no_acceptable_method_keeps_initial_state() {
        let opts = PowerFlowOptions {
            max_iter: 0,
            ..Default::default()
        }
        .without_retry();
        let prep = Prepared::new(testcases::five_bus(), opts);
        let sys = prep.system(SupportLevel::Full);
        let init = prep.state(&sys);
        let mut diag = Diagnostics::new();
        let res = dispatch(&sys, &init, 0, &mut diag);
        assert!(!res.converged);
        assert_eq!(res.method, None);
        assert_eq!(res.state, init);
        assert_eq!(res.report.attempts().len(), 1);
        assert!(!res.report.attempts()[0].accepted);
        assert_eq!(res.residual, sys.residual(&init));
    }
}
