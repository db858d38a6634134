//! Outer loop around a nonlinear method: reactive power limits of
//! voltage-controlled buses and distributed slack.

use nalgebra::Complex;

use super::{
    bus_types::BusType,
    formulation::{IslandSystem, SolverState},
    methods::{MethodOutcome, PowerFlowMethod},
};

/// Margin before a reactive limit counts as violated.
const Q_LIMIT_EPS: f64 = 1e-6;

/// Runs `method`, then re-runs it while limits or the slack distribution
/// change the specification, at most `max_outer_iter` times.
pub fn solve_with_outer_loop(
    method: &dyn PowerFlowMethod,
    system: &IslandSystem,
    state: &mut SolverState,
) -> MethodOutcome {
    let options = system.options;
    let mut outcome = method.attempt(system, state);
    if method.is_linear() {
        return outcome;
    }
    let mut slack_distributed = false;
    let mut total_iterations = outcome.iterations;

    for _ in 0..options.max_outer_iter {
        if !outcome.converged {
            break;
        }
        let mut changed = options.control_q && enforce_q_limits(system, state);
        if !changed && options.distributed_slack && !slack_distributed {
            changed = distribute_slack(system, state);
            slack_distributed = true;
        }
        if !changed {
            break;
        }
        state.outer_iterations += 1;
        outcome = method.attempt(system, state);
        total_iterations += outcome.iterations;
    }
    MethodOutcome {
        iterations: total_iterations,
        ..outcome
    }
}

/// Moves every VoltageControlled bus outside its reactive limits to Load,
/// with the reactive injection clamped to the violated limit. Returns whether
/// any bus was switched.
pub fn enforce_q_limits(system: &IslandSystem, state: &mut SolverState) -> bool {
    let adm = system.admittance(&state.taps);
    let scalc = system.calculated_power(&adm.ybus, &state.v);
    let inj = system.injections;
    let mut switched = false;
    for i in 0..state.types.len() {
        if state.types[i] != BusType::VoltageControlled {
            continue;
        }
        // reactive output of the regulating devices
        let q = scalc[i].im - (state.s_spec[i].im + inj.i0[i].im * state.v[i].norm());
        let limit = if q > inj.qmax[i] + Q_LIMIT_EPS {
            inj.qmax[i]
        } else if q < inj.qmin[i] - Q_LIMIT_EPS {
            inj.qmin[i]
        } else {
            continue;
        };
        tracing::debug!(bus = i, q, limit, "reactive limit reached");
        state.types[i] = BusType::Load;
        state.s_spec[i].im += limit;
        state.q_switched.push((i, limit));
        switched = true;
    }
    switched
}

/// Shares the active power picked up by the slack buses among all buses with
/// installed capacity, slack buses included, in proportion to that capacity.
/// Returns `false` when there is nothing to share.
pub fn distribute_slack(system: &IslandSystem, state: &mut SolverState) -> bool {
    let inj = system.injections;
    let total: f64 = inj.snom.iter().sum();
    if total <= 0.0 {
        return false;
    }
    let adm = system.admittance(&state.taps);
    let scalc = system.calculated_power(&adm.ybus, &state.v);
    let delta: f64 = state
        .types
        .iter()
        .enumerate()
        .filter(|(_, t)| **t == BusType::Slack)
        .map(|(i, _)| scalc[i].re - (state.s_spec[i].re + inj.i0[i].re * state.v[i].norm()))
        .sum();
    if delta.abs() < system.options.tolerance {
        return false;
    }
    for (i, share) in inj.snom.iter().map(|s| s / total).enumerate() {
        state.s_spec[i] += Complex::new(delta * share, 0.0);
    }
    tracing::debug!(delta, "slack power distributed");
    true
}
