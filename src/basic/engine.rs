//! Entry points: partition, solve every island, stitch.

use nalgebra::DVector;
use num_complex::Complex64;

use super::{
    admittance::AdmittanceBuilder,
    bus_types::{BusClassification, SupportLevel, TapControl, classify},
    diagnostics::{DeviceKind, DeviceRef, Diagnostics, IssueKind, Severity},
    dispatcher::{ConvergenceReport, dispatch},
    error::PowerFlowError,
    formulation::IslandSystem,
    hvdc::{HVDC_TOLERANCE, has_droop, hvdc_flows, hvdc_injections},
    injections::{BusInjections, InjectionOverride},
    options::PowerFlowOptions,
    post_processing::{BranchFlows, IslandSolution, WholeGridSolution},
    snapshot::NetworkSnapshot,
    topology::{Island, Partition, partition},
};

/// Solves the snapshot with the device set-points it carries.
///
/// Only structural problems with the snapshot are returned as `Err`; data
/// issues and non-convergence are reported inside the solution.
pub fn solve(snapshot: &NetworkSnapshot, options: &PowerFlowOptions) -> Result<WholeGridSolution, PowerFlowError> {
    run(snapshot, options, None, None)
}

/// Solves with externally computed active power set-points for generators
/// and batteries.
pub fn solve_with_override(
    snapshot: &NetworkSnapshot,
    options: &PowerFlowOptions,
    overrides: &InjectionOverride,
) -> Result<WholeGridSolution, PowerFlowError> {
    overrides.validate(snapshot)?;
    run(snapshot, options, Some(overrides), None)
}

/// Solves starting from `guess` when `initialize_with_existing_solution` is
/// set, from the snapshot's initial voltages otherwise.
pub fn solve_with_guess(
    snapshot: &NetworkSnapshot,
    options: &PowerFlowOptions,
    guess: &DVector<Complex64>,
) -> Result<WholeGridSolution, PowerFlowError> {
    if guess.len() != snapshot.n_bus() {
        return Err(PowerFlowError::LengthMismatch {
            what: "voltage guess",
            expected: snapshot.n_bus(),
            found: guess.len(),
        });
    }
    let guess = options.initialize_with_existing_solution.then_some(guess);
    run(snapshot, options, None, guess)
}

fn run(
    snapshot: &NetworkSnapshot,
    options: &PowerFlowOptions,
    overrides: Option<&InjectionOverride>,
    guess: Option<&DVector<Complex64>>,
) -> Result<WholeGridSolution, PowerFlowError> {
    snapshot.validate()?;
    let part = partition(snapshot, options);
    if !part.discarded.is_empty() {
        tracing::debug!(buses = ?part.discarded, "single-node islands ignored");
    }

    let mut flows = hvdc_flows(snapshot, None);
    let (mut islands, mut diagnostics) = solve_islands(snapshot, &part, options, overrides, guess, &flows);

    if has_droop(snapshot) {
        let v = WholeGridSolution::stitch(snapshot, islands.clone(), Vec::new(), Diagnostics::new()).v;
        let updated = hvdc_flows(snapshot, Some(&v));
        let change = updated.iter().zip(&flows).fold(0.0_f64, |acc, (a, b)| acc.max((a - b).abs()));
        if change > HVDC_TOLERANCE {
            tracing::debug!(change, "HVDC flows moved, solving again");
            flows = updated;
            (islands, diagnostics) = solve_islands(snapshot, &part, options, overrides, Some(&v), &flows);
        }
    }

    let solution = WholeGridSolution::stitch(snapshot, islands, flows, diagnostics);
    if !solution.converged {
        tracing::warn!("power flow did not converge in every island");
    }
    Ok(solution)
}

fn solve_islands(
    snapshot: &NetworkSnapshot,
    part: &Partition,
    options: &PowerFlowOptions,
    overrides: Option<&InjectionOverride>,
    guess: Option<&DVector<Complex64>>,
    hvdc: &[f64],
) -> (Vec<IslandSolution>, Diagnostics) {
    let external = (!snapshot.hvdc_links.is_empty()).then(|| hvdc_injections(snapshot, hvdc));
    let solve_one = |island: &Island| solve_island(island, options, overrides, guess, external.as_deref());

    #[cfg(feature = "parallel")]
    let results: Vec<(IslandSolution, Diagnostics)> = if options.parallel && part.islands.len() > 1 {
        use rayon::prelude::*;
        part.islands.par_iter().map(solve_one).collect()
    } else {
        part.islands.iter().map(solve_one).collect()
    };
    #[cfg(not(feature = "parallel"))]
    let results: Vec<(IslandSolution, Diagnostics)> = part.islands.iter().map(solve_one).collect();

    let mut diagnostics = Diagnostics::new();
    let islands = results
        .into_iter()
        .map(|(sol, diag)| {
            diagnostics.extend(diag);
            sol
        })
        .collect();
    (islands, diagnostics)
}

/// Solves one island: full support first, then the limited tier when the
/// island has controls and the first tier did not converge.
fn solve_island(
    island: &Island,
    options: &PowerFlowOptions,
    overrides: Option<&InjectionOverride>,
    guess: Option<&DVector<Complex64>>,
    external: Option<&[f64]>,
) -> (IslandSolution, Diagnostics) {
    let _span = tracing::info_span!("island", index = island.index, buses = island.n_bus()).entered();
    let mut diag = Diagnostics::new();
    for &k in &island.detached_controls {
        diag.report(Severity::Warning, IssueKind::ControlOutsideIsland, DeviceRef::new(DeviceKind::Branch, k));
    }

    let data = &*island.data;
    let builder = AdmittanceBuilder::new(island, options, &mut diag);
    let injections = BusInjections::compute(island, overrides, external);
    let classification = classify(island, SupportLevel::Full, options, &mut diag);
    if builder.unsolvable || !classification.has_slack() {
        return (unsolvable(island, &builder, classification), diag);
    }

    let local_guess: Option<Vec<Complex64>> = guess.map(|g| island.buses.globals().iter().map(|&i| g[i]).collect());
    let full = IslandSystem::new(&builder, &injections, classification, SupportLevel::Full, options);
    let init = full.initial_state(data, local_guess.as_deref());
    let mut result = dispatch(&full, &init, island.index, &mut diag);

    if !result.converged && full.has_controls() {
        tracing::debug!(residual = result.residual, "retrying with controls frozen");
        // the classification issues were already reported by the full tier
        let classification = classify(island, SupportLevel::Limited, options, &mut Diagnostics::new());
        let limited = IslandSystem::new(&builder, &injections, classification, SupportLevel::Limited, options);
        let init = limited.initial_state(data, local_guess.as_deref());
        let second = dispatch(&limited, &init, island.index, &mut diag);
        let mut report = result.report.clone();
        report.extend(second.report.clone());
        if second.quality() > result.quality() {
            result = second;
        }
        result.report = report;
    }

    if !result.converged {
        diag.report_value(
            Severity::Warning,
            IssueKind::NotConverged,
            DeviceRef::new(DeviceKind::Island, island.index),
            result.residual,
            Some(options.tolerance),
        );
    }
    for &(bus, limit) in &result.state.q_switched {
        diag.report_value(
            Severity::Info,
            IssueKind::ReactiveLimit,
            DeviceRef::new(DeviceKind::Bus, island.buses.global(bus)),
            limit,
            None,
        );
    }
    if result.level == SupportLevel::Full {
        report_taps(island, &full.classification.controls, &result.state.taps, &mut diag);
    }

    let adm = builder.build(&result.state.taps);
    let s = full.calculated_power(&adm.ybus, &result.state.v);
    let rates: Vec<f64> = data.branches.iter().map(|b| b.rate).collect();
    let flows = BranchFlows::compute(&adm, &result.state.v, &rates, data.sbase);
    let solution = IslandSolution {
        index: island.index,
        buses: island.buses.globals().to_vec(),
        branches: island.branches.globals().to_vec(),
        solvable: true,
        converged: result.converged,
        residual: result.residual,
        method: result.method,
        level: Some(result.level),
        bus_types: result.state.types,
        v: result.state.v,
        s,
        taps: result.state.taps,
        flows,
        report: result.report,
    };
    (solution, diag)
}

fn report_taps(island: &Island, controls: &[TapControl], taps: &[f64], diag: &mut Diagnostics) {
    for c in controls {
        let m = taps[c.branch];
        if m < c.m_min || m > c.m_max {
            let expected = if m < c.m_min { c.m_min } else { c.m_max };
            diag.report_value(
                Severity::Warning,
                IssueKind::TapOutOfRange,
                DeviceRef::new(DeviceKind::Branch, island.branches.global(c.branch)),
                m,
                Some(expected),
            );
        }
    }
}

/// Result of an island that cannot be solved: zero voltage, no attempts.
fn unsolvable(island: &Island, builder: &AdmittanceBuilder, classification: BusClassification) -> IslandSolution {
    let zero = DVector::from_element(island.n_bus(), Complex64::new(0.0, 0.0));
    IslandSolution {
        index: island.index,
        buses: island.buses.globals().to_vec(),
        branches: island.branches.globals().to_vec(),
        solvable: false,
        converged: false,
        residual: f64::INFINITY,
        method: None,
        level: None,
        bus_types: classification.types,
        v: zero.clone(),
        s: zero,
        taps: builder.base_taps().to_vec(),
        flows: BranchFlows::zeros(island.n_branch()),
        report: ConvergenceReport::default(),
    }
}
