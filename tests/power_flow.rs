use nalgebra::{Complex, DVector};
use rustpower_islands::prelude::*;
use rustpower_islands::testcases;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Routes the engine's logs to the test output; `RUST_LOG` picks the level.
fn init_tracing() {
    let _ = tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "warn".into()))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}

fn solve_default(net: &NetworkSnapshot) -> WholeGridSolution {
    init_tracing();
    solve(net, &PowerFlowOptions::default()).expect("structurally valid network")
}

/// Appends `other` to `net` as a separate component.
fn join(mut net: NetworkSnapshot, other: NetworkSnapshot) -> NetworkSnapshot {
    let off = net.buses.len();
    net.buses.extend(other.buses);
    net.branches.extend(other.branches.into_iter().map(|mut b| {
        b.from += off;
        b.to += off;
        b
    }));
    net.generators.extend(other.generators.into_iter().map(|mut g| {
        g.bus += off;
        g
    }));
    net.loads.extend(other.loads.into_iter().map(|mut l| {
        l.bus += off;
        l
    }));
    net
}

#[test]
fn two_bus_example() {
    let net = testcases::two_bus();
    let sol = solve_default(&net);
    assert!(sol.converged);
    let vm = sol.vm()[1];
    assert!(vm > 0.9 && vm < 1.0, "|V_B| = {vm}");
    let loading = sol.sf[0].norm() * net.sbase / net.branches[0].rate;
    assert!((sol.loading[0] - loading).abs() < 1e-12);
    // the load bus draws exactly what was asked for
    assert!((sol.s[1] - Complex::new(-0.5, -0.2)).norm() < 1e-5, "S_B = {}", sol.s[1]);
    assert_eq!(sol.bus_types, vec![Some(BusType::Slack), Some(BusType::Load)]);
}

#[test]
fn fast_path_matches_sliced_path() {
    let alone = solve_default(&testcases::five_bus());
    let joined = solve_default(&join(testcases::five_bus(), testcases::two_bus()));
    assert_eq!(joined.islands.len(), 2);
    for i in 0..5 {
        assert_eq!(alone.v[i], joined.v[i], "bus {i} differs");
        assert_eq!(alone.bus_types[i], joined.bus_types[i]);
    }
    for k in 0..alone.sf.len() {
        assert_eq!(alone.sf[k], joined.sf[k], "branch {k} differs");
    }
}

#[test]
fn power_balance() {
    let net = testcases::five_bus();
    let opts = PowerFlowOptions {
        tolerance: 1e-9,
        ..Default::default()
    };
    let sol = solve(&net, &opts).unwrap();
    assert!(sol.converged);

    // without bus shunts the injections sum to the branch losses
    let injected: Complex<f64> = sol.s.sum();
    let losses = sol.total_losses();
    assert!((injected - losses).norm() < 1e-9, "{injected} vs {losses}");

    let load: f64 = net.loads.iter().map(|l| l.p).sum();
    let fixed_gen: f64 = net.generators.iter().skip(1).map(|g| g.p).sum();
    let slack = sol.s[0].re;
    assert!((slack + fixed_gen - load - losses.re).abs() < 1e-8);
}

#[test]
fn flat_start_without_injections() {
    let mut net = testcases::five_bus();
    net.loads.clear();
    net.generators.iter_mut().for_each(|g| {
        g.p = 0.0;
        g.q = 0.0;
        g.vset = 1.0;
    });
    net.branches.iter_mut().for_each(|b| b.b = 0.0);
    let sol = solve_default(&net);
    assert!(sol.converged);
    let iterations: usize = sol.islands[0].report.attempts().iter().map(|a| a.iterations).sum();
    assert!(iterations <= 2, "{iterations} iterations");
    for v in sol.v.iter() {
        assert!((v - Complex::new(1.0, 0.0)).norm() < 1e-9, "{v}");
    }
}

#[test]
fn solving_twice_is_deterministic() {
    let net = testcases::mixed_devices();
    let a = solve_default(&net);
    let b = solve_default(&net);
    assert_eq!(a.v, b.v);
    assert_eq!(a.islands[0].residual, b.islands[0].residual);
}

#[test]
fn parallel_and_sequential_agree() {
    let net = testcases::two_islands();
    let par = solve_default(&net);
    let seq = solve(
        &net,
        &PowerFlowOptions {
            parallel: false,
            ..Default::default()
        },
    )
    .unwrap();
    assert_eq!(par.v, seq.v);
    assert_eq!(par.island_of_bus, vec![Some(0), Some(0), Some(1), Some(1)]);
}

#[test]
fn island_without_slack_is_reported() {
    let sol = solve_default(&testcases::no_slack());
    assert!(!sol.converged);
    let issue = sol.diagnostics.of_kind(IssueKind::NoSlack).next().expect("no slack issue");
    assert_eq!(issue.device, DeviceRef::new(DeviceKind::Island, 1));
    assert!(sol.islands[0].converged);
    assert!(!sol.islands[1].solvable);
    assert_eq!(sol.v[2], Complex::new(0.0, 0.0));
}

#[test]
fn disabled_branch_splits_grid() {
    let mut net = testcases::two_bus();
    net.branches[0].active = false;
    let sol = solve_default(&net);
    assert_eq!(sol.islands.len(), 2);
    assert_ne!(sol.island_of_bus[0], sol.island_of_bus[1]);
    assert_eq!(sol.sf[0], Complex::new(0.0, 0.0));
    // single bus islands do not count against convergence
    assert!(sol.converged);

    let opts = PowerFlowOptions {
        ignore_single_node_islands: true,
        ..Default::default()
    };
    let sol = solve(&net, &opts).unwrap();
    assert!(sol.islands.is_empty());
    assert_eq!(sol.v, DVector::from_element(2, Complex::new(1.0, 0.0)));
    assert_eq!(sol.bus_types, vec![None, None]);
}

#[test]
fn reactive_limit_switches_bus() {
    let net = testcases::q_limited();
    let sol = solve_default(&net);
    assert!(sol.converged);
    assert_eq!(sol.bus_types[1], Some(BusType::Load));
    assert!(sol.diagnostics.has(IssueKind::ReactiveLimit));
    let load_q = net.loads[0].q;
    let gen_q = sol.s[1].im + load_q;
    assert!((gen_q - net.generators[1].qmax).abs() < 1e-5, "generator Q {gen_q}");
    assert!((sol.vm()[1] - net.generators[1].vset).abs() > 1e-4);
}

#[test]
fn reactive_limit_clamps_absorption() {
    let mut net = testcases::q_limited();
    net.generators[1] = Generator::voltage(1, 0.0, 0.95, -0.05, 1.0);
    let sol = solve_default(&net);
    assert!(sol.converged);
    assert_eq!(sol.bus_types[1], Some(BusType::Load));
    let gen_q = sol.s[1].im + net.loads[0].q;
    assert!((gen_q - net.generators[1].qmin).abs() < 1e-5, "generator Q {gen_q}");
    assert!(sol.vm()[1] > 0.951, "|V| = {}", sol.vm()[1]);
}

#[test]
fn generator_without_reactive_band_is_fixed_injection() {
    let mut net = testcases::three_bus_pv();
    net.generators[1].qmin = 0.0;
    net.generators[1].qmax = 0.0;
    let opts = PowerFlowOptions {
        control_q: false,
        ..Default::default()
    };
    let sol = solve(&net, &opts).unwrap();
    assert!(sol.converged);
    assert_eq!(sol.bus_types[1], Some(BusType::Load));
    assert!((sol.s[1] - Complex::new(0.3, 0.0)).norm() < 1e-5, "S = {}", sol.s[1]);
    assert!((sol.vm()[1] - 1.02).abs() > 1e-3);
}

#[test]
fn zero_tap_module_is_reported() {
    let mut net = testcases::two_bus();
    net.branches[0].tap_module = 0.0;
    let sol = solve_default(&net);
    assert!(sol.converged);
    assert!(sol.diagnostics.has(IssueKind::ZeroTapModule));
    assert!(sol.sf.iter().all(|s| s.re.is_finite() && s.im.is_finite()));
    assert_eq!(sol.v, solve_default(&testcases::two_bus()).v);

    let abort = PowerFlowOptions {
        zero_impedance_policy: ZeroImpedancePolicy::Abort,
        ..Default::default()
    };
    let sol = solve(&net, &abort).unwrap();
    assert!(!sol.converged);
    assert!(!sol.islands[0].solvable);
}

#[test]
fn regulating_tap_holds_voltage() {
    let net = testcases::tap_controlled();
    let sol = solve_default(&net);
    assert!(sol.converged);
    assert_eq!(sol.islands[0].level, Some(SupportLevel::Full));
    assert!((sol.vm()[2] - 1.0).abs() < 1e-6, "|V| = {}", sol.vm()[2]);
    assert!(sol.taps[1] != 1.0);
    assert!(!sol.diagnostics.has(IssueKind::TapOutOfRange));

    let frozen = solve(
        &net,
        &PowerFlowOptions {
            control_taps: false,
            ..Default::default()
        },
    )
    .unwrap();
    assert!(frozen.converged);
    assert_eq!(frozen.taps[1], 1.0);
}

#[test]
fn hvdc_link_moves_power_between_islands() {
    let mut net = testcases::two_islands();
    net.hvdc_links.push(HvdcLink::new(1, 2, 0.2));
    let sol = solve_default(&net);
    assert!(sol.converged);
    assert_eq!(sol.hvdc_p, vec![0.2]);
    // bus 1 now also feeds the converter
    assert!((sol.s[1].re + 0.5).abs() < 1e-5, "P1 = {}", sol.s[1].re);

    net.hvdc_links[0].angle_droop = 1.0;
    let sol = solve_default(&net);
    assert!(sol.converged);
    let pf = sol.hvdc_p[0];
    assert!(pf < 0.19 && pf > 0.0, "droop flow {pf}");
}

#[test]
fn injection_override() {
    let net = testcases::three_bus_pv();
    let o = InjectionOverride {
        generator_p: Some(vec![0.0, 0.7]),
        battery_p: None,
    };
    let sol = solve_with_override(&net, &PowerFlowOptions::default(), &o).unwrap();
    assert!(sol.converged);
    assert!((sol.s[1].re - 0.7).abs() < 1e-5);
}

#[test]
fn auto_promoted_slack() {
    let mut net = testcases::three_bus_pv();
    net.generators.remove(0);
    assert!(!solve_default(&net).converged);

    let opts = PowerFlowOptions {
        auto_promote_slack: true,
        ..Default::default()
    };
    let sol = solve(&net, &opts).unwrap();
    assert!(sol.converged);
    assert_eq!(sol.bus_types[1], Some(BusType::Slack));
    assert!(sol.diagnostics.has(IssueKind::SlackPromoted));
}

#[test]
fn every_method_solves_five_bus() {
    let reference = solve_default(&testcases::five_bus());
    for method in [
        MethodKind::Iwamoto,
        MethodKind::LevenbergMarquardt,
        MethodKind::FastDecoupled,
        MethodKind::GaussSeidel,
    ] {
        let opts = PowerFlowOptions {
            max_iter: 200,
            ..Default::default()
        }
        .with_method(method)
        .without_retry();
        let sol = solve(&testcases::five_bus(), &opts).unwrap();
        assert!(sol.converged, "{method} did not converge");
        assert_eq!(sol.islands[0].method, Some(method));
        let diff = (&sol.v - &reference.v).camax();
        assert!(diff < 1e-4, "{method} differs by {diff}");
    }
}

#[test]
fn result_tables() {
    let net = testcases::two_bus();
    let sol = solve_default(&net);
    let buses = sol.bus_table();
    assert_eq!(buses.lines().count(), 2 + net.buses.len());
    let branches = sol.branch_table(&net);
    assert!(branches.contains("loading_percent"));
}
