use derive_more::Display;
use num_derive::FromPrimitive;
use num_traits::FromPrimitive;
use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};

use super::{
    diagnostics::{DeviceKind, DeviceRef, Diagnostics, IssueKind, Severity},
    options::PowerFlowOptions,
    snapshot::{BranchControl, BranchKind, ControlMode},
    topology::Island,
};

/// Control role of a bus. The discriminants are the usual numeric codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, FromPrimitive, Serialize, Deserialize)]
pub enum BusType {
    /// PQ: fixed injection, unknown voltage.
    Load = 1,
    /// PV: fixed P and |V|, unknown Q and angle.
    VoltageControlled = 2,
    /// Fixed |V| and angle.
    Slack = 3,
    /// P and Q fixed, |V| fixed by a branch whose tap module is the extra unknown.
    MixedPQV = 4,
    /// Only the active power balance is enforced; |V| unknown, angle fixed.
    PartialP = 5,
}

impl BusType {
    pub fn from_code(code: u8) -> Option<Self> {
        Self::from_u8(code)
    }

    pub fn code(self) -> u8 {
        self as u8
    }
}

/// Which device features the dispatcher models for an island.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum SupportLevel {
    /// Regulating branches and DC buses handled as controls.
    Full,
    /// Controls frozen at their set-points, HVDC as external power.
    Limited,
}

/// A branch whose tap module regulates the voltage of `bus` (island-local indices).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TapControl {
    pub branch: usize,
    pub bus: usize,
    pub vset: f64,
    pub m_min: f64,
    pub m_max: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BusClassification {
    pub types: Vec<BusType>,
    /// Voltage magnitude set-point of every bus that has one.
    pub vset: Vec<Option<f64>>,
    pub controls: Vec<TapControl>,
}

impl BusClassification {
    pub fn indices(&self, kind: BusType) -> Vec<usize> {
        self.types
            .iter()
            .enumerate()
            .filter_map(|(i, t)| (*t == kind).then_some(i))
            .collect()
    }

    pub fn has_slack(&self) -> bool {
        self.types.contains(&BusType::Slack)
    }
}

const SET_POINT_EPS: f64 = 1e-9;

/// Records `v` as the set-point of `bus` unless one is already there; a
/// different existing value is reported and kept.
fn claim_set_point(
    vset: &mut [Option<f64>],
    bus: usize,
    v: f64,
    device: DeviceRef,
    diagnostics: &mut Diagnostics,
) {
    match vset[bus] {
        None => vset[bus] = Some(v),
        Some(first) if (first - v).abs() > SET_POINT_EPS => {
            diagnostics.report_value(Severity::Error, IssueKind::ConflictingSetPoint, device, v, Some(first))
        }
        Some(_) => {}
    }
}

/// Assigns a role to every bus of the island.
///
/// Precedence: reference devices make a bus Slack; voltage-regulating
/// generators and batteries make it VoltageControlled; everything else is Load.
/// At [`SupportLevel::Full`], buses regulated by a branch become MixedPQV and
/// DC load buses become PartialP.
pub fn classify(
    island: &Island,
    level: SupportLevel,
    options: &PowerFlowOptions,
    diagnostics: &mut Diagnostics,
) -> BusClassification {
    let data = &*island.data;
    let n = data.buses.len();
    let mut types = vec![BusType::Load; n];
    let mut vset: Vec<Option<f64>> = vec![None; n];
    let mut installed = vec![0.0; n];

    let devices = data
        .generators
        .iter()
        .enumerate()
        .map(|(i, g)| (g, DeviceRef::new(DeviceKind::Generator, island.generators.global(i))))
        .chain(
            data.batteries
                .iter()
                .enumerate()
                .map(|(i, g)| (g, DeviceRef::new(DeviceKind::Battery, island.batteries.global(i)))),
        )
        .filter(|(g, _)| g.active && data.buses[g.bus].active);

    // reference devices first so that they always win the bus
    let (refs, others): (Vec<_>, Vec<_>) = devices.partition(|(g, _)| g.mode == ControlMode::Reference);
    for (g, dev) in refs {
        types[g.bus] = BusType::Slack;
        claim_set_point(&mut vset, g.bus, g.vset, dev, diagnostics);
        installed[g.bus] += g.snom;
    }
    for (g, dev) in others {
        installed[g.bus] += g.snom;
        if !g.regulates_voltage() {
            continue;
        }
        if types[g.bus] == BusType::Load {
            types[g.bus] = BusType::VoltageControlled;
        }
        claim_set_point(&mut vset, g.bus, g.vset, dev, diagnostics);
    }

    let mut controls = Vec::new();
    if level == SupportLevel::Full && options.control_taps {
        for (k, br) in data.branches.iter().enumerate() {
            let BranchControl::VoltageModule { bus, vset: v, m_min, m_max } = br.control else {
                continue;
            };
            if !br.active || br.kind == BranchKind::DcLink {
                continue;
            }
            let dev = DeviceRef::new(DeviceKind::Branch, island.branches.global(k));
            match types[bus] {
                BusType::Load | BusType::PartialP => {
                    types[bus] = BusType::MixedPQV;
                    vset[bus] = Some(v);
                    controls.push(TapControl {
                        branch: k,
                        bus,
                        vset: v,
                        m_min,
                        m_max,
                    });
                }
                // the bus is already regulated; this branch keeps its tap
                _ => claim_set_point(&mut vset, bus, v, dev, diagnostics),
            }
        }
    }

    if level == SupportLevel::Full {
        for (i, bus) in data.buses.iter().enumerate() {
            if bus.is_dc && types[i] == BusType::Load {
                types[i] = BusType::PartialP;
            }
        }
    }

    if !types.contains(&BusType::Slack) && options.auto_promote_slack {
        let candidate = types
            .iter()
            .enumerate()
            .filter(|(_, t)| **t == BusType::VoltageControlled)
            .max_by_key(|(i, _)| (OrderedFloat(installed[*i]), std::cmp::Reverse(*i)))
            .map(|(i, _)| i);
        if let Some(i) = candidate {
            types[i] = BusType::Slack;
            diagnostics.report(
                Severity::Info,
                IssueKind::SlackPromoted,
                DeviceRef::new(DeviceKind::Bus, island.buses.global(i)),
            );
        }
    }

    if !types.contains(&BusType::Slack) {
        diagnostics.report(
            Severity::Error,
            IssueKind::NoSlack,
            DeviceRef::new(DeviceKind::Island, island.index),
        );
    }

    BusClassification { types, vset, controls }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::basic::snapshot::{Bus, Generator};
    use crate::testcases;

    fn run(net: &crate::basic::snapshot::NetworkSnapshot, level: SupportLevel) -> (BusClassification, Diagnostics) {
        let mut diag = Diagnostics::new();
        let c = classify(&Island::whole(net), level, &PowerFlowOptions::default(), &mut diag);
        (c, diag)
    }

    #[test]
    fn test_codes() {
        assert_eq!(BusType::from_code(3), Some(BusType::Slack));
        assert_eq!(BusType::from_code(9), None);
        assert_eq!(BusType::PartialP.code(), 5);
    }

    #[test]
    fn test_basic_roles() {
        let (c, diag) = run(&testcases::three_bus_pv(), SupportLevel::Full);
        assert!(diag.is_empty());
        assert_eq!(c.types, vec![BusType::Slack, BusType::VoltageControlled, BusType::Load]);
        assert_eq!(c.vset[1], Some(1.02));
        assert_eq!(c.vset[2], None);
    }

    #[test]
    fn test_slack_cannot_be_overridden() {
        let mut net = testcases::three_bus_pv();
        net.generators.push(Generator::voltage(0, 0.1, 1.0, -1.0, 1.0));
        let (c, diag) = run(&net, SupportLevel::Full);
        assert_eq!(c.types[0], BusType::Slack);
        assert!(diag.is_empty(), "same set-point must not be reported");
    }

    #[test]
    fn test_conflicting_set_points_first_wins() {
        let mut net = testcases::three_bus_pv();
        net.generators.push(Generator::voltage(1, 0.1, 1.05, -1.0, 1.0));
        let (c, diag) = run(&net, SupportLevel::Full);
        assert_eq!(c.vset[1], Some(1.02));
        let issue = diag.of_kind(IssueKind::ConflictingSetPoint).next().unwrap();
        assert_eq!(issue.device, DeviceRef::new(DeviceKind::Generator, 2));
        assert_eq!(issue.value, Some(1.05));
        assert_eq!(issue.expected, Some(1.02));
    }

    #[test]
    fn test_no_slack_reported() {
        let mut net = testcases::two_bus();
        net.generators.clear();
        let (c, diag) = run(&net, SupportLevel::Full);
        assert!(!c.has_slack());
        assert!(diag.has(IssueKind::NoSlack));
    }

    #[test]
    fn test_auto_promote_slack() {
        let mut net = testcases::three_bus_pv();
        net.generators.retain(|g| g.mode != ControlMode::Reference);
        let opts = PowerFlowOptions {
            auto_promote_slack: true,
            ..Default::default()
        };
        let mut diag = Diagnostics::new();
        let c = classify(&Island::whole(&net), SupportLevel::Full, &opts, &mut diag);
        assert_eq!(c.types[1], BusType::Slack);
        assert!(diag.has(IssueKind::SlackPromoted));
        assert!(!diag.has(IssueKind::NoSlack));
    }

    #[test]
    fn test_controls_depend_on_level() {
        let net = testcases::tap_controlled();
        let (full, _) = run(&net, SupportLevel::Full);
        assert_eq!(full.controls.len(), 1);
        let regulated = full.controls[0].bus;
        assert_eq!(full.types[regulated], BusType::MixedPQV);

        let (limited, _) = run(&net, SupportLevel::Limited);
        assert!(limited.controls.is_empty());
        assert_eq!(limited.types[regulated], BusType::Load);
    }

    #[test]
    fn test_dc_buses_partial_p() {
        let net = testcases::ac_dc();
        let (full, _) = run(&net, SupportLevel::Full);
        let (limited, _) = run(&net, SupportLevel::Limited);
        for (i, bus) in net.buses.iter().enumerate() {
            if bus.is_dc {
                assert_eq!(full.types[i], BusType::PartialP);
                assert_eq!(limited.types[i], BusType::Load);
            }
        }
    }

    #[test]
    fn test_voltage_device_needs_reactive_band() {
        let mut net = testcases::three_bus_pv();
        net.generators[1].qmin = 0.0;
        net.generators[1].qmax = 0.0;
        let (c, diag) = run(&net, SupportLevel::Full);
        assert_eq!(c.types, vec![BusType::Slack, BusType::Load, BusType::Load]);
        assert_eq!(c.vset[1], None);
        assert!(diag.is_empty());
    }

    #[test]
    fn test_inactive_generator_ignored() {
        let mut net = testcases::two_bus();
        net.buses.push(Bus::new("c", 10.0));
        net.generators.push(Generator::voltage(2, 0.0, 1.0, -1.0, 1.0));
        net.generators[1].active = false;
        let (c, _) = run(&net, SupportLevel::Full);
        assert_eq!(c.types[2], BusType::Load);
    }
}
