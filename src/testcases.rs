//! Small networks used by the unit tests, the integration tests and the docs.
//!
//! All values are per-unit on a 100 MVA base unless noted.

use crate::basic::snapshot::*;

fn buses(names: &[&str], vnom_kv: f64) -> Vec<Bus> {
    names.iter().map(|n| Bus::new(*n, vnom_kv)).collect()
}

/// A slack bus feeding a 0.5 + j0.2 load through one rated line.
pub fn two_bus() -> NetworkSnapshot {
    NetworkSnapshot {
        buses: buses(&["a", "b"], 10.0),
        branches: vec![Branch::line(0, 1, 0.01, 0.1, 0.0).with_rate(100.0).with_name("a-b")],
        generators: vec![Generator::reference(0, 1.0)],
        loads: vec![Load::power(1, 0.5, 0.2)],
        ..Default::default()
    }
}

/// Slack, one voltage-controlled generator at 1.02 p.u. and a load bus.
pub fn three_bus_pv() -> NetworkSnapshot {
    NetworkSnapshot {
        buses: buses(&["1", "2", "3"], 110.0),
        branches: vec![
            Branch::line(0, 1, 0.01, 0.1, 0.02).with_rate(100.0),
            Branch::line(1, 2, 0.01, 0.1, 0.02).with_rate(100.0),
            Branch::line(0, 2, 0.02, 0.2, 0.0).with_rate(80.0),
        ],
        generators: vec![
            Generator::reference(0, 1.0).with_snom(200.0),
            Generator::voltage(1, 0.3, 1.02, -1.0, 1.0).with_snom(100.0),
        ],
        loads: vec![Load::power(2, 0.5, 0.2)],
        ..Default::default()
    }
}

/// Meshed, lightly loaded five bus grid without shunts or off-nominal taps.
pub fn five_bus() -> NetworkSnapshot {
    NetworkSnapshot {
        buses: buses(&["north", "south", "lake", "main", "elm"], 110.0),
        branches: vec![
            Branch::line(0, 1, 0.006, 0.06, 0.03).with_rate(150.0),
            Branch::line(0, 2, 0.024, 0.24, 0.025).with_rate(100.0),
            Branch::line(1, 2, 0.018, 0.18, 0.02).with_rate(100.0),
            Branch::line(1, 3, 0.018, 0.18, 0.02).with_rate(100.0),
            Branch::line(2, 3, 0.003, 0.03, 0.01).with_rate(100.0),
            Branch::line(3, 4, 0.024, 0.24, 0.025).with_rate(100.0),
        ],
        generators: vec![
            Generator::reference(0, 1.0).with_snom(200.0),
            Generator::voltage(1, 0.3, 1.01, -1.0, 1.0).with_snom(100.0),
            Generator::power(4, 0.1, 0.0).with_snom(50.0),
        ],
        loads: vec![
            Load::power(2, 0.25, 0.08),
            Load::power(3, 0.2, 0.05),
            Load::power(4, 0.3, 0.1),
        ],
        ..Default::default()
    }
}

/// Buses 0-1 and 2-3 form two islands, each with its own slack.
pub fn two_islands() -> NetworkSnapshot {
    NetworkSnapshot {
        buses: buses(&["w1", "w2", "e1", "e2"], 20.0),
        branches: vec![
            Branch::line(0, 1, 0.01, 0.1, 0.0).with_rate(100.0),
            Branch::line(2, 3, 0.02, 0.12, 0.0).with_rate(100.0),
        ],
        generators: vec![Generator::reference(0, 1.0), Generator::reference(2, 1.0)],
        loads: vec![Load::power(1, 0.3, 0.1), Load::power(3, 0.2, 0.05)],
        ..Default::default()
    }
}

/// [`two_islands`] with the eastern slack replaced by a fixed injection.
pub fn no_slack() -> NetworkSnapshot {
    let mut net = two_islands();
    net.generators[1] = Generator::power(2, 0.1, 0.0);
    net
}

/// Lines, a tap changer, a phase shifter, shunts and an impedance load.
pub fn mixed_devices() -> NetworkSnapshot {
    NetworkSnapshot {
        buses: buses(&["src", "hv", "mv", "pst"], 110.0),
        branches: vec![
            Branch::line(0, 1, 0.01, 0.1, 0.02).with_rate(120.0),
            Branch::transformer(1, 2, 0.005, 0.08, 0.98, 0.0).with_rate(60.0),
            Branch::transformer(2, 3, 0.0, 0.05, 1.0, 0.05).with_rate(60.0),
            Branch::line(0, 3, 0.02, 0.2, 0.01).with_rate(80.0),
        ],
        generators: vec![Generator::reference(0, 1.0), Generator::power(2, 0.2, 0.05)],
        loads: vec![Load::power(3, 0.3, 0.1), Load::impedance(3, 0.02, -0.01)],
        shunts: vec![Shunt::new(2, 0.0, 0.1)],
        ..Default::default()
    }
}

/// An AC pair with a converter feeding a two bus DC link.
pub fn ac_dc() -> NetworkSnapshot {
    NetworkSnapshot {
        buses: vec![
            Bus::new("ac0", 110.0),
            Bus::new("ac1", 110.0),
            Bus::dc("dc0", 150.0),
            Bus::dc("dc1", 150.0),
        ],
        branches: vec![
            Branch::line(0, 1, 0.01, 0.1, 0.02).with_rate(100.0),
            Branch::vsc(2, 1, 0.01, 0.05).with_rate(100.0),
            Branch::dc_link(2, 3, 0.01).with_rate(100.0),
        ],
        generators: vec![Generator::reference(0, 1.0)],
        loads: vec![Load::power(1, 0.3, 0.1), Load::power(3, 0.2, 0.0)],
        ..Default::default()
    }
}

/// A transformer whose tap holds the secondary at 1.0 p.u.
pub fn tap_controlled() -> NetworkSnapshot {
    NetworkSnapshot {
        buses: vec![Bus::new("grid", 110.0), Bus::new("hv", 110.0), Bus::new("lv", 20.0)],
        branches: vec![
            Branch::line(0, 1, 0.01, 0.1, 0.02).with_rate(100.0),
            Branch::transformer(1, 2, 0.005, 0.08, 1.0, 0.0)
                .with_rate(60.0)
                .with_name("oltc")
                .with_control(BranchControl::VoltageModule {
                    bus: 2,
                    vset: 1.0,
                    m_min: 0.9,
                    m_max: 1.1,
                }),
        ],
        generators: vec![Generator::reference(0, 1.0)],
        loads: vec![Load::power(2, 0.4, 0.2)],
        ..Default::default()
    }
}

/// A generator asked to hold 1.05 p.u. with only 0.1 p.u. of reactive headroom.
pub fn q_limited() -> NetworkSnapshot {
    NetworkSnapshot {
        buses: buses(&["slack", "pv"], 20.0),
        branches: vec![Branch::line(0, 1, 0.01, 0.1, 0.0).with_rate(100.0)],
        generators: vec![
            Generator::reference(0, 1.0),
            Generator::voltage(1, 0.0, 1.05, -1.0, 0.1),
        ],
        loads: vec![Load::power(1, 0.2, 0.2)],
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cases_are_valid() {
        for (name, net) in [
            ("two_bus", two_bus()),
            ("three_bus_pv", three_bus_pv()),
            ("five_bus", five_bus()),
            ("two_islands", two_islands()),
            ("no_slack", no_slack()),
            ("mixed_devices", mixed_devices()),
            ("ac_dc", ac_dc()),
            ("tap_controlled", tap_controlled()),
            ("q_limited", q_limited()),
        ] {
            assert!(net.validate().is_ok(), "{name} is invalid: {:?}", net.validate());
        }
    }
}
