//! HVDC links as pairs of grid-level active power injections.

use nalgebra::DVector;
use num_complex::Complex64;

use super::snapshot::NetworkSnapshot;

/// Flow change that triggers another whole-grid solve (p.u.).
pub const HVDC_TOLERANCE: f64 = 0.01;

/// Active power leaving the from terminal of every link.
///
/// Without voltages the set-points are used. With voltages the angle droop
/// term `angle_droop · (θf − θt)` is added. Flows are clamped to the rating.
pub fn hvdc_flows(snapshot: &NetworkSnapshot, v: Option<&DVector<Complex64>>) -> Vec<f64> {
    snapshot
        .hvdc_links
        .iter()
        .map(|h| {
            if !h.active || !snapshot.buses[h.from].active || !snapshot.buses[h.to].active {
                return 0.0;
            }
            let mut p = h.p_set;
            if let Some(v) = v {
                p += h.angle_droop * (v[h.from].arg() - v[h.to].arg());
            }
            if h.rate > 0.0 { p.clamp(-h.rate, h.rate) } else { p }
        })
        .collect()
}

/// Per-bus active power injected by the links carrying `flows`.
pub fn hvdc_injections(snapshot: &NetworkSnapshot, flows: &[f64]) -> Vec<f64> {
    let mut p = vec![0.0; snapshot.n_bus()];
    for (h, &pf) in snapshot.hvdc_links.iter().zip(flows) {
        p[h.from] -= pf;
        p[h.to] += pf * (1.0 - h.loss_factor);
    }
    p
}

/// Whether any link reacts to the terminal voltages.
pub fn has_droop(snapshot: &NetworkSnapshot) -> bool {
    snapshot.hvdc_links.iter().any(|h| h.active && h.angle_droop != 0.0)
}
