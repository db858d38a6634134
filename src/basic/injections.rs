//! Bus injections of one island, in the injection convention.

use nalgebra::{Complex, DVector};
use num_complex::Complex64;
use serde::{Deserialize, Serialize};

use super::{
    error::PowerFlowError,
    snapshot::{ControlMode, NetworkSnapshot},
    topology::Island,
};

/// Active power set-points computed elsewhere (e.g. by a dispatch optimizer),
/// used instead of the snapshot values for one solve. Indexed globally.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InjectionOverride {
    pub generator_p: Option<Vec<f64>>,
    pub battery_p: Option<Vec<f64>>,
}

impl InjectionOverride {
    pub fn validate(&self, snapshot: &NetworkSnapshot) -> Result<(), PowerFlowError> {
        let check = |what: &'static str, values: &Option<Vec<f64>>, expected: usize| match values {
            Some(v) if v.len() != expected => Err(PowerFlowError::LengthMismatch {
                what,
                expected,
                found: v.len(),
            }),
            Some(v) => match v.iter().position(|p| !p.is_finite()) {
                Some(index) => Err(PowerFlowError::NonFinite {
                    device: what,
                    index,
                    field: "p",
                }),
                None => Ok(()),
            },
            None => Ok(()),
        };
        check("generator override", &self.generator_p, snapshot.generators.len())?;
        check("battery override", &self.battery_p, snapshot.batteries.len())
    }
}

/// Specified injections per bus of one island.
#[derive(Debug, Clone, PartialEq)]
pub struct BusInjections {
    /// Constant power part. Voltage-regulating devices contribute only P.
    pub s0: DVector<Complex64>,
    /// Constant current part, scaled by |V|.
    pub i0: DVector<Complex64>,
    /// Installed capacity of the devices at each bus.
    pub snom: Vec<f64>,
    /// Reactive limits summed over the voltage-regulating devices of each bus.
    pub qmin: Vec<f64>,
    pub qmax: Vec<f64>,
}

impl BusInjections {
    /// `external_p` is a global per-bus active power added on top of the devices
    /// (HVDC terminals).
    pub fn compute(island: &Island, overrides: Option<&InjectionOverride>, external_p: Option<&[f64]>) -> Self {
        let data = &*island.data;
        let n = data.buses.len();
        let zero = Complex::new(0.0, 0.0);
        let mut inj = Self {
            s0: DVector::from_element(n, zero),
            i0: DVector::from_element(n, zero),
            snom: vec![0.0; n],
            qmin: vec![0.0; n],
            qmax: vec![0.0; n],
        };

        let families = [
            (&data.generators, &island.generators, overrides.and_then(|o| o.generator_p.as_deref())),
            (&data.batteries, &island.batteries, overrides.and_then(|o| o.battery_p.as_deref())),
        ];
        for (devices, map, p_override) in families {
            for (i, g) in devices.iter().enumerate().filter(|(_, g)| g.active) {
                let p = p_override.map_or(g.p, |p| p[map.global(i)]);
                if g.mode == ControlMode::Reference || g.regulates_voltage() {
                    inj.s0[g.bus] += Complex::new(p, 0.0);
                    inj.qmin[g.bus] += g.qmin;
                    inj.qmax[g.bus] += g.qmax;
                } else {
                    inj.s0[g.bus] += Complex::new(p, g.q);
                }
                inj.snom[g.bus] += g.snom;
            }
        }
        for load in data.loads.iter().filter(|l| l.active) {
            inj.s0[load.bus] -= Complex::new(load.p, load.q);
            inj.i0[load.bus] -= Complex::new(load.ip, load.iq);
        }
        if let Some(ext) = external_p {
            for (i, s) in inj.s0.iter_mut().enumerate() {
                *s += ext[island.buses.global(i)];
            }
        }
        inj
    }

    /// Specified power at the given voltage magnitudes.
    pub fn specified(&self, s_spec: &DVector<Complex64>, vm: &DVector<f64>) -> DVector<Complex64> {
        s_spec.zip_zip_map(&self.i0, vm, |s, i, m| s + i * m)
    }
}
