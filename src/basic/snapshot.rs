//! Network snapshot: the immutable, per-unit description of one scenario.
//!
//! All impedances and powers are in per-unit on [`NetworkSnapshot::sbase`],
//! except nominal voltages (kV) and branch ratings (MVA). Powers follow the
//! injection convention for generators and the consumption convention for loads.

use serde::{Deserialize, Serialize};

use super::error::PowerFlowError;

/// Tap factor of voltage source converters.
pub const VSC_K: f64 = 0.866_025_403_784_438_6;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Bus {
    pub name: String,
    pub active: bool,
    pub vnom_kv: f64,
    pub is_dc: bool,
    /// Initial voltage magnitude guess (p.u.).
    pub vm0: f64,
    /// Initial voltage angle guess (rad).
    pub va0: f64,
}

impl Default for Bus {
    fn default() -> Self {
        Self {
            name: String::new(),
            active: true,
            vnom_kv: 1.0,
            is_dc: false,
            vm0: 1.0,
            va0: 0.0,
        }
    }
}

impl Bus {
    pub fn new(name: impl Into<String>, vnom_kv: f64) -> Self {
        Self {
            name: name.into(),
            vnom_kv,
            ..Default::default()
        }
    }

    pub fn dc(name: impl Into<String>, vnom_kv: f64) -> Self {
        Self {
            is_dc: true,
            ..Self::new(name, vnom_kv)
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BranchKind {
    /// Pi-model line or transformer.
    #[default]
    Ac,
    /// Purely resistive DC line.
    DcLink,
    /// Voltage source converter, `from` is the DC side.
    Vsc,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub enum BranchControl {
    #[default]
    None,
    /// The tap module regulates the voltage magnitude of `bus`.
    VoltageModule {
        bus: usize,
        vset: f64,
        m_min: f64,
        m_max: f64,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Branch {
    pub name: String,
    pub from: usize,
    pub to: usize,
    pub active: bool,
    pub kind: BranchKind,
    pub r: f64,
    pub x: f64,
    /// Total shunt conductance of the pi model.
    pub g: f64,
    /// Total charging susceptance of the pi model.
    pub b: f64,
    pub tap_module: f64,
    pub tap_angle: f64,
    /// Nominal voltage of the winding at the from side; zero means "same as the bus".
    pub vnom_from_kv: f64,
    pub vnom_to_kv: f64,
    /// Rating in MVA.
    pub rate: f64,
    /// Equivalent converter susceptance.
    pub beq: f64,
    /// Converter switching-loss conductance.
    pub g_sw: f64,
    pub temp_base: f64,
    pub temp_oper: f64,
    pub alpha: f64,
    /// Resistance tolerance in percent.
    pub r_tolerance_pct: f64,
    pub control: BranchControl,
}

impl Default for Branch {
    fn default() -> Self {
        Self {
            name: String::new(),
            from: 0,
            to: 0,
            active: true,
            kind: BranchKind::Ac,
            r: 0.0,
            x: 0.0,
            g: 0.0,
            b: 0.0,
            tap_module: 1.0,
            tap_angle: 0.0,
            vnom_from_kv: 0.0,
            vnom_to_kv: 0.0,
            rate: 0.0,
            beq: 0.0,
            g_sw: 0.0,
            temp_base: 20.0,
            temp_oper: 20.0,
            alpha: 0.00330,
            r_tolerance_pct: 0.0,
            control: BranchControl::None,
        }
    }
}

impl Branch {
    pub fn line(from: usize, to: usize, r: f64, x: f64, b: f64) -> Self {
        Self {
            from,
            to,
            r,
            x,
            b,
            ..Default::default()
        }
    }

    pub fn transformer(from: usize, to: usize, r: f64, x: f64, tap_module: f64, tap_angle: f64) -> Self {
        Self {
            tap_module,
            tap_angle,
            ..Self::line(from, to, r, x, 0.0)
        }
    }

    pub fn dc_link(from: usize, to: usize, r: f64) -> Self {
        Self {
            kind: BranchKind::DcLink,
            ..Self::line(from, to, r, 0.0, 0.0)
        }
    }

    pub fn vsc(dc_bus: usize, ac_bus: usize, r: f64, x: f64) -> Self {
        Self {
            kind: BranchKind::Vsc,
            ..Self::line(dc_bus, ac_bus, r, x, 0.0)
        }
    }

    pub fn with_rate(mut self, rate: f64) -> Self {
        self.rate = rate;
        self
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_control(mut self, control: BranchControl) -> Self {
        self.control = control;
        self
    }

    pub fn inactive(mut self) -> Self {
        self.active = false;
        self
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum ControlMode {
    /// Angle reference: fixes magnitude and angle of its bus.
    Reference,
    /// Regulates the voltage magnitude of its bus.
    Voltage,
    /// Fixed P and Q.
    #[default]
    Power,
}

/// Narrowest reactive band that still lets a device hold its voltage (p.u.).
pub const Q_BAND_EPS: f64 = 1e-9;

/// Generators, batteries and external grids.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Generator {
    pub name: String,
    pub bus: usize,
    pub active: bool,
    pub p: f64,
    pub q: f64,
    pub vset: f64,
    pub qmin: f64,
    pub qmax: f64,
    /// Installed capacity, used for distributed slack shares (p.u.).
    pub snom: f64,
    pub mode: ControlMode,
}

impl Default for Generator {
    fn default() -> Self {
        Self {
            name: String::new(),
            bus: 0,
            active: true,
            p: 0.0,
            q: 0.0,
            vset: 1.0,
            qmin: -9999.0,
            qmax: 9999.0,
            snom: 0.0,
            mode: ControlMode::Power,
        }
    }
}

impl Generator {
    pub fn reference(bus: usize, vset: f64) -> Self {
        Self {
            bus,
            vset,
            mode: ControlMode::Reference,
            ..Default::default()
        }
    }

    pub fn voltage(bus: usize, p: f64, vset: f64, qmin: f64, qmax: f64) -> Self {
        Self {
            bus,
            p,
            vset,
            qmin,
            qmax,
            mode: ControlMode::Voltage,
            ..Default::default()
        }
    }

    pub fn power(bus: usize, p: f64, q: f64) -> Self {
        Self {
            bus,
            p,
            q,
            ..Default::default()
        }
    }

    pub fn with_snom(mut self, snom: f64) -> Self {
        self.snom = snom;
        self
    }

    /// A voltage-mode device regulates only with some reactive headroom;
    /// with `qmin == qmax` it injects a fixed `p + jq`.
    pub fn regulates_voltage(&self) -> bool {
        self.mode == ControlMode::Voltage && self.qmax - self.qmin > Q_BAND_EPS
    }
}

/// ZIP load, consumption convention. Each part is the power drawn at 1 p.u. voltage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Load {
    pub name: String,
    pub bus: usize,
    pub active: bool,
    pub p: f64,
    pub q: f64,
    pub ip: f64,
    pub iq: f64,
    pub g: f64,
    pub b: f64,
}

impl Default for Load {
    fn default() -> Self {
        Self {
            name: String::new(),
            bus: 0,
            active: true,
            p: 0.0,
            q: 0.0,
            ip: 0.0,
            iq: 0.0,
            g: 0.0,
            b: 0.0,
        }
    }
}

impl Load {
    pub fn power(bus: usize, p: f64, q: f64) -> Self {
        Self {
            bus,
            p,
            q,
            ..Default::default()
        }
    }

    pub fn current(bus: usize, ip: f64, iq: f64) -> Self {
        Self {
            bus,
            ip,
            iq,
            ..Default::default()
        }
    }

    pub fn impedance(bus: usize, g: f64, b: f64) -> Self {
        Self {
            bus,
            g,
            b,
            ..Default::default()
        }
    }
}

/// Fixed shunt admittance, `b > 0` is capacitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Shunt {
    pub name: String,
    pub bus: usize,
    pub active: bool,
    pub g: f64,
    pub b: f64,
}

impl Default for Shunt {
    fn default() -> Self {
        Self {
            name: String::new(),
            bus: 0,
            active: true,
            g: 0.0,
            b: 0.0,
        }
    }
}

impl Shunt {
    pub fn new(bus: usize, g: f64, b: f64) -> Self {
        Self {
            bus,
            g,
            b,
            ..Default::default()
        }
    }
}

/// Point-to-point HVDC link modelled as a pair of injections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HvdcLink {
    pub name: String,
    pub from: usize,
    pub to: usize,
    pub active: bool,
    pub p_set: f64,
    pub loss_factor: f64,
    /// p.u. power per radian of angle difference between the terminals.
    pub angle_droop: f64,
    /// Rating in p.u.; zero means unlimited.
    pub rate: f64,
}

impl Default for HvdcLink {
    fn default() -> Self {
        Self {
            name: String::new(),
            from: 0,
            to: 0,
            active: true,
            p_set: 0.0,
            loss_factor: 0.0,
            angle_droop: 0.0,
            rate: 0.0,
        }
    }
}

impl HvdcLink {
    pub fn new(from: usize, to: usize, p_set: f64) -> Self {
        Self {
            from,
            to,
            p_set,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetworkSnapshot {
    /// System base power in MVA.
    pub sbase: f64,
    pub buses: Vec<Bus>,
    pub branches: Vec<Branch>,
    pub generators: Vec<Generator>,
    pub batteries: Vec<Generator>,
    pub loads: Vec<Load>,
    pub shunts: Vec<Shunt>,
    pub hvdc_links: Vec<HvdcLink>,
}

impl Default for NetworkSnapshot {
    fn default() -> Self {
        Self {
            sbase: 100.0,
            buses: Vec::new(),
            branches: Vec::new(),
            generators: Vec::new(),
            batteries: Vec::new(),
            loads: Vec::new(),
            shunts: Vec::new(),
            hvdc_links: Vec::new(),
        }
    }
}

fn check_finite(device: &'static str, index: usize, fields: &[(&'static str, f64)]) -> Result<(), PowerFlowError> {
    match fields.iter().find(|(_, v)| !v.is_finite()) {
        Some((field, _)) => Err(PowerFlowError::NonFinite { device, index, field }),
        None => Ok(()),
    }
}

impl NetworkSnapshot {
    pub fn n_bus(&self) -> usize {
        self.buses.len()
    }

    pub fn n_branch(&self) -> usize {
        self.branches.len()
    }

    /// Checks connectivity and numeric sanity. These are the only failures
    /// that abort a power flow call.
    pub fn validate(&self) -> Result<(), PowerFlowError> {
        let n_bus = self.n_bus();
        if n_bus == 0 {
            return Err(PowerFlowError::EmptyNetwork);
        }
        if !(self.sbase.is_finite() && self.sbase > 0.0) {
            return Err(PowerFlowError::InvalidBase(self.sbase));
        }
        let in_range = |device: &'static str, index: usize, bus: usize| {
            if bus < n_bus {
                Ok(())
            } else {
                Err(PowerFlowError::BusOutOfRange {
                    device,
                    index,
                    bus,
                    n_bus,
                })
            }
        };
        for (i, bus) in self.buses.iter().enumerate() {
            check_finite("bus", i, &[("vnom_kv", bus.vnom_kv), ("vm0", bus.vm0), ("va0", bus.va0)])?;
        }
        for (k, br) in self.branches.iter().enumerate() {
            in_range("branch", k, br.from)?;
            in_range("branch", k, br.to)?;
            if br.from == br.to {
                return Err(PowerFlowError::SelfLoop { index: k, bus: br.from });
            }
            if let BranchControl::VoltageModule { bus, vset, .. } = br.control {
                in_range("branch control", k, bus)?;
                check_finite("branch", k, &[("control.vset", vset)])?;
            }
            check_finite(
                "branch",
                k,
                &[
                    ("r", br.r),
                    ("x", br.x),
                    ("g", br.g),
                    ("b", br.b),
                    ("tap_module", br.tap_module),
                    ("tap_angle", br.tap_angle),
                    ("rate", br.rate),
                    ("beq", br.beq),
                    ("g_sw", br.g_sw),
                ],
            )?;
        }
        for (devices, name) in [(&self.generators, "generator"), (&self.batteries, "battery")] {
            for (i, g) in devices.iter().enumerate() {
                in_range(name, i, g.bus)?;
                check_finite(name, i, &[("p", g.p), ("q", g.q), ("vset", g.vset), ("snom", g.snom)])?;
            }
        }
        for (i, l) in self.loads.iter().enumerate() {
            in_range("load", i, l.bus)?;
            check_finite(
                "load",
                i,
                &[("p", l.p), ("q", l.q), ("ip", l.ip), ("iq", l.iq), ("g", l.g), ("b", l.b)],
            )?;
        }
        for (i, s) in self.shunts.iter().enumerate() {
            in_range("shunt", i, s.bus)?;
            check_finite("shunt", i, &[("g", s.g), ("b", s.b)])?;
        }
        for (i, h) in self.hvdc_links.iter().enumerate() {
            in_range("hvdc", i, h.from)?;
            in_range("hvdc", i, h.to)?;
            check_finite("hvdc", i, &[("p_set", h.p_set), ("angle_droop", h.angle_droop)])?;
        }
        Ok(())
    }
}
