//! Branch primitives and the sparse admittance matrices of one island.
//!
//! Every branch contributes four primitive admittances (`yff`, `yft`, `ytf`, `ytt`),
//! scattered through the branch-bus incidence matrices:
//!
//! ```text
//! Yf   = diag(yff) Cf + diag(yft) Ct
//! Yt   = diag(ytf) Cf + diag(ytt) Ct
//! Ybus = Cf' Yf + Ct' Yt + diag(yshunt)
//! ```
//!
//! Inactive branches have empty rows in `Cf`/`Ct`, so they leave no entry in `Ybus`.

use nalgebra::{Complex, DVector};
use nalgebra_sparse::{CooMatrix, CscMatrix};
use num_complex::Complex64;

use super::{
    diagnostics::{DeviceKind, DeviceRef, Diagnostics, IssueKind, Severity},
    dsbus_dv::TapSensitivity,
    options::{BranchToleranceMode, PowerFlowOptions, ZeroImpedancePolicy},
    snapshot::{BranchKind, VSC_K},
    sparse::{cast::Cast, conj::RealImage, slice::diag_csc},
    topology::Island,
};

/// Series impedances below this magnitude are treated as zero.
pub const ZERO_IMPEDANCE_EPS: f64 = 1e-9;
/// Impedance used in place of a zero one under [`ZeroImpedancePolicy::Proceed`].
pub const MIN_IMPEDANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PrimitiveMode {
    /// Full pi model with charging, converter terms and phase shift.
    Complete,
    /// Series elements only: no charging, no equivalent converter susceptance.
    Series,
    /// Complete model with every phase shift set to zero.
    NoPhaseShift,
}

/// Corrected per-branch parameters, prepared once per island.
#[derive(Debug, Clone)]
struct BranchParams {
    from: usize,
    to: usize,
    active: bool,
    kind: BranchKind,
    z: Complex64,
    bc: Complex64,
    tau: f64,
    vtap_f: f64,
    vtap_t: f64,
    beq: f64,
    g_sw: f64,
}

/// Four primitive admittances per branch.
#[derive(Debug, Clone, PartialEq)]
pub struct Primitives {
    pub yff: Vec<Complex64>,
    pub yft: Vec<Complex64>,
    pub ytf: Vec<Complex64>,
    pub ytt: Vec<Complex64>,
}

/// The matrices of one island for a given set of tap modules.
#[derive(Debug, Clone, PartialEq)]
pub struct AdmittanceSystem {
    pub cf: CscMatrix<f64>,
    pub ct: CscMatrix<f64>,
    pub yf: CscMatrix<Complex64>,
    pub yt: CscMatrix<Complex64>,
    pub ybus: CscMatrix<Complex64>,
    pub yshunt: DVector<Complex64>,
    pub primitives: Primitives,
    pub taps: Vec<f64>,
}

/// Builds admittance matrices for one island; keeps the corrected branch data
/// around so the matrices can be rebuilt when tap modules change.
#[derive(Debug, Clone)]
pub struct AdmittanceBuilder {
    n_bus: usize,
    params: Vec<BranchParams>,
    base_taps: Vec<f64>,
    cf: CscMatrix<f64>,
    ct: CscMatrix<f64>,
    bus_shunt: DVector<Complex64>,
    /// Set when a data issue makes the island impossible to solve.
    pub unsolvable: bool,
}

fn incidence(n_br: usize, n_bus: usize, ends: impl Iterator<Item = (usize, usize, bool)>) -> CscMatrix<f64> {
    let mut coo = CooMatrix::new(n_br, n_bus);
    for (k, bus, active) in ends {
        if active {
            coo.push(k, bus, 1.0);
        }
    }
    CscMatrix::from(&coo)
}

/// Severity of a degenerate branch parameter; `Abort` also marks the island unsolvable.
fn policy_severity(policy: ZeroImpedancePolicy, unsolvable: &mut bool) -> Severity {
    match policy {
        ZeroImpedancePolicy::Proceed => Severity::Warning,
        ZeroImpedancePolicy::Abort => {
            *unsolvable = true;
            Severity::Error
        }
    }
}

impl AdmittanceBuilder {
    pub fn new(island: &Island, options: &PowerFlowOptions, diagnostics: &mut Diagnostics) -> Self {
        let data = &*island.data;
        let n_bus = data.buses.len();
        let n_br = data.branches.len();
        let mut unsolvable = false;

        for (i, bus) in data.buses.iter().enumerate() {
            if bus.active && bus.vnom_kv <= 0.0 {
                diagnostics.report_value(
                    Severity::Warning,
                    IssueKind::ZeroNominalVoltage,
                    DeviceRef::new(DeviceKind::Bus, island.buses.global(i)),
                    bus.vnom_kv,
                    None,
                );
            }
        }

        let virtual_tap = |winding: f64, bus: usize| {
            let vbus = data.buses[bus].vnom_kv;
            if winding > 0.0 && vbus > 0.0 { winding / vbus } else { 1.0 }
        };

        let mut params = Vec::with_capacity(n_br);
        let mut base_taps = Vec::with_capacity(n_br);
        for (k, br) in data.branches.iter().enumerate() {
            let device = DeviceRef::new(DeviceKind::Branch, island.branches.global(k));
            let mut r = br.r;
            if options.apply_temperature_correction {
                r *= 1.0 + br.alpha * (br.temp_oper - br.temp_base);
            }
            r *= match options.branch_tolerance_mode {
                BranchToleranceMode::Nominal => 1.0,
                BranchToleranceMode::Lower => 1.0 - br.r_tolerance_pct / 100.0,
                BranchToleranceMode::Upper => 1.0 + br.r_tolerance_pct / 100.0,
            };
            let mut z = match br.kind {
                BranchKind::DcLink => Complex::new(r, 0.0),
                _ => Complex::new(r, br.x),
            };
            if br.active && z.norm() < ZERO_IMPEDANCE_EPS {
                let severity = policy_severity(options.zero_impedance_policy, &mut unsolvable);
                diagnostics.report_value(severity, IssueKind::ZeroImpedance, device, z.norm(), Some(MIN_IMPEDANCE));
                z = match br.kind {
                    BranchKind::DcLink => Complex::new(MIN_IMPEDANCE, 0.0),
                    _ => Complex::new(0.0, MIN_IMPEDANCE),
                };
            }
            let mut tap = br.tap_module;
            if br.active && br.kind != BranchKind::DcLink && tap.abs() < ZERO_IMPEDANCE_EPS {
                let severity = policy_severity(options.zero_impedance_policy, &mut unsolvable);
                diagnostics.report_value(severity, IssueKind::ZeroTapModule, device, tap, Some(1.0));
                tap = 1.0;
            }
            base_taps.push(tap);
            if br.active && br.rate <= 0.0 {
                diagnostics.report_value(Severity::Warning, IssueKind::ZeroRating, device, br.rate, None);
            }
            params.push(BranchParams {
                from: br.from,
                to: br.to,
                active: br.active,
                kind: br.kind,
                z,
                bc: if br.kind == BranchKind::Ac {
                    Complex::new(br.g, br.b)
                } else {
                    Complex::new(0.0, 0.0)
                },
                tau: br.tap_angle,
                vtap_f: virtual_tap(br.vnom_from_kv, br.from),
                vtap_t: virtual_tap(br.vnom_to_kv, br.to),
                beq: br.beq,
                g_sw: br.g_sw,
            });
        }

        let cf = incidence(n_br, n_bus, params.iter().enumerate().map(|(k, p)| (k, p.from, p.active)));
        let ct = incidence(n_br, n_bus, params.iter().enumerate().map(|(k, p)| (k, p.to, p.active)));

        let mut bus_shunt = DVector::from_element(n_bus, Complex::new(0.0, 0.0));
        for sh in data.shunts.iter().filter(|s| s.active) {
            bus_shunt[sh.bus] += Complex::new(sh.g, sh.b);
        }
        for load in data.loads.iter().filter(|l| l.active) {
            // consumption g + jb drawn by an admittance y = g - jb
            bus_shunt[load.bus] += Complex::new(load.g, -load.b);
        }

        Self {
            n_bus,
            base_taps,
            params,
            cf,
            ct,
            bus_shunt,
            unsolvable,
        }
    }

    pub fn n_bus(&self) -> usize {
        self.n_bus
    }

    pub fn n_branch(&self) -> usize {
        self.params.len()
    }

    /// Tap modules as given in the snapshot.
    pub fn base_taps(&self) -> &[f64] {
        &self.base_taps
    }

    pub fn bus_shunt(&self) -> &DVector<Complex64> {
        &self.bus_shunt
    }

    pub fn primitives(&self, taps: &[f64], mode: PrimitiveMode) -> Primitives {
        let n = self.params.len();
        let zero = Complex::new(0.0, 0.0);
        let mut p = Primitives {
            yff: vec![zero; n],
            yft: vec![zero; n],
            ytf: vec![zero; n],
            ytt: vec![zero; n],
        };
        for (k, br) in self.params.iter().enumerate().filter(|(_, b)| b.active) {
            let ys = br.z.inv();
            let tau = if mode == PrimitiveMode::NoPhaseShift { 0.0 } else { br.tau };
            let (vf, vt) = (br.vtap_f, br.vtap_t);
            match br.kind {
                BranchKind::DcLink => {
                    p.yff[k] = ys;
                    p.yft[k] = -ys;
                    p.ytf[k] = -ys;
                    p.ytt[k] = ys;
                }
                BranchKind::Ac | BranchKind::Vsc => {
                    let (kf, shunt) = if br.kind == BranchKind::Vsc {
                        let beq = if mode == PrimitiveMode::Series { 0.0 } else { br.beq };
                        (VSC_K, Complex::new(0.0, beq))
                    } else {
                        let bc2 = if mode == PrimitiveMode::Series { zero } else { br.bc / 2.0 };
                        (1.0, bc2)
                    };
                    let m = kf * taps[k];
                    let tap = Complex::from_polar(m, tau);
                    p.yff[k] = br.g_sw + (ys + shunt) / (m * m * vf * vf);
                    p.yft[k] = -ys / (tap.conj() * vf * vt);
                    p.ytf[k] = -ys / (tap * vt * vf);
                    p.ytt[k] = if br.kind == BranchKind::Vsc {
                        ys / (vt * vt)
                    } else {
                        (ys + shunt) / (vt * vt)
                    };
                }
            }
        }
        p
    }

    fn assemble(&self, p: &Primitives, shunt: &DVector<Complex64>) -> (CscMatrix<Complex64>, CscMatrix<Complex64>, CscMatrix<Complex64>) {
        let cf: CscMatrix<Complex64> = self.cf.cast();
        let ct: CscMatrix<Complex64> = self.ct.cast();
        let yf = &diag_csc(&p.yff) * &cf + &diag_csc(&p.yft) * &ct;
        let yt = &diag_csc(&p.ytf) * &cf + &diag_csc(&p.ytt) * &ct;
        let ybus = &cf.transpose() * &yf + &ct.transpose() * &yt + diag_csc(shunt.as_slice());
        (yf, yt, ybus)
    }

    /// Assembles `Yf`, `Yt` and `Ybus` for the given tap modules.
    pub fn build(&self, taps: &[f64]) -> AdmittanceSystem {
        let primitives = self.primitives(taps, PrimitiveMode::Complete);
        let (yf, yt, ybus) = self.assemble(&primitives, &self.bus_shunt);
        AdmittanceSystem {
            cf: self.cf.clone(),
            ct: self.ct.clone(),
            yf,
            yt,
            ybus,
            yshunt: self.bus_shunt.clone(),
            primitives,
            taps: taps.to_vec(),
        }
    }

    /// Bus admittance matrix of the series elements only.
    pub fn series_ybus(&self, taps: &[f64]) -> CscMatrix<Complex64> {
        let p = self.primitives(taps, PrimitiveMode::Series);
        let zero = DVector::from_element(self.n_bus, Complex::new(0.0, 0.0));
        self.assemble(&p, &zero).2
    }

    /// `B'` and `B''` of the XB fast-decoupled method.
    ///
    /// `B'` uses `1/x` of every branch (`1/r` for DC links) and ignores
    /// resistance, charging, shunts and taps. `B''` is `-Im(Ybus)` without phase shifts.
    pub fn fast_decoupled(&self, taps: &[f64]) -> (CscMatrix<f64>, CscMatrix<f64>) {
        let bp = self.bp();
        let p = self.primitives(taps, PrimitiveMode::NoPhaseShift);
        let (_, _, ybus) = self.assemble(&p, &self.bus_shunt);
        let bpp = ybus.imag().map_entries(|v| -v);
        (bp, bpp)
    }

    /// DC power flow susceptance matrix, the same as `B'`.
    pub fn bbus(&self) -> CscMatrix<f64> {
        self.bp()
    }

    fn bp(&self) -> CscMatrix<f64> {
        let mut coo = CooMatrix::new(self.n_bus, self.n_bus);
        for br in self.params.iter().filter(|b| b.active) {
            let b1 = match br.kind {
                BranchKind::DcLink => 1.0 / br.z.re,
                _ if br.z.im.abs() > ZERO_IMPEDANCE_EPS => 1.0 / br.z.im,
                _ => 1.0 / MIN_IMPEDANCE,
            };
            coo.push(br.from, br.from, b1);
            coo.push(br.to, br.to, b1);
            coo.push(br.from, br.to, -b1);
            coo.push(br.to, br.from, -b1);
        }
        CscMatrix::from(&coo)
    }

    /// Derivatives of the primitives of `branches` with respect to their tap module.
    pub fn tap_sensitivities(&self, taps: &[f64], primitives: &Primitives, branches: &[usize]) -> Vec<TapSensitivity> {
        branches
            .iter()
            .map(|&k| {
                let br = &self.params[k];
                let m = taps[k];
                TapSensitivity {
                    from: br.from,
                    to: br.to,
                    dyff: -2.0 * (primitives.yff[k] - br.g_sw) / m,
                    dyft: -primitives.yft[k] / m,
                    dytf: -primitives.ytf[k] / m,
                }
            })
            .collect()
    }
}

trait MapEntries {
    fn map_entries(self, f: impl Fn(f64) -> f64) -> Self;
}

impl MapEntries for CscMatrix<f64> {
    fn map_entries(mut self, f: impl Fn(f64) -> f64) -> Self {
        self.values_mut().iter_mut().for_each(|v| *v = f(*v));
        self
    }
}
