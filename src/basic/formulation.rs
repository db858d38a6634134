//! Generalized power flow equations of one island.
//!
//! Unknowns, in this order:
//! - voltage angles of VoltageControlled, Load and MixedPQV buses;
//! - voltage magnitudes of Load and PartialP buses;
//! - tap modules of the branches regulating a MixedPQV bus.
//!
//! Equations: the active power balance of every non-slack bus and the reactive
//! power balance of Load and MixedPQV buses. Each MixedPQV bus has exactly one
//! regulating branch, so the system is square.

use std::borrow::Cow;

use nalgebra::{Complex, DVector};
use nalgebra_sparse::CscMatrix;
use num_complex::Complex64;

use super::{
    admittance::{AdmittanceBuilder, AdmittanceSystem},
    bus_types::{BusClassification, BusType, SupportLevel, TapControl},
    dsbus_dv::{dSbus_dV, dSbus_dm},
    injections::BusInjections,
    options::PowerFlowOptions,
    sparse::{
        conj::RealImage,
        slice::{diag_csc, select_csc},
        stack::csc_block,
    },
};

/// Positions of the unknowns and equations for one set of bus types.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSets {
    pub va: Vec<usize>,
    pub vm: Vec<usize>,
    pub p: Vec<usize>,
    pub q: Vec<usize>,
    pub controls: Vec<TapControl>,
}

impl IndexSets {
    pub fn n_unknowns(&self) -> usize {
        self.va.len() + self.vm.len() + self.controls.len()
    }

    pub fn n_equations(&self) -> usize {
        self.p.len() + self.q.len()
    }
}

/// Mutable state of one island solve. Owned by a single attempt at a time.
#[derive(Debug, Clone, PartialEq)]
pub struct SolverState {
    pub v: DVector<Complex64>,
    pub types: Vec<BusType>,
    /// Constant-power injections, rewritten by reactive limits and distributed slack.
    pub s_spec: DVector<Complex64>,
    pub taps: Vec<f64>,
    /// Buses moved from VoltageControlled to Load, with the limit they were clamped to.
    pub q_switched: Vec<(usize, f64)>,
    pub outer_iterations: usize,
}

impl SolverState {
    pub fn vm(&self) -> DVector<f64> {
        self.v.map(|e| e.norm())
    }

    pub fn va(&self) -> DVector<f64> {
        self.v.map(|e| e.arg())
    }
}

/// Everything a method needs to solve one island at one support level.
#[derive(Debug, Clone)]
pub struct IslandSystem<'a> {
    pub builder: &'a AdmittanceBuilder,
    pub injections: &'a BusInjections,
    pub classification: BusClassification,
    pub level: SupportLevel,
    pub options: &'a PowerFlowOptions,
    /// Matrices at the snapshot tap modules.
    pub base: AdmittanceSystem,
}

/// Maps the bus types a method without control support can handle.
pub fn without_controls(types: &[BusType]) -> Vec<BusType> {
    types
        .iter()
        .map(|t| match t {
            BusType::MixedPQV | BusType::PartialP => BusType::Load,
            other => *other,
        })
        .collect()
}

/// Infinity norm; any non-finite entry yields `+inf`.
pub fn inf_norm(f: &DVector<f64>) -> f64 {
    f.iter().try_fold(0.0_f64, |acc, v| v.is_finite().then(|| acc.max(v.abs()))).unwrap_or(f64::INFINITY)
}

impl<'a> IslandSystem<'a> {
    pub fn new(
        builder: &'a AdmittanceBuilder,
        injections: &'a BusInjections,
        classification: BusClassification,
        level: SupportLevel,
        options: &'a PowerFlowOptions,
    ) -> Self {
        let base = builder.build(builder.base_taps());
        Self {
            builder,
            injections,
            classification,
            level,
            options,
            base,
        }
    }

    pub fn n_bus(&self) -> usize {
        self.builder.n_bus()
    }

    pub fn has_controls(&self) -> bool {
        !self.classification.controls.is_empty() || self.classification.types.contains(&BusType::PartialP)
    }

    /// Matrices for the given taps; borrows the base system when nothing moved.
    pub fn admittance(&self, taps: &[f64]) -> Cow<'_, AdmittanceSystem> {
        if taps == self.base.taps.as_slice() {
            Cow::Borrowed(&self.base)
        } else {
            Cow::Owned(self.builder.build(taps))
        }
    }

    pub fn index_sets(&self, types: &[BusType]) -> IndexSets {
        let pick = |f: &dyn Fn(BusType) -> bool| -> Vec<usize> {
            types.iter().enumerate().filter_map(|(i, t)| f(*t).then_some(i)).collect()
        };
        use BusType::*;
        IndexSets {
            va: pick(&|t| matches!(t, VoltageControlled | Load | MixedPQV)),
            vm: pick(&|t| matches!(t, Load | PartialP)),
            p: pick(&|t| t != Slack),
            q: pick(&|t| matches!(t, Load | MixedPQV)),
            controls: self
                .classification
                .controls
                .iter()
                .filter(|c| types[c.bus] == MixedPQV)
                .copied()
                .collect(),
        }
    }

    /// Flat or warm start. Buses with a set-point get its magnitude.
    pub fn initial_state(&self, data: &super::snapshot::NetworkSnapshot, guess: Option<&[Complex64]>) -> SolverState {
        let v = DVector::from_iterator(
            self.n_bus(),
            data.buses.iter().enumerate().map(|(i, bus)| {
                let v0 = match guess {
                    Some(g) if g[i].norm() > 0.0 => g[i],
                    _ => Complex::from_polar(bus.vm0, bus.va0),
                };
                match self.classification.vset[i] {
                    Some(vset) if self.classification.types[i] != BusType::Load => Complex::from_polar(vset, v0.arg()),
                    _ => v0,
                }
            }),
        );
        SolverState {
            v,
            types: self.classification.types.clone(),
            s_spec: self.injections.s0.clone(),
            taps: self.builder.base_taps().to_vec(),
            q_switched: Vec::new(),
            outer_iterations: 0,
        }
    }

    /// `V · conj(Ybus V)`.
    pub fn calculated_power(&self, ybus: &CscMatrix<Complex64>, v: &DVector<Complex64>) -> DVector<Complex64> {
        v.component_mul(&(ybus * v).conjugate())
    }

    /// Calculated minus specified power at every bus.
    pub fn power_mismatch(&self, ybus: &CscMatrix<Complex64>, state: &SolverState) -> DVector<Complex64> {
        let scalc = self.calculated_power(ybus, &state.v);
        scalc - self.injections.specified(&state.s_spec, &state.vm())
    }

    pub fn mismatch_vector(&self, ybus: &CscMatrix<Complex64>, state: &SolverState, sets: &IndexSets) -> DVector<f64> {
        let mis = self.power_mismatch(ybus, state);
        DVector::from_iterator(
            sets.n_equations(),
            sets.p.iter().map(|&i| mis[i].re).chain(sets.q.iter().map(|&i| mis[i].im)),
        )
    }

    /// Jacobian of [`Self::mismatch_vector`] with respect to the unknowns.
    pub fn jacobian(&self, adm: &AdmittanceSystem, state: &SolverState, sets: &IndexSets) -> CscMatrix<f64> {
        let v = &state.v;
        let vnorm = v.map(|e| if e.norm() > 0.0 { e / e.norm() } else { Complex::new(1.0, 0.0) });
        let (ds_dvm, ds_dva) = dSbus_dV(&adm.ybus, v, &vnorm);
        // the constant current part of the specified power grows with |V|
        let ds_dvm = ds_dvm - diag_csc(self.injections.i0.as_slice());
        let (va_re, va_im) = ds_dva.real_imag();
        let (vm_re, vm_im) = ds_dvm.real_imag();

        let mut top = vec![select_csc(&va_re, &sets.p, &sets.va), select_csc(&vm_re, &sets.p, &sets.vm)];
        let mut bottom = vec![select_csc(&va_im, &sets.q, &sets.va), select_csc(&vm_im, &sets.q, &sets.vm)];
        if !sets.controls.is_empty() {
            let branches: Vec<usize> = sets.controls.iter().map(|c| c.branch).collect();
            let sens = self.builder.tap_sensitivities(&state.taps, &adm.primitives, &branches);
            let (m_re, m_im) = dSbus_dm(v, &sens).real_imag();
            let all: Vec<usize> = (0..sens.len()).collect();
            top.push(select_csc(&m_re, &sets.p, &all));
            bottom.push(select_csc(&m_im, &sets.q, &all));
        }
        let top: Vec<&CscMatrix<f64>> = top.iter().collect();
        let bottom: Vec<&CscMatrix<f64>> = bottom.iter().collect();
        csc_block(&[&top, &bottom])
    }

    /// `x ← x − scale · dx`.
    pub fn apply_step(&self, sets: &IndexSets, state: &mut SolverState, dx: &DVector<f64>, scale: f64) {
        let mut vm = state.vm();
        let mut va = state.va();
        let (nva, nvm) = (sets.va.len(), sets.vm.len());
        for (k, &i) in sets.va.iter().enumerate() {
            va[i] -= scale * dx[k];
        }
        for (k, &i) in sets.vm.iter().enumerate() {
            vm[i] -= scale * dx[nva + k];
        }
        for (k, c) in sets.controls.iter().enumerate() {
            state.taps[c.branch] -= scale * dx[nva + nvm + k];
        }
        state.v = vm.zip_map(&va, Complex::from_polar);
    }

    /// Infinity norm of the full AC mismatch at the state, including the
    /// deviation of regulated buses from their set-point.
    pub fn residual(&self, state: &SolverState) -> f64 {
        let sets = self.index_sets(&state.types);
        let adm = self.admittance(&state.taps);
        let f = self.mismatch_vector(&adm.ybus, state, &sets);
        let vm = state.vm();
        let deviation = DVector::from_iterator(
            sets.controls.len(),
            sets.controls.iter().map(|c| vm[c.bus] - c.vset),
        );
        inf_norm(&f).max(inf_norm(&deviation))
    }
}
