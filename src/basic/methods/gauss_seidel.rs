use nalgebra::Complex;
use nalgebra_sparse::CsrMatrix;
use num_complex::Complex64;

use super::{MethodKind, MethodOutcome, PowerFlowMethod};
use crate::basic::{
    bus_types::BusType,
    formulation::{IslandSystem, SolverState, without_controls},
};

/// Nodal Gauss-Seidel. Each sweep updates the buses in index order, using the
/// voltages already updated in the same sweep.
#[derive(Debug, Clone, Copy)]
pub struct GaussSeidel {
    /// Sweeps allowed per configured Newton iteration.
    pub sweep_factor: usize,
}

impl Default for GaussSeidel {
    fn default() -> Self {
        Self { sweep_factor: 40 }
    }
}

impl PowerFlowMethod for GaussSeidel {
    fn kind(&self) -> MethodKind {
        MethodKind::GaussSeidel
    }

    fn attempt(&self, system: &IslandSystem, state: &mut SolverState) -> MethodOutcome {
        let types = without_controls(&state.types);
        let adm = system.admittance(&state.taps);
        let rows = CsrMatrix::from(&adm.ybus);
        let tol = system.options.tolerance;
        let i0 = &system.injections.i0;
        let vset = &system.classification.vset;
        let max_sweeps = system.options.max_iter * self.sweep_factor;

        let residual = |state: &SolverState| {
            let mis = system.power_mismatch(&adm.ybus, state);
            types
                .iter()
                .enumerate()
                .filter(|(_, t)| **t != BusType::Slack)
                .map(|(i, t)| {
                    let q = if *t == BusType::Load { mis[i].im.abs() } else { 0.0 };
                    mis[i].re.abs().max(q)
                })
                .fold(0.0_f64, |a, b| if b.is_finite() { a.max(b) } else { f64::INFINITY })
        };

        let mut norm = residual(state);
        for sweep in 1..=max_sweeps {
            if norm < tol {
                return MethodOutcome {
                    converged: true,
                    residual: norm,
                    iterations: sweep - 1,
                };
            }
            for (i, t) in types.iter().enumerate() {
                if *t == BusType::Slack {
                    continue;
                }
                let row = rows.row(i);
                let mut yii = Complex::new(0.0, 0.0);
                let mut others = Complex::new(0.0, 0.0);
                for (&j, y) in row.col_indices().iter().zip(row.values()) {
                    if j == i {
                        yii += y;
                    } else {
                        others += y * state.v[j];
                    }
                }
                if yii.norm() == 0.0 {
                    return MethodOutcome::failed(sweep);
                }
                let vi = state.v[i];
                let s: Complex64 = match t {
                    BusType::VoltageControlled => {
                        let q = (vi * (others + yii * vi).conj()).im;
                        Complex::new(state.s_spec[i].re + i0[i].re * vi.norm(), q)
                    }
                    _ => state.s_spec[i] + i0[i] * vi.norm(),
                };
                let mut next = ((s / vi).conj() - others) / yii;
                if *t == BusType::VoltageControlled {
                    let target = vset[i].unwrap_or(vi.norm());
                    next = Complex::from_polar(target, next.arg());
                }
                state.v[i] = next;
            }
            norm = residual(state);
            if !norm.is_finite() {
                return MethodOutcome::failed(sweep);
            }
        }
        MethodOutcome {
            converged: norm < tol,
            residual: norm,
            iterations: max_sweeps,
        }
    }
}
