//! Interchangeable power flow methods.
//!
//! Every method works on an [`IslandSystem`] and mutates a [`SolverState`] in
//! place. Reactive limits and distributed slack are handled around the method
//! by [`super::qlimits`], not inside it.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use super::formulation::{IslandSystem, SolverState};

pub mod decoupled;
pub mod gauss_seidel;
pub mod levenberg;
pub mod linear;
pub mod newtonpf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum MethodKind {
    NewtonRaphson,
    Iwamoto,
    LevenbergMarquardt,
    FastDecoupled,
    GaussSeidel,
    DcLinear,
    LinearAc,
}

impl MethodKind {
    pub fn is_linear(self) -> bool {
        matches!(self, MethodKind::DcLinear | MethodKind::LinearAc)
    }

    /// The implementation behind this identifier.
    pub fn method(self) -> Box<dyn PowerFlowMethod> {
        match self {
            MethodKind::NewtonRaphson => Box::new(newtonpf::NewtonRaphson),
            MethodKind::Iwamoto => Box::new(newtonpf::Iwamoto),
            MethodKind::LevenbergMarquardt => Box::new(levenberg::LevenbergMarquardt),
            MethodKind::FastDecoupled => Box::new(decoupled::FastDecoupled),
            MethodKind::GaussSeidel => Box::new(gauss_seidel::GaussSeidel::default()),
            MethodKind::DcLinear => Box::new(linear::DcLinear),
            MethodKind::LinearAc => Box::new(linear::LinearAc),
        }
    }
}

/// What a method reports about its own run. The dispatcher recomputes the
/// residual independently before deciding on acceptance.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MethodOutcome {
    pub converged: bool,
    pub residual: f64,
    pub iterations: usize,
}

impl MethodOutcome {
    pub fn failed(iterations: usize) -> Self {
        Self {
            converged: false,
            residual: f64::INFINITY,
            iterations,
        }
    }
}

pub trait PowerFlowMethod: Send + Sync {
    fn kind(&self) -> MethodKind;

    /// Linear methods have no meaningful nonlinear residual of their own.
    fn is_linear(&self) -> bool {
        self.kind().is_linear()
    }

    /// Whether regulating taps and PartialP buses are modelled. Methods that
    /// return `false` see those buses as Load buses with frozen taps.
    fn supports_controls(&self) -> bool {
        false
    }

    fn attempt(&self, system: &IslandSystem, state: &mut SolverState) -> MethodOutcome;
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry() {
        for kind in [
            MethodKind::NewtonRaphson,
            MethodKind::Iwamoto,
            MethodKind::LevenbergMarquardt,
            MethodKind::FastDecoupled,
            MethodKind::GaussSeidel,
            MethodKind::DcLinear,
            MethodKind::LinearAc,
        ] {
            let m = kind.method();
            assert_eq!(m.kind(), kind);
            assert_eq!(m.is_linear(), kind.is_linear());
        }
        assert!(MethodKind::NewtonRaphson.method().supports_controls());
        assert!(!MethodKind::FastDecoupled.method().supports_controls());
    }
}
