mod basic;
pub mod testcases;
pub mod prelude {
    use crate::basic;
    pub use basic::*;

    pub use basic::{
        bus_types::{BusType, SupportLevel},
        diagnostics::{DeviceKind, DeviceRef, DataIssue, Diagnostics, IssueKind, Severity},
        dispatcher::{ConvergenceReport, SolverAttempt},
        error::PowerFlowError,
        injections::InjectionOverride,
        methods::MethodKind,
        options::{BranchToleranceMode, PowerFlowOptions, ZeroImpedancePolicy},
        post_processing::{IslandSolution, WholeGridSolution},
        snapshot::*,
    };
}
