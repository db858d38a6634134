use derive_more::Display;
use serde::{Deserialize, Serialize};

use super::methods::MethodKind;

/// Methods tried after the configured ones when `retry_with_other_methods` is set.
pub const FALLBACK_SEQUENCE: [MethodKind; 4] = [
    MethodKind::NewtonRaphson,
    MethodKind::LevenbergMarquardt,
    MethodKind::Iwamoto,
    MethodKind::LinearAc,
];

/// Which resistance value of a branch is used when a tolerance is given.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum BranchToleranceMode {
    #[default]
    Nominal,
    Lower,
    Upper,
}

/// What to do with a branch whose series impedance is numerically zero.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Display, Serialize, Deserialize)]
pub enum ZeroImpedancePolicy {
    /// Clamp the impedance to a small reactance and keep going.
    #[default]
    Proceed,
    /// Mark the island as unsolvable.
    Abort,
}

/// Options of one power flow run.
///
/// Every field has a default, so a partial JSON document is enough:
///
/// ```
/// use rustpower_islands::prelude::*;
/// let opts: PowerFlowOptions = serde_json::from_str(r#"{ "tolerance": 1e-8 }"#).unwrap();
/// assert_eq!(opts.max_iter, 25);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PowerFlowOptions {
    /// Methods to try, primary first.
    pub solver_order: Vec<MethodKind>,
    pub retry_with_other_methods: bool,
    pub tolerance: f64,
    pub max_iter: usize,
    /// Bound on the reactive-limit and distributed-slack outer iterations.
    pub max_outer_iter: usize,
    pub distributed_slack: bool,
    pub control_q: bool,
    pub control_taps: bool,
    pub ignore_single_node_islands: bool,
    pub auto_promote_slack: bool,
    pub apply_temperature_correction: bool,
    pub branch_tolerance_mode: BranchToleranceMode,
    pub zero_impedance_policy: ZeroImpedancePolicy,
    pub initialize_with_existing_solution: bool,
    pub parallel: bool,
}

impl Default for PowerFlowOptions {
    fn default() -> Self {
        Self {
            solver_order: vec![MethodKind::NewtonRaphson],
            retry_with_other_methods: true,
            tolerance: 1e-6,
            max_iter: 25,
            max_outer_iter: 10,
            distributed_slack: false,
            control_q: true,
            control_taps: true,
            ignore_single_node_islands: false,
            auto_promote_slack: false,
            apply_temperature_correction: false,
            branch_tolerance_mode: BranchToleranceMode::default(),
            zero_impedance_policy: ZeroImpedancePolicy::default(),
            initialize_with_existing_solution: false,
            parallel: true,
        }
    }
}

impl PowerFlowOptions {
    pub fn with_method(mut self, method: MethodKind) -> Self {
        self.solver_order = vec![method];
        self
    }

    pub fn without_retry(mut self) -> Self {
        self.retry_with_other_methods = false;
        self
    }

    /// The ordered, de-duplicated list of methods the dispatcher will try.
    pub fn method_sequence(&self) -> Vec<MethodKind> {
        let mut seq: Vec<MethodKind> = Vec::with_capacity(self.solver_order.len() + 4);
        let extra: &[MethodKind] = if self.retry_with_other_methods {
            &FALLBACK_SEQUENCE
        } else {
            &[]
        };
        for m in self.solver_order.iter().chain(extra.iter()) {
            if !seq.contains(m) {
                seq.push(*m);
            }
        }
        seq
    }
}
