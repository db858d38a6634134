use derive_more::Display;
use serde::{Deserialize, Serialize};

/// Kind of network element an issue is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum DeviceKind {
    #[display("bus")]
    Bus,
    #[display("branch")]
    Branch,
    #[display("generator")]
    Generator,
    #[display("battery")]
    Battery,
    #[display("load")]
    Load,
    #[display("shunt")]
    Shunt,
    #[display("hvdc")]
    Hvdc,
    #[display("island")]
    Island,
}

/// Identity of a device in global (snapshot) numbering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[display("{kind} {index}")]
pub struct DeviceRef {
    pub kind: DeviceKind,
    pub index: usize,
}

impl DeviceRef {
    pub fn new(kind: DeviceKind, index: usize) -> Self {
        Self { kind, index }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display, Serialize, Deserialize)]
pub enum Severity {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
pub enum IssueKind {
    #[display("near-zero series impedance")]
    ZeroImpedance,
    #[display("zero tap module")]
    ZeroTapModule,
    #[display("zero rating")]
    ZeroRating,
    #[display("zero nominal voltage")]
    ZeroNominalVoltage,
    #[display("conflicting voltage set-points")]
    ConflictingSetPoint,
    #[display("no reference bus")]
    NoSlack,
    #[display("slack promoted")]
    SlackPromoted,
    #[display("reactive power limit reached")]
    ReactiveLimit,
    #[display("regulating tap out of range")]
    TapOutOfRange,
    #[display("regulated bus outside the island")]
    ControlOutsideIsland,
    #[display("solution rejected")]
    RejectedSolution,
    #[display("did not converge")]
    NotConverged,
}

/// One entry of the structured data-quality log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DataIssue {
    pub severity: Severity,
    pub kind: IssueKind,
    pub device: DeviceRef,
    pub value: Option<f64>,
    pub expected: Option<f64>,
}

impl std::fmt::Display for DataIssue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}: {}", self.severity, self.device, self.kind)?;
        if let Some(v) = self.value {
            write!(f, " (value {v:.4e}")?;
            match self.expected {
                Some(e) => write!(f, ", expected {e:.4e})")?,
                None => write!(f, ")")?,
            }
        }
        Ok(())
    }
}

/// Append-only list of data-quality issues found while solving.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    issues: Vec<DataIssue>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an issue and mirrors it to the `tracing` log at the matching level.
    pub fn push(&mut self, issue: DataIssue) {
        match issue.severity {
            Severity::Info => tracing::info!("{issue}"),
            Severity::Warning => tracing::warn!("{issue}"),
            Severity::Error => tracing::error!("{issue}"),
        }
        self.issues.push(issue);
    }

    pub fn report(&mut self, severity: Severity, kind: IssueKind, device: DeviceRef) {
        self.push(DataIssue {
            severity,
            kind,
            device,
            value: None,
            expected: None,
        });
    }

    pub fn report_value(
        &mut self,
        severity: Severity,
        kind: IssueKind,
        device: DeviceRef,
        value: f64,
        expected: Option<f64>,
    ) {
        self.push(DataIssue {
            severity,
            kind,
            device,
            value: Some(value),
            expected,
        });
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.issues.extend(other.issues);
    }

    pub fn issues(&self) -> &[DataIssue] {
        &self.issues
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty()
    }

    pub fn len(&self) -> usize {
        self.issues.len()
    }

    pub fn has(&self, kind: IssueKind) -> bool {
        self.issues.iter().any(|i| i.kind == kind)
    }

    pub fn of_kind(&self, kind: IssueKind) -> impl Iterator<Item = &DataIssue> {
        self.issues.iter().filter(move |i| i.kind == kind)
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.issues.iter().map(|i| i.severity).max()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_issue_display() {
        let mut log = Diagnostics::new();
        log.report_value(
            Severity::Warning,
            IssueKind::ZeroImpedance,
            DeviceRef::new(DeviceKind::Branch, 3),
            0.0,
            Some(1e-6),
        );
        log.report(
            Severity::Error,
            IssueKind::NoSlack,
            DeviceRef::new(DeviceKind::Island, 1),
        );
        assert_eq!(log.len(), 2);
        assert!(log.has(IssueKind::NoSlack));
        assert_eq!(log.max_severity(), Some(Severity::Error));
        let text = log.issues()[0].to_string();
        assert!(
            text.starts_with("[Warning] branch 3: near-zero series impedance"),
            "unexpected text {text}"
        );
        assert_eq!(
            log.issues()[1].to_string(),
            "[Error] island 1: no reference bus"
        );
    }
}
