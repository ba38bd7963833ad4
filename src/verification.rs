//! Verification results and their reconciliation.

use crate::detection::parse_version;
use semver::Version;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Outcome of running a tool's version command in a fresh process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Exited 0 with output captured.
    Success,
    /// The executable could not be found.
    NotFound,
    /// The command did not finish in time.
    Timeout,
    /// Any other failure, including non-zero exits.
    Error,
}

impl ExecutionStatus {
    /// Whether the tool ran.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }

    /// Short lowercase label.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::NotFound => "not_found",
            Self::Timeout => "timeout",
            Self::Error => "error",
        }
    }
}

/// What the static and dynamic checks mean together.
///
/// Used for diagnostics; it never overrides either signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reconciliation {
    /// Registered and runnable.
    FullyConfirmed,
    /// Registered but not runnable from a fresh process. A terminal or IDE
    /// restart may be needed.
    StaleEnvironment,
    /// Runnable although no registered entry matched the heuristics.
    SatisfiedElsewhere,
    /// Neither registered nor runnable.
    Absent,
}

impl Reconciliation {
    /// Combine the two signals. Any non-success execution counts as not runnable.
    pub fn from_signals(static_found: bool, execution: ExecutionStatus) -> Self {
        match (static_found, execution.is_success()) {
            (true, true) => Self::FullyConfirmed,
            (true, false) => Self::StaleEnvironment,
            (false, true) => Self::SatisfiedElsewhere,
            (false, false) => Self::Absent,
        }
    }

    /// Whether the tool can be treated as present.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::FullyConfirmed | Self::SatisfiedElsewhere)
    }

    /// Whether the two checks disagree.
    pub fn is_mismatch(&self) -> bool {
        matches!(self, Self::StaleEnvironment | Self::SatisfiedElsewhere)
    }

    /// Human-readable meaning.
    pub fn description(&self) -> &'static str {
        match self {
            Self::FullyConfirmed => "fully confirmed",
            Self::StaleEnvironment => {
                "registered but not runnable from a fresh process; a terminal restart may be required"
            }
            Self::SatisfiedElsewhere => "runnable through a PATH entry outside the expected locations",
            Self::Absent => "not installed",
        }
    }
}

/// Per-tool result of a [`DualVerifier`](crate::DualVerifier) run.
///
/// Derived on every check and never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationResult {
    /// Tool display name.
    pub tool: String,
    /// A registered PATH entry matched one of the tool's markers.
    pub registry_found: bool,
    /// The executable exists in a registered PATH directory.
    pub executable_found: bool,
    /// Where the executable was found, if it was.
    pub executable_path: Option<PathBuf>,
    /// The tool's well-known install directories that hold its executable,
    /// registered or not. Not part of the static signal: a tool sitting on
    /// disk outside PATH is still absent, but repairable.
    pub installed_dirs: Vec<PathBuf>,
    /// Registered entries that matched a marker, as stored.
    pub matched_entries: Vec<String>,
    /// Result of the fresh-process run.
    pub execution_status: ExecutionStatus,
    /// First line of version output on success.
    pub version: Option<String>,
    /// Failure detail from the fresh-process run.
    pub detail: Option<String>,
}

impl VerificationResult {
    /// Static signal: a marker matched or the executable was found.
    pub fn static_found(&self) -> bool {
        self.registry_found || self.executable_found
    }

    /// Combined meaning of both signals.
    pub fn reconciliation(&self) -> Reconciliation {
        Reconciliation::from_signals(self.static_found(), self.execution_status)
    }

    /// Whether the tool can be treated as present.
    pub fn is_usable(&self) -> bool {
        self.reconciliation().is_success()
    }

    /// Semantic version parsed from [`version`](Self::version), if any.
    ///
    /// `v20.11.0` and `git version 2.45.1.windows.1` both parse.
    pub fn semver(&self) -> Option<Version> {
        self.version.as_deref().and_then(|v| parse_version(v).ok())
    }
}

/// Aggregate of a verify-all sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationSummary {
    /// Tools checked.
    pub total: usize,
    /// Tools with a static hit.
    pub registry_found: usize,
    /// Tools that ran from a fresh process.
    pub runnable: usize,
    /// Tools whose two signals disagree.
    pub discrepancies: usize,
    /// Individual results in check order.
    pub results: Vec<VerificationResult>,
}

impl VerificationSummary {
    /// Summarize a set of results.
    pub fn from_results(results: Vec<VerificationResult>) -> Self {
        Self {
            total: results.len(),
            registry_found: results.iter().filter(|r| r.static_found()).count(),
            runnable: results
                .iter()
                .filter(|r| r.execution_status.is_success())
                .count(),
            discrepancies: results
                .iter()
                .filter(|r| r.reconciliation().is_mismatch())
                .count(),
            results,
        }
    }

    /// Results for tools that did not run.
    pub fn not_runnable(&self) -> impl Iterator<Item = &VerificationResult> {
        self.results
            .iter()
            .filter(|r| !r.execution_status.is_success())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(registry: bool, status: ExecutionStatus) -> VerificationResult {
        VerificationResult {
            tool: "X".to_string(),
            registry_found: registry,
            executable_found: false,
            executable_path: None,
            installed_dirs: Vec::new(),
            matched_entries: Vec::new(),
            execution_status: status,
            version: None,
            detail: None,
        }
    }

    #[test]
    fn test_reconciliation_table() {
        use ExecutionStatus::*;
        assert_eq!(
            result(true, Success).reconciliation(),
            Reconciliation::FullyConfirmed
        );
        assert_eq!(
            result(true, NotFound).reconciliation(),
            Reconciliation::StaleEnvironment
        );
        assert_eq!(
            result(true, Timeout).reconciliation(),
            Reconciliation::StaleEnvironment
        );
        assert_eq!(
            result(false, Success).reconciliation(),
            Reconciliation::SatisfiedElsewhere
        );
        assert_eq!(
            result(false, NotFound).reconciliation(),
            Reconciliation::Absent
        );
        assert_eq!(result(false, Error).reconciliation(), Reconciliation::Absent);
    }

    #[test]
    fn test_executable_alone_is_static_hit() {
        let mut r = result(false, ExecutionStatus::NotFound);
        r.executable_found = true;
        assert_eq!(r.reconciliation(), Reconciliation::StaleEnvironment);
    }

    #[test]
    fn test_success_classes() {
        assert!(Reconciliation::FullyConfirmed.is_success());
        assert!(Reconciliation::SatisfiedElsewhere.is_success());
        assert!(!Reconciliation::StaleEnvironment.is_success());
        assert!(!Reconciliation::Absent.is_mismatch());
    }

    #[test]
    fn test_semver_from_version_line() {
        let mut r = result(true, ExecutionStatus::Success);
        r.version = Some("git version 2.45.1.windows.1".to_string());
        assert_eq!(r.semver(), Some(Version::new(2, 45, 1)));
        r.version = Some("v20.11.0".to_string());
        assert_eq!(r.semver(), Some(Version::new(20, 11, 0)));
        r.version = None;
        assert_eq!(r.semver(), None);
    }

    #[test]
    fn test_summary() {
        let summary = VerificationSummary::from_results(vec![
            result(true, ExecutionStatus::Success),
            result(true, ExecutionStatus::Timeout),
            result(false, ExecutionStatus::Success),
            result(false, ExecutionStatus::NotFound),
        ]);
        assert_eq!(summary.total, 4);
        assert_eq!(summary.registry_found, 2);
        assert_eq!(summary.runnable, 2);
        assert_eq!(summary.discrepancies, 2);
        assert_eq!(summary.not_runnable().count(), 2);
    }

    #[test]
    fn test_status_serializes_snake_case() {
        let json = serde_json::to_string(&ExecutionStatus::NotFound).unwrap();
        assert_eq!(json, "\"not_found\"");
        assert_eq!(ExecutionStatus::NotFound.label(), "not_found");
    }
}
