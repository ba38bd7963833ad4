//! PATH diagnosis and repair for tools that are installed but unreachable.

use crate::context::SetupContext;
use crate::error_log::FailureRecord;
use crate::path::comparison_key;
use crate::tool_kind::{ToolDescriptor, ToolKind};
use crate::verification::VerificationResult;
use futures::future::join_all;
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info, warn};

/// What [`PathRepairer::diagnose`] found for one tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathDiagnosis {
    /// Tool display name.
    pub tool: String,
    /// The verification the diagnosis was built from.
    pub verification: VerificationResult,
    /// Directories of the installation found on disk, empty when the tool
    /// runs or nothing was found.
    pub candidates: Vec<String>,
    /// Candidates in neither PATH store.
    pub missing_from_path: Vec<String>,
}

impl PathDiagnosis {
    /// The tool runs from a fresh process.
    pub fn is_runnable(&self) -> bool {
        self.verification.execution_status.is_success()
    }

    /// The tool runs, or its executable was found on disk.
    pub fn is_installed(&self) -> bool {
        self.is_runnable() || !self.candidates.is_empty()
    }

    /// Installed but not runnable: a PATH repair can fix it without a
    /// reinstall.
    pub fn needs_repair(&self) -> bool {
        !self.is_runnable() && !self.candidates.is_empty()
    }
}

/// Per-tool result of [`PathRepairer::repair_all`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairStatus {
    /// Already runnable.
    Healthy,
    /// PATH was repaired.
    Repaired {
        /// Directories appended.
        added: usize,
        /// Still not runnable from a fresh process.
        restart_required: bool,
    },
    /// The repair could not write PATH.
    Failed {
        /// Error message.
        message: String,
    },
    /// Not found on disk; only an install helps.
    NotInstalled,
}

/// One tool's line in a [`RepairSummary`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRepair {
    /// Tool display name.
    pub tool: String,
    /// What happened.
    pub status: RepairStatus,
}

/// Result of [`PathRepairer::repair_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RepairSummary {
    /// One entry per built-in tool, in tool order.
    pub tools: Vec<ToolRepair>,
}

impl RepairSummary {
    /// No repair failed. Tools that are not installed do not count.
    pub fn is_success(&self) -> bool {
        !self
            .tools
            .iter()
            .any(|t| matches!(t.status, RepairStatus::Failed { .. }))
    }

    /// Tools whose PATH was repaired.
    pub fn repaired(&self) -> impl Iterator<Item = &ToolRepair> {
        self.tools
            .iter()
            .filter(|t| matches!(t.status, RepairStatus::Repaired { .. }))
    }
}

/// Finds installed tools that fell off PATH and puts them back.
///
/// # Example
///
/// ```rust,no_run
/// # #[cfg(windows)]
/// # async fn run() {
/// use devtool_provision::{SetupConfig, SetupContext};
///
/// let summary = SetupContext::windows(SetupConfig::default())
///     .repairer()
///     .repair_all()
///     .await;
/// for line in &summary.tools {
///     println!("{}: {:?}", line.tool, line.status);
/// }
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct PathRepairer {
    ctx: SetupContext,
}

impl PathRepairer {
    /// Create a repairer over `ctx`.
    pub fn new(ctx: SetupContext) -> Self {
        Self { ctx }
    }

    /// Verify one tool and work out which directories it needs on PATH.
    pub async fn diagnose(&self, tool: &ToolDescriptor) -> PathDiagnosis {
        let verification = self.ctx.verifier().verify(tool).await;
        self.assess(tool, verification)
    }

    /// [`diagnose`](Self::diagnose) every built-in tool.
    pub async fn diagnose_all(&self) -> Vec<PathDiagnosis> {
        let descriptors: Vec<ToolDescriptor> = ToolKind::all().map(|k| k.descriptor()).collect();
        join_all(descriptors.iter().map(|tool| self.diagnose(tool))).await
    }

    /// Diagnose every built-in tool and repair the ones that need it.
    ///
    /// A failed repair is recorded and the remaining tools are still
    /// repaired.
    pub async fn repair_all(&self) -> RepairSummary {
        let mut summary = RepairSummary::default();
        for kind in ToolKind::all() {
            let tool = kind.descriptor();
            let diagnosis = self.diagnose(&tool).await;
            let status = if diagnosis.is_runnable() {
                RepairStatus::Healthy
            } else if !diagnosis.needs_repair() {
                debug!(tool = %diagnosis.tool, "not installed; nothing to repair");
                RepairStatus::NotInstalled
            } else {
                info!(tool = %diagnosis.tool, missing = ?diagnosis.missing_from_path, "repairing PATH");
                match self
                    .ctx
                    .propagator()
                    .repair_path(&tool, &diagnosis.missing_from_path)
                    .await
                {
                    Ok(report) => RepairStatus::Repaired {
                        added: report.added,
                        restart_required: report.restart_required,
                    },
                    Err(e) => {
                        warn!(tool = %diagnosis.tool, error = %e, "PATH repair failed");
                        self.ctx.error_log.record(FailureRecord::new(
                            format!("Repair {} PATH", diagnosis.tool),
                            e.to_string(),
                            e.fix_suggestion(),
                        ));
                        RepairStatus::Failed {
                            message: e.to_string(),
                        }
                    }
                }
            };
            summary.tools.push(ToolRepair {
                tool: diagnosis.tool,
                status,
            });
        }
        summary
    }

    /// Build the diagnosis for an existing verification.
    ///
    /// Candidates are the directory holding the registered executable, the
    /// well-known install directories that hold it, and the tool's other
    /// well-known directories that exist alongside them (`Git\usr\bin`).
    pub(crate) fn assess(&self, tool: &ToolDescriptor, verification: VerificationResult) -> PathDiagnosis {
        let env = &self.ctx.env;
        let mut candidates = Vec::new();

        if !verification.execution_status.is_success() {
            let found: Vec<&Path> = verification
                .executable_path
                .iter()
                .filter_map(|exe| exe.parent())
                .chain(verification.installed_dirs.iter().map(|d| d.as_path()))
                .collect();
            if !found.is_empty() {
                let mut seen = HashSet::new();
                let existing_siblings = tool
                    .install_dirs
                    .iter()
                    .filter(|dir| Path::new(&env.expand_tokens(dir.trim())).is_dir())
                    .cloned();
                for dir in found
                    .iter()
                    .map(|d| d.display().to_string())
                    .chain(existing_siblings)
                {
                    if seen.insert(comparison_key(&env.expand_tokens(&dir))) {
                        candidates.push(dir);
                    }
                }
            }
        }

        let registered: HashSet<String> = match self.ctx.store().fresh_entries() {
            Ok(entries) => entries.iter().map(|e| comparison_key(e)).collect(),
            Err(e) => {
                warn!(error = %e, "cannot read PATH for diagnosis");
                HashSet::new()
            }
        };
        let missing_from_path = candidates
            .iter()
            .filter(|dir| !registered.contains(&comparison_key(&env.expand_tokens(dir))))
            .cloned()
            .collect();

        PathDiagnosis {
            tool: tool.display_name.clone(),
            verification,
            candidates,
            missing_from_path,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SetupConfig;
    use crate::error_log::MemoryErrorLog;
    use crate::platform::Scope;
    use crate::process::{CommandOutput, ScriptedRunner};
    use crate::InMemoryEnvironment;
    use std::fs;
    use std::sync::Arc;

    fn repairer(env: Arc<InMemoryEnvironment>, runner: ScriptedRunner) -> (Arc<MemoryErrorLog>, PathRepairer) {
        let log = Arc::new(MemoryErrorLog::new());
        let config = SetupConfig {
            powershell_fast_path: false,
            ..SetupConfig::default()
        }
        .without_delays();
        let ctx = SetupContext::new(config, env, Arc::new(runner), log.clone());
        (log, PathRepairer::new(ctx))
    }

    #[tokio::test]
    async fn test_off_path_install_needs_repair() {
        let root = tempfile::tempdir().unwrap();
        let cmd = root.path().join("cmd");
        let usr = root.path().join("usr");
        fs::create_dir_all(&cmd).unwrap();
        fs::create_dir_all(&usr).unwrap();
        fs::write(cmd.join("x.exe"), b"").unwrap();
        let tool = ToolDescriptor::new("X", "x")
            .with_install_dir(cmd.display().to_string())
            .with_install_dir(usr.display().to_string())
            .with_install_dir(root.path().join("missing").display().to_string());

        let (_, repairer) = repairer(
            Arc::new(InMemoryEnvironment::new().with_path(Scope::User, &usr.display().to_string())),
            ScriptedRunner::nothing_installed(),
        );
        let diagnosis = repairer.diagnose(&tool).await;

        assert!(diagnosis.needs_repair());
        assert_eq!(
            diagnosis.candidates,
            vec![cmd.display().to_string(), usr.display().to_string()]
        );
        assert_eq!(diagnosis.missing_from_path, vec![cmd.display().to_string()]);
    }

    #[tokio::test]
    async fn test_runnable_tool_has_no_candidates() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("x.exe"), b"").unwrap();
        let tool = ToolDescriptor::new("X", "x").with_install_dir(dir.path().display().to_string());
        let (_, repairer) = repairer(
            Arc::new(InMemoryEnvironment::new()),
            ScriptedRunner::new(|_| Ok(CommandOutput::success("x 1.0.0"))),
        );
        let diagnosis = repairer.diagnose(&tool).await;
        assert!(diagnosis.is_runnable());
        assert!(!diagnosis.needs_repair());
        assert!(diagnosis.candidates.is_empty());
    }

    #[tokio::test]
    async fn test_nothing_on_disk_is_not_installed() {
        let (_, repairer) = repairer(Arc::new(InMemoryEnvironment::new()), ScriptedRunner::nothing_installed());
        let diagnosis = repairer.diagnose(&ToolDescriptor::new("X", "x")).await;
        assert!(!diagnosis.is_installed());
        assert!(!diagnosis.needs_repair());
    }

    #[tokio::test]
    async fn test_repair_all_reports_every_tool() {
        let env = Arc::new(InMemoryEnvironment::new());
        let (log, repairer) = repairer(
            env.clone(),
            ScriptedRunner::new(|spec| match spec.program.as_str() {
                "git" => Ok(CommandOutput::success("git version 2.45.1")),
                _ => Ok(CommandOutput::failure(9009, "not recognized")),
            }),
        );
        let summary = repairer.repair_all().await;

        assert_eq!(summary.tools.len(), 5);
        assert_eq!(summary.tools[0].status, RepairStatus::Healthy);
        assert!(summary.tools[1..]
            .iter()
            .all(|t| t.status == RepairStatus::NotInstalled));
        assert!(summary.is_success());
        assert_eq!(summary.repaired().count(), 0);
        assert_eq!(env.write_count(), 0);
        assert!(log.records().is_empty());
    }
}
