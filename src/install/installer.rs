//! Per-tool installation.
//!
//! [`ToolInstaller::install`] checks whether a tool is already present,
//! picks an install method, runs it, hands the tool's directories to the
//! [`PathPropagator`](crate::PathPropagator) and reports the verification
//! that follows.

use crate::context::SetupContext;
use crate::error::SetupError;
use crate::error_log::FailureRecord;
use crate::install::InstallProgress;
use crate::path::PropagationReport;
use crate::process::{CommandOutput, CommandSpec, RunError};
use crate::tool_kind::{InstallSource, ToolDescriptor};
use crate::verification::{Reconciliation, VerificationResult};
use tracing::{info, warn};

/// How [`ToolInstaller::install`] satisfied the tool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Already registered and runnable; nothing was written.
    AlreadyPresent,
    /// Installed but not runnable; only the PATH was repaired.
    Repaired,
    /// Installed by `method` (a package manager name or `npm`).
    Installed {
        /// Install method used.
        method: String,
    },
}

/// Result of a successful [`ToolInstaller::install`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    /// Tool display name.
    pub tool: String,
    /// What was done.
    pub outcome: InstallOutcome,
    /// PATH propagation, if it ran and succeeded.
    pub propagation: Option<PropagationReport>,
    /// Latest verification.
    pub verification: VerificationResult,
    /// Non-fatal problems worth showing the user.
    pub warnings: Vec<String>,
}

impl InstallReport {
    /// Whether a terminal or IDE restart may be needed before the tool runs.
    pub fn restart_required(&self) -> bool {
        !self.verification.execution_status.is_success()
    }
}

/// Installs one tool at a time.
#[derive(Debug, Clone)]
pub struct ToolInstaller {
    ctx: SetupContext,
}

impl ToolInstaller {
    /// Create an installer over `ctx`.
    pub fn new(ctx: SetupContext) -> Self {
        Self { ctx }
    }

    /// Install a tool programmatically.
    ///
    /// 1. Verify. If the tool already counts as present, return at once
    ///    without touching the stores. If its executable is on disk, in a
    ///    registered directory or one of its well-known install directories,
    ///    but it is not runnable, skip straight to the PATH repair.
    /// 2. Otherwise install it: through each usable package manager in
    ///    preference order until one succeeds, or through `npm install -g`
    ///    for npm packages.
    /// 3. Ensure its directories are in PATH. A PATH failure fails the
    ///    install only for tools whose policy says so; otherwise it becomes
    ///    a warning and a failure record.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # #[cfg(windows)]
    /// # async fn run() {
    /// use devtool_provision::{SetupConfig, SetupContext, ToolKind};
    ///
    /// let installer = SetupContext::windows(SetupConfig::default()).installer();
    /// match installer
    ///     .install(&ToolKind::Git.descriptor(), |p| println!("{}", p.description()))
    ///     .await
    /// {
    ///     Ok(report) => println!("{}: {:?}", report.tool, report.outcome),
    ///     Err(e) => println!("Failed: {}. Fix: {}", e, e.fix_suggestion()),
    /// }
    /// # }
    /// ```
    pub async fn install<F>(
        &self,
        tool: &ToolDescriptor,
        on_progress: F,
    ) -> Result<InstallReport, SetupError>
    where
        F: Fn(InstallProgress) + Send + Sync,
    {
        let name = tool.display_name.clone();
        on_progress(InstallProgress::Started { tool: name.clone() });

        on_progress(InstallProgress::Verifying { tool: name.clone() });
        let current = self.ctx.verifier().verify(tool).await;
        match current.reconciliation() {
            Reconciliation::FullyConfirmed | Reconciliation::SatisfiedElsewhere => {
                info!(tool = %name, version = ?current.version, "already installed");
                on_progress(InstallProgress::Completed { tool: name.clone() });
                return Ok(InstallReport {
                    tool: name,
                    outcome: InstallOutcome::AlreadyPresent,
                    propagation: None,
                    verification: current,
                    warnings: Vec::new(),
                });
            }
            Reconciliation::StaleEnvironment | Reconciliation::Absent => {}
        }

        // A marker match alone is not enough: the npm CLIs share one directory.
        let diagnosis = self.ctx.repairer().assess(tool, current);
        if diagnosis.needs_repair() {
            info!(tool = %name, candidates = ?diagnosis.candidates, "installed but not runnable; repairing PATH");
            return self
                .finish(tool, diagnosis.candidates, InstallOutcome::Repaired, &on_progress)
                .await;
        }

        let (method, candidates) = match &tool.source {
            InstallSource::System { .. } => {
                let method = self.install_with_managers(tool, &on_progress).await?;
                (method, tool.install_dirs.clone())
            }
            InstallSource::Npm { package } => self.install_with_npm(tool, package, &on_progress).await?,
            InstallSource::Bundled { with } => {
                return Err(SetupError::PrerequisiteMissing {
                    name: with.display_name().to_string(),
                    fix: format!(
                        "Install {} first; {} ships with it",
                        with.display_name(),
                        tool.display_name
                    ),
                });
            }
        };

        self.finish(tool, candidates, InstallOutcome::Installed { method }, &on_progress)
            .await
    }

    async fn finish<F>(
        &self,
        tool: &ToolDescriptor,
        candidates: Vec<String>,
        outcome: InstallOutcome,
        on_progress: &F,
    ) -> Result<InstallReport, SetupError>
    where
        F: Fn(InstallProgress) + Send + Sync,
    {
        let name = tool.display_name.clone();
        let mut warnings = Vec::new();

        on_progress(InstallProgress::Propagating {
            tool: name.clone(),
            directories: candidates.len(),
        });
        let propagator = self.ctx.propagator();
        let propagated = if outcome == InstallOutcome::Repaired {
            propagator.repair_path(tool, &candidates).await
        } else {
            propagator.ensure_in_path(tool, &candidates).await
        };
        let (propagation, verification) = match propagated {
            Ok(report) => {
                let verification = report.verification.clone();
                (Some(report), verification)
            }
            Err(e) if tool.path_failure_is_fatal => return Err(e),
            Err(e) => {
                warn!(tool = %name, error = %e, "PATH update failed; continuing");
                self.ctx.error_log.record(FailureRecord::new(
                    name.clone(),
                    e.to_string(),
                    e.fix_suggestion(),
                ));
                warnings.push(format!("{name}: {e}"));
                (None, self.ctx.verifier().verify(tool).await)
            }
        };

        if !verification.execution_status.is_success() {
            warnings.push(format!(
                "{name} is installed but not runnable yet; restart the terminal or IDE"
            ));
        }

        on_progress(InstallProgress::Completed { tool: name.clone() });
        Ok(InstallReport {
            tool: name,
            outcome,
            propagation,
            verification,
            warnings,
        })
    }

    async fn install_with_managers<F>(
        &self,
        tool: &ToolDescriptor,
        on_progress: &F,
    ) -> Result<String, SetupError>
    where
        F: Fn(InstallProgress) + Send + Sync,
    {
        on_progress(InstallProgress::CheckingPrerequisites {
            tool: tool.display_name.clone(),
        });
        let detections = self.ctx.detector().usable_managers().await?;

        let mut last_error = None;
        for detection in detections {
            let manager = detection.manager;
            let (Some(package), Some(program)) =
                (tool.source.package_for(manager), detection.program())
            else {
                continue;
            };
            if detection.is_off_path() {
                warn!(manager = %manager, program = %program, "using package manager by full path");
            }

            on_progress(InstallProgress::Installing {
                tool: tool.display_name.clone(),
                method: manager.to_string(),
            });
            let spec = CommandSpec::new(program, self.ctx.config.package_install_timeout)
                .args(manager.install_args(package));
            match self
                .run_installer(tool, &spec, |code| manager.is_success_code(code))
                .await
            {
                Ok(_) => {
                    info!(tool = %tool.display_name, manager = %manager, "installed");
                    return Ok(manager.to_string());
                }
                Err(e) => {
                    warn!(tool = %tool.display_name, manager = %manager, error = %e, "install failed");
                    on_progress(InstallProgress::FallingBack {
                        from: manager,
                        reason: e.to_string(),
                    });
                    last_error = Some(e);
                }
            }
        }

        Err(last_error.unwrap_or_else(|| SetupError::InstallerFailed {
            tool: tool.display_name.clone(),
            message: "no usable package manager provides this tool".to_string(),
            exit_code: None,
            stdout: None,
            stderr: None,
            fix: "Install a package manager that carries this tool, or install it manually"
                .to_string(),
        }))
    }

    async fn install_with_npm<F>(
        &self,
        tool: &ToolDescriptor,
        package: &str,
        on_progress: &F,
    ) -> Result<(String, Vec<String>), SetupError>
    where
        F: Fn(InstallProgress) + Send + Sync,
    {
        let config = &self.ctx.config;
        let path = self.ctx.store().fresh_union()?;

        on_progress(InstallProgress::CheckingPrerequisites {
            tool: tool.display_name.clone(),
        });
        let query = CommandSpec::new("npm", config.npm_query_timeout)
            .arg("--version")
            .env("PATH", &path);
        match self.ctx.runner.run(&query).await {
            Ok(out) if out.succeeded() => {}
            _ => {
                return Err(SetupError::PrerequisiteMissing {
                    name: "npm (Node.js)".to_string(),
                    fix: "Install Node.js first; npm ships with it".to_string(),
                });
            }
        }

        on_progress(InstallProgress::Installing {
            tool: tool.display_name.clone(),
            method: "npm".to_string(),
        });
        let spec = CommandSpec::new("npm", config.package_install_timeout)
            .args(["install", "-g", package])
            .env("PATH", &path);
        self.run_installer(tool, &spec, |code| code == Some(0)).await?;
        info!(tool = %tool.display_name, package, "installed with npm");

        let mut candidates = Vec::new();
        let prefix_query = CommandSpec::new("npm", config.npm_query_timeout)
            .args(["config", "get", "prefix"])
            .env("PATH", &path);
        match self.ctx.runner.run(&prefix_query).await {
            Ok(out) if out.succeeded() => {
                if let Some(prefix) = out.first_line() {
                    candidates.push(prefix.to_string());
                }
            }
            Ok(out) => warn!(stderr = %out.diagnostic(), "npm prefix query failed"),
            Err(e) => warn!(error = %e, "npm prefix query failed"),
        }
        candidates.extend(tool.install_dirs.iter().cloned());
        Ok(("npm".to_string(), candidates))
    }

    async fn run_installer(
        &self,
        tool: &ToolDescriptor,
        spec: &CommandSpec,
        is_success: impl Fn(Option<i32>) -> bool,
    ) -> Result<CommandOutput, SetupError> {
        match self.ctx.runner.run(spec).await {
            Ok(out) if is_success(out.code) => Ok(out),
            Ok(out) => {
                let diagnostic = out.diagnostic();
                let message = if diagnostic.is_empty() {
                    format!("{} exited with code {:?}", spec.program, out.code)
                } else {
                    diagnostic
                };
                Err(SetupError::InstallerFailed {
                    tool: tool.display_name.clone(),
                    message,
                    exit_code: out.code,
                    stdout: Some(out.stdout),
                    stderr: Some(out.stderr),
                    fix: "See the installer output; rerun from an elevated terminal if it \
                          reports access errors"
                        .to_string(),
                })
            }
            Err(RunError::Timeout { after, .. }) => Err(SetupError::Timeout {
                operation: spec.display(),
                duration: after,
                fix: "Check network connectivity and try again, or raise package_install_timeout"
                    .to_string(),
            }),
            Err(e) => Err(SetupError::InstallerFailed {
                tool: tool.display_name.clone(),
                message: e.to_string(),
                exit_code: None,
                stdout: None,
                stderr: None,
                fix: format!("Make sure {} can be run from this terminal", spec.program),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ManagerPreference, SetupConfig};
    use crate::error_log::MemoryErrorLog;
    use crate::install::InstallProgress;
    use crate::platform::Scope;
    use crate::process::ScriptedRunner;
    use crate::tool_kind::{PackageManager, ToolKind};
    use crate::verification::ExecutionStatus;
    use crate::InMemoryEnvironment;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::{Arc, Mutex};

    struct Fixture {
        env: Arc<InMemoryEnvironment>,
        runner: Arc<ScriptedRunner>,
        log: Arc<MemoryErrorLog>,
        installer: ToolInstaller,
    }

    fn fixture(env: InMemoryEnvironment, runner: ScriptedRunner, config: SetupConfig) -> Fixture {
        let env = Arc::new(env);
        let runner = Arc::new(runner);
        let log = Arc::new(MemoryErrorLog::new());
        let config = SetupConfig {
            powershell_fast_path: false,
            chocolatey_dirs: Vec::new(),
            winget_dirs: Vec::new(),
            ..config
        }
        .without_delays();
        let ctx = SetupContext::new(config, env.clone(), runner.clone(), log.clone());
        Fixture {
            env,
            runner,
            log,
            installer: ctx.installer(),
        }
    }

    fn not_found(spec: &CommandSpec) -> Result<CommandOutput, RunError> {
        Err(RunError::NotFound {
            program: spec.program.clone(),
        })
    }

    #[tokio::test]
    async fn test_already_present_writes_nothing() {
        let f = fixture(
            InMemoryEnvironment::new().with_path(Scope::Machine, r"C:\Program Files\Git\cmd"),
            ScriptedRunner::new(|_| Ok(CommandOutput::success("git version 2.45.1"))),
            SetupConfig::default(),
        );
        let report = f
            .installer
            .install(&ToolKind::Git.descriptor(), |_| {})
            .await
            .unwrap();
        assert_eq!(report.outcome, InstallOutcome::AlreadyPresent);
        assert_eq!(f.env.write_count(), 0);
        assert_eq!(f.runner.call_count(), 1);
    }

    #[tokio::test]
    async fn test_stale_environment_repairs_without_installing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("git.exe"), b"").unwrap();
        let f = fixture(
            InMemoryEnvironment::new().with_path(Scope::Machine, &dir.path().display().to_string()),
            ScriptedRunner::new(not_found),
            SetupConfig::default(),
        );
        let report = f
            .installer
            .install(&ToolKind::Git.descriptor(), |_| {})
            .await
            .unwrap();
        assert_eq!(report.outcome, InstallOutcome::Repaired);
        assert_eq!(f.runner.calls_to("choco"), 0);
        assert!(report.restart_required());
        assert!(!report.warnings.is_empty());
    }

    #[tokio::test]
    async fn test_installs_with_primary_manager() {
        let installed = Arc::new(AtomicBool::new(false));
        let flag = installed.clone();
        let f = fixture(
            InMemoryEnvironment::new(),
            ScriptedRunner::new(move |spec| match (spec.program.as_str(), spec.args.first()) {
                ("choco", Some(arg)) if arg == "install" => {
                    flag.store(true, Ordering::SeqCst);
                    Ok(CommandOutput::success("installed"))
                }
                ("choco", _) => Ok(CommandOutput::success("2.2.2")),
                ("git", _) if flag.load(Ordering::SeqCst) => Ok(CommandOutput::success("git version 2.45.1")),
                _ => not_found(spec),
            }),
            SetupConfig::default(),
        );

        let stages = Arc::new(Mutex::new(Vec::new()));
        let sink = stages.clone();
        let report = f
            .installer
            .install(&ToolKind::Git.descriptor(), move |p| {
                sink.lock().unwrap().push(p.description())
            })
            .await
            .unwrap();

        assert!(installed.load(Ordering::SeqCst));
        assert_eq!(
            report.outcome,
            InstallOutcome::Installed {
                method: "Chocolatey".to_string()
            }
        );
        assert_eq!(report.verification.execution_status, ExecutionStatus::Success);
        assert_eq!(
            f.env.raw_value(Scope::Machine, "Path").as_deref(),
            Some(r"C:\Program Files\Git\cmd;C:\Program Files\Git\bin;C:\Program Files\Git\usr\bin")
        );
        let stages = stages.lock().unwrap();
        assert_eq!(stages.first(), Some(&"Starting installation"));
        assert_eq!(stages.last(), Some(&"Installation complete"));
    }

    #[tokio::test]
    async fn test_falls_back_to_secondary_manager() {
        let f = fixture(
            InMemoryEnvironment::new(),
            ScriptedRunner::new(|spec| match (spec.program.as_str(), spec.args.first()) {
                ("choco", Some(arg)) if arg == "install" => Ok(CommandOutput::failure(1, "checksum mismatch")),
                ("winget", Some(arg)) if arg == "install" => Ok(CommandOutput::success("ok")),
                ("choco" | "winget", _) => Ok(CommandOutput::success("1.0.0")),
                _ => not_found(spec),
            }),
            SetupConfig::default(),
        );
        let fell_back = Arc::new(AtomicBool::new(false));
        let seen = fell_back.clone();
        let report = f
            .installer
            .install(&ToolKind::NodeJs.descriptor(), move |p| {
                if matches!(p, InstallProgress::FallingBack { from: PackageManager::Chocolatey, .. }) {
                    seen.store(true, Ordering::SeqCst);
                }
            })
            .await
            .unwrap();
        assert!(fell_back.load(Ordering::SeqCst));
        assert_eq!(
            report.outcome,
            InstallOutcome::Installed {
                method: "Winget".to_string()
            }
        );
        let winget = f
            .runner
            .calls()
            .into_iter()
            .find(|s| s.program == "winget" && s.args.first().map(String::as_str) == Some("install"))
            .unwrap();
        assert!(winget.args.contains(&"OpenJS.NodeJS".to_string()));
    }

    #[tokio::test]
    async fn test_installer_failure_carries_output() {
        let f = fixture(
            InMemoryEnvironment::new(),
            ScriptedRunner::new(|spec| match (spec.program.as_str(), spec.args.first()) {
                ("choco", Some(arg)) if arg == "install" => Ok(CommandOutput::failure(1, "The package was not found")),
                ("choco", _) => Ok(CommandOutput::success("2.2.2")),
                _ => not_found(spec),
            }),
            SetupConfig {
                manager_preference: ManagerPreference::Chocolatey,
                ..SetupConfig::default()
            },
        );
        let err = f
            .installer
            .install(&ToolKind::Git.descriptor(), |_| {})
            .await
            .unwrap_err();
        match err {
            SetupError::InstallerFailed { message, exit_code, .. } => {
                assert_eq!(message, "The package was not found");
                assert_eq!(exit_code, Some(1));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_npm_prerequisite_missing() {
        let f = fixture(
            InMemoryEnvironment::new(),
            ScriptedRunner::new(not_found),
            SetupConfig::default(),
        );
        let err = f
            .installer
            .install(&ToolKind::ClaudeCli.descriptor(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, SetupError::PrerequisiteMissing { .. }));
        assert_eq!(f.runner.calls_to("npm"), 1);
    }

    #[tokio::test]
    async fn test_npm_install_uses_prefix_and_tokenizes() {
        let installed = Arc::new(AtomicBool::new(false));
        let flag = installed.clone();
        let f = fixture(
            InMemoryEnvironment::new().with_variable("APPDATA", r"C:\Users\dev\AppData\Roaming"),
            ScriptedRunner::new(move |spec| match (spec.program.as_str(), spec.args.first().map(String::as_str)) {
                ("npm", Some("--version")) => Ok(CommandOutput::success("10.2.4")),
                ("npm", Some("install")) => {
                    flag.store(true, Ordering::SeqCst);
                    Ok(CommandOutput::success("added 1 package"))
                }
                ("npm", Some("config")) => Ok(CommandOutput::success("C:\\Users\\dev\\AppData\\Roaming\\npm\r\n")),
                ("gemini", _) if flag.load(Ordering::SeqCst) => Ok(CommandOutput::success("0.1.5")),
                _ => not_found(spec),
            }),
            SetupConfig::default(),
        );
        let report = f
            .installer
            .install(&ToolKind::GeminiCli.descriptor(), |_| {})
            .await
            .unwrap();
        assert_eq!(
            report.outcome,
            InstallOutcome::Installed {
                method: "npm".to_string()
            }
        );
        assert_eq!(
            f.env.raw_value(Scope::User, "Path").as_deref(),
            Some(r"%APPDATA%\npm")
        );
        let install = &f.runner.calls()[2];
        assert_eq!(install.args, vec!["install", "-g", "@google/gemini-cli"]);
    }

    #[tokio::test]
    async fn test_soft_path_failure_is_a_warning() {
        let f = fixture(
            InMemoryEnvironment::new().deny_user_writes(),
            ScriptedRunner::new(|spec| match spec.program.as_str() {
                "npm" => Ok(CommandOutput::success("10.2.4")),
                _ => not_found(spec),
            }),
            SetupConfig::default(),
        );
        let report = f
            .installer
            .install(&ToolKind::ClaudeCli.descriptor(), |_| {})
            .await
            .unwrap();
        assert!(report.propagation.is_none());
        assert!(report.warnings.iter().any(|w| w.contains("Permission denied")));
        let records = f.log.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].step, "Claude CLI");
    }

    #[tokio::test]
    async fn test_fatal_path_failure_for_nodejs() {
        let f = fixture(
            InMemoryEnvironment::new().deny_machine_writes(),
            ScriptedRunner::new(|spec| match spec.program.as_str() {
                "choco" => Ok(CommandOutput::success("2.2.2")),
                _ => not_found(spec),
            }),
            SetupConfig::default(),
        );
        let err = f
            .installer
            .install(&ToolKind::NodeJs.descriptor(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, SetupError::PathWritePermission { .. }));
        assert!(f.log.records().is_empty());
    }

    #[tokio::test]
    async fn test_bundled_tool_needs_its_parent() {
        let f = fixture(
            InMemoryEnvironment::new(),
            ScriptedRunner::new(not_found),
            SetupConfig::default(),
        );
        let err = f
            .installer
            .install(&ToolKind::Npm.descriptor(), |_| {})
            .await
            .unwrap_err();
        assert!(matches!(err, SetupError::PrerequisiteMissing { ref name, .. } if name == "Node.js"));
    }
}
