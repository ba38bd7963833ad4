//! "Add these directories and make sure they work."

use super::{EnvironmentBroadcaster, RegistryStore, RemoveOutcome};
use crate::config::SetupConfig;
use crate::error::SetupError;
use crate::platform::Scope;
use crate::process::{CommandRunner, CommandSpec};
use crate::tool_kind::ToolDescriptor;
use crate::verification::VerificationResult;
use crate::verifier::DualVerifier;
use regex::Regex;
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// Which mechanism updated the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationMethod {
    /// The PowerShell script.
    PowerShell,
    /// [`RegistryStore::add_unique`] plus broadcast.
    Registry,
}

/// What [`PathPropagator::ensure_in_path`] did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropagationReport {
    /// Store that was updated.
    pub scope: Scope,
    /// Mechanism that performed the update.
    pub method: PropagationMethod,
    /// Number of directories appended.
    pub added: usize,
    /// Broadcast outcome, `None` when nothing changed and no broadcast was
    /// forced.
    pub broadcast_delivered: Option<bool>,
    /// Verification run after the settle delay.
    pub verification: VerificationResult,
    /// The write succeeded but the tool is not runnable from a fresh
    /// process yet.
    pub restart_required: bool,
}

/// Composes the store, broadcaster and verifier.
#[derive(Clone)]
pub struct PathPropagator {
    store: RegistryStore,
    broadcaster: EnvironmentBroadcaster,
    verifier: DualVerifier,
    runner: Arc<dyn CommandRunner>,
    config: Arc<SetupConfig>,
}

impl PathPropagator {
    /// Create a propagator.
    pub fn new(
        store: RegistryStore,
        broadcaster: EnvironmentBroadcaster,
        verifier: DualVerifier,
        runner: Arc<dyn CommandRunner>,
        config: Arc<SetupConfig>,
    ) -> Self {
        Self {
            store,
            broadcaster,
            verifier,
            runner,
            config,
        }
    }

    /// Ensure `candidates` are in `tool`'s PATH store, then verify once.
    ///
    /// Tries the PowerShell update first when enabled and falls back to the
    /// registry store. After either, broadcasts if anything changed, reloads
    /// this process's PATH, waits the settle delay and re-runs the verifier.
    /// A verifier that still cannot run the tool only sets
    /// `restart_required`: the install itself already succeeded.
    pub async fn ensure_in_path(
        &self,
        tool: &ToolDescriptor,
        candidates: &[String],
    ) -> Result<PropagationReport, SetupError> {
        self.propagate(tool, candidates, false).await
    }

    /// [`ensure_in_path`](Self::ensure_in_path) for a tool that is installed
    /// but not runnable.
    ///
    /// Broadcasts even when every directory is already stored: running
    /// programs that missed the earlier notification still hold the old PATH.
    pub async fn repair_path(
        &self,
        tool: &ToolDescriptor,
        candidates: &[String],
    ) -> Result<PropagationReport, SetupError> {
        self.propagate(tool, candidates, true).await
    }

    /// Remove `dir` from `scope`'s PATH and broadcast if anything changed.
    ///
    /// Matching follows the duplicate comparison, so a differently cased or
    /// tokenized form of `dir` is removed too. Absent is a no-op success.
    pub fn remove_from_path(
        &self,
        scope: Scope,
        dir: &str,
    ) -> Result<RemoveOutcome, SetupError> {
        let outcome = self.store.remove_entry(scope, dir)?;
        if outcome.changed() {
            let delivered = self
                .broadcaster
                .broadcast_with_retry(self.config.broadcast_attempts, self.config.broadcast_timeout);
            if !delivered {
                warn!(scope = %scope, "environment change broadcast was not delivered");
            }
            if let Err(e) = self.store.refresh_process_path() {
                warn!(error = %e, "could not reload this process's PATH");
            }
        }
        Ok(outcome)
    }

    async fn propagate(
        &self,
        tool: &ToolDescriptor,
        candidates: &[String],
        always_broadcast: bool,
    ) -> Result<PropagationReport, SetupError> {
        let scope = tool.path_scope;
        let stored: Vec<String> = candidates
            .iter()
            .map(|dir| self.store.storage_form(scope, dir))
            .filter(|dir| !dir.is_empty())
            .collect();

        let fast = if self.config.powershell_fast_path {
            self.powershell_update(scope, &stored).await
        } else {
            None
        };

        let (method, added) = match fast {
            Some(added) => (PropagationMethod::PowerShell, added),
            None => {
                let outcome = self.store.add_unique(scope, &stored)?;
                (PropagationMethod::Registry, outcome.added.len())
            }
        };

        let broadcast_delivered = (added > 0 || always_broadcast).then(|| {
            self.broadcaster
                .broadcast_with_retry(self.config.broadcast_attempts, self.config.broadcast_timeout)
        });
        if broadcast_delivered == Some(false) {
            warn!(tool = %tool.display_name, "environment change broadcast was not delivered");
        }

        if let Err(e) = self.store.refresh_process_path() {
            warn!(error = %e, "could not reload this process's PATH");
        }

        if !self.config.settle_delay.is_zero() {
            tokio::time::sleep(self.config.settle_delay).await;
        }

        let verification = self.verifier.verify(tool).await;
        let restart_required = !verification.execution_status.is_success();
        if restart_required {
            warn!(
                tool = %tool.display_name,
                status = verification.execution_status.label(),
                "PATH updated but the tool is not runnable yet; it may require terminal restart"
            );
        } else {
            info!(tool = %tool.display_name, added, method = ?method, "PATH ready");
        }

        Ok(PropagationReport {
            scope,
            method,
            added,
            broadcast_delivered,
            verification,
            restart_required,
        })
    }

    /// Run the PowerShell update. `Some(added)` on success, `None` to fall back.
    async fn powershell_update(&self, scope: Scope, dirs: &[String]) -> Option<usize> {
        let spec = CommandSpec::new("powershell", self.config.powershell_timeout)
            .args([
                "-NoProfile",
                "-NonInteractive",
                "-ExecutionPolicy",
                "Bypass",
                "-Command",
            ])
            .arg(powershell_script(scope, dirs))
            .direct();

        match self.runner.run(&spec).await {
            Ok(out) if out.succeeded() => match parse_added(&out.stdout) {
                Some(added) => {
                    debug!(scope = %scope, added, "PowerShell PATH update succeeded");
                    Some(added)
                }
                None => {
                    warn!(stdout = %out.stdout.trim(), "PowerShell PATH update gave no result; falling back");
                    None
                }
            },
            Ok(out) => {
                warn!(code = ?out.code, stderr = %out.diagnostic(), "PowerShell PATH update failed; falling back");
                None
            }
            Err(e) => {
                warn!(error = %e, "PowerShell unavailable; falling back to registry");
                None
            }
        }
    }
}

fn ps_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Script that appends missing `dirs` to `scope`'s raw `Path` value.
///
/// Reads the value unexpanded, compares expanded lowercase forms, writes
/// back as `ExpandString`, refreshes `$env:Path` and prints `ADDED=<n>`.
fn powershell_script(scope: Scope, dirs: &[String]) -> String {
    let candidates = dirs
        .iter()
        .map(|d| ps_quote(d))
        .collect::<Vec<_>>()
        .join(",");
    format!(
        "$ErrorActionPreference = 'Stop'; \
         $key = {key}; \
         $raw = (Get-Item -Path $key).GetValue('Path', '', 'DoNotExpandEnvironmentNames'); \
         $entries = [System.Collections.Generic.List[string]]::new(); \
         foreach ($e in ($raw -split ';')) {{ if ($e.Trim() -ne '') {{ $entries.Add($e) }} }}; \
         function Get-Key([string]$p) {{ [Environment]::ExpandEnvironmentVariables($p).Trim().Trim('\"').TrimEnd([char[]]@('\\','/')).ToLowerInvariant() }}; \
         $seen = @{{}}; foreach ($e in $entries) {{ $seen[(Get-Key $e)] = $true }}; \
         $added = 0; \
         foreach ($c in @({candidates})) {{ $k = Get-Key $c; if ($k -ne '' -and -not $seen.ContainsKey($k)) {{ $entries.Add($c); $seen[$k] = $true; $added++ }} }}; \
         if ($added -gt 0) {{ Set-ItemProperty -Path $key -Name 'Path' -Value ($entries -join ';') -Type ExpandString }}; \
         $env:Path = [Environment]::GetEnvironmentVariable('Path', 'Machine') + ';' + [Environment]::GetEnvironmentVariable('Path', 'User'); \
         Write-Output \"ADDED=$added\"",
        key = ps_quote(scope.provider_key()),
        candidates = candidates,
    )
}

fn parse_added(stdout: &str) -> Option<usize> {
    static ADDED: OnceLock<Regex> = OnceLock::new();
    let re = ADDED.get_or_init(|| Regex::new(r"ADDED=(\d+)").expect("Invalid regex pattern"));
    re.captures(stdout).and_then(|caps| caps[1].parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::process::{CommandOutput, RunError, ScriptedRunner};
    use crate::tool_kind::ToolKind;
    use crate::verification::ExecutionStatus;
    use crate::InMemoryEnvironment;

    fn propagator(
        env: Arc<InMemoryEnvironment>,
        runner: ScriptedRunner,
        config: SetupConfig,
    ) -> (Arc<ScriptedRunner>, PathPropagator) {
        let runner = Arc::new(runner);
        let config = Arc::new(config.without_delays());
        let store = RegistryStore::new(env.clone());
        let propagator = PathPropagator::new(
            store.clone(),
            EnvironmentBroadcaster::new(env),
            DualVerifier::new(store, runner.clone(), config.verification_timeout),
            runner.clone(),
            config,
        );
        (runner, propagator)
    }

    fn registry_only() -> SetupConfig {
        SetupConfig {
            powershell_fast_path: false,
            ..SetupConfig::default()
        }
    }

    #[tokio::test]
    async fn test_registry_path_adds_broadcasts_and_verifies() {
        let env = Arc::new(InMemoryEnvironment::new().with_path(Scope::Machine, r"C:\Windows"));
        let (_, propagator) = propagator(
            env.clone(),
            ScriptedRunner::new(|spec| match spec.path_override() {
                Some(path) if path.contains(r"C:\Tools\X") => Ok(CommandOutput::success("x 1.0.0")),
                _ => Err(RunError::NotFound {
                    program: spec.program.clone(),
                }),
            }),
            registry_only(),
        );
        let tool = ToolDescriptor::new("X", "x")
            .with_marker(r"Tools\X")
            .with_path_scope(Scope::Machine);

        let report = propagator
            .ensure_in_path(&tool, &[r"C:\Tools\X".to_string()])
            .await
            .unwrap();

        assert_eq!(report.method, PropagationMethod::Registry);
        assert_eq!(report.added, 1);
        assert_eq!(report.broadcast_delivered, Some(true));
        assert_eq!(report.verification.execution_status, ExecutionStatus::Success);
        assert!(!report.restart_required);
        assert_eq!(
            env.raw_value(Scope::Machine, "Path").as_deref(),
            Some(r"C:\Windows;C:\Tools\X")
        );
        assert_eq!(env.send_count(), 1);
        assert_eq!(env.process_path_updates(), 1);
    }

    #[tokio::test]
    async fn test_no_change_skips_broadcast() {
        let env = Arc::new(InMemoryEnvironment::new().with_path(Scope::User, r"C:\bin"));
        let (_, propagator) = propagator(env.clone(), ScriptedRunner::nothing_installed(), registry_only());
        let tool = ToolDescriptor::new("B", "b");
        let report = propagator
            .ensure_in_path(&tool, &[r"c:\BIN\".to_string()])
            .await
            .unwrap();
        assert_eq!(report.added, 0);
        assert_eq!(report.broadcast_delivered, None);
        assert_eq!(env.send_count(), 0);
        assert_eq!(env.write_count(), 0);
        assert!(report.restart_required);
    }

    #[tokio::test]
    async fn test_repair_broadcasts_without_writing() {
        let env = Arc::new(InMemoryEnvironment::new().with_path(Scope::User, r"C:\bin"));
        let (_, propagator) = propagator(env.clone(), ScriptedRunner::nothing_installed(), registry_only());
        let report = propagator
            .repair_path(&ToolDescriptor::new("B", "b"), &[r"C:\bin".to_string()])
            .await
            .unwrap();
        assert_eq!(report.added, 0);
        assert_eq!(report.broadcast_delivered, Some(true));
        assert_eq!(env.write_count(), 0);
        assert_eq!(env.send_count(), 1);
        assert_eq!(env.process_path_updates(), 1);
    }

    #[test]
    fn test_remove_broadcasts_only_on_change() {
        let env = Arc::new(
            InMemoryEnvironment::new().with_path(Scope::Machine, r"C:\Windows;C:\Tools\X"),
        );
        let (_, propagator) = propagator(env.clone(), ScriptedRunner::nothing_installed(), registry_only());

        let outcome = propagator
            .remove_from_path(Scope::Machine, r"c:\tools\x\")
            .unwrap();
        assert_eq!(outcome.removed, vec![r"C:\Tools\X".to_string()]);
        assert_eq!(env.raw_value(Scope::Machine, "Path").as_deref(), Some(r"C:\Windows"));
        assert_eq!(env.send_count(), 1);

        let outcome = propagator
            .remove_from_path(Scope::Machine, r"C:\Tools\X")
            .unwrap();
        assert!(!outcome.changed());
        assert_eq!(env.write_count(), 1);
        assert_eq!(env.send_count(), 1);
    }

    #[test]
    fn test_remove_permission_denied_is_path_write_failure() {
        let env = Arc::new(
            InMemoryEnvironment::new()
                .with_path(Scope::Machine, r"C:\Tools\X")
                .deny_machine_writes(),
        );
        let (_, propagator) = propagator(env.clone(), ScriptedRunner::nothing_installed(), registry_only());
        let err = propagator
            .remove_from_path(Scope::Machine, r"C:\Tools\X")
            .unwrap_err();
        assert!(matches!(err, SetupError::PathWritePermission { .. }));
        assert_eq!(env.send_count(), 0);
    }

    #[tokio::test]
    async fn test_permission_denied_is_path_write_failure() {
        let env = Arc::new(InMemoryEnvironment::new().deny_machine_writes());
        let (_, propagator) = propagator(env, ScriptedRunner::nothing_installed(), registry_only());
        let err = propagator
            .ensure_in_path(&ToolKind::NodeJs.descriptor(), &[r"C:\Program Files\nodejs".to_string()])
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            SetupError::PathWritePermission {
                scope: Scope::Machine,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_powershell_fast_path_used_when_it_succeeds() {
        let env = Arc::new(InMemoryEnvironment::new());
        let (runner, propagator) = propagator(
            env.clone(),
            ScriptedRunner::new(|spec| match spec.program.as_str() {
                "powershell" => Ok(CommandOutput::success("ADDED=1\r\n")),
                _ => Ok(CommandOutput::success("1.0.0")),
            }),
            SetupConfig {
                powershell_fast_path: true,
                ..SetupConfig::default()
            },
        );
        let report = propagator
            .ensure_in_path(&ToolDescriptor::new("X", "x"), &[r"C:\Tools\X".to_string()])
            .await
            .unwrap();
        assert_eq!(report.method, PropagationMethod::PowerShell);
        assert_eq!(report.added, 1);
        assert_eq!(env.write_count(), 0);
        assert_eq!(env.send_count(), 1);
        let ps = &runner.calls()[0];
        assert!(!ps.via_shell);
        assert!(ps.args.last().unwrap().contains(r"'C:\Tools\X'"));
    }

    #[tokio::test]
    async fn test_powershell_failure_falls_back() {
        let env = Arc::new(InMemoryEnvironment::new());
        let (_, propagator) = propagator(
            env.clone(),
            ScriptedRunner::new(|spec| match spec.program.as_str() {
                "powershell" => Ok(CommandOutput::failure(1, "Access denied")),
                _ => Ok(CommandOutput::success("1.0.0")),
            }),
            SetupConfig {
                powershell_fast_path: true,
                ..SetupConfig::default()
            },
        );
        let report = propagator
            .ensure_in_path(&ToolDescriptor::new("X", "x"), &[r"C:\Tools\X".to_string()])
            .await
            .unwrap();
        assert_eq!(report.method, PropagationMethod::Registry);
        assert_eq!(env.raw_value(Scope::User, "Path").as_deref(), Some(r"C:\Tools\X"));
    }

    #[test]
    fn test_script_quotes_and_targets_scope() {
        let script = powershell_script(Scope::User, &[r"C:\it's here".to_string()]);
        assert!(script.contains(r"'C:\it''s here'"));
        assert!(script.contains(r"'HKCU:\Environment'"));
        assert!(script.contains("-Type ExpandString"));
        assert!(script.contains("DoNotExpandEnvironmentNames"));
    }

    #[test]
    fn test_parse_added() {
        assert_eq!(parse_added("noise\nADDED=2\n"), Some(2));
        assert_eq!(parse_added("nothing"), None);
    }
}
