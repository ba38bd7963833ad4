//! Static + dynamic tool verification.

use crate::detection::find_executable_in;
use crate::path::RegistryStore;
use crate::platform::Scope;
use crate::process::{CommandRunner, CommandSpec, RunError};
use crate::tool_kind::{ToolDescriptor, ToolKind};
use crate::verification::{ExecutionStatus, VerificationResult, VerificationSummary};
use futures::future::join_all;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Exit codes a command shell uses for "command not recognized".
const SHELL_NOT_FOUND_CODES: &[i32] = &[9009, 127];

/// Confirms a tool is both registered and runnable.
///
/// Every [`verify`](Self::verify) performs two independent checks and never
/// lets one short-circuit the other:
///
/// - **static**: the machine and user PATH values are read straight from
///   the stores (not from this process's possibly stale copy); entries are
///   matched against the tool's markers and the registered directories are
///   searched for its executable
/// - **on disk**: the tool's well-known install directories are searched
///   too, registered or not, so an install that fell off PATH can be
///   repaired instead of reinstalled
/// - **dynamic**: the tool's version command runs in a child whose `PATH` is
///   set to the freshly read machine+user union
///
/// # Example
///
/// ```rust
/// use devtool_provision::{
///     CommandOutput, DualVerifier, InMemoryEnvironment, Reconciliation, RegistryStore, Scope,
///     ScriptedRunner, ToolKind,
/// };
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let env = Arc::new(InMemoryEnvironment::new().with_path(Scope::Machine, r"C:\Program Files\Git\cmd"));
/// let runner = Arc::new(ScriptedRunner::new(|_| Ok(CommandOutput::success("git version 2.45.1"))));
/// let verifier = DualVerifier::new(RegistryStore::new(env), runner, Duration::from_secs(10));
///
/// let result = verifier.verify(&ToolKind::Git.descriptor()).await;
/// assert_eq!(result.reconciliation(), Reconciliation::FullyConfirmed);
/// # }
/// ```
#[derive(Clone)]
pub struct DualVerifier {
    store: RegistryStore,
    runner: Arc<dyn CommandRunner>,
    timeout: Duration,
}

struct StaticCheck {
    registry_found: bool,
    matched_entries: Vec<String>,
    executable_path: Option<PathBuf>,
    installed_dirs: Vec<PathBuf>,
}

impl DualVerifier {
    /// Create a verifier; `timeout` bounds the fresh-process run.
    pub fn new(store: RegistryStore, runner: Arc<dyn CommandRunner>, timeout: Duration) -> Self {
        Self {
            store,
            runner,
            timeout,
        }
    }

    /// Run both checks for one tool.
    pub async fn verify(&self, tool: &ToolDescriptor) -> VerificationResult {
        let static_check = self.static_check(tool);
        let (execution_status, version, detail) = self.dynamic_check(tool).await;

        let result = VerificationResult {
            tool: tool.display_name.clone(),
            registry_found: static_check.registry_found,
            executable_found: static_check.executable_path.is_some(),
            executable_path: static_check.executable_path,
            installed_dirs: static_check.installed_dirs,
            matched_entries: static_check.matched_entries,
            execution_status,
            version,
            detail,
        };

        let reconciliation = result.reconciliation();
        if reconciliation.is_mismatch() {
            warn!(
                tool = %result.tool,
                registry_found = result.registry_found,
                executable_found = result.executable_found,
                status = result.execution_status.label(),
                "{}",
                reconciliation.description()
            );
        } else {
            debug!(tool = %result.tool, reconciliation = ?reconciliation, "verified");
        }
        result
    }

    /// Verify every built-in tool concurrently.
    pub async fn verify_all(&self) -> VerificationSummary {
        let descriptors: Vec<ToolDescriptor> = ToolKind::all().map(|k| k.descriptor()).collect();
        let results = join_all(descriptors.iter().map(|tool| self.verify(tool))).await;
        VerificationSummary::from_results(results)
    }

    fn registered_entries(&self) -> Vec<String> {
        let mut entries = Vec::new();
        for scope in [Scope::Machine, Scope::User] {
            match self.store.read_path(scope) {
                Ok(scope_entries) => entries.extend(scope_entries),
                Err(e) => warn!(scope = %scope, error = %e, "cannot read PATH for verification"),
            }
        }
        entries
    }

    fn static_check(&self, tool: &ToolDescriptor) -> StaticCheck {
        let env = self.store.environment();
        let entries = self.registered_entries();
        let markers: Vec<String> = tool
            .expected_markers
            .iter()
            .map(|m| m.to_lowercase())
            .collect();

        let mut matched_entries = Vec::new();
        let mut dirs = Vec::new();
        for entry in entries {
            let expanded = env.expand_tokens(entry.trim());
            let lowered = expanded.to_lowercase();
            if markers.iter().any(|m| lowered.contains(m.as_str())) {
                matched_entries.push(entry.clone());
            }
            dirs.push(PathBuf::from(expanded.trim().trim_matches('"')));
        }

        let installed_dirs = tool
            .install_dirs
            .iter()
            .map(|dir| PathBuf::from(env.expand_tokens(dir.trim())))
            .filter(|dir| find_executable_in(&tool.command, std::slice::from_ref(dir)).is_some())
            .collect();

        StaticCheck {
            registry_found: !matched_entries.is_empty(),
            matched_entries,
            executable_path: find_executable_in(&tool.command, &dirs),
            installed_dirs,
        }
    }

    async fn dynamic_check(
        &self,
        tool: &ToolDescriptor,
    ) -> (ExecutionStatus, Option<String>, Option<String>) {
        let union = match self.store.fresh_union() {
            Ok(union) => union,
            Err(e) => {
                warn!(error = %e, "cannot build fresh PATH; running with an empty one");
                String::new()
            }
        };
        let spec = CommandSpec::new(&tool.command, self.timeout)
            .arg(&tool.version_flag)
            .env("PATH", union);

        match self.runner.run(&spec).await {
            Ok(out) if out.succeeded() => (
                ExecutionStatus::Success,
                out.first_line().map(str::to_string),
                None,
            ),
            Ok(out) if out.code.is_some_and(|c| SHELL_NOT_FOUND_CODES.contains(&c)) => {
                (ExecutionStatus::NotFound, None, Some(out.diagnostic()))
            }
            Ok(out) => (
                ExecutionStatus::Error,
                None,
                Some(format!("exit code {:?}: {}", out.code, out.diagnostic())),
            ),
            Err(e @ RunError::NotFound { .. }) => (ExecutionStatus::NotFound, None, Some(e.to_string())),
            Err(e @ RunError::Timeout { .. }) => (ExecutionStatus::Timeout, None, Some(e.to_string())),
            Err(e) => (ExecutionStatus::Error, None, Some(e.to_string())),
        }
    }
}
