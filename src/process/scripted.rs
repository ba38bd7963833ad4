//! Scripted command runner.

use super::{CommandOutput, CommandRunner, CommandSpec, RunError};
use async_trait::async_trait;
use std::sync::Mutex;

type Handler = dyn Fn(&CommandSpec) -> Result<CommandOutput, RunError> + Send + Sync;

/// [`CommandRunner`] that answers from a closure and records every call.
///
/// # Example
///
/// ```rust
/// use devtool_provision::{CommandOutput, CommandRunner, CommandSpec, RunError, ScriptedRunner};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let runner = ScriptedRunner::new(|spec| match spec.program.as_str() {
///     "git" => Ok(CommandOutput::success("git version 2.45.1.windows.1")),
///     other => Err(RunError::NotFound { program: other.to_string() }),
/// });
///
/// let out = runner.run(&CommandSpec::new("git", Duration::from_secs(5))).await.unwrap();
/// assert!(out.succeeded());
/// assert_eq!(runner.calls_to("git"), 1);
/// # }
/// ```
pub struct ScriptedRunner {
    handler: Box<Handler>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    /// Answer every command with `handler`.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&CommandSpec) -> Result<CommandOutput, RunError> + Send + Sync + 'static,
    {
        Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// A runner for which no program exists.
    pub fn nothing_installed() -> Self {
        Self::new(|spec| {
            Err(RunError::NotFound {
                program: spec.program.clone(),
            })
        })
    }

    /// Every command run so far, in order.
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of commands run so far.
    pub fn call_count(&self) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    /// Number of commands run for `program`.
    pub fn calls_to(&self, program: &str) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .iter()
            .filter(|spec| spec.program == program)
            .count()
    }
}

impl std::fmt::Debug for ScriptedRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedRunner")
            .field("calls", &self.call_count())
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CommandRunner for ScriptedRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunError> {
        self.calls
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(spec.clone());
        (self.handler)(spec)
    }
}
