//! Subprocess execution on tokio with a hard timeout.

use super::{CommandOutput, CommandRunner, CommandSpec, RunError};
use async_trait::async_trait;
use std::process::Stdio;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::debug;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

/// [`CommandRunner`] that spawns real processes.
///
/// Children are killed if the timeout elapses. On Windows, shell launches
/// go through `cmd /C` so that `npm`, `claude` and other `.cmd` shims
/// resolve against the child's `PATH`, and no console window is shown.
#[derive(Debug, Default, Clone, Copy)]
pub struct TokioCommandRunner;

impl TokioCommandRunner {
    /// Create a runner.
    pub fn new() -> Self {
        Self
    }

    fn build(spec: &CommandSpec) -> Command {
        #[cfg(windows)]
        let mut command = {
            let mut command = if spec.via_shell {
                let mut command = Command::new("cmd");
                command.arg("/C").arg(&spec.program);
                command
            } else {
                Command::new(&spec.program)
            };
            command.creation_flags(CREATE_NO_WINDOW);
            command
        };

        #[cfg(not(windows))]
        let mut command = Command::new(&spec.program);

        command
            .args(&spec.args)
            .envs(spec.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        command
    }
}

#[async_trait]
impl CommandRunner for TokioCommandRunner {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunError> {
        debug!(command = %spec.display(), timeout = ?spec.timeout, "running command");

        let output = timeout(spec.timeout, Self::build(spec).output())
            .await
            .map_err(|_| RunError::Timeout {
                program: spec.program.clone(),
                after: spec.timeout,
            })?
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => RunError::NotFound {
                    program: spec.program.clone(),
                },
                std::io::ErrorKind::PermissionDenied => RunError::PermissionDenied {
                    program: spec.program.clone(),
                },
                _ => RunError::Io {
                    program: spec.program.clone(),
                    message: e.to_string(),
                },
            })?;

        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        debug!(command = %spec.program, code = ?result.code, "command finished");
        Ok(result)
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_run_captures_output() {
        let spec = CommandSpec::new("sh", Duration::from_secs(5)).args(["-c", "echo hello"]);
        let out = TokioCommandRunner::new().run(&spec).await.unwrap();
        assert!(out.succeeded());
        assert_eq!(out.first_line(), Some("hello"));
    }

    #[tokio::test]
    async fn test_run_nonzero_exit_is_ok() {
        let spec =
            CommandSpec::new("sh", Duration::from_secs(5)).args(["-c", "echo oops >&2; exit 3"]);
        let out = TokioCommandRunner::new().run(&spec).await.unwrap();
        assert_eq!(out.code, Some(3));
        assert_eq!(out.diagnostic(), "oops");
    }

    #[tokio::test]
    async fn test_run_not_found() {
        let spec = CommandSpec::new("/nonexistent/path/to/executable", Duration::from_secs(5));
        let err = TokioCommandRunner::new().run(&spec).await.unwrap_err();
        assert!(matches!(err, RunError::NotFound { .. }));
    }

    #[tokio::test]
    async fn test_run_timeout() {
        let spec = CommandSpec::new("sleep", Duration::from_millis(50)).arg("5");
        let err = TokioCommandRunner::new().run(&spec).await.unwrap_err();
        assert!(matches!(err, RunError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_run_env_override() {
        let spec = CommandSpec::new("sh", Duration::from_secs(5))
            .args(["-c", "echo $PROVISION_MARKER"])
            .env("PROVISION_MARKER", "set-by-spec");
        let out = TokioCommandRunner::new().run(&spec).await.unwrap();
        assert_eq!(out.first_line(), Some("set-by-spec"));
    }
}
