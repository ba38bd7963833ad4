//! External commands run as black boxes.
//!
//! Package managers, `npm` and each tool's version query are judged only by
//! exit code and captured output. Everything that spawns a process goes
//! through the [`CommandRunner`] trait so the pipeline can be driven by a
//! scripted runner in tests.

mod scripted;
mod tokio_runner;

pub use scripted::ScriptedRunner;
pub use tokio_runner::TokioCommandRunner;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// A command to run, with its own timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    /// Program name or full path.
    pub program: String,
    /// Arguments, passed without shell interpretation.
    pub args: Vec<String>,
    /// Variables set for the child on top of the inherited environment.
    pub env: Vec<(String, String)>,
    /// Upper bound on the run time.
    pub timeout: Duration,
    /// Launch through the command shell so `.cmd`/`.bat` shims resolve.
    /// Only meaningful on Windows.
    pub via_shell: bool,
}

impl CommandSpec {
    /// A command with no arguments, launched through the shell.
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            env: Vec::new(),
            timeout,
            via_shell: true,
        }
    }

    /// Append one argument.
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Append several arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Set a variable for the child.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    /// Launch the program directly, never through the shell.
    pub fn direct(mut self) -> Self {
        self.via_shell = false;
        self
    }

    /// The `PATH` this command overrides, if any.
    pub fn path_override(&self) -> Option<&str> {
        self.env
            .iter()
            .rev()
            .find(|(key, _)| key.eq_ignore_ascii_case("PATH"))
            .map(|(_, value)| value.as_str())
    }

    /// `program arg1 arg2 ...` for log lines.
    pub fn display(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Captured result of a command that ran to completion.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` if the process was terminated by a signal.
    pub code: Option<i32>,
    /// Captured standard output (lossy UTF-8).
    pub stdout: String,
    /// Captured standard error (lossy UTF-8).
    pub stderr: String,
}

impl CommandOutput {
    /// Exit code 0 with the given stdout.
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Non-zero exit with the given stderr.
    pub fn failure(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Whether the process exited with code 0.
    pub fn succeeded(&self) -> bool {
        self.code == Some(0)
    }

    /// First non-blank line of stdout, falling back to stderr.
    ///
    /// Some tools print their version on stderr.
    pub fn first_line(&self) -> Option<&str> {
        [&self.stdout, &self.stderr]
            .into_iter()
            .flat_map(|stream| stream.lines())
            .map(str::trim)
            .find(|line| !line.is_empty())
    }

    /// Stderr if present, otherwise stdout, trimmed.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if stderr.is_empty() {
            self.stdout.trim().to_string()
        } else {
            stderr.to_string()
        }
    }
}

/// Why a command could not run to completion.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum RunError {
    /// The program could not be found.
    #[error("{program}: command not found")]
    NotFound {
        /// Program that was requested.
        program: String,
    },

    /// The program exists but could not be executed.
    #[error("{program}: permission denied")]
    PermissionDenied {
        /// Program that was requested.
        program: String,
    },

    /// The command exceeded its timeout and was killed.
    #[error("{program} timed out after {after:?}")]
    Timeout {
        /// Program that was requested.
        program: String,
        /// Timeout that elapsed.
        after: Duration,
    },

    /// Any other spawn or I/O failure.
    #[error("{program}: {message}")]
    Io {
        /// Program that was requested.
        program: String,
        /// OS message.
        message: String,
    },
}

/// Runs [`CommandSpec`]s.
///
/// Implementations must honor `spec.timeout` and never block past it.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Run a command and capture its output.
    ///
    /// A non-zero exit is `Ok` with the code; only failures to run to
    /// completion are `Err`.
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput, RunError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_spec_builder() {
        let spec = CommandSpec::new("choco", Duration::from_secs(5))
            .arg("install")
            .args(["git", "-y"])
            .env("PATH", "a")
            .env("Path", "b");
        assert_eq!(spec.display(), "choco install git -y");
        assert_eq!(spec.path_override(), Some("b"));
        assert!(spec.via_shell);
        assert!(!spec.clone().direct().via_shell);
    }

    #[test]
    fn test_first_line_falls_back_to_stderr() {
        let out = CommandOutput {
            code: Some(0),
            stdout: "\n  \n".to_string(),
            stderr: "v20.11.0\nextra".to_string(),
        };
        assert_eq!(out.first_line(), Some("v20.11.0"));
        assert!(out.succeeded());
    }

    #[test]
    fn test_diagnostic_prefers_stderr() {
        let out = CommandOutput {
            code: Some(1),
            stdout: "partial".to_string(),
            stderr: " ERROR: package not found \n".to_string(),
        };
        assert_eq!(out.diagnostic(), "ERROR: package not found");
        assert_eq!(CommandOutput::failure(1, "").diagnostic(), "");
    }

    #[test]
    fn test_run_error_display() {
        let err = RunError::Timeout {
            program: "winget".to_string(),
            after: Duration::from_secs(5),
        };
        assert!(err.to_string().contains("winget timed out"));
    }
}
