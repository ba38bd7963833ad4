//! Error types for provisioning operations.
//!
//! Every variant carries a `fix` string with an actionable suggestion,
//! available through [`SetupError::fix_suggestion`].

use crate::platform::{PlatformError, Scope};
use crate::tool_kind::PackageManager;
use std::time::Duration;
use thiserror::Error;

/// Errors that halt a tool install or a pipeline step.
///
/// # Example
///
/// ```rust
/// use devtool_provision::SetupError;
///
/// fn report(error: &SetupError) {
///     eprintln!("{} failed: {}", error.category(), error);
///     eprintln!("To fix: {}", error.fix_suggestion());
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum SetupError {
    /// No package manager is reachable after path scan and refresh-retry.
    #[error("No package manager available (tried {})", list_managers(.tried))]
    NoPackageManager {
        /// Managers that were tried.
        tried: Vec<PackageManager>,
        /// Actionable suggestion for resolving the issue.
        fix: String,
    },

    /// A tool this install depends on is not runnable.
    #[error("Missing prerequisite: {name}")]
    PrerequisiteMissing {
        /// Name of the missing prerequisite.
        name: String,
        /// Actionable suggestion for resolving the issue.
        fix: String,
    },

    /// The external installer exited non-zero or could not be run.
    #[error("Installing {tool} failed: {message}")]
    InstallerFailed {
        /// Tool being installed.
        tool: String,
        /// Captured stderr/stdout, or the reason the installer could not run.
        message: String,
        /// Exit code, if the installer ran.
        exit_code: Option<i32>,
        /// Captured standard output.
        stdout: Option<String>,
        /// Captured standard error.
        stderr: Option<String>,
        /// Actionable suggestion for resolving the issue.
        fix: String,
    },

    /// Writing a PATH store was denied.
    #[error("Permission denied updating the {scope} PATH: {message}")]
    PathWritePermission {
        /// Store that rejected the write.
        scope: Scope,
        /// OS message.
        message: String,
        /// Actionable suggestion for resolving the issue.
        fix: String,
    },

    /// Any other failure reading or writing the environment stores.
    #[error("Environment store error: {message}")]
    Registry {
        /// OS message.
        message: String,
        /// Actionable suggestion for resolving the issue.
        fix: String,
    },

    /// A subprocess exceeded its timeout.
    #[error("{operation} timed out after {duration:?}")]
    Timeout {
        /// What was running.
        operation: String,
        /// Timeout that elapsed.
        duration: Duration,
        /// Actionable suggestion for resolving the issue.
        fix: String,
    },

    /// The stop flag was observed.
    #[error("Installation cancelled")]
    Cancelled {
        /// Actionable suggestion for resolving the issue.
        fix: String,
    },

    /// A session is already running.
    #[error("An installation session is already running")]
    SessionActive {
        /// Actionable suggestion for resolving the issue.
        fix: String,
    },

    /// The background worker could not be started or died.
    #[error("Installation worker failed: {message}")]
    Worker {
        /// What went wrong.
        message: String,
        /// Actionable suggestion for resolving the issue.
        fix: String,
    },
}

fn list_managers(managers: &[PackageManager]) -> String {
    if managers.is_empty() {
        return "none".to_string();
    }
    managers
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl SetupError {
    /// Get an actionable suggestion for fixing this error.
    pub fn fix_suggestion(&self) -> &str {
        match self {
            Self::NoPackageManager { fix, .. } => fix,
            Self::PrerequisiteMissing { fix, .. } => fix,
            Self::InstallerFailed { fix, .. } => fix,
            Self::PathWritePermission { fix, .. } => fix,
            Self::Registry { fix, .. } => fix,
            Self::Timeout { fix, .. } => fix,
            Self::Cancelled { fix } => fix,
            Self::SessionActive { fix } => fix,
            Self::Worker { fix, .. } => fix,
        }
    }

    /// Failure category name.
    pub fn category(&self) -> &'static str {
        match self {
            Self::NoPackageManager { .. } => "DetectionFailure",
            Self::PrerequisiteMissing { .. } | Self::InstallerFailed { .. } => "InstallFailure",
            Self::PathWritePermission { .. } => "PathWritePermissionFailure",
            Self::Registry { .. } => "EnvironmentStoreFailure",
            Self::Timeout { .. } => "Timeout",
            Self::Cancelled { .. } => "Cancelled",
            Self::SessionActive { .. } | Self::Worker { .. } => "SessionFailure",
        }
    }

    /// Whether this is a cooperative cancellation rather than a failure.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled { .. })
    }

    /// The cancellation error.
    pub fn cancelled() -> Self {
        Self::Cancelled {
            fix: "Start the installation again to resume from the first step".to_string(),
        }
    }

    /// The detection failure for `tried`.
    pub fn no_package_manager(tried: Vec<PackageManager>) -> Self {
        Self::NoPackageManager {
            tried,
            fix: "Install Chocolatey from an elevated PowerShell (https://chocolatey.org/install) \
                  or install App Installer for winget, then restart the terminal"
                .to_string(),
        }
    }
}

impl From<PlatformError> for SetupError {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::PermissionDenied { scope, message } => Self::PathWritePermission {
                scope,
                message,
                fix: match scope {
                    Scope::Machine => {
                        "Run the installer from an elevated (Administrator) terminal".to_string()
                    }
                    Scope::User => {
                        "Check that the user environment key is not locked by policy".to_string()
                    }
                },
            },
            PlatformError::Io { scope, message } => Self::Registry {
                message: format!("{scope}: {message}"),
                fix: "Retry; if it persists, edit PATH manually in System Properties".to_string(),
            },
        }
    }
}
