//! Provisioning configuration.
//!
//! [`SetupConfig`] is a plain value handed to every component constructor.
//! All fields have defaults, so a JSON file only needs to name what it
//! overrides. Durations are written as integer milliseconds.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Which package managers installs may use.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum::EnumString,
    strum::Display,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum ManagerPreference {
    /// Every usable manager, primary first.
    #[default]
    Auto,
    /// Chocolatey only.
    Chocolatey,
    /// Winget only.
    Winget,
}

/// Command that installs the primary package manager when it is missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BootstrapCommand {
    /// Program to run.
    pub program: String,
    /// Arguments.
    pub args: Vec<String>,
}

impl Default for BootstrapCommand {
    fn default() -> Self {
        Self {
            program: "powershell".to_string(),
            args: vec![
                "-NoProfile".to_string(),
                "-InputFormat".to_string(),
                "None".to_string(),
                "-ExecutionPolicy".to_string(),
                "Bypass".to_string(),
                "-Command".to_string(),
                "[System.Net.ServicePointManager]::SecurityProtocol = \
                 [System.Net.ServicePointManager]::SecurityProtocol -bor 3072; \
                 iex ((New-Object System.Net.WebClient).DownloadString('https://community.chocolatey.org/install.ps1'))"
                    .to_string(),
            ],
        }
    }
}

/// Configuration for one provisioning run.
///
/// # Example
///
/// ```rust
/// use devtool_provision::{ManagerPreference, SetupConfig};
/// use std::time::Duration;
///
/// let config: SetupConfig =
///     serde_json::from_str(r#"{ "manager_preference": "winget", "settle_delay": 500 }"#).unwrap();
/// assert_eq!(config.manager_preference, ManagerPreference::Winget);
/// assert_eq!(config.settle_delay, Duration::from_millis(500));
/// assert_eq!(config.detection_attempts, 3);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SetupConfig {
    /// `M --version` queries during package-manager detection.
    #[serde(with = "duration_ms")]
    pub version_check_timeout: Duration,
    /// Fresh-process version run in the verifier.
    #[serde(with = "duration_ms")]
    pub verification_timeout: Duration,
    /// Package-manager and npm installs.
    #[serde(with = "duration_ms")]
    pub package_install_timeout: Duration,
    /// Primary package-manager bootstrap.
    #[serde(with = "duration_ms")]
    pub bootstrap_timeout: Duration,
    /// PowerShell PATH update.
    #[serde(with = "duration_ms")]
    pub powershell_timeout: Duration,
    /// `npm config get prefix` and the npm prerequisite check.
    #[serde(with = "duration_ms")]
    pub npm_query_timeout: Duration,
    /// Attempts in the step-2 detection loop.
    pub detection_attempts: u32,
    /// Wait between detection attempts.
    #[serde(with = "duration_ms")]
    pub detection_backoff: Duration,
    /// Wait after a PATH update before re-verifying.
    #[serde(with = "duration_ms")]
    pub settle_delay: Duration,
    /// Per-attempt timeout of the blocking broadcast.
    #[serde(with = "duration_ms")]
    pub broadcast_timeout: Duration,
    /// Combined broadcast attempts.
    pub broadcast_attempts: u32,
    /// Capacity of the session event queue.
    pub event_queue_capacity: usize,
    /// How often the caller drains the event queue.
    #[serde(with = "duration_ms")]
    pub poll_interval: Duration,
    /// Try the PowerShell PATH update before the registry fallback.
    pub powershell_fast_path: bool,
    /// Which package managers installs may use.
    pub manager_preference: ManagerPreference,
    /// Well-known Chocolatey `bin` directories.
    pub chocolatey_dirs: Vec<String>,
    /// Well-known winget directories.
    pub winget_dirs: Vec<String>,
    /// Primary package-manager bootstrap.
    pub bootstrap: BootstrapCommand,
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            version_check_timeout: Duration::from_secs(5),
            verification_timeout: Duration::from_secs(10),
            package_install_timeout: Duration::from_secs(300),
            bootstrap_timeout: Duration::from_secs(300),
            powershell_timeout: Duration::from_secs(30),
            npm_query_timeout: Duration::from_secs(10),
            detection_attempts: 3,
            detection_backoff: Duration::from_secs(2),
            settle_delay: Duration::from_secs(2),
            broadcast_timeout: Duration::from_millis(5000),
            broadcast_attempts: 3,
            event_queue_capacity: 256,
            poll_interval: Duration::from_millis(100),
            powershell_fast_path: cfg!(windows),
            manager_preference: ManagerPreference::Auto,
            chocolatey_dirs: vec![
                r"C:\ProgramData\chocolatey\bin".to_string(),
                r"C:\Chocolatey\bin".to_string(),
            ],
            winget_dirs: vec![r"%LOCALAPPDATA%\Microsoft\WindowsApps".to_string()],
            bootstrap: BootstrapCommand::default(),
        }
    }
}

impl SetupConfig {
    /// Load a JSON file; missing fields keep their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    /// Zero every settle and backoff delay, keeping timeouts.
    pub fn without_delays(mut self) -> Self {
        self.detection_backoff = Duration::ZERO;
        self.settle_delay = Duration::ZERO;
        self
    }

    /// Well-known directories for a package manager.
    pub fn manager_dirs(&self, manager: crate::PackageManager) -> &[String] {
        match manager {
            crate::PackageManager::Chocolatey => &self.chocolatey_dirs,
            crate::PackageManager::Winget => &self.winget_dirs,
        }
    }
}

/// Errors loading a [`SetupConfig`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// The file could not be read.
    #[error("cannot read config {}: {message}", .path.display())]
    Read {
        /// File path.
        path: PathBuf,
        /// OS message.
        message: String,
    },
    /// The file is not valid JSON for this schema.
    #[error("invalid config {}: {message}", .path.display())]
    Parse {
        /// File path.
        path: PathBuf,
        /// Parser message.
        message: String,
    },
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
