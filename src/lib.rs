//! # devtool-provision
//!
//! Unattended provisioning of a Windows developer workstation: Chocolatey
//! (or winget), Git, Node.js, npm and the Claude and Gemini coding CLIs.
//!
//! Installing a tool is the easy part. The hard part is that a freshly
//! installed tool is usually not invocable from the installer's own process
//! or from terminals opened before the install. This crate writes PATH
//! changes to the persistent machine and user stores, broadcasts the change
//! to running programs, and then verifies each tool twice: statically
//! (PATH entries and files on disk) and dynamically (running it in a child
//! whose PATH is rebuilt from the stores).
//!
//! ## Features
//!
//! - [`RegistryStore`] reads and writes the stored PATH without expanding
//!   `%VAR%` tokens and never duplicates an entry
//! - [`EnvironmentBroadcaster`] tells running programs the environment changed
//! - [`PathPropagator`] adds directories, broadcasts and verifies
//! - [`DualVerifier`] reconciles the static and dynamic checks
//! - [`PackageManagerDetector`] finds Chocolatey and winget, on PATH or not
//! - [`ToolInstaller`] installs one tool with progress callbacks
//! - [`PathRepairer`] finds installed tools that fell off PATH and puts
//!   them back without reinstalling
//! - [`AutoInstaller`] runs the six-step pipeline on a worker thread with
//!   cooperative cancellation
//!
//! All host access goes through [`PlatformEnvironment`] and [`CommandRunner`],
//! so the whole pipeline runs against [`InMemoryEnvironment`] and
//! [`ScriptedRunner`] on any OS.
//!
//! ## Example
//!
//! ```rust,no_run
//! # #[cfg(windows)]
//! # fn main() -> Result<(), devtool_provision::SetupError> {
//! use devtool_provision::{AutoInstaller, SetupConfig, SetupContext};
//!
//! let mut installer = AutoInstaller::new(SetupContext::windows(SetupConfig::default()));
//! let session = installer.start()?;
//! if let Some(outcome) = session.wait() {
//!     println!("{outcome:?}");
//! }
//! # Ok(())
//! # }
//! # #[cfg(not(windows))]
//! # fn main() {}
//! ```

mod config;
mod context;
mod detection;
mod error;
mod error_log;
mod install;
mod orchestrator;
mod path;
mod platform;
mod process;
mod tool_kind;
mod verification;
mod verifier;

pub use config::{BootstrapCommand, ConfigError, ManagerPreference, SetupConfig};
pub use context::SetupContext;
pub use detection::{
    find_executable_in, parse_version, Detection, DetectionStatus, PackageManagerDetector,
    VersionParseError,
};
pub use error::SetupError;
pub use error_log::{ErrorLogManager, FailureRecord, MemoryErrorLog, TracingErrorLog};
pub use install::{
    InstallOutcome, InstallProgress, InstallReport, PathDiagnosis, PathRepairer, RepairStatus,
    RepairSummary, ToolInstaller, ToolRepair,
};
pub use orchestrator::{
    detect_with_retry, standard_steps, AutoInstaller, InstallationSession, InstallationStep,
    PipelineOutcome, ProgressBand, ProgressReporter, SessionEvent, StepAction, StepContext,
    StepOrchestrator, StopFlag,
};
pub use path::{
    comparison_key, expand_with, join_entries, split_entries, tokenize_appdata, AddOutcome,
    EnvironmentBroadcaster, PathEntry, PathPropagator, PropagationMethod, PropagationReport,
    RegistryStore, RemoveOutcome, PROCESS_SEPARATOR, STORE_SEPARATOR,
};
#[cfg(windows)]
pub use platform::WindowsEnvironment;
pub use platform::{InMemoryEnvironment, PlatformEnvironment, PlatformError, Scope, ValueKind};
pub use process::{
    CommandOutput, CommandRunner, CommandSpec, RunError, ScriptedRunner, TokioCommandRunner,
};
pub use tool_kind::{InstallSource, PackageManager, ToolDescriptor, ToolKind};
pub use verification::{ExecutionStatus, Reconciliation, VerificationResult, VerificationSummary};
pub use verifier::DualVerifier;
