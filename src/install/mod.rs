//! Tool installation.
//!
//! - [`ToolInstaller`]: check, install, propagate, verify
//! - [`InstallProgress`]: stages reported to the caller's callback
//! - [`InstallReport`] / [`InstallOutcome`]: what happened
//! - [`PathRepairer`]: put installed but unreachable tools back on PATH

mod installer;
mod progress;
mod repair;

pub use installer::{InstallOutcome, InstallReport, ToolInstaller};
pub use progress::InstallProgress;
pub use repair::{PathDiagnosis, PathRepairer, RepairStatus, RepairSummary, ToolRepair};
