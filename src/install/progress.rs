//! Progress stages of a single tool install.
//!
//! [`InstallProgress`] values are passed to the callback given to
//! [`ToolInstaller::install`](crate::ToolInstaller::install).

use crate::tool_kind::PackageManager;

/// Progress stages during one tool install.
///
/// # Example
///
/// ```rust
/// use devtool_provision::InstallProgress;
///
/// fn on_progress(progress: InstallProgress) {
///     match &progress {
///         InstallProgress::Installing { tool, method } => {
///             println!("Installing {tool} via {method}...");
///         }
///         other => println!("{}", other.description()),
///     }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallProgress {
    /// The install has started.
    Started {
        /// Tool being installed.
        tool: String,
    },

    /// Checking whether the tool is already present.
    Verifying {
        /// Tool being checked.
        tool: String,
    },

    /// Checking prerequisites or package managers.
    CheckingPrerequisites {
        /// Tool being installed.
        tool: String,
    },

    /// Running an installer.
    Installing {
        /// Tool being installed.
        tool: String,
        /// Package manager or `npm`.
        method: String,
    },

    /// An installer failed and the next manager will be tried.
    FallingBack {
        /// Manager that failed.
        from: PackageManager,
        /// Why it failed.
        reason: String,
    },

    /// Updating PATH and waiting for it to take effect.
    Propagating {
        /// Tool being installed.
        tool: String,
        /// Directories handed to the propagator.
        directories: usize,
    },

    /// The tool is installed.
    Completed {
        /// Tool that was installed.
        tool: String,
    },
}

impl InstallProgress {
    /// Get a human-readable description of the current stage.
    ///
    /// # Example
    ///
    /// ```rust
    /// use devtool_provision::InstallProgress;
    ///
    /// let progress = InstallProgress::Verifying { tool: "Git".into() };
    /// assert_eq!(progress.description(), "Checking current installation");
    /// ```
    pub fn description(&self) -> &'static str {
        match self {
            Self::Started { .. } => "Starting installation",
            Self::Verifying { .. } => "Checking current installation",
            Self::CheckingPrerequisites { .. } => "Checking prerequisites",
            Self::Installing { .. } => "Installing",
            Self::FallingBack { .. } => "Trying the next package manager",
            Self::Propagating { .. } => "Updating PATH",
            Self::Completed { .. } => "Installation complete",
        }
    }

    /// Whether this stage is terminal.
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_completed_is_terminal() {
        assert!(InstallProgress::Completed { tool: "Git".into() }.is_complete());
        assert!(!InstallProgress::Started { tool: "Git".into() }.is_complete());
        assert!(!InstallProgress::FallingBack {
            from: PackageManager::Chocolatey,
            reason: "exit 1".into()
        }
        .is_complete());
    }

    #[test]
    fn test_descriptions_are_distinct() {
        let stages = [
            InstallProgress::Started { tool: "X".into() },
            InstallProgress::Verifying { tool: "X".into() },
            InstallProgress::CheckingPrerequisites { tool: "X".into() },
            InstallProgress::Installing {
                tool: "X".into(),
                method: "npm".into(),
            },
            InstallProgress::Propagating {
                tool: "X".into(),
                directories: 1,
            },
            InstallProgress::Completed { tool: "X".into() },
        ];
        let mut seen: Vec<_> = stages.iter().map(|s| s.description()).collect();
        seen.dedup();
        assert_eq!(seen.len(), stages.len());
    }
}
