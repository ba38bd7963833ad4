//! Tool identities and their descriptors.

use crate::platform::Scope;
use serde::{Deserialize, Serialize};
use strum::IntoEnumIterator;

/// The developer tools the pipeline provisions.
///
/// Marked `#[non_exhaustive]` so new tools can be added; match with a
/// wildcard arm.
///
/// # Example
///
/// ```rust
/// use devtool_provision::ToolKind;
///
/// for kind in ToolKind::all() {
///     println!("{}: {}", kind.display_name(), kind.command());
/// }
/// assert_eq!(ToolKind::NodeJs.command(), "node");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::EnumIter)]
#[non_exhaustive]
pub enum ToolKind {
    /// Git for Windows.
    Git,
    /// Node.js runtime.
    NodeJs,
    /// npm, shipped with Node.js.
    Npm,
    /// Anthropic's Claude Code CLI (`claude`).
    ClaudeCli,
    /// Google's Gemini CLI (`gemini`).
    GeminiCli,
}

impl ToolKind {
    /// Command used to invoke the tool.
    pub fn command(&self) -> &'static str {
        match self {
            Self::Git => "git",
            Self::NodeJs => "node",
            Self::Npm => "npm",
            Self::ClaudeCli => "claude",
            Self::GeminiCli => "gemini",
        }
    }

    /// Human-readable name.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Git => "Git",
            Self::NodeJs => "Node.js",
            Self::Npm => "npm",
            Self::ClaudeCli => "Claude CLI",
            Self::GeminiCli => "Gemini CLI",
        }
    }

    /// Iterator over all known tools.
    pub fn all() -> impl Iterator<Item = Self> {
        <Self as IntoEnumIterator>::iter()
    }

    /// The built-in descriptor for this tool.
    ///
    /// Node.js is the only tool whose PATH update is fatal: nothing after
    /// it can run without `node` and `npm` on the machine PATH.
    pub fn descriptor(&self) -> ToolDescriptor {
        let base = ToolDescriptor::new(self.display_name(), self.command());
        match self {
            Self::Git => base
                .with_install_dir(r"C:\Program Files\Git\cmd")
                .with_install_dir(r"C:\Program Files\Git\bin")
                .with_install_dir(r"C:\Program Files\Git\usr\bin")
                .with_marker(r"Git\cmd")
                .with_marker(r"Git\bin")
                .with_source(InstallSource::System {
                    chocolatey: Some("git".to_string()),
                    winget: Some("Git.Git".to_string()),
                })
                .with_path_scope(Scope::Machine),
            Self::NodeJs => base
                .with_install_dir(r"C:\Program Files\nodejs")
                .with_marker("nodejs")
                .with_source(InstallSource::System {
                    chocolatey: Some("nodejs".to_string()),
                    winget: Some("OpenJS.NodeJS".to_string()),
                })
                .with_path_scope(Scope::Machine)
                .path_failure_fatal(true),
            Self::Npm => base
                .with_install_dir(r"%APPDATA%\npm")
                .with_marker("nodejs")
                .with_marker("npm")
                .with_source(InstallSource::Bundled { with: Self::NodeJs })
                .with_path_scope(Scope::User),
            Self::ClaudeCli => base
                .with_install_dir(r"%APPDATA%\npm")
                .with_marker("npm")
                .with_source(InstallSource::Npm {
                    package: "@anthropic-ai/claude-code".to_string(),
                })
                .with_path_scope(Scope::User),
            Self::GeminiCli => base
                .with_install_dir(r"%APPDATA%\npm")
                .with_marker("npm")
                .with_source(InstallSource::Npm {
                    package: "@google/gemini-cli".to_string(),
                })
                .with_path_scope(Scope::User),
        }
    }
}

/// A system package manager.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::EnumIter, strum::Display,
)]
pub enum PackageManager {
    /// Chocolatey (`choco`), the primary manager.
    Chocolatey,
    /// Windows Package Manager (`winget`), the secondary manager.
    Winget,
}

impl PackageManager {
    /// Executable name looked up on PATH.
    pub fn executable(&self) -> &'static str {
        match self {
            Self::Chocolatey => "choco",
            Self::Winget => "winget",
        }
    }

    /// Whether this is the designated primary manager.
    pub fn is_primary(&self) -> bool {
        matches!(self, Self::Chocolatey)
    }

    /// Managers in preference order, primary first.
    pub fn by_priority() -> [Self; 2] {
        [Self::Chocolatey, Self::Winget]
    }

    /// Unattended install arguments for `package`.
    ///
    /// # Example
    ///
    /// ```rust
    /// use devtool_provision::PackageManager;
    ///
    /// let args = PackageManager::Winget.install_args("Git.Git");
    /// assert_eq!(&args[..3], ["install", "--id", "Git.Git"]);
    /// ```
    pub fn install_args(&self, package: &str) -> Vec<String> {
        let args = match self {
            Self::Chocolatey => vec![
                "install",
                package,
                "-y",
                "--no-progress",
                "--ignore-detected-reboot",
            ],
            Self::Winget => vec![
                "install",
                "--id",
                package,
                "-e",
                "--silent",
                "--accept-package-agreements",
                "--accept-source-agreements",
            ],
        };
        args.into_iter().map(str::to_string).collect()
    }

    /// Whether an install exit code means success.
    ///
    /// Chocolatey reports 1641 and 3010 when the install succeeded but a
    /// reboot is pending.
    pub fn is_success_code(&self, code: Option<i32>) -> bool {
        match (self, code) {
            (_, Some(0)) => true,
            (Self::Chocolatey, Some(1641 | 3010)) => true,
            _ => false,
        }
    }
}

/// Where a tool comes from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum InstallSource {
    /// A system package manager, with per-manager package identifiers.
    System {
        /// Chocolatey package name.
        chocolatey: Option<String>,
        /// Winget package id.
        winget: Option<String>,
    },
    /// A global npm package.
    Npm {
        /// npm package name.
        package: String,
    },
    /// Installed as part of another tool.
    Bundled {
        /// The tool that ships it.
        with: ToolKind,
    },
}

impl InstallSource {
    /// Package identifier for `manager`, if this is a system source that has one.
    pub fn package_for(&self, manager: PackageManager) -> Option<&str> {
        match (self, manager) {
            (Self::System { chocolatey, .. }, PackageManager::Chocolatey) => chocolatey.as_deref(),
            (Self::System { winget, .. }, PackageManager::Winget) => winget.as_deref(),
            _ => None,
        }
    }
}

/// Everything the pipeline knows about one tool.
///
/// Built once per tool and shared read-only. The built-in table comes from
/// [`ToolKind::descriptor`]; custom descriptors can be assembled with the
/// `with_*` builders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolDescriptor {
    /// Human-readable name.
    pub display_name: String,
    /// Command used to invoke the tool.
    pub command: String,
    /// Argument that prints the version.
    pub version_flag: String,
    /// Well-known install directories, possibly token-bearing.
    pub install_dirs: Vec<String>,
    /// Substrings identifying this tool's directory in a PATH entry.
    pub expected_markers: Vec<String>,
    /// How the tool is installed.
    pub source: InstallSource,
    /// Store the tool's directories are added to.
    pub path_scope: Scope,
    /// Whether a failed PATH update fails the install.
    pub path_failure_is_fatal: bool,
}

impl ToolDescriptor {
    /// A descriptor with `--version`, user scope, a soft PATH policy and no
    /// package identifiers.
    pub fn new(display_name: impl Into<String>, command: impl Into<String>) -> Self {
        Self {
            display_name: display_name.into(),
            command: command.into(),
            version_flag: "--version".to_string(),
            install_dirs: Vec::new(),
            expected_markers: Vec::new(),
            source: InstallSource::System {
                chocolatey: None,
                winget: None,
            },
            path_scope: Scope::User,
            path_failure_is_fatal: false,
        }
    }

    /// Override the version argument.
    pub fn with_version_flag(mut self, flag: impl Into<String>) -> Self {
        self.version_flag = flag.into();
        self
    }

    /// Add a well-known install directory.
    pub fn with_install_dir(mut self, dir: impl Into<String>) -> Self {
        self.install_dirs.push(dir.into());
        self
    }

    /// Add an expected-path marker.
    pub fn with_marker(mut self, marker: impl Into<String>) -> Self {
        self.expected_markers.push(marker.into());
        self
    }

    /// Set the install source.
    pub fn with_source(mut self, source: InstallSource) -> Self {
        self.source = source;
        self
    }

    /// Set the PATH store.
    pub fn with_path_scope(mut self, scope: Scope) -> Self {
        self.path_scope = scope;
        self
    }

    /// Set the PATH failure policy.
    pub fn path_failure_fatal(mut self, fatal: bool) -> Self {
        self.path_failure_is_fatal = fatal;
        self
    }
}
