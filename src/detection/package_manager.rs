//! Package-manager reachability.

use super::path_finder::find_executable_in;
use crate::config::{ManagerPreference, SetupConfig};
use crate::error::SetupError;
use crate::path::RegistryStore;
use crate::platform::Scope;
use crate::process::{CommandRunner, CommandSpec};
use crate::tool_kind::PackageManager;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// How a package manager was (or was not) found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetectionStatus {
    /// `M --version` succeeded from the current PATH.
    OnPath {
        /// First line of the version output.
        version: Option<String>,
    },
    /// Not runnable by name, but its executable exists in a well-known
    /// directory. Usable by full path; the caller should warn.
    OffPath {
        /// Full path of the executable.
        executable: PathBuf,
    },
    /// Neither check succeeded.
    Unavailable {
        /// Why the version query failed.
        reason: String,
    },
}

/// Detection result for one package manager.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    /// Manager checked.
    pub manager: PackageManager,
    /// What was found.
    pub status: DetectionStatus,
}

impl Detection {
    /// Whether installs can use this manager.
    pub fn is_usable(&self) -> bool {
        !matches!(self.status, DetectionStatus::Unavailable { .. })
    }

    /// Whether it was only found by the directory scan.
    pub fn is_off_path(&self) -> bool {
        matches!(self.status, DetectionStatus::OffPath { .. })
    }

    /// What to invoke to run the manager, if usable.
    pub fn program(&self) -> Option<String> {
        match &self.status {
            DetectionStatus::OnPath { .. } => Some(self.manager.executable().to_string()),
            DetectionStatus::OffPath { executable } => Some(executable.display().to_string()),
            DetectionStatus::Unavailable { .. } => None,
        }
    }
}

/// Decides whether Chocolatey or winget can be used.
///
/// Per manager: run `M --version`; on failure scan its well-known
/// directories; if that fails too, reload the process PATH from the stores
/// and run `M --version` once more.
#[derive(Clone)]
pub struct PackageManagerDetector {
    store: RegistryStore,
    runner: Arc<dyn CommandRunner>,
    config: Arc<SetupConfig>,
}

impl PackageManagerDetector {
    /// Create a detector.
    pub fn new(store: RegistryStore, runner: Arc<dyn CommandRunner>, config: Arc<SetupConfig>) -> Self {
        Self {
            store,
            runner,
            config,
        }
    }

    /// Directories scanned for `manager`'s executable, expanded.
    ///
    /// For Chocolatey, `%ChocolateyInstall%\bin` from either store comes first.
    pub fn search_dirs(&self, manager: PackageManager) -> Vec<PathBuf> {
        let env = self.store.environment();
        let mut dirs = Vec::new();
        if manager == PackageManager::Chocolatey {
            for scope in [Scope::Machine, Scope::User] {
                if let Ok(Some(root)) = self.store.read_var(scope, "ChocolateyInstall") {
                    if !root.trim().is_empty() {
                        dirs.push(PathBuf::from(env.expand_tokens(root.trim())).join("bin"));
                    }
                }
            }
        }
        dirs.extend(
            self.config
                .manager_dirs(manager)
                .iter()
                .map(|dir| PathBuf::from(env.expand_tokens(dir))),
        );
        dirs
    }

    async fn version_query(&self, manager: PackageManager) -> Result<Option<String>, String> {
        let mut spec = CommandSpec::new(manager.executable(), self.config.version_check_timeout)
            .arg("--version");
        if let Some(path) = self.store.environment().process_path() {
            spec = spec.env("PATH", path);
        }
        match self.runner.run(&spec).await {
            Ok(out) if out.succeeded() => Ok(out.first_line().map(str::to_string)),
            Ok(out) => Err(format!(
                "{} --version exited with {:?}: {}",
                manager.executable(),
                out.code,
                out.diagnostic()
            )),
            Err(e) => Err(e.to_string()),
        }
    }

    /// Version query, then directory scan. No refresh.
    pub async fn check(&self, manager: PackageManager) -> Detection {
        let reason = match self.version_query(manager).await {
            Ok(version) => {
                debug!(manager = %manager, version = ?version, "package manager on PATH");
                return Detection {
                    manager,
                    status: DetectionStatus::OnPath { version },
                };
            }
            Err(reason) => reason,
        };

        if let Some(executable) = find_executable_in(manager.executable(), &self.search_dirs(manager)) {
            warn!(
                manager = %manager,
                path = %executable.display(),
                "package manager present but not on PATH"
            );
            return Detection {
                manager,
                status: DetectionStatus::OffPath { executable },
            };
        }

        debug!(manager = %manager, reason = %reason, "package manager not found");
        Detection {
            manager,
            status: DetectionStatus::Unavailable { reason },
        }
    }

    /// Full detection: [`check`](Self::check), then one refresh-and-retry.
    pub async fn detect(&self, manager: PackageManager) -> Detection {
        let first = self.check(manager).await;
        if first.is_usable() {
            return first;
        }

        if let Err(e) = self.store.refresh_process_path() {
            warn!(error = %e, "could not reload PATH from the environment stores");
            return first;
        }

        match self.version_query(manager).await {
            Ok(version) => {
                info!(manager = %manager, "package manager found after PATH reload");
                Detection {
                    manager,
                    status: DetectionStatus::OnPath { version },
                }
            }
            Err(reason) => Detection {
                manager,
                status: DetectionStatus::Unavailable { reason },
            },
        }
    }

    /// Managers installs may use, in preference order (primary first).
    ///
    /// Fails with [`SetupError::NoPackageManager`] rather than returning an
    /// empty list.
    pub async fn usable_managers(&self) -> Result<Vec<Detection>, SetupError> {
        let candidates = match self.config.manager_preference {
            ManagerPreference::Auto => PackageManager::by_priority().to_vec(),
            ManagerPreference::Chocolatey => vec![PackageManager::Chocolatey],
            ManagerPreference::Winget => vec![PackageManager::Winget],
        };

        let mut usable = Vec::new();
        for manager in &candidates {
            let detection = self.detect(*manager).await;
            if detection.is_usable() {
                usable.push(detection);
            }
        }

        if usable.is_empty() {
            return Err(SetupError::no_package_manager(candidates));
        }
        Ok(usable)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::ValueKind;
    use crate::process::{CommandOutput, RunError, ScriptedRunner};
    use crate::InMemoryEnvironment;
    use std::fs;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn detector(
        env: InMemoryEnvironment,
        runner: ScriptedRunner,
        config: SetupConfig,
    ) -> (Arc<InMemoryEnvironment>, Arc<ScriptedRunner>, PackageManagerDetector) {
        let env = Arc::new(env);
        let runner = Arc::new(runner);
        let detector = PackageManagerDetector::new(
            RegistryStore::new(env.clone()),
            runner.clone(),
            Arc::new(config),
        );
        (env, runner, detector)
    }

    fn config_with_dirs(choco: Vec<String>) -> SetupConfig {
        SetupConfig {
            chocolatey_dirs: choco,
            winget_dirs: Vec::new(),
            ..SetupConfig::default()
        }
    }

    #[tokio::test]
    async fn test_on_path() {
        let (_, _, detector) = detector(
            InMemoryEnvironment::new(),
            ScriptedRunner::new(|_| Ok(CommandOutput::success("2.2.2\n"))),
            config_with_dirs(Vec::new()),
        );
        let d = detector.check(PackageManager::Chocolatey).await;
        assert_eq!(
            d.status,
            DetectionStatus::OnPath {
                version: Some("2.2.2".to_string())
            }
        );
        assert_eq!(d.program().as_deref(), Some("choco"));
    }

    #[tokio::test]
    async fn test_check_passes_process_path() {
        let (_, runner, detector) = detector(
            InMemoryEnvironment::new().with_process_path("/opt/bin"),
            ScriptedRunner::new(|_| Ok(CommandOutput::success("1.0.0"))),
            config_with_dirs(Vec::new()),
        );
        detector.check(PackageManager::Winget).await;
        assert_eq!(runner.calls()[0].path_override(), Some("/opt/bin"));
    }

    #[tokio::test]
    async fn test_off_path_via_directory_scan() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("choco.exe"), b"").unwrap();
        let (_, _, detector) = detector(
            InMemoryEnvironment::new(),
            ScriptedRunner::nothing_installed(),
            config_with_dirs(vec![dir.path().display().to_string()]),
        );
        let d = detector.check(PackageManager::Chocolatey).await;
        assert!(d.is_usable());
        assert!(d.is_off_path());
        assert_eq!(
            d.program(),
            Some(dir.path().join("choco.exe").display().to_string())
        );
    }

    #[tokio::test]
    async fn test_chocolatey_install_var_extends_search() {
        let root = tempfile::tempdir().unwrap();
        fs::create_dir(root.path().join("bin")).unwrap();
        fs::write(root.path().join("bin").join("choco.exe"), b"").unwrap();
        let env = InMemoryEnvironment::new().with_value(
            Scope::Machine,
            "ChocolateyInstall",
            &root.path().display().to_string(),
            ValueKind::Plain,
        );
        let (_, _, detector) = detector(
            env,
            ScriptedRunner::nothing_installed(),
            config_with_dirs(Vec::new()),
        );
        assert_eq!(
            detector.search_dirs(PackageManager::Chocolatey)[0],
            root.path().join("bin")
        );
        assert!(detector.check(PackageManager::Chocolatey).await.is_off_path());
    }

    #[tokio::test]
    async fn test_detect_refreshes_then_retries_once() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let seen = attempts.clone();
        let (env, runner, detector) = detector(
            InMemoryEnvironment::new().with_path(Scope::Machine, r"C:\ProgramData\chocolatey\bin"),
            ScriptedRunner::new(move |spec| {
                if seen.fetch_add(1, Ordering::SeqCst) == 0 {
                    Err(RunError::NotFound {
                        program: spec.program.clone(),
                    })
                } else {
                    Ok(CommandOutput::success("2.2.2"))
                }
            }),
            config_with_dirs(Vec::new()),
        );
        let d = detector.detect(PackageManager::Chocolatey).await;
        assert!(d.is_usable());
        assert!(!d.is_off_path());
        assert_eq!(env.process_path_updates(), 1);
        assert_eq!(runner.call_count(), 2);
    }

    #[tokio::test]
    async fn test_detect_unavailable() {
        let (env, runner, detector) = detector(
            InMemoryEnvironment::new(),
            ScriptedRunner::new(|_| Ok(CommandOutput::failure(1, "broken"))),
            config_with_dirs(Vec::new()),
        );
        let d = detector.detect(PackageManager::Winget).await;
        assert!(!d.is_usable());
        assert_eq!(d.program(), None);
        assert_eq!(env.process_path_updates(), 1);
        assert_eq!(runner.call_count(), 2);
    }

    #[tokio::test]
    async fn test_usable_managers_prefers_primary() {
        let (_, _, detector) = detector(
            InMemoryEnvironment::new(),
            ScriptedRunner::new(|_| Ok(CommandOutput::success("1.0.0"))),
            config_with_dirs(Vec::new()),
        );
        let managers: Vec<_> = detector
            .usable_managers()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.manager)
            .collect();
        assert_eq!(managers, vec![PackageManager::Chocolatey, PackageManager::Winget]);
    }

    #[tokio::test]
    async fn test_usable_managers_falls_back_to_secondary() {
        let (_, _, detector) = detector(
            InMemoryEnvironment::new(),
            ScriptedRunner::new(|spec| match spec.program.as_str() {
                "winget" => Ok(CommandOutput::success("v1.7.10861")),
                other => Err(RunError::NotFound {
                    program: other.to_string(),
                }),
            }),
            config_with_dirs(Vec::new()),
        );
        let managers = detector.usable_managers().await.unwrap();
        assert_eq!(managers.len(), 1);
        assert_eq!(managers[0].manager, PackageManager::Winget);
    }

    #[tokio::test]
    async fn test_no_package_manager_is_an_error() {
        let (_, _, detector) = detector(
            InMemoryEnvironment::new(),
            ScriptedRunner::nothing_installed(),
            config_with_dirs(Vec::new()),
        );
        let err = detector.usable_managers().await.unwrap_err();
        assert!(matches!(err, SetupError::NoPackageManager { ref tried, .. } if tried.len() == 2));
    }

    #[tokio::test]
    async fn test_explicit_preference_limits_candidates() {
        let (_, runner, detector) = detector(
            InMemoryEnvironment::new(),
            ScriptedRunner::new(|_| Ok(CommandOutput::success("1.0.0"))),
            SetupConfig {
                manager_preference: ManagerPreference::Winget,
                ..config_with_dirs(Vec::new())
            },
        );
        let managers = detector.usable_managers().await.unwrap();
        assert_eq!(managers.len(), 1);
        assert_eq!(runner.calls_to("choco"), 0);
    }
}
