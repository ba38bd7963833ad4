//! Shared collaborators for one provisioning run.

use crate::config::SetupConfig;
use crate::detection::PackageManagerDetector;
use crate::error_log::ErrorLogManager;
use crate::install::{PathRepairer, ToolInstaller};
use crate::path::{EnvironmentBroadcaster, PathPropagator, RegistryStore};
use crate::platform::PlatformEnvironment;
use crate::process::CommandRunner;
use crate::verifier::DualVerifier;
use std::sync::Arc;

/// Configuration plus the host seams, passed to every component.
///
/// Cheap to clone. Components are built from it on demand and hold no
/// state of their own beyond these handles.
#[derive(Clone)]
pub struct SetupContext {
    /// Run configuration.
    pub config: Arc<SetupConfig>,
    /// Environment stores and notifications.
    pub env: Arc<dyn PlatformEnvironment>,
    /// Subprocess runner.
    pub runner: Arc<dyn CommandRunner>,
    /// Failure sink.
    pub error_log: Arc<dyn ErrorLogManager>,
}

impl SetupContext {
    /// Bundle the collaborators.
    pub fn new(
        config: SetupConfig,
        env: Arc<dyn PlatformEnvironment>,
        runner: Arc<dyn CommandRunner>,
        error_log: Arc<dyn ErrorLogManager>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            env,
            runner,
            error_log,
        }
    }

    /// The real host: registry, window messages, tokio subprocesses and
    /// `tracing` for failures.
    #[cfg(windows)]
    pub fn windows(config: SetupConfig) -> Self {
        Self::new(
            config,
            Arc::new(crate::platform::WindowsEnvironment::new()),
            Arc::new(crate::process::TokioCommandRunner::new()),
            Arc::new(crate::error_log::TracingErrorLog),
        )
    }

    /// PATH store over [`env`](Self::env).
    pub fn store(&self) -> RegistryStore {
        RegistryStore::new(self.env.clone())
    }

    /// Change broadcaster over [`env`](Self::env).
    pub fn broadcaster(&self) -> EnvironmentBroadcaster {
        EnvironmentBroadcaster::new(self.env.clone())
    }

    /// Verifier using the configured verification timeout.
    pub fn verifier(&self) -> DualVerifier {
        DualVerifier::new(
            self.store(),
            self.runner.clone(),
            self.config.verification_timeout,
        )
    }

    /// Package-manager detector.
    pub fn detector(&self) -> PackageManagerDetector {
        PackageManagerDetector::new(self.store(), self.runner.clone(), self.config.clone())
    }

    /// PATH propagator.
    pub fn propagator(&self) -> PathPropagator {
        PathPropagator::new(
            self.store(),
            self.broadcaster(),
            self.verifier(),
            self.runner.clone(),
            self.config.clone(),
        )
    }

    /// Tool installer.
    pub fn installer(&self) -> ToolInstaller {
        ToolInstaller::new(self.clone())
    }

    /// PATH repairer.
    pub fn repairer(&self) -> PathRepairer {
        PathRepairer::new(self.clone())
    }
}

impl std::fmt::Debug for SetupContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SetupContext")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
