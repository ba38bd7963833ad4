//! Background installation sessions.
//!
//! The pipeline runs on its own thread with its own single-threaded tokio
//! runtime. The caller never blocks on it: it polls
//! [`InstallationSession::drain`] on a timer and applies the events.

use super::pipeline::{PipelineOutcome, StepOrchestrator};
use super::signal::{ProgressReporter, SessionEvent, StopFlag};
use super::standard::standard_steps;
use super::step::InstallationStep;
use crate::context::SetupContext;
use crate::error::SetupError;
use std::thread::JoinHandle;
use tokio::sync::mpsc;
use tracing::{debug, warn};

/// One running (or finished) installation.
///
/// # Example
///
/// ```rust,no_run
/// # #[cfg(windows)]
/// # fn run() -> Result<(), devtool_provision::SetupError> {
/// use devtool_provision::{AutoInstaller, SetupConfig, SetupContext};
///
/// let mut installer = AutoInstaller::new(SetupContext::windows(SetupConfig::default()));
/// let session = installer.start()?;
/// while session.is_running() {
///     for event in session.drain() {
///         println!("{event:?}");
///     }
///     std::thread::sleep(std::time::Duration::from_millis(100));
/// }
/// println!("{:?}", session.outcome());
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct InstallationSession {
    stop: StopFlag,
    rx: mpsc::Receiver<SessionEvent>,
    handle: Option<JoinHandle<()>>,
    log: Vec<String>,
    percent: u8,
    status: String,
    outcome: Option<PipelineOutcome>,
}

impl InstallationSession {
    /// Spawn the worker thread and start running `steps`.
    pub fn start(
        steps: Vec<InstallationStep>,
        orchestrator: StepOrchestrator,
        capacity: usize,
    ) -> Result<Self, SetupError> {
        let (reporter, rx) = ProgressReporter::channel(capacity);
        let stop = StopFlag::new();
        let worker_stop = stop.clone();

        let handle = std::thread::Builder::new()
            .name("devtool-provision-worker".to_string())
            .spawn(move || {
                let runtime = tokio::runtime::Builder::new_current_thread()
                    .enable_all()
                    .build();
                match runtime {
                    Ok(runtime) => runtime.block_on(async {
                        let outcome = orchestrator.run(&steps, &reporter, &worker_stop).await;
                        reporter.finish(outcome).await;
                    }),
                    Err(e) => reporter.blocking_finish(PipelineOutcome::Failed {
                        step: "startup".to_string(),
                        message: format!("cannot start the async runtime: {e}"),
                    }),
                }
            })
            .map_err(|e| SetupError::Worker {
                message: e.to_string(),
                fix: "Close other programs to free system resources and try again".to_string(),
            })?;

        Ok(Self {
            stop,
            rx,
            handle: Some(handle),
            log: Vec::new(),
            percent: 0,
            status: String::new(),
            outcome: None,
        })
    }

    /// Take every pending event without blocking and apply it.
    ///
    /// Returns the events taken. A second `Finished` is discarded.
    pub fn drain(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.rx.try_recv() {
            if self.apply(&event) {
                events.push(event);
            }
        }
        events
    }

    /// Block until the worker finishes, applying events as they arrive.
    ///
    /// Must not be called from inside an async runtime.
    pub fn wait(&mut self) -> Option<&PipelineOutcome> {
        while self.outcome.is_none() {
            match self.rx.blocking_recv() {
                Some(event) => {
                    self.apply(&event);
                }
                None => break,
            }
        }
        self.join();
        self.outcome.as_ref()
    }

    /// Ask the worker to stop at its next check.
    pub fn request_stop(&self) {
        debug!("stop requested by caller");
        self.stop.request();
    }

    /// Whether the worker has not reported its outcome yet.
    pub fn is_running(&self) -> bool {
        self.outcome.is_none()
    }

    /// Whether the worker has reported its outcome.
    pub fn is_completed(&self) -> bool {
        self.outcome.is_some()
    }

    /// Final outcome, once reported.
    pub fn outcome(&self) -> Option<&PipelineOutcome> {
        self.outcome.as_ref()
    }

    /// Every progress message and log line seen so far.
    pub fn log(&self) -> &[String] {
        &self.log
    }

    /// Last reported percent.
    pub fn percent(&self) -> u8 {
        self.percent
    }

    /// Last reported progress message.
    pub fn status(&self) -> &str {
        &self.status
    }

    fn apply(&mut self, event: &SessionEvent) -> bool {
        match event {
            SessionEvent::Progress { percent, message } => {
                self.percent = *percent;
                self.status = message.clone();
                self.log.push(message.clone());
            }
            SessionEvent::Log(line) => self.log.push(line.clone()),
            SessionEvent::Finished(outcome) => {
                if self.outcome.is_some() {
                    warn!("duplicate completion event ignored");
                    return false;
                }
                self.outcome = Some(outcome.clone());
                self.join();
            }
        }
        true
    }

    fn join(&mut self) {
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                warn!("installation worker thread panicked");
            }
        }
    }
}

/// Owns at most one running [`InstallationSession`].
#[derive(Debug)]
pub struct AutoInstaller {
    ctx: SetupContext,
    session: Option<InstallationSession>,
}

impl AutoInstaller {
    /// Create an installer with no session.
    pub fn new(ctx: SetupContext) -> Self {
        Self { ctx, session: None }
    }

    /// Start the standard six-step pipeline.
    pub fn start(&mut self) -> Result<&mut InstallationSession, SetupError> {
        let steps = standard_steps(&self.ctx);
        self.start_with(steps)
    }

    /// Start a pipeline of custom steps.
    ///
    /// Fails with [`SetupError::SessionActive`] while a previous session
    /// has not reported its outcome.
    pub fn start_with(
        &mut self,
        steps: Vec<InstallationStep>,
    ) -> Result<&mut InstallationSession, SetupError> {
        if let Some(session) = self.session.as_mut() {
            session.drain();
            if session.is_running() {
                return Err(SetupError::SessionActive {
                    fix: "Wait for the current installation to finish or stop it first"
                        .to_string(),
                });
            }
        }

        let session = InstallationSession::start(
            steps,
            StepOrchestrator::new(self.ctx.error_log.clone()),
            self.ctx.config.event_queue_capacity,
        )?;
        Ok(self.session.insert(session))
    }

    /// The current or last session.
    pub fn session(&mut self) -> Option<&mut InstallationSession> {
        self.session.as_mut()
    }

    /// Shared context.
    pub fn context(&self) -> &SetupContext {
        &self.ctx
    }
}
