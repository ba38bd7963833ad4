//! Fail-fast sequential execution of steps.

use super::signal::{ProgressReporter, StopFlag};
use super::step::{InstallationStep, StepContext};
use crate::error::SetupError;
use crate::error_log::{ErrorLogManager, FailureRecord};
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tracing::{error, info, warn};

/// How a pipeline run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineOutcome {
    /// Every step succeeded.
    Completed,
    /// A stop was requested; `at_step` had not finished (or not started).
    Cancelled {
        /// Step that was pending when the stop was honored.
        at_step: String,
    },
    /// A step failed and the remaining steps were skipped.
    Failed {
        /// Failing step.
        step: String,
        /// Error message.
        message: String,
    },
}

impl PipelineOutcome {
    /// Whether every step succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

/// Runs steps in order and stops at the first failure.
#[derive(Clone)]
pub struct StepOrchestrator {
    error_log: Arc<dyn ErrorLogManager>,
}

impl StepOrchestrator {
    /// Create an orchestrator that records failures to `error_log`.
    pub fn new(error_log: Arc<dyn ErrorLogManager>) -> Self {
        Self { error_log }
    }

    /// Run `steps` in order.
    ///
    /// Before each step the stop flag is checked and the step's starting
    /// percent is reported. A step that returns an error or panics is
    /// recorded, reported at 0% and ends the run. A `Cancelled` error from
    /// inside a step ends the run as cancelled, not failed.
    pub async fn run(
        &self,
        steps: &[InstallationStep],
        reporter: &ProgressReporter,
        stop: &StopFlag,
    ) -> PipelineOutcome {
        let total = steps.len();
        for step in steps {
            if stop.is_requested() {
                warn!(step = %step.name, "stop requested");
                reporter.progress(0, "Installation cancelled").await;
                return PipelineOutcome::Cancelled {
                    at_step: step.name.clone(),
                };
            }

            reporter
                .progress(
                    step.band.low,
                    format!("Step {}/{}: {}", step.ordinal, total, step.name),
                )
                .await;

            let ctx = StepContext {
                reporter: reporter.clone(),
                stop: stop.clone(),
                band: step.band,
                name: step.name.clone(),
            };

            let error = match AssertUnwindSafe(step.run(ctx)).catch_unwind().await {
                Ok(Ok(())) => {
                    info!(step = %step.name, "step completed");
                    continue;
                }
                Ok(Err(e)) if e.is_cancelled() => {
                    warn!(step = %step.name, "cancelled inside step");
                    reporter.progress(0, "Installation cancelled").await;
                    return PipelineOutcome::Cancelled {
                        at_step: step.name.clone(),
                    };
                }
                Ok(Err(e)) => e,
                Err(payload) => SetupError::Worker {
                    message: format!("step panicked: {}", panic_message(payload.as_ref())),
                    fix: "This is a bug; please report it with the log output".to_string(),
                },
            };

            error!(step = %step.name, category = error.category(), "{error}");
            self.error_log.record(FailureRecord::new(
                step.name.clone(),
                error.to_string(),
                error.fix_suggestion(),
            ));
            reporter
                .progress(0, format!("{} failed: {}", step.name, error))
                .await;
            reporter
                .log(format!("Fix: {}", error.fix_suggestion()))
                .await;
            return PipelineOutcome::Failed {
                step: step.name.clone(),
                message: error.to_string(),
            };
        }

        reporter.progress(100, "All installations completed").await;
        PipelineOutcome::Completed
    }
}

impl std::fmt::Debug for StepOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StepOrchestrator").finish_non_exhaustive()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error_log::MemoryErrorLog;
    use crate::orchestrator::{ProgressBand, SessionEvent};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn counting_step(ordinal: usize, name: &str, counter: Arc<AtomicUsize>) -> InstallationStep {
        InstallationStep::new(
            ordinal,
            name,
            ProgressBand::new(((ordinal - 1) * 30) as u8, (ordinal * 30) as u8),
            move |_ctx: StepContext| {
                let counter = counter.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Ok::<(), SetupError>(())
                }
            },
        )
    }

    fn drain(rx: &mut tokio::sync::mpsc::Receiver<SessionEvent>) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_runs_all_steps_in_order() {
        let log = Arc::new(MemoryErrorLog::new());
        let count = Arc::new(AtomicUsize::new(0));
        let steps = vec![
            counting_step(1, "A", count.clone()),
            counting_step(2, "B", count.clone()),
        ];
        let (reporter, mut rx) = ProgressReporter::channel(16);
        let outcome = StepOrchestrator::new(log.clone())
            .run(&steps, &reporter, &StopFlag::new())
            .await;

        assert_eq!(outcome, PipelineOutcome::Completed);
        assert_eq!(count.load(Ordering::SeqCst), 2);
        let events = drain(&mut rx);
        assert_eq!(
            events.first(),
            Some(&SessionEvent::Progress {
                percent: 0,
                message: "Step 1/2: A".to_string()
            })
        );
        assert_eq!(
            events.last(),
            Some(&SessionEvent::Progress {
                percent: 100,
                message: "All installations completed".to_string()
            })
        );
        assert!(log.records().is_empty());
    }

    #[tokio::test]
    async fn test_stop_before_first_step() {
        let count = Arc::new(AtomicUsize::new(0));
        let steps = vec![counting_step(1, "A", count.clone())];
        let stop = StopFlag::new();
        stop.request();
        let (reporter, _rx) = ProgressReporter::channel(16);
        let outcome = StepOrchestrator::new(Arc::new(MemoryErrorLog::new()))
            .run(&steps, &reporter, &stop)
            .await;
        assert_eq!(
            outcome,
            PipelineOutcome::Cancelled {
                at_step: "A".to_string()
            }
        );
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_panic_becomes_failure() {
        let log = Arc::new(MemoryErrorLog::new());
        let steps = vec![InstallationStep::new(
            1,
            "Boom",
            ProgressBand::new(0, 50),
            |_ctx: StepContext| async move {
                if true {
                    panic!("exploded");
                }
                Ok::<(), SetupError>(())
            },
        )];
        let (reporter, _rx) = ProgressReporter::channel(16);
        let outcome = StepOrchestrator::new(log.clone())
            .run(&steps, &reporter, &StopFlag::new())
            .await;
        match outcome {
            PipelineOutcome::Failed { step, message } => {
                assert_eq!(step, "Boom");
                assert!(message.contains("exploded"));
            }
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(log.records().len(), 1);
    }
}
