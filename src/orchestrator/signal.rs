//! Worker-to-UI signalling: the stop flag and the event channel.

use super::PipelineOutcome;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// Cooperative cancellation flag shared by the UI and the worker.
///
/// The UI sets it; the worker reads it between steps and inside retry
/// loops. Nothing is interrupted mid-operation.
#[derive(Debug, Clone, Default)]
pub struct StopFlag(Arc<AtomicBool>);

impl StopFlag {
    /// A flag that is not set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask the worker to stop at its next check.
    pub fn request(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether a stop was requested.
    pub fn is_requested(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Event sent from the worker to the UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    /// Overall progress changed.
    Progress {
        /// 0 to 100.
        percent: u8,
        /// What is happening now.
        message: String,
    },
    /// A line for the session log.
    Log(String),
    /// The pipeline ended. Sent exactly once, last.
    Finished(PipelineOutcome),
}

/// Sending half of the event channel, held by the worker.
///
/// A UI that stopped listening is not an error: sends to a closed channel
/// are dropped. Every event is mirrored to `tracing`.
#[derive(Debug, Clone)]
pub struct ProgressReporter {
    tx: mpsc::Sender<SessionEvent>,
}

impl ProgressReporter {
    /// Create a reporter and the receiver the UI drains.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }

    /// Report overall progress.
    pub async fn progress(&self, percent: u8, message: impl Into<String>) {
        let message = message.into();
        info!(percent, "{message}");
        self.send(SessionEvent::Progress {
            percent: percent.min(100),
            message,
        })
        .await;
    }

    /// [`progress`](Self::progress) without waiting; dropped if the queue is full.
    pub fn try_progress(&self, percent: u8, message: impl Into<String>) {
        let message = message.into();
        info!(percent, "{message}");
        if self
            .tx
            .try_send(SessionEvent::Progress {
                percent: percent.min(100),
                message,
            })
            .is_err()
        {
            debug!("event queue full or closed; progress update dropped");
        }
    }

    /// Append a line to the session log.
    pub async fn log(&self, line: impl Into<String>) {
        let line = line.into();
        info!("{line}");
        self.send(SessionEvent::Log(line)).await;
    }

    /// Report the final outcome.
    pub async fn finish(&self, outcome: PipelineOutcome) {
        info!(outcome = ?outcome, "installation session finished");
        self.send(SessionEvent::Finished(outcome)).await;
    }

    /// [`finish`](Self::finish) from outside any async runtime.
    pub fn blocking_finish(&self, outcome: PipelineOutcome) {
        info!(outcome = ?outcome, "installation session finished");
        if self.tx.blocking_send(SessionEvent::Finished(outcome)).is_err() {
            debug!("session receiver dropped before the final event");
        }
    }

    async fn send(&self, event: SessionEvent) {
        if self.tx.send(event).await.is_err() {
            debug!("session receiver dropped; event discarded");
        }
    }
}
