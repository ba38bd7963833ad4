//! Pipeline steps.

use super::signal::{ProgressReporter, StopFlag};
use crate::error::SetupError;
use async_trait::async_trait;
use std::future::Future;

/// Slice of the overall 0–100 progress owned by one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProgressBand {
    /// Percent reported when the step starts.
    pub low: u8,
    /// Percent the next step starts at. Never reported by this step.
    pub high: u8,
}

impl ProgressBand {
    /// Band `[low, high)`.
    pub const fn new(low: u8, high: u8) -> Self {
        Self { low, high }
    }

    /// Percent for `fraction` (0.0 to 1.0) of the way through the step.
    ///
    /// ```rust
    /// use devtool_provision::ProgressBand;
    ///
    /// let band = ProgressBand::new(20, 40);
    /// assert_eq!(band.at(0.0), 20);
    /// assert_eq!(band.at(0.5), 30);
    /// assert_eq!(band.at(1.0), 39);
    /// ```
    pub fn at(&self, fraction: f32) -> u8 {
        let span = f32::from(self.high.saturating_sub(self.low));
        let offset = (span * fraction.clamp(0.0, 1.0)) as u8;
        let ceiling = self.high.saturating_sub(1).max(self.low);
        self.low.saturating_add(offset).min(ceiling)
    }
}

/// What a step hands its action: progress, logging and the stop flag.
#[derive(Debug, Clone)]
pub struct StepContext {
    /// Event channel to the UI.
    pub reporter: ProgressReporter,
    /// Cancellation flag.
    pub stop: StopFlag,
    /// This step's progress band.
    pub band: ProgressBand,
    /// This step's name.
    pub name: String,
}

impl StepContext {
    /// Report progress within this step's band.
    pub async fn advance(&self, fraction: f32, message: impl Into<String>) {
        self.reporter.progress(self.band.at(fraction), message).await;
    }

    /// [`advance`](Self::advance) from synchronous callbacks.
    pub fn advance_now(&self, fraction: f32, message: impl Into<String>) {
        self.reporter.try_progress(self.band.at(fraction), message);
    }

    /// Append a line to the session log.
    pub async fn log(&self, line: impl Into<String>) {
        self.reporter.log(line).await;
    }

    /// `Err(Cancelled)` if a stop was requested.
    pub fn check_stop(&self) -> Result<(), SetupError> {
        if self.stop.is_requested() {
            Err(SetupError::cancelled())
        } else {
            Ok(())
        }
    }
}

/// The work a step performs.
///
/// Implemented for any `Fn(StepContext) -> impl Future<Output = Result<(), SetupError>>`.
#[async_trait]
pub trait StepAction: Send + Sync {
    /// Run the step.
    async fn run(&self, ctx: StepContext) -> Result<(), SetupError>;
}

#[async_trait]
impl<F, Fut> StepAction for F
where
    F: Fn(StepContext) -> Fut + Send + Sync,
    Fut: Future<Output = Result<(), SetupError>> + Send + 'static,
{
    async fn run(&self, ctx: StepContext) -> Result<(), SetupError> {
        (self)(ctx).await
    }
}

/// One ordered unit of the pipeline.
pub struct InstallationStep {
    /// 1-based position.
    pub ordinal: usize,
    /// Name shown in progress messages and failure records.
    pub name: String,
    /// Progress slice.
    pub band: ProgressBand,
    action: Box<dyn StepAction>,
}

impl InstallationStep {
    /// Create a step.
    pub fn new(
        ordinal: usize,
        name: impl Into<String>,
        band: ProgressBand,
        action: impl StepAction + 'static,
    ) -> Self {
        Self {
            ordinal,
            name: name.into(),
            band,
            action: Box::new(action),
        }
    }

    pub(crate) async fn run(&self, ctx: StepContext) -> Result<(), SetupError> {
        self.action.run(ctx).await
    }
}

impl std::fmt::Debug for InstallationStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstallationStep")
            .field("ordinal", &self.ordinal)
            .field("name", &self.name)
            .field("band", &self.band)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_band_never_reaches_high() {
        let band = ProgressBand::new(90, 100);
        assert_eq!(band.at(1.0), 99);
        assert_eq!(band.at(2.0), 99);
        assert_eq!(band.at(-1.0), 90);
        assert_eq!(ProgressBand::new(5, 5).at(1.0), 5);
    }

    #[tokio::test]
    async fn test_closure_step_runs() {
        let (reporter, mut rx) = ProgressReporter::channel(4);
        let step = InstallationStep::new(1, "Noop", ProgressBand::new(0, 20), |ctx: StepContext| async move {
            ctx.advance(0.5, "halfway").await;
            Ok::<(), SetupError>(())
        });
        let ctx = StepContext {
            reporter,
            stop: StopFlag::new(),
            band: step.band,
            name: step.name.clone(),
        };
        step.run(ctx).await.unwrap();
        assert!(matches!(
            rx.recv().await,
            Some(super::super::SessionEvent::Progress { percent: 10, .. })
        ));
    }

    #[test]
    fn test_check_stop() {
        let (reporter, _rx) = ProgressReporter::channel(1);
        let ctx = StepContext {
            reporter,
            stop: StopFlag::new(),
            band: ProgressBand::new(0, 20),
            name: "Test".to_string(),
        };
        assert!(ctx.check_stop().is_ok());
        ctx.stop.request();
        assert!(ctx.check_stop().unwrap_err().is_cancelled());
    }
}
