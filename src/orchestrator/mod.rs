//! Ordered, cancellable, fail-fast installation pipeline.
//!
//! - [`InstallationStep`] / [`StepAction`]: one unit of work with a progress band
//! - [`StepOrchestrator`]: runs steps in order and stops at the first failure
//! - [`InstallationSession`]: runs a pipeline on a worker thread
//! - [`AutoInstaller`]: starts the [standard steps](standard_steps), one session at a time
//!
//! The worker talks to the caller only through a bounded event queue
//! ([`SessionEvent`]) and a shared [`StopFlag`].

mod pipeline;
mod session;
mod signal;
mod standard;
mod step;

pub use pipeline::{PipelineOutcome, StepOrchestrator};
pub use session::{AutoInstaller, InstallationSession};
pub use signal::{ProgressReporter, SessionEvent, StopFlag};
pub use standard::{detect_with_retry, standard_steps};
pub use step::{InstallationStep, ProgressBand, StepAction, StepContext};
