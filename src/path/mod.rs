//! PATH storage, change notification and propagation.
//!
//! - [`RegistryStore`]: read/write primitive over the machine and user
//!   `Path` values, plus arbitrary variables
//! - [`EnvironmentBroadcaster`]: blocking + queued change notification
//! - [`PathPropagator`]: add directories, broadcast, settle, verify

mod broadcast;
mod entry;
mod propagator;
mod store;

pub use broadcast::EnvironmentBroadcaster;
pub use entry::{
    comparison_key, expand_with, join_entries, split_entries, tokenize_appdata, PathEntry,
    PROCESS_SEPARATOR, STORE_SEPARATOR,
};
pub use propagator::{PathPropagator, PropagationMethod, PropagationReport};
pub use store::{AddOutcome, RegistryStore, RemoveOutcome};
