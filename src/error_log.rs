//! Failure reporting to an error-log collaborator.
//!
//! The core never formats or persists diagnostic logs. It hands structured
//! [`FailureRecord`]s to an [`ErrorLogManager`] and lets that decide.

use std::path::PathBuf;
use std::sync::Mutex;
use tracing::error;

/// One failure fact: where, what, and the supporting detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailureRecord {
    /// Step or tool the failure belongs to.
    pub step: String,
    /// Human-readable error message.
    pub message: String,
    /// Supporting detail (fix suggestion, panic payload, captured output).
    pub detail: String,
}

impl FailureRecord {
    /// Build a record.
    pub fn new(
        step: impl Into<String>,
        message: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        Self {
            step: step.into(),
            message: message.into(),
            detail: detail.into(),
        }
    }
}

/// Receives failure records from the worker.
pub trait ErrorLogManager: Send + Sync {
    /// Record one failure.
    fn record(&self, record: FailureRecord);

    /// Where records were saved, if they were persisted anywhere.
    fn saved_log_path(&self) -> Option<PathBuf> {
        None
    }
}

/// Forwards records to `tracing` at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingErrorLog;

impl ErrorLogManager for TracingErrorLog {
    fn record(&self, record: FailureRecord) {
        error!(
            step = %record.step,
            detail = %record.detail,
            "{}",
            record.message
        );
    }
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryErrorLog {
    records: Mutex<Vec<FailureRecord>>,
}

impl MemoryErrorLog {
    /// Empty log.
    pub fn new() -> Self {
        Self::default()
    }

    /// All records so far.
    pub fn records(&self) -> Vec<FailureRecord> {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl ErrorLogManager for MemoryErrorLog {
    fn record(&self, record: FailureRecord) {
        self.records
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_log_keeps_order() {
        let log = MemoryErrorLog::new();
        log.record(FailureRecord::new("Git", "first", ""));
        log.record(FailureRecord::new("Node.js", "second", "fix"));
        let records = log.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[1].step, "Node.js");
        assert_eq!(log.saved_log_path(), None);
    }

    #[test]
    fn test_tracing_log_accepts_records() {
        TracingErrorLog.record(FailureRecord::new("step", "message", "detail"));
    }
}
