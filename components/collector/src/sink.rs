//! Error reporting sink
//!
//! The core signals corruption and protocol violations into an
//! [`ErrorSink`] and never decides what happens next. The default sink logs.

use core_types::ErrorReport;
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::error;

/// Receives misuse and corruption reports.
pub trait ErrorSink: Send + Sync {
    /// Handles one report. Must not call back into the zone.
    fn report(&self, report: &ErrorReport);
}

/// Returns the tag prefixed to every collector log line.
///
/// Contains the process id so interleaved logs from a parent and a forked
/// child can be told apart.
pub fn prelude() -> &'static str {
    static PRELUDE: Lazy<String> = Lazy::new(|| format!("collector[{}]", std::process::id()));
    &PRELUDE
}

/// Logs every report at error level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl ErrorSink for TracingSink {
    fn report(&self, report: &ErrorReport) {
        error!(
            target: "collector::error",
            prelude = prelude(),
            kind = %report.kind,
            address = ?report.address,
            "{}",
            report.message
        );
    }
}

/// Keeps every report in memory.
///
/// Useful for embedders that surface reports themselves, and for tests.
#[derive(Debug, Default)]
pub struct RecordingSink {
    reports: Mutex<Vec<ErrorReport>>,
}

impl RecordingSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the reports received so far.
    pub fn reports(&self) -> Vec<ErrorReport> {
        self.reports.lock().clone()
    }

    /// Removes and returns the reports received so far.
    pub fn take(&self) -> Vec<ErrorReport> {
        std::mem::take(&mut *self.reports.lock())
    }
}

impl ErrorSink for RecordingSink {
    fn report(&self, report: &ErrorReport) {
        self.reports.lock().push(report.clone());
    }
}
