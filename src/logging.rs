//! Process-wide logging (SPEC_FULL.md §4.0) plus the per-job scoped error
//! sink described in spec.md §9 ("single global logger").
//!
//! The source redirects its logger to an in-memory string buffer for the
//! duration of one job so any exception record escaping the executor can be
//! captured verbatim into `job.worker_error`. We model that scoped sink as a
//! plain buffer `run_job` writes the escaped error's `Display` into
//! directly, rather than swapping the global `tracing` subscriber mid-job —
//! this worker's executors run on the same current-thread runtime driving
//! the caller, and a subscriber swapped in for the call would bleed into
//! any other task polled on that thread across the executor's `.await`
//! points.

use std::sync::{Arc, Mutex};

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Installs the process-wide subscriber: `fmt` formatting driven by
/// `RUST_LOG`, defaulting to `info`. Call once at binary start.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// A dedicated log level for container stdout/stderr lines relayed by the
/// supervisor (spec §4.4 step e, "CONTAINER log level"). We don't have a
/// custom tracing level, so we emit these at `info!` tagged with a
/// `container` field other layers can filter on.
pub fn log_container_line(container_id: &str, line: &str) {
    info!(target: "container", container_id, "{}", line);
}

/// Scoped error buffer, written directly by `run_job` when an executor
/// error escapes, then read back into `job.worker_error` (spec §4.1).
#[derive(Clone, Default)]
pub struct ErrorSink {
    buffer: Arc<Mutex<String>>,
}

impl ErrorSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a line directly — used by `run_job` to capture the
    /// formatted `Display` of an escaped executor error.
    pub fn record(&self, line: &str) {
        let mut buf = self.buffer.lock().expect("error sink mutex poisoned");
        buf.push_str(line);
        buf.push('\n');
    }

    pub fn contents(&self) -> String {
        self.buffer.lock().expect("error sink mutex poisoned").clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_sink_records_lines_directly() {
        let sink = ErrorSink::new();
        sink.record("panic: boom");
        sink.record("at executor.rs:42");
        assert_eq!(sink.contents(), "panic: boom\nat executor.rs:42\n");
    }
}
