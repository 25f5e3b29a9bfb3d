//! Textual log sink for lifecycle and enter/exit trace lines.

use std::fmt;
use std::sync::Arc;

/// Callback receiving one line of machine output.
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

/// Sink that forwards every line as a `tracing` info event.
pub fn default_sink() -> LogSink {
    Arc::new(|line: &str| tracing::info!(target: "orthostate", "{line}"))
}

#[derive(Clone)]
pub(crate) struct MachineLog {
    sink: LogSink,
    pub(crate) trace_enter_exit: bool,
}

impl MachineLog {
    pub(crate) fn new(sink: LogSink, trace_enter_exit: bool) -> Self {
        Self {
            sink,
            trace_enter_exit,
        }
    }

    pub(crate) fn write(&self, line: &str) {
        (self.sink)(line);
    }

    /// Write an enter/exit line if tracing is switched on.
    pub(crate) fn trace(&self, line: impl FnOnce() -> String) {
        if self.trace_enter_exit {
            self.write(&line());
        }
    }
}

impl fmt::Debug for MachineLog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MachineLog")
            .field("trace_enter_exit", &self.trace_enter_exit)
            .finish_non_exhaustive()
    }
}
