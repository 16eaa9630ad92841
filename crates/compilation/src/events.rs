//! Structured completion and failure events.
//!
//! A task emits at most one [`CompletionEvent`] (on every path that got past
//! the already-compiled guard) and at most one [`FailureEvent`] (only on the
//! internal-error path). Both are skipped entirely when the sink reports it
//! will not write, so no formatting cost is paid without a consumer.

use serde::{Deserialize, Serialize};

use crate::{CompileLevel, EventError, EventSink, RequestId, Timestamp, TraceId};

/// Final disposition of one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionEvent {
    /// `Holder.name(descriptor)` of the compiled unit.
    pub method: String,
    pub compile_id: RequestId,
    pub compile_level: CompileLevel,
    /// Code was produced *and* installed.
    pub succeeded: bool,
    pub is_osr: bool,
    /// Installed code size in bytes; zero when nothing was installed.
    pub code_size: u32,
    /// Bytecodes compiled, including inlined ones.
    pub inlined_bytes: u32,
    pub attempts: u32,
    /// When the first backend compile began.
    pub started_at: Option<Timestamp>,
    /// When the last backend compile ended.
    pub finished_at: Option<Timestamp>,
    pub trace_id: TraceId,
}

/// Record of an internal compiler error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailureEvent {
    pub compile_id: RequestId,
    pub message: String,
    pub trace_id: TraceId,
}

/// Sink used when no event backend is configured. Never writes.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopEventSink;

impl EventSink for NoopEventSink {
    fn should_write(&self) -> bool {
        false
    }

    fn commit_completion(&self, _event: &CompletionEvent) -> Result<(), EventError> {
        Ok(())
    }

    fn commit_failure(&self, _event: &FailureEvent) -> Result<(), EventError> {
        Ok(())
    }
}

/// Commits a completion event built lazily by `build`.
///
/// Returns `Ok(false)` without calling `build` when the sink will not write.
pub(crate) fn emit_completion(
    sink: &dyn EventSink,
    build: impl FnOnce() -> CompletionEvent,
) -> Result<bool, EventError> {
    if !sink.should_write() {
        return Ok(false);
    }
    sink.commit_completion(&build())?;
    Ok(true)
}

/// Commits a failure event built lazily by `build`.
pub(crate) fn emit_failure(
    sink: &dyn EventSink,
    build: impl FnOnce() -> FailureEvent,
) -> Result<bool, EventError> {
    if !sink.should_write() {
        return Ok(false);
    }
    sink.commit_failure(&build())?;
    Ok(true)
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    use super::*;

    /// Captures committed events; can be told to fail commits.
    #[derive(Debug)]
    pub struct RecordingEvents {
        pub writable: bool,
        pub fail_commits: AtomicBool,
        pub completions: Mutex<Vec<CompletionEvent>>,
        pub failures: Mutex<Vec<FailureEvent>>,
    }

    impl RecordingEvents {
        pub fn new() -> Self {
            Self {
                writable: true,
                fail_commits: AtomicBool::new(false),
                completions: Mutex::new(Vec::new()),
                failures: Mutex::new(Vec::new()),
            }
        }

        pub fn failing() -> Self {
            let events = Self::new();
            events.fail_commits.store(true, Ordering::SeqCst);
            events
        }

        fn check(&self) -> Result<(), EventError> {
            if self.fail_commits.load(Ordering::SeqCst) {
                Err(EventError::Rejected("sink closed".to_string()))
            } else {
                Ok(())
            }
        }
    }

    impl EventSink for RecordingEvents {
        fn should_write(&self) -> bool {
            self.writable
        }

        fn commit_completion(&self, event: &CompletionEvent) -> Result<(), EventError> {
            self.check()?;
            self.completions.lock().unwrap().push(event.clone());
            Ok(())
        }

        fn commit_failure(&self, event: &FailureEvent) -> Result<(), EventError> {
            self.check()?;
            self.failures.lock().unwrap().push(event.clone());
            Ok(())
        }
    }
}
