//! Event sinks for completion and failure events.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

use compilation::{CompletionEvent, EventError, EventSink, FailureEvent};
use serde::Serialize;

/// `tracing` target used by [`TracingEventSink`].
pub const EVENT_TARGET: &str = "jit_events";

/// Envelope written by [`JsonLinesEventSink`]: the event's own fields plus a
/// `kind` discriminator.
#[derive(Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
enum EventRecord<'a> {
    Completion(&'a CompletionEvent),
    Failure(&'a FailureEvent),
}

// ---------------------------------------------------------------------------

/// Writes every event as one JSON object per line.
#[derive(Debug)]
pub struct JsonLinesEventSink<W> {
    writer: Mutex<W>,
}

impl JsonLinesEventSink<BufWriter<File>> {
    /// Creates (or truncates) `path` and writes events to it.
    pub fn create(path: &Path) -> io::Result<Self> {
        Ok(Self::new(BufWriter::new(File::create(path)?)))
    }
}

impl<W: Write + Send> JsonLinesEventSink<W> {
    pub fn new(writer: W) -> Self {
        Self {
            writer: Mutex::new(writer),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer.into_inner().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self, record: &EventRecord<'_>) -> Result<(), EventError> {
        let line = serde_json::to_string(record)?;
        let mut writer = self
            .writer
            .lock()
            .map_err(|_| EventError::Rejected("event writer poisoned".to_string()))?;
        writeln!(writer, "{line}")?;
        writer.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> EventSink for JsonLinesEventSink<W> {
    fn should_write(&self) -> bool {
        true
    }

    fn commit_completion(&self, event: &CompletionEvent) -> Result<(), EventError> {
        self.write(&EventRecord::Completion(event))
    }

    fn commit_failure(&self, event: &FailureEvent) -> Result<(), EventError> {
        self.write(&EventRecord::Failure(event))
    }
}

// ---------------------------------------------------------------------------

/// Emits events as `tracing` records on [`EVENT_TARGET`].
///
/// Writes only when the installed subscriber has `jit_events=info` enabled,
/// so events cost nothing when filtered out.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventSink;

impl EventSink for TracingEventSink {
    fn should_write(&self) -> bool {
        tracing::enabled!(target: EVENT_TARGET, tracing::Level::INFO)
    }

    fn commit_completion(&self, event: &CompletionEvent) -> Result<(), EventError> {
        // Empty when the backend was never called.
        let started_at = event.started_at.as_ref().map(ToString::to_string).unwrap_or_default();
        let finished_at = event.finished_at.as_ref().map(ToString::to_string).unwrap_or_default();
        tracing::info!(
            target: EVENT_TARGET,
            kind = "completion",
            method = %event.method,
            compile_id = event.compile_id.get(),
            compile_level = event.compile_level.get(),
            succeeded = event.succeeded,
            is_osr = event.is_osr,
            code_size = event.code_size,
            inlined_bytes = event.inlined_bytes,
            attempts = event.attempts,
            started_at = %started_at,
            finished_at = %finished_at,
            trace_id = %event.trace_id,
            "compilation"
        );
        Ok(())
    }

    fn commit_failure(&self, event: &FailureEvent) -> Result<(), EventError> {
        tracing::info!(
            target: EVENT_TARGET,
            kind = "failure",
            compile_id = event.compile_id.get(),
            message = %event.message,
            trace_id = %event.trace_id,
            "compiler failure"
        );
        Ok(())
    }
}
