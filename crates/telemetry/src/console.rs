//! Console sink.

use std::io::{self, Write};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, PoisonError};

use compilation::ConsoleSink;

/// Line-oriented console over any writer.
///
/// Lines from concurrent tasks never interleave: each line is written and
/// flushed under one lock.
#[derive(Debug)]
pub struct Console<W> {
    out: Mutex<W>,
    suppressed: AtomicBool,
}

/// The console tasks print to by default.
pub type StdoutConsole = Console<io::Stdout>;

impl Console<io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(io::stdout())
    }
}

impl<W: Write + Send> Console<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            suppressed: AtomicBool::new(false),
        }
    }

    /// Suppresses (or re-enables) all output.
    pub fn set_suppressed(&self, suppressed: bool) {
        self.suppressed.store(suppressed, Ordering::Relaxed);
    }

    pub fn into_inner(self) -> W {
        self.out.into_inner().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> ConsoleSink for Console<W> {
    fn is_suppressed(&self) -> bool {
        self.suppressed.load(Ordering::Relaxed)
    }

    fn println(&self, line: &str) {
        if self.is_suppressed() {
            return;
        }
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(e) = writeln!(out, "{line}").and_then(|()| out.flush()) {
            tracing::debug!(error = %e, "console write failed");
        }
    }
}
