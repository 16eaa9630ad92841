//! Console output for one task.

use std::sync::Arc;

use crate::{CompilationIdentifier, ConsoleSink};

/// Wraps the console sink with the task's print-filter verdict.
///
/// Start/finish lines honour the filter; bailout and error lines do not.
pub(crate) struct StatusPrinter {
    console: Arc<dyn ConsoleSink>,
    unit_selected: bool,
}

impl StatusPrinter {
    pub(crate) fn new(console: Arc<dyn ConsoleSink>, unit_selected: bool) -> Self {
        Self {
            console,
            unit_selected,
        }
    }

    pub(crate) fn enabled(&self) -> bool {
        !self.console.is_suppressed()
    }

    /// Whether per-unit lines (start, finish) will be printed.
    pub(crate) fn enabled_for_unit(&self) -> bool {
        self.unit_selected && self.enabled()
    }

    pub(crate) fn println(&self, line: &str) {
        if self.enabled() {
            self.console.println(line);
        }
    }

    pub(crate) fn println_for_unit(&self, line: &str) {
        if self.enabled_for_unit() {
            self.console.println(line);
        }
    }

    /// Prints each line of a multi-line block.
    pub(crate) fn print_block(&self, block: &str) {
        for line in block.lines() {
            self.println(line);
        }
    }
}

/// `"<id> JIT <holder> <name> <descriptor> [(OSR@bci) ]"`, padded into columns.
pub(crate) fn method_description(identifier: &CompilationIdentifier) -> String {
    let request = identifier.request();
    let unit = request.unit();
    let osr = match request.entry().bci() {
        Some(bci) => format!("(OSR@{bci}) "),
        None => String::new(),
    };
    format!(
        "{:<6} JIT {:<70} {:<45} {:<50} {}",
        identifier.id().get(),
        unit.qualified_name(),
        unit.simple_name(),
        unit.signature_descriptor(),
        osr
    )
}

/// `"<id> JIT" + blank columns`, used when only the summary is printed.
pub(crate) fn blank_description(identifier: &CompilationIdentifier) -> String {
    format!("{:<6} JIT {:<70} {:<45} {:<50}", identifier.id().get(), "", "", "")
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Mutex;

    use super::*;

    /// Console double that records printed lines.
    #[derive(Debug, Default)]
    pub struct RecordingConsole {
        pub suppressed: bool,
        pub lines: Mutex<Vec<String>>,
    }

    impl RecordingConsole {
        pub fn lines(&self) -> Vec<String> {
            self.lines.lock().unwrap().clone()
        }
    }

    impl ConsoleSink for RecordingConsole {
        fn is_suppressed(&self) -> bool {
            self.suppressed
        }

        fn println(&self, line: &str) {
            self.lines.lock().unwrap().push(line.to_string());
        }
    }
}
