//! One compilation attempt against the backend compiler.

use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;

use crate::printer::{blank_description, method_description, StatusPrinter};
use crate::{
    classify, AllocationProbe, BackendCompiler, Bailout, Classification, CompilationIdentifier,
    CompilationResult, CompilerError, CompilerOptions, DiagnosticContext, Timestamp,
};

/// What a single attempt produced. Exactly one variant per attempt.
#[derive(Debug)]
pub enum AttemptOutcome {
    Success(CompilationResult),
    RetryableBailout(Bailout),
    PermanentBailout(Bailout),
    InternalError(CompilerError),
}

impl AttemptOutcome {
    /// Routes a backend error through the classifier.
    pub fn from_error(error: CompilerError) -> Self {
        match (classify(&error), error) {
            (Classification::Permanent { .. }, CompilerError::Bailout(bailout)) => {
                AttemptOutcome::PermanentBailout(bailout)
            }
            (Classification::Retryable { .. }, CompilerError::Bailout(bailout)) => {
                AttemptOutcome::RetryableBailout(bailout)
            }
            (_, error) => AttemptOutcome::InternalError(error),
        }
    }

    pub fn result(&self) -> Option<&CompilationResult> {
        match self {
            AttemptOutcome::Success(result) => Some(result),
            _ => None,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            AttemptOutcome::Success(_) => "success",
            AttemptOutcome::RetryableBailout(_) => "retryable_bailout",
            AttemptOutcome::PermanentBailout(_) => "permanent_bailout",
            AttemptOutcome::InternalError(_) => "internal_error",
        }
    }
}

/// Something the retry controller can run repeatedly.
///
/// `diagnostics` is fresh for every call; `retry_cause` is the bailout of the
/// previous attempt, `None` on the first.
pub trait Attempt {
    fn run(&mut self, diagnostics: &DiagnosticContext, retry_cause: Option<&Bailout>)
        -> AttemptOutcome;
}

// ---------------------------------------------------------------------------

/// Wall-clock span covered by the backend calls of one task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct CompileWindow {
    pub(crate) started_at: Option<Timestamp>,
    pub(crate) finished_at: Option<Timestamp>,
}

struct Sample {
    started: Instant,
    allocated: u64,
}

/// Runs the backend compiler once per [`Attempt::run`] call.
pub(crate) struct AttemptRunner<'a> {
    identifier: &'a CompilationIdentifier,
    options: &'a CompilerOptions,
    compiler: &'a dyn BackendCompiler,
    allocation: &'a dyn AllocationProbe,
    printer: &'a StatusPrinter,
    window: CompileWindow,
}

impl<'a> AttemptRunner<'a> {
    pub(crate) fn new(
        identifier: &'a CompilationIdentifier,
        options: &'a CompilerOptions,
        compiler: &'a dyn BackendCompiler,
        allocation: &'a dyn AllocationProbe,
        printer: &'a StatusPrinter,
    ) -> Self {
        Self {
            identifier,
            options,
            compiler,
            allocation,
            printer,
            window: CompileWindow::default(),
        }
    }

    pub(crate) fn window(&self) -> CompileWindow {
        self.window
    }

    fn print_summary(&self, sample: &Sample, outcome: &AttemptOutcome, print_after: bool) {
        let elapsed_ms = sample.started.elapsed().as_millis();
        let (bytecode_size, target_code_size) = outcome.result().map_or((0, -1), |r| {
            (i64::from(r.bytecode_size()), i64::from(r.target_code_size()))
        });
        let allocated_kb = self
            .allocation
            .thread_allocated_bytes()
            .saturating_sub(sample.allocated)
            / 1024;
        let summary = format!(
            " | {elapsed_ms:4}ms {bytecode_size:5}B {target_code_size:5}B {allocated_kb:5}kB"
        );
        let prefix = if print_after {
            method_description(self.identifier)
        } else {
            blank_description(self.identifier)
        };
        self.printer.println_for_unit(&format!("{prefix}{summary}"));
    }
}

impl Attempt for AttemptRunner<'_> {
    fn run(
        &mut self,
        diagnostics: &DiagnosticContext,
        retry_cause: Option<&Bailout>,
    ) -> AttemptOutcome {
        let request = self.identifier.request();
        let print_unit = self.printer.enabled_for_unit();
        let print_compilation = self.options.print_compilation && print_unit;
        let print_after = self.options.print_after_compilation && print_unit;
        if print_compilation {
            self.printer
                .println_for_unit(&format!("{}...", method_description(self.identifier)));
        }
        // Timers and the allocation probe are only sampled when a line will be printed.
        let sample = (print_compilation || print_after).then(|| Sample {
            started: Instant::now(),
            allocated: self.allocation.thread_allocated_bytes(),
        });

        if let Some(cause) = retry_cause {
            diagnostics.log(&format!("retrying after bailout: {cause}"));
        }

        self.window.started_at.get_or_insert_with(Timestamp::now);
        let compiled = {
            let _scope = diagnostics.scope("Compiling");
            let compiler = self.compiler;
            let identifier = self.identifier;
            let options = self.options;
            let caught = panic::catch_unwind(AssertUnwindSafe(|| {
                compiler.compile(
                    request.unit().as_ref(),
                    request.entry(),
                    request.use_profiling_info(),
                    identifier,
                    options,
                    diagnostics,
                )
            }));
            caught
                .unwrap_or_else(|payload| Err(CompilerError::from_panic(payload)))
                .map_err(|error| {
                    if retry_cause.is_some() {
                        diagnostics.log("Exception during retry");
                        tracing::warn!(
                            id = %identifier.id_string(),
                            attempt = diagnostics.attempt(),
                            error = %error,
                            "exception during retry"
                        );
                    }
                    diagnostics.handle(error)
                })
        };
        self.window.finished_at = Some(Timestamp::now());

        let outcome = match compiled {
            Ok(result) => AttemptOutcome::Success(result),
            Err(error) => AttemptOutcome::from_error(error),
        };
        tracing::debug!(
            id = %self.identifier.id_string(),
            attempt = diagnostics.attempt(),
            outcome = outcome.kind(),
            "attempt finished"
        );

        if let Some(sample) = sample {
            self.print_summary(&sample, &outcome, print_after);
        }
        outcome
    }
}
