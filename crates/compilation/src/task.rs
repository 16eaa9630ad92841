//! The compilation task: one request, start to finish.
//!
//! ```text
//! guard -> retry controller (attempts) -> install -> statistics + event -> outcome
//! ```
//!
//! Everything the task talks to arrives through [`CompilationServices`]. The
//! task never terminates the process; where termination is configured it
//! returns [`RequestOutcome::Fatal`] and leaves the exit to the caller.

use std::error::Error as StdError;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::attempt::{AttemptRunner, CompileWindow};
use crate::errors::render_chain;
use crate::events::{emit_completion, emit_failure};
use crate::printer::StatusPrinter;
use crate::{
    AllocationProbe, ArtifactInstaller, BackendCompiler, Bailout, CompilationIdentifier,
    CompilationRequest, CompilerError, CompilerOptions, CompletionEvent, ConsoleSink,
    DiagnosticContext, DiagnosticSettings, DumpHandler, EventSink, FailureEvent, GlobalStatistics,
    HostConfig, InstalledArtifact, InstallerAdapter, NoAllocationProbe, NoopEventSink,
    OptionsError, RetryController, RetryOutcome, SilentConsole, StatisticsSink, TaskStatistics,
    Terminal, Timer,
};

/// Exit code carried by [`RequestOutcome::Fatal`].
pub const FATAL_EXIT_CODE: i32 = -1;

const ALREADY_COMPILED: &str = "Already compiled";
const ALREADY_RAN: &str = "Compilation task already ran";

// ---------------------------------------------------------------------------
// Services
// ---------------------------------------------------------------------------

/// Collaborators injected into every task.
#[derive(Clone)]
pub struct CompilationServices {
    pub compiler: Arc<dyn BackendCompiler>,
    pub installer: Arc<dyn ArtifactInstaller>,
    pub events: Arc<dyn EventSink>,
    pub console: Arc<dyn ConsoleSink>,
    pub statistics: Arc<dyn StatisticsSink>,
    pub dumps: Option<Arc<dyn DumpHandler>>,
    pub allocation: Arc<dyn AllocationProbe>,
}

impl CompilationServices {
    /// Services with silent sinks and the process-wide statistics.
    pub fn new(compiler: Arc<dyn BackendCompiler>, installer: Arc<dyn ArtifactInstaller>) -> Self {
        Self {
            compiler,
            installer,
            events: Arc::new(NoopEventSink),
            console: Arc::new(SilentConsole),
            statistics: GlobalStatistics::global(),
            dumps: None,
            allocation: Arc::new(NoAllocationProbe),
        }
    }

    pub fn with_events(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    pub fn with_console(mut self, console: Arc<dyn ConsoleSink>) -> Self {
        self.console = console;
        self
    }

    pub fn with_statistics(mut self, statistics: Arc<dyn StatisticsSink>) -> Self {
        self.statistics = statistics;
        self
    }

    pub fn with_dump_handler(mut self, dumps: Arc<dyn DumpHandler>) -> Self {
        self.dumps = Some(dumps);
        self
    }

    pub fn with_allocation_probe(mut self, allocation: Arc<dyn AllocationProbe>) -> Self {
        self.allocation = allocation;
        self
    }
}

impl fmt::Debug for CompilationServices {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilationServices")
            .field("dumps", &self.dumps.is_some())
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Outcome
// ---------------------------------------------------------------------------

/// What the scheduler is told about a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RequestOutcome {
    /// Code was produced and installed. `code_size_delta` is the compiled
    /// bytecode size minus the unit's own bytecode size.
    Success { code_size_delta: i64, attempts: u32 },
    /// Nothing was installed. `retryable` tells the scheduler whether asking
    /// again at this tier can help.
    Failure {
        message: String,
        retryable: bool,
        attempts: u32,
    },
    /// The configured policy asks for the process to terminate.
    Fatal {
        message: String,
        exit_code: i32,
        attempts: u32,
    },
}

impl RequestOutcome {
    fn failure(message: impl Into<String>, retryable: bool, attempts: u32) -> Self {
        RequestOutcome::Failure {
            message: message.into(),
            retryable,
            attempts,
        }
    }

    fn fatal(message: impl Into<String>, attempts: u32) -> Self {
        RequestOutcome::Fatal {
            message: message.into(),
            exit_code: FATAL_EXIT_CODE,
            attempts,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RequestOutcome::Success { .. })
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, RequestOutcome::Fatal { .. })
    }

    pub fn attempts(&self) -> u32 {
        match self {
            RequestOutcome::Success { attempts, .. }
            | RequestOutcome::Failure { attempts, .. }
            | RequestOutcome::Fatal { attempts, .. } => *attempts,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            RequestOutcome::Success { .. } => "success",
            RequestOutcome::Failure { .. } => "failure",
            RequestOutcome::Fatal { .. } => "fatal",
        }
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// Owns one [`CompilationRequest`] and runs it once.
pub struct CompilationTask {
    identifier: CompilationIdentifier,
    options: CompilerOptions,
    host: HostConfig,
    services: CompilationServices,
    unit_selected: bool,
    installed: Option<InstalledArtifact>,
    ran: bool,
}

impl CompilationTask {
    /// Validates `options` and resolves them against `host` for this task.
    pub fn new(
        request: CompilationRequest,
        options: &CompilerOptions,
        host: HostConfig,
        services: CompilationServices,
    ) -> Result<Self, OptionsError> {
        options.validate()?;
        let options = options.resolve(&host);
        let unit_selected = options
            .print_filter()?
            .map_or(true, |filter| filter.matches(request.unit().as_ref()));
        Ok(Self {
            identifier: CompilationIdentifier::new(request),
            options,
            host,
            services,
            unit_selected,
            installed: None,
            ran: false,
        })
    }

    pub fn identifier(&self) -> &CompilationIdentifier {
        &self.identifier
    }

    /// The resolved option snapshot.
    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// The installed code, once [`run_compilation`](Self::run_compilation)
    /// succeeded.
    pub fn installed_artifact(&self) -> Option<&InstalledArtifact> {
        self.installed.as_ref()
    }

    pub fn has_run(&self) -> bool {
        self.ran
    }

    /// Runs the request to completion. A task runs at most once; later calls
    /// fail without side effects.
    pub fn run_compilation(&mut self) -> RequestOutcome {
        if self.ran {
            tracing::warn!(id = %self.identifier.id_string(), "{ALREADY_RAN}");
            return RequestOutcome::failure(ALREADY_RAN, false, 0);
        }
        self.ran = true;

        let id_string = self.identifier.id_string();
        let request = Arc::clone(self.identifier.request());
        let unit = request.unit();
        let span = tracing::info_span!(
            "compilation",
            id = %id_string,
            trace_id = %self.identifier.trace_id(),
            unit = %unit.format_full()
        );
        let _entered = span.enter();

        if request.install_as_default()
            && unit.has_code_at_level(request.entry(), self.host.full_optimization_level)
        {
            tracing::debug!(level = %self.host.full_optimization_level, "unit already compiled");
            return RequestOutcome::failure(ALREADY_COMPILED, false, 0);
        }

        let diagnostics = DiagnosticContext::new(
            id_string.clone(),
            DiagnosticSettings::default(),
            self.services.dumps.clone(),
        );
        let printer = StatusPrinter::new(Arc::clone(&self.services.console), self.unit_selected);

        let (retry, window, installed) = {
            let _timer = Timer::CompilationTime.start(self.services.statistics.as_ref());
            let mut runner = AttemptRunner::new(
                &self.identifier,
                &self.options,
                self.services.compiler.as_ref(),
                self.services.allocation.as_ref(),
                &printer,
            );
            let controller = RetryController::new(
                id_string.clone(),
                diagnostics.settings().clone(),
                self.options.retry.clone(),
                self.services.dumps.clone(),
            );
            let retry = controller.run(&mut runner);
            let installed = match &retry.terminal {
                Terminal::Succeeded(result) => Some(
                    InstallerAdapter::new(
                        self.services.installer.as_ref(),
                        self.services.statistics.as_ref(),
                    )
                    .install(&diagnostics, &self.identifier, result),
                ),
                _ => None,
            };
            (retry, runner.window(), installed)
        };

        let install_error = match installed {
            Some(Ok(artifact)) => {
                self.installed = Some(artifact);
                None
            }
            Some(Err(error)) => Some(error),
            None => None,
        };

        let attempts = retry.attempts;
        let outcome = match (&retry.terminal, &install_error) {
            (Terminal::Bailout(bailout), _) => self.bailout_outcome(&printer, bailout, attempts),
            (Terminal::Failed(error), _) | (Terminal::Succeeded(_), Some(error)) => {
                self.internal_error_outcome(&printer, error, attempts)
            }
            (Terminal::Succeeded(result), None) => {
                RequestOutcome::Success {
                    code_size_delta: i64::from(result.bytecode_size())
                        - i64::from(unit.code_size()),
                    attempts,
                }
            }
        };

        let outcome = self.finalize(&printer, &retry, window, outcome);
        tracing::info!(
            outcome = outcome.kind(),
            attempts = outcome.attempts(),
            bailouts = retry.bailouts,
            "compilation finished"
        );
        outcome
    }

    fn bailout_outcome(
        &self,
        printer: &StatusPrinter,
        bailout: &Bailout,
        attempts: u32,
    ) -> RequestOutcome {
        let unit = self.identifier.request().unit();
        tracing::info!(
            permanent = bailout.is_permanent(),
            reason = bailout.reason().unwrap_or_default(),
            "bailout: {bailout}"
        );

        if self.options.print_bailout || self.options.exit_on_bailout {
            printer.println(&format!("Bailout in {}", unit.format_full()));
            printer.print_block(&render_chain(&CompilerError::Bailout(bailout.clone())));
        }
        if self.options.exit_on_bailout {
            tracing::error!("bailout with exit-on-bailout set; requesting termination");
            return RequestOutcome::fatal(bailout.message(), attempts);
        }
        if bailout.is_permanent() && self.options.print_bailout {
            let osr = if self.identifier.request().is_osr() {
                "OSR"
            } else {
                ""
            };
            printer.println(&format!(
                "Permanent bailout {} compiling method {} {osr}.",
                bailout.message(),
                unit.format_full()
            ));
        }
        RequestOutcome::failure(bailout.message(), !bailout.is_permanent(), attempts)
    }

    fn internal_error_outcome(
        &self,
        printer: &StatusPrinter,
        error: &CompilerError,
        attempts: u32,
    ) -> RequestOutcome {
        let message = error.to_string();
        let committed = panic::catch_unwind(AssertUnwindSafe(|| {
            emit_failure(self.services.events.as_ref(), || FailureEvent {
                compile_id: self.identifier.id(),
                message: message.clone(),
                trace_id: self.identifier.trace_id(),
            })
        }));
        let mut fatal = match committed {
            Ok(Ok(_)) => false,
            Ok(Err(event_error)) => self.handle_exception(printer, &event_error),
            Err(payload) => self.handle_exception(printer, &CompilerError::from_panic(payload)),
        };
        fatal |= self.handle_exception(printer, error);

        if fatal {
            RequestOutcome::fatal(message, attempts)
        } else {
            RequestOutcome::failure(message, false, attempts)
        }
    }

    /// Records statistics and emits the completion event. Secondary failures
    /// here never mask `outcome`; they only escalate it to `Fatal` when the
    /// exception policy says so.
    fn finalize(
        &self,
        printer: &StatusPrinter,
        retry: &RetryOutcome,
        window: CompileWindow,
        outcome: RequestOutcome,
    ) -> RequestOutcome {
        let result = retry.result();
        let statistics =
            TaskStatistics::from_parts(retry.bailouts, result, self.installed.as_ref());
        let mut escalation: Option<String> = None;

        let recorded = panic::catch_unwind(AssertUnwindSafe(|| {
            statistics.record(self.services.statistics.as_ref())
        }));
        if let Err(payload) = recorded {
            let error = CompilerError::from_panic(payload);
            if self.handle_exception(printer, &error) {
                escalation.get_or_insert_with(|| error.to_string());
            }
        }

        let unit = self.identifier.request().unit();
        let emitted = panic::catch_unwind(AssertUnwindSafe(|| {
            emit_completion(self.services.events.as_ref(), || CompletionEvent {
                method: unit.format_full(),
                compile_id: self.identifier.id(),
                compile_level: self.host.full_optimization_level,
                succeeded: result.is_some() && self.installed.is_some(),
                is_osr: self.identifier.request().is_osr(),
                code_size: statistics.installed_code_size,
                inlined_bytes: statistics.compiled_bytecodes,
                attempts: retry.attempts,
                started_at: window.started_at,
                finished_at: window.finished_at,
                trace_id: self.identifier.trace_id(),
            })
        }));
        let secondary: Option<Box<dyn StdError>> = match emitted {
            Ok(Ok(_)) => None,
            Ok(Err(error)) => Some(Box::new(error)),
            Err(payload) => Some(Box::new(CompilerError::from_panic(payload))),
        };
        if let Some(error) = secondary {
            if self.handle_exception(printer, error.as_ref()) {
                escalation.get_or_insert_with(|| error.to_string());
            }
        }

        match escalation {
            Some(message) if !outcome.is_fatal() => {
                RequestOutcome::fatal(message, outcome.attempts())
            }
            _ => outcome,
        }
    }

    /// Applies the exception policy to `error` and reports whether process
    /// termination is requested.
    fn handle_exception(&self, printer: &StatusPrinter, error: &(dyn StdError + 'static)) -> bool {
        let exit = self.options.exit_on_exception();
        if self.options.print_stack_trace_on_exception || exit {
            printer.print_block(&render_chain(error));
        }
        tracing::error!(error = %error, exit_requested = exit, "compiler exception");
        exit
    }
}

impl fmt::Display for CompilationTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.identifier.request().as_ref(), f)
    }
}

impl fmt::Debug for CompilationTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompilationTask")
            .field("identifier", &self.identifier)
            .field("ran", &self.ran)
            .field("installed", &self.installed)
            .finish_non_exhaustive()
    }
}
