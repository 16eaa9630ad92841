//! Orchestration core for compiling a single unit (method or function).
//!
//! A [`CompilationTask`] takes one [`CompilationRequest`] from submission to a
//! [`RequestOutcome`]: it runs the backend compiler through a bounded retry
//! protocol, classifies every failure, installs the produced artifact, updates
//! process-wide statistics, and emits exactly one completion event.
//!
//! ## Architectural Layer
//!
//! **Business logic + port definitions.** This crate has no I/O dependencies.
//! The backend compiler, the host code installer, the console, the event sink,
//! and the dump handler are reached only through the traits in [`ports`];
//! infrastructure crates implement them.
//!
//! ## Module Layout
//!
//! | Module | Contents |
//! |--------|----------|
//! | [`identifiers`] | Newtype identifiers (`RequestId`, `CompileLevel`, `TraceId`, `EntryPoint`) |
//! | [`types`] | Value types (`Timestamp`, `CompilationResult`, `InstalledArtifact`) |
//! | [`unit`] | The `CompilationUnit` abstraction supplied by the front-end |
//! | [`request`] | `CompilationRequest` and `CompilationIdentifier` |
//! | [`errors`] | Failure taxonomy (`Bailout`, `CompilerError`) and sink errors |
//! | [`options`] | Immutable option snapshot, host configuration, print filter |
//! | [`ports`] | Collaborator traits |
//! | [`diagnostics`] | Per-attempt diagnostic context and scope guards |
//! | [`bailout`] | Bailout classifier |
//! | [`attempt`] | Single-attempt runner |
//! | [`retry`] | Retry controller state machine |
//! | [`install`] | Artifact installer adapter |
//! | [`stats`] | Counters, timers, process-wide statistics |
//! | [`events`] | Completion and failure events |
//! | [`task`] | The `CompilationTask` orchestrator |

pub mod attempt;
pub mod bailout;
pub mod diagnostics;
pub mod errors;
pub mod events;
pub mod identifiers;
pub mod install;
pub mod options;
pub mod ports;
pub mod request;
pub mod retry;
pub mod stats;
pub mod task;
pub mod types;
pub mod unit;

mod printer;

// Re-export everything at the crate root for ergonomic usage by downstream crates.
pub use attempt::{Attempt, AttemptOutcome};
pub use bailout::{classify, Classification};
pub use diagnostics::{DiagnosticContext, DiagnosticSettings, Dump, ScopeGuard};
pub use errors::{Bailout, BailoutKind, CompilerError, EventError, OptionsError};
pub use events::{CompletionEvent, FailureEvent, NoopEventSink};
pub use identifiers::{CodeId, CompileLevel, EntryPoint, RequestId, TraceId};
pub use install::{InstallContext, InstallerAdapter};
pub use options::{CompilerOptions, HostConfig, PrintFilter, RetryOptions, MAX_RETRY_BUDGET};
pub use ports::{
    AllocationProbe, ArtifactInstaller, BackendCompiler, ConsoleSink, DumpHandler, EventSink,
    NoAllocationProbe, SilentConsole, StatisticsSink,
};
pub use request::{CompilationIdentifier, CompilationRequest};
pub use retry::{RetryController, RetryOutcome, RetryState, Terminal};
pub use stats::{
    Counter, GlobalStatistics, StatisticsSnapshot, TaskStatistics, Timer, TimerGuard,
};
pub use task::{CompilationServices, CompilationTask, RequestOutcome, FATAL_EXIT_CODE};
pub use types::{CompilationResult, InstalledArtifact, Timestamp};
pub use unit::{CompilationUnit, SpeculationLog};
