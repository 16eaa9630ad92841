//! Collaborator traits ("ports") implemented outside this crate.
//!
//! Every collaborator is injected into a task through
//! [`crate::CompilationServices`]; nothing here is looked up globally. All
//! traits are synchronous: a task runs start-to-finish on one worker thread,
//! and any waiting happens inside these calls.

use std::path::Path;

use crate::{
    CompilationIdentifier, CompilationRequest, CompilationResult, CompilationUnit,
    CompilerError, CompilerOptions, CompletionEvent, Counter, DiagnosticContext, Dump,
    EntryPoint, EventError, FailureEvent, InstallContext, InstalledArtifact, SpeculationLog,
    Timer,
};

// ---------------------------------------------------------------------------
// Backend and installer
// ---------------------------------------------------------------------------

/// The code generator. Turns a unit into machine code or reports why not.
pub trait BackendCompiler: Send + Sync {
    /// Compiles `unit` entered at `entry`.
    ///
    /// Returns [`CompilerError::Bailout`] for expected, classified failures;
    /// any other error is treated as an internal defect.
    fn compile(
        &self,
        unit: &dyn CompilationUnit,
        entry: EntryPoint,
        use_profiling_info: bool,
        identifier: &CompilationIdentifier,
        options: &CompilerOptions,
        diagnostics: &DiagnosticContext,
    ) -> Result<CompilationResult, CompilerError>;
}

/// The host's code cache. Makes compiled code executable in the running process.
///
/// Implementations provide their own synchronization; tasks call this
/// concurrently without additional locking.
pub trait ArtifactInstaller: Send + Sync {
    #[allow(clippy::too_many_arguments)]
    fn create_installed(
        &self,
        diagnostics: &DiagnosticContext,
        unit: &dyn CompilationUnit,
        request: &CompilationRequest,
        result: &CompilationResult,
        speculation_log: Option<&dyn SpeculationLog>,
        install_as_default: bool,
        context: &InstallContext,
    ) -> Result<InstalledArtifact, CompilerError>;
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Structured event backend.
pub trait EventSink: Send + Sync {
    /// Cheap pre-check; when `false` no event is built or committed.
    fn should_write(&self) -> bool;

    fn commit_completion(&self, event: &CompletionEvent) -> Result<(), EventError>;

    fn commit_failure(&self, event: &FailureEvent) -> Result<(), EventError>;
}

/// Single-line console output.
pub trait ConsoleSink: Send + Sync {
    /// Process-wide suppression; when `true` nothing is printed.
    fn is_suppressed(&self) -> bool;

    fn println(&self, line: &str);
}

/// Process-wide counters and timers.
///
/// Implementations must tolerate concurrent calls from many tasks.
pub trait StatisticsSink: Send + Sync {
    fn add(&self, counter: Counter, delta: u64);

    fn record_time(&self, timer: Timer, elapsed: std::time::Duration);
}

/// Receives dumps buffered by a [`DiagnosticContext`] when it is released.
pub trait DumpHandler: Send + Sync {
    /// `directory` is the context's configured dump location, if any.
    fn flush(&self, label: &str, directory: Option<&Path>, dumps: Vec<Dump>)
        -> std::io::Result<()>;
}

/// Samples how many bytes the current thread has allocated so far.
pub trait AllocationProbe: Send + Sync {
    fn thread_allocated_bytes(&self) -> u64;
}

// ---------------------------------------------------------------------------
// Defaults
// ---------------------------------------------------------------------------

/// Probe for hosts that do not track per-thread allocation; always zero.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoAllocationProbe;

impl AllocationProbe for NoAllocationProbe {
    fn thread_allocated_bytes(&self) -> u64 {
        0
    }
}

/// Console that is permanently suppressed.
#[derive(Debug, Default, Clone, Copy)]
pub struct SilentConsole;

impl ConsoleSink for SilentConsole {
    fn is_suppressed(&self) -> bool {
        true
    }

    fn println(&self, _line: &str) {}
}
