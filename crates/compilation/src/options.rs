//! Option snapshot consulted by a task, and the host facts it is resolved against.
//!
//! Options are parsed once (usually from JSON), validated, and then resolved
//! against a [`HostConfig`] when a task is constructed. The resolved snapshot
//! is immutable for the task's lifetime.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::{CompilationUnit, CompileLevel, OptionsError};

/// Upper bound on [`RetryOptions::budget`]; keeps a misconfiguration from
/// turning one request into an unbounded recompilation loop.
pub const MAX_RETRY_BUDGET: u32 = 8;

/// Compiler options relevant to task orchestration.
///
/// `Option<bool>` fields distinguish "explicitly set" from "left at the
/// default", which matters for [`CompilerOptions::resolve`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompilerOptions {
    /// Print a line when a compilation starts.
    pub print_compilation: bool,
    /// Print a summary line (time, sizes, allocation) when a compilation ends.
    pub print_after_compilation: bool,
    /// Comma-separated `Holder.name` glob patterns restricting which units
    /// produce start/finish lines.
    pub print_filter: Option<String>,
    /// Print bailouts to the console.
    pub print_bailout: bool,
    /// Request process termination on any bailout.
    pub exit_on_bailout: bool,
    /// Request process termination on an internal error. `None` means "not
    /// set": resolved to `true` while the host is bootstrapping.
    pub exit_on_exception: Option<bool>,
    /// Print the full error chain of internal errors.
    pub print_stack_trace_on_exception: bool,
    /// Inlining during high-tier optimization. `None` means "not set".
    pub inline: Option<bool>,
    /// Inlining during bytecode parsing. `None` means "not set".
    pub inline_during_parsing: Option<bool>,
    /// Retry behaviour for retryable bailouts.
    pub retry: RetryOptions,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            print_compilation: false,
            print_after_compilation: false,
            print_filter: None,
            print_bailout: false,
            exit_on_bailout: false,
            exit_on_exception: None,
            print_stack_trace_on_exception: false,
            inline: None,
            inline_during_parsing: None,
            retry: RetryOptions::default(),
        }
    }
}

impl CompilerOptions {
    /// Parses a JSON option snapshot and validates it.
    pub fn from_json(json: &str) -> Result<Self, OptionsError> {
        let options: Self = serde_json::from_str(json)?;
        options.validate()?;
        Ok(options)
    }

    /// Checks invariants that serde cannot express.
    pub fn validate(&self) -> Result<(), OptionsError> {
        if self.retry.budget > MAX_RETRY_BUDGET {
            return Err(OptionsError::RetryBudgetTooLarge {
                budget: self.retry.budget,
                max: MAX_RETRY_BUDGET,
            });
        }
        if let Some(filter) = &self.print_filter {
            PrintFilter::parse(filter)?;
        }
        Ok(())
    }

    /// Applies host facts to produce the snapshot a task runs with.
    ///
    /// - If the host has inlining disabled, `inline` and
    ///   `inline_during_parsing` are turned off unless explicitly set.
    /// - If `exit_on_exception` is not set, it becomes `true` while the host
    ///   is bootstrapping and `false` otherwise.
    pub fn resolve(&self, host: &HostConfig) -> Self {
        let mut resolved = self.clone();
        if !host.inline {
            if resolved.inline.is_none() {
                resolved.inline = Some(false);
            }
            if resolved.inline_during_parsing.is_none() {
                resolved.inline_during_parsing = Some(false);
            }
        }
        if resolved.exit_on_exception.is_none() {
            resolved.exit_on_exception = Some(host.bootstrapping);
        }
        resolved
    }

    pub fn inline_enabled(&self) -> bool {
        self.inline.unwrap_or(true)
    }

    pub fn inline_during_parsing_enabled(&self) -> bool {
        self.inline_during_parsing.unwrap_or(true)
    }

    pub fn exit_on_exception(&self) -> bool {
        self.exit_on_exception.unwrap_or(false)
    }

    /// Parsed print filter, if one is configured.
    pub fn print_filter(&self) -> Result<Option<PrintFilter>, OptionsError> {
        self.print_filter.as_deref().map(PrintFilter::parse).transpose()
    }
}

// ---------------------------------------------------------------------------

/// How retryable bailouts are retried.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RetryOptions {
    /// Additional attempts permitted after the first retryable bailout.
    pub budget: u32,
    /// Enable dump capture in the diagnostic context of a retry.
    pub dump_on_retry: bool,
    /// Directory retry dumps are written under (`<dir>/retry-dumps/<id>/`).
    pub output_directory: Option<PathBuf>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            budget: 1,
            dump_on_retry: true,
            output_directory: None,
        }
    }
}

// ---------------------------------------------------------------------------

/// Facts about the host runtime that influence option resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    /// Whether the host runtime permits inlining at all.
    pub inline: bool,
    /// Level reported as fully optimized; the already-compiled guard checks it.
    pub full_optimization_level: CompileLevel,
    /// The compiler is compiling itself during startup.
    pub bootstrapping: bool,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            inline: true,
            full_optimization_level: CompileLevel::new(4),
            bootstrapping: false,
        }
    }
}

// ---------------------------------------------------------------------------

/// Restricts per-unit console output to units whose `Holder.name` matches one
/// of a set of glob patterns.
#[derive(Debug, Clone)]
pub struct PrintFilter {
    patterns: Vec<glob::Pattern>,
}

impl PrintFilter {
    /// Parses comma-separated glob patterns such as `java.util.*.put,Foo.bar`.
    pub fn parse(spec: &str) -> Result<Self, OptionsError> {
        let patterns = spec
            .split(',')
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(|p| {
                glob::Pattern::new(p).map_err(|e| OptionsError::InvalidPrintFilter {
                    pattern: p.to_string(),
                    message: e.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self { patterns })
    }

    /// An empty filter matches every unit.
    pub fn matches(&self, unit: &dyn CompilationUnit) -> bool {
        if self.patterns.is_empty() {
            return true;
        }
        let name = unit.format_short();
        self.patterns.iter().any(|p| p.matches(&name))
    }
}
