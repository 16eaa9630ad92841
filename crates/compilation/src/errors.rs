//! Failure taxonomy for compilation attempts, plus sink and configuration errors.
//!
//! [`CompilerError`] is what the backend compiler and the host installer
//! report. A [`Bailout`] is an *expected* inability to finish a compile and
//! carries a [`BailoutKind`] deciding whether a retry may help. Everything else
//! ([`CompilerError::Internal`], [`CompilerError::Panicked`],
//! [`CompilerError::Other`]) is an unexpected defect and is never retried.
//!
//! [`EventError`] and [`OptionsError`] cover the event pipeline and the option
//! snapshot respectively.

use std::any::Any;
use std::error::Error as StdError;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};
use thiserror::Error;

// ---------------------------------------------------------------------------
// Bailouts
// ---------------------------------------------------------------------------

/// Whether a bailout can be cured by compiling again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BailoutKind {
    /// A transient internal limit was hit (e.g. node count). A fresh attempt
    /// may succeed.
    Retryable,
    /// The unit itself cannot be compiled (e.g. unstructured control flow).
    /// Every retry would fail the same way; the scheduler must not recompile
    /// at this tier.
    Permanent,
}

/// A compiler-signalled inability to complete compilation.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[error("{message}")]
pub struct Bailout {
    message: String,
    kind: BailoutKind,
    reason: Option<String>,
    cause: Option<String>,
}

impl Bailout {
    /// Creates a retryable bailout.
    pub fn retryable(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: BailoutKind::Retryable,
            reason: None,
            cause: None,
        }
    }

    /// Creates a permanent bailout with a short machine-readable reason.
    pub fn permanent(message: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind: BailoutKind::Permanent,
            reason: Some(reason.into()),
            cause: None,
        }
    }

    /// Attaches a description of the condition that triggered the bailout.
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> BailoutKind {
        self.kind
    }

    pub fn is_permanent(&self) -> bool {
        self.kind == BailoutKind::Permanent
    }

    /// Reason string; only permanent bailouts carry one.
    pub fn reason(&self) -> Option<&str> {
        self.reason.as_deref()
    }

    pub fn cause(&self) -> Option<&str> {
        self.cause.as_deref()
    }
}

// ---------------------------------------------------------------------------
// Compiler errors
// ---------------------------------------------------------------------------

/// Errors reported by the backend compiler or the host installer.
#[derive(Debug, Error)]
pub enum CompilerError {
    /// Expected, classified inability to compile.
    #[error(transparent)]
    Bailout(#[from] Bailout),

    /// Unexpected defect with a type-like `kind` (e.g. `GraphVerificationError`).
    ///
    /// `context` accumulates the diagnostic scope path the error travelled
    /// through.
    #[error("{kind}: {message}")]
    Internal {
        kind: String,
        message: String,
        context: Vec<String>,
    },

    /// A collaborator panicked and the panic was contained.
    #[error("panic: {message}")]
    Panicked { message: String },

    /// Any other error a collaborator chose to surface.
    #[error(transparent)]
    Other(#[from] Box<dyn StdError + Send + Sync>),
}

impl CompilerError {
    /// Creates an internal error.
    pub fn internal(kind: impl Into<String>, message: impl Into<String>) -> Self {
        CompilerError::Internal {
            kind: kind.into(),
            message: message.into(),
            context: Vec::new(),
        }
    }

    /// Converts a payload caught by `std::panic::catch_unwind`.
    pub fn from_panic(payload: Box<dyn Any + Send>) -> Self {
        let message = if let Some(s) = payload.downcast_ref::<&str>() {
            (*s).to_string()
        } else if let Some(s) = payload.downcast_ref::<String>() {
            s.clone()
        } else {
            "non-string panic payload".to_string()
        };
        CompilerError::Panicked { message }
    }

    pub fn as_bailout(&self) -> Option<&Bailout> {
        match self {
            CompilerError::Bailout(bailout) => Some(bailout),
            _ => None,
        }
    }

    pub fn is_bailout(&self) -> bool {
        self.as_bailout().is_some()
    }

    /// Appends a diagnostic scope to an internal error's context.
    ///
    /// Other variants are left untouched.
    pub fn push_context(&mut self, scope: impl Into<String>) {
        if let CompilerError::Internal { context, .. } = self {
            context.push(scope.into());
        }
    }

    /// Scope path recorded for an internal error, innermost last.
    pub fn context(&self) -> &[String] {
        match self {
            CompilerError::Internal { context, .. } => context,
            _ => &[],
        }
    }
}

/// Renders an error and its `source()` chain as a multi-line trace.
///
/// Used wherever a full error trace is printed.
pub fn render_chain(error: &(dyn StdError + 'static)) -> String {
    let mut out = error.to_string();
    if let Some(compiler) = error.downcast_ref::<CompilerError>() {
        for scope in compiler.context() {
            let _ = write!(out, "\n    in scope {scope}");
        }
        if let Some(cause) = compiler.as_bailout().and_then(Bailout::cause) {
            let _ = write!(out, "\nCaused by: {cause}");
        }
    }
    let mut source = error.source();
    while let Some(inner) = source {
        let _ = write!(out, "\nCaused by: {inner}");
        source = inner.source();
    }
    out
}

// ---------------------------------------------------------------------------
// Event pipeline errors
// ---------------------------------------------------------------------------

/// Errors raised while committing a completion or failure event.
#[derive(Debug, Error)]
pub enum EventError {
    #[error("event sink write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("event serialisation failed: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("event sink rejected record: {0}")]
    Rejected(String),
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Invalid option snapshot. Produced at task construction; a task never runs
/// with invalid options.
#[derive(Debug, Error)]
pub enum OptionsError {
    #[error("could not parse compiler options: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid print filter pattern '{pattern}': {message}")]
    InvalidPrintFilter { pattern: String, message: String },

    #[error("retry budget {budget} exceeds the maximum of {max}")]
    RetryBudgetTooLarge { budget: u32, max: u32 },
}
