//! Per-attempt diagnostic context.
//!
//! A [`DiagnosticContext`] is created fresh for every attempt (and once for the
//! task as a whole), nests named scopes as `tracing` spans, buffers dumps, and
//! funnels errors through [`DiagnosticContext::handle`]. Dropping the context
//! releases it: buffered dumps are flushed to the [`DumpHandler`] on every exit
//! path, including unwinding.

use std::cell::RefCell;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};

use crate::{Bailout, CompilerError, DumpHandler, RetryOptions};

/// Settings a context is created with. The default is the task-level
/// context: no dumps, attempt 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiagnosticSettings {
    /// Buffer dumps for the dump handler.
    pub dump_enabled: bool,
    /// Where the dump handler should place this context's dumps.
    pub dump_directory: Option<PathBuf>,
    /// Rendered cause of the previous attempt's failure, for retries.
    pub retry_cause: Option<String>,
    /// 1-based attempt number; 0 for the task-level context.
    pub attempt: u32,
}

impl DiagnosticSettings {
    /// Settings for the attempt after one that bailed out with `cause`.
    ///
    /// Retries capture dumps so the failure can be inspected offline.
    pub fn for_retry(&self, retry: &RetryOptions, id_string: &str, cause: &Bailout) -> Self {
        Self {
            dump_enabled: retry.dump_on_retry,
            dump_directory: retry
                .output_directory
                .as_ref()
                .map(|dir| dir.join("retry-dumps").join(id_string)),
            retry_cause: Some(cause.to_string()),
            attempt: self.attempt + 1,
        }
    }

    /// Settings for the first attempt.
    pub fn first_attempt(&self) -> Self {
        Self {
            attempt: 1,
            ..self.clone()
        }
    }
}

/// One captured dump.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dump {
    /// Scope path active when the dump was taken.
    pub scope: String,
    pub label: String,
    pub contents: String,
}

// ---------------------------------------------------------------------------

/// Scoped logging/tracing/dump handle for one attempt.
pub struct DiagnosticContext {
    label: String,
    settings: DiagnosticSettings,
    scopes: RefCell<Vec<&'static str>>,
    dumps: RefCell<Vec<Dump>>,
    dump_handler: Option<Arc<dyn DumpHandler>>,
}

impl DiagnosticContext {
    /// Opens a context labelled with the task's id string.
    pub fn new(
        label: impl Into<String>,
        settings: DiagnosticSettings,
        dump_handler: Option<Arc<dyn DumpHandler>>,
    ) -> Self {
        let label = label.into();
        tracing::trace!(
            id = %label,
            attempt = settings.attempt,
            dump = settings.dump_enabled,
            "diagnostic context opened"
        );
        Self {
            label,
            settings,
            scopes: RefCell::new(Vec::new()),
            dumps: RefCell::new(Vec::new()),
            dump_handler,
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn settings(&self) -> &DiagnosticSettings {
        &self.settings
    }

    pub fn attempt(&self) -> u32 {
        self.settings.attempt
    }

    pub fn retry_cause(&self) -> Option<&str> {
        self.settings.retry_cause.as_deref()
    }

    pub fn is_dump_enabled(&self) -> bool {
        self.settings.dump_enabled
    }

    /// Enters a named scope; the scope ends when the guard drops.
    pub fn scope(&self, name: &'static str) -> ScopeGuard<'_> {
        self.scopes.borrow_mut().push(name);
        let span = tracing::debug_span!("scope", scope = name, id = %self.label).entered();
        ScopeGuard {
            context: self,
            name,
            started: Instant::now(),
            _span: span,
        }
    }

    /// Dot-separated path of the currently open scopes.
    pub fn scope_path(&self) -> String {
        self.scopes.borrow().join(".")
    }

    /// Logs a message attributed to this context.
    pub fn log(&self, message: &str) {
        tracing::debug!(
            id = %self.label,
            attempt = self.settings.attempt,
            scope = %self.scope_path(),
            "{message}"
        );
    }

    /// Buffers a dump if dumping is enabled for this context.
    pub fn dump(&self, label: impl Into<String>, contents: impl Into<String>) {
        if !self.settings.dump_enabled {
            return;
        }
        let dump = Dump {
            scope: self.scope_path(),
            label: label.into(),
            contents: contents.into(),
        };
        self.dumps.borrow_mut().push(dump);
    }

    /// Number of dumps waiting to be flushed.
    pub fn pending_dumps(&self) -> usize {
        self.dumps.borrow().len()
    }

    /// Funnels an error through this context before it propagates.
    ///
    /// Internal errors are tagged with the current scope path; every error is
    /// logged and, when dumping, recorded as a dump. The error is returned for
    /// the caller to propagate.
    pub fn handle(&self, mut error: CompilerError) -> CompilerError {
        let path = self.scope_path();
        if !path.is_empty() {
            error.push_context(path.clone());
        }
        match &error {
            CompilerError::Bailout(bailout) => {
                tracing::debug!(
                    id = %self.label,
                    scope = %path,
                    permanent = bailout.is_permanent(),
                    "bailout: {bailout}"
                );
            }
            other => {
                tracing::warn!(id = %self.label, scope = %path, "compiler error: {other}");
            }
        }
        self.dump("exception", crate::errors::render_chain(&error));
        error
    }
}

impl std::fmt::Debug for DiagnosticContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiagnosticContext")
            .field("label", &self.label)
            .field("settings", &self.settings)
            .field("scopes", &self.scopes.borrow())
            .field("pending_dumps", &self.dumps.borrow().len())
            .finish()
    }
}

impl Drop for DiagnosticContext {
    fn drop(&mut self) {
        let dumps = std::mem::take(self.dumps.get_mut());
        if dumps.is_empty() {
            return;
        }
        let Some(handler) = &self.dump_handler else {
            tracing::debug!(
                id = %self.label,
                count = dumps.len(),
                "dropping dumps: no dump handler"
            );
            return;
        };
        let count = dumps.len();
        if let Err(e) = handler.flush(&self.label, self.settings.dump_directory.as_deref(), dumps) {
            tracing::warn!(id = %self.label, count, error = %e, "failed to flush dumps");
        }
    }
}

// ---------------------------------------------------------------------------

/// RAII guard for a named scope inside a [`DiagnosticContext`].
pub struct ScopeGuard<'a> {
    context: &'a DiagnosticContext,
    name: &'static str,
    started: Instant,
    _span: tracing::span::EnteredSpan,
}

impl ScopeGuard<'_> {
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        tracing::trace!(
            scope = self.name,
            elapsed_us = self.started.elapsed().as_micros() as u64,
            "scope closed"
        );
        self.context.scopes.borrow_mut().pop();
    }
}


#[cfg(test)]
mod tests {
    use super::test_support::RecordingDumps;
    use super::*;

    fn dumping() -> DiagnosticSettings {
        DiagnosticSettings {
            dump_enabled: true,
            ..DiagnosticSettings::default()
        }
    }

    #[test]
    fn scopes_nest_and_unwind() {
        let ctx = DiagnosticContext::new("1", DiagnosticSettings::default(), None);
        {
            let outer = ctx.scope("Compiling");
            assert_eq!(outer.name(), "Compiling");
            {
                let _inner = ctx.scope("CodeInstall");
                assert_eq!(ctx.scope_path(), "Compiling.CodeInstall");
            }
            assert_eq!(ctx.scope_path(), "Compiling");
        }
        assert_eq!(ctx.scope_path(), "");
    }

    #[test]
    fn dumps_are_ignored_unless_enabled() {
        let ctx = DiagnosticContext::new("1", DiagnosticSettings::default(), None);
        ctx.dump("graph", "n1 -> n2");
        assert_eq!(ctx.pending_dumps(), 0);
    }

    #[test]
    fn drop_flushes_buffered_dumps() {
        let handler = Arc::new(RecordingDumps::default());
        {
            let ctx = DiagnosticContext::new("5%", dumping(), Some(handler.clone()));
            let _scope = ctx.scope("Compiling");
            ctx.dump("graph", "n1 -> n2");
        }
        let flushes = handler.flushes.lock().unwrap();
        assert_eq!(flushes.len(), 1);
        assert_eq!(flushes[0].0, "5%");
        assert_eq!(flushes[0].2[0].scope, "Compiling");
    }

    #[test]
    fn drop_flushes_on_unwind() {
        let handler = Arc::new(RecordingDumps::default());
        let cloned = handler.clone();
        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let ctx = DiagnosticContext::new("9", dumping(), Some(cloned));
            ctx.dump("state", "before crash");
            panic!("attempt blew up");
        }));
        assert!(caught.is_err());
        assert_eq!(handler.flushes.lock().unwrap().len(), 1);
    }

    #[test]
    fn handle_tags_internal_errors_with_scope() {
        let ctx = DiagnosticContext::new("3", dumping(), None);
        let _scope = ctx.scope("Compiling");
        let err = ctx.handle(CompilerError::internal("E", "bad graph"));
        assert_eq!(err.context(), ["Compiling".to_string()]);
        assert_eq!(ctx.pending_dumps(), 1);
    }

    #[test]
    fn handle_passes_bailouts_through() {
        let ctx = DiagnosticContext::new("3", DiagnosticSettings::default(), None);
        let err = ctx.handle(Bailout::permanent("unbalanced monitor", "monitor").into());
        assert_eq!(err.as_bailout().unwrap().message(), "unbalanced monitor");
    }

    #[test]
    fn retry_settings_enable_dumps_under_output_directory() {
        let retry = RetryOptions {
            budget: 1,
            dump_on_retry: true,
            output_directory: Some(PathBuf::from("/tmp/jit")),
        };
        let first = DiagnosticSettings::default().first_attempt();
        let second = first.for_retry(&retry, "12%", &Bailout::retryable("node limit exceeded"));
        assert!(second.dump_enabled);
        assert_eq!(second.attempt, 2);
        assert_eq!(
            second.dump_directory,
            Some(PathBuf::from("/tmp/jit/retry-dumps/12%"))
        );
        assert_eq!(second.retry_cause.as_deref(), Some("node limit exceeded"));
    }
}
