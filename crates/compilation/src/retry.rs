//! Retry controller.
//!
//! Runs an [`Attempt`] until it reaches a terminal state:
//!
//! ```text
//! Idle -> Attempting -> Succeeded
//!                    -> StoppedPermanent          (permanent bailout)
//!                    -> StoppedRetriesExhausted   (retryable bailout, budget spent)
//!                    -> Failed                    (internal error)
//! Attempting -> Attempting                        (retryable bailout, budget left)
//! ```
//!
//! Every attempt gets its own [`DiagnosticContext`]; retries are seeded with
//! the previous attempt's bailout and use retry diagnostic settings.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    Attempt, AttemptOutcome, Bailout, CompilationResult, CompilerError, DiagnosticContext,
    DiagnosticSettings, DumpHandler, RetryOptions,
};

/// Controller state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RetryState {
    Idle,
    Attempting,
    Succeeded,
    StoppedPermanent,
    StoppedRetriesExhausted,
    Failed,
}

impl RetryState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, RetryState::Idle | RetryState::Attempting)
    }
}

/// Payload of a terminal state. The controller owns the only result slot.
#[derive(Debug)]
pub enum Terminal {
    Succeeded(CompilationResult),
    Bailout(Bailout),
    Failed(CompilerError),
}

/// What the controller hands back to the task.
#[derive(Debug)]
pub struct RetryOutcome {
    pub state: RetryState,
    /// Attempts made, including the first.
    pub attempts: u32,
    /// Attempts that ended in a bailout of either kind.
    pub bailouts: u32,
    pub terminal: Terminal,
}

impl RetryOutcome {
    pub fn is_success(&self) -> bool {
        self.state == RetryState::Succeeded
    }

    pub fn result(&self) -> Option<&CompilationResult> {
        match &self.terminal {
            Terminal::Succeeded(result) => Some(result),
            _ => None,
        }
    }

    /// Whether the scheduler may request the compilation again.
    pub fn is_retryable(&self) -> bool {
        self.state == RetryState::StoppedRetriesExhausted
    }
}

// ---------------------------------------------------------------------------

/// Drives attempts for one task. A controller runs once; the state it ends
/// in is reported through [`RetryOutcome::state`].
pub struct RetryController {
    label: String,
    base: DiagnosticSettings,
    retry: RetryOptions,
    dump_handler: Option<Arc<dyn DumpHandler>>,
}

impl RetryController {
    /// `label` is the task's id string; it names every attempt's context.
    pub fn new(
        label: impl Into<String>,
        base: DiagnosticSettings,
        retry: RetryOptions,
        dump_handler: Option<Arc<dyn DumpHandler>>,
    ) -> Self {
        Self {
            label: label.into(),
            base,
            retry,
            dump_handler,
        }
    }

    /// Runs `attempt` until a terminal state is reached.
    pub fn run(self, attempt: &mut dyn Attempt) -> RetryOutcome {
        let mut state = RetryState::Idle;
        self.transition(&mut state, RetryState::Attempting);
        let mut settings = self.base.first_attempt();
        let mut cause: Option<Bailout> = None;
        let mut attempts = 0;
        let mut bailouts = 0;

        loop {
            attempts += 1;
            let outcome = {
                // Dropped before the next attempt so its dumps flush first.
                let diagnostics = DiagnosticContext::new(
                    self.label.clone(),
                    settings.clone(),
                    self.dump_handler.clone(),
                );
                attempt.run(&diagnostics, cause.as_ref())
            };

            let (next, terminal) = match outcome {
                AttemptOutcome::Success(result) => {
                    (RetryState::Succeeded, Terminal::Succeeded(result))
                }
                AttemptOutcome::PermanentBailout(bailout) => {
                    bailouts += 1;
                    (RetryState::StoppedPermanent, Terminal::Bailout(bailout))
                }
                AttemptOutcome::InternalError(error) => {
                    (RetryState::Failed, Terminal::Failed(error))
                }
                AttemptOutcome::RetryableBailout(bailout) => {
                    bailouts += 1;
                    if attempts > self.retry.budget {
                        (RetryState::StoppedRetriesExhausted, Terminal::Bailout(bailout))
                    } else {
                        tracing::info!(
                            id = %self.label,
                            attempt = attempts,
                            budget = self.retry.budget,
                            cause = %bailout,
                            "retrying compilation after bailout"
                        );
                        settings = settings.for_retry(&self.retry, &self.label, &bailout);
                        cause = Some(bailout);
                        continue;
                    }
                }
            };

            self.transition(&mut state, next);
            return RetryOutcome {
                state,
                attempts,
                bailouts,
                terminal,
            };
        }
    }

    fn transition(&self, state: &mut RetryState, next: RetryState) {
        tracing::trace!(id = %self.label, from = ?state, to = ?next, "retry state");
        *state = next;
    }
}
