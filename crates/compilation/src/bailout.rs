//! Bailout classifier.
//!
//! Decides, for an error reported by the backend, whether it is a permanent
//! bailout (never retried; the scheduler must not recompile at this tier), a
//! retryable bailout (a fresh attempt may succeed), or not a bailout at all.
//! Anything that is not an explicitly classified [`Bailout`] is an internal
//! error.

use crate::{BailoutKind, CompilerError};

/// Result of classifying a compiler error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Permanent { message: String, reason: String },
    Retryable { message: String },
    Internal,
}

impl Classification {
    pub fn is_bailout(&self) -> bool {
        !matches!(self, Classification::Internal)
    }

    /// Whether the scheduler may request this compilation again.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Classification::Retryable { .. })
    }
}

/// Reason reported for permanent bailouts that did not name one.
const UNSPECIFIED_REASON: &str = "unspecified";

/// Classifies `error`.
pub fn classify(error: &CompilerError) -> Classification {
    let Some(bailout) = error.as_bailout() else {
        return Classification::Internal;
    };
    match bailout.kind() {
        BailoutKind::Retryable => Classification::Retryable {
            message: bailout.message().to_string(),
        },
        BailoutKind::Permanent => Classification::Permanent {
            message: bailout.message().to_string(),
            reason: bailout.reason().unwrap_or(UNSPECIFIED_REASON).to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Bailout;

    #[test]
    fn permanent_bailout_carries_reason() {
        let err = Bailout::permanent("unbalanced monitor", "unstructured-locking").into();
        assert_eq!(
            classify(&err),
            Classification::Permanent {
                message: "unbalanced monitor".to_string(),
                reason: "unstructured-locking".to_string(),
            }
        );
    }

    #[test]
    fn retryable_bailout_is_retryable() {
        let classification = classify(&Bailout::retryable("node limit exceeded").into());
        assert!(classification.is_bailout());
        assert!(classification.is_retryable());
    }

    #[test]
    fn everything_else_is_internal() {
        let internal = CompilerError::internal("AssertionError", "phase invariant");
        assert_eq!(classify(&internal), Classification::Internal);

        let panicked = CompilerError::Panicked {
            message: "index out of bounds".to_string(),
        };
        assert!(!classify(&panicked).is_bailout());

        let other: CompilerError =
            Box::<dyn std::error::Error + Send + Sync>::from("opaque failure").into();
        assert_eq!(classify(&other), Classification::Internal);
    }
}
