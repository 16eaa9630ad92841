//! Value types produced and consumed by a compilation.
//!
//! Unlike the identifiers in [`crate::identifiers`], these types carry data
//! with invariants: a [`CompilationResult`] is immutable once produced, and its
//! target code size always equals the length of its code buffer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CodeId, EntryPoint};

// ---------------------------------------------------------------------------
// Compilation output
// ---------------------------------------------------------------------------

/// Output of one successful backend compile.
///
/// Owned by the attempt that produced it, then moved into the retry outcome
/// and lent to the installer. There are no setters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilationResult {
    target_code: Vec<u8>,
    bytecode_size: u32,
}

impl CompilationResult {
    /// Creates a result from the emitted machine code and the number of
    /// bytecodes the compile consumed (including inlined callees).
    pub fn new(target_code: Vec<u8>, bytecode_size: u32) -> Self {
        Self {
            target_code,
            bytecode_size,
        }
    }

    /// Returns the emitted machine code.
    pub fn target_code(&self) -> &[u8] {
        &self.target_code
    }

    /// Returns the size of the emitted machine code in bytes.
    pub fn target_code_size(&self) -> u32 {
        u32::try_from(self.target_code.len()).unwrap_or(u32::MAX)
    }

    /// Returns the number of bytecodes compiled, including inlined ones.
    pub fn bytecode_size(&self) -> u32 {
        self.bytecode_size
    }
}

// ---------------------------------------------------------------------------

/// Handle to code that is now resident and executable in the host process.
///
/// Returned by the host installer; the task keeps it after installation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstalledArtifact {
    code_id: CodeId,
    size: u32,
    entry: EntryPoint,
    is_default: bool,
}

impl InstalledArtifact {
    /// Creates a new artifact handle.
    pub fn new(code_id: CodeId, size: u32, entry: EntryPoint, is_default: bool) -> Self {
        Self {
            code_id,
            size,
            entry,
            is_default,
        }
    }

    /// Returns the host-assigned code id.
    pub fn code_id(&self) -> CodeId {
        self.code_id
    }

    /// Returns the installed code size in bytes.
    pub fn size(&self) -> u32 {
        self.size
    }

    /// Returns the entry point the code was compiled for.
    pub fn entry(&self) -> EntryPoint {
        self.entry
    }

    /// Returns `true` if the code became the unit's default code.
    pub fn is_default(&self) -> bool {
        self.is_default
    }
}

// ---------------------------------------------------------------------------
// Time
// ---------------------------------------------------------------------------

/// A UTC wall-clock timestamp.
///
/// Wraps [`chrono::DateTime<Utc>`] so callers never depend on `chrono` types
/// directly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Returns the current UTC time as a [`Timestamp`].
    pub fn now() -> Self {
        Self(Utc::now())
    }

    /// Creates a [`Timestamp`] from a [`DateTime<Utc>`].
    pub fn from_utc(dt: DateTime<Utc>) -> Self {
        Self(dt)
    }

    /// Returns the underlying [`DateTime<Utc>`].
    pub fn as_datetime(self) -> DateTime<Utc> {
        self.0
    }
}

impl std::fmt::Display for Timestamp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.to_rfc3339())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn target_code_size_tracks_buffer_length() {
        let result = CompilationResult::new(vec![0x90; 340], 120);
        assert_eq!(result.target_code_size(), 340);
        assert_eq!(result.bytecode_size(), 120);
        assert_eq!(result.target_code().len(), 340);
    }

    #[test]
    fn installed_artifact_exposes_host_identity() {
        let artifact =
            InstalledArtifact::new(CodeId::new(7), 340, EntryPoint::Osr { bci: 3 }, false);
        assert_eq!(artifact.code_id(), CodeId::new(7));
        assert_eq!(artifact.size(), 340);
        assert!(artifact.entry().is_osr());
        assert!(!artifact.is_default());
    }

    #[test]
    fn timestamps_are_ordered() {
        let earlier = Timestamp::now();
        let later = Timestamp::now();
        assert!(earlier <= later);
        assert!(!earlier.to_string().is_empty());
    }
}
