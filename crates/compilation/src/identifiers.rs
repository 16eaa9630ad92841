//! Newtype identifiers.
//!
//! Every numeric identity in a compilation is a distinct newtype so that a
//! [`RequestId`] can never be passed where a [`CodeId`] or [`CompileLevel`] is
//! expected, even though all three are plain integers under the hood.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Macro for integer-wrapped newtypes.
// Generates: struct (Copy), new(), get(), Display.
// ---------------------------------------------------------------------------
macro_rules! int_id {
    (
        $(#[$attr:meta])*
        $name:ident($repr:ty)
    ) => {
        $(#[$attr])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name($repr);

        impl $name {
            /// Creates a new identifier from a raw integer.
            pub const fn new(value: $repr) -> Self {
                Self(value)
            }

            /// Returns the underlying integer value.
            pub const fn get(self) -> $repr {
                self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

int_id! {
    /// Scheduler-assigned id of one compilation request.
    ///
    /// Appears in console lines, completion events, and failure events.
    RequestId(u32)
}

int_id! {
    /// Optimization tier a unit is compiled at.
    ///
    /// The host reports which level counts as "fully optimized"; the
    /// already-compiled guard and completion events use that level.
    CompileLevel(u8)
}

int_id! {
    /// Host-assigned identity of an installed code blob.
    CodeId(u64)
}

// ---------------------------------------------------------------------------

/// Correlates every log record, dump, and event produced by one task.
///
/// Generated fresh for each [`crate::CompilationIdentifier`]; shared by all
/// attempts of that task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TraceId(Uuid);

impl TraceId {
    /// Generates a new random trace identifier.
    pub fn new_random() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates a [`TraceId`] from an existing UUID.
    pub fn from_uuid(id: Uuid) -> Self {
        Self(id)
    }

    /// Returns the underlying [`Uuid`].
    pub fn as_uuid(self) -> Uuid {
        self.0
    }
}

impl std::fmt::Display for TraceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Where execution enters the compiled code.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryPoint {
    /// Normal invocation entry.
    #[default]
    Invocation,
    /// On-stack replacement entry at a bytecode offset inside a running loop.
    Osr {
        /// Bytecode index execution resumes at.
        bci: u32,
    },
}

impl EntryPoint {
    /// Returns `true` for on-stack-replacement entries.
    pub fn is_osr(self) -> bool {
        matches!(self, EntryPoint::Osr { .. })
    }

    /// Returns the OSR bytecode index, if any.
    pub fn bci(self) -> Option<u32> {
        match self {
            EntryPoint::Invocation => None,
            EntryPoint::Osr { bci } => Some(bci),
        }
    }
}

impl std::fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryPoint::Invocation => write!(f, "invocation"),
            EntryPoint::Osr { bci } => write!(f, "osr@{bci}"),
        }
    }
}
