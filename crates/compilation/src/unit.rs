//! The compilation unit as seen by the orchestration core.
//!
//! The front-end owns the real method/function representation; this crate only
//! needs its names for console lines and events, its bytecode size for the
//! code-size delta, the already-compiled check, and its speculation log for
//! installation.

use std::fmt;
use std::sync::Arc;

use crate::{CompileLevel, EntryPoint};

/// Per-unit record of optimistic assumptions made by earlier compiles.
///
/// The core never inspects it beyond passing it to the installer.
pub trait SpeculationLog: fmt::Debug + Send + Sync {
    /// Returns `true` if any speculation has been recorded for the unit.
    fn has_speculations(&self) -> bool;
}

/// A method or function that can be compiled.
pub trait CompilationUnit: fmt::Debug + Send + Sync {
    /// Fully qualified name of the type or module declaring this unit
    /// (e.g. `java.util.HashMap`).
    fn qualified_name(&self) -> &str;

    /// Unqualified name of the unit itself (e.g. `put`).
    fn simple_name(&self) -> &str;

    /// Signature descriptor (e.g. `(Ljava/lang/Object;)I`).
    fn signature_descriptor(&self) -> &str;

    /// Size of the unit's own bytecode, in bytes.
    fn code_size(&self) -> u32;

    /// Returns `true` if code for `entry` is already installed at `level`.
    fn has_code_at_level(&self, entry: EntryPoint, level: CompileLevel) -> bool;

    /// Returns the unit's speculation log, if the host keeps one.
    fn speculation_log(&self) -> Option<Arc<dyn SpeculationLog>> {
        None
    }

    /// `Holder.name`, the form print filters match against.
    fn format_short(&self) -> String {
        format!("{}.{}", self.qualified_name(), self.simple_name())
    }

    /// `Holder.name(descriptor)`, the form used in events and bailout lines.
    fn format_full(&self) -> String {
        format!(
            "{}.{}{}",
            self.qualified_name(),
            self.simple_name(),
            self.signature_descriptor()
        )
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::atomic::{AtomicBool, Ordering};

    use super::*;

    /// Minimal unit used across the crate's unit tests.
    #[derive(Debug)]
    pub struct FakeUnit {
        pub holder: String,
        pub name: String,
        pub signature: String,
        pub code_size: u32,
        pub compiled: AtomicBool,
    }

    impl FakeUnit {
        pub fn new(holder: &str, name: &str, code_size: u32) -> Arc<Self> {
            Arc::new(Self {
                holder: holder.to_string(),
                name: name.to_string(),
                signature: "()V".to_string(),
                code_size,
                compiled: AtomicBool::new(false),
            })
        }

        pub fn mark_compiled(&self) {
            self.compiled.store(true, Ordering::SeqCst);
        }
    }

    impl CompilationUnit for FakeUnit {
        fn qualified_name(&self) -> &str {
            &self.holder
        }

        fn simple_name(&self) -> &str {
            &self.name
        }

        fn signature_descriptor(&self) -> &str {
            &self.signature
        }

        fn code_size(&self) -> u32 {
            self.code_size
        }

        fn has_code_at_level(&self, _entry: EntryPoint, _level: CompileLevel) -> bool {
            self.compiled.load(Ordering::SeqCst)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::FakeUnit;
    use super::*;

    #[test]
    fn formats_holder_name_and_descriptor() {
        let unit = FakeUnit::new("java.util.HashMap", "put", 30);
        assert_eq!(unit.format_short(), "java.util.HashMap.put");
        assert_eq!(unit.format_full(), "java.util.HashMap.put()V");
    }

    #[test]
    fn speculation_log_defaults_to_none() {
        let unit = FakeUnit::new("A", "b", 1);
        assert!(unit.speculation_log().is_none());
    }
}
