//! Compilation requests and their stable identity.

use std::fmt;
use std::sync::Arc;

use crate::{CompilationUnit, EntryPoint, RequestId, TraceId};

/// One scheduler request to compile a unit.
///
/// Immutable after creation. Defaults: profiling information is used and the
/// produced code becomes the unit's default code.
#[derive(Debug, Clone)]
pub struct CompilationRequest {
    unit: Arc<dyn CompilationUnit>,
    id: RequestId,
    entry: EntryPoint,
    use_profiling_info: bool,
    install_as_default: bool,
}

impl CompilationRequest {
    /// Creates a request for `unit` entered at `entry`.
    pub fn new(unit: Arc<dyn CompilationUnit>, id: RequestId, entry: EntryPoint) -> Self {
        Self {
            unit,
            id,
            entry,
            use_profiling_info: true,
            install_as_default: true,
        }
    }

    /// Sets whether the backend may consult profiling information.
    pub fn with_profiling_info(mut self, use_profiling_info: bool) -> Self {
        self.use_profiling_info = use_profiling_info;
        self
    }

    /// Sets whether installed code becomes the unit's default code.
    pub fn with_install_as_default(mut self, install_as_default: bool) -> Self {
        self.install_as_default = install_as_default;
        self
    }

    pub fn unit(&self) -> &Arc<dyn CompilationUnit> {
        &self.unit
    }

    pub fn id(&self) -> RequestId {
        self.id
    }

    pub fn entry(&self) -> EntryPoint {
        self.entry
    }

    pub fn use_profiling_info(&self) -> bool {
        self.use_profiling_info
    }

    pub fn install_as_default(&self) -> bool {
        self.install_as_default
    }

    pub fn is_osr(&self) -> bool {
        self.entry.is_osr()
    }
}

impl fmt::Display for CompilationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Compilation[id={}, {}", self.id, self.unit.format_full())?;
        if let Some(bci) = self.entry.bci() {
            write!(f, "@{bci}")?;
        }
        write!(f, "]")
    }
}

// ---------------------------------------------------------------------------

/// Identity shared by every attempt of one task.
#[derive(Debug, Clone)]
pub struct CompilationIdentifier {
    request: Arc<CompilationRequest>,
    trace_id: TraceId,
}

impl CompilationIdentifier {
    /// Wraps `request` with a fresh trace id.
    pub fn new(request: CompilationRequest) -> Self {
        Self {
            request: Arc::new(request),
            trace_id: TraceId::new_random(),
        }
    }

    pub fn request(&self) -> &Arc<CompilationRequest> {
        &self.request
    }

    pub fn trace_id(&self) -> TraceId {
        self.trace_id
    }

    pub fn id(&self) -> RequestId {
        self.request.id()
    }

    /// The request id, with a trailing `%` for OSR compilations.
    pub fn id_string(&self) -> String {
        if self.request.is_osr() {
            format!("{}%", self.request.id())
        } else {
            self.request.id().to_string()
        }
    }
}

impl fmt::Display for CompilationIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}]",
            self.id_string(),
            self.request.unit().format_short()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::unit::test_support::FakeUnit;

    fn request(entry: EntryPoint) -> CompilationRequest {
        CompilationRequest::new(FakeUnit::new("demo.Loop", "run", 64), RequestId::new(12), entry)
    }

    #[test]
    fn defaults_use_profiling_and_install_as_default() {
        let request = request(EntryPoint::Invocation);
        assert!(request.use_profiling_info());
        assert!(request.install_as_default());

        let request = request
            .with_profiling_info(false)
            .with_install_as_default(false);
        assert!(!request.use_profiling_info());
        assert!(!request.install_as_default());
    }

    #[test]
    fn display_includes_osr_offset() {
        assert_eq!(
            request(EntryPoint::Invocation).to_string(),
            "Compilation[id=12, demo.Loop.run()V]"
        );
        assert_eq!(
            request(EntryPoint::Osr { bci: 7 }).to_string(),
            "Compilation[id=12, demo.Loop.run()V@7]"
        );
    }

    #[test]
    fn id_string_marks_osr_with_percent() {
        let normal = CompilationIdentifier::new(request(EntryPoint::Invocation));
        let osr = CompilationIdentifier::new(request(EntryPoint::Osr { bci: 7 }));
        assert_eq!(normal.id_string(), "12");
        assert_eq!(osr.id_string(), "12%");
        assert_eq!(osr.to_string(), "12%[demo.Loop.run]");
    }

    #[test]
    fn clones_share_trace_id() {
        let id = CompilationIdentifier::new(request(EntryPoint::Invocation));
        assert_eq!(id.clone().trace_id(), id.trace_id());
    }
}
