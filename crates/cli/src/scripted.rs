//! Backend compiler that replays the manifest's attempt scripts.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, PoisonError};

use compilation::{
    BackendCompiler, Bailout, CompilationIdentifier, CompilationResult, CompilationUnit,
    CompilerError, CompilerOptions, DiagnosticContext, EntryPoint, RequestId,
};

use crate::manifest::{Manifest, ScriptedAttempt};

/// Filler byte for generated machine code.
const NOP: u8 = 0x90;

/// Pops one scripted attempt per `compile` call, keyed by request id.
#[derive(Debug, Default)]
pub struct ScriptedCompiler {
    scripts: HashMap<RequestId, Mutex<VecDeque<ScriptedAttempt>>>,
}

impl ScriptedCompiler {
    pub fn from_manifest(manifest: &Manifest) -> Self {
        let scripts = manifest
            .requests
            .iter()
            .map(|request| (request.id, Mutex::new(request.attempts.iter().cloned().collect())))
            .collect();
        Self { scripts }
    }

    /// Attempts not yet consumed for `id`.
    pub fn remaining(&self, id: RequestId) -> usize {
        self.scripts.get(&id).map_or(0, |script| {
            script.lock().unwrap_or_else(PoisonError::into_inner).len()
        })
    }

    fn next(&self, id: RequestId) -> Option<ScriptedAttempt> {
        self.scripts
            .get(&id)?
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front()
    }
}

impl BackendCompiler for ScriptedCompiler {
    fn compile(
        &self,
        unit: &dyn CompilationUnit,
        entry: EntryPoint,
        use_profiling_info: bool,
        identifier: &CompilationIdentifier,
        options: &CompilerOptions,
        diagnostics: &DiagnosticContext,
    ) -> Result<CompilationResult, CompilerError> {
        let Some(step) = self.next(identifier.id()) else {
            return Err(CompilerError::internal(
                "ScriptExhausted",
                format!("no scripted attempt left for request {}", identifier.id()),
            ));
        };
        diagnostics.log(&format!(
            "scripted {step:?} for {} entry={entry} profiling={use_profiling_info} inline={}",
            unit.format_short(),
            options.inline_enabled()
        ));
        diagnostics.dump("script", format!("{step:?}"));

        match step {
            ScriptedAttempt::Success {
                bytecode_size,
                code_size,
            } => Ok(CompilationResult::new(
                vec![NOP; code_size as usize],
                bytecode_size,
            )),
            ScriptedAttempt::Bailout { message } => Err(Bailout::retryable(message).into()),
            ScriptedAttempt::PermanentBailout { message, reason } => {
                Err(Bailout::permanent(message, reason.unwrap_or_else(|| "scripted".to_string()))
                    .into())
            }
            ScriptedAttempt::Error { kind, message } => Err(CompilerError::internal(kind, message)),
            ScriptedAttempt::Panic { message } => panic!("{message}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use compilation::{CompilationRequest, DiagnosticSettings};

    use super::*;
    use crate::code_cache::{InMemoryCodeCache, ManifestUnit};

    fn manifest() -> Manifest {
        serde_json::from_str(
            r#"{ "requests": [ {
                "id": 3,
                "unit": { "holder": "demo.Loop", "name": "run", "code_size": 40 },
                "attempts": [
                    { "bailout": { "message": "node limit exceeded" } },
                    { "success": { "bytecode_size": 120, "code_size": 340 } }
                ]
            } ] }"#,
        )
        .unwrap()
    }

    fn compile(
        compiler: &ScriptedCompiler,
        manifest: &Manifest,
    ) -> Result<CompilationResult, CompilerError> {
        let cache = Arc::new(InMemoryCodeCache::new(1024));
        let spec = &manifest.requests[0];
        let unit = Arc::new(ManifestUnit::new(&spec.unit, cache));
        let request = CompilationRequest::new(unit.clone(), spec.id, spec.entry());
        let identifier = CompilationIdentifier::new(request);
        let diagnostics = DiagnosticContext::new("3", DiagnosticSettings::default(), None);
        compiler.compile(
            unit.as_ref(),
            spec.entry(),
            true,
            &identifier,
            &CompilerOptions::default(),
            &diagnostics,
        )
    }

    #[test]
    fn replays_script_in_order() {
        let manifest = manifest();
        let compiler = ScriptedCompiler::from_manifest(&manifest);
        assert_eq!(compiler.remaining(RequestId::new(3)), 2);

        let first = compile(&compiler, &manifest).unwrap_err();
        assert!(first.is_bailout());

        let second = compile(&compiler, &manifest).unwrap();
        assert_eq!(second.bytecode_size(), 120);
        assert_eq!(second.target_code_size(), 340);
        assert_eq!(compiler.remaining(RequestId::new(3)), 0);
    }

    #[test]
    fn exhausted_script_is_an_internal_error() {
        let manifest = manifest();
        let compiler = ScriptedCompiler::from_manifest(&manifest);
        let _ = compile(&compiler, &manifest);
        let _ = compile(&compiler, &manifest);
        let err = compile(&compiler, &manifest).unwrap_err();
        assert!(err.to_string().starts_with("ScriptExhausted"));
    }
}
