//! Artifact installer adapter.
//!
//! Hands a finished [`CompilationResult`] to the host's [`ArtifactInstaller`]
//! under the `CodeInstall` scope, timed as [`Timer::CodeInstallation`].

use std::panic::{self, AssertUnwindSafe};

use serde::{Deserialize, Serialize};

use crate::{
    ArtifactInstaller, CompilationIdentifier, CompilationResult, CompilerError, DiagnosticContext,
    InstalledArtifact, StatisticsSink, Timer, TraceId,
};

/// Identity the installer may use to label the code it installs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstallContext {
    /// `"<id>"` or `"<id>%"` for OSR.
    pub id_string: String,
    /// `Holder.name(descriptor)` of the unit.
    pub unit: String,
    pub trace_id: TraceId,
}

impl InstallContext {
    pub fn for_identifier(identifier: &CompilationIdentifier) -> Self {
        Self {
            id_string: identifier.id_string(),
            unit: identifier.request().unit().format_full(),
            trace_id: identifier.trace_id(),
        }
    }
}

pub struct InstallerAdapter<'a> {
    installer: &'a dyn ArtifactInstaller,
    statistics: &'a dyn StatisticsSink,
}

impl<'a> InstallerAdapter<'a> {
    pub fn new(installer: &'a dyn ArtifactInstaller, statistics: &'a dyn StatisticsSink) -> Self {
        Self {
            installer,
            statistics,
        }
    }

    /// Installs `result` for the request behind `identifier`.
    ///
    /// Errors, including a panicking installer, pass through
    /// [`DiagnosticContext::handle`] and surface as internal errors.
    pub fn install(
        &self,
        diagnostics: &DiagnosticContext,
        identifier: &CompilationIdentifier,
        result: &CompilationResult,
    ) -> Result<InstalledArtifact, CompilerError> {
        let _timer = Timer::CodeInstallation.start(self.statistics);
        let _scope = diagnostics.scope("CodeInstall");

        let request = identifier.request();
        let unit = request.unit();
        let speculation_log = unit.speculation_log();
        let context = InstallContext::for_identifier(identifier);
        let installer = self.installer;

        let installed = panic::catch_unwind(AssertUnwindSafe(|| {
            installer.create_installed(
                diagnostics,
                unit.as_ref(),
                request,
                result,
                speculation_log.as_deref(),
                request.install_as_default(),
                &context,
            )
        }))
        .unwrap_or_else(|payload| Err(CompilerError::from_panic(payload)));

        match installed {
            Ok(artifact) => {
                tracing::debug!(
                    id = %context.id_string,
                    code_id = %artifact.code_id(),
                    size = artifact.size(),
                    default = artifact.is_default(),
                    "code installed"
                );
                Ok(artifact)
            }
            Err(error) => Err(diagnostics.handle(error)),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    use super::*;
    use crate::stats::test_support::RecordingStatistics;
    use crate::unit::test_support::FakeUnit;
    use crate::{
        CodeId, CompilationRequest, CompilationUnit, DiagnosticSettings, EntryPoint, RequestId,
        SpeculationLog,
    };

    #[derive(Default)]
    struct FakeInstaller {
        calls: AtomicU32,
        fail: bool,
        contexts: Mutex<Vec<(InstallContext, bool)>>,
    }

    impl ArtifactInstaller for FakeInstaller {
        fn create_installed(
            &self,
            diagnostics: &DiagnosticContext,
            _unit: &dyn CompilationUnit,
            request: &CompilationRequest,
            result: &CompilationResult,
            _speculation_log: Option<&dyn SpeculationLog>,
            install_as_default: bool,
            context: &InstallContext,
        ) -> Result<InstalledArtifact, CompilerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            assert_eq!(diagnostics.scope_path(), "CodeInstall");
            self.contexts
                .lock()
                .unwrap()
                .push((context.clone(), install_as_default));
            if self.fail {
                return Err(CompilerError::internal("InstallError", "code cache full"));
            }
            Ok(InstalledArtifact::new(
                CodeId::new(1),
                result.target_code_size(),
                request.entry(),
                install_as_default,
            ))
        }
    }

    fn identifier(entry: EntryPoint) -> CompilationIdentifier {
        CompilationIdentifier::new(
            CompilationRequest::new(FakeUnit::new("demo.Loop", "run", 40), RequestId::new(4), entry)
                .with_install_as_default(false),
        )
    }

    #[test]
    fn installs_under_timer_and_scope() {
        let installer = FakeInstaller::default();
        let stats = RecordingStatistics::default();
        let identifier = identifier(EntryPoint::Osr { bci: 3 });
        let diagnostics = DiagnosticContext::new("4%", DiagnosticSettings::default(), None);

        let artifact = InstallerAdapter::new(&installer, &stats)
            .install(&diagnostics, &identifier, &CompilationResult::new(vec![0; 64], 40))
            .unwrap();

        assert_eq!(artifact.size(), 64);
        assert!(!artifact.is_default());
        assert_eq!(stats.timed(Timer::CodeInstallation), 1);
        assert_eq!(diagnostics.scope_path(), "");

        let contexts = installer.contexts.lock().unwrap();
        assert_eq!(contexts[0].0.id_string, "4%");
        assert_eq!(contexts[0].0.unit, "demo.Loop.run()V");
        assert!(!contexts[0].1);
    }

    #[test]
    fn installer_errors_are_tagged_and_timed() {
        let installer = FakeInstaller {
            fail: true,
            ..FakeInstaller::default()
        };
        let stats = RecordingStatistics::default();
        let identifier = identifier(EntryPoint::Invocation);
        let diagnostics = DiagnosticContext::new("4", DiagnosticSettings::default(), None);

        let err = InstallerAdapter::new(&installer, &stats)
            .install(&diagnostics, &identifier, &CompilationResult::new(vec![0; 8], 8))
            .unwrap_err();

        assert!(!err.is_bailout());
        assert_eq!(err.context(), ["CodeInstall".to_string()]);
        assert_eq!(stats.timed(Timer::CodeInstallation), 1);
    }

    #[test]
    fn panicking_installer_becomes_internal_error() {
        struct Exploding;
        impl ArtifactInstaller for Exploding {
            fn create_installed(
                &self,
                _: &DiagnosticContext,
                _: &dyn CompilationUnit,
                _: &CompilationRequest,
                _: &CompilationResult,
                _: Option<&dyn SpeculationLog>,
                _: bool,
                _: &InstallContext,
            ) -> Result<InstalledArtifact, CompilerError> {
                panic!("relocation overflow")
            }
        }

        let stats = RecordingStatistics::default();
        let diagnostics = DiagnosticContext::new("4", DiagnosticSettings::default(), None);
        let err = InstallerAdapter::new(&Exploding, &stats)
            .install(
                &diagnostics,
                &identifier(EntryPoint::Invocation),
                &CompilationResult::new(vec![0; 8], 8),
            )
            .unwrap_err();
        assert!(matches!(err, CompilerError::Panicked { .. }));
        assert_eq!(diagnostics.scope_path(), "");
    }
}
