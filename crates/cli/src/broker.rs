//! Wires the compilation core to the adapters and runs a manifest.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use compilation::{
    CompilationRequest, CompilationServices, CompilationTask, CompilerOptions, EventSink,
    GlobalStatistics, InstalledArtifact, RequestId, RequestOutcome, StatisticsSnapshot,
    FATAL_EXIT_CODE,
};
use serde::Serialize;
use telemetry::{FileDumpHandler, JsonLinesEventSink, StdoutConsole, TracingEventSink};
use tokio::sync::Semaphore;

use crate::code_cache::{CodeCacheStats, InMemoryCodeCache, ManifestUnit};
use crate::manifest::Manifest;
use crate::scripted::ScriptedCompiler;

/// Everything `jitbroker run` needs, already parsed from the command line.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub manifest: PathBuf,
    pub options: Option<PathBuf>,
    pub workers: usize,
    pub events: Option<PathBuf>,
    pub dump_dir: Option<PathBuf>,
    pub quiet: bool,
}

/// One line of the run summary.
#[derive(Debug, Serialize)]
pub struct RequestSummary {
    pub id: RequestId,
    pub unit: String,
    pub outcome: RequestOutcome,
    pub installed: Option<InstalledArtifact>,
}

#[derive(Debug, Serialize)]
pub struct RunReport {
    pub requests: Vec<RequestSummary>,
    pub statistics: StatisticsSnapshot,
    pub code_cache: CodeCacheStats,
}

impl RunReport {
    /// Exit code requested by a fatal outcome, if any task produced one.
    pub fn fatal_exit_code(&self) -> Option<i32> {
        self.requests.iter().find_map(|summary| match summary.outcome {
            RequestOutcome::Fatal { exit_code, .. } => Some(exit_code),
            _ => None,
        })
    }
}

fn load_options(path: Option<&PathBuf>) -> Result<CompilerOptions> {
    let Some(path) = path else {
        return Ok(CompilerOptions::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("failed to read options {}", path.display()))?;
    CompilerOptions::from_json(&text)
        .with_context(|| format!("invalid options in {}", path.display()))
}

/// Runs every request in the manifest, at most `workers` at a time.
pub async fn run(config: RunConfig) -> Result<RunReport> {
    let manifest = Manifest::load(&config.manifest)?;
    let options = load_options(config.options.as_ref())?;

    let cache = Arc::new(InMemoryCodeCache::new(manifest.code_cache_capacity));
    let statistics = Arc::new(GlobalStatistics::new());
    let console = Arc::new(StdoutConsole::stdout());
    console.set_suppressed(config.quiet);
    let events: Arc<dyn EventSink> = match &config.events {
        Some(path) => Arc::new(
            JsonLinesEventSink::create(path)
                .with_context(|| format!("failed to create event file {}", path.display()))?,
        ),
        None => Arc::new(TracingEventSink),
    };

    let compiler = Arc::new(ScriptedCompiler::from_manifest(&manifest));
    let mut services = CompilationServices::new(compiler.clone(), cache.clone())
        .with_events(events)
        .with_console(console)
        .with_statistics(statistics.clone());
    if let Some(dir) = &config.dump_dir {
        services = services.with_dump_handler(Arc::new(FileDumpHandler::new(dir)));
    }

    tracing::info!(
        manifest = %config.manifest.display(),
        requests = manifest.requests.len(),
        workers = config.workers,
        "starting compilation run"
    );

    let limiter = Arc::new(Semaphore::new(config.workers.max(1)));
    let mut handles = Vec::with_capacity(manifest.requests.len());
    for spec in &manifest.requests {
        let unit = Arc::new(ManifestUnit::new(&spec.unit, cache.clone()));
        let request = CompilationRequest::new(unit, spec.id, spec.entry())
            .with_profiling_info(spec.use_profiling_info)
            .with_install_as_default(spec.install_as_default);
        let mut task =
            CompilationTask::new(request, &options, manifest.host.clone(), services.clone())
                .with_context(|| format!("cannot create task for request {}", spec.id))?;

        let permit = limiter
            .clone()
            .acquire_owned()
            .await
            .context("worker pool closed")?;
        handles.push(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let outcome = task.run_compilation();
            RequestSummary {
                id: task.identifier().id(),
                unit: task.identifier().request().unit().format_full(),
                outcome,
                installed: task.installed_artifact().cloned(),
            }
        }));
    }

    let mut requests = Vec::with_capacity(handles.len());
    for handle in handles {
        requests.push(handle.await.context("compilation worker panicked")?);
    }

    for summary in &requests {
        let left = compiler.remaining(summary.id);
        if left > 0 {
            tracing::debug!(request = %summary.id, left, "scripted attempts not consumed");
        }
    }

    let report = RunReport {
        requests,
        statistics: statistics.snapshot(),
        code_cache: cache.stats(),
    };
    if let Some(code) = report.fatal_exit_code() {
        tracing::error!(exit_code = code, "a compilation requested termination");
    }
    Ok(report)
}

/// Prints one JSON line per request, then the statistics line.
pub fn print_report(report: &RunReport) -> Result<()> {
    for summary in &report.requests {
        println!("{}", serde_json::to_string(summary)?);
    }
    let totals = serde_json::json!({
        "statistics": report.statistics,
        "code_cache": report.code_cache,
    });
    println!("{totals}");
    Ok(())
}

/// Exit code for a finished run: the fatal code, or zero.
pub fn exit_code(report: &RunReport) -> i32 {
    report.fatal_exit_code().map_or(0, |_| FATAL_EXIT_CODE)
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    fn write(dir: &tempfile::TempDir, name: &str, contents: &str) -> PathBuf {
        let path = dir.path().join(name);
        let mut file = fs::File::create(&path).unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        path
    }

    fn config(manifest: PathBuf) -> RunConfig {
        RunConfig {
            manifest,
            options: None,
            workers: 2,
            events: None,
            dump_dir: None,
            quiet: true,
        }
    }

    const MANIFEST: &str = r#"{ "requests": [
        { "id": 1, "unit": { "holder": "demo.A", "name": "a", "code_size": 10 },
          "attempts": [ { "success": { "bytecode_size": 30, "code_size": 64 } } ] },
        { "id": 2, "unit": { "holder": "demo.B", "name": "b", "code_size": 10 },
          "attempts": [ { "permanent_bailout": { "message": "unbalanced monitor" } } ] },
        { "id": 3, "unit": { "holder": "demo.C", "name": "c", "code_size": 10 },
          "attempts": [ { "error": { "kind": "E", "message": "boom" } } ] }
    ] }"#;

    #[tokio::test]
    async fn reports_outcomes_in_manifest_order() {
        let dir = tempfile::tempdir().unwrap();
        let report = run(config(write(&dir, "m.json", MANIFEST))).await.unwrap();

        let kinds: Vec<_> = report.requests.iter().map(|r| r.outcome.kind()).collect();
        assert_eq!(kinds, ["success", "failure", "failure"]);
        assert_eq!(report.statistics.compiled_and_installed_bytecodes, 30);
        assert_eq!(report.statistics.installed_code_size, 64);
        assert_eq!(report.statistics.bailouts, 1);
        assert_eq!(report.code_cache.installs, 1);
        assert_eq!(exit_code(&report), 0);
    }

    #[tokio::test]
    async fn exit_on_exception_yields_fatal_exit_code() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(write(&dir, "m.json", MANIFEST));
        config.options = Some(write(&dir, "o.json", r#"{ "exit_on_exception": true }"#));
        let report = run(config).await.unwrap();
        assert_eq!(report.fatal_exit_code(), Some(FATAL_EXIT_CODE));
        assert_eq!(exit_code(&report), FATAL_EXIT_CODE);
    }

    #[tokio::test]
    async fn invalid_options_fail_before_any_task_runs() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(write(&dir, "m.json", MANIFEST));
        config.options = Some(write(&dir, "o.json", r#"{ "retry": { "budget": 99 } }"#));
        let err = run(config).await.unwrap_err();
        assert!(format!("{err:#}").contains("retry budget 99"));
    }
}
