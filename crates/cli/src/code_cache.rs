//! In-memory code cache standing in for the host's executable memory.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use compilation::{
    ArtifactInstaller, CodeId, CompilationRequest, CompilationResult, CompilationUnit,
    CompileLevel, CompilerError, DiagnosticContext, EntryPoint, InstallContext, InstalledArtifact,
    SpeculationLog,
};
use serde::Serialize;

use crate::manifest::UnitSpec;

#[derive(Debug, Default)]
struct Entries {
    code: HashMap<CodeId, Arc<[u8]>>,
    /// Default code per `(unit, entry)`.
    defaults: HashMap<(String, EntryPoint), CodeId>,
    used: u64,
}

/// Bounded code cache. Installation fails once `capacity` bytes are in use.
#[derive(Debug)]
pub struct InMemoryCodeCache {
    capacity: u64,
    entries: RwLock<Entries>,
    next_id: AtomicU64,
    installs: AtomicU64,
    rejections: AtomicU64,
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CodeCacheStats {
    pub entries: usize,
    pub used_bytes: u64,
    pub capacity_bytes: u64,
    pub installs: u64,
    pub rejections: u64,
}

impl InMemoryCodeCache {
    pub fn new(capacity: u64) -> Self {
        Self {
            capacity,
            entries: RwLock::new(Entries::default()),
            next_id: AtomicU64::new(1),
            installs: AtomicU64::new(0),
            rejections: AtomicU64::new(0),
        }
    }

    /// Whether `unit` has default code for `entry`.
    pub fn has_default(&self, unit: &str, entry: EntryPoint) -> bool {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        entries.defaults.contains_key(&(unit.to_string(), entry))
    }

    pub fn stats(&self) -> CodeCacheStats {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        CodeCacheStats {
            entries: entries.code.len(),
            used_bytes: entries.used,
            capacity_bytes: self.capacity,
            installs: self.installs.load(Ordering::Relaxed),
            rejections: self.rejections.load(Ordering::Relaxed),
        }
    }
}

impl ArtifactInstaller for InMemoryCodeCache {
    fn create_installed(
        &self,
        diagnostics: &DiagnosticContext,
        unit: &dyn CompilationUnit,
        request: &CompilationRequest,
        result: &CompilationResult,
        speculation_log: Option<&dyn SpeculationLog>,
        install_as_default: bool,
        context: &InstallContext,
    ) -> Result<InstalledArtifact, CompilerError> {
        let size = u64::from(result.target_code_size());
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        if entries.used + size > self.capacity {
            self.rejections.fetch_add(1, Ordering::Relaxed);
            return Err(CompilerError::internal(
                "CodeCacheFull",
                format!(
                    "cannot install {size} bytes for {}: {} of {} bytes in use",
                    context.id_string, entries.used, self.capacity
                ),
            ));
        }

        let code_id = CodeId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let unit_name = unit.format_full();
        let entry = request.entry();
        entries.used += size;
        entries.code.insert(code_id, Arc::from(result.target_code()));
        if install_as_default {
            entries.defaults.insert((unit_name, entry), code_id);
        }
        self.installs.fetch_add(1, Ordering::Relaxed);

        diagnostics.log(&format!(
            "installed {code_id} ({size} bytes, speculations={})",
            speculation_log.is_some_and(|log| log.has_speculations())
        ));
        Ok(InstalledArtifact::new(
            code_id,
            result.target_code_size(),
            entry,
            install_as_default,
        ))
    }
}

// ---------------------------------------------------------------------------

/// A unit described by the manifest. It counts as compiled when the manifest
/// says so or when the cache holds default code for it.
#[derive(Debug)]
pub struct ManifestUnit {
    holder: String,
    name: String,
    signature: String,
    code_size: u32,
    precompiled: bool,
    cache: Arc<InMemoryCodeCache>,
}

impl ManifestUnit {
    pub fn new(spec: &UnitSpec, cache: Arc<InMemoryCodeCache>) -> Self {
        Self {
            holder: spec.holder.clone(),
            name: spec.name.clone(),
            signature: spec.signature.clone(),
            code_size: spec.code_size,
            precompiled: spec.compiled,
            cache,
        }
    }
}

impl CompilationUnit for ManifestUnit {
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

    // Every installed compile is fully optimized, so the level is not tracked.
    fn has_code_at_level(&self, entry: EntryPoint, _level: CompileLevel) -> bool {
        self.precompiled || self.cache.has_default(&self.format_full(), entry)
    }
}
