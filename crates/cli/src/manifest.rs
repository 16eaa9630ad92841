//! The request manifest read by `jitbroker run`.
//!
//! ```json
//! {
//!   "host": { "bootstrapping": false },
//!   "code_cache_capacity": 65536,
//!   "requests": [
//!     {
//!       "id": 1,
//!       "unit": { "holder": "demo.Loop", "name": "run", "signature": "(I)I", "code_size": 40 },
//!       "osr_bci": 12,
//!       "attempts": [
//!         { "bailout": { "message": "node limit exceeded" } },
//!         { "success": { "bytecode_size": 120, "code_size": 340 } }
//!       ]
//!     }
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use compilation::{EntryPoint, HostConfig, RequestId};
use serde::Deserialize;

/// Code cache size used when the manifest does not set one.
pub const DEFAULT_CODE_CACHE_CAPACITY: u64 = 1 << 20;

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Manifest {
    #[serde(default)]
    pub host: HostConfig,
    #[serde(default = "default_capacity")]
    pub code_cache_capacity: u64,
    pub requests: Vec<RequestSpec>,
}

fn default_capacity() -> u64 {
    DEFAULT_CODE_CACHE_CAPACITY
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RequestSpec {
    pub id: RequestId,
    pub unit: UnitSpec,
    /// Bytecode index for an OSR compile; absent for a normal entry.
    #[serde(default)]
    pub osr_bci: Option<u32>,
    #[serde(default = "yes")]
    pub use_profiling_info: bool,
    #[serde(default = "yes")]
    pub install_as_default: bool,
    /// What the backend does on each successive attempt.
    pub attempts: Vec<ScriptedAttempt>,
}

impl RequestSpec {
    pub fn entry(&self) -> EntryPoint {
        match self.osr_bci {
            Some(bci) => EntryPoint::Osr { bci },
            None => EntryPoint::Invocation,
        }
    }
}

fn yes() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UnitSpec {
    pub holder: String,
    pub name: String,
    #[serde(default = "void_signature")]
    pub signature: String,
    pub code_size: u32,
    /// The unit already has fully optimized code.
    #[serde(default)]
    pub compiled: bool,
}

fn void_signature() -> String {
    "()V".to_string()
}

/// One scripted backend result.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case", deny_unknown_fields)]
pub enum ScriptedAttempt {
    Success {
        bytecode_size: u32,
        code_size: u32,
    },
    Bailout {
        message: String,
    },
    PermanentBailout {
        message: String,
        #[serde(default)]
        reason: Option<String>,
    },
    Error {
        #[serde(default = "default_error_kind")]
        kind: String,
        message: String,
    },
    Panic {
        message: String,
    },
}

fn default_error_kind() -> String {
    "InternalError".to_string()
}

impl Manifest {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("failed to read manifest {}", path.display()))?;
        let manifest: Manifest = serde_json::from_str(&text)
            .with_context(|| format!("failed to parse manifest {}", path.display()))?;
        manifest.validate()?;
        Ok(manifest)
    }

    /// Request ids key the scripted backend, so they must be unique.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for request in &self.requests {
            if !seen.insert(request.id) {
                bail!("duplicate request id {} in manifest", request.id);
            }
            if request.attempts.is_empty() {
                bail!("request {} has no scripted attempts", request.id);
            }
        }
        Ok(())
    }
}
