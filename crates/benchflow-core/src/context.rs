//! Per-run context
//!
//! One `RunContext` is constructed per process invocation and injected into
//! every component that needs run-scoped state. Registries that the original
//! harness kept as process-global sets (imported SSH key material per
//! region) live here instead, so each run and each test gets an isolated
//! instance.

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Run-scoped flag overrides.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunFlags {
    /// Minutes until provisioned resources are considered expired. Written
    /// into every resource's tags so leaked resources can be reaped.
    pub timeout_minutes: u32,

    /// Upper bound on parallel workers for any one batch.
    pub max_concurrent_workers: usize,

    /// Fixed delay between successive task starts during the VM create and
    /// boot phase, to throttle control-plane bursts.
    pub create_and_boot_post_task_delay: Option<Duration>,
}

impl Default for RunFlags {
    fn default() -> Self {
        Self {
            timeout_minutes: 240,
            max_concurrent_workers: 200,
            create_and_boot_post_task_delay: None,
        }
    }
}

/// Identity and shared bookkeeping for a single benchmark run.
#[derive(Debug)]
pub struct RunContext {
    run_uri: String,
    owner: String,
    temp_dir: PathBuf,
    metadata: BTreeMap<String, String>,
    flags: RunFlags,
    sequence: AtomicU64,
    keyfiles: Mutex<KeyfileRegistry>,
}

#[derive(Debug, Default)]
struct KeyfileRegistry {
    imported: BTreeSet<(String, String)>,
    deleted: BTreeSet<(String, String)>,
}

impl RunContext {
    pub fn new(run_uri: impl Into<String>, owner: impl Into<String>, temp_dir: impl Into<PathBuf>) -> Self {
        Self {
            run_uri: run_uri.into(),
            owner: owner.into(),
            temp_dir: temp_dir.into(),
            metadata: BTreeMap::new(),
            flags: RunFlags::default(),
            sequence: AtomicU64::new(0),
            keyfiles: Mutex::new(KeyfileRegistry::default()),
        }
    }

    pub fn with_metadata(mut self, metadata: BTreeMap<String, String>) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn with_flags(mut self, flags: RunFlags) -> Self {
        self.flags = flags;
        self
    }

    /// Identifier shared by every resource of this run.
    pub fn run_uri(&self) -> &str {
        &self.run_uri
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    /// Scratch directory for this run (snapshots, generated artifacts).
    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// User-supplied metadata pairs, tagged onto every resource after
    /// sanitization.
    pub fn metadata(&self) -> &BTreeMap<String, String> {
        &self.metadata
    }

    pub fn flags(&self) -> &RunFlags {
        &self.flags
    }

    /// Next monotonic sequence number, starting at 1. Each orchestrator
    /// constructed against this context takes one.
    pub fn next_sequence_number(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Runs `import` at most once per `(region, run_uri)` key.
    ///
    /// Concurrent VM workers in the same region race to import the run's
    /// SSH key material; the registry lock is held across the import so the
    /// losers observe the winner's entry. Returns whether `import` ran.
    pub fn import_keyfile_once<E>(
        &self,
        region: &str,
        import: impl FnOnce() -> Result<(), E>,
    ) -> Result<bool, E> {
        let mut registry = self.keyfiles.lock().unwrap_or_else(|p| p.into_inner());
        let key = (region.to_string(), self.run_uri.clone());
        if registry.imported.contains(&key) {
            return Ok(false);
        }
        import()?;
        registry.deleted.remove(&key);
        registry.imported.insert(key);
        Ok(true)
    }

    /// Runs `delete` at most once per `(region, run_uri)` key.
    pub fn delete_keyfile_once<E>(
        &self,
        region: &str,
        delete: impl FnOnce() -> Result<(), E>,
    ) -> Result<bool, E> {
        let mut registry = self.keyfiles.lock().unwrap_or_else(|p| p.into_inner());
        let key = (region.to_string(), self.run_uri.clone());
        if registry.deleted.contains(&key) {
            return Ok(false);
        }
        delete()?;
        registry.imported.remove(&key);
        registry.deleted.insert(key);
        Ok(true)
    }
}
