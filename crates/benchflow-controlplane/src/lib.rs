//! Benchflow Control Plane
//!
//! The orchestrator for one benchmark run: [`BenchmarkRun`] owns the full
//! resource graph described by a decoded configuration, provisions it in
//! dependency order, tears it down best-effort, and can freeze its
//! lifecycle state to a snapshot that a later process restores to resume
//! the run.

pub mod error;
pub mod lock;
pub mod provision;
pub mod run;
pub mod snapshot;
pub mod teardown;

// Re-exports
pub use error::{Result, RunError};
pub use lock::{RunLock, RunLockGuard};
pub use provision::{INSUFFICIENT_CAPACITY, QUOTA_EXCEEDED};
pub use run::{BenchmarkRun, MASTER_GROUP, ManagedResource, RunStatus, RunVm, WORKER_GROUP};
pub use snapshot::{LockStates, RunSnapshot, SNAPSHOT_VERSION, SnapshotEntry};
