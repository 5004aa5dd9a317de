//! Benchflow Core
//!
//! Shared foundation for the Benchflow control plane: the per-run context
//! (identity, flag overrides, idempotency registries), the fully decoded
//! benchmark configuration model, and the resource tagging contract.
//!
//! This crate never talks to a cloud. Configuration arrives already parsed
//! and validated; the orchestration crates only read it.

pub mod context;
pub mod error;
pub mod model;
pub mod tags;

// Re-exports
pub use context::{RunContext, RunFlags};
pub use error::{ConfigError, Result};
pub use model::{
    Cloud, DiskKind, DiskSpec, DpbServiceSpec, OsFamily, PlacementGroupSpec, PlacementStrategy,
    RelationalDbSpec, RunConfig, ServiceSpec, UNMANAGED_DPB_YARN_CLUSTER, UNMANAGED_SPARK_CLUSTER,
    VmGroupSpec,
};
pub use tags::{resource_tags, sanitize_label};
