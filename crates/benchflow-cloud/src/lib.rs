//! Benchflow Cloud
//!
//! The resource lifecycle core of the Benchflow control plane: the
//! contract every provisionable cloud entity implements, the state machine
//! and idempotency-token bookkeeping wrapped around it, the retry/poll
//! policy that absorbs flaky and eventually-consistent control planes, the
//! bounded-fan-out executor for parallel batches, and the registry that
//! maps `(cloud, kind)` pairs to provider factories.
//!
//! No cloud API is implemented here; providers supply implementations of
//! the contracts and plug them into [`ProviderRegistry`].

pub mod error;
pub mod executor;
pub mod kinds;
pub mod registry;
pub mod resource;
pub mod retry;
pub mod vm;

// Re-exports
pub use error::{CloudError, ParallelFailures, Result, TaskFailure};
pub use executor::{DEFAULT_MAX_WORKERS, ParallelOptions, run_parallel};
pub use kinds::{ContainerCluster, Firewall, Network};
pub use registry::{
    ClusterFactory, FirewallFactory, NetworkFactory, ProviderRegistry, ResourceFactory,
    ResourceSeed, VmFactory,
};
pub use resource::{
    MAX_TOKEN_REGENERATIONS, Managed, Resource, ResourceKind, ResourceState, ResourceStatus,
    VmAttachment,
};
pub use retry::RetryPolicy;
pub use vm::VirtualMachine;
