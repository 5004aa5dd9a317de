//! Decoded benchmark configuration model
//!
//! Everything here is the output of an external decoder/validator; the
//! orchestration core treats it as read-only input.

mod service;
mod vm;

pub use service::{
    DpbServiceSpec, RelationalDbSpec, ServiceSpec, UNMANAGED_DPB_YARN_CLUSTER,
    UNMANAGED_SPARK_CLUSTER,
};
pub use vm::{DiskKind, DiskSpec, PlacementGroupSpec, PlacementStrategy, VmGroupSpec};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Clouds a resource can be provisioned on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cloud {
    Gcp,
    Aws,
    Azure,
}

impl std::fmt::Display for Cloud {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Cloud::Gcp => write!(f, "gcp"),
            Cloud::Aws => write!(f, "aws"),
            Cloud::Azure => write!(f, "azure"),
        }
    }
}

/// OS family marker for a VM group.
///
/// Windows VMs are excluded from SSH-based post-boot steps, so the family
/// must be visible to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OsFamily {
    Linux,
    Windows,
}

/// Complete configuration for one benchmark run.
///
/// Named VM groups are kept in a `BTreeMap` so every iteration over them is
/// in deterministic key order; dependent resources rely on that ordering.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunConfig {
    /// Benchmark name (e.g. "iperf", "netperf").
    pub benchmark_name: String,

    /// Named VM group specifications.
    #[serde(default)]
    pub vm_groups: BTreeMap<String, VmGroupSpec>,

    /// Named placement group specifications referenced by VM groups.
    #[serde(default)]
    pub placement_groups: BTreeMap<String, PlacementGroupSpec>,

    pub container_cluster: Option<ServiceSpec>,
    pub container_registry: Option<ServiceSpec>,
    pub dpb_service: Option<DpbServiceSpec>,
    pub relational_db: Option<RelationalDbSpec>,
    pub non_relational_db: Option<ServiceSpec>,
    pub spanner: Option<ServiceSpec>,
    pub edw_service: Option<ServiceSpec>,
    pub nfs_service: Option<ServiceSpec>,
    pub smb_service: Option<ServiceSpec>,
    pub messaging_service: Option<ServiceSpec>,
    pub data_discovery_service: Option<ServiceSpec>,
    pub vpn_service: Option<ServiceSpec>,

    /// Named TPU group specifications.
    #[serde(default)]
    pub tpu_groups: BTreeMap<String, ServiceSpec>,

    /// Whether the run's networks should be peered (exactly 2 supported).
    #[serde(default)]
    pub vpc_peering: bool,

    /// Whether to reserve capacity for each VM group before creating VMs.
    #[serde(default)]
    pub use_capacity_reservations: bool,
}

impl RunConfig {
    /// The VM groups that will actually be booted for this run.
    ///
    /// A relational database spec carries its own VM groups (client and
    /// possibly server machines) which replace the top-level groups.
    pub fn vm_groups_to_boot(&self) -> &BTreeMap<String, VmGroupSpec> {
        match &self.relational_db {
            Some(db) if !db.vm_groups.is_empty() => &db.vm_groups,
            _ => &self.vm_groups,
        }
    }
}
