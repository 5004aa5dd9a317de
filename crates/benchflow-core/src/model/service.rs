//! Singleton service specifications

use super::{Cloud, VmGroupSpec};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Service types for data-processing clusters that Benchflow provisions
/// itself rather than handing off to a managed offering. Their VM groups
/// are adopted into the run's boot set.
pub const UNMANAGED_DPB_YARN_CLUSTER: &str = "unmanaged_dpb_yarn_cluster";
pub const UNMANAGED_SPARK_CLUSTER: &str = "unmanaged_spark_cluster";

/// Generic specification for a singleton managed service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceSpec {
    pub cloud: Cloud,

    /// Provider-specific service type string (e.g. "dataproc", "emr").
    pub service_type: String,

    /// Whether this service participates in freeze/restore. Restorable
    /// services are rehydrated from a snapshot instead of re-created when
    /// a multi-phase run resumes.
    #[serde(default)]
    pub enable_freeze_restore: bool,
}

/// Specification for a data-processing (Spark/YARN) cluster service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DpbServiceSpec {
    pub cloud: Cloud,
    pub service_type: String,

    /// Number of worker VMs. Zero means a single-node cluster.
    pub worker_count: usize,

    /// Template for the cluster's VMs. Unmanaged service types boot these
    /// as regular run VMs under `master_group` / `worker_group`.
    pub worker_group: VmGroupSpec,
}

impl DpbServiceSpec {
    /// Whether the cluster's machines are provisioned by Benchflow itself.
    pub fn is_unmanaged(&self) -> bool {
        self.service_type == UNMANAGED_DPB_YARN_CLUSTER
            || self.service_type == UNMANAGED_SPARK_CLUSTER
    }
}

/// Specification for a relational database service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationalDbSpec {
    pub cloud: Cloud,

    /// Database engine (e.g. "mysql", "postgres").
    pub engine: String,

    /// Managed offering vs. a database installed on run VMs.
    #[serde(default)]
    pub is_managed_db: bool,

    #[serde(default)]
    pub enable_freeze_restore: bool,

    /// VM groups the database benchmark boots (client machines, and server
    /// machines for the unmanaged case). Replaces the top-level groups.
    #[serde(default)]
    pub vm_groups: BTreeMap<String, VmGroupSpec>,
}
