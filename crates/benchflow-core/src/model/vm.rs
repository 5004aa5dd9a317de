//! VM group, disk and placement group specifications

use super::{Cloud, OsFamily};
use serde::{Deserialize, Serialize};

/// Specification for one named group of identical VMs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmGroupSpec {
    pub cloud: Cloud,
    pub os_family: OsFamily,

    /// Number of VMs in the group.
    pub vm_count: usize,

    /// Provider machine type (e.g. "n2-standard-8", "m5.2xlarge").
    pub machine_type: String,

    /// Zone the group's VMs are created in.
    pub zone: String,

    /// Scratch disk specification applied to every VM in the group.
    pub disk_spec: Option<DiskSpec>,

    /// Number of scratch disks per VM. `None` with a local disk spec means
    /// "as many as the machine type supports".
    pub disk_count: Option<usize>,

    /// Name of a placement group from the run config, if any.
    pub placement_group_name: Option<String>,

    /// CIDR range applied to every VM in the group.
    pub cidr: Option<String>,
}

/// Kinds of scratch disks a VM group can request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiskKind {
    /// Local SSD attached to the machine type.
    Local,
    /// Remote block storage.
    Remote,
    /// RAM disk carved out of VM memory.
    Ram,
    /// NFS share, managed or unmanaged.
    Nfs,
    /// SMB share.
    Smb,
}

/// Scratch disk specification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiskSpec {
    pub kind: DiskKind,

    pub size_gb: Option<u32>,

    /// Mount point for the disk. When one spec yields several disks the
    /// orchestrator appends an index to keep mount points distinct.
    pub mount_point: Option<String>,

    /// Disks striped together into one logical volume.
    #[serde(default = "default_stripes")]
    pub num_striped_disks: usize,

    /// For NFS disks: whether the share comes from a managed file service.
    #[serde(default)]
    pub nfs_managed: bool,

    /// For NFS disks: address of a pre-existing static share, if any.
    pub nfs_ip_address: Option<String>,
}

fn default_stripes() -> usize {
    1
}

/// Co-location strategy for a placement group.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementStrategy {
    /// Pack VMs close together for low latency.
    Cluster,
    /// Spread VMs across failure domains.
    Spread,
}

/// Specification for a named placement group.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlacementGroupSpec {
    pub cloud: Cloud,
    pub strategy: PlacementStrategy,
}
