//! Virtual machine contract

use crate::error::Result;
use crate::resource::Resource;
use benchflow_core::{DiskSpec, OsFamily};
use std::collections::BTreeMap;

/// Contract every provider VM implementation satisfies on top of the base
/// resource lifecycle.
///
/// The orchestrator drives these in two phases: create + boot wait in one
/// parallel batch, then post-boot preparation (tags, scratch disks,
/// environment) in a second batch once every VM has booted, so slow boots
/// never serialize behind fast VMs' preparation work.
pub trait VirtualMachine: Resource {
    /// Zone the VM is (or will be) placed in. May change after creation
    /// when a capacity reservation picked the zone.
    fn zone(&self) -> String;

    fn os_family(&self) -> OsFamily;

    /// Number of local disks the machine type supports; used when a local
    /// disk spec leaves the count open.
    fn max_local_disks(&self) -> usize;

    /// IP address discovered after creation, if any.
    fn ip_address(&self) -> Option<String>;

    /// Threads a capacity reservation id into the creation call that will
    /// follow. Some clouds require the id before `issue_create`.
    fn set_capacity_reservation_id(&mut self, reservation_id: String);

    /// Names the placement group the creation call should reference.
    fn set_placement_group(&mut self, name: String);

    /// Opens the ports required for remote access to this VM.
    fn allow_remote_access(&mut self) -> Result<()>;

    /// Blocks until the guest OS has finished booting.
    fn wait_for_boot(&mut self) -> Result<()>;

    /// Applies the run's resource tags to the VM.
    fn apply_tags(&mut self, tags: &BTreeMap<String, String>) -> Result<()>;

    /// Creates and mounts the VM's scratch disks.
    fn create_scratch_disks(&mut self, specs: &[DiskSpec]) -> Result<()>;

    /// Deletes scratch disks attached to the VM. Invoked with the VM's own
    /// deletion during teardown.
    fn delete_scratch_disks(&mut self) -> Result<()>;

    /// Final post-boot environment preparation (packages, sysctls).
    fn prepare_environment(&mut self) -> Result<()>;
}
