//! Run snapshots for freeze/restore
//!
//! A snapshot captures the durable identity of every resource a run owns:
//! provider-assigned ids, lifecycle states and idempotency tokens, plus
//! the held/free state of the run's locks. A later process rebuilds the
//! run from the same configuration and re-applies the snapshot, after
//! which provisioning skips everything that already exists and teardown
//! can delete resources created by the earlier process.
//!
//! Snapshots are versioned JSON. A snapshot written by a newer release is
//! rejected rather than half-understood.

use crate::error::{Result, RunError};
use crate::run::BenchmarkRun;
use benchflow_cloud::{Managed, Resource, ResourceKind, ResourceState};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Current snapshot schema version.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Lifecycle bookkeeping of one resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotEntry {
    pub kind: ResourceKind,
    /// Stable key of the resource within the run (e.g. `vm/3`,
    /// `network/gcp-us-east1-b`, `spanner`).
    pub key: String,
    pub id: Option<String>,
    pub state: ResourceState,
    pub token: String,
}

/// Held/free state of the run's serializable locks.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct LockStates {
    pub networks: bool,
    pub firewalls: bool,
    pub vpn_gateways: bool,
    pub vpns: bool,
}

/// Everything needed to resume a run in another process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub version: u32,
    pub saved_at: DateTime<Utc>,
    pub name: String,
    pub uid: String,
    pub uuid: String,
    pub sequence_number: u64,
    pub deleted: bool,
    pub locks: LockStates,
    pub resources: Vec<SnapshotEntry>,
}

fn entry<R: Resource>(key: impl Into<String>, managed: &Managed<R>) -> SnapshotEntry {
    SnapshotEntry {
        kind: managed.kind(),
        key: key.into(),
        id: managed.id(),
        state: managed.state(),
        token: managed.token().to_string(),
    }
}

fn apply_entry<R: Resource>(
    entries: &BTreeMap<&str, &SnapshotEntry>,
    key: &str,
    managed: &mut Managed<R>,
) {
    match entries.get(key) {
        Some(e) => managed.restore(e.id.clone(), e.state, e.token.clone()),
        None => tracing::debug!("snapshot has no entry for {key}, leaving it unprovisioned"),
    }
}

impl RunSnapshot {
    /// Captures the current lifecycle state of every resource in `run`.
    pub fn capture(run: &BenchmarkRun) -> Self {
        let mut resources = Vec::new();

        for (i, vm) in run.vms.iter().enumerate() {
            resources.push(entry(format!("vm/{i}"), &vm.resource));
        }
        for (key, network) in &run.networks {
            resources.push(entry(format!("network/{key}"), network));
        }
        for (key, firewall) in &run.firewalls {
            resources.push(entry(format!("firewall/{key}"), firewall));
        }
        for (name, placement_group) in &run.placement_groups {
            resources.push(entry(format!("placement_group/{name}"), placement_group));
        }
        for reservation in &run.capacity_reservations {
            resources.push(entry(
                format!("capacity_reservation/{}", reservation.group),
                &reservation.resource,
            ));
        }
        for (name, &i) in &run.tpu_groups {
            resources.push(entry(format!("tpu/{name}"), &run.tpus[i]));
        }
        for (key, gateway) in &run.vpn_gateways {
            resources.push(entry(format!("vpn_gateway/{key}"), gateway));
        }
        for (key, tunnel) in &run.vpns {
            resources.push(entry(format!("vpn/{key}"), tunnel));
        }

        if let Some(r) = &run.container_registry {
            resources.push(entry("container_registry", r));
        }
        if let Some(r) = &run.container_cluster {
            resources.push(entry("container_cluster", r));
        }
        if let Some(r) = &run.dpb_service {
            resources.push(entry("dpb_service", r));
        }
        if let Some(r) = &run.relational_db {
            resources.push(entry("relational_db", r));
        }
        if let Some(r) = &run.non_relational_db {
            resources.push(entry("non_relational_db", r));
        }
        if let Some(r) = &run.spanner {
            resources.push(entry("spanner", r));
        }
        if let Some(r) = &run.edw_service {
            resources.push(entry("edw_service", r));
        }
        if let Some(r) = &run.nfs_service {
            resources.push(entry("nfs_service", &r.resource));
        }
        if let Some(r) = &run.smb_service {
            resources.push(entry("smb_service", r));
        }
        if let Some(r) = &run.messaging_service {
            resources.push(entry("messaging_service", r));
        }
        if let Some(r) = &run.data_discovery_service {
            resources.push(entry("data_discovery_service", r));
        }
        if let Some(r) = &run.vpn_service {
            resources.push(entry("vpn_service", r));
        }

        Self {
            version: SNAPSHOT_VERSION,
            saved_at: Utc::now(),
            name: run.name.clone(),
            uid: run.uid.clone(),
            uuid: run.uuid.clone(),
            sequence_number: run.sequence_number,
            deleted: run.deleted,
            locks: LockStates {
                networks: run.networks_lock.is_held(),
                firewalls: run.firewalls_lock.is_held(),
                vpn_gateways: run.vpn_gateways_lock.is_held(),
                vpns: run.vpns_lock.is_held(),
            },
            resources,
        }
    }

    /// Re-applies the captured identities, states, tokens and held locks
    /// to a freshly constructed run.
    ///
    /// The database singletons are only rehydrated when their spec opts
    /// into freeze/restore; a non-restorable database is provisioned anew.
    pub(crate) fn apply(&self, run: &mut BenchmarkRun) {
        let entries: BTreeMap<&str, &SnapshotEntry> =
            self.resources.iter().map(|e| (e.key.as_str(), e)).collect();

        for (i, vm) in run.vms.iter_mut().enumerate() {
            apply_entry(&entries, &format!("vm/{i}"), &mut vm.resource);
        }
        for (key, network) in &mut run.networks {
            apply_entry(&entries, &format!("network/{key}"), network);
        }
        for (key, firewall) in &mut run.firewalls {
            apply_entry(&entries, &format!("firewall/{key}"), firewall);
        }
        for (name, placement_group) in &mut run.placement_groups {
            apply_entry(&entries, &format!("placement_group/{name}"), placement_group);
        }
        for reservation in &mut run.capacity_reservations {
            apply_entry(
                &entries,
                &format!("capacity_reservation/{}", reservation.group),
                &mut reservation.resource,
            );
        }
        for (name, &i) in &run.tpu_groups {
            apply_entry(&entries, &format!("tpu/{name}"), &mut run.tpus[i]);
        }
        for (key, gateway) in &mut run.vpn_gateways {
            apply_entry(&entries, &format!("vpn_gateway/{key}"), gateway);
        }
        for (key, tunnel) in &mut run.vpns {
            apply_entry(&entries, &format!("vpn/{key}"), tunnel);
        }

        if let Some(r) = &mut run.container_registry {
            apply_entry(&entries, "container_registry", r);
        }
        if let Some(r) = &mut run.container_cluster {
            apply_entry(&entries, "container_cluster", r);
        }
        if let Some(r) = &mut run.dpb_service {
            apply_entry(&entries, "dpb_service", r);
        }
        let restore_relational = run
            .config
            .relational_db
            .as_ref()
            .is_some_and(|s| s.enable_freeze_restore);
        if restore_relational {
            if let Some(r) = &mut run.relational_db {
                apply_entry(&entries, "relational_db", r);
            }
        }
        let restore_nosql = run
            .config
            .non_relational_db
            .as_ref()
            .is_some_and(|s| s.enable_freeze_restore);
        if restore_nosql {
            if let Some(r) = &mut run.non_relational_db {
                apply_entry(&entries, "non_relational_db", r);
            }
        }
        let restore_spanner = run
            .config
            .spanner
            .as_ref()
            .is_some_and(|s| s.enable_freeze_restore);
        if restore_spanner {
            if let Some(r) = &mut run.spanner {
                apply_entry(&entries, "spanner", r);
            }
        }
        if let Some(r) = &mut run.edw_service {
            apply_entry(&entries, "edw_service", r);
        }
        if let Some(r) = &mut run.nfs_service {
            apply_entry(&entries, "nfs_service", &mut r.resource);
        }
        if let Some(r) = &mut run.smb_service {
            apply_entry(&entries, "smb_service", r);
        }
        if let Some(r) = &mut run.messaging_service {
            apply_entry(&entries, "messaging_service", r);
        }
        if let Some(r) = &mut run.data_discovery_service {
            apply_entry(&entries, "data_discovery_service", r);
        }
        if let Some(r) = &mut run.vpn_service {
            apply_entry(&entries, "vpn_service", r);
        }

        if self.locks.networks {
            run.networks_lock.hold();
        }
        if self.locks.firewalls {
            run.firewalls_lock.hold();
        }
        if self.locks.vpn_gateways {
            run.vpn_gateways_lock.hold();
        }
        if self.locks.vpns {
            run.vpns_lock.hold();
        }
    }

    /// Rejects snapshots written by a newer release.
    pub fn check_version(&self) -> Result<()> {
        if self.version > SNAPSHOT_VERSION {
            return Err(RunError::SnapshotVersion {
                found: self.version,
                supported: SNAPSHOT_VERSION,
            });
        }
        Ok(())
    }

    /// Loads and version-checks a snapshot file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = fs::read_to_string(path)?;
        let snapshot: Self = serde_json::from_str(&data)?;
        snapshot.check_version()?;
        Ok(snapshot)
    }
}

impl BenchmarkRun {
    /// Freezes the run to its freeze path (or the run's temp directory
    /// when none is set) and returns where the snapshot landed.
    ///
    /// A freeze that cannot write its target falls back to the temp
    /// directory: losing the preferred location must not lose the ids of
    /// live resources.
    pub fn freeze(&self) -> Result<PathBuf> {
        let snapshot = RunSnapshot::capture(self);
        let data = serde_json::to_string_pretty(&snapshot)?;

        let target = match &self.freeze_path {
            Some(path) => path.clone(),
            None => self.default_freeze_path(),
        };
        match write_snapshot(&target, &data) {
            Ok(()) => {
                tracing::info!("froze run {} to {}", self.uuid, target.display());
                Ok(target)
            }
            Err(err) => {
                let fallback = self.default_freeze_path();
                if fallback == target {
                    return Err(err.into());
                }
                tracing::warn!(
                    "writing snapshot to {} failed ({err}), falling back to {}",
                    target.display(),
                    fallback.display()
                );
                write_snapshot(&fallback, &data)?;
                Ok(fallback)
            }
        }
    }

    fn default_freeze_path(&self) -> PathBuf {
        self.ctx.temp_dir().join(format!("{}.snapshot.json", self.uid))
    }
}

fn write_snapshot(path: &Path, data: &str) -> std::io::Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, data)
}
