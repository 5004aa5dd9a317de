//! The benchmark run aggregate
//!
//! A [`BenchmarkRun`] owns every cloud resource of one benchmark run.
//! Construction resolves all provider factories up front and builds the
//! full resource graph unprovisioned, so a missing provider or an invalid
//! group layout fails before anything is created. Provisioning and
//! teardown live in the sibling modules; this one is the data model and
//! the constructor.

use crate::error::{Result, RunError};
use crate::lock::RunLock;
use crate::snapshot::RunSnapshot;
use benchflow_cloud::{
    ContainerCluster, Firewall, Managed, Network, ProviderRegistry, Resource, ResourceKind,
    ResourceSeed, VirtualMachine,
};
use benchflow_core::{
    Cloud, ConfigError, DiskKind, DiskSpec, RunConfig, RunContext, ServiceSpec, VmGroupSpec,
    resource_tags,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use uuid::Uuid;

/// Group names reserved for VM groups adopted from an unmanaged cluster
/// service.
pub const MASTER_GROUP: &str = "master_group";
pub const WORKER_GROUP: &str = "worker_group";

/// A generic managed resource owned by the run.
pub type ManagedResource = Managed<Box<dyn Resource>>;

/// Overall status of a run, reported even when provisioning failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Skipped,
    Succeeded,
    Failed,
}

impl std::fmt::Display for RunStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RunStatus::Skipped => write!(f, "SKIPPED"),
            RunStatus::Succeeded => write!(f, "SUCCEEDED"),
            RunStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// One VM owned by the run, with the group it belongs to and the scratch
/// disk specs expanded for its machine type.
pub struct RunVm {
    pub(crate) resource: Managed<Box<dyn VirtualMachine>>,
    pub(crate) group: String,
    pub(crate) disk_specs: Vec<DiskSpec>,
}

impl RunVm {
    pub fn group(&self) -> &str {
        &self.group
    }

    pub fn disk_specs(&self) -> &[DiskSpec] {
        &self.disk_specs
    }

    pub fn vm(&self) -> &dyn VirtualMachine {
        self.resource.inner().as_ref()
    }

    pub fn vm_mut(&mut self) -> &mut dyn VirtualMachine {
        self.resource.inner_mut().as_mut()
    }

    pub fn resource(&self) -> &Managed<Box<dyn VirtualMachine>> {
        &self.resource
    }
}

/// A capacity reservation made for one VM group.
pub(crate) struct GroupReservation {
    pub(crate) group: String,
    pub(crate) resource: ManagedResource,
}

/// An NFS file service plus whether Benchflow manages its lifecycle.
/// Unmanaged servers run on the run's own VMs and can only be set up once
/// those have booted.
pub(crate) struct NfsHandle {
    pub(crate) resource: ManagedResource,
    pub(crate) managed: bool,
}

/// Every resource of one benchmark run, plus the bookkeeping to provision,
/// tear down, freeze and restore it.
pub struct BenchmarkRun {
    pub(crate) config: RunConfig,
    pub(crate) ctx: Arc<RunContext>,

    pub(crate) name: String,
    pub(crate) uid: String,
    pub(crate) uuid: String,
    pub(crate) sequence_number: u64,
    pub(crate) status: RunStatus,
    pub(crate) failed_substatus: Option<String>,
    pub(crate) deleted: bool,

    /// All VMs, in deterministic (group, index) order.
    pub(crate) vms: Vec<RunVm>,
    /// Group name to indices into `vms`.
    pub(crate) vm_groups: BTreeMap<String, Vec<usize>>,
    /// The boot set actually used, after cluster-service group adoption.
    pub(crate) boot_groups: BTreeMap<String, VmGroupSpec>,

    pub(crate) networks: BTreeMap<String, Managed<Box<dyn Network>>>,
    pub(crate) network_clouds: BTreeMap<String, Cloud>,
    pub(crate) networks_lock: RunLock,
    pub(crate) firewalls: BTreeMap<String, Managed<Box<dyn Firewall>>>,
    pub(crate) firewalls_lock: RunLock,

    pub(crate) placement_groups: BTreeMap<String, ManagedResource>,
    pub(crate) capacity_reservations: Vec<GroupReservation>,

    pub(crate) container_registry: Option<ManagedResource>,
    pub(crate) container_cluster: Option<Managed<Box<dyn ContainerCluster>>>,
    pub(crate) dpb_service: Option<ManagedResource>,
    pub(crate) relational_db: Option<ManagedResource>,
    pub(crate) non_relational_db: Option<ManagedResource>,
    pub(crate) spanner: Option<ManagedResource>,
    pub(crate) edw_service: Option<ManagedResource>,
    pub(crate) nfs_service: Option<NfsHandle>,
    pub(crate) smb_service: Option<ManagedResource>,
    pub(crate) messaging_service: Option<ManagedResource>,
    pub(crate) data_discovery_service: Option<ManagedResource>,
    pub(crate) vpn_service: Option<ManagedResource>,

    pub(crate) tpus: Vec<ManagedResource>,
    pub(crate) tpu_groups: BTreeMap<String, usize>,

    pub(crate) vpn_gateways: BTreeMap<String, ManagedResource>,
    pub(crate) vpn_gateways_lock: RunLock,
    pub(crate) vpns: BTreeMap<String, ManagedResource>,
    pub(crate) vpns_lock: RunLock,

    /// Where `freeze` writes its snapshot; set when the caller intends a
    /// multi-phase run.
    pub(crate) freeze_path: Option<PathBuf>,
}

impl std::fmt::Debug for BenchmarkRun {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BenchmarkRun")
            .field("name", &self.name)
            .field("uid", &self.uid)
            .field("uuid", &self.uuid)
            .field("sequence_number", &self.sequence_number)
            .field("status", &self.status)
            .field("failed_substatus", &self.failed_substatus)
            .field("deleted", &self.deleted)
            .finish_non_exhaustive()
    }
}

impl BenchmarkRun {
    /// Builds the full resource graph for `config` without provisioning
    /// anything.
    pub fn new(
        config: RunConfig,
        ctx: Arc<RunContext>,
        registry: &ProviderRegistry,
        uid: impl Into<String>,
    ) -> Result<Self> {
        let uid = uid.into();
        let name = config.benchmark_name.clone();
        let uuid = format!("{}-{}", ctx.run_uri(), Uuid::new_v4());
        let sequence_number = ctx.next_sequence_number();

        let boot_groups = Self::resolve_boot_groups(&config)?;

        // Placement groups, validated against every reference first.
        for (group_name, group) in &boot_groups {
            if let Some(pg) = &group.placement_group_name {
                if !config.placement_groups.contains_key(pg) {
                    return Err(ConfigError::UnknownPlacementGroup {
                        group: group_name.clone(),
                        placement_group: pg.clone(),
                    }
                    .into());
                }
            }
        }
        let mut placement_groups = BTreeMap::new();
        for (pg_name, pg_spec) in &config.placement_groups {
            let seed = ResourceSeed::new(
                format!("{}-{}", ctx.run_uri(), pg_name),
                pg_spec.cloud,
                ResourceKind::PlacementGroup,
            )
            .with_config(pg_spec)
            .map_err(RunError::from)?;
            placement_groups.insert(
                pg_name.clone(),
                Managed::new(registry.resolve_resource(&seed)?),
            );
        }

        // One network per distinct (cloud, zone) among the boot groups, one
        // firewall per cloud.
        let mut networks = BTreeMap::new();
        let mut network_clouds = BTreeMap::new();
        let mut firewalls = BTreeMap::new();
        for group in boot_groups.values() {
            let net_key = format!("{}-{}", group.cloud, group.zone);
            if !networks.contains_key(&net_key) {
                let seed = ResourceSeed::new(
                    format!("net-{}-{}", ctx.run_uri(), net_key),
                    group.cloud,
                    ResourceKind::Network,
                )
                .with_config(group)
                .map_err(RunError::from)?;
                networks.insert(net_key.clone(), Managed::new(registry.resolve_network(&seed)?));
                network_clouds.insert(net_key, group.cloud);
            }
            let fw_key = group.cloud.to_string();
            if !firewalls.contains_key(&fw_key) {
                let seed = ResourceSeed::new(
                    format!("fw-{}-{}", ctx.run_uri(), fw_key),
                    group.cloud,
                    ResourceKind::Firewall,
                );
                firewalls.insert(fw_key, Managed::new(registry.resolve_firewall(&seed)?));
            }
        }

        let mut capacity_reservations = Vec::new();
        if config.use_capacity_reservations {
            for (group_name, group) in &boot_groups {
                let seed = ResourceSeed::new(
                    format!("cr-{}-{}", ctx.run_uri(), group_name),
                    group.cloud,
                    ResourceKind::CapacityReservation,
                )
                .with_config(group)
                .map_err(RunError::from)?;
                capacity_reservations.push(GroupReservation {
                    group: group_name.clone(),
                    resource: Managed::new(registry.resolve_resource(&seed)?),
                });
            }
        }

        // VMs, in sorted (group, index) order.
        let mut vms: Vec<RunVm> = Vec::new();
        let mut vm_groups: BTreeMap<String, Vec<usize>> = BTreeMap::new();
        for (group_name, group) in &boot_groups {
            let mut indices = Vec::with_capacity(group.vm_count);
            for _ in 0..group.vm_count {
                let mut vm = registry.resolve_vm(group.cloud, group.os_family, group)?;
                if let Some(pg) = &group.placement_group_name {
                    vm.set_placement_group(format!("{}-{}", ctx.run_uri(), pg));
                }
                let disk_specs = Self::expand_disk_specs(group, vm.as_ref());
                indices.push(vms.len());
                vms.push(RunVm {
                    resource: Managed::new(vm),
                    group: group_name.clone(),
                    disk_specs,
                });
            }
            vm_groups.insert(group_name.clone(), indices);
        }

        let run_uri = ctx.run_uri();
        let container_registry = match &config.container_registry {
            Some(spec) => Some(service_singleton(
                registry,
                run_uri,
                ResourceKind::ContainerRegistry,
                "registry",
                spec,
            )?),
            None => None,
        };
        let container_cluster = match &config.container_cluster {
            Some(spec) => {
                let seed = ResourceSeed::new(
                    format!("{}-cluster", ctx.run_uri()),
                    spec.cloud,
                    ResourceKind::ContainerCluster,
                )
                .with_config(spec)
                .map_err(RunError::from)?;
                Some(Managed::new(registry.resolve_cluster(&seed)?))
            }
            None => None,
        };
        // Unmanaged cluster services still get a resource handle; their
        // machines are the adopted run VMs, attached before creation.
        let dpb_service = match &config.dpb_service {
            Some(spec) => Some(resolve_singleton(
                registry,
                run_uri,
                ResourceKind::DpbService,
                "dpb",
                spec.cloud,
                seed_config(spec)?,
            )?),
            None => None,
        };
        let relational_db = match &config.relational_db {
            Some(spec) => Some(resolve_singleton(
                registry,
                run_uri,
                ResourceKind::RelationalDb,
                "db",
                spec.cloud,
                seed_config(spec)?,
            )?),
            None => None,
        };
        let non_relational_db = match &config.non_relational_db {
            Some(spec) => Some(service_singleton(
                registry,
                run_uri,
                ResourceKind::NonRelationalDb,
                "nosql",
                spec,
            )?),
            None => None,
        };
        let spanner = match &config.spanner {
            Some(spec) => Some(service_singleton(
                registry,
                run_uri,
                ResourceKind::Spanner,
                "spanner",
                spec,
            )?),
            None => None,
        };
        let edw_service = match &config.edw_service {
            Some(spec) => Some(service_singleton(
                registry,
                run_uri,
                ResourceKind::EdwService,
                "edw",
                spec,
            )?),
            None => None,
        };
        let smb_service = match &config.smb_service {
            Some(spec) => Some(service_singleton(
                registry,
                run_uri,
                ResourceKind::SmbService,
                "smb",
                spec,
            )?),
            None => None,
        };
        let messaging_service = match &config.messaging_service {
            Some(spec) => Some(service_singleton(
                registry,
                run_uri,
                ResourceKind::MessagingService,
                "messaging",
                spec,
            )?),
            None => None,
        };
        let data_discovery_service = match &config.data_discovery_service {
            Some(spec) => Some(service_singleton(
                registry,
                run_uri,
                ResourceKind::DataDiscoveryService,
                "discovery",
                spec,
            )?),
            None => None,
        };
        let vpn_service = match &config.vpn_service {
            Some(spec) => Some(service_singleton(
                registry,
                run_uri,
                ResourceKind::VpnService,
                "vpn",
                spec,
            )?),
            None => None,
        };

        // A static NFS address needs no service at all; otherwise the
        // service spec decides and the disk spec says who manages the
        // server.
        let (nfs_static, nfs_managed) = Self::nfs_disk_layout(&boot_groups);
        let nfs_service = match &config.nfs_service {
            Some(spec) if !nfs_static => Some(NfsHandle {
                resource: service_singleton(registry, run_uri, ResourceKind::NfsService, "nfs", spec)?,
                managed: nfs_managed,
            }),
            _ => None,
        };

        let mut tpus = Vec::new();
        let mut tpu_groups = BTreeMap::new();
        for (tpu_name, spec) in &config.tpu_groups {
            let resource = service_singleton(
                registry,
                run_uri,
                ResourceKind::Tpu,
                &format!("tpu-{tpu_name}"),
                spec,
            )?;
            tpu_groups.insert(tpu_name.clone(), tpus.len());
            tpus.push(resource);
        }

        // VPN gateways per network, tunnels per gateway pair.
        let mut vpn_gateways = BTreeMap::new();
        let mut vpns = BTreeMap::new();
        if let Some(spec) = &config.vpn_service {
            for (net_key, cloud) in &network_clouds {
                let seed = ResourceSeed::new(
                    format!("vpn-gw-{}-{}", ctx.run_uri(), net_key),
                    *cloud,
                    ResourceKind::VpnGateway,
                )
                .with_config(spec)
                .map_err(RunError::from)?;
                vpn_gateways.insert(
                    net_key.clone(),
                    Managed::new(registry.resolve_resource(&seed)?),
                );
            }
            let gateway_keys: Vec<&String> = vpn_gateways.keys().collect();
            for (i, a) in gateway_keys.iter().enumerate() {
                for b in &gateway_keys[i + 1..] {
                    let tunnel_key = format!("{a}-{b}");
                    let seed = ResourceSeed::new(
                        format!("vpn-{}-{}", ctx.run_uri(), tunnel_key),
                        network_clouds[a.as_str()],
                        ResourceKind::Vpn,
                    )
                    .with_config(spec)
                    .map_err(RunError::from)?;
                    vpns.insert(tunnel_key, Managed::new(registry.resolve_resource(&seed)?));
                }
            }
        }

        Ok(Self {
            config,
            ctx,
            name,
            uid,
            uuid,
            sequence_number,
            status: RunStatus::Skipped,
            failed_substatus: None,
            deleted: false,
            vms,
            vm_groups,
            boot_groups,
            networks,
            network_clouds,
            networks_lock: RunLock::new(),
            firewalls,
            firewalls_lock: RunLock::new(),
            placement_groups,
            capacity_reservations,
            container_registry,
            container_cluster,
            dpb_service,
            relational_db,
            non_relational_db,
            spanner,
            edw_service,
            nfs_service,
            smb_service,
            messaging_service,
            data_discovery_service,
            vpn_service,
            tpus,
            tpu_groups,
            vpn_gateways,
            vpn_gateways_lock: RunLock::new(),
            vpns,
            vpns_lock: RunLock::new(),
            freeze_path: None,
        })
    }

    /// Rebuilds a run from `config` and re-applies a previously frozen
    /// snapshot: provider identities, lifecycle states, idempotency tokens
    /// and held locks. The restored run is live again; `deleted` is
    /// cleared and its status resets.
    pub fn restore(
        config: RunConfig,
        ctx: Arc<RunContext>,
        registry: &ProviderRegistry,
        snapshot: &RunSnapshot,
    ) -> Result<Self> {
        snapshot.check_version()?;
        let mut run = Self::new(config, ctx, registry, snapshot.uid.clone())?;
        run.uuid = snapshot.uuid.clone();
        run.sequence_number = snapshot.sequence_number;
        snapshot.apply(&mut run);
        run.deleted = false;
        run.status = RunStatus::Skipped;
        run.failed_substatus = None;
        Ok(run)
    }

    /// The VM groups to boot, after validating and adopting the groups an
    /// unmanaged cluster service contributes.
    fn resolve_boot_groups(config: &RunConfig) -> Result<BTreeMap<String, VmGroupSpec>> {
        for reserved in [MASTER_GROUP, WORKER_GROUP] {
            if config.vm_groups.contains_key(reserved) {
                return Err(ConfigError::ReservedGroupName(reserved.to_string()).into());
            }
        }

        let mut groups = config.vm_groups_to_boot().clone();
        if let Some(dpb) = &config.dpb_service {
            if dpb.is_unmanaged() {
                if !groups.is_empty() {
                    let names: Vec<&str> = groups.keys().map(String::as_str).collect();
                    return Err(ConfigError::NonClusterVmGroups(names.join(", ")).into());
                }
                let mut master = dpb.worker_group.clone();
                master.vm_count = 1;
                groups.insert(MASTER_GROUP.to_string(), master);
                if dpb.worker_count > 0 {
                    let mut workers = dpb.worker_group.clone();
                    workers.vm_count = dpb.worker_count;
                    groups.insert(WORKER_GROUP.to_string(), workers);
                }
            }
        }
        Ok(groups)
    }

    /// Expands a group's disk spec into per-VM specs. A local disk spec
    /// with no explicit count takes every local disk the machine type has;
    /// multiple disks get indexed mount points.
    fn expand_disk_specs(group: &VmGroupSpec, vm: &dyn VirtualMachine) -> Vec<DiskSpec> {
        let Some(spec) = &group.disk_spec else {
            return Vec::new();
        };
        let count = match group.disk_count {
            Some(n) => n,
            None if spec.kind == DiskKind::Local => vm.max_local_disks(),
            None => 1,
        };
        let mut specs = Vec::with_capacity(count);
        for disk_index in 0..count {
            let mut disk = spec.clone();
            if count > 1 {
                if let Some(mount) = &mut disk.mount_point {
                    mount.push_str(&disk_index.to_string());
                }
            }
            specs.push(disk);
        }
        specs
    }

    fn nfs_disk_layout(groups: &BTreeMap<String, VmGroupSpec>) -> (bool, bool) {
        let mut is_static = false;
        let mut managed = true;
        for group in groups.values() {
            if let Some(disk) = &group.disk_spec {
                if disk.kind == DiskKind::Nfs {
                    is_static = disk.nfs_ip_address.is_some();
                    managed = disk.nfs_managed;
                }
            }
        }
        (is_static, managed)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn uid(&self) -> &str {
        &self.uid
    }

    /// Process-unique run identity, tagged onto every resource.
    pub fn uuid(&self) -> &str {
        &self.uuid
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn status(&self) -> RunStatus {
        self.status
    }

    pub fn set_status(&mut self, status: RunStatus) {
        self.status = status;
    }

    /// Classification of a provisioning failure (capacity, quota), if any.
    pub fn failed_substatus(&self) -> Option<&str> {
        self.failed_substatus.as_deref()
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn context(&self) -> &RunContext {
        &self.ctx
    }

    pub fn vms(&self) -> &[RunVm] {
        &self.vms
    }

    pub fn vms_mut(&mut self) -> &mut [RunVm] {
        &mut self.vms
    }

    /// VMs of one named group, in creation order.
    pub fn vm_group(&self, group: &str) -> Vec<&RunVm> {
        match self.vm_groups.get(group) {
            Some(indices) => indices.iter().map(|&i| &self.vms[i]).collect(),
            None => Vec::new(),
        }
    }

    pub fn vm_group_names(&self) -> Vec<&str> {
        self.vm_groups.keys().map(String::as_str).collect()
    }

    pub fn networks(&self) -> &BTreeMap<String, Managed<Box<dyn Network>>> {
        &self.networks
    }

    pub fn networks_lock(&self) -> &RunLock {
        &self.networks_lock
    }

    pub fn firewalls_lock(&self) -> &RunLock {
        &self.firewalls_lock
    }

    pub fn vpn_gateways_lock(&self) -> &RunLock {
        &self.vpn_gateways_lock
    }

    pub fn vpns_lock(&self) -> &RunLock {
        &self.vpns_lock
    }

    pub fn container_cluster(&self) -> Option<&Managed<Box<dyn ContainerCluster>>> {
        self.container_cluster.as_ref()
    }

    pub fn container_registry(&self) -> Option<&ManagedResource> {
        self.container_registry.as_ref()
    }

    pub fn dpb_service(&self) -> Option<&ManagedResource> {
        self.dpb_service.as_ref()
    }

    pub fn relational_db(&self) -> Option<&ManagedResource> {
        self.relational_db.as_ref()
    }

    pub fn non_relational_db(&self) -> Option<&ManagedResource> {
        self.non_relational_db.as_ref()
    }

    pub fn spanner(&self) -> Option<&ManagedResource> {
        self.spanner.as_ref()
    }

    pub fn edw_service(&self) -> Option<&ManagedResource> {
        self.edw_service.as_ref()
    }

    pub fn smb_service(&self) -> Option<&ManagedResource> {
        self.smb_service.as_ref()
    }

    pub fn messaging_service(&self) -> Option<&ManagedResource> {
        self.messaging_service.as_ref()
    }

    pub fn data_discovery_service(&self) -> Option<&ManagedResource> {
        self.data_discovery_service.as_ref()
    }

    pub fn vpn_service(&self) -> Option<&ManagedResource> {
        self.vpn_service.as_ref()
    }

    /// TPU for a named TPU group.
    pub fn tpu(&self, group: &str) -> Option<&ManagedResource> {
        self.tpu_groups.get(group).map(|&i| &self.tpus[i])
    }

    /// Where `freeze` writes its snapshot. Setting a path also makes
    /// `delete` freeze before tearing anything down.
    pub fn set_freeze_path(&mut self, path: Option<PathBuf>) {
        self.freeze_path = path;
    }

    pub fn freeze_path(&self) -> Option<&PathBuf> {
        self.freeze_path.as_ref()
    }

    /// The tag set applied to every resource of this run.
    pub fn resource_tags(&self) -> BTreeMap<String, String> {
        resource_tags(&self.ctx, &self.name, &self.uid, &self.uuid, None)
    }
}

fn seed_config<T: Serialize>(spec: &T) -> Result<serde_json::Value> {
    Ok(serde_json::to_value(spec)?)
}

fn resolve_singleton(
    registry: &ProviderRegistry,
    run_uri: &str,
    kind: ResourceKind,
    tag: &str,
    cloud: Cloud,
    config: serde_json::Value,
) -> Result<ManagedResource> {
    let mut seed = ResourceSeed::new(format!("{run_uri}-{tag}"), cloud, kind);
    seed.config = config;
    Ok(Managed::new(registry.resolve_resource(&seed)?))
}

fn service_singleton(
    registry: &ProviderRegistry,
    run_uri: &str,
    kind: ResourceKind,
    tag: &str,
    spec: &ServiceSpec,
) -> Result<ManagedResource> {
    resolve_singleton(registry, run_uri, kind, tag, spec.cloud, seed_config(spec)?)
}
