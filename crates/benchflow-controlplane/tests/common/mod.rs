#![allow(dead_code)]

//! Mock provider shared by the integration tests.
//!
//! Every mock resource records its provider calls into a shared event log
//! so tests can assert ordering and call counts across the whole run.

use benchflow_cloud::{
    CloudError, ContainerCluster, Firewall, Network, ProviderRegistry, Resource, ResourceKind,
    ResourceStatus, Result, VirtualMachine, VmAttachment,
};
use benchflow_core::{Cloud, DiskSpec, OsFamily, RunContext, ServiceSpec, VmGroupSpec};
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Shared state behind all mock resources of one test.
#[derive(Clone, Default)]
pub struct MockWorld {
    log: Arc<Mutex<Vec<String>>>,
    fail_delete: Arc<Mutex<BTreeSet<String>>>,
    fail_quota: Arc<Mutex<BTreeSet<String>>>,
    fail_capacity: Arc<Mutex<BTreeSet<String>>>,
    vm_counter: Arc<AtomicUsize>,
}

impl MockWorld {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, event: impl Into<String>) {
        self.log.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    pub fn index_of(&self, needle: &str) -> Option<usize> {
        self.events().iter().position(|e| e.contains(needle))
    }

    pub fn count_containing(&self, needle: &str) -> usize {
        self.events().iter().filter(|e| e.contains(needle)).count()
    }

    /// Asserts that an event containing `earlier` was recorded before one
    /// containing `later`.
    pub fn assert_order(&self, earlier: &str, later: &str) {
        let events = self.events();
        let first = events.iter().position(|e| e.contains(earlier));
        let second = events.iter().position(|e| e.contains(later));
        match (first, second) {
            (Some(a), Some(b)) => {
                assert!(a < b, "expected '{earlier}' (at {a}) before '{later}' (at {b})")
            }
            _ => panic!("missing events: '{earlier}' = {first:?}, '{later}' = {second:?}"),
        }
    }

    /// Makes every future deletion of the named resource fail.
    pub fn fail_delete_of(&self, name: &str) {
        self.fail_delete.lock().unwrap().insert(name.to_string());
    }

    fn delete_should_fail(&self, name: &str) -> bool {
        self.fail_delete.lock().unwrap().contains(name)
    }

    /// Makes creation of the named resource fail with a quota error.
    pub fn fail_create_with_quota(&self, name: &str) {
        self.fail_quota.lock().unwrap().insert(name.to_string());
    }

    /// Makes creation of the named resource fail with a capacity error.
    pub fn fail_create_with_capacity(&self, name: &str) {
        self.fail_capacity.lock().unwrap().insert(name.to_string());
    }

    fn create_failure(&self, name: &str) -> Option<CloudError> {
        if self.fail_quota.lock().unwrap().contains(name) {
            return Some(CloudError::QuotaExceeded(format!("{name}: out of quota")));
        }
        if self.fail_capacity.lock().unwrap().contains(name) {
            return Some(CloudError::InsufficientCapacity(format!(
                "{name}: zone exhausted"
            )));
        }
        None
    }

    fn next_vm_index(&self) -> usize {
        self.vm_counter.fetch_add(1, Ordering::SeqCst)
    }
}

pub struct MockResource {
    world: MockWorld,
    kind: ResourceKind,
    name: String,
    id: Option<String>,
    live: bool,
}

impl MockResource {
    pub fn new(world: MockWorld, kind: ResourceKind, name: String) -> Self {
        Self {
            world,
            kind,
            name,
            id: None,
            live: false,
        }
    }
}

impl Resource for MockResource {
    fn kind(&self) -> ResourceKind {
        self.kind
    }

    fn label(&self) -> String {
        self.name.clone()
    }

    fn id(&self) -> Option<String> {
        self.id.clone()
    }

    fn restore_id(&mut self, id: String) {
        self.id = Some(id);
        self.live = true;
    }

    fn issue_create(&mut self, _token: &str) -> Result<()> {
        if let Some(err) = self.world.create_failure(&self.name) {
            return Err(err);
        }
        self.world.record(format!("create {} {}", self.kind, self.name));
        self.id = Some(format!("{}-id", self.name));
        self.live = true;
        Ok(())
    }

    fn query_status(&mut self) -> Result<ResourceStatus> {
        Ok(if self.live {
            ResourceStatus::Exists
        } else {
            ResourceStatus::Deleted
        })
    }

    fn issue_delete(&mut self) -> Result<()> {
        if self.world.delete_should_fail(&self.name) {
            return Err(CloudError::DeletionFailed(format!(
                "{} refuses to die",
                self.name
            )));
        }
        self.world.record(format!("delete {} {}", self.kind, self.name));
        self.live = false;
        Ok(())
    }

    fn attach_vms(&mut self, vms: &[VmAttachment]) {
        self.world
            .record(format!("attach {} {} x{}", self.kind, self.name, vms.len()));
    }
}

pub struct MockNetwork {
    base: MockResource,
}

impl Resource for MockNetwork {
    fn kind(&self) -> ResourceKind {
        self.base.kind()
    }
    fn label(&self) -> String {
        self.base.label()
    }
    fn id(&self) -> Option<String> {
        self.base.id()
    }
    fn restore_id(&mut self, id: String) {
        self.base.restore_id(id);
    }
    fn issue_create(&mut self, token: &str) -> Result<()> {
        self.base.issue_create(token)
    }
    fn query_status(&mut self) -> Result<ResourceStatus> {
        self.base.query_status()
    }
    fn issue_delete(&mut self) -> Result<()> {
        self.base.issue_delete()
    }
}

impl Network for MockNetwork {
    fn peer(&mut self, other: &mut dyn Network) -> Result<()> {
        self.base
            .world
            .record(format!("peer {} {}", self.base.name, other.label()));
        Ok(())
    }
}

pub struct MockFirewall {
    base: MockResource,
}

impl Resource for MockFirewall {
    fn kind(&self) -> ResourceKind {
        self.base.kind()
    }
    fn label(&self) -> String {
        self.base.label()
    }
    fn id(&self) -> Option<String> {
        self.base.id()
    }
    fn restore_id(&mut self, id: String) {
        self.base.restore_id(id);
    }
    fn issue_create(&mut self, token: &str) -> Result<()> {
        self.base.issue_create(token)
    }
    fn query_status(&mut self) -> Result<ResourceStatus> {
        self.base.query_status()
    }
    fn issue_delete(&mut self) -> Result<()> {
        self.base.issue_delete()
    }
}

impl Firewall for MockFirewall {
    fn disallow_all_ports(&mut self) -> Result<()> {
        self.base.world.record(format!("lockdown {}", self.base.name));
        Ok(())
    }
}

pub struct MockCluster {
    base: MockResource,
}

impl Resource for MockCluster {
    fn kind(&self) -> ResourceKind {
        self.base.kind()
    }
    fn label(&self) -> String {
        self.base.label()
    }
    fn id(&self) -> Option<String> {
        self.base.id()
    }
    fn restore_id(&mut self, id: String) {
        self.base.restore_id(id);
    }
    fn issue_create(&mut self, token: &str) -> Result<()> {
        self.base.issue_create(token)
    }
    fn query_status(&mut self) -> Result<ResourceStatus> {
        self.base.query_status()
    }
    fn issue_delete(&mut self) -> Result<()> {
        self.base.issue_delete()
    }
}

impl ContainerCluster for MockCluster {
    fn delete_services(&mut self) -> Result<()> {
        self.base
            .world
            .record(format!("cluster-services {}", self.base.name));
        Ok(())
    }

    fn delete_containers(&mut self) -> Result<()> {
        self.base
            .world
            .record(format!("cluster-containers {}", self.base.name));
        Ok(())
    }
}

pub struct MockVm {
    base: MockResource,
    zone: String,
    os: OsFamily,
    reservation_id: Option<String>,
    placement_group: Option<String>,
}

impl Resource for MockVm {
    fn kind(&self) -> ResourceKind {
        ResourceKind::Vm
    }

    fn label(&self) -> String {
        self.base.label()
    }

    fn id(&self) -> Option<String> {
        self.base.id()
    }

    fn restore_id(&mut self, id: String) {
        self.base.restore_id(id);
    }

    fn issue_create(&mut self, _token: &str) -> Result<()> {
        if let Some(err) = self.base.world.create_failure(&self.base.name) {
            return Err(err);
        }
        self.base.world.record(format!(
            "create vm {} reservation={} placement={}",
            self.base.name,
            self.reservation_id.as_deref().unwrap_or("none"),
            self.placement_group.as_deref().unwrap_or("none"),
        ));
        self.base.id = Some(format!("{}-id", self.base.name));
        self.base.live = true;
        Ok(())
    }

    fn query_status(&mut self) -> Result<ResourceStatus> {
        self.base.query_status()
    }

    fn issue_delete(&mut self) -> Result<()> {
        self.base.issue_delete()
    }
}

impl VirtualMachine for MockVm {
    fn zone(&self) -> String {
        self.zone.clone()
    }

    fn os_family(&self) -> OsFamily {
        self.os
    }

    fn max_local_disks(&self) -> usize {
        2
    }

    fn ip_address(&self) -> Option<String> {
        self.base.live.then(|| "10.0.0.1".to_string())
    }

    fn set_capacity_reservation_id(&mut self, reservation_id: String) {
        self.reservation_id = Some(reservation_id);
    }

    fn set_placement_group(&mut self, name: String) {
        self.placement_group = Some(name);
    }

    fn allow_remote_access(&mut self) -> Result<()> {
        self.base.world.record(format!("allow {}", self.base.name));
        Ok(())
    }

    fn wait_for_boot(&mut self) -> Result<()> {
        self.base.world.record(format!("boot {}", self.base.name));
        Ok(())
    }

    fn apply_tags(&mut self, tags: &BTreeMap<String, String>) -> Result<()> {
        self.base
            .world
            .record(format!("tag {} ({} tags)", self.base.name, tags.len()));
        Ok(())
    }

    fn create_scratch_disks(&mut self, specs: &[DiskSpec]) -> Result<()> {
        self.base
            .world
            .record(format!("disks {} x{}", self.base.name, specs.len()));
        Ok(())
    }

    fn delete_scratch_disks(&mut self) -> Result<()> {
        self.base
            .world
            .record(format!("delete-disks {}", self.base.name));
        Ok(())
    }

    fn prepare_environment(&mut self) -> Result<()> {
        self.base.world.record(format!("prepare {}", self.base.name));
        Ok(())
    }
}

/// A registry with mock factories for every kind, on GCP and AWS.
pub fn mock_registry(world: &MockWorld) -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();

    let generic_kinds = [
        ResourceKind::PlacementGroup,
        ResourceKind::CapacityReservation,
        ResourceKind::ContainerRegistry,
        ResourceKind::DpbService,
        ResourceKind::RelationalDb,
        ResourceKind::NonRelationalDb,
        ResourceKind::Spanner,
        ResourceKind::EdwService,
        ResourceKind::NfsService,
        ResourceKind::SmbService,
        ResourceKind::Tpu,
        ResourceKind::MessagingService,
        ResourceKind::DataDiscoveryService,
        ResourceKind::VpnService,
        ResourceKind::VpnGateway,
        ResourceKind::Vpn,
    ];

    for cloud in [Cloud::Gcp, Cloud::Aws] {
        for kind in generic_kinds {
            let w = world.clone();
            registry.register_resource(
                cloud,
                kind,
                Box::new(move |seed| {
                    Ok(Box::new(MockResource::new(
                        w.clone(),
                        seed.kind,
                        seed.name.clone(),
                    )))
                }),
            );
        }

        let w = world.clone();
        registry.register_network(
            cloud,
            Box::new(move |seed| {
                Ok(Box::new(MockNetwork {
                    base: MockResource::new(w.clone(), ResourceKind::Network, seed.name.clone()),
                }))
            }),
        );

        let w = world.clone();
        registry.register_firewall(
            cloud,
            Box::new(move |seed| {
                Ok(Box::new(MockFirewall {
                    base: MockResource::new(w.clone(), ResourceKind::Firewall, seed.name.clone()),
                }))
            }),
        );

        let w = world.clone();
        registry.register_cluster(
            cloud,
            Box::new(move |seed| {
                Ok(Box::new(MockCluster {
                    base: MockResource::new(
                        w.clone(),
                        ResourceKind::ContainerCluster,
                        seed.name.clone(),
                    ),
                }))
            }),
        );

        for os in [OsFamily::Linux, OsFamily::Windows] {
            let w = world.clone();
            registry.register_vm(
                cloud,
                os,
                Box::new(move |spec| {
                    let name = format!("vm-{}-{}", spec.zone, w.next_vm_index());
                    Ok(Box::new(MockVm {
                        base: MockResource::new(w.clone(), ResourceKind::Vm, name),
                        zone: spec.zone.clone(),
                        os: spec.os_family,
                        reservation_id: None,
                        placement_group: None,
                    }))
                }),
            );
        }
    }

    registry
}

pub fn run_context(temp_dir: &Path) -> Arc<RunContext> {
    Arc::new(RunContext::new("run42", "tester", temp_dir))
}

pub fn vm_group(cloud: Cloud, zone: &str, vm_count: usize) -> VmGroupSpec {
    VmGroupSpec {
        cloud,
        os_family: OsFamily::Linux,
        vm_count,
        machine_type: "n2-standard-2".to_string(),
        zone: zone.to_string(),
        disk_spec: None,
        disk_count: None,
        placement_group_name: None,
        cidr: None,
    }
}

pub fn service(cloud: Cloud) -> ServiceSpec {
    ServiceSpec {
        cloud,
        service_type: "mock".to_string(),
        enable_freeze_restore: false,
    }
}

pub fn restorable_service(cloud: Cloud) -> ServiceSpec {
    ServiceSpec {
        enable_freeze_restore: true,
        ..service(cloud)
    }
}
