//! Provider factory registry
//!
//! Concrete provider implementations live outside this crate; they plug in
//! here as factories keyed by `(cloud, kind)`. The orchestrator resolves
//! every factory it needs while it is being constructed, so a missing
//! provider surfaces before anything is provisioned.

use crate::error::{CloudError, Result};
use crate::kinds::{ContainerCluster, Firewall, Network};
use crate::resource::{Resource, ResourceKind};
use crate::vm::VirtualMachine;
use benchflow_core::{Cloud, OsFamily, VmGroupSpec};
use std::collections::BTreeMap;

/// Kind-specific inputs handed to a resource factory.
///
/// `config` carries the decoded, kind-specific spec as a JSON value so the
/// registry stays closed over an enumerable kind set without a type
/// parameter per kind; factories deserialize the part they understand.
#[derive(Debug, Clone)]
pub struct ResourceSeed {
    /// Generated name for the resource, unique within the run.
    pub name: String,
    pub cloud: Cloud,
    pub kind: ResourceKind,
    pub config: serde_json::Value,
}

impl ResourceSeed {
    pub fn new(name: impl Into<String>, cloud: Cloud, kind: ResourceKind) -> Self {
        Self {
            name: name.into(),
            cloud,
            kind,
            config: serde_json::Value::Null,
        }
    }

    pub fn with_config<T: serde::Serialize>(mut self, config: &T) -> Result<Self> {
        self.config = serde_json::to_value(config)?;
        Ok(self)
    }
}

pub type ResourceFactory = Box<dyn Fn(&ResourceSeed) -> Result<Box<dyn Resource>> + Send + Sync>;
pub type NetworkFactory = Box<dyn Fn(&ResourceSeed) -> Result<Box<dyn Network>> + Send + Sync>;
pub type FirewallFactory = Box<dyn Fn(&ResourceSeed) -> Result<Box<dyn Firewall>> + Send + Sync>;
pub type ClusterFactory =
    Box<dyn Fn(&ResourceSeed) -> Result<Box<dyn ContainerCluster>> + Send + Sync>;
pub type VmFactory = Box<dyn Fn(&VmGroupSpec) -> Result<Box<dyn VirtualMachine>> + Send + Sync>;

/// Maps `(cloud, kind)` pairs to the factories that build provider
/// resource implementations.
#[derive(Default)]
pub struct ProviderRegistry {
    resources: BTreeMap<(Cloud, ResourceKind), ResourceFactory>,
    networks: BTreeMap<Cloud, NetworkFactory>,
    firewalls: BTreeMap<Cloud, FirewallFactory>,
    clusters: BTreeMap<Cloud, ClusterFactory>,
    vms: BTreeMap<(Cloud, OsFamily), VmFactory>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_resource(
        &mut self,
        cloud: Cloud,
        kind: ResourceKind,
        factory: ResourceFactory,
    ) {
        self.resources.insert((cloud, kind), factory);
    }

    pub fn register_network(&mut self, cloud: Cloud, factory: NetworkFactory) {
        self.networks.insert(cloud, factory);
    }

    pub fn register_firewall(&mut self, cloud: Cloud, factory: FirewallFactory) {
        self.firewalls.insert(cloud, factory);
    }

    pub fn register_cluster(&mut self, cloud: Cloud, factory: ClusterFactory) {
        self.clusters.insert(cloud, factory);
    }

    pub fn register_vm(&mut self, cloud: Cloud, os_family: OsFamily, factory: VmFactory) {
        self.vms.insert((cloud, os_family), factory);
    }

    pub fn resolve_resource(&self, seed: &ResourceSeed) -> Result<Box<dyn Resource>> {
        let factory = self.resources.get(&(seed.cloud, seed.kind)).ok_or_else(|| {
            CloudError::ProviderNotFound {
                cloud: seed.cloud.to_string(),
                kind: seed.kind.to_string(),
            }
        })?;
        factory(seed)
    }

    pub fn resolve_network(&self, seed: &ResourceSeed) -> Result<Box<dyn Network>> {
        let factory =
            self.networks
                .get(&seed.cloud)
                .ok_or_else(|| CloudError::ProviderNotFound {
                    cloud: seed.cloud.to_string(),
                    kind: ResourceKind::Network.to_string(),
                })?;
        factory(seed)
    }

    pub fn resolve_firewall(&self, seed: &ResourceSeed) -> Result<Box<dyn Firewall>> {
        let factory =
            self.firewalls
                .get(&seed.cloud)
                .ok_or_else(|| CloudError::ProviderNotFound {
                    cloud: seed.cloud.to_string(),
                    kind: ResourceKind::Firewall.to_string(),
                })?;
        factory(seed)
    }

    pub fn resolve_cluster(&self, seed: &ResourceSeed) -> Result<Box<dyn ContainerCluster>> {
        let factory =
            self.clusters
                .get(&seed.cloud)
                .ok_or_else(|| CloudError::ProviderNotFound {
                    cloud: seed.cloud.to_string(),
                    kind: ResourceKind::ContainerCluster.to_string(),
                })?;
        factory(seed)
    }

    pub fn resolve_vm(
        &self,
        cloud: Cloud,
        os_family: OsFamily,
        spec: &VmGroupSpec,
    ) -> Result<Box<dyn VirtualMachine>> {
        let factory = self.vms.get(&(cloud, os_family)).ok_or_else(|| {
            CloudError::ProviderNotFound {
                cloud: cloud.to_string(),
                kind: format!("{} ({:?})", ResourceKind::Vm, os_family),
            }
        })?;
        factory(spec)
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("resources", &self.resources.keys().collect::<Vec<_>>())
            .field("networks", &self.networks.keys().collect::<Vec<_>>())
            .field("firewalls", &self.firewalls.keys().collect::<Vec<_>>())
            .field("clusters", &self.clusters.keys().collect::<Vec<_>>())
            .field("vms", &self.vms.keys().collect::<Vec<_>>())
            .finish()
    }
}
