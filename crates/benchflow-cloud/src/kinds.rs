//! Extended contracts for resource kinds with extra obligations
//!
//! Most resources are fully described by [`Resource`](crate::Resource);
//! the kinds here carry one or two additional operations the orchestrator
//! invokes at specific lifecycle points.

use crate::error::Result;
use crate::resource::Resource;

/// A virtual network.
pub trait Network: Resource {
    /// Establishes peering with another network. The orchestrator issues
    /// exactly one peering call per network pair, in sorted key order.
    fn peer(&mut self, other: &mut dyn Network) -> Result<()>;
}

impl std::fmt::Debug for dyn Network {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Network")
            .field("label", &self.label())
            .finish_non_exhaustive()
    }
}

/// A firewall guarding one or more networks.
///
/// Firewalls may be shared beyond a single run, so teardown locks their
/// ports down instead of deleting them.
pub trait Firewall: Resource {
    /// Revokes every port rule this run opened.
    fn disallow_all_ports(&mut self) -> Result<()>;
}

/// A managed container cluster.
pub trait ContainerCluster: Resource {
    /// Tears down services deployed into the cluster.
    fn delete_services(&mut self) -> Result<()>;

    /// Tears down containers running in the cluster.
    fn delete_containers(&mut self) -> Result<()>;
}
