//! Teardown
//!
//! Deletes every resource the run owns, in reverse dependency order.
//! Teardown is best-effort: a failing step is logged and the remaining
//! steps continue, because any resource left behind costs money while a
//! resource already gone costs nothing. Deletion of individual resources
//! is idempotent, so calling `delete` twice issues no second round of
//! provider calls.

use benchflow_cloud::{CloudError, run_parallel};

use crate::run::BenchmarkRun;

fn best_effort(step: &str, result: Result<(), CloudError>) {
    if let Err(err) = result {
        tracing::error!("teardown step '{step}' failed, continuing: {err}");
    }
}

impl BenchmarkRun {
    /// Tears the run down. Never fails; partial failures are logged and
    /// the rest of the teardown continues.
    ///
    /// When a freeze path is set, the run is frozen to it first so a later
    /// process can restore instead of re-provisioning. Repeated calls are
    /// no-ops.
    pub fn delete(&mut self) {
        if self.deleted {
            tracing::debug!("run {} already deleted", self.uuid);
            return;
        }
        tracing::info!("tearing down run {} ({})", self.uuid, self.name);

        if self.freeze_path.is_some() {
            if let Err(err) = self.freeze() {
                tracing::warn!("freeze before teardown failed: {err}");
            }
        }

        if let Some(registry) = &mut self.container_registry {
            best_effort("container registry", registry.delete());
        }
        if let Some(dpb) = &mut self.dpb_service {
            best_effort("dpb service", dpb.delete());
        }
        if let Some(db) = &mut self.relational_db {
            best_effort("relational db", db.delete());
        }
        if let Some(db) = &mut self.non_relational_db {
            best_effort("non-relational db", db.delete());
        }
        if let Some(spanner) = &mut self.spanner {
            best_effort("spanner", spanner.delete());
        }

        let options = self.parallel_options(None);
        best_effort(
            "tpus",
            run_parallel(&mut self.tpus, &options, |t| t.label(), |t| t.delete()),
        );

        if let Some(edw) = &mut self.edw_service {
            best_effort("edw service", edw.delete());
        }
        if let Some(nfs) = &mut self.nfs_service {
            best_effort("nfs service", nfs.resource.delete());
        }
        if let Some(smb) = &mut self.smb_service {
            best_effort("smb service", smb.delete());
        }
        if let Some(messaging) = &mut self.messaging_service {
            best_effort("messaging service", messaging.delete());
        }
        if let Some(discovery) = &mut self.data_discovery_service {
            best_effort("data discovery service", discovery.delete());
        }

        best_effort(
            "capacity reservations",
            run_parallel(
                &mut self.capacity_reservations,
                &options,
                |r| r.resource.label(),
                |r| r.resource.delete(),
            ),
        );

        best_effort(
            "vms",
            run_parallel(
                &mut self.vms,
                &options,
                |vm| vm.resource.label(),
                |vm| {
                    // Scratch disks only exist for VMs that were created.
                    let had_id = vm.resource.id().is_some();
                    vm.resource.delete()?;
                    if had_id {
                        vm.resource.inner_mut().delete_scratch_disks()?;
                    }
                    Ok(())
                },
            ),
        );

        for (name, placement_group) in &mut self.placement_groups {
            best_effort(&format!("placement group {name}"), placement_group.delete());
        }

        // Firewalls may be shared beyond this run, so their rules are
        // revoked instead of the firewall being deleted.
        {
            let _guard = self.firewalls_lock.acquire();
            for (name, firewall) in &mut self.firewalls {
                if firewall.id().is_some() {
                    best_effort(
                        &format!("firewall {name} lockdown"),
                        firewall.inner_mut().disallow_all_ports(),
                    );
                }
            }
        }

        if let Some(cluster) = &mut self.container_cluster {
            // In-cluster workloads only exist once the cluster does.
            if cluster.id().is_some() {
                best_effort("cluster services", cluster.inner_mut().delete_services());
                best_effort("cluster containers", cluster.inner_mut().delete_containers());
            }
            best_effort("container cluster", cluster.delete());
        }

        // Tunnels ride on gateways and gateways on networks, so the mesh
        // comes down before the networks underneath it.
        {
            let _guard = self.vpns_lock.acquire();
            for (name, tunnel) in &mut self.vpns {
                best_effort(&format!("vpn tunnel {name}"), tunnel.delete());
            }
        }
        {
            let _guard = self.vpn_gateways_lock.acquire();
            for (name, gateway) in &mut self.vpn_gateways {
                best_effort(&format!("vpn gateway {name}"), gateway.delete());
            }
        }

        {
            let _guard = self.networks_lock.acquire();
            for (name, network) in &mut self.networks {
                best_effort(&format!("network {name}"), network.delete());
            }
        }

        if let Some(vpn) = &mut self.vpn_service {
            best_effort("vpn service", vpn.delete());
        }

        self.deleted = true;
        tracing::info!("run {} torn down", self.uuid);
    }
}
