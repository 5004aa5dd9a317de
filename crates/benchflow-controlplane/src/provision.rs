//! Provisioning
//!
//! Brings every resource of a run into existence, in dependency order:
//!
//! 1. capacity reservations (parallel), threading reservation ids into
//!    their group's VMs
//! 2. networks (parallel, deterministic order) and VPC peering
//! 3. container registry, then the container cluster
//! 4. managed file services (NFS, SMB)
//! 5. placement groups
//! 6. VMs: create + boot in one parallel batch, then post-boot
//!    preparation in a second batch; an unmanaged NFS server is set up on
//!    the freshly booted VMs between the two
//! 7. the data-processing cluster service
//! 8. remaining singleton services, TPUs and the VPN mesh
//!
//! Provisioning is fail-fast: the first stage error aborts the sequence
//! (teardown is the caller's job). Capacity and quota failures are
//! classified into the run's `failed_substatus` so a scheduler can move
//! the run elsewhere instead of retrying in place.

use crate::error::{Result, RunError};
use crate::run::{BenchmarkRun, RunStatus, RunVm};
use benchflow_cloud::{CloudError, ParallelOptions, VmAttachment, run_parallel};
use benchflow_core::OsFamily;
use std::time::Duration;

/// Substatus recorded when a zone could not satisfy the request.
pub const INSUFFICIENT_CAPACITY: &str = "INSUFFICIENT_CAPACITY";

/// Substatus recorded when a quota was exhausted.
pub const QUOTA_EXCEEDED: &str = "QUOTA_EXCEEDED";

impl BenchmarkRun {
    /// Provisions every resource of the run.
    ///
    /// On failure the run's status becomes `Failed` and, when the cause
    /// was a capacity or quota problem, `failed_substatus` names it.
    /// Already-existing resources (restored from a snapshot) are left
    /// alone, which is what resumes a multi-phase run.
    pub fn provision(&mut self) -> Result<()> {
        tracing::info!("provisioning run {} ({})", self.uuid, self.name);
        match self.provision_stages() {
            Ok(()) => Ok(()),
            Err(err) => {
                self.status = RunStatus::Failed;
                self.failed_substatus = classify_failure(&err).map(str::to_string);
                Err(err)
            }
        }
    }

    fn provision_stages(&mut self) -> Result<()> {
        self.reserve_capacity()?;
        self.provision_networks()?;

        if let Some(registry) = &mut self.container_registry {
            registry.create()?;
        }
        if let Some(cluster) = &mut self.container_cluster {
            cluster.create()?;
        }

        if let Some(nfs) = &mut self.nfs_service {
            if nfs.managed {
                nfs.resource.create()?;
            }
        }
        if let Some(smb) = &mut self.smb_service {
            smb.create()?;
        }

        for placement_group in self.placement_groups.values_mut() {
            placement_group.create()?;
        }

        self.provision_vms()?;

        // Services that run against the run's own machines see them before
        // their creation call.
        let attachments = self.vm_attachments();
        if let Some(dpb) = &mut self.dpb_service {
            dpb.inner_mut().attach_vms(&attachments);
            dpb.create()?;
        }

        self.provision_services(&attachments)?;
        Ok(())
    }

    /// Identities of the run's VMs, offered to adopting services.
    fn vm_attachments(&self) -> Vec<VmAttachment> {
        self.vms
            .iter()
            .map(|vm| VmAttachment {
                group: vm.group().to_string(),
                label: vm.resource.label(),
                zone: vm.vm().zone(),
                ip_address: vm.vm().ip_address(),
            })
            .collect()
    }

    /// Stage 1: capacity reservations, then reservation ids into the VMs
    /// they cover. Some clouds require the id in the VM creation call.
    fn reserve_capacity(&mut self) -> Result<()> {
        if self.capacity_reservations.is_empty() {
            return Ok(());
        }
        let options = self.parallel_options(None);
        run_parallel(
            &mut self.capacity_reservations,
            &options,
            |r| r.resource.label(),
            |r| r.resource.create(),
        )?;

        let reserved: Vec<(String, String)> = self
            .capacity_reservations
            .iter()
            .filter_map(|r| r.resource.id().map(|id| (r.group.clone(), id)))
            .collect();
        for (group, reservation_id) in reserved {
            if let Some(indices) = self.vm_groups.get(&group) {
                for &index in indices {
                    self.vms[index]
                        .resource
                        .inner_mut()
                        .set_capacity_reservation_id(reservation_id.clone());
                }
            }
        }
        Ok(())
    }

    /// Stage 2: networks in parallel but deterministic order, then the
    /// peering call. An unsupported peering layout fails before any
    /// network is created.
    fn provision_networks(&mut self) -> Result<()> {
        if self.config.vpc_peering && self.networks.len() != 2 {
            return Err(benchflow_core::ConfigError::UnsupportedPeering(self.networks.len()).into());
        }

        let options = self.parallel_options(None);
        let _guard = self.networks_lock.acquire();
        let mut networks: Vec<_> = self.networks.values_mut().collect();
        run_parallel(&mut networks, &options, |n| n.label(), |n| n.create())?;

        if self.config.vpc_peering {
            // Exactly one peering call per pair, initiated by the network
            // with the smaller key.
            let mut pair = self.networks.values_mut();
            if let (Some(first), Some(second)) = (pair.next(), pair.next()) {
                first.inner_mut().peer(second.inner_mut().as_mut())?;
            }
        }

        for firewall in self.firewalls.values_mut() {
            firewall.create()?;
        }
        Ok(())
    }

    /// Stage 6: the two-phase VM rollout.
    fn provision_vms(&mut self) -> Result<()> {
        let boot_options = self.parallel_options(self.ctx.flags().create_and_boot_post_task_delay);
        run_parallel(
            &mut self.vms,
            &boot_options,
            |vm| vm.resource.label(),
            |vm| {
                vm.resource.create()?;
                let machine = vm.resource.inner_mut();
                machine.allow_remote_access()?;
                machine.wait_for_boot()
            },
        )?;

        // An unmanaged NFS server lives on the run's own VMs; it can only
        // be set up once they are reachable, and must exist before any VM
        // mounts its scratch disks.
        if let Some(nfs) = &mut self.nfs_service {
            if !nfs.managed {
                nfs.resource.create()?;
            }
        }

        let tags = self.resource_tags();
        let options = self.parallel_options(None);
        run_parallel(
            &mut self.vms,
            &options,
            |vm| vm.resource.label(),
            |vm| {
                let RunVm {
                    resource,
                    disk_specs,
                    ..
                } = vm;
                let machine = resource.inner_mut();
                machine.apply_tags(&tags)?;
                machine.create_scratch_disks(disk_specs)?;
                if machine.os_family() == OsFamily::Linux {
                    machine.prepare_environment()?;
                }
                Ok(())
            },
        )?;
        Ok(())
    }

    /// Stage 8: the remaining singleton services, TPUs and the VPN mesh.
    fn provision_services(&mut self, attachments: &[VmAttachment]) -> Result<()> {
        if let Some(db) = &mut self.relational_db {
            db.inner_mut().attach_vms(attachments);
            db.create()?;
        }
        if let Some(db) = &mut self.non_relational_db {
            db.create()?;
        }
        if let Some(spanner) = &mut self.spanner {
            spanner.create()?;
        }

        let options = self.parallel_options(None);
        run_parallel(&mut self.tpus, &options, |t| t.label(), |t| t.create())?;

        if let Some(edw) = &mut self.edw_service {
            edw.create()?;
        }
        if let Some(messaging) = &mut self.messaging_service {
            messaging.inner_mut().attach_vms(attachments);
            messaging.create()?;
        }
        if let Some(discovery) = &mut self.data_discovery_service {
            discovery.create()?;
        }

        if let Some(vpn) = &mut self.vpn_service {
            vpn.create()?;
            {
                let _guard = self.vpn_gateways_lock.acquire();
                let mut gateways: Vec<_> = self.vpn_gateways.values_mut().collect();
                run_parallel(&mut gateways, &options, |g| g.label(), |g| g.create())?;
            }
            let _guard = self.vpns_lock.acquire();
            for tunnel in self.vpns.values_mut() {
                tunnel.create()?;
            }
        }
        Ok(())
    }

    pub(crate) fn parallel_options(&self, post_task_delay: Option<Duration>) -> ParallelOptions {
        ParallelOptions::default()
            .with_max_workers(self.ctx.flags().max_concurrent_workers)
            .with_post_task_delay(post_task_delay)
    }
}

fn classify_failure(err: &RunError) -> Option<&'static str> {
    match err {
        RunError::Cloud(cloud) => classify_cloud(cloud),
        _ => None,
    }
}

fn classify_cloud(err: &CloudError) -> Option<&'static str> {
    match err {
        CloudError::InsufficientCapacity(_) => Some(INSUFFICIENT_CAPACITY),
        CloudError::QuotaExceeded(_) => Some(QUOTA_EXCEEDED),
        CloudError::RetriesExhausted { last, .. } => classify_cloud(last),
        CloudError::Parallel(failures) => failures.0.iter().find_map(|f| classify_cloud(&f.error)),
        _ => None,
    }
}
