//! Resource contract and lifecycle state machine
//!
//! Every provisionable cloud entity implements [`Resource`]; the
//! [`Managed`] wrapper drives the shared state machine around it:
//!
//! ```text
//! Absent -> Creating -> Exists -> Deleting -> Deleted
//!              |
//!              v
//!        CreationFailed
//! ```
//!
//! Creation is idempotent against flaky control planes: every attempt
//! resends the same process-unique idempotency token, so a duplicated
//! request is deduplicated server-side. The token is only regenerated when
//! a failure is known to be safely restartable because a dependency was
//! replaced first (for example a new dedicated host was provisioned).

use crate::error::{CloudError, Result};
use crate::retry::RetryPolicy;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound on fresh-token creation retries. The original harness
/// regenerated tokens without a documented bound; a fourth regeneration
/// request fails the creation outright.
pub const MAX_TOKEN_REGENERATIONS: u32 = 3;

/// Every kind of resource the orchestrator can own.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceKind {
    Vm,
    Network,
    Firewall,
    PlacementGroup,
    CapacityReservation,
    ContainerCluster,
    ContainerRegistry,
    DpbService,
    RelationalDb,
    NonRelationalDb,
    Spanner,
    EdwService,
    NfsService,
    SmbService,
    Tpu,
    MessagingService,
    DataDiscoveryService,
    VpnService,
    VpnGateway,
    Vpn,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ResourceKind::Vm => "vm",
            ResourceKind::Network => "network",
            ResourceKind::Firewall => "firewall",
            ResourceKind::PlacementGroup => "placement_group",
            ResourceKind::CapacityReservation => "capacity_reservation",
            ResourceKind::ContainerCluster => "container_cluster",
            ResourceKind::ContainerRegistry => "container_registry",
            ResourceKind::DpbService => "dpb_service",
            ResourceKind::RelationalDb => "relational_db",
            ResourceKind::NonRelationalDb => "non_relational_db",
            ResourceKind::Spanner => "spanner",
            ResourceKind::EdwService => "edw_service",
            ResourceKind::NfsService => "nfs_service",
            ResourceKind::SmbService => "smb_service",
            ResourceKind::Tpu => "tpu",
            ResourceKind::MessagingService => "messaging_service",
            ResourceKind::DataDiscoveryService => "data_discovery_service",
            ResourceKind::VpnService => "vpn_service",
            ResourceKind::VpnGateway => "vpn_gateway",
            ResourceKind::Vpn => "vpn",
        };
        write!(f, "{name}")
    }
}

/// Lifecycle state of a managed resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceState {
    Absent,
    Creating,
    Exists,
    Deleting,
    Deleted,
    CreationFailed,
}

impl std::fmt::Display for ResourceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceState::Absent => write!(f, "absent"),
            ResourceState::Creating => write!(f, "creating"),
            ResourceState::Exists => write!(f, "exists"),
            ResourceState::Deleting => write!(f, "deleting"),
            ResourceState::Deleted => write!(f, "deleted"),
            ResourceState::CreationFailed => write!(f, "creation_failed"),
        }
    }
}

/// Identity of one run VM offered to a service resource for adoption.
///
/// Services that run against the run's own machines (messaging brokers,
/// client-server databases, self-provisioned clusters) receive these before
/// their creation call.
#[derive(Debug, Clone)]
pub struct VmAttachment {
    /// Name of the VM group the machine belongs to.
    pub group: String,
    pub label: String,
    pub zone: String,
    pub ip_address: Option<String>,
}

/// Status reported by a provider's status query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResourceStatus {
    Exists,
    /// Still changing; poll again.
    Transitional,
    Deleted,
    /// The implementation cannot classify the reported status.
    Unknown,
}

/// Contract every provisionable cloud entity implements.
///
/// Implementations issue the raw provider calls; all retry, polling, token
/// and state bookkeeping lives in [`Managed`]. `issue_create` must be safe
/// to repeat with the same token without duplicating the resource.
pub trait Resource: Send {
    fn kind(&self) -> ResourceKind;

    /// Human-readable identity used in logs and aggregate failures.
    fn label(&self) -> String;

    /// Provider-assigned identity; `None` until creation succeeded far
    /// enough for the provider to assign one.
    fn id(&self) -> Option<String>;

    /// Re-attaches a provider identity recorded in a run snapshot.
    fn restore_id(&mut self, id: String);

    /// Issues the provisioning call, resending `token` for deduplication.
    fn issue_create(&mut self, token: &str) -> Result<()>;

    /// Queries the provider for the resource's current status.
    fn query_status(&mut self) -> Result<ResourceStatus>;

    /// Issues the deletion call.
    fn issue_delete(&mut self) -> Result<()>;

    /// Creates secondary co-resources that must exist before the primary
    /// creation call (dedicated hosts, imported key material, images).
    fn create_dependencies(&mut self) -> Result<()> {
        Ok(())
    }

    /// Tears down whatever `create_dependencies` made.
    fn delete_dependencies(&mut self) -> Result<()> {
        Ok(())
    }

    /// Discovers attributes that only exist after creation (addresses,
    /// final placement). Retried by policy; raise
    /// [`CloudError::RetryableCreation`] while an attribute is not ready.
    fn post_create(&mut self) -> Result<()> {
        Ok(())
    }

    /// Offers the run's booted VMs to the resource before its creation
    /// call. Implementations that operate on the run's own machines keep
    /// what they need; the default ignores the offer.
    fn attach_vms(&mut self, _vms: &[VmAttachment]) {}
}

impl<R: Resource + ?Sized> Resource for Box<R> {
    fn kind(&self) -> ResourceKind {
        (**self).kind()
    }

    fn label(&self) -> String {
        (**self).label()
    }

    fn id(&self) -> Option<String> {
        (**self).id()
    }

    fn restore_id(&mut self, id: String) {
        (**self).restore_id(id);
    }

    fn issue_create(&mut self, token: &str) -> Result<()> {
        (**self).issue_create(token)
    }

    fn query_status(&mut self) -> Result<ResourceStatus> {
        (**self).query_status()
    }

    fn issue_delete(&mut self) -> Result<()> {
        (**self).issue_delete()
    }

    fn create_dependencies(&mut self) -> Result<()> {
        (**self).create_dependencies()
    }

    fn delete_dependencies(&mut self) -> Result<()> {
        (**self).delete_dependencies()
    }

    fn post_create(&mut self) -> Result<()> {
        (**self).post_create()
    }

    fn attach_vms(&mut self, vms: &[VmAttachment]) {
        (**self).attach_vms(vms);
    }
}

/// A resource plus the lifecycle bookkeeping the contract requires.
#[derive(Debug)]
pub struct Managed<R> {
    inner: R,
    state: ResourceState,
    token: String,
    token_regenerations: u32,
    retry_policy: RetryPolicy,
    poll_policy: RetryPolicy,
}

impl<R: Resource> Managed<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            state: ResourceState::Absent,
            token: Uuid::new_v4().to_string(),
            token_regenerations: 0,
            retry_policy: RetryPolicy::transient(),
            poll_policy: RetryPolicy::status_poll(),
        }
    }

    pub fn with_policies(mut self, retry_policy: RetryPolicy, poll_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self.poll_policy = poll_policy;
        self
    }

    pub fn inner(&self) -> &R {
        &self.inner
    }

    pub fn inner_mut(&mut self) -> &mut R {
        &mut self.inner
    }

    pub fn state(&self) -> ResourceState {
        self.state
    }

    pub fn id(&self) -> Option<String> {
        self.inner.id()
    }

    pub fn kind(&self) -> ResourceKind {
        self.inner.kind()
    }

    pub fn label(&self) -> String {
        self.inner.label()
    }

    /// The idempotency token the next creation attempt will carry.
    pub fn token(&self) -> &str {
        &self.token
    }

    /// Re-applies identity and state captured in a run snapshot.
    pub fn restore(&mut self, id: Option<String>, state: ResourceState, token: String) {
        if let Some(id) = id {
            self.inner.restore_id(id);
        }
        self.state = state;
        self.token = token;
    }

    /// Creates the resource and waits until the control plane reports it
    /// stable.
    ///
    /// Transient failures are retried with the same token; a failure
    /// classified as restartable regenerates the token (bounded by
    /// [`MAX_TOKEN_REGENERATIONS`]); capacity, quota and unknown-status
    /// failures propagate typed and leave the resource `CreationFailed`.
    pub fn create(&mut self) -> Result<()> {
        match self.state {
            ResourceState::Exists => return Ok(()),
            ResourceState::Deleting | ResourceState::Deleted => {
                return Err(CloudError::CreationFailed(format!(
                    "{} was already deleted",
                    self.inner.label()
                )));
            }
            _ => {}
        }

        self.inner.create_dependencies().inspect_err(|_| {
            self.state = ResourceState::CreationFailed;
        })?;
        self.state = ResourceState::Creating;
        tracing::info!("creating {} {}", self.inner.kind(), self.inner.label());

        if let Err(err) = self.issue_create_with_retries() {
            self.state = ResourceState::CreationFailed;
            return Err(err);
        }

        match self.wait_for_existence() {
            Ok(true) => {}
            Ok(false) => {
                self.state = ResourceState::CreationFailed;
                return Err(CloudError::CreationFailed(format!(
                    "{} never became visible after creation",
                    self.inner.label()
                )));
            }
            Err(err) => {
                self.state = ResourceState::CreationFailed;
                return Err(err);
            }
        }

        let Self { inner, retry_policy, .. } = self;
        if let Err(err) = retry_policy.call(|| inner.post_create()) {
            self.state = ResourceState::CreationFailed;
            return Err(err);
        }

        self.state = ResourceState::Exists;
        tracing::info!("created {} {}", self.inner.kind(), self.inner.label());
        Ok(())
    }

    /// Whether the resource currently exists, polling through transitional
    /// statuses until the answer is stable. Unknown statuses are fatal.
    pub fn exists(&mut self) -> Result<bool> {
        let Self { inner, poll_policy, .. } = self;
        poll_policy.poll(|| match inner.query_status()? {
            ResourceStatus::Exists => Ok(true),
            ResourceStatus::Deleted => Ok(false),
            ResourceStatus::Transitional => {
                Err(CloudError::Transitional(inner.label()))
            }
            ResourceStatus::Unknown => Err(CloudError::UnknownStatus(inner.label())),
        })
    }

    /// Deletes the resource.
    ///
    /// A resource that never received a provider identity makes this a
    /// no-op rather than an error: there is nothing to delete. Once the
    /// resource is `Deleted`, further calls return immediately.
    pub fn delete(&mut self) -> Result<()> {
        if self.state == ResourceState::Deleted {
            return Ok(());
        }
        if self.inner.id().is_none() {
            tracing::debug!(
                "{} {} was never created, skipping delete",
                self.inner.kind(),
                self.inner.label()
            );
            self.state = ResourceState::Deleted;
            return Ok(());
        }

        self.state = ResourceState::Deleting;
        tracing::info!("deleting {} {}", self.inner.kind(), self.inner.label());

        let Self { inner, retry_policy, poll_policy, .. } = self;
        retry_policy.call(|| inner.issue_delete())?;

        // Both "exists" and "transitional" mean the delete has not landed
        // yet; keep polling until the resource is gone.
        poll_policy.poll(|| match inner.query_status()? {
            ResourceStatus::Deleted => Ok(()),
            ResourceStatus::Exists | ResourceStatus::Transitional => {
                Err(CloudError::Transitional(inner.label()))
            }
            ResourceStatus::Unknown => Err(CloudError::UnknownStatus(inner.label())),
        })?;

        self.inner.delete_dependencies()?;
        self.state = ResourceState::Deleted;
        tracing::info!("deleted {} {}", self.inner.kind(), self.inner.label());
        Ok(())
    }

    fn issue_create_with_retries(&mut self) -> Result<()> {
        let mut attempt: u32 = 0;
        loop {
            match self.inner.issue_create(&self.token) {
                Ok(()) => return Ok(()),
                Err(CloudError::RetryableCreationWithNewToken(reason)) => {
                    if self.token_regenerations >= MAX_TOKEN_REGENERATIONS {
                        return Err(CloudError::CreationFailed(format!(
                            "{}: gave up after {} fresh-token retries: {}",
                            self.inner.label(),
                            MAX_TOKEN_REGENERATIONS,
                            reason
                        )));
                    }
                    self.token_regenerations += 1;
                    self.token = Uuid::new_v4().to_string();
                    tracing::warn!(
                        "{} creation restarting with a fresh token ({}): {}",
                        self.inner.label(),
                        self.token_regenerations,
                        reason
                    );
                }
                Err(err) if err.is_retryable() => {
                    attempt += 1;
                    if let Some(max) = self.retry_policy.max_attempts {
                        if attempt >= max {
                            return Err(CloudError::RetriesExhausted {
                                attempts: attempt,
                                last: Box::new(err),
                            });
                        }
                    }
                    tracing::debug!(
                        "{} creation attempt {} failed, retrying: {}",
                        self.inner.label(),
                        attempt,
                        err
                    );
                    std::thread::sleep(self.retry_policy.delay_for_attempt(attempt - 1));
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Polls until the resource is visibly present. "Not found yet" right
    /// after a create is eventual consistency, not absence, so a deleted
    /// status re-polls like a transitional one here.
    fn wait_for_existence(&mut self) -> Result<bool> {
        let Self { inner, poll_policy, .. } = self;
        poll_policy.poll(|| match inner.query_status()? {
            ResourceStatus::Exists => Ok(true),
            ResourceStatus::Transitional | ResourceStatus::Deleted => {
                Err(CloudError::Transitional(inner.label()))
            }
            ResourceStatus::Unknown => Err(CloudError::UnknownStatus(inner.label())),
        })
    }
}
