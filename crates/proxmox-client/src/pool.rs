//! Multi-endpoint cluster client
//!
//! Presents a Proxmox VE cluster as one logical API. Every operation first
//! selects a live endpoint by probing the configured endpoints in order, then
//! works through that endpoint only. There is no health memory between calls.

use crate::client::ProxmoxEndpoint;
use crate::config::{ClusterConfig, TaskPolicy};
use crate::error::{ClusterError, ProxmoxError};
use crate::identity::extract_identity_key;
use crate::models::Guest;
use crate::proxmox_trait::{EndpointTransport, HypervisorClient};
use std::future::Future;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Pool of connections to every endpoint of one cluster
///
/// Built once at startup and read-only afterwards, so it can be shared
/// between concurrent reconciliations behind an `Arc`.
#[derive(Debug)]
pub struct ClusterClient<E = ProxmoxEndpoint> {
    endpoints: Vec<E>,
    task_policy: TaskPolicy,
}

impl ClusterClient<ProxmoxEndpoint> {
    /// Create one endpoint client per configured URL
    ///
    /// Fails when no URL is configured, a URL is invalid, no complete
    /// credential pair is present, or a task timing is zero.
    pub fn from_config(config: &ClusterConfig) -> Result<Self, ProxmoxError> {
        if config.host_urls.is_empty() {
            return Err(ProxmoxError::InvalidConfig(
                "at least one Proxmox URL must be provided".to_string(),
            ));
        }
        config.validate_task_policy()?;
        let credentials = config.credentials().ok_or_else(|| {
            ProxmoxError::InvalidConfig(
                "either API token (tokenId and secret) or credentials (username and password) must be provided"
                    .to_string(),
            )
        })?;

        let endpoints = config
            .host_urls
            .iter()
            .map(|url| ProxmoxEndpoint::new(url, credentials.clone(), config.insecure))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::with_endpoints(endpoints).with_task_policy(config.task_policy()))
    }
}

impl<E: EndpointTransport> ClusterClient<E> {
    /// Create a pool over already-built endpoints, tried in the given order
    pub fn with_endpoints(endpoints: Vec<E>) -> Self {
        Self {
            endpoints,
            task_policy: TaskPolicy::default(),
        }
    }

    /// Override how long rename tasks are awaited
    #[must_use]
    pub fn with_task_policy(mut self, task_policy: TaskPolicy) -> Self {
        self.task_policy = task_policy;
        self
    }

    /// Configured endpoints in probe order
    pub fn endpoints(&self) -> &[E] {
        &self.endpoints
    }

    /// Returns the first endpoint, in configured order, that answers the
    /// liveness probe.
    ///
    /// Fails with [`ProxmoxError::NoEndpointAvailable`] carrying every probe
    /// failure when none answers.
    pub async fn select_endpoint(&self, cancel: &CancellationToken) -> Result<&E, ProxmoxError> {
        let mut failures = Vec::new();

        for endpoint in &self.endpoints {
            match cancellable(cancel, "liveness probe", endpoint.version()).await {
                Ok(version) => {
                    debug!("Using Proxmox endpoint {} (version {})", endpoint.endpoint(), version.version);
                    return Ok(endpoint);
                }
                Err(e) if e.is_cancelled() => return Err(e),
                Err(e) => {
                    warn!("Proxmox endpoint {} failed liveness probe: {}", endpoint.endpoint(), e);
                    failures.push((endpoint.endpoint().to_string(), e));
                }
            }
        }

        Err(ProxmoxError::NoEndpointAvailable { failures })
    }

    /// List every guest in the cluster that carries an identity key
    ///
    /// Guests without configuration, or whose SMBIOS settings have no `uuid=`
    /// token, cannot be matched and are skipped.
    pub async fn list_guests(&self, cancel: &CancellationToken) -> Result<Vec<Guest>, ClusterError> {
        self.discover(cancel).await.map_err(ClusterError::Discovery)
    }

    async fn discover(&self, cancel: &CancellationToken) -> Result<Vec<Guest>, ProxmoxError> {
        let endpoint = self.select_endpoint(cancel).await?;
        let nodes = cancellable(cancel, "list nodes", endpoint.list_nodes()).await?;

        let mut guests = Vec::new();
        for node in &nodes {
            // Guests on an offline member are unreachable until it returns;
            // any other listing failure still fails the whole discovery.
            if node.is_offline() {
                warn!(node = %node.node, "Skipping offline hypervisor node");
                continue;
            }

            let summaries = cancellable(cancel, "list guests", endpoint.list_guests(&node.node)).await?;

            for summary in summaries {
                let config = cancellable(
                    cancel,
                    "get guest config",
                    endpoint.guest_config(&node.node, summary.vmid),
                )
                .await?;

                let Some(config) = config else {
                    info!(vmid = summary.vmid, node = %node.node, "Skipping guest with no configuration");
                    continue;
                };

                let Some(identity_key) = config.smbios1.as_deref().and_then(extract_identity_key) else {
                    info!(vmid = summary.vmid, node = %node.node, "Skipping guest with no uuid");
                    continue;
                };

                let name = config.name.clone().or(summary.name).unwrap_or_default();
                guests.push(Guest {
                    vmid: summary.vmid,
                    name,
                    hypervisor_node: node.node.clone(),
                    identity_key: identity_key.to_string(),
                });
            }
        }

        debug!("Discovered {} guests across {} hypervisor nodes", guests.len(), nodes.len());
        Ok(guests)
    }

    /// Find the guest whose identity key equals `identity_key`
    ///
    /// Scans the full, freshly discovered guest list. If several guests share
    /// the key (e.g. clones with copied SMBIOS settings), the first one in
    /// discovery order is returned and the duplicates are logged.
    pub async fn resolve_by_identity(
        &self,
        identity_key: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Guest>, ClusterError> {
        let guests = self.list_guests(cancel).await?;
        Ok(first_by_identity(guests, identity_key))
    }

    /// Find a guest by display name
    ///
    /// For each guest, in discovery order, tries an exact match, then a
    /// case-insensitive match, then a case-insensitive substring match in
    /// either direction, and returns the first guest satisfying any rule.
    /// Substring matching is ambiguous ("web" matches "web-backup"), which is
    /// why the controller never uses this lookup.
    #[deprecated(note = "name matching is ambiguous; use resolve_by_identity")]
    pub async fn resolve_by_name(
        &self,
        name: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Guest>, ClusterError> {
        let guests = self.list_guests(cancel).await?;
        Ok(guests.into_iter().find(|guest| name_matches(&guest.name, name)))
    }

    /// Rename a guest and wait for the rename task to finish
    ///
    /// The request goes through a live endpoint but addresses the hypervisor
    /// member recorded at discovery time. A task still running after the
    /// policy deadline is reported as a mutation error even though it may
    /// complete later.
    pub async fn rename_guest(
        &self,
        hypervisor_node: &str,
        vmid: u32,
        new_name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ClusterError> {
        self.rename(hypervisor_node, vmid, new_name, cancel)
            .await
            .map_err(ClusterError::Mutation)
    }

    async fn rename(
        &self,
        hypervisor_node: &str,
        vmid: u32,
        new_name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ProxmoxError> {
        let endpoint = self.select_endpoint(cancel).await?;

        info!(vmid, node = hypervisor_node, new_name, "Renaming guest via {}", endpoint.endpoint());
        let upid = cancellable(
            cancel,
            "rename guest",
            endpoint.set_guest_name(hypervisor_node, vmid, new_name),
        )
        .await?;

        cancellable(
            cancel,
            "wait for rename task",
            endpoint.wait_for_task(hypervisor_node, &upid, self.task_policy),
        )
        .await?;

        debug!(vmid, node = hypervisor_node, "Rename task {} finished", upid);
        Ok(())
    }
}

#[async_trait::async_trait]
impl<E: EndpointTransport> HypervisorClient for ClusterClient<E> {
    async fn resolve_by_identity(
        &self,
        identity_key: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Guest>, ClusterError> {
        Self::resolve_by_identity(self, identity_key, cancel).await
    }

    async fn rename_guest(
        &self,
        hypervisor_node: &str,
        vmid: u32,
        new_name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ClusterError> {
        Self::rename_guest(self, hypervisor_node, vmid, new_name, cancel).await
    }
}

/// Races a transport call against cancellation.
async fn cancellable<T, F>(cancel: &CancellationToken, operation: &str, call: F) -> Result<T, ProxmoxError>
where
    F: Future<Output = Result<T, ProxmoxError>>,
{
    tokio::select! {
        biased;
        () = cancel.cancelled() => Err(ProxmoxError::Cancelled {
            operation: operation.to_string(),
        }),
        result = call => result,
    }
}

/// First guest in discovery order with the given identity key.
pub(crate) fn first_by_identity(guests: Vec<Guest>, identity_key: &str) -> Option<Guest> {
    let mut matches = guests.into_iter().filter(|guest| {
        debug!(vmid = guest.vmid, identity = %guest.identity_key, "Checking guest");
        guest.identity_key == identity_key
    });

    let first = matches.next()?;
    let duplicates: Vec<String> = matches
        .map(|guest| format!("{}/{}", guest.hypervisor_node, guest.vmid))
        .collect();
    if !duplicates.is_empty() {
        warn!(
            identity = identity_key,
            chosen = %format!("{}/{}", first.hypervisor_node, first.vmid),
            ?duplicates,
            "Identity key shared by several guests, using the first discovered"
        );
    }
    Some(first)
}

/// Legacy name rules, checked in priority order for one guest.
pub(crate) fn name_matches(guest_name: &str, wanted: &str) -> bool {
    if guest_name == wanted {
        return true;
    }
    let guest_lower = guest_name.to_lowercase();
    let wanted_lower = wanted.to_lowercase();
    if guest_lower == wanted_lower {
        return true;
    }
    // An empty name is a substring of everything.
    if guest_lower.is_empty() || wanted_lower.is_empty() {
        return false;
    }
    guest_lower.contains(&wanted_lower) || wanted_lower.contains(&guest_lower)
}
