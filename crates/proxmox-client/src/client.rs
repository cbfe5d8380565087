//! Proxmox VE endpoint client
//!
//! Implements the per-endpoint API operations on top of [`HttpClient`].
//! Paths follow the Proxmox VE API: `/nodes`, `/nodes/{node}/qemu`,
//! `/nodes/{node}/qemu/{vmid}/config`, `/nodes/{node}/tasks/{upid}/status`.

use crate::common::HttpClient;
use crate::config::Credentials;
use crate::error::ProxmoxError;
use crate::models::*;
use crate::proxmox_trait::EndpointTransport;
use tracing::debug;

/// Client for one Proxmox VE management endpoint
#[derive(Debug)]
pub struct ProxmoxEndpoint {
    http: HttpClient,
    url: String,
}

impl ProxmoxEndpoint {
    /// Create a new endpoint client
    ///
    /// # Arguments
    /// * `url` - Endpoint URL (e.g., "https://pve1:8006")
    /// * `credentials` - API token or username/password
    /// * `insecure` - Skip TLS certificate verification
    pub fn new(url: &str, credentials: Credentials, insecure: bool) -> Result<Self, ProxmoxError> {
        Ok(Self {
            http: HttpClient::new(url, credentials, insecure)?,
            url: url.to_string(),
        })
    }

    /// Get the base URL including the API prefix
    pub fn base_url(&self) -> &str {
        self.http.base_url()
    }
}

#[async_trait::async_trait]
impl EndpointTransport for ProxmoxEndpoint {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn version(&self) -> Result<VersionInfo, ProxmoxError> {
        self.http.get("/version", "version").await
    }

    async fn list_nodes(&self) -> Result<Vec<NodeSummary>, ProxmoxError> {
        debug!("Listing hypervisor nodes via {}", self.url);
        self.http.get("/nodes", "list nodes").await
    }

    async fn list_guests(&self, node: &str) -> Result<Vec<GuestSummary>, ProxmoxError> {
        let path = format!("/nodes/{}/qemu", urlencoding::encode(node));
        self.http
            .get(&path, &format!("list guests on {}", node))
            .await
    }

    async fn guest_config(&self, node: &str, vmid: u32) -> Result<Option<GuestConfig>, ProxmoxError> {
        let path = format!("/nodes/{}/qemu/{}/config", urlencoding::encode(node), vmid);
        self.http
            .get(&path, &format!("get config of guest {} on {}", vmid, node))
            .await
    }

    async fn set_guest_name(&self, node: &str, vmid: u32, name: &str) -> Result<Upid, ProxmoxError> {
        // POST (unlike PUT) applies the change through a task and returns its UPID.
        let path = format!("/nodes/{}/qemu/{}/config", urlencoding::encode(node), vmid);
        self.http
            .post_form(&path, &[("name", name)], &format!("rename guest {} on {}", vmid, node))
            .await
    }

    async fn task_status(&self, node: &str, upid: &Upid) -> Result<TaskStatus, ProxmoxError> {
        let path = format!(
            "/nodes/{}/tasks/{}/status",
            urlencoding::encode(node),
            urlencoding::encode(&upid.0)
        );
        self.http
            .get(&path, &format!("get status of task {}", upid))
            .await
    }
}
