//! In-memory Proxmox endpoint for pool tests

use crate::error::ProxmoxError;
use crate::models::*;
use crate::proxmox_trait::EndpointTransport;
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct MockGuest {
    node: String,
    summary_name: Option<String>,
    vmid: u32,
    config: Option<GuestConfig>,
}

#[derive(Default)]
struct EndpointState {
    unreachable: Option<String>,
    nodes: Vec<String>,
    offline_nodes: Vec<String>,
    guests: Vec<MockGuest>,
    list_guests_error: Option<String>,
    rename_error: Option<String>,
    // "running" answers before the task reports stopped
    task_running_polls: u32,
    task_exit_status: String,
    task_status_delay: Duration,
    probes: u32,
    discovery_calls: u32,
    task_polls: u32,
    renames: Vec<(String, u32, String)>,
}

/// Mock endpoint for testing the cluster pool
///
/// Cheap to clone; clones share state, so a test can keep a handle after
/// moving the endpoint into a [`crate::ClusterClient`].
#[derive(Clone)]
pub struct MockEndpoint {
    url: String,
    state: Arc<Mutex<EndpointState>>,
}

impl MockEndpoint {
    /// Create a reachable endpoint with no hypervisor nodes
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            state: Arc::new(Mutex::new(EndpointState {
                task_exit_status: "OK".to_string(),
                ..Default::default()
            })),
        }
    }

    /// Make the liveness probe fail with the given message
    pub fn set_unreachable(&self, message: &str) {
        self.state.lock().unwrap().unreachable = Some(message.to_string());
    }

    /// Add a hypervisor node (for test setup)
    pub fn add_node(&self, node: &str) {
        self.state.lock().unwrap().nodes.push(node.to_string());
    }

    /// Report a hypervisor node as offline; listing its guests fails
    pub fn set_node_offline(&self, node: &str) {
        self.state.lock().unwrap().offline_nodes.push(node.to_string());
    }

    /// Add a guest with the given SMBIOS settings (for test setup)
    pub fn add_guest(&self, node: &str, vmid: u32, name: &str, smbios1: Option<&str>) {
        self.state.lock().unwrap().guests.push(MockGuest {
            node: node.to_string(),
            summary_name: Some(name.to_string()),
            vmid,
            config: Some(GuestConfig {
                name: Some(name.to_string()),
                smbios1: smbios1.map(str::to_string),
            }),
        });
    }

    /// Add a guest whose configuration endpoint returns no data (for test setup)
    pub fn add_guest_without_config(&self, node: &str, vmid: u32) {
        self.state.lock().unwrap().guests.push(MockGuest {
            node: node.to_string(),
            vmid,
            ..Default::default()
        });
    }

    /// Make guest listing fail on every node
    pub fn fail_guest_listing(&self, message: &str) {
        self.state.lock().unwrap().list_guests_error = Some(message.to_string());
    }

    /// Make rename submissions fail
    pub fn fail_rename(&self, message: &str) {
        self.state.lock().unwrap().rename_error = Some(message.to_string());
    }

    /// Number of polls answered with "running" before the task stops
    pub fn set_task_running_polls(&self, polls: u32) {
        self.state.lock().unwrap().task_running_polls = polls;
    }

    /// Exit status reported once the task stops
    pub fn set_task_exit_status(&self, exit_status: &str) {
        self.state.lock().unwrap().task_exit_status = exit_status.to_string();
    }

    /// Delay every task status answer by `delay`
    pub fn set_task_status_delay(&self, delay: Duration) {
        self.state.lock().unwrap().task_status_delay = delay;
    }

    /// Liveness probes received
    pub fn probes(&self) -> u32 {
        self.state.lock().unwrap().probes
    }

    /// `list_nodes` calls received
    pub fn discovery_calls(&self) -> u32 {
        self.state.lock().unwrap().discovery_calls
    }

    /// Task status polls received
    pub fn task_polls(&self) -> u32 {
        self.state.lock().unwrap().task_polls
    }

    /// Rename submissions as (node, vmid, new name)
    pub fn renames(&self) -> Vec<(String, u32, String)> {
        self.state.lock().unwrap().renames.clone()
    }

    /// Current name of a guest, if it exists
    pub fn guest_name(&self, node: &str, vmid: u32) -> Option<String> {
        self.state
            .lock()
            .unwrap()
            .guests
            .iter()
            .find(|g| g.node == node && g.vmid == vmid)
            .and_then(|g| g.config.as_ref().and_then(|c| c.name.clone()))
    }

    fn api_error(&self, operation: &str, status: u16, body: &str) -> ProxmoxError {
        ProxmoxError::Api {
            endpoint: self.url.clone(),
            operation: operation.to_string(),
            status,
            body: body.to_string(),
        }
    }
}

#[async_trait::async_trait]
impl EndpointTransport for MockEndpoint {
    fn endpoint(&self) -> &str {
        &self.url
    }

    async fn version(&self) -> Result<VersionInfo, ProxmoxError> {
        let mut state = self.state.lock().unwrap();
        state.probes += 1;
        match &state.unreachable {
            Some(message) => Err(self.api_error("version", 503, message)),
            None => Ok(VersionInfo {
                version: "8.2.4".to_string(),
            }),
        }
    }

    async fn list_nodes(&self) -> Result<Vec<NodeSummary>, ProxmoxError> {
        let mut state = self.state.lock().unwrap();
        state.discovery_calls += 1;
        Ok(state
            .nodes
            .iter()
            .map(|node| NodeSummary {
                node: node.clone(),
                status: Some(if state.offline_nodes.contains(node) { "offline" } else { "online" }.to_string()),
            })
            .collect())
    }

    async fn list_guests(&self, node: &str) -> Result<Vec<GuestSummary>, ProxmoxError> {
        let state = self.state.lock().unwrap();
        if state.offline_nodes.iter().any(|n| n == node) {
            return Err(self.api_error(&format!("list guests on {}", node), 595, "no route to host"));
        }
        if let Some(message) = &state.list_guests_error {
            return Err(self.api_error(&format!("list guests on {}", node), 500, message));
        }
        Ok(state
            .guests
            .iter()
            .filter(|g| g.node == node)
            .map(|g| GuestSummary {
                vmid: g.vmid,
                name: g.summary_name.clone(),
            })
            .collect())
    }

    async fn guest_config(&self, node: &str, vmid: u32) -> Result<Option<GuestConfig>, ProxmoxError> {
        let state = self.state.lock().unwrap();
        state
            .guests
            .iter()
            .find(|g| g.node == node && g.vmid == vmid)
            .map(|g| g.config.clone())
            .ok_or_else(|| ProxmoxError::NotFound {
                endpoint: self.url.clone(),
                operation: format!("get config of guest {} on {}", vmid, node),
            })
    }

    async fn set_guest_name(&self, node: &str, vmid: u32, name: &str) -> Result<Upid, ProxmoxError> {
        let mut state = self.state.lock().unwrap();
        if let Some(message) = state.rename_error.clone() {
            return Err(self.api_error(&format!("rename guest {} on {}", vmid, node), 500, &message));
        }
        state.renames.push((node.to_string(), vmid, name.to_string()));

        let guest = state
            .guests
            .iter_mut()
            .find(|g| g.node == node && g.vmid == vmid)
            .ok_or_else(|| ProxmoxError::NotFound {
                endpoint: self.url.clone(),
                operation: format!("rename guest {} on {}", vmid, node),
            })?;
        if let Some(config) = guest.config.as_mut() {
            config.name = Some(name.to_string());
        }
        guest.summary_name = Some(name.to_string());

        Ok(Upid(format!("UPID:{}:0000{:04X}:qmconfig:{}:root@pam:", node, vmid, vmid)))
    }

    async fn task_status(&self, _node: &str, _upid: &Upid) -> Result<TaskStatus, ProxmoxError> {
        let delay = {
            let mut state = self.state.lock().unwrap();
            state.task_polls += 1;
            state.task_status_delay
        };
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        if state.task_running_polls > 0 {
            state.task_running_polls -= 1;
            return Ok(TaskStatus {
                status: "running".to_string(),
                exitstatus: None,
            });
        }
        Ok(TaskStatus {
            status: "stopped".to_string(),
            exitstatus: Some(state.task_exit_status.clone()),
        })
    }
}
