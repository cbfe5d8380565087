//! Mock clients for unit testing
//!
//! This module provides in-memory implementations of the client traits that
//! can be used in unit tests without a running Proxmox VE cluster:
//! - `MockHypervisorClient` - cluster-level double for controller tests
//! - `endpoint.rs` - `MockEndpoint`, a single-endpoint double for pool tests

mod endpoint;

pub use endpoint::MockEndpoint;

use crate::error::{ClusterError, ProxmoxError};
use crate::models::Guest;
use crate::pool::first_by_identity;
use crate::proxmox_trait::HypervisorClient;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;

const MOCK_ENDPOINT: &str = "mock://proxmox";

/// A recorded `rename_guest` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenameCall {
    pub hypervisor_node: String,
    pub vmid: u32,
    pub new_name: String,
}

/// Mock HypervisorClient for testing
///
/// Stores guests in memory. Successful renames are applied to the stored
/// guests, so a second lookup observes the new name.
#[derive(Clone, Default)]
pub struct MockHypervisorClient {
    guests: Arc<Mutex<Vec<Guest>>>,
    discovery_error: Arc<Mutex<Option<String>>>,
    mutation_error: Arc<Mutex<Option<String>>>,
    renames: Arc<Mutex<Vec<RenameCall>>>,
    resolve_calls: Arc<Mutex<u32>>,
}

impl MockHypervisorClient {
    /// Create an empty mock client
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a guest to the mock store (for test setup)
    pub fn add_guest(&self, vmid: u32, name: &str, hypervisor_node: &str, identity_key: &str) {
        self.guests.lock().unwrap().push(Guest {
            vmid,
            name: name.to_string(),
            hypervisor_node: hypervisor_node.to_string(),
            identity_key: identity_key.to_string(),
        });
    }

    /// Make every lookup fail as if no endpoint were reachable
    pub fn fail_discovery(&self, message: &str) {
        *self.discovery_error.lock().unwrap() = Some(message.to_string());
    }

    /// Make every rename fail as if the rename task had failed
    pub fn fail_mutation(&self, message: &str) {
        *self.mutation_error.lock().unwrap() = Some(message.to_string());
    }

    /// Snapshot of the stored guests
    pub fn guests(&self) -> Vec<Guest> {
        self.guests.lock().unwrap().clone()
    }

    /// Every rename call received, in order
    pub fn renames(&self) -> Vec<RenameCall> {
        self.renames.lock().unwrap().clone()
    }

    /// Number of `resolve_by_identity` calls received
    pub fn resolve_calls(&self) -> u32 {
        *self.resolve_calls.lock().unwrap()
    }
}

#[async_trait::async_trait]
impl HypervisorClient for MockHypervisorClient {
    async fn resolve_by_identity(
        &self,
        identity_key: &str,
        cancel: &CancellationToken,
    ) -> Result<Option<Guest>, ClusterError> {
        *self.resolve_calls.lock().unwrap() += 1;

        if cancel.is_cancelled() {
            return Err(ClusterError::Discovery(ProxmoxError::Cancelled {
                operation: "resolve guest".to_string(),
            }));
        }

        if let Some(message) = self.discovery_error.lock().unwrap().clone() {
            return Err(ClusterError::Discovery(ProxmoxError::Api {
                endpoint: MOCK_ENDPOINT.to_string(),
                operation: "list nodes".to_string(),
                status: 503,
                body: message,
            }));
        }

        Ok(first_by_identity(self.guests(), identity_key))
    }

    async fn rename_guest(
        &self,
        hypervisor_node: &str,
        vmid: u32,
        new_name: &str,
        cancel: &CancellationToken,
    ) -> Result<(), ClusterError> {
        self.renames.lock().unwrap().push(RenameCall {
            hypervisor_node: hypervisor_node.to_string(),
            vmid,
            new_name: new_name.to_string(),
        });

        if cancel.is_cancelled() {
            return Err(ClusterError::Mutation(ProxmoxError::Cancelled {
                operation: "rename guest".to_string(),
            }));
        }

        if let Some(message) = self.mutation_error.lock().unwrap().clone() {
            return Err(ClusterError::Mutation(ProxmoxError::TaskFailed {
                upid: format!("UPID:{}:{}", hypervisor_node, vmid),
                exit_status: message,
            }));
        }

        let mut guests = self.guests.lock().unwrap();
        match guests
            .iter_mut()
            .find(|guest| guest.hypervisor_node == hypervisor_node && guest.vmid == vmid)
        {
            Some(guest) => {
                guest.name = new_name.to_string();
                Ok(())
            }
            None => Err(ClusterError::Mutation(ProxmoxError::NotFound {
                endpoint: MOCK_ENDPOINT.to_string(),
                operation: format!("rename guest {} on {}", vmid, hypervisor_node),
            })),
        }
    }
}
