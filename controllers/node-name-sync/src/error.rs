//! Controller-specific error types.
//!
//! Hypervisor failures arrive here already collapsed into the two stable
//! values `Discovery` and `Mutation`; the transport detail is logged where the
//! failure happens and does not leak into the retry policy.

use crate::config::ConfigError;
use kube::Error as KubeError;
use proxmox_client::{ClusterError, ProxmoxError};
use thiserror::Error;

/// Errors that can occur in the Node Name Sync Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// Guests could not be listed on any endpoint
    #[error("Proxmox guest discovery failed")]
    Discovery,

    /// Guest rename failed, or its task failed or timed out
    #[error("Proxmox guest rename failed")]
    Mutation,

    /// Reconciliation abandoned because the controller is shutting down
    #[error("Reconciliation cancelled")]
    Cancelled,

    /// Invalid configuration (startup only)
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),

    /// Proxmox client could not be built (startup only)
    #[error("Proxmox client error: {0}")]
    Proxmox(#[from] ProxmoxError),

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),
}

impl From<ClusterError> for ControllerError {
    fn from(error: ClusterError) -> Self {
        match error {
            ClusterError::Discovery(_) => ControllerError::Discovery,
            ClusterError::Mutation(_) => ControllerError::Mutation,
        }
    }
}
