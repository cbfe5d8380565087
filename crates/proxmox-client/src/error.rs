//! Proxmox client errors

use std::time::Duration;
use thiserror::Error;

/// Errors that can occur when talking to a single Proxmox VE endpoint
///
/// Every variant names the endpoint and the operation it belongs to, so a
/// log line is enough to diagnose the failure.
#[derive(Debug, Error)]
pub enum ProxmoxError {
    /// HTTP request/response error
    #[error("HTTP error from {endpoint} during {operation}: {source}")]
    Http {
        endpoint: String,
        operation: String,
        #[source]
        source: reqwest::Error,
    },

    /// Proxmox API returned a non-success status
    #[error("Proxmox API error from {endpoint} during {operation}: {status} - {body}")]
    Api {
        endpoint: String,
        operation: String,
        status: u16,
        body: String,
    },

    /// JSON deserialization error
    #[error("Serialization error from {endpoint} during {operation}: {source}")]
    Serialization {
        endpoint: String,
        operation: String,
        #[source]
        source: serde_json::Error,
    },

    /// Authentication failed (bad token, bad password, expired ticket)
    #[error("Authentication failed against {endpoint}: {message}")]
    Authentication { endpoint: String, message: String },

    /// Resource not found
    #[error("Not found on {endpoint}: {operation}")]
    NotFound { endpoint: String, operation: String },

    /// Invalid client configuration (bad URL, missing credentials)
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// An asynchronous Proxmox task finished with a non-OK exit status
    #[error("Task {upid} failed with exit status {exit_status}")]
    TaskFailed { upid: String, exit_status: String },

    /// An asynchronous Proxmox task was still running at the deadline
    #[error("Task {upid} did not finish within {deadline:?}")]
    TaskTimeout { upid: String, deadline: Duration },

    /// The caller cancelled the operation
    #[error("Operation cancelled: {operation}")]
    Cancelled { operation: String },

    /// No configured endpoint answered the liveness probe
    #[error("No Proxmox endpoint reachable: {}", summarize_failures(.failures))]
    NoEndpointAvailable { failures: Vec<(String, ProxmoxError)> },
}

impl ProxmoxError {
    /// Returns true if the error was caused by caller cancellation.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, ProxmoxError::Cancelled { .. })
    }
}

fn summarize_failures(failures: &[(String, ProxmoxError)]) -> String {
    if failures.is_empty() {
        return "no endpoints configured".to_string();
    }
    failures
        .iter()
        .map(|(endpoint, error)| format!("[{}: {}]", endpoint, error))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Errors surfaced by the cluster-level client.
///
/// Transport failures are collapsed into one of two stable values so callers
/// can decide their retry policy without inspecting transport error shapes.
/// The original transport error stays reachable through `source()`.
#[derive(Debug, Error)]
pub enum ClusterError {
    /// No endpoint reachable, or enumeration of members/guests failed
    #[error("Guest discovery failed: {0}")]
    Discovery(#[source] ProxmoxError),

    /// The rename request failed, or its task failed or timed out
    #[error("Guest mutation failed: {0}")]
    Mutation(#[source] ProxmoxError),
}

impl ClusterError {
    /// The underlying transport error.
    pub fn transport(&self) -> &ProxmoxError {
        match self {
            ClusterError::Discovery(e) | ClusterError::Mutation(e) => e,
        }
    }

    /// Returns true if the operation was abandoned because of cancellation.
    pub fn is_cancelled(&self) -> bool {
        self.transport().is_cancelled()
    }
}
