//! Cluster connection settings
//!
//! Plain data consumed by [`crate::ClusterClient::from_config`]. Loading
//! these values from files or the environment is the caller's concern.

use crate::error::ProxmoxError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default interval between task status polls
pub const DEFAULT_TASK_POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Default deadline for an asynchronous task to stop
pub const DEFAULT_TASK_TIMEOUT: Duration = Duration::from_secs(30);

/// Connection settings for one Proxmox VE cluster
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterConfig {
    /// Management API URLs, tried in this order
    #[serde(default)]
    pub host_urls: Vec<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    /// API token id, e.g. `sync@pve!name-sync`
    #[serde(default)]
    pub token_id: String,
    #[serde(default)]
    pub secret: String,
    /// Skip TLS certificate verification
    #[serde(default)]
    pub insecure: bool,
    /// Seconds between task status polls
    #[serde(default)]
    pub task_poll_interval: Option<u64>,
    /// Seconds to wait for a task before giving up
    #[serde(default)]
    pub task_timeout: Option<u64>,
}

impl ClusterConfig {
    /// Returns true if both API token fields are set.
    pub fn has_token_auth(&self) -> bool {
        !self.token_id.is_empty() && !self.secret.is_empty()
    }

    /// Returns true if both username and password are set.
    pub fn has_password_auth(&self) -> bool {
        !self.username.is_empty() && !self.password.is_empty()
    }

    /// The credential pair to use; the API token wins when both are complete.
    pub fn credentials(&self) -> Option<Credentials> {
        if self.has_token_auth() {
            Some(Credentials::Token {
                token_id: self.token_id.clone(),
                secret: self.secret.clone(),
            })
        } else if self.has_password_auth() {
            Some(Credentials::Password {
                username: self.username.clone(),
                password: self.password.clone(),
            })
        } else {
            None
        }
    }

    /// Rejects zero task timings.
    pub fn validate_task_policy(&self) -> Result<(), ProxmoxError> {
        if self.task_poll_interval == Some(0) {
            return Err(ProxmoxError::InvalidConfig(
                "taskPollInterval must be at least 1 second".to_string(),
            ));
        }
        if self.task_timeout == Some(0) {
            return Err(ProxmoxError::InvalidConfig(
                "taskTimeout must be at least 1 second".to_string(),
            ));
        }
        Ok(())
    }

    /// Poll interval and deadline for rename tasks.
    pub fn task_policy(&self) -> TaskPolicy {
        TaskPolicy {
            poll_interval: self
                .task_poll_interval
                .map_or(DEFAULT_TASK_POLL_INTERVAL, Duration::from_secs),
            timeout: self
                .task_timeout
                .map_or(DEFAULT_TASK_TIMEOUT, Duration::from_secs),
        }
    }
}

/// How a client authenticates against the API
#[derive(Clone, PartialEq, Eq)]
pub enum Credentials {
    /// API token (`PVEAPIToken` header)
    Token { token_id: String, secret: String },
    /// Username and password, exchanged for a ticket
    Password { username: String, password: String },
}

// Secrets never reach the logs.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Credentials::Token { token_id, .. } => f
                .debug_struct("Token")
                .field("token_id", token_id)
                .field("secret", &"<redacted>")
                .finish(),
            Credentials::Password { username, .. } => f
                .debug_struct("Password")
                .field("username", username)
                .field("password", &"<redacted>")
                .finish(),
        }
    }
}

/// Polling parameters for waiting on an asynchronous task
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskPolicy {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

impl Default for TaskPolicy {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_TASK_POLL_INTERVAL,
            timeout: DEFAULT_TASK_TIMEOUT,
        }
    }
}
