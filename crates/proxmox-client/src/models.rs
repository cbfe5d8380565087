//! Proxmox VE API models
//!
//! These models match the JSON returned by the Proxmox VE REST API
//! (`/api2/json/...`). Only the fields this crate reads are modelled.

use serde::{Deserialize, Deserializer, Serialize};
use std::fmt;

/// Proxmox API response wrapper; every payload is nested under `data`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataEnvelope<T> {
    pub data: T,
}

/// Response of `GET /version`, used as the liveness probe
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct VersionInfo {
    pub version: String,
}

/// A hypervisor cluster member as listed by `GET /nodes`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSummary {
    pub node: String,
    #[serde(default)]
    pub status: Option<String>, // "online", "offline", "unknown"
}

impl NodeSummary {
    /// Whether the cluster reports this member as offline.
    pub fn is_offline(&self) -> bool {
        self.status.as_deref() == Some("offline")
    }
}

/// A QEMU guest as listed by `GET /nodes/{node}/qemu`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuestSummary {
    #[serde(deserialize_with = "deserialize_vmid")]
    pub vmid: u32,
    #[serde(default)]
    pub name: Option<String>,
}

/// Guest configuration from `GET /nodes/{node}/qemu/{vmid}/config`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GuestConfig {
    #[serde(default)]
    pub name: Option<String>,
    /// SMBIOS type 1 settings, e.g. `uuid=0f6c...,manufacturer=QEMU`
    #[serde(default)]
    pub smbios1: Option<String>,
}

/// Status of an asynchronous task, from `GET /nodes/{node}/tasks/{upid}/status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskStatus {
    /// "running" or "stopped"
    pub status: String,
    /// Only set once the task has stopped; "OK" on success
    #[serde(default)]
    pub exitstatus: Option<String>,
}

impl TaskStatus {
    /// Whether the task has reached a terminal state.
    pub fn is_stopped(&self) -> bool {
        self.status == "stopped"
    }

    /// Whether the task stopped with exit status `OK`.
    pub fn is_ok(&self) -> bool {
        self.is_stopped() && self.exitstatus.as_deref() == Some("OK")
    }
}

/// Unique Proxmox task identifier returned by asynchronous operations
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Upid(pub String);

impl fmt::Display for Upid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Response of `POST /access/ticket`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TicketResponse {
    pub ticket: String,
    #[serde(rename = "CSRFPreventionToken")]
    pub csrf_prevention_token: String,
}

/// A discovered guest that can be matched to a cluster node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guest {
    /// VMID, unique within one hypervisor cluster member only
    pub vmid: u32,
    /// Display name, the value kept in sync with the node name
    pub name: String,
    /// Hypervisor member that hosted the guest at discovery time
    pub hypervisor_node: String,
    /// SMBIOS UUID of the guest
    pub identity_key: String,
}

// Proxmox returns vmid as a number on most endpoints, but some versions
// serialize it as a string.
fn deserialize_vmid<'de, D>(deserializer: D) -> Result<u32, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Vmid {
        Number(u32),
        Text(String),
    }

    match Vmid::deserialize(deserializer)? {
        Vmid::Number(n) => Ok(n),
        Vmid::Text(s) => s.parse().map_err(serde::de::Error::custom),
    }
}
