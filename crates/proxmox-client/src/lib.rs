//! Proxmox VE Cluster Client
//!
//! A Rust client library that presents a multi-endpoint Proxmox VE cluster as
//! one logical API for guest discovery, identity resolution and renaming.
//!
//! # Example
//!
//! ```no_run
//! use proxmox_client::{ClusterClient, ClusterConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ClusterConfig {
//!     host_urls: vec![
//!         "https://pve1:8006".to_string(),
//!         "https://pve2:8006".to_string(),
//!     ],
//!     token_id: "sync@pve!name-sync".to_string(),
//!     secret: "your-api-token-secret".to_string(),
//!     ..Default::default()
//! };
//! let client = ClusterClient::from_config(&config)?;
//! let cancel = CancellationToken::new();
//!
//! // Find the guest whose SMBIOS UUID matches a node's system UUID
//! if let Some(guest) = client
//!     .resolve_by_identity("3b9a6d0e-1f2c-4d5e-8f90-a1b2c3d4e5f6", &cancel)
//!     .await?
//! {
//!     // Rename it and wait for the Proxmox task to finish
//!     client
//!         .rename_guest(&guest.hypervisor_node, guest.vmid, "worker-01", &cancel)
//!         .await?;
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Features
//!
//! - **Endpoint failover**: every operation probes endpoints in order and uses
//!   the first live one
//! - **Identity matching**: guests are keyed by their SMBIOS UUID
//! - **Task completion**: renames wait for the asynchronous Proxmox task
//! - **Cancellation**: every operation can be abandoned through a
//!   `CancellationToken`

pub mod client;
mod client_test;
pub mod common;
pub mod config;
pub mod error;
pub mod identity;
pub mod models;
pub mod pool;
#[path = "trait.rs"]
pub mod proxmox_trait;
#[cfg(any(test, feature = "test-util"))]
pub mod mock;

pub use client::ProxmoxEndpoint;
pub use common::HttpClient;
pub use config::{ClusterConfig, Credentials, TaskPolicy};
pub use error::{ClusterError, ProxmoxError};
pub use identity::extract_identity_key;
pub use models::*;
pub use pool::ClusterClient;
pub use proxmox_trait::{EndpointTransport, HypervisorClient};
#[cfg(any(test, feature = "test-util"))]
pub use mock::{MockEndpoint, MockHypervisorClient, RenameCall};
