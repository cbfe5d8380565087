//! Node Name Sync Controller
//!
//! Keeps the display names of Proxmox VE guests equal to the names of the
//! Kubernetes nodes running inside them. Guests are matched to nodes by
//! SMBIOS UUID, never by name.

mod config;
mod controller;
mod error;
mod node;
mod reconciler;
mod reconciler_test;
mod watcher;

use crate::error::ControllerError;
use controller::Controller;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use watcher::WatchSettings;

#[tokio::main]
async fn main() -> Result<(), ControllerError> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // kube and reqwest both link rustls; pin the process-wide provider to ring
    if rustls::crypto::ring::default_provider().install_default().is_err() {
        debug!("rustls crypto provider already installed");
    }

    info!("Starting Node Name Sync Controller");

    let cluster_config = config::load()?;

    info!("Configuration:");
    info!("  Proxmox URLs: {}", cluster_config.host_urls.join(", "));
    info!(
        "  Authentication: {}",
        if cluster_config.has_token_auth() { "API token" } else { "username/password" }
    );
    info!("  TLS verification: {}", if cluster_config.insecure { "disabled" } else { "enabled" });

    let controller = Controller::new(&cluster_config, WatchSettings::default()).await?;
    controller.run().await?;

    info!("Node Name Sync Controller stopped");
    Ok(())
}
