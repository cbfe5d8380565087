//! Controller configuration loading.
//!
//! Connection settings come from a YAML file when `PROXMOX_CONFIG_PATH` is
//! set, otherwise from individual environment variables. Either way the
//! result must name at least one URL and one complete credential pair.

use proxmox_client::{ClusterConfig, ProxmoxError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Path to a YAML file holding a [`ClusterConfig`]
pub const CONFIG_PATH_VAR: &str = "PROXMOX_CONFIG_PATH";
/// Comma separated list of API URLs, tried in order
pub const URLS_VAR: &str = "PROXMOX_URLS";
/// Single API URL, used when `PROXMOX_URLS` is unset
pub const URL_VAR: &str = "PROXMOX_URL";
pub const INSECURE_VAR: &str = "PROXMOX_INSECURE";
pub const TOKEN_ID_VAR: &str = "PROXMOX_TOKEN_ID";
pub const SECRET_VAR: &str = "PROXMOX_SECRET";
pub const USERNAME_VAR: &str = "PROXMOX_USERNAME";
pub const PASSWORD_VAR: &str = "PROXMOX_PASSWORD";

/// Configuration errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid boolean for {var}: {value:?}")]
    InvalidBool { var: &'static str, value: String },

    #[error("At least one Proxmox URL is required (set PROXMOX_URLS or PROXMOX_URL)")]
    MissingUrls,

    #[error("Invalid task timing: {0}")]
    TaskPolicy(#[source] ProxmoxError),

    #[error("Proxmox credentials are required: set PROXMOX_TOKEN_ID/PROXMOX_SECRET or PROXMOX_USERNAME/PROXMOX_PASSWORD")]
    MissingCredentials,
}

/// Loads configuration from the process environment.
pub fn load() -> Result<ClusterConfig, ConfigError> {
    let vars: HashMap<String, String> = std::env::vars().collect();
    load_from(&vars)
}

/// Loads configuration from the given variables, preferring the YAML file.
pub fn load_from(vars: &HashMap<String, String>) -> Result<ClusterConfig, ConfigError> {
    match vars.get(CONFIG_PATH_VAR).filter(|path| !path.trim().is_empty()) {
        Some(path) => load_file(Path::new(path.trim())),
        None => from_env_map(vars),
    }
}

/// Reads and validates a YAML config file.
pub fn load_file(path: &Path) -> Result<ClusterConfig, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let config: ClusterConfig = serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })?;
    validate(&config)?;
    Ok(config)
}

/// Builds configuration from environment-style variables.
pub fn from_env_map(vars: &HashMap<String, String>) -> Result<ClusterConfig, ConfigError> {
    let get = |key: &str| vars.get(key).map(|v| v.trim().to_string()).unwrap_or_default();

    let host_urls = match vars.get(URLS_VAR).filter(|v| !v.trim().is_empty()) {
        Some(list) => split_urls(list),
        None => split_urls(&get(URL_VAR)),
    };

    let insecure = match vars.get(INSECURE_VAR).map(|v| v.trim()) {
        None | Some("") => false,
        Some(value) => parse_bool(value).ok_or_else(|| ConfigError::InvalidBool {
            var: INSECURE_VAR,
            value: value.to_string(),
        })?,
    };

    let config = ClusterConfig {
        host_urls,
        username: get(USERNAME_VAR),
        password: get(PASSWORD_VAR),
        token_id: get(TOKEN_ID_VAR),
        secret: get(SECRET_VAR),
        insecure,
        task_poll_interval: None,
        task_timeout: None,
    };
    validate(&config)?;
    Ok(config)
}

/// Checks that the config names an endpoint, a usable credential pair and
/// non-zero task timings.
pub fn validate(config: &ClusterConfig) -> Result<(), ConfigError> {
    if config.host_urls.iter().all(|url| url.trim().is_empty()) {
        return Err(ConfigError::MissingUrls);
    }
    if config.credentials().is_none() {
        return Err(ConfigError::MissingCredentials);
    }
    config.validate_task_policy().map_err(ConfigError::TaskPolicy)
}

fn split_urls(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "t" | "true" | "yes" => Some(true),
        "0" | "f" | "false" | "no" => Some(false),
        _ => None,
    }
}
