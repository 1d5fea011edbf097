//! Hub Configuration Module
//!
//! Loads the hub configuration from a TOML file with `HUB_` environment
//! overrides (`HUB_SERVER__PORT=4000`, `HUB_HUB__ROOT_ID=main`).

use crate::defaults;
use anyhow::{bail, Context, Result};
use config_crate::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};
use types::is_valid_id;

/// Complete configuration of one hub process
#[derive(Debug, Deserialize, Serialize, Clone, Default, PartialEq)]
#[serde(default)]
pub struct HubConfig {
    pub hub: HubSection,

    /// Listen for peer hubs when present
    pub server: Option<ServerConfig>,

    /// Serve resources to peers when present
    pub file_server: Option<FileServerConfig>,

    /// Service name → remote hub hosting it
    pub proxies: BTreeMap<String, ProxyConfig>,
}

/// Kernel settings
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct HubSection {
    pub root_id: String,
    pub network_root_id: String,
    pub poll_interval_ms: u64,
    pub shutdown_timeout_ms: u64,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    /// 0 picks an ephemeral port
    #[serde(default)]
    pub port: u16,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct FileServerConfig {
    pub root: PathBuf,
    #[serde(default)]
    pub port: u16,
}

/// Remote hub reached for one service
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ProxyConfig {
    #[serde(default = "default_proxy_host")]
    pub host: String,
    pub port: Option<u16>,
    /// Remote root ids addressed directly through this proxy
    #[serde(default)]
    pub roots: Vec<String>,
    /// Spawn the remote hub as a child process
    pub exec: Option<ExecConfig>,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ExecConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_bind() -> String {
    defaults::network::BIND_ADDRESS.to_string()
}

fn default_proxy_host() -> String {
    defaults::network::PROXY_HOST.to_string()
}

impl Default for HubSection {
    fn default() -> Self {
        Self {
            root_id: defaults::hub::ROOT_ID.to_string(),
            network_root_id: defaults::hub::NETWORK_ROOT_ID.to_string(),
            poll_interval_ms: defaults::hub::POLL_INTERVAL_MS,
            shutdown_timeout_ms: defaults::hub::SHUTDOWN_TIMEOUT_MS,
        }
    }
}

impl HubSection {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl HubConfig {
    /// Load configuration from an optional file with environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            info!("Loading hub config: {:?}", path);
            builder = builder.add_source(File::from(path).required(true));
        }

        // Override with environment variables (HUB_ prefix)
        builder = builder.add_source(
            Environment::with_prefix("HUB")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        let config = builder.build().context("Failed to build configuration")?;

        let config: HubConfig = config
            .try_deserialize()
            .context("Failed to deserialize configuration")?;
        config.validate()?;
        Ok(config)
    }

    /// Parse and validate a TOML document without consulting the environment
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: HubConfig = toml::from_str(text).context("Invalid hub config")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        for id in [&self.hub.root_id, &self.hub.network_root_id] {
            if !is_valid_id(id) {
                bail!("Invalid root id '{}'", id);
            }
        }
        if self.hub.root_id == self.hub.network_root_id {
            bail!(
                "hub.root_id and hub.network_root_id are both '{}'",
                self.hub.root_id
            );
        }
        if self.hub.poll_interval_ms == 0 {
            bail!("hub.poll_interval_ms must be positive");
        }

        for (service, proxy) in &self.proxies {
            if !is_valid_id(service) {
                bail!("Invalid proxied service name '{}'", service);
            }
            match (&proxy.port, &proxy.exec) {
                (None, None) => bail!("Proxy '{}' needs a port or an exec section", service),
                (Some(0), None) => bail!("Proxy '{}' has port 0", service),
                _ => {}
            }
            if let Some(exec) = &proxy.exec {
                if exec.command.trim().is_empty() {
                    bail!("Proxy '{}' has an empty exec command", service);
                }
            }
            if let Some(root) = proxy.roots.iter().find(|root| !is_valid_id(root)) {
                bail!("Proxy '{}' lists invalid root id '{}'", service, root);
            }
        }
        debug!(proxies = self.proxies.len(), "Hub config validated");
        Ok(())
    }

    /// Get settings for a proxied service
    pub fn proxy(&self, service: &str) -> Option<&ProxyConfig> {
        self.proxies.get(service)
    }

    /// Expand environment variables in paths and commands
    pub fn expand_env_vars(&mut self) -> Result<()> {
        if let Some(file_server) = &mut self.file_server {
            let root = file_server.root.to_string_lossy().into_owned();
            let expanded =
                shellexpand::env(&root).context("Failed to expand file server root")?;
            file_server.root = PathBuf::from(expanded.as_ref());
        }

        for (service, proxy) in &mut self.proxies {
            if let Some(exec) = &mut proxy.exec {
                exec.command = shellexpand::env(&exec.command)
                    .with_context(|| format!("Failed to expand exec command for '{}'", service))?
                    .into_owned();
                for arg in &mut exec.args {
                    *arg = shellexpand::env(arg.as_str())
                        .with_context(|| format!("Failed to expand exec args for '{}'", service))?
                        .into_owned();
                }
            }
        }

        Ok(())
    }
}

/// Convenience function to load configuration with expanded variables
pub fn load_config(path: Option<&Path>) -> Result<HubConfig> {
    let mut config = HubConfig::load(path)?;
    config.expand_env_vars()?;
    Ok(config)
}
