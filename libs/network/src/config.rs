//! Network root configuration
//!
//! [`NetworkConfig`] is what a [`NetworkRoot`](crate::NetworkRoot) needs to
//! run; it is normally derived from the `hub-config` file model with
//! [`NetworkConfig::from_hub_config`].

use hub_config::{defaults, HubConfig};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

/// Per-connection transport settings
#[derive(Debug, Clone)]
pub struct ConnectionConfig {
    /// Outbound connect timeout
    pub connect_timeout: Duration,
    /// Largest accepted frame payload
    pub max_frame_size: usize,
    /// Socket read buffer size
    pub buffer_size: usize,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_millis(defaults::network::CONNECT_TIMEOUT_MS),
            max_frame_size: defaults::network::MAX_FRAME_SIZE,
            buffer_size: defaults::network::BUFFER_SIZE,
        }
    }
}

/// How to reach the hub behind a proxy
#[derive(Debug, Clone, PartialEq)]
pub enum ProxyTarget {
    /// Connect to a running hub
    Remote { host: String, port: u16 },
    /// Spawn a child hub and connect to the port it reports
    Child { command: String, args: Vec<String> },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProxySpec {
    pub target: ProxyTarget,
    /// Remote root ids aliased to the network root
    pub roots: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// `bind:port` to listen on for peer hubs
    pub listen: Option<(String, u16)>,
    /// `root:port` of the scoped file server
    pub file_server: Option<(PathBuf, u16)>,
    /// Service name → proxy
    pub proxies: BTreeMap<String, ProxySpec>,
    pub connection: ConnectionConfig,
    /// How long to wait for a child hub's readiness line
    pub child_ready_timeout: Duration,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen: None,
            file_server: None,
            proxies: BTreeMap::new(),
            connection: ConnectionConfig::default(),
            child_ready_timeout: Duration::from_millis(defaults::network::CHILD_READY_TIMEOUT_MS),
        }
    }
}

impl NetworkConfig {
    pub fn from_hub_config(config: &HubConfig) -> Self {
        let proxies = config
            .proxies
            .iter()
            .map(|(service, proxy)| {
                let target = match (&proxy.exec, proxy.port) {
                    (Some(exec), _) => ProxyTarget::Child {
                        command: exec.command.clone(),
                        args: exec.args.clone(),
                    },
                    (None, port) => ProxyTarget::Remote {
                        host: proxy.host.clone(),
                        port: port.unwrap_or_default(),
                    },
                };
                let spec = ProxySpec {
                    target,
                    roots: proxy.roots.clone(),
                };
                (service.clone(), spec)
            })
            .collect();

        Self {
            listen: config
                .server
                .as_ref()
                .map(|server| (server.bind.clone(), server.port)),
            file_server: config
                .file_server
                .as_ref()
                .map(|fs| (fs.root.clone(), fs.port)),
            proxies,
            connection: ConnectionConfig::default(),
            child_ready_timeout: Duration::from_millis(defaults::network::CHILD_READY_TIMEOUT_MS),
        }
    }

    /// Listen on `127.0.0.1:port`
    pub fn with_listen_port(mut self, port: u16) -> Self {
        let bind = self
            .listen
            .take()
            .map(|(bind, _)| bind)
            .unwrap_or_else(|| defaults::network::BIND_ADDRESS.to_string());
        self.listen = Some((bind, port));
        self
    }

    pub fn with_proxy(mut self, service: &str, target: ProxyTarget, roots: &[&str]) -> Self {
        self.proxies.insert(
            service.to_string(),
            ProxySpec {
                target,
                roots: roots.iter().map(|root| root.to_string()).collect(),
            },
        );
        self
    }

    pub fn with_file_server(mut self, root: impl Into<PathBuf>, port: u16) -> Self {
        self.file_server = Some((root.into(), port));
        self
    }
}
