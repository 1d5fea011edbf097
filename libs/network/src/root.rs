//! # Network Root
//!
//! A kernel root that extends Call semantics across hubs.
//!
//! - **Server mode**: accepts peer hubs on the configured port
//! - **Proxies**: service `X` proxied to hub B is re-registered locally as
//!   `/<net>/X`; requests to it travel to B as `Message::Service` and are
//!   resolved there. Remote roots listed for a proxy are aliased to this
//!   root and travel as `Message::Send`.
//! - **Inbound**: requests arriving on a connection are dispatched locally
//!   from `/<net>.conn-<id>`, so their replies come back here and return on
//!   the same connection keyed by match id.
//!
//! Sockets live on a tokio runtime owned by this root. Listeners are bound
//! in [`NetworkRoot::new`] so the ports are known before the hub starts.

use crate::child::{ChildHub, ChildLauncher};
use crate::config::{NetworkConfig, ProxyTarget};
use crate::connection::{
    accept_loop, check_outgoing, encode_error, Command, ConnectionHandle, Connections, Endpoint,
};
use crate::file_server::FileServer;
use crate::translate::{self, PeerInfo};
use crate::{Result, TransportError};
use codec::Message;
use kernel::{Root, RootContext};
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};
use types::{Call, ErrorValue, Value};

/// Addresses and peer state of a running network root, usable from any thread
#[derive(Debug, Clone)]
pub struct NetworkHandle {
    listen_addr: Option<SocketAddr>,
    file_server_addr: Option<SocketAddr>,
    peers: Arc<Mutex<BTreeMap<u64, PeerInfo>>>,
}

impl NetworkHandle {
    /// Address peer hubs connect to
    pub fn listen_addr(&self) -> Option<SocketAddr> {
        self.listen_addr
    }

    pub fn file_server_addr(&self) -> Option<SocketAddr> {
        self.file_server_addr
    }

    /// What each open connection's peer announced, by connection id
    pub fn peers(&self) -> BTreeMap<u64, PeerInfo> {
        self.peers.lock().clone()
    }
}

/// One distinct proxy target, shared by every service and root routed to it
struct ProxyLink {
    target: ProxyTarget,
    connection: Option<ConnectionHandle>,
    child: Arc<tokio::sync::Mutex<Option<ChildHub>>>,
}

pub struct NetworkRoot {
    config: NetworkConfig,
    runtime: Option<Runtime>,
    listener: Option<TcpListener>,
    file_listener: Option<(TcpListener, FileServer)>,
    handle: NetworkHandle,
    connections: Option<Connections>,
    links: Vec<ProxyLink>,
    services: HashMap<String, usize>,
    remote_roots: HashMap<String, usize>,
}

impl NetworkRoot {
    /// Build the runtime and bind the configured listeners
    pub fn new(config: NetworkConfig) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("hub-net")
            .enable_all()
            .build()?;

        let listener = match &config.listen {
            Some((bind, port)) => Some(bind_listener(bind, *port)?),
            None => None,
        };
        let file_listener = match &config.file_server {
            Some((root, port)) => {
                let server = FileServer::new(root)?;
                let bind = config
                    .listen
                    .as_ref()
                    .map_or(hub_config::defaults::network::BIND_ADDRESS, |(bind, _)| bind.as_str());
                Some((bind_listener(bind, *port)?, server))
            }
            None => None,
        };

        let mut links: Vec<ProxyLink> = Vec::new();
        let mut services = HashMap::new();
        let mut remote_roots = HashMap::new();
        for (service, spec) in &config.proxies {
            let index = match links.iter().position(|link| link.target == spec.target) {
                Some(index) => index,
                None => {
                    links.push(ProxyLink {
                        target: spec.target.clone(),
                        connection: None,
                        child: Arc::new(tokio::sync::Mutex::new(None)),
                    });
                    links.len() - 1
                }
            };
            services.insert(service.clone(), index);
            for root in &spec.roots {
                remote_roots.insert(root.clone(), index);
            }
        }

        let handle = NetworkHandle {
            listen_addr: listener.as_ref().map(TcpListener::local_addr).transpose()?,
            file_server_addr: file_listener
                .as_ref()
                .map(|(listener, _)| listener.local_addr())
                .transpose()?,
            peers: Arc::new(Mutex::new(BTreeMap::new())),
        };

        Ok(Self {
            config,
            runtime: Some(runtime),
            listener,
            file_listener,
            handle,
            connections: None,
            links,
            services,
            remote_roots,
        })
    }

    pub fn handle(&self) -> NetworkHandle {
        self.handle.clone()
    }

    fn connections(&self) -> std::result::Result<&Connections, ErrorValue> {
        self.connections
            .as_ref()
            .ok_or_else(|| ErrorValue::new("NotConnected", "network root is not active"))
    }

    /// Open (or reuse) the connection of proxy link `index`
    fn link_connection(&mut self, index: usize) -> std::result::Result<ConnectionHandle, ErrorValue> {
        let connections = self.connections()?.clone();
        let ready_timeout = self.config.child_ready_timeout;
        let link = self
            .links
            .get_mut(index)
            .ok_or_else(|| ErrorValue::new("UnknownProxy", "no such proxy"))?;
        if let Some(connection) = link.connection.as_ref().filter(|c| !c.is_closed()) {
            return Ok(connection.clone());
        }
        let endpoint = match &link.target {
            ProxyTarget::Remote { host, port } => Endpoint::Remote {
                host: host.clone(),
                port: *port,
            },
            ProxyTarget::Child { command, args } => Endpoint::Child {
                launcher: ChildLauncher::new(command.clone()).args(args.iter().cloned()),
                slot: Arc::clone(&link.child),
                ready_timeout,
            },
        };
        let connection = connections
            .open(endpoint)
            .map_err(|e| ErrorValue::new("ConnectionFailed", e.to_string()))?;
        debug!(connection = connection.id(), target = ?link.target, "Opened proxy connection");
        link.connection = Some(connection.clone());
        Ok(connection)
    }

    /// Send a local request through proxy link `index`
    fn forward(&mut self, index: usize, call: Call, service: Option<&str>) -> anyhow::Result<()> {
        if !call.is_request() {
            warn!(call = %call, "Dropping response addressed to a proxy");
            return Ok(());
        }
        let connection = self.link_connection(index)?;
        let message = translate::request_message(&call, connection.next_match_id(), service);
        check_outgoing(&message, self.config.connection.max_frame_size)
            .map_err(|e| encode_error(&e))?;
        debug!(
            connection = connection.id(),
            match_id = message.match_id(),
            call = %call,
            "Forwarding request"
        );
        connection
            .send(Command::Request { call, message })
            .map_err(|_| ErrorValue::new(crate::CONNECTION_CLOSED, "connection closed"))?;
        Ok(())
    }

    /// Return a local reply/error to the connection its request came from
    fn respond(&self, call: Call) -> anyhow::Result<()> {
        let control = call.to().control_id();
        let Some(id) = Connections::parse_control(control) else {
            return Err(ErrorValue::new(
                "UnknownControl",
                format!("Network root has no control '{}'", control),
            )
            .into());
        };
        let Some(message) = translate::response_message(&call) else {
            return Err(ErrorValue::new(
                "UnknownControl",
                format!("Requests cannot target connection control '{}'", control),
            )
            .into());
        };
        let message = match check_outgoing(&message, self.config.connection.max_frame_size) {
            Ok(()) => message,
            Err(e) => {
                warn!(connection = id, error = %e, "Reply cannot be sent, sending error instead");
                Message::Error {
                    match_id: message.match_id(),
                    args: vec![Value::Error(encode_error(&e))],
                }
            }
        };
        match self.connections()?.get(id) {
            Some(connection) if connection.send(Command::Respond(message)).is_ok() => {}
            _ => debug!(connection = id, call = %call, "Connection gone, dropping response"),
        }
        Ok(())
    }
}

fn bind_listener(bind: &str, port: u16) -> Result<TcpListener> {
    let listener = TcpListener::bind((bind, port)).map_err(|e| {
        TransportError::network_with_source(format!("Failed to bind {}:{}", bind, port), e)
    })?;
    listener.set_nonblocking(true)?;
    Ok(listener)
}

impl Root for NetworkRoot {
    fn activating(&mut self, ctx: &mut RootContext) -> anyhow::Result<()> {
        let runtime = self
            .runtime
            .as_ref()
            .ok_or_else(|| anyhow::anyhow!("network runtime already shut down"))?;
        let connections = Connections::new(
            runtime.handle().clone(),
            ctx.router().clone(),
            ctx.address().clone(),
            self.config.connection.clone(),
            self.handle.file_server_addr.map(|addr| addr.port()),
            Arc::clone(&self.handle.peers),
        );

        for service in self.services.keys() {
            let proxy = ctx.address().child(service)?;
            let previous = ctx.services().register(service, proxy.clone());
            info!(service = %service, proxy = %proxy, replaced = ?previous, "Proxying service");
        }
        for root in self.remote_roots.keys() {
            ctx.register_alias(root)?;
        }

        if let Some(listener) = self.listener.take() {
            info!(addr = ?self.handle.listen_addr, "Accepting peer hubs");
            runtime.spawn(accept_loop(listener, connections.clone()));
        }
        if let Some((listener, server)) = self.file_listener.take() {
            runtime.spawn(async move {
                if let Err(e) = server.serve(listener).await {
                    warn!(error = %e, "File server stopped");
                }
            });
        }

        self.connections = Some(connections);
        ctx.set_running();
        Ok(())
    }

    fn terminating(&mut self, _ctx: &mut RootContext) -> anyhow::Result<()> {
        if let Some(connections) = self.connections.take() {
            connections.close_all();
        }
        for link in &mut self.links {
            link.connection = None;
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_timeout(Duration::from_secs(1));
        }
        info!("Network root stopped");
        Ok(())
    }

    fn process_call(&mut self, ctx: &mut RootContext, call: Call) -> anyhow::Result<()> {
        let to = call.to().component();
        if to.root_id() != ctx.root_id() {
            let index = *self.remote_roots.get(to.root_id()).ok_or_else(|| {
                ErrorValue::new("UnknownRoot", format!("No proxy for root '{}'", to.root_id()))
            })?;
            return self.forward(index, call, None);
        }
        if to.is_root() {
            return self.respond(call);
        }
        let service = to.id_at(1).unwrap_or_default().to_string();
        let index = *self.services.get(&service).ok_or_else(|| {
            ErrorValue::new("ServiceUnavailable", format!("No proxy for service '{}'", service))
        })?;
        self.forward(index, call, Some(&service))
    }
}
