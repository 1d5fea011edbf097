//! Peer connections
//!
//! Each connection is one tokio task owning its socket, frame decoder and
//! table of pending outbound requests. The network root talks to it through
//! an unbounded command channel; commands sent before the socket is ready
//! simply wait in that channel.
//!
//! ## Correlation
//!
//! Outbound requests carry a match id minted by the connection's own
//! counter, so requests from different local senders never collide on the
//! wire. A reply or error coming back is matched against the pending table
//! by match id only and answered locally with the original Call.
//!
//! ## Teardown
//!
//! Socket errors, peer close and malformed frames all end the task. Every
//! request still pending, or still queued in the channel, then gets a local
//! ERROR reply.
//!
//! A message that cannot be encoded, or whose frame would exceed the peer's
//! `max_frame_size`, is never written. Only the Call it came from fails and
//! the connection stays up.

use crate::child::{ChildHub, ChildLauncher};
use crate::config::ConnectionConfig;
use crate::translate::{self, Inbound, PeerInfo};
use crate::{Result, TransportError};
use bytes::BytesMut;
use codec::{encoded_len, write_frame, CodecError, FrameDecoder, Message, LENGTH_PREFIX_SIZE};
use kernel::Router;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashMap};
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::TcpStream;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use types::{Call, ComponentAddress, ControlAddress, ErrorValue, MatchIds, Value};

/// Error kind of the local reply to a request whose connection went away
pub const CONNECTION_CLOSED: &str = "ConnectionClosed";

/// Error kind of a Call whose frame would exceed `max_frame_size`
pub const FRAME_TOO_LARGE: &str = "FrameTooLarge";

/// Check that `message` encodes into a frame of at most `max_frame_size`
pub(crate) fn check_outgoing(message: &Message, max_frame_size: usize) -> codec::CodecResult<()> {
    let size = encoded_len(std::slice::from_ref(message))?;
    if size > max_frame_size {
        return Err(CodecError::frame_too_large(size, max_frame_size));
    }
    Ok(())
}

/// ERROR value answering a Call whose message could not be sent
pub(crate) fn encode_error(error: &CodecError) -> ErrorValue {
    let kind = match error {
        CodecError::FrameTooLarge { .. } => FRAME_TOO_LARGE,
        CodecError::NestingTooDeep { .. } => "NestingTooDeep",
        _ => "UnsupportedValue",
    };
    ErrorValue::new(kind, error.to_string())
}

pub(crate) enum Command {
    /// Outbound request, pending until answered when a reply is required
    Request { call: Call, message: Message },
    /// Answer to a request that arrived on this connection
    Respond(Message),
    Close,
}

/// Where a connection's socket comes from
pub(crate) enum Endpoint {
    Accepted(TcpStream),
    Remote {
        host: String,
        port: u16,
    },
    Child {
        launcher: ChildLauncher,
        slot: Arc<tokio::sync::Mutex<Option<ChildHub>>>,
        ready_timeout: Duration,
    },
}

/// Sending side of one connection task
#[derive(Clone)]
pub(crate) struct ConnectionHandle {
    id: u64,
    commands: mpsc::UnboundedSender<Command>,
    match_ids: Arc<MatchIds>,
}

impl ConnectionHandle {
    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn next_match_id(&self) -> i32 {
        self.match_ids.next_id()
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.commands.is_closed()
    }

    /// Queue a command, handing it back if the task has ended
    pub(crate) fn send(&self, command: Command) -> std::result::Result<(), Command> {
        self.commands.send(command).map_err(|e| e.0)
    }
}

/// Registry and factory for the connections of one network root
#[derive(Clone)]
pub(crate) struct Connections {
    inner: Arc<ConnectionsInner>,
}

struct ConnectionsInner {
    runtime: Handle,
    router: Router,
    address: ComponentAddress,
    config: ConnectionConfig,
    file_server_port: Option<u16>,
    next_id: AtomicU64,
    open: Mutex<HashMap<u64, ConnectionHandle>>,
    peers: Arc<Mutex<BTreeMap<u64, PeerInfo>>>,
}

impl Connections {
    pub(crate) fn new(
        runtime: Handle,
        router: Router,
        address: ComponentAddress,
        config: ConnectionConfig,
        file_server_port: Option<u16>,
        peers: Arc<Mutex<BTreeMap<u64, PeerInfo>>>,
    ) -> Self {
        Self {
            inner: Arc::new(ConnectionsInner {
                runtime,
                router,
                address,
                config,
                file_server_port,
                next_id: AtomicU64::new(1),
                open: Mutex::new(HashMap::new()),
                peers,
            }),
        }
    }

    /// Start a connection task for `endpoint`
    pub(crate) fn open(&self, endpoint: Endpoint) -> Result<ConnectionHandle> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let reply_to = self
            .inner
            .address
            .control(&format!("conn-{}", id))
            .map_err(|e| TransportError::configuration(e.to_string(), Some("connection id")))?;
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = ConnectionHandle {
            id,
            commands: tx,
            match_ids: Arc::new(MatchIds::new()),
        };
        self.inner.open.lock().insert(id, handle.clone());

        let hello = PeerInfo {
            services: self.inner.router.service_names(),
            file_server_port: self.inner.file_server_port,
        }
        .to_hello();
        let connections = self.clone();
        self.inner.runtime.spawn(async move {
            run(id, endpoint, rx, reply_to, hello, connections.clone()).await;
            connections.remove(id);
        });
        Ok(handle)
    }

    /// Connection id encoded in a `conn-<id>` control
    pub(crate) fn parse_control(control_id: &str) -> Option<u64> {
        control_id.strip_prefix("conn-")?.parse().ok()
    }

    pub(crate) fn get(&self, id: u64) -> Option<ConnectionHandle> {
        self.inner.open.lock().get(&id).cloned()
    }

    fn remove(&self, id: u64) {
        self.inner.open.lock().remove(&id);
        self.inner.peers.lock().remove(&id);
    }

    pub(crate) fn close_all(&self) {
        let open: Vec<ConnectionHandle> = self.inner.open.lock().values().cloned().collect();
        for handle in open {
            let _ = handle.send(Command::Close);
        }
    }

    fn record_peer(&self, id: u64, info: PeerInfo) {
        self.inner.peers.lock().insert(id, info);
    }
}

/// Accept peer hubs until the runtime shuts down
pub(crate) async fn accept_loop(listener: std::net::TcpListener, connections: Connections) {
    let listener = match tokio::net::TcpListener::from_std(listener) {
        Ok(listener) => listener,
        Err(e) => {
            error!(error = %e, "Failed to register listener with the runtime");
            return;
        }
    };
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                info!(peer = %peer, "Accepted peer hub connection");
                if let Err(e) = connections.open(Endpoint::Accepted(stream)) {
                    warn!(peer = %peer, error = %e, "Dropping accepted connection");
                }
            }
            Err(e) => {
                warn!(error = %e, "Accept failed");
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
        }
    }
}

async fn connect(endpoint: Endpoint, config: &ConnectionConfig) -> Result<TcpStream> {
    let (host, port) = match endpoint {
        Endpoint::Accepted(stream) => return Ok(stream),
        Endpoint::Remote { host, port } => (host, port),
        Endpoint::Child {
            launcher,
            slot,
            ready_timeout,
        } => {
            let mut child = slot.lock().await;
            if child.as_mut().is_some_and(ChildHub::has_exited) {
                warn!(command = %launcher.command(), "Child hub exited, relaunching");
                *child = None;
            }
            let port = match child.as_ref() {
                Some(running) => running.port(),
                None => {
                    let running = launcher.launch(ready_timeout).await?;
                    let port = running.port();
                    *child = Some(running);
                    port
                }
            };
            ("localhost".to_string(), port)
        }
    };

    info!("Connecting to peer hub at {}:{}", host, port);
    let stream = tokio::time::timeout(
        config.connect_timeout,
        TcpStream::connect((host.as_str(), port)),
    )
    .await
    .map_err(|_| TransportError::timeout("TCP connect", config.connect_timeout.as_millis() as u64))?
    .map_err(|e| TransportError::network_with_source("Failed to connect to peer hub", e))?;

    if let Err(e) = stream.set_nodelay(true) {
        warn!("Failed to set TCP_NODELAY: {}", e);
    }
    Ok(stream)
}

/// Connection task body
async fn run(
    id: u64,
    endpoint: Endpoint,
    mut commands: mpsc::UnboundedReceiver<Command>,
    reply_to: ControlAddress,
    hello: Message,
    connections: Connections,
) {
    let config = connections.inner.config.clone();
    let router = connections.inner.router.clone();

    let stream = match connect(endpoint, &config).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(connection = id, error = %e, category = e.category(), "Connection failed");
            commands.close();
            fail_queued(&router, &mut commands, &format!("connect failed: {}", e));
            return;
        }
    };
    let peer_addr = stream.peer_addr().ok();
    let (mut reader, writer) = stream.into_split();
    let mut session = Session {
        id,
        peer_addr,
        reply_to,
        router: router.clone(),
        connections,
        pending: HashMap::new(),
        writer,
        out: BytesMut::with_capacity(config.buffer_size),
        max_frame_size: config.max_frame_size,
    };
    let mut decoder = FrameDecoder::with_max_frame_size(config.max_frame_size);
    info!(connection = id, peer = ?peer_addr, "Peer connection open");

    let outcome = match session.write(&hello).await {
        Ok(()) => loop {
            decoder.buffer_mut().reserve(config.buffer_size);
            tokio::select! {
                read = reader.read_buf(decoder.buffer_mut()) => match read {
                    Ok(0) => break Ok(()),
                    Ok(n) => {
                        debug!(connection = id, bytes = n, "Read from peer");
                        if let Err(e) = session.drain_frames(&mut decoder).await {
                            break Err(e);
                        }
                    }
                    Err(e) => break Err(e.into()),
                },
                command = commands.recv() => match command {
                    Some(Command::Request { call, message }) => session.send_request(call, message).await,
                    Some(Command::Respond(message)) => {
                        if let Err(e) = session.write(&message).await {
                            break Err(e);
                        }
                    }
                    Some(Command::Close) | None => break Ok(()),
                },
            }
        },
        Err(e) => Err(e),
    };

    match outcome {
        Ok(()) => info!(connection = id, peer = ?peer_addr, "Peer connection closed"),
        Err(e) => error!(
            connection = id,
            peer = ?peer_addr,
            error = %e,
            category = e.category(),
            "Peer connection torn down"
        ),
    }
    commands.close();
    session.fail_pending();
    fail_queued(&router, &mut commands, "connection closed");
}

/// Answer every queued request after the task stopped taking commands
fn fail_queued(router: &Router, commands: &mut mpsc::UnboundedReceiver<Command>, reason: &str) {
    while let Ok(command) = commands.try_recv() {
        if let Command::Request { call, .. } = command {
            fail_request(router, &call, reason);
        }
    }
}

fn fail_request(router: &Router, call: &Call, reason: &str) {
    reject(router, call, ErrorValue::new(CONNECTION_CLOSED, reason));
}

fn reject(router: &Router, call: &Call, error: ErrorValue) {
    if !call.is_reply_required() {
        return;
    }
    if let Ok(error) = call.error(Value::Error(error)) {
        router.route(error);
    }
}

struct Session {
    id: u64,
    peer_addr: Option<SocketAddr>,
    reply_to: ControlAddress,
    router: Router,
    connections: Connections,
    pending: HashMap<i32, Call>,
    writer: OwnedWriteHalf,
    out: BytesMut,
    max_frame_size: usize,
}

impl Session {
    async fn write(&mut self, message: &Message) -> Result<()> {
        self.out.clear();
        write_frame(std::slice::from_ref(message), &mut self.out)?;
        let size = self.out.len() - LENGTH_PREFIX_SIZE;
        if size > self.max_frame_size {
            self.out.clear();
            return Err(CodecError::frame_too_large(size, self.max_frame_size).into());
        }
        self.writer
            .write_all(&self.out)
            .await
            .map_err(|e| TransportError::connection_with_source("Failed to write frame", self.peer_addr, e))?;
        debug!(
            connection = self.id,
            message = message.name(),
            match_id = message.match_id(),
            bytes = self.out.len(),
            "Sent frame"
        );
        Ok(())
    }

    async fn send_request(&mut self, call: Call, message: Message) {
        let match_id = message.match_id();
        if call.is_reply_required() {
            self.pending.insert(match_id, call.clone());
        }
        if let Err(e) = self.write(&message).await {
            // The read side notices a dead socket; a bad value only fails this call
            warn!(connection = self.id, match_id, error = %e, "Failed to send request");
            if self.pending.remove(&match_id).is_some() {
                let error = match &e {
                    TransportError::Protocol(codec_error) => encode_error(codec_error),
                    other => ErrorValue::new(CONNECTION_CLOSED, other.to_string()),
                };
                reject(&self.router, &call, error);
            }
        }
    }

    async fn drain_frames(&mut self, decoder: &mut FrameDecoder) -> Result<()> {
        while let Some(messages) = decoder.decode_next()? {
            for message in messages {
                if let Some(answer) = self.handle(message) {
                    self.write(&answer).await?;
                }
            }
        }
        Ok(())
    }

    /// Apply one inbound message, returning a direct wire answer if needed
    fn handle(&mut self, message: Message) -> Option<Message> {
        let router = &self.router;
        let inbound = translate::inbound(message, &self.reply_to, router.now(), |service, control| {
            router.service_control(service, control).ok()
        });
        match inbound {
            Inbound::Request(call) => {
                debug!(connection = self.id, call = %call, "Inbound request");
                self.router.route(call);
                None
            }
            Inbound::Unresolved {
                match_id,
                quiet,
                error,
            } => {
                warn!(connection = self.id, match_id, error = %error, "Unresolved inbound service");
                (!quiet).then(|| Message::Error {
                    match_id,
                    args: vec![Value::Error(error)],
                })
            }
            Inbound::Response { match_id, response } => {
                match self.pending.remove(&match_id) {
                    Some(original) => {
                        if let Some(answer) = translate::answer(&original, response) {
                            self.router.route(answer);
                        }
                    }
                    None => warn!(connection = self.id, match_id, "Response for unknown match id"),
                }
                None
            }
            Inbound::System { kind, data } if translate::is_hello(&kind) => {
                let info = PeerInfo::from_hello(&data);
                info!(
                    connection = self.id,
                    services = ?info.services,
                    file_server = ?info.file_server_port,
                    "Peer hub introduced itself"
                );
                self.connections.record_peer(self.id, info);
                None
            }
            Inbound::System { kind, .. } => {
                warn!(connection = self.id, kind = %kind, "Ignoring unknown system message");
                None
            }
        }
    }

    fn fail_pending(&mut self) {
        if !self.pending.is_empty() {
            debug!(connection = self.id, pending = self.pending.len(), "Failing pending requests");
        }
        for (_, call) in self.pending.drain() {
            fail_request(&self.router, &call, "connection closed");
        }
    }
}
