//! Hub Networking
//!
//! Extends a kernel hub across processes and machines. A [`NetworkRoot`]
//! registered in a hub:
//!
//! - accepts peer hubs on a TCP port and dispatches their requests locally
//! - proxies named services (and whole remote roots) to other hubs, either
//!   running ones or child hubs it launches itself
//! - optionally serves files below a directory over HTTP
//!
//! Peers exchange length-prefixed frames of [`codec::Message`]s. Each
//! connection opens with a HELLO carrying its services and file server
//! port; after that requests and responses flow in both directions, matched
//! by connection-scoped match ids.
//!
//! ```no_run
//! use kernel::Hub;
//! use network::{NetworkConfig, NetworkRoot, ProxyTarget};
//!
//! # fn main() -> anyhow::Result<()> {
//! let config = NetworkConfig::default()
//!     .with_listen_port(0)
//!     .with_proxy("compiler", ProxyTarget::Remote { host: "localhost".into(), port: 42001 }, &[]);
//! let net = NetworkRoot::new(config)?;
//! let port = net.handle().listen_addr().map(|addr| addr.port());
//!
//! let hub = Hub::builder().root("net", net).build()?;
//! hub.start()?;
//! println!("{}", network::listening_line(port.unwrap_or_default()));
//! # Ok(())
//! # }
//! ```

pub mod child;
pub mod config;
pub mod connection;
pub mod error;
pub mod file_server;
pub mod root;
pub mod translate;

pub use child::{listening_line, parse_listening_line, ChildHub, ChildLauncher};
pub use config::{ConnectionConfig, NetworkConfig, ProxySpec, ProxyTarget};
pub use connection::{CONNECTION_CLOSED, FRAME_TOO_LARGE};
pub use error::{Result, TransportError};
pub use file_server::{fetch_resource, FileServer};
pub use root::{NetworkHandle, NetworkRoot};
pub use translate::PeerInfo;
