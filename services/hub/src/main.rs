//! Hub Node
//!
//! Runs one hub process: a kernel Hub with a network root, configured from
//! an optional TOML file plus command line overrides.
//!
//! Once the peer listener is bound, exactly one readiness line is written to
//! stdout (`Listening at : <port>`); a parent hub launching this binary as a
//! child waits for it. Logs go to stderr so stdout stays clean.

use anyhow::{Context, Result};
use clap::Parser;
use hub_config::{load_config, FileServerConfig, HubConfig, ServerConfig};
use kernel::{Hub, HubSettings};
use network::{listening_line, NetworkConfig, NetworkHandle, NetworkRoot};
use std::io::Write;
use std::path::PathBuf;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(name = "hub-node")]
#[command(about = "Messaging hub with peer networking", version)]
struct Args {
    /// Configuration file path
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Listen for peer hubs on this port (0 picks a free one)
    #[arg(short, long)]
    port: Option<u16>,

    /// Serve files below this directory
    #[arg(long)]
    file_root: Option<PathBuf>,

    /// Log filter used when RUST_LOG is not set
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn init_logging(level: &str) {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Fold command line overrides into the loaded config
fn apply_overrides(config: &mut HubConfig, args: &Args) {
    if let Some(port) = args.port {
        match &mut config.server {
            Some(server) => server.port = port,
            None => {
                config.server = Some(ServerConfig {
                    bind: hub_config::defaults::network::BIND_ADDRESS.to_string(),
                    port,
                })
            }
        }
    }
    if let Some(root) = &args.file_root {
        match &mut config.file_server {
            Some(file_server) => file_server.root = root.clone(),
            None => {
                config.file_server = Some(FileServerConfig {
                    root: root.clone(),
                    port: 0,
                })
            }
        }
    }
}

/// Build and start the hub with its network root
///
/// Must run outside any async context; the network root owns a tokio
/// runtime that is dropped here when setup fails.
fn start_hub(config: &HubConfig) -> Result<(Hub, NetworkHandle)> {
    let net = NetworkRoot::new(NetworkConfig::from_hub_config(config))
        .context("Failed to set up networking")?;
    let handle = net.handle();

    let settings = HubSettings {
        hub_id: config.hub.root_id.clone(),
        poll_interval: config.hub.poll_interval(),
        shutdown_timeout: config.hub.shutdown_timeout(),
    };
    let hub = Hub::builder()
        .settings(settings)
        .root(&config.hub.network_root_id, net)
        .build()
        .context("Failed to build hub")?;
    if let Err(e) = hub.start() {
        hub.shutdown();
        return Err(e).context("Failed to start hub");
    }
    Ok((hub, handle))
}

fn wait_for_ctrl_c() -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to build signal runtime")?;
    runtime
        .block_on(tokio::signal::ctrl_c())
        .context("Failed to install CTRL+C signal handler")
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    info!("Starting hub node");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let mut config = load_config(args.config.as_deref())?;
    apply_overrides(&mut config, &args);
    config.validate()?;

    let (hub, handle) = start_hub(&config)?;

    if let Some(addr) = handle.listen_addr() {
        let mut stdout = std::io::stdout().lock();
        writeln!(stdout, "{}", listening_line(addr.port()))?;
        stdout.flush()?;
    }
    if let Some(addr) = handle.file_server_addr() {
        info!(addr = %addr, "Serving files");
    }

    let signal = wait_for_ctrl_c();
    match &signal {
        Ok(()) => info!("Shutdown signal received"),
        Err(e) => warn!(error = %e, "Stopping without a signal handler"),
    }

    if !hub.stop() {
        warn!(
            timeout_ms = config.hub.shutdown_timeout_ms,
            "Roots still running at exit"
        );
    }
    info!("Hub node stopped");
    signal
}
