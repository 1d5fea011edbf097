//! Default configuration values
//!
//! Shared by the config model, the network crate and the `hub-node` binary
//! so that a missing setting means the same thing everywhere.

/// Kernel defaults
pub mod hub {
    /// Id of the pseudo-root hosting built-in services
    pub const ROOT_ID: &str = "hub";

    /// Id of the root that owns network connections
    pub const NETWORK_ROOT_ID: &str = "net";

    /// Longest a root worker sleeps between flag checks (milliseconds)
    pub const POLL_INTERVAL_MS: u64 = 50;

    /// How long `hub-node` waits for roots to terminate (milliseconds)
    pub const SHUTDOWN_TIMEOUT_MS: u64 = 10_000;
}

/// Transport defaults
pub mod network {
    pub const BIND_ADDRESS: &str = "127.0.0.1";

    pub const PROXY_HOST: &str = "localhost";

    /// Outbound connect timeout (milliseconds)
    pub const CONNECT_TIMEOUT_MS: u64 = 5_000;

    /// Largest accepted frame payload
    pub const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

    /// Socket read buffer size
    pub const BUFFER_SIZE: usize = 64 * 1024;

    /// How long a parent waits for a child hub's readiness line (milliseconds)
    pub const CHILD_READY_TIMEOUT_MS: u64 = 30_000;
}
