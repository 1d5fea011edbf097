//! # Hub Configuration
//!
//! Configuration model and defaults for a hub instance.
//!
//! ## Features
//!
//! - **Defaults**: kernel and transport constants shared across crates
//! - **Hub Configuration**: TOML file model with `HUB_` environment overrides
//!   and validation
//!
//! ## Usage
//!
//! ```rust
//! use hub_config::{defaults, HubConfig};
//!
//! let config = HubConfig::from_toml_str(
//!     r#"
//!     [proxies.compiler]
//!     host = "localhost"
//!     port = 42001
//!     "#,
//! )
//! .unwrap();
//! assert_eq!(config.hub.root_id, defaults::hub::ROOT_ID);
//! assert_eq!(config.proxies["compiler"].port, Some(42001));
//! ```

pub mod defaults;
pub mod hub_config;

// Re-export commonly used types
pub use hub_config::{
    load_config, ExecConfig, FileServerConfig, HubConfig, HubSection, ProxyConfig, ServerConfig,
};
