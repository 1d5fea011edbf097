//! # Messaging Kernel
//!
//! Actor-style control plane: independently scheduled Roots exchanging
//! addressed, time-stamped Calls.
//!
//! ## Components
//!
//! - [`PacketQueue`]: per-root, wraparound-safe time-ordered buffer
//! - [`Root`] / [`RootState`]: pluggable behavior and its explicit state machine
//! - [`Controller`]: thread-safe mailbox and lifecycle façade over a root
//! - [`Delegate`]: exclusive token for externally clocked draining
//! - [`RootHub`]: root registry and the `dispatch` routing function
//! - [`Hub`]: builds, starts and stops a set of roots plus the hub pseudo-root
//!
//! ## Concurrency Model
//!
//! Each root runs on exactly one draining context at a time, its own worker
//! thread or an attached delegate. Roots never share mutable state; the only
//! way in is `Controller::submit_packet`, reached through `RootHub::dispatch`.
//! `shutdown` is advisory and never interrupts an in-flight `process_call`.
//!
//! ## Failure Model
//!
//! Errors and panics raised by root logic are caught at the dispatch boundary
//! and turned into ERROR calls for the waiting sender. They never escape a
//! worker loop.

pub mod context;
pub mod controller;
pub mod delegate;
pub mod error;
pub mod hub;
mod hub_root;
pub mod queue;
pub mod root;
pub mod root_hub;
pub mod services;
mod worker;

pub use context::{Clock, RootContext, Router};
pub use controller::{Controller, DefaultThreadFactory, ThreadFactory};
pub use delegate::Delegate;
pub use error::{KernelError, Result};
pub use hub::{Hub, HubBuilder, HubSettings};
pub use hub_root::{LOG_SERVICE, SYSTEM_SERVICE};
pub use queue::PacketQueue;
pub use root::{Root, RootState};
pub use root_hub::RootHub;
pub use services::{ServiceHandler, Services};
