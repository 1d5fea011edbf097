//! # Hub Types Library
//!
//! Data model shared by the messaging kernel and its network transport.
//!
//! ## Contents
//!
//! - **Addresses**: [`ComponentAddress`] and [`ControlAddress`], immutable
//!   routing keys with a canonical `/root/child.control` text form
//! - **Calls**: [`Call`], the addressed and time-stamped envelope with
//!   request/reply/error semantics, plus [`MatchIds`] for correlation
//! - **Values**: [`Value`], the immutable argument payload
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → libs/codec → libs/network
//!      ↓                         ↑
//!  libs/kernel ──────────────────┘
//! ```
//!
//! This crate has no runtime dependencies beyond `thiserror`; it does not
//! know about threads, sockets or the wire format.

pub mod address;
pub mod call;
pub mod error;
pub mod value;

pub use address::{is_valid_id, ComponentAddress, ControlAddress};
pub use call::{Call, CallKind, MatchIds, Packet};
pub use error::{AddressError, AddressResult, CallError, CallResult};
pub use value::{ErrorValue, Reference, Value};
