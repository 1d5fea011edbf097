//! # Hub Wire Codec
//!
//! ## Purpose
//!
//! Binary representation of Calls for cross-process transmission:
//! - [`Message`]: tagged union `{Send, Service, Reply, Error, System}`
//! - [`encode_messages`] / [`decode_messages`]: pure payload (de)serializers
//! - [`encode_frame`] / [`FrameDecoder`]: length-prefixed stream framing
//!
//! ## Architecture Role
//!
//! ```text
//! libs/types → [codec] → libs/network
//!     ↑           ↓            ↓
//!  Call/Value  Message     Sockets
//! ```
//!
//! ## What This Crate Does NOT Contain
//! - Socket or connection handling (belongs in `network`)
//! - Call ↔ Message translation, which needs routing state
//!
//! ## Failure Model
//!
//! Encoding an unsupported value fails synchronously with
//! [`CodecError::UnsupportedValue`]. Any decode failure means the byte stream
//! is corrupt and the connection that produced it must be closed.

pub mod error;
pub mod frame;
pub mod message;
pub mod wire;

pub use error::{CodecError, CodecResult};
pub use frame::{
    encode_frame, write_frame, FrameDecoder, DEFAULT_MAX_FRAME_SIZE, LENGTH_PREFIX_SIZE,
};
pub use message::{Message, HELLO};
pub use wire::{decode_messages, encode_messages, encoded_len, validate, MAX_NESTING_DEPTH};
