//! Wire codec errors
//!
//! Every decoding error is connection-fatal for the transport: once a frame
//! fails to decode the byte stream can no longer be trusted. Encoding errors
//! are raised synchronously to whoever tried to send the offending Message.

use thiserror::Error;

/// Binary codec errors with diagnostic context
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Payload ended before a field could be read
    #[error("Truncated payload: need {need} bytes, got {got} (context: {context})")]
    Truncated {
        need: usize,
        got: usize,
        context: String,
    },

    /// Message tag byte is not a known Message variant
    #[error("Unknown message tag {tag} at offset {offset}")]
    UnknownMessageTag { tag: u8, offset: usize },

    /// Value tag byte is not a known Value variant
    #[error("Unknown value tag {tag} at offset {offset}")]
    UnknownValueTag { tag: u8, offset: usize },

    /// String field is not valid UTF-8
    #[error("Invalid UTF-8 in {context}")]
    InvalidUtf8 { context: String },

    /// Address field does not parse as a canonical address
    #[error("Invalid address '{text}': {reason}")]
    InvalidAddress { text: String, reason: String },

    /// Value variant cannot cross a process boundary
    #[error("Value type {type_name} cannot be serialized")]
    UnsupportedValue { type_name: &'static str },

    /// Arrays or Maps nested deeper than the codec accepts
    #[error("Value nesting exceeds limit of {limit} levels")]
    NestingTooDeep { limit: usize },

    /// Declared frame length exceeds the configured maximum
    #[error("Frame of {size} bytes exceeds limit of {limit} bytes")]
    FrameTooLarge { size: usize, limit: usize },

    /// Payload contained bytes after the declared messages
    #[error("{remaining} trailing bytes after {messages} messages")]
    TrailingBytes { remaining: usize, messages: usize },
}

impl CodecError {
    pub fn truncated(need: usize, got: usize, context: impl Into<String>) -> Self {
        Self::Truncated {
            need,
            got,
            context: context.into(),
        }
    }

    pub fn invalid_address(text: impl Into<String>, reason: impl ToString) -> Self {
        Self::InvalidAddress {
            text: text.into(),
            reason: reason.to_string(),
        }
    }

    pub fn frame_too_large(size: usize, limit: usize) -> Self {
        Self::FrameTooLarge { size, limit }
    }
}

/// Result type for codec operations
pub type CodecResult<T> = std::result::Result<T, CodecError>;
