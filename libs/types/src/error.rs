//! Error types for address parsing and Call construction

use thiserror::Error;

/// Address syntax errors
///
/// Returned by [`ComponentAddress::parse`](crate::ComponentAddress::parse) and
/// [`ControlAddress::parse`](crate::ControlAddress::parse) when the canonical
/// text form is malformed.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AddressError {
    /// Address text was empty
    #[error("Empty address")]
    Empty,

    /// Component path must start with `/`
    #[error("Address '{input}' must start with '/'")]
    MissingRoot { input: String },

    /// A path segment or control id is not a valid identifier
    #[error("Invalid identifier '{id}' in address '{input}'")]
    InvalidId { input: String, id: String },

    /// Control address has no `.control` suffix
    #[error("Address '{input}' has no control id")]
    MissingControl { input: String },
}

impl AddressError {
    pub(crate) fn invalid_id(input: &str, id: &str) -> Self {
        Self::InvalidId {
            input: input.to_string(),
            id: id.to_string(),
        }
    }
}

/// Errors producing a response from a Call
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum CallError {
    /// Only a REQUEST can be answered
    #[error("Cannot respond to a {kind} call (match id {match_id})")]
    NotARequest { kind: &'static str, match_id: i32 },

    /// Quiet requests have no reply path
    #[error("Cannot respond to quiet request (match id {match_id})")]
    QuietRequest { match_id: i32 },
}

pub type AddressResult<T> = std::result::Result<T, AddressError>;
pub type CallResult<T> = std::result::Result<T, CallError>;
