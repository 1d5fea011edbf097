//! Kernel error types

use thiserror::Error;
use types::{AddressError, CallError};

/// Errors raised while building or driving a hub
#[derive(Debug, Error)]
pub enum KernelError {
    /// Root id does not satisfy the identifier rule
    #[error("Invalid root id '{root_id}'")]
    InvalidRootId { root_id: String },

    /// Two roots (or a root and an alias) share an id
    #[error("Root '{root_id}' is already registered")]
    DuplicateRoot { root_id: String },

    /// No root with this id is registered
    #[error("Unknown root '{root_id}'")]
    UnknownRoot { root_id: String },

    /// No service with this name is registered
    #[error("Service '{name}' is not available")]
    ServiceUnavailable { name: String },

    /// Controller was started twice
    #[error("Root '{root_id}' has already been started")]
    AlreadyStarted { root_id: String },

    /// Worker thread could not be created
    #[error("Failed to spawn worker for root '{root_id}': {reason}")]
    ThreadSpawn { root_id: String, reason: String },

    /// Root worker did not hand over its queue in time
    #[error("Timed out waiting for root '{root_id}' to attach a delegate")]
    DelegateTimeout { root_id: String },

    /// Root cannot hand over its queue (already delegated or terminated)
    #[error("Root '{root_id}' cannot attach a delegate: {reason}")]
    DelegateUnavailable { root_id: String, reason: String },

    #[error(transparent)]
    Address(#[from] AddressError),

    #[error(transparent)]
    Call(#[from] CallError),
}

impl KernelError {
    pub fn unknown_root(root_id: impl Into<String>) -> Self {
        Self::UnknownRoot {
            root_id: root_id.into(),
        }
    }

    pub fn delegate_unavailable(root_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::DelegateUnavailable {
            root_id: root_id.into(),
            reason: reason.into(),
        }
    }
}

/// Result type for kernel operations
pub type Result<T> = std::result::Result<T, KernelError>;
