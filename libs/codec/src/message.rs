//! # Wire Messages
//!
//! Tagged union mirroring the Call taxonomy for cross-process transmission.
//!
//! | Variant   | Tag | Counterpart                                       |
//! |-----------|-----|---------------------------------------------------|
//! | `Send`    | 1   | REQUEST to a concrete remote address              |
//! | `Service` | 2   | REQUEST to a named service, resolved by receiver  |
//! | `Reply`   | 3   | REPLY, correlated by match id only                |
//! | `Error`   | 4   | ERROR, correlated by match id only                |
//! | `System`  | 5   | per-connection control data (e.g. `HELLO`)        |

use types::{ControlAddress, Value};

/// System message type sent once per connection after connect/accept
pub const HELLO: &str = "HELLO";

/// Wire representation of a Call or connection control data
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Send {
        match_id: i32,
        quiet: bool,
        to: ControlAddress,
        from: ControlAddress,
        args: Vec<Value>,
    },
    Service {
        match_id: i32,
        quiet: bool,
        service: String,
        control: String,
        from: ControlAddress,
        args: Vec<Value>,
    },
    Reply {
        match_id: i32,
        args: Vec<Value>,
    },
    Error {
        match_id: i32,
        args: Vec<Value>,
    },
    System {
        match_id: i32,
        kind: String,
        data: Value,
    },
}

impl Message {
    pub(crate) const TAG_SEND: u8 = 1;
    pub(crate) const TAG_SERVICE: u8 = 2;
    pub(crate) const TAG_REPLY: u8 = 3;
    pub(crate) const TAG_ERROR: u8 = 4;
    pub(crate) const TAG_SYSTEM: u8 = 5;

    /// HELLO handshake carrying the sender's connection info
    pub fn hello(data: Value) -> Self {
        Message::System {
            match_id: 0,
            kind: HELLO.to_string(),
            data,
        }
    }

    pub fn match_id(&self) -> i32 {
        match self {
            Message::Send { match_id, .. }
            | Message::Service { match_id, .. }
            | Message::Reply { match_id, .. }
            | Message::Error { match_id, .. }
            | Message::System { match_id, .. } => *match_id,
        }
    }

    /// Variant name for logging
    pub fn name(&self) -> &'static str {
        match self {
            Message::Send { .. } => "Send",
            Message::Service { .. } => "Service",
            Message::Reply { .. } => "Reply",
            Message::Error { .. } => "Error",
            Message::System { .. } => "System",
        }
    }

    pub(crate) fn tag(&self) -> u8 {
        match self {
            Message::Send { .. } => Self::TAG_SEND,
            Message::Service { .. } => Self::TAG_SERVICE,
            Message::Reply { .. } => Self::TAG_REPLY,
            Message::Error { .. } => Self::TAG_ERROR,
            Message::System { .. } => Self::TAG_SYSTEM,
        }
    }

    /// True for Send and Service, i.e. messages that open a request
    pub fn is_request(&self) -> bool {
        matches!(self, Message::Send { .. } | Message::Service { .. })
    }
}
