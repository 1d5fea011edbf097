//! # Call Envelope
//!
//! Addressed, time-stamped message with request/reply/error semantics.
//!
//! A Call is immutable once built. Responses are produced by the pure
//! functions [`Call::reply`] and [`Call::error`], which swap `to`/`from` and
//! keep the request's match id so the sender can correlate the answer.
//!
//! ## Outcome Taxonomy
//!
//! | Request kind  | Possible outcomes                    |
//! |---------------|--------------------------------------|
//! | `Request`     | one `Reply` or one `Error`           |
//! | quiet request | none (responding is itself an error) |

use crate::address::ControlAddress;
use crate::error::{CallError, CallResult};
use crate::value::Value;
use std::fmt;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Arc;

/// Anything that can be routed to a root by a hub
pub trait Packet {
    /// Root id used for hub-level routing
    fn root_id(&self) -> &str;
}

/// Closed state tag of a Call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// A request, `quiet` means no response is expected
    Request { quiet: bool },
    Reply,
    Error,
}

impl CallKind {
    pub fn name(&self) -> &'static str {
        match self {
            CallKind::Request { quiet: false } => "REQUEST",
            CallKind::Request { quiet: true } => "QUIET",
            CallKind::Reply => "REPLY",
            CallKind::Error => "ERROR",
        }
    }
}

/// Message envelope exchanged between roots
#[derive(Debug, Clone, PartialEq)]
pub struct Call {
    to: ControlAddress,
    from: ControlAddress,
    time: i64,
    match_id: i32,
    args: Arc<[Value]>,
    kind: CallKind,
}

impl Call {
    /// Build a request that expects a reply or error
    pub fn request(
        to: ControlAddress,
        from: ControlAddress,
        time: i64,
        match_id: i32,
        args: Vec<Value>,
    ) -> Self {
        Self {
            to,
            from,
            time,
            match_id,
            args: args.into(),
            kind: CallKind::Request { quiet: false },
        }
    }

    /// Build a quiet request, no response will ever be produced
    pub fn quiet(
        to: ControlAddress,
        from: ControlAddress,
        time: i64,
        match_id: i32,
        args: Vec<Value>,
    ) -> Self {
        Self {
            kind: CallKind::Request { quiet: true },
            ..Self::request(to, from, time, match_id, args)
        }
    }

    /// Produce the REPLY to this request
    pub fn reply(&self, args: Vec<Value>) -> CallResult<Call> {
        self.check_respondable()?;
        Ok(Self {
            to: self.from.clone(),
            from: self.to.clone(),
            time: self.time,
            match_id: self.match_id,
            args: args.into(),
            kind: CallKind::Reply,
        })
    }

    /// Produce the ERROR response to this request, carrying exactly one value
    pub fn error(&self, value: Value) -> CallResult<Call> {
        self.check_respondable()?;
        Ok(Self {
            to: self.from.clone(),
            from: self.to.clone(),
            time: self.time,
            match_id: self.match_id,
            args: vec![value].into(),
            kind: CallKind::Error,
        })
    }

    fn check_respondable(&self) -> CallResult<()> {
        match self.kind {
            CallKind::Request { quiet: false } => Ok(()),
            CallKind::Request { quiet: true } => Err(CallError::QuietRequest {
                match_id: self.match_id,
            }),
            other => Err(CallError::NotARequest {
                kind: other.name(),
                match_id: self.match_id,
            }),
        }
    }

    /// Copy of this call stamped with a different time
    pub fn with_time(&self, time: i64) -> Call {
        Self {
            time,
            ..self.clone()
        }
    }

    pub fn to(&self) -> &ControlAddress {
        &self.to
    }

    pub fn from(&self) -> &ControlAddress {
        &self.from
    }

    pub fn time(&self) -> i64 {
        self.time
    }

    pub fn match_id(&self) -> i32 {
        self.match_id
    }

    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// Argument at `index`, or `Value::Empty` past the end
    pub fn arg(&self, index: usize) -> Value {
        self.args.get(index).cloned().unwrap_or(Value::Empty)
    }

    pub fn kind(&self) -> CallKind {
        self.kind
    }

    pub fn is_request(&self) -> bool {
        matches!(self.kind, CallKind::Request { .. })
    }

    pub fn is_quiet(&self) -> bool {
        matches!(self.kind, CallKind::Request { quiet: true })
    }

    /// A non-quiet request, i.e. someone is waiting for an answer
    pub fn is_reply_required(&self) -> bool {
        matches!(self.kind, CallKind::Request { quiet: false })
    }

    pub fn is_reply(&self) -> bool {
        matches!(self.kind, CallKind::Reply)
    }

    pub fn is_error(&self) -> bool {
        matches!(self.kind, CallKind::Error)
    }
}

impl Packet for Call {
    fn root_id(&self) -> &str {
        self.to.root_id()
    }
}

impl fmt::Display for Call {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} #{} {} -> {} @{} ({} args)",
            self.kind.name(),
            self.match_id,
            self.from,
            self.to,
            self.time,
            self.args.len()
        )
    }
}

/// Per-sender match id counter
///
/// Wraps around and never yields 0, which is reserved for System messages
/// on the wire.
#[derive(Debug)]
pub struct MatchIds {
    next: AtomicI32,
}

impl MatchIds {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: i32) -> Self {
        Self {
            next: AtomicI32::new(first),
        }
    }

    pub fn next_id(&self) -> i32 {
        loop {
            let id = self.next.fetch_add(1, Ordering::Relaxed);
            if id != 0 {
                return id;
            }
        }
    }
}

impl Default for MatchIds {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(text: &str) -> ControlAddress {
        ControlAddress::parse(text).unwrap()
    }

    #[test]
    fn test_reply_swaps_addresses_and_keeps_match_id() {
        let call = Call::request(addr("/a/b.c"), addr("/x.y"), 10, 77, vec![Value::from(1i64)]);
        let reply = call.reply(vec![Value::from("ok")]).unwrap();
        assert!(reply.is_reply());
        assert_eq!(reply.match_id(), 77);
        assert_eq!(reply.to(), call.from());
        assert_eq!(reply.from(), call.to());
        assert_eq!(reply.args(), &[Value::from("ok")]);

        let error = call.error(Value::error("Boom", "failed")).unwrap();
        assert!(error.is_error());
        assert_eq!(error.match_id(), 77);
        assert_eq!(error.args().len(), 1);
    }

    #[test]
    fn test_quiet_request_cannot_be_answered() {
        let call = Call::quiet(addr("/a.b"), addr("/x.y"), 0, 5, Vec::new());
        assert!(call.is_quiet());
        assert!(!call.is_reply_required());
        assert_eq!(
            call.reply(Vec::new()),
            Err(CallError::QuietRequest { match_id: 5 })
        );
        assert!(call.error(Value::Empty).is_err());
    }

    #[test]
    fn test_responses_cannot_be_answered() {
        let call = Call::request(addr("/a.b"), addr("/x.y"), 0, 9, Vec::new());
        let reply = call.reply(Vec::new()).unwrap();
        assert!(matches!(
            reply.reply(Vec::new()),
            Err(CallError::NotARequest { kind: "REPLY", .. })
        ));
        let error = call.error(Value::Empty).unwrap();
        assert!(matches!(
            error.error(Value::Empty),
            Err(CallError::NotARequest { kind: "ERROR", .. })
        ));
    }

    #[test]
    fn test_packet_root_id() {
        let call = Call::request(addr("/video/filter.mix"), addr("/hub.script"), 0, 1, Vec::new());
        assert_eq!(call.root_id(), "video");
    }

    #[test]
    fn test_match_ids_skip_zero() {
        let ids = MatchIds::starting_at(-1);
        assert_eq!(ids.next_id(), -1);
        assert_eq!(ids.next_id(), 1);
        assert_eq!(ids.next_id(), 2);

        let wrapping = MatchIds::starting_at(i32::MAX);
        assert_eq!(wrapping.next_id(), i32::MAX);
        assert_eq!(wrapping.next_id(), i32::MIN);
    }
}
