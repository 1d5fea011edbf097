//! Call ↔ Message translation
//!
//! Outbound requests keep their `to`/`from` but carry a connection-scoped
//! match id; inbound requests are re-addressed so their replies come back to
//! the connection they arrived on. Responses are correlated purely by match
//! id.

use codec::{Message, HELLO};
use types::{Call, ControlAddress, ErrorValue, Value};

/// HELLO map key listing the sender's services
pub const HELLO_SERVICES: &str = "services";
/// HELLO map key carrying the sender's file server port, or Empty
pub const HELLO_FILE_SERVER: &str = "file-server";

/// Decoded meaning of one inbound Message
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// Request to dispatch on this hub
    Request(Call),
    /// Request naming a service this hub does not have
    Unresolved {
        match_id: i32,
        quiet: bool,
        error: ErrorValue,
    },
    /// Reply or error for one of our pending requests
    Response { match_id: i32, response: Response },
    /// Connection control data
    System { kind: String, data: Value },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Response {
    Reply(Vec<Value>),
    Error(Vec<Value>),
}

/// Wire form of an outbound request
///
/// With `service` set the receiver resolves the destination itself;
/// otherwise `to` is sent as a concrete remote address.
pub fn request_message(call: &Call, match_id: i32, service: Option<&str>) -> Message {
    let quiet = call.is_quiet();
    let args = call.args().to_vec();
    match service {
        Some(service) => Message::Service {
            match_id,
            quiet,
            service: service.to_string(),
            control: call.to().control_id().to_string(),
            from: call.from().clone(),
            args,
        },
        None => Message::Send {
            match_id,
            quiet,
            to: call.to().clone(),
            from: call.from().clone(),
            args,
        },
    }
}

/// Wire form of a local REPLY or ERROR; None for requests
pub fn response_message(call: &Call) -> Option<Message> {
    let match_id = call.match_id();
    let args = call.args().to_vec();
    if call.is_reply() {
        Some(Message::Reply { match_id, args })
    } else if call.is_error() {
        Some(Message::Error { match_id, args })
    } else {
        None
    }
}

/// Interpret an inbound Message
///
/// Requests become local Calls from `reply_to`, stamped at `time`, keeping
/// the wire match id. `resolve` maps `(service, control)` to a local address.
pub fn inbound(
    message: Message,
    reply_to: &ControlAddress,
    time: i64,
    resolve: impl FnOnce(&str, &str) -> Option<ControlAddress>,
) -> Inbound {
    match message {
        Message::Send {
            match_id,
            quiet,
            to,
            args,
            ..
        } => Inbound::Request(local_request(to, reply_to, time, match_id, quiet, args)),
        Message::Service {
            match_id,
            quiet,
            service,
            control,
            args,
            ..
        } => match resolve(&service, &control) {
            Some(to) => Inbound::Request(local_request(to, reply_to, time, match_id, quiet, args)),
            None => Inbound::Unresolved {
                match_id,
                quiet,
                error: ErrorValue::new(
                    "ServiceUnavailable",
                    format!("No service '{}' for control '{}'", service, control),
                ),
            },
        },
        Message::Reply { match_id, args } => Inbound::Response {
            match_id,
            response: Response::Reply(args),
        },
        Message::Error { match_id, args } => Inbound::Response {
            match_id,
            response: Response::Error(args),
        },
        Message::System { kind, data, .. } => Inbound::System { kind, data },
    }
}

fn local_request(
    to: ControlAddress,
    from: &ControlAddress,
    time: i64,
    match_id: i32,
    quiet: bool,
    args: Vec<Value>,
) -> Call {
    if quiet {
        Call::quiet(to, from.clone(), time, match_id, args)
    } else {
        Call::request(to, from.clone(), time, match_id, args)
    }
}

/// Local answer to `original` built from a remote response
pub fn answer(original: &Call, response: Response) -> Option<Call> {
    let answer = match response {
        Response::Reply(args) => original.reply(args),
        Response::Error(args) => {
            let value = args.into_iter().next().unwrap_or(Value::Empty);
            original.error(value)
        }
    };
    answer.ok()
}

/// What a peer announced in its HELLO
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PeerInfo {
    pub services: Vec<String>,
    pub file_server_port: Option<u16>,
}

impl PeerInfo {
    pub fn from_hello(data: &Value) -> Self {
        let Some(map) = data.as_map() else {
            return Self::default();
        };
        let services = map
            .get(HELLO_SERVICES)
            .and_then(Value::as_array)
            .map(|names| {
                names
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let file_server_port = map
            .get(HELLO_FILE_SERVER)
            .and_then(Value::as_int)
            .and_then(|port| u16::try_from(port).ok());
        Self {
            services,
            file_server_port,
        }
    }

    pub fn to_hello(&self) -> Message {
        let port = self
            .file_server_port
            .map_or(Value::Empty, |port| Value::Int(i64::from(port)));
        Message::hello(Value::map([
            (
                HELLO_SERVICES.to_string(),
                Value::array(self.services.iter().map(|name| Value::from(name.as_str()))),
            ),
            (HELLO_FILE_SERVER.to_string(), port),
        ]))
    }
}

/// True for the handshake System message
pub fn is_hello(kind: &str) -> bool {
    kind == HELLO
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(text: &str) -> ControlAddress {
        ControlAddress::parse(text).unwrap()
    }

    #[test]
    fn test_service_request_resolves_on_receiver() {
        let call = Call::request(
            addr("/net/compiler.compile"),
            addr("/script.run"),
            10,
            3,
            vec![Value::from("source")],
        );
        let message = request_message(&call, 41, Some("compiler"));
        assert_eq!(message.match_id(), 41);
        assert!(matches!(
            &message,
            Message::Service { service, control, .. } if service == "compiler" && control == "compile"
        ));

        let reply_to = addr("/net.conn-7");
        let inbound = inbound(message, &reply_to, 99, |service, control| {
            assert_eq!((service, control), ("compiler", "compile"));
            Some(addr("/hub/compiler.compile"))
        });
        let Inbound::Request(local) = inbound else {
            panic!("expected a request");
        };
        assert_eq!(local.to(), &addr("/hub/compiler.compile"));
        assert_eq!(local.from(), &reply_to);
        assert_eq!(local.match_id(), 41);
        assert_eq!(local.time(), 99);
        assert!(local.is_reply_required());
    }

    #[test]
    fn test_unknown_service_is_unresolved() {
        let message = Message::Service {
            match_id: 5,
            quiet: true,
            service: "missing".to_string(),
            control: "x".to_string(),
            from: addr("/a.b"),
            args: vec![],
        };
        match inbound(message, &addr("/net.conn-1"), 0, |_, _| None) {
            Inbound::Unresolved {
                match_id, quiet, ..
            } => {
                assert_eq!(match_id, 5);
                assert!(quiet);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_responses_answer_the_original() {
        let original = Call::request(addr("/video/mixer.level"), addr("/script.run"), 1, 8, vec![]);

        let reply = answer(&original, Response::Reply(vec![Value::Int(1)])).unwrap();
        assert!(reply.is_reply());
        assert_eq!(reply.match_id(), 8);
        assert_eq!(reply.to(), original.from());

        let error = answer(
            &original,
            Response::Error(vec![Value::error("Remote", "failed")]),
        )
        .unwrap();
        assert!(error.is_error());
        assert_eq!(error.arg(0).as_error().unwrap().kind(), "Remote");

        let local_reply = original.reply(vec![Value::Int(2)]).unwrap();
        assert_eq!(
            response_message(&local_reply),
            Some(Message::Reply {
                match_id: 8,
                args: vec![Value::Int(2)]
            })
        );
        assert_eq!(response_message(&original), None);
    }

    #[test]
    fn test_hello_round_trip() {
        let info = PeerInfo {
            services: vec!["compiler".to_string(), "log".to_string()],
            file_server_port: Some(8090),
        };
        let Message::System { kind, data, .. } = info.to_hello() else {
            panic!("expected a system message");
        };
        assert!(is_hello(&kind));
        assert_eq!(PeerInfo::from_hello(&data), info);
        assert_eq!(PeerInfo::from_hello(&Value::Empty), PeerInfo::default());
    }
}
