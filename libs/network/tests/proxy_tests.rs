//! # Proxy Tests
//!
//! Two hubs in one process talking over localhost: service and remote root
//! proxies, error propagation, HELLO exchange, frame size limits and
//! connection teardown.

mod common;

use common::{addr, client_hub, next_call, request, server_hub, server_hub_with, stop, WAIT};
use network::{NetworkConfig, ProxyTarget, CONNECTION_CLOSED, FRAME_TOO_LARGE};
use std::net::TcpListener;
use std::time::{Duration, Instant};
use types::{Reference, Value};

fn proxy_to(port: u16, roots: &[&str]) -> NetworkConfig {
    NetworkConfig::default().with_proxy(
        "compiler",
        ProxyTarget::Remote {
            host: "127.0.0.1".to_string(),
            port,
        },
        roots,
    )
}

fn server_port(handle: &network::NetworkHandle) -> u16 {
    handle.listen_addr().expect("server hub listens").port()
}

#[test]
fn test_service_request_round_trip() {
    let (server, server_net, _video) = server_hub();
    let (client, _client_net, client_calls) = client_hub(proxy_to(server_port(&server_net), &[]));

    let to = client.services().control("compiler", "compile").unwrap();
    assert_eq!(to, addr("/net/compiler.compile"));
    let call = request(&client, to, 11, vec![Value::from("main.pd")]);

    let reply = next_call(&client_calls);
    assert!(reply.is_reply(), "unexpected {reply}");
    assert_eq!(reply.match_id(), 11);
    assert_eq!(reply.to(), call.from());
    assert_eq!(reply.args(), &[Value::from("compiled:main.pd")]);

    stop(client);
    stop(server);
}

#[test]
fn test_remote_root_alias_round_trip() {
    let (server, server_net, video_calls) = server_hub();
    let (client, _client_net, client_calls) =
        client_hub(proxy_to(server_port(&server_net), &["video"]));

    request(&client, addr("/video/mixer.echo"), 4, vec![Value::Int(3), Value::Bool(true)]);

    let delivered = next_call(&video_calls);
    assert_eq!(delivered.to(), &addr("/video/mixer.echo"));
    assert_eq!(delivered.from().root_id(), "net");
    assert!(delivered.from().control_id().starts_with("conn-"));

    let reply = next_call(&client_calls);
    assert!(reply.is_reply());
    assert_eq!(reply.match_id(), 4);
    assert_eq!(reply.args(), &[Value::Int(3), Value::Bool(true)]);

    stop(client);
    stop(server);
}

#[test]
fn test_remote_errors_come_back_as_errors() {
    let (server, server_net, _video) = server_hub();
    let (client, _client_net, client_calls) =
        client_hub(proxy_to(server_port(&server_net), &["video"]));

    request(&client, addr("/video/mixer.fail"), 9, vec![]);
    let error = next_call(&client_calls);
    assert!(error.is_error());
    assert_eq!(error.match_id(), 9);
    assert_eq!(error.arg(0).as_error().unwrap().kind(), "Failed");

    request(&client, addr("/net/compiler.optimise"), 10, vec![]);
    let error = next_call(&client_calls);
    assert!(error.is_error());
    assert_eq!(error.match_id(), 10);
    assert_eq!(error.arg(0).as_error().unwrap().kind(), "UnknownControl");

    stop(client);
    stop(server);
}

#[test]
fn test_peers_exchange_hello() {
    let (server, server_net, _video) = server_hub();
    let (client, client_net, client_calls) = client_hub(proxy_to(server_port(&server_net), &[]));

    let to = client.services().control("compiler", "compile").unwrap();
    request(&client, to, 1, vec![Value::from("x")]);
    assert!(next_call(&client_calls).is_reply());

    let peers = client_net.peers();
    assert_eq!(peers.len(), 1);
    let server_info = peers.values().next().unwrap();
    assert!(server_info.services.contains(&"compiler".to_string()));
    assert_eq!(server_info.file_server_port, None);

    let deadline = Instant::now() + WAIT;
    while server_net.peers().is_empty() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(10));
    }
    let client_info = server_net.peers().into_values().next().unwrap();
    assert!(client_info.services.contains(&"compiler".to_string()));

    stop(client);
    stop(server);
}

#[test]
fn test_references_fail_before_sending() {
    let (server, server_net, video_calls) = server_hub();
    let (client, _client_net, client_calls) =
        client_hub(proxy_to(server_port(&server_net), &["video"]));

    request(
        &client,
        addr("/video/mixer.echo"),
        5,
        vec![Value::Reference(Reference::new(7u32))],
    );
    let error = next_call(&client_calls);
    assert!(error.is_error());
    assert_eq!(error.match_id(), 5);
    assert_eq!(error.arg(0).as_error().unwrap().kind(), "UnsupportedValue");
    assert!(video_calls.recv_timeout(Duration::from_millis(200)).is_err());

    stop(client);
    stop(server);
}

#[test]
fn test_unreachable_peer_fails_request() {
    let port = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    };
    let (client, _client_net, client_calls) = client_hub(proxy_to(port, &[]));

    let to = client.services().control("compiler", "compile").unwrap();
    request(&client, to, 2, vec![]);
    let error = next_call(&client_calls);
    assert!(error.is_error());
    assert_eq!(error.match_id(), 2);
    assert_eq!(error.arg(0).as_error().unwrap().kind(), CONNECTION_CLOSED);

    stop(client);
}

#[test]
fn test_pending_requests_fail_when_peer_goes_away() {
    let (server, server_net, video_calls) = server_hub();
    let (client, _client_net, client_calls) =
        client_hub(proxy_to(server_port(&server_net), &["video"]));

    request(&client, addr("/video/mixer.hold"), 21, vec![]);
    assert_eq!(next_call(&video_calls).to(), &addr("/video/mixer.hold"));
    stop(server);

    let error = next_call(&client_calls);
    assert!(error.is_error());
    assert_eq!(error.match_id(), 21);
    assert_eq!(error.arg(0).as_error().unwrap().kind(), CONNECTION_CLOSED);

    stop(client);
}

#[test]
fn test_oversized_request_fails_alone() {
    let (server, server_net, video_calls) = server_hub();
    let (client, _client_net, client_calls) =
        client_hub(proxy_to(server_port(&server_net), &["video"]));

    request(&client, addr("/video/mixer.hold"), 1, vec![]);
    assert_eq!(next_call(&video_calls).to(), &addr("/video/mixer.hold"));

    let oversized = Value::from(vec![0u8; 17 * 1024 * 1024]);
    request(&client, addr("/video/mixer.echo"), 2, vec![oversized]);
    let error = next_call(&client_calls);
    assert!(error.is_error());
    assert_eq!(error.match_id(), 2);
    assert_eq!(error.arg(0).as_error().unwrap().kind(), FRAME_TOO_LARGE);

    // The link survives and the held request is still pending
    request(&client, addr("/video/mixer.echo"), 3, vec![Value::Int(3)]);
    assert_eq!(next_call(&video_calls).to(), &addr("/video/mixer.echo"));
    let reply = next_call(&client_calls);
    assert!(reply.is_reply(), "unexpected {reply}");
    assert_eq!(reply.match_id(), 3);
    assert!(client_calls.recv_timeout(Duration::from_millis(200)).is_err());

    stop(server);
    let error = next_call(&client_calls);
    assert_eq!(error.match_id(), 1);
    assert_eq!(error.arg(0).as_error().unwrap().kind(), CONNECTION_CLOSED);

    stop(client);
}

#[test]
fn test_oversized_reply_becomes_error() {
    let mut config = NetworkConfig::default();
    config.connection.max_frame_size = 4096;
    let (server, server_net, _video) = server_hub_with(config);
    let (client, _client_net, client_calls) =
        client_hub(proxy_to(server_port(&server_net), &["video"]));

    request(&client, addr("/video/mixer.inflate"), 6, vec![Value::Int(10_000)]);
    let error = next_call(&client_calls);
    assert!(error.is_error(), "unexpected {error}");
    assert_eq!(error.match_id(), 6);
    assert_eq!(error.arg(0).as_error().unwrap().kind(), FRAME_TOO_LARGE);

    request(&client, addr("/video/mixer.inflate"), 7, vec![Value::Int(100)]);
    let reply = next_call(&client_calls);
    assert!(reply.is_reply(), "unexpected {reply}");
    assert_eq!(reply.match_id(), 7);
    assert_eq!(reply.arg(0), Value::from(vec![0u8; 100]));

    stop(client);
    stop(server);
}
