//! Shared fixtures for network integration tests

#![allow(dead_code)]

use crossbeam_channel::{unbounded, Receiver, Sender};
use kernel::{Hub, Root, RootContext, RootState};
use network::{NetworkConfig, NetworkHandle, NetworkRoot};
use std::time::{Duration, Instant};
use types::{Call, ControlAddress, ErrorValue, Value};

pub const WAIT: Duration = Duration::from_secs(10);

pub fn addr(text: &str) -> ControlAddress {
    ControlAddress::parse(text).unwrap()
}

/// Root that forwards every call it receives to a channel
///
/// Requests to `echo` are answered with their arguments, `inflate` with
/// that many zero bytes, `fail` is rejected with an `ErrorValue("Failed", ..)`,
/// anything else is left unanswered.
pub struct Collector {
    calls: Sender<Call>,
}

impl Collector {
    pub fn new() -> (Self, Receiver<Call>) {
        let (tx, rx) = unbounded();
        (Self { calls: tx }, rx)
    }
}

impl Root for Collector {
    fn process_call(&mut self, ctx: &mut RootContext, call: Call) -> anyhow::Result<()> {
        let _ = self.calls.send(call.clone());
        if !call.is_request() {
            return Ok(());
        }
        match call.to().control_id() {
            "echo" => {
                ctx.reply(&call, call.args().to_vec())?;
            }
            "inflate" => {
                let size = call.arg(0).as_int().unwrap_or_default() as usize;
                ctx.reply(&call, vec![Value::from(vec![0u8; size])])?;
            }
            "fail" => return Err(ErrorValue::new("Failed", "as asked").into()),
            _ => {}
        }
        Ok(())
    }
}

/// Hub B: a `compiler` service on the hub root, a `video` collector root and
/// a listening network root
pub fn server_hub() -> (Hub, NetworkHandle, Receiver<Call>) {
    server_hub_with(NetworkConfig::default())
}

/// [`server_hub`] with its network root built from `config`
pub fn server_hub_with(config: NetworkConfig) -> (Hub, NetworkHandle, Receiver<Call>) {
    let net = NetworkRoot::new(config.with_listen_port(0)).unwrap();
    let handle = net.handle();
    let (video, video_calls) = Collector::new();
    let hub = Hub::builder()
        .root("net", net)
        .root("video", video)
        .service(
            "compiler",
            |_ctx: &mut RootContext, control: &str, call: &Call| -> anyhow::Result<Vec<Value>> {
                match control {
                    "compile" => {
                        let source = call.arg(0);
                        let source = source.as_str().unwrap_or_default();
                        Ok(vec![Value::from(format!("compiled:{source}"))])
                    }
                    other => Err(ErrorValue::new("UnknownControl", other).into()),
                }
            },
        )
        .build()
        .unwrap();
    hub.start().unwrap();
    wait_running(&hub, &["net", "video"]);
    (hub, handle, video_calls)
}

/// Hub A: a `client` collector and a network root built from `config`
pub fn client_hub(config: NetworkConfig) -> (Hub, NetworkHandle, Receiver<Call>) {
    let net = NetworkRoot::new(config).unwrap();
    let handle = net.handle();
    let (client, client_calls) = Collector::new();
    let hub = Hub::builder()
        .root("net", net)
        .root("client", client)
        .build()
        .unwrap();
    hub.start().unwrap();
    wait_running(&hub, &["net", "client"]);
    (hub, handle, client_calls)
}

/// Block until every listed root has finished activating
pub fn wait_running(hub: &Hub, root_ids: &[&str]) {
    let deadline = Instant::now() + WAIT;
    for root_id in root_ids {
        let controller = hub.controller(root_id).unwrap();
        while controller.state() != RootState::ActiveRunning {
            assert!(Instant::now() < deadline, "{root_id} never started");
            std::thread::sleep(Duration::from_millis(5));
        }
    }
}

pub fn request(hub: &Hub, to: ControlAddress, match_id: i32, args: Vec<Value>) -> Call {
    let call = Call::request(to, addr("/client.out"), hub.root_hub().time(), match_id, args);
    hub.root_hub().dispatch(call.clone());
    call
}

pub fn next_call(calls: &Receiver<Call>) -> Call {
    calls.recv_timeout(WAIT).expect("timed out waiting for a call")
}

pub fn stop(hub: Hub) {
    hub.shutdown();
    assert!(hub.await_termination(WAIT));
}
