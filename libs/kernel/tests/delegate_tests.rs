//! # Delegate Tests
//!
//! Exclusive draining under concurrent submission: every call is delivered
//! exactly once no matter which context drains it.

mod common;

use common::{addr, until_hook, Event, Recorder, WAIT};
use kernel::{Hub, KernelError};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use types::{Call, Value};

const PRODUCERS: i64 = 4;
const PER_PRODUCER: i64 = 250;

#[test]
fn test_delegate_swaps_lose_nothing() {
    let (recorder, events) = Recorder::new();
    let hub = Arc::new(Hub::builder().root("recorder", recorder).build().unwrap());
    hub.start().unwrap();
    until_hook(&events, "starting");
    let controller = hub.controller("recorder").unwrap();

    let producers: Vec<_> = (0..PRODUCERS)
        .map(|p| {
            let hub = Arc::clone(&hub);
            thread::spawn(move || {
                let controller = hub.controller("recorder").unwrap();
                for i in 0..PER_PRODUCER {
                    let n = p * PER_PRODUCER + i;
                    let call = Call::quiet(
                        addr("/recorder.count"),
                        addr("/recorder.self"),
                        hub.root_hub().time(),
                        n as i32,
                        vec![Value::Int(n)],
                    );
                    assert!(controller.submit_packet(call));
                    if i % 50 == 0 {
                        thread::sleep(Duration::from_millis(1));
                    }
                }
            })
        })
        .collect();

    // Alternate between delegate and worker draining while producers run
    for _ in 0..5 {
        let mut delegate = controller.attach_delegate(WAIT).unwrap();
        assert_eq!(delegate.root_id(), "recorder");
        for _ in 0..10 {
            assert!(delegate.do_update(hub.root_hub().time()));
            delegate.do_timed_poll(Duration::from_millis(1));
        }
        delegate.detach();
        thread::sleep(Duration::from_millis(2));
    }
    for producer in producers {
        producer.join().unwrap();
    }

    let total = (PRODUCERS * PER_PRODUCER) as usize;
    let mut seen = BTreeSet::new();
    while seen.len() < total {
        match events.recv_timeout(WAIT).expect("calls went missing") {
            Event::Received(call) => {
                let n = call.arg(0).as_int().unwrap();
                assert!(seen.insert(n), "call {n} delivered twice");
            }
            Event::Hook(_) => {}
        }
    }
    assert!(events.recv_timeout(Duration::from_millis(100)).is_err());

    hub.shutdown();
    assert!(hub.await_termination(WAIT));
}

#[test]
fn test_second_attach_is_declined_while_delegated() {
    let (recorder, events) = Recorder::new();
    let hub = Hub::builder().root("recorder", recorder).build().unwrap();
    hub.start().unwrap();
    until_hook(&events, "starting");
    let controller = hub.controller("recorder").unwrap();

    let mut delegate = controller.attach_delegate(WAIT).unwrap();
    let waiter = {
        let controller = Arc::clone(&controller);
        thread::spawn(move || controller.attach_delegate(WAIT))
    };
    // The pending request is seen and declined by the delegate's next update
    thread::sleep(Duration::from_millis(50));
    assert!(delegate.do_update(0));
    assert!(matches!(
        waiter.join().unwrap(),
        Err(KernelError::DelegateUnavailable { .. })
    ));
    drop(delegate);

    // Dropping returned the root to its worker, which can hand it out again
    controller.attach_delegate(WAIT).unwrap().detach();
    hub.shutdown();
    assert!(hub.await_termination(WAIT));
}

#[test]
fn test_shutdown_while_delegated() {
    let (recorder, events) = Recorder::new();
    let hub = Hub::builder().root("recorder", recorder).build().unwrap();
    hub.start().unwrap();
    until_hook(&events, "starting");
    let controller = hub.controller("recorder").unwrap();

    let mut delegate = controller.attach_delegate(WAIT).unwrap();
    assert!(delegate.do_update(0));
    hub.shutdown();
    assert!(!delegate.do_update(1));
    assert!(!hub.await_termination(Duration::from_millis(50)));
    delegate.detach();
    assert!(hub.await_termination(WAIT));
    until_hook(&events, "terminating");
}

#[test]
fn test_attach_after_termination_fails() {
    let (recorder, _events) = Recorder::new();
    let hub = Hub::builder().root("recorder", recorder).build().unwrap();
    hub.start().unwrap();
    hub.shutdown();
    assert!(hub.await_termination(WAIT));
    let controller = hub.controller("recorder").unwrap();
    assert!(controller.attach_delegate(Duration::from_millis(50)).is_err());
}
