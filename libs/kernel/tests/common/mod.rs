//! Shared fixtures for kernel integration tests

#![allow(dead_code)]

use crossbeam_channel::{unbounded, Receiver, Sender};
use kernel::{Root, RootContext};
use std::time::Duration;
use types::{Call, ControlAddress, ErrorValue};

pub const WAIT: Duration = Duration::from_secs(5);

pub fn addr(text: &str) -> ControlAddress {
    ControlAddress::parse(text).unwrap()
}

/// Everything a [`Recorder`] observes, in order
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Hook(&'static str),
    Received(Call),
}

/// Root that records hooks and calls, and answers a few controls
///
/// - `echo`: replies with the request arguments
/// - `reject`: fails with an `ErrorValue("Rejected", ..)`
/// - `boom`: fails with a plain error
/// - `panic`: panics
/// - `idle` / `run`: request IDLE / ACTIVE_RUNNING
pub struct Recorder {
    events: Sender<Event>,
}

impl Recorder {
    pub fn new() -> (Self, Receiver<Event>) {
        let (tx, rx) = unbounded();
        (Self { events: tx }, rx)
    }

    fn record(&self, event: Event) {
        let _ = self.events.send(event);
    }
}

impl Root for Recorder {
    fn activating(&mut self, ctx: &mut RootContext) -> anyhow::Result<()> {
        self.record(Event::Hook("activating"));
        ctx.set_running();
        Ok(())
    }

    fn starting(&mut self, _ctx: &mut RootContext) -> anyhow::Result<()> {
        self.record(Event::Hook("starting"));
        Ok(())
    }

    fn stopping(&mut self, _ctx: &mut RootContext) -> anyhow::Result<()> {
        self.record(Event::Hook("stopping"));
        Ok(())
    }

    fn terminating(&mut self, _ctx: &mut RootContext) -> anyhow::Result<()> {
        self.record(Event::Hook("terminating"));
        Ok(())
    }

    fn process_call(&mut self, ctx: &mut RootContext, call: Call) -> anyhow::Result<()> {
        self.record(Event::Received(call.clone()));
        if !call.is_request() {
            return Ok(());
        }
        match call.to().control_id() {
            "echo" => {
                ctx.reply(&call, call.args().to_vec())?;
            }
            "reject" => return Err(ErrorValue::new("Rejected", "not today").into()),
            "boom" => anyhow::bail!("boom"),
            "panic" => panic!("recorder exploded"),
            "idle" => ctx.set_idle(),
            "run" => ctx.set_running(),
            _ => {}
        }
        Ok(())
    }
}

/// Next received call, skipping hook events
pub fn next_call(events: &Receiver<Event>) -> Call {
    loop {
        match events.recv_timeout(WAIT).expect("timed out waiting for a call") {
            Event::Received(call) => return call,
            Event::Hook(_) => continue,
        }
    }
}

/// Wait until `hook` has been recorded, returning everything seen before it
pub fn until_hook(events: &Receiver<Event>, hook: &str) -> Vec<Event> {
    let mut seen = Vec::new();
    loop {
        let event = events
            .recv_timeout(WAIT)
            .unwrap_or_else(|_| panic!("timed out waiting for {hook}"));
        if matches!(event, Event::Hook(name) if name == hook) {
            return seen;
        }
        seen.push(event);
    }
}
