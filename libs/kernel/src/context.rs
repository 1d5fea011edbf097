//! # Root Context & Router
//!
//! [`RootContext`] is the scoped handle passed to every [`Root`](crate::Root)
//! hook. It knows the root's address and current time, mints match ids,
//! routes outgoing calls and records lifecycle requests for the kernel to
//! apply after the hook returns.
//!
//! [`Router`] is the cloneable, thread-safe part of it: anything holding a
//! router can feed calls into the hub through the same dispatch path as
//! in-process senders (network connections use it this way).

use crate::controller::ControllerShared;
use crate::delegate::Delegate;
use crate::error::{KernelError, Result};
use crate::root::RootState;
use crate::root_hub::RootHub;
use crate::services::Services;
use crossbeam_channel::Sender;
use std::sync::{Arc, Weak};
use std::time::Instant;
use types::{Call, ComponentAddress, ControlAddress, MatchIds, Value};

/// Monotonic hub time base, nanoseconds since the hub was created
#[derive(Debug, Clone, Copy)]
pub struct Clock {
    origin: Instant,
}

impl Clock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    pub fn now(&self) -> i64 {
        self.origin.elapsed().as_nanos() as i64
    }
}

impl Default for Clock {
    fn default() -> Self {
        Self::new()
    }
}

/// Thread-safe handle for feeding calls into a hub
#[derive(Debug, Clone)]
pub struct Router {
    hub: Weak<RootHub>,
    clock: Clock,
}

impl Router {
    pub fn new(hub: &Arc<RootHub>) -> Self {
        Self {
            hub: Arc::downgrade(hub),
            clock: hub.clock(),
        }
    }

    /// Dispatch a call, false if the destination is unknown or the hub is gone
    pub fn route(&self, call: Call) -> bool {
        match self.hub.upgrade() {
            Some(hub) => hub.dispatch(call),
            None => false,
        }
    }

    /// Current hub time
    pub fn now(&self) -> i64 {
        self.clock.now()
    }

    /// Registered root ids, empty once the hub is gone
    pub fn root_ids(&self) -> Vec<String> {
        self.hub
            .upgrade()
            .map(|hub| hub.root_ids())
            .unwrap_or_default()
    }

    /// Resolve `control_id` on whichever component provides `service`
    pub fn service_control(&self, service: &str, control_id: &str) -> Result<ControlAddress> {
        let hub = self
            .hub
            .upgrade()
            .ok_or_else(|| KernelError::ServiceUnavailable {
                name: service.to_string(),
            })?;
        hub.services().control(service, control_id)
    }

    pub fn service_names(&self) -> Vec<String> {
        self.hub
            .upgrade()
            .map(|hub| hub.services().names())
            .unwrap_or_default()
    }

    pub(crate) fn register_alias(&self, alias: &str, target: &str) -> Result<()> {
        let hub = self
            .hub
            .upgrade()
            .ok_or_else(|| KernelError::unknown_root(target))?;
        hub.register_alias(alias, target)
    }
}

/// Per-root handle passed to every lifecycle hook and `process_call`
pub struct RootContext {
    address: ComponentAddress,
    router: Router,
    services: Arc<Services>,
    shared: Arc<ControllerShared>,
    match_ids: MatchIds,
    time: i64,
    requested: Option<RootState>,
    delegate_request: Option<Sender<Delegate>>,
    discard_pending: bool,
}

impl RootContext {
    pub(crate) fn new(
        address: ComponentAddress,
        router: Router,
        services: Arc<Services>,
        shared: Arc<ControllerShared>,
    ) -> Self {
        let time = router.now();
        Self {
            address,
            router,
            services,
            shared,
            match_ids: MatchIds::new(),
            time,
            requested: None,
            delegate_request: None,
            discard_pending: false,
        }
    }

    pub fn root_id(&self) -> &str {
        self.address.root_id()
    }

    /// Address of the root component, `/<root_id>`
    pub fn address(&self) -> &ComponentAddress {
        &self.address
    }

    /// Control address on this root, for use as a `from` address
    pub fn control(&self, control_id: &str) -> Result<ControlAddress> {
        Ok(self.address.control(control_id)?)
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn services(&self) -> &Services {
        &self.services
    }

    /// Time of the current drain cycle
    pub fn time(&self) -> i64 {
        self.time
    }

    pub(crate) fn set_time(&mut self, time: i64) {
        self.time = time;
    }

    pub fn next_match_id(&self) -> i32 {
        self.match_ids.next_id()
    }

    /// Dispatch a prepared call
    pub fn route(&self, call: Call) -> bool {
        self.router.route(call)
    }

    /// Send a request stamped with the current time, returns its match id
    pub fn request(&self, to: ControlAddress, from: ControlAddress, args: Vec<Value>) -> i32 {
        let match_id = self.next_match_id();
        self.route(Call::request(to, from, self.time, match_id, args));
        match_id
    }

    /// Send a quiet request, no response will arrive
    pub fn send_quiet(&self, to: ControlAddress, from: ControlAddress, args: Vec<Value>) {
        let match_id = self.next_match_id();
        self.route(Call::quiet(to, from, self.time, match_id, args));
    }

    /// Request `control_id` on whichever component provides `service`
    pub fn service_request(
        &self,
        service: &str,
        control_id: &str,
        from: ControlAddress,
        args: Vec<Value>,
    ) -> Result<i32> {
        let to = self.services.control(service, control_id)?;
        Ok(self.request(to, from, args))
    }

    /// Route the REPLY to `call`
    pub fn reply(&self, call: &Call, args: Vec<Value>) -> Result<bool> {
        Ok(self.route(call.reply(args)?))
    }

    /// Route the ERROR response to `call`
    pub fn error(&self, call: &Call, value: Value) -> Result<bool> {
        Ok(self.route(call.error(value)?))
    }

    /// Make another root id resolve to this root
    pub fn register_alias(&self, alias: &str) -> Result<()> {
        self.router.register_alias(alias, self.root_id())
    }

    pub fn state(&self) -> RootState {
        self.shared.state()
    }

    /// Request ACTIVE_RUNNING; required during `activating`
    pub fn set_running(&mut self) {
        match self.state() {
            RootState::New | RootState::Idle => self.requested = Some(RootState::ActiveRunning),
            _ => {}
        }
    }

    /// Request a stop from ACTIVE_RUNNING to IDLE
    pub fn set_idle(&mut self) {
        if self.state() == RootState::ActiveRunning {
            self.requested = Some(RootState::Idle);
        }
    }

    pub(crate) fn take_requested(&mut self) -> Option<RootState> {
        self.requested.take()
    }

    /// Hand the queue to an external draining context once the current hook
    /// returns; the [`Delegate`] is sent on `sender`
    pub fn request_delegate(&mut self, sender: Sender<Delegate>) {
        self.delegate_request = Some(sender);
    }

    pub(crate) fn take_delegate_request(&mut self) -> Option<Sender<Delegate>> {
        self.delegate_request.take()
    }

    /// Drop every pending call instead of delivering it during termination
    pub fn discard_pending(&mut self) {
        self.discard_pending = true;
    }

    pub(crate) fn take_discard_pending(&mut self) -> bool {
        std::mem::take(&mut self.discard_pending)
    }

    pub fn is_shutdown_requested(&self) -> bool {
        self.shared.is_shutdown_requested()
    }

    pub(crate) fn shared(&self) -> &Arc<ControllerShared> {
        &self.shared
    }
}
