//! Root draining core
//!
//! [`RootCore`] bundles everything needed to drain one root: the user
//! behavior, its packet queue, the mailbox receiver and the context. Exactly
//! one execution context owns it at any time. The worker thread owns it by
//! default and moves it into a [`Delegate`] on attach; the delegate moves it
//! back on detach.

use crate::context::RootContext;
use crate::controller::{Control, Envelope};
use crate::delegate::Delegate;
use crate::queue::PacketQueue;
use crate::root::{Root, RootState};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, SendError, Sender};
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use types::{Call, ErrorValue, Value};

pub(crate) struct RootCore {
    root: Box<dyn Root>,
    queue: PacketQueue,
    mailbox: Receiver<Envelope>,
    ctx: RootContext,
    poll_interval: Duration,
    attach_request: Option<Sender<Delegate>>,
}

impl RootCore {
    pub(crate) fn new(
        root: Box<dyn Root>,
        mailbox: Receiver<Envelope>,
        ctx: RootContext,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue: PacketQueue::starting_at(ctx.time()),
            root,
            mailbox,
            ctx,
            poll_interval,
            attach_request: None,
        }
    }

    pub(crate) fn root_id(&self) -> &str {
        self.ctx.root_id()
    }

    pub(crate) fn state(&self) -> RootState {
        self.ctx.state()
    }

    pub(crate) fn is_shutdown_requested(&self) -> bool {
        self.ctx.is_shutdown_requested()
    }

    /// Worker thread body
    pub(crate) fn run(self) {
        let shared = std::sync::Arc::clone(self.ctx.shared());
        let root_id = self.root_id().to_string();
        info!(root_id = %root_id, "Root worker started");

        let mut core = self;
        if core.activate() {
            while !core.is_shutdown_requested() {
                core.drain_mailbox();
                if let Some(requester) = core.take_attach_request() {
                    match core.hand_off(requester) {
                        Some(returned) => core = returned,
                        None => {
                            error!(root_id = %root_id, "Delegate never returned the root, abandoning it");
                            shared.close();
                            shared.transition(RootState::Terminating);
                            shared.transition(RootState::Terminated);
                            return;
                        }
                    }
                    continue;
                }
                let now = core.ctx.router().now();
                core.cycle(now);
                if core.ctx_requests_delegate() {
                    continue;
                }
                core.wait(now);
            }
        }
        core.terminate();
        info!(root_id = %root_id, "Root worker exited");
    }

    /// NEW → ACTIVE_RUNNING; false if the root must be discarded
    fn activate(&mut self) -> bool {
        let ok = self.invoke("activating", |root, ctx| root.activating(ctx));
        if !ok || self.ctx.take_requested() != Some(RootState::ActiveRunning) {
            warn!(root_id = %self.root_id(), "Root did not become active, discarding");
            return false;
        }
        self.ctx.shared().transition(RootState::ActiveRunning);
        self.invoke("starting", |root, ctx| root.starting(ctx));
        self.apply_transitions();
        true
    }

    /// Move everything waiting in the mailbox into the queue
    pub(crate) fn drain_mailbox(&mut self) {
        while let Ok(envelope) = self.mailbox.try_recv() {
            self.accept(envelope);
        }
    }

    fn accept(&mut self, envelope: Envelope) {
        match envelope {
            Envelope::Packet(call) => self.queue.add(call),
            Envelope::Control(Control::Wake) => {}
            Envelope::Control(Control::AttachDelegate(requester)) => {
                if self.attach_request.is_some() {
                    debug!(root_id = %self.root_id(), "Declining concurrent delegate request");
                } else {
                    self.attach_request = Some(requester);
                }
            }
        }
    }

    fn take_attach_request(&mut self) -> Option<Sender<Delegate>> {
        self.attach_request
            .take()
            .or_else(|| self.ctx.take_delegate_request())
    }

    fn ctx_requests_delegate(&mut self) -> bool {
        if let Some(requester) = self.ctx.take_delegate_request() {
            self.attach_request.get_or_insert(requester);
            return true;
        }
        false
    }

    /// Drop pending delegate requests; their requesters see a disconnect
    pub(crate) fn decline_delegate_requests(&mut self) {
        if self.attach_request.take().is_some() || self.ctx.take_delegate_request().is_some() {
            debug!(root_id = %self.root_id(), "Delegate already attached, request declined");
        }
    }

    /// Give the core to a delegate and block until it comes back
    fn hand_off(self, requester: Sender<Delegate>) -> Option<RootCore> {
        let root_id = self.root_id().to_string();
        let (return_tx, return_rx) = bounded(1);
        let delegate = Delegate::new(self, return_tx);
        if let Err(SendError(delegate)) = requester.send(delegate) {
            // Requester gave up; dropping the delegate returns the core
            debug!(root_id = %root_id, "Delegate requester gone");
            drop(delegate);
        } else {
            info!(root_id = %root_id, "Delegate attached");
        }
        let core = return_rx.recv().ok();
        if core.is_some() {
            info!(root_id = %root_id, "Delegate detached");
        }
        core
    }

    /// One scheduling step at `time`
    pub(crate) fn cycle(&mut self, time: i64) {
        self.queue.set_time(time);
        self.ctx.set_time(time);
        self.process_due();
        if self.state() == RootState::ActiveRunning {
            self.invoke("update", |root, ctx| root.update(ctx));
            self.apply_transitions();
        }
    }

    /// Deliver every call due at the current cursor
    pub(crate) fn process_due(&mut self) {
        while let Some(call) = self.queue.poll() {
            self.deliver(call);
            self.apply_transitions();
        }
    }

    /// Block on the mailbox until the next call is due or a packet arrives
    pub(crate) fn wait_for(&mut self, timeout: Duration) {
        match self.mailbox.recv_timeout(timeout) {
            Ok(envelope) => {
                self.accept(envelope);
                self.drain_mailbox();
            }
            Err(RecvTimeoutError::Timeout) => {}
            Err(RecvTimeoutError::Disconnected) => {
                debug!(root_id = %self.root_id(), "Controller dropped, shutting down");
                self.ctx.shared().request_shutdown();
            }
        }
    }

    fn wait(&mut self, now: i64) {
        let timeout = match self.queue.next_due() {
            Some(due) => {
                let delta = due.wrapping_sub(now);
                if delta <= 0 {
                    return;
                }
                Duration::from_nanos(delta as u64).min(self.poll_interval)
            }
            None => self.poll_interval,
        };
        self.wait_for(timeout);
    }

    fn apply_transitions(&mut self) {
        while let Some(next) = self.ctx.take_requested() {
            match (self.state(), next) {
                (RootState::ActiveRunning, RootState::Idle) => {
                    self.ctx.shared().transition(RootState::Idle);
                    self.invoke("stopping", |root, ctx| root.stopping(ctx));
                }
                (RootState::Idle, RootState::ActiveRunning) => {
                    self.ctx.shared().transition(RootState::ActiveRunning);
                    self.invoke("starting", |root, ctx| root.starting(ctx));
                }
                _ => {}
            }
        }
    }

    /// Run one call through the root, converting failures into ERROR calls
    fn deliver(&mut self, call: Call) {
        let request = call.clone();
        let Self { root, ctx, .. } = self;
        let outcome = catch_unwind(AssertUnwindSafe(|| root.process_call(ctx, call)));
        let failure = match outcome {
            Ok(Ok(())) => return,
            Ok(Err(e)) => error_value(&e),
            Err(panic) => ErrorValue::new("Panic", panic_message(panic.as_ref())),
        };
        error!(
            root_id = %self.root_id(),
            call = %request,
            error = %failure,
            "Call processing failed"
        );
        if request.is_reply_required() {
            if let Ok(response) = request.error(Value::Error(failure)) {
                self.ctx.route(response);
            }
        }
    }

    fn invoke(
        &mut self,
        hook: &'static str,
        f: impl FnOnce(&mut dyn Root, &mut RootContext) -> anyhow::Result<()>,
    ) -> bool {
        let Self { root, ctx, .. } = self;
        match catch_unwind(AssertUnwindSafe(|| f(root.as_mut(), &mut *ctx))) {
            Ok(Ok(())) => true,
            Ok(Err(e)) => {
                error!(root_id = %ctx.root_id(), hook, error = %e, "Root hook failed");
                false
            }
            Err(panic) => {
                error!(
                    root_id = %ctx.root_id(),
                    hook,
                    panic = %panic_message(panic.as_ref()),
                    "Root hook panicked"
                );
                false
            }
        }
    }

    /// TERMINATING → flush → close → TERMINATED
    pub(crate) fn terminate(mut self) {
        self.ctx.shared().transition(RootState::Terminating);
        self.drain_mailbox();
        self.decline_delegate_requests();
        self.invoke("terminating", |root, ctx| root.terminating(ctx));

        if self.ctx.take_discard_pending() {
            let discarded = self.queue.clear();
            debug!(root_id = %self.root_id(), discarded, "Discarded pending calls");
        }
        while let Some(call) = self.queue.pop_next() {
            self.deliver(call);
        }

        self.ctx.shared().close();
        let mut rejected = 0usize;
        while let Ok(envelope) = self.mailbox.try_recv() {
            if let Envelope::Packet(call) = envelope {
                rejected += usize::from(self.reject(call));
            }
        }
        if rejected > 0 {
            debug!(root_id = %self.root_id(), rejected, "Answered late requests after close");
        }
        self.ctx.shared().transition(RootState::Terminated);
    }

    fn reject(&self, call: Call) -> bool {
        if !call.is_reply_required() {
            return false;
        }
        match call.error(Value::error("RootTerminated", "root terminated")) {
            Ok(response) => self.ctx.route(response),
            Err(_) => false,
        }
    }
}

/// Error payload for a failed call, keeping an ErrorValue raised by the root
fn error_value(error: &anyhow::Error) -> ErrorValue {
    error
        .downcast_ref::<ErrorValue>()
        .cloned()
        .unwrap_or_else(|| ErrorValue::new("Exception", format!("{:#}", error)))
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
