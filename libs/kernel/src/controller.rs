//! # Controller
//!
//! Thread-safe façade over a Root. Other threads only ever talk to a root
//! through its controller:
//!
//! - `submit_packet`: multi-producer mailbox send, false once terminated
//! - `start`: spins the worker through a [`ThreadFactory`]
//! - `shutdown`: advisory, observed at the next drain opportunity
//! - `await_termination`: blocks the caller only
//! - `attach_delegate`: asks the worker to hand over its queue
//!
//! ## Mailbox Closing
//!
//! `submit_packet` holds the read side of `closed` while sending; the worker
//! takes the write side to close. Every packet accepted before the close is
//! therefore seen by the worker's final mailbox drain and either delivered
//! or answered with an ERROR.

use crate::context::{RootContext, Router};
use crate::delegate::Delegate;
use crate::error::{KernelError, Result};
use crate::hub::HubSettings;
use crate::root::{Root, RootState};
use crate::root_hub::RootHub;
use crate::worker::RootCore;
use crossbeam_channel::{bounded, unbounded, RecvTimeoutError, SendError, Sender};
use parking_lot::{Condvar, Mutex, RwLock};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use types::{is_valid_id, Call, ComponentAddress};

/// Items carried by a root's mailbox
pub(crate) enum Envelope {
    Packet(Call),
    Control(Control),
}

pub(crate) enum Control {
    /// Wake the worker so it re-checks its flags
    Wake,
    AttachDelegate(Sender<Delegate>),
}

/// Creates the OS thread that drives a root
pub trait ThreadFactory: Send + Sync {
    fn spawn(&self, name: String, task: Box<dyn FnOnce() + Send>) -> std::io::Result<()>;
}

/// Named `std::thread` per root
#[derive(Debug, Default, Clone)]
pub struct DefaultThreadFactory {
    stack_size: Option<usize>,
}

impl DefaultThreadFactory {
    pub fn with_stack_size(stack_size: usize) -> Self {
        Self {
            stack_size: Some(stack_size),
        }
    }
}

impl ThreadFactory for DefaultThreadFactory {
    fn spawn(&self, name: String, task: Box<dyn FnOnce() + Send>) -> std::io::Result<()> {
        let mut builder = std::thread::Builder::new().name(name);
        if let Some(size) = self.stack_size {
            builder = builder.stack_size(size);
        }
        builder.spawn(task).map(|_| ())
    }
}

/// State shared between a controller and whichever context drains its root
#[derive(Debug)]
pub(crate) struct ControllerShared {
    root_id: String,
    state: Mutex<RootState>,
    terminated: Condvar,
    shutdown: AtomicBool,
    closed: RwLock<bool>,
}

impl ControllerShared {
    fn new(root_id: &str) -> Self {
        Self {
            root_id: root_id.to_string(),
            state: Mutex::new(RootState::New),
            terminated: Condvar::new(),
            shutdown: AtomicBool::new(false),
            closed: RwLock::new(false),
        }
    }

    pub(crate) fn state(&self) -> RootState {
        *self.state.lock()
    }

    /// Apply a transition from the table, ignoring invalid ones
    pub(crate) fn transition(&self, next: RootState) -> bool {
        let mut state = self.state.lock();
        let current = *state;
        if !current.can_transition_to(next) {
            warn!(
                root_id = %self.root_id,
                from = ?current,
                to = ?next,
                "Ignoring invalid root state transition"
            );
            return false;
        }
        *state = next;
        if next == RootState::Terminated {
            self.terminated.notify_all();
        }
        drop(state);
        info!(root_id = %self.root_id, from = ?current, to = ?next, "Root state changed");
        true
    }

    pub(crate) fn request_shutdown(&self) {
        self.shutdown.store(true, Ordering::Release);
    }

    pub(crate) fn is_shutdown_requested(&self) -> bool {
        self.shutdown.load(Ordering::Acquire)
    }

    /// Stop accepting packets; waits for in-progress submissions
    pub(crate) fn close(&self) {
        *self.closed.write() = true;
    }
}

/// Thread-safe handle used by outside callers to drive one root
pub struct Controller {
    shared: Arc<ControllerShared>,
    mailbox: Sender<Envelope>,
    pending: Mutex<Option<RootCore>>,
}

impl Controller {
    /// Bind `root` to `hub` under `root_id` and allocate its mailbox
    pub fn initialize(
        root_id: &str,
        root: Box<dyn Root>,
        hub: &Arc<RootHub>,
        settings: &HubSettings,
    ) -> Result<Arc<Controller>> {
        if !is_valid_id(root_id) {
            return Err(KernelError::InvalidRootId {
                root_id: root_id.to_string(),
            });
        }
        let address = ComponentAddress::root(root_id)?;
        let shared = Arc::new(ControllerShared::new(root_id));
        let (mailbox, receiver) = unbounded();
        let context = RootContext::new(
            address,
            Router::new(hub),
            Arc::clone(hub.services()),
            Arc::clone(&shared),
        );
        let core = RootCore::new(root, receiver, context, settings.poll_interval);

        let controller = Arc::new(Controller {
            shared,
            mailbox,
            pending: Mutex::new(Some(core)),
        });
        hub.register(Arc::clone(&controller))?;
        debug!(root_id = %root_id, "Root controller initialized");
        Ok(controller)
    }

    pub fn root_id(&self) -> &str {
        &self.shared.root_id
    }

    pub fn state(&self) -> RootState {
        self.shared.state()
    }

    /// Spin the worker that owns this root
    pub fn start(&self, factory: &dyn ThreadFactory) -> Result<()> {
        let core = self
            .pending
            .lock()
            .take()
            .ok_or_else(|| KernelError::AlreadyStarted {
                root_id: self.root_id().to_string(),
            })?;
        let name = format!("root-{}", self.root_id());
        factory
            .spawn(name, Box::new(move || core.run()))
            .map_err(|e| {
                // The core went down with the task; nothing will drain the mailbox
                self.shared.close();
                self.shared.transition(RootState::Terminating);
                self.shared.transition(RootState::Terminated);
                KernelError::ThreadSpawn {
                    root_id: self.root_id().to_string(),
                    reason: e.to_string(),
                }
            })
    }

    /// Enqueue a call; safe from any thread, false once terminated
    pub fn submit_packet(&self, call: Call) -> bool {
        self.try_submit(call).is_ok()
    }

    /// Like `submit_packet`, handing the call back on failure
    pub(crate) fn try_submit(&self, call: Call) -> std::result::Result<(), Call> {
        let closed = self.shared.closed.read();
        if *closed {
            return Err(call);
        }
        match self.mailbox.send(Envelope::Packet(call)) {
            Err(SendError(Envelope::Packet(call))) => Err(call),
            _ => Ok(()),
        }
    }

    /// Request termination; in-flight processing completes
    pub fn shutdown(&self) {
        self.shared.request_shutdown();
        let unstarted = self.pending.lock().take();
        match unstarted {
            // Never started: run the termination sequence on the caller
            Some(core) => core.terminate(),
            None => {
                let _ = self.mailbox.send(Envelope::Control(Control::Wake));
            }
        }
    }

    /// Block until the root is TERMINATED or `timeout` elapses
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut state = self.shared.state.lock();
        while *state != RootState::Terminated {
            if self
                .shared
                .terminated
                .wait_until(&mut state, deadline)
                .timed_out()
            {
                return *state == RootState::Terminated;
            }
        }
        true
    }

    /// Ask the root to hand its queue to an external draining context
    pub fn attach_delegate(&self, timeout: Duration) -> Result<Delegate> {
        if !self.state().is_alive() {
            return Err(KernelError::delegate_unavailable(
                self.root_id(),
                "root is terminating",
            ));
        }
        let (tx, rx) = bounded(1);
        if self
            .mailbox
            .send(Envelope::Control(Control::AttachDelegate(tx)))
            .is_err()
        {
            return Err(KernelError::delegate_unavailable(
                self.root_id(),
                "mailbox closed",
            ));
        }
        match rx.recv_timeout(timeout) {
            Ok(delegate) => Ok(delegate),
            Err(RecvTimeoutError::Timeout) => Err(KernelError::DelegateTimeout {
                root_id: self.root_id().to_string(),
            }),
            Err(RecvTimeoutError::Disconnected) => Err(KernelError::delegate_unavailable(
                self.root_id(),
                "request declined",
            )),
        }
    }
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("root_id", &self.shared.root_id)
            .field("state", &self.state())
            .finish()
    }
}
