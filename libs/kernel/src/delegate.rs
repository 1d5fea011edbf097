//! # Delegate
//!
//! Externally clocked draining context for a root. Attaching a delegate
//! moves the root's queue, mailbox receiver and behavior into it; the root's
//! own worker blocks until the delegate is detached or dropped, at which
//! point ownership moves back. Because the whole core travels as one value,
//! no call can be delivered twice or lost across the swap.
//!
//! Calls are stamped with the hub clock, so frame times are read from it:
//!
//! ```no_run
//! # use kernel::{Controller, Delegate, Hub};
//! # use std::time::Duration;
//! # fn drive(hub: &Hub, controller: &Controller) -> kernel::Result<()> {
//! let mut delegate = controller.attach_delegate(Duration::from_secs(1))?;
//! while delegate.do_update(hub.root_hub().time()) {
//!     delegate.do_timed_poll(Duration::from_millis(1));
//! }
//! delegate.detach();
//! # Ok(())
//! # }
//! ```

use crate::root::RootState;
use crate::worker::RootCore;
use crossbeam_channel::Sender;
use std::time::Duration;
use tracing::debug;

/// Exclusive drain-owner token for one root
pub struct Delegate {
    core: Option<RootCore>,
    return_to: Sender<RootCore>,
}

impl Delegate {
    pub(crate) fn new(core: RootCore, return_to: Sender<RootCore>) -> Self {
        Self {
            core: Some(core),
            return_to,
        }
    }

    pub fn root_id(&self) -> &str {
        self.core.as_ref().map(RootCore::root_id).unwrap_or_default()
    }

    pub fn state(&self) -> Option<RootState> {
        self.core.as_ref().map(RootCore::state)
    }

    /// Run one drain cycle at the caller's clock `time`
    ///
    /// Returns false once the root has been asked to shut down; the caller
    /// should then detach so the worker can terminate the root.
    pub fn do_update(&mut self, time: i64) -> bool {
        let Some(core) = self.core.as_mut() else {
            return false;
        };
        if core.is_shutdown_requested() {
            return false;
        }
        core.drain_mailbox();
        core.decline_delegate_requests();
        core.cycle(time);
        core.decline_delegate_requests();
        !core.is_shutdown_requested()
    }

    /// Wait up to `timeout` for incoming packets, delivering any that are
    /// due at the last update time
    pub fn do_timed_poll(&mut self, timeout: Duration) -> bool {
        let Some(core) = self.core.as_mut() else {
            return false;
        };
        if core.is_shutdown_requested() {
            return false;
        }
        core.wait_for(timeout);
        core.decline_delegate_requests();
        core.process_due();
        !core.is_shutdown_requested()
    }

    /// Give draining rights back to the root's worker
    pub fn detach(self) {}
}

impl Drop for Delegate {
    fn drop(&mut self) {
        if let Some(core) = self.core.take() {
            debug!(root_id = %core.root_id(), "Returning root to its worker");
            // The worker is blocked waiting for this; it only disappears with the process
            let _ = self.return_to.send(core);
        }
    }
}

impl std::fmt::Debug for Delegate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Delegate")
            .field("root_id", &self.root_id())
            .finish()
    }
}
