//! # Root Lifecycle
//!
//! A Root is an independently scheduled unit reachable by its root id. User
//! logic plugs in through the [`Root`] trait; the kernel owns the state
//! machine and decides when each hook runs.
//!
//! ## State Machine
//!
//! ```text
//! New ──activating + set_running──▶ ActiveRunning ◀──set_running──┐
//!  │                                    │      │                  │
//!  │ (no set_running)         set_idle  │      └──────▶ Idle ─────┘
//!  ▼                                    ▼                 │
//! Terminating ◀─────────────────── shutdown ◀─────────────┘
//!  │
//!  ▼
//! Terminated
//! ```
//!
//! `terminating` runs exactly once for every root that reaches a worker,
//! including roots discarded during activation.

use crate::context::RootContext;
use types::Call;

/// Lifecycle state of a Root
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootState {
    New,
    ActiveRunning,
    Idle,
    Terminating,
    Terminated,
}

impl RootState {
    /// Explicit transition table
    pub fn can_transition_to(self, next: RootState) -> bool {
        use RootState::*;
        matches!(
            (self, next),
            (New, ActiveRunning)
                | (New, Terminating)
                | (ActiveRunning, Idle)
                | (Idle, ActiveRunning)
                | (ActiveRunning, Terminating)
                | (Idle, Terminating)
                | (Terminating, Terminated)
        )
    }

    /// Still accepting and processing calls
    pub fn is_alive(self) -> bool {
        !matches!(self, RootState::Terminating | RootState::Terminated)
    }
}

/// Pluggable root behavior
///
/// Every method runs on the root's current draining context (its worker
/// thread or an attached delegate), never concurrently. Errors and panics are
/// caught at this boundary; a failing `process_call` for a non-quiet request
/// is answered with an ERROR call carrying the failure.
pub trait Root: Send + 'static {
    /// NEW → ACTIVE_RUNNING candidate; must call `ctx.set_running()` or the
    /// root is discarded
    fn activating(&mut self, ctx: &mut RootContext) -> anyhow::Result<()> {
        ctx.set_running();
        Ok(())
    }

    /// Entered ACTIVE_RUNNING
    fn starting(&mut self, _ctx: &mut RootContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Left ACTIVE_RUNNING for IDLE
    fn stopping(&mut self, _ctx: &mut RootContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called once before the draining context exits. Pending calls can be
    /// dropped with `ctx.discard_pending()`, otherwise they are still delivered.
    fn terminating(&mut self, _ctx: &mut RootContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Called once per drain cycle while ACTIVE_RUNNING
    fn update(&mut self, _ctx: &mut RootContext) -> anyhow::Result<()> {
        Ok(())
    }

    /// Handle one delivered call
    fn process_call(&mut self, ctx: &mut RootContext, call: Call) -> anyhow::Result<()>;
}
