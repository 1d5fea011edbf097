//! # RootHub
//!
//! Registry mapping root ids to controllers, plus the dispatch function every
//! Call goes through. One RootHub is created per Hub and handed to each
//! controller at initialization; there is no global instance.
//!
//! ## Dispatch Fallback
//!
//! When the destination root is unknown (or already terminated) `dispatch`
//! returns false. A non-quiet request additionally gets a synthesized ERROR
//! delivered to its sender; anything else is dropped.
//!
//! # Lock Ordering
//!
//! `controllers` is always acquired before `aliases`.

use crate::context::Clock;
use crate::controller::Controller;
use crate::error::{KernelError, Result};
use crate::services::Services;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use types::{is_valid_id, Call, ErrorValue, Packet, Value};

pub struct RootHub {
    hub_id: String,
    controllers: RwLock<HashMap<String, Arc<Controller>>>,
    aliases: RwLock<HashMap<String, String>>,
    services: Arc<Services>,
    clock: Clock,
}

impl RootHub {
    pub fn new(hub_id: &str, services: Arc<Services>) -> Arc<Self> {
        Arc::new(Self {
            hub_id: hub_id.to_string(),
            controllers: RwLock::new(HashMap::new()),
            aliases: RwLock::new(HashMap::new()),
            services,
            clock: Clock::new(),
        })
    }

    /// Id of the hub pseudo-root
    pub fn hub_id(&self) -> &str {
        &self.hub_id
    }

    pub fn services(&self) -> &Arc<Services> {
        &self.services
    }

    pub fn clock(&self) -> Clock {
        self.clock
    }

    pub fn time(&self) -> i64 {
        self.clock.now()
    }

    pub(crate) fn register(&self, controller: Arc<Controller>) -> Result<()> {
        let root_id = controller.root_id().to_string();
        if self.aliases.read().contains_key(&root_id) {
            return Err(KernelError::DuplicateRoot { root_id });
        }
        let mut controllers = self.controllers.write();
        if controllers.contains_key(&root_id) {
            return Err(KernelError::DuplicateRoot { root_id });
        }
        controllers.insert(root_id, controller);
        Ok(())
    }

    /// Route packets for `alias` to the root `target`
    ///
    /// Used by the network root to receive calls for roots hosted elsewhere.
    pub fn register_alias(&self, alias: &str, target: &str) -> Result<()> {
        if !is_valid_id(alias) {
            return Err(KernelError::InvalidRootId {
                root_id: alias.to_string(),
            });
        }
        let controllers = self.controllers.read();
        if controllers.contains_key(alias) {
            return Err(KernelError::DuplicateRoot {
                root_id: alias.to_string(),
            });
        }
        if !controllers.contains_key(target) {
            return Err(KernelError::unknown_root(target));
        }
        self.aliases
            .write()
            .insert(alias.to_string(), target.to_string());
        info!(alias = %alias, target = %target, "Registered root alias");
        Ok(())
    }

    /// Controller for a root id, following aliases
    pub fn controller(&self, root_id: &str) -> Option<Arc<Controller>> {
        let controllers = self.controllers.read();
        if let Some(controller) = controllers.get(root_id) {
            return Some(Arc::clone(controller));
        }
        let aliases = self.aliases.read();
        aliases
            .get(root_id)
            .and_then(|target| controllers.get(target))
            .cloned()
    }

    /// Registered root ids (aliases excluded), sorted
    pub fn root_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.controllers.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Deliver a call to the controller of its root, false if unknown
    pub fn dispatch(&self, call: Call) -> bool {
        let Some(controller) = self.controller(call.root_id()) else {
            let reason = ErrorValue::new(
                "UnknownRoot",
                format!("No root '{}' for {}", call.root_id(), call.to()),
            );
            self.fallback(call, reason);
            return false;
        };
        match controller.try_submit(call) {
            Ok(()) => true,
            Err(call) => {
                self.fallback(call, ErrorValue::new("RootTerminated", "root terminated"));
                false
            }
        }
    }

    fn fallback(&self, call: Call, reason: ErrorValue) {
        if !call.is_reply_required() {
            debug!(call = %call, reason = %reason, "Dropping undeliverable call");
            return;
        }
        let Ok(response) = call.error(Value::Error(reason)) else {
            return;
        };
        let delivered = self
            .controller(response.root_id())
            .is_some_and(|sender| sender.try_submit(response).is_ok());
        if !delivered {
            warn!(call = %call, "Undeliverable request and its sender is gone");
        }
    }
}

impl std::fmt::Debug for RootHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RootHub")
            .field("hub_id", &self.hub_id)
            .field("roots", &self.root_ids())
            .finish()
    }
}
