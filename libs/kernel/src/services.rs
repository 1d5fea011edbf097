//! Service lookup table
//!
//! Maps service names to the component currently providing them. Built-in
//! services live under the hub pseudo-root; a network root may replace an
//! entry with a local proxy component.

use crate::context::RootContext;
use crate::error::{KernelError, Result};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use types::{Call, ComponentAddress, ControlAddress, Value};

#[derive(Debug, Default)]
pub struct Services {
    entries: RwLock<BTreeMap<String, ComponentAddress>>,
}

impl Services {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace a service, returning the previous provider
    pub fn register(&self, name: &str, address: ComponentAddress) -> Option<ComponentAddress> {
        self.entries.write().insert(name.to_string(), address)
    }

    pub fn remove(&self, name: &str) -> Option<ComponentAddress> {
        self.entries.write().remove(name)
    }

    pub fn locate(&self, name: &str) -> Option<ComponentAddress> {
        self.entries.read().get(name).cloned()
    }

    /// Control address of `control_id` on the provider of `name`
    pub fn control(&self, name: &str, control_id: &str) -> Result<ControlAddress> {
        let component = self
            .locate(name)
            .ok_or_else(|| KernelError::ServiceUnavailable {
                name: name.to_string(),
            })?;
        Ok(component.control(control_id)?)
    }

    /// Registered service names, sorted
    pub fn names(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }
}

/// Handler for a service hosted on the hub pseudo-root
///
/// The returned values become the reply arguments when the caller expects a
/// reply. Returning an [`ErrorValue`](types::ErrorValue) as the error keeps its
/// kind in the ERROR call.
pub trait ServiceHandler: Send + 'static {
    fn handle(&mut self, ctx: &mut RootContext, control: &str, call: &Call)
        -> anyhow::Result<Vec<Value>>;
}

impl<F> ServiceHandler for F
where
    F: FnMut(&mut RootContext, &str, &Call) -> anyhow::Result<Vec<Value>> + Send + 'static,
{
    fn handle(
        &mut self,
        ctx: &mut RootContext,
        control: &str,
        call: &Call,
    ) -> anyhow::Result<Vec<Value>> {
        self(ctx, control, call)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_replace_and_locate() {
        let services = Services::new();
        let hub_log = ComponentAddress::parse("/hub/log").unwrap();
        let net_log = ComponentAddress::parse("/net/log").unwrap();

        assert!(services.register("log", hub_log.clone()).is_none());
        assert_eq!(services.register("log", net_log.clone()), Some(hub_log));
        assert_eq!(services.locate("log"), Some(net_log));
        assert_eq!(
            services.control("log", "log").unwrap().to_string(),
            "/net/log.log"
        );
        assert!(matches!(
            services.control("compiler", "compile"),
            Err(KernelError::ServiceUnavailable { .. })
        ));
        assert_eq!(services.names(), vec!["log".to_string()]);
    }
}
