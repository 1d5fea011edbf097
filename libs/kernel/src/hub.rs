//! # Hub
//!
//! Top-level object owning every root of one kernel instance.
//!
//! ```no_run
//! # use kernel::{Hub, Root, RootContext};
//! # use types::Call;
//! # struct Echo;
//! # impl Root for Echo {
//! #     fn process_call(&mut self, ctx: &mut RootContext, call: Call) -> anyhow::Result<()> {
//! #         ctx.reply(&call, call.args().to_vec())?;
//! #         Ok(())
//! #     }
//! # }
//! # fn main() -> kernel::Result<()> {
//! let hub = Hub::builder().root("echo", Echo).build()?;
//! hub.start()?;
//! // ...
//! hub.shutdown();
//! hub.await_termination(std::time::Duration::from_secs(5));
//! # Ok(())
//! # }
//! ```
//!
//! Building a hub creates the [`RootHub`], the hub pseudo-root with its
//! services, and one [`Controller`] per root. Nothing runs until `start`.

use crate::controller::{Controller, DefaultThreadFactory, ThreadFactory};
use crate::error::{KernelError, Result};
use crate::hub_root::{log_service, system_service, HubRoot, LOG_SERVICE, SYSTEM_SERVICE};
use crate::root::Root;
use crate::root_hub::RootHub;
use crate::services::{ServiceHandler, Services};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use types::{is_valid_id, ComponentAddress};

/// Kernel-level knobs
#[derive(Debug, Clone)]
pub struct HubSettings {
    /// Id of the hub pseudo-root hosting built-in services
    pub hub_id: String,
    /// Longest a worker sleeps before re-checking its flags
    pub poll_interval: Duration,
    /// How long [`Hub::stop`] waits for roots to terminate
    pub shutdown_timeout: Duration,
}

impl Default for HubSettings {
    fn default() -> Self {
        Self {
            hub_id: "hub".to_string(),
            poll_interval: Duration::from_millis(50),
            shutdown_timeout: Duration::from_secs(10),
        }
    }
}

pub struct HubBuilder {
    roots: Vec<(String, Box<dyn Root>)>,
    services: Vec<(String, Box<dyn ServiceHandler>)>,
    settings: HubSettings,
    thread_factory: Arc<dyn ThreadFactory>,
}

impl HubBuilder {
    fn new() -> Self {
        Self {
            roots: Vec::new(),
            services: Vec::new(),
            settings: HubSettings::default(),
            thread_factory: Arc::new(DefaultThreadFactory::default()),
        }
    }

    pub fn root(mut self, root_id: &str, root: impl Root) -> Self {
        self.roots
            .push((root_id.to_string(), Box::new(root) as Box<dyn Root>));
        self
    }

    /// Host an extra service on the hub pseudo-root
    pub fn service(mut self, name: &str, handler: impl ServiceHandler) -> Self {
        self.services
            .push((name.to_string(), Box::new(handler) as Box<dyn ServiceHandler>));
        self
    }

    pub fn settings(mut self, settings: HubSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn thread_factory(mut self, factory: impl ThreadFactory + 'static) -> Self {
        self.thread_factory = Arc::new(factory);
        self
    }

    pub fn build(self) -> Result<Hub> {
        let HubBuilder {
            roots,
            services: extra_services,
            settings,
            thread_factory,
        } = self;

        let mut seen = HashSet::new();
        seen.insert(settings.hub_id.clone());
        for (root_id, _) in &roots {
            if !is_valid_id(root_id) {
                return Err(KernelError::InvalidRootId {
                    root_id: root_id.clone(),
                });
            }
            if !seen.insert(root_id.clone()) {
                return Err(KernelError::DuplicateRoot {
                    root_id: root_id.clone(),
                });
            }
        }

        let hub_address = ComponentAddress::root(&settings.hub_id)?;
        let services = Arc::new(Services::new());
        let mut handlers: HashMap<String, Box<dyn ServiceHandler>> = HashMap::new();
        handlers.insert(LOG_SERVICE.to_string(), log_service());
        handlers.insert(SYSTEM_SERVICE.to_string(), system_service());
        for (name, handler) in extra_services {
            if handlers.insert(name.clone(), handler).is_some() {
                warn!(service = %name, "Replacing built-in hub service");
            }
        }
        for name in handlers.keys() {
            services.register(name, hub_address.child(name)?);
        }

        let root_hub = RootHub::new(&settings.hub_id, services);
        let mut controllers = Vec::with_capacity(roots.len() + 1);
        controllers.push(Controller::initialize(
            &settings.hub_id,
            Box::new(HubRoot::new(handlers)),
            &root_hub,
            &settings,
        )?);
        for (root_id, root) in roots {
            controllers.push(Controller::initialize(&root_id, root, &root_hub, &settings)?);
        }

        info!(
            hub_id = %settings.hub_id,
            roots = controllers.len(),
            "Hub built"
        );
        Ok(Hub {
            root_hub,
            controllers,
            thread_factory,
            shutdown_timeout: settings.shutdown_timeout,
            started: AtomicBool::new(false),
        })
    }
}

/// Owns all roots, the RootHub and their lifecycle
pub struct Hub {
    root_hub: Arc<RootHub>,
    controllers: Vec<Arc<Controller>>,
    thread_factory: Arc<dyn ThreadFactory>,
    shutdown_timeout: Duration,
    started: AtomicBool,
}

impl Hub {
    pub fn builder() -> HubBuilder {
        HubBuilder::new()
    }

    pub fn root_hub(&self) -> &Arc<RootHub> {
        &self.root_hub
    }

    pub fn controller(&self, root_id: &str) -> Option<Arc<Controller>> {
        self.root_hub.controller(root_id)
    }

    pub fn services(&self) -> &Services {
        self.root_hub.services()
    }

    /// Start every root worker; fails on the first root that cannot start
    pub fn start(&self) -> Result<()> {
        if self.started.swap(true, Ordering::AcqRel) {
            return Err(KernelError::AlreadyStarted {
                root_id: self.root_hub.hub_id().to_string(),
            });
        }
        for controller in &self.controllers {
            controller.start(self.thread_factory.as_ref())?;
        }
        info!(hub_id = %self.root_hub.hub_id(), "Hub started");
        Ok(())
    }

    /// Request termination of every root; does not block
    pub fn shutdown(&self) {
        info!(hub_id = %self.root_hub.hub_id(), "Hub shutting down");
        for controller in &self.controllers {
            controller.shutdown();
        }
    }

    /// Shut down and wait up to the configured shutdown timeout
    pub fn stop(&self) -> bool {
        self.shutdown();
        self.await_termination(self.shutdown_timeout)
    }

    /// Wait until every root is TERMINATED, false on timeout
    pub fn await_termination(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        self.controllers.iter().all(|controller| {
            let remaining = deadline.saturating_duration_since(Instant::now());
            controller.await_termination(remaining)
        })
    }
}

impl std::fmt::Debug for Hub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hub")
            .field("root_hub", &self.root_hub)
            .field("started", &self.started.load(Ordering::Relaxed))
            .finish()
    }
}
