//! # Hub Pseudo-Root
//!
//! Hosts collaborator services as child components `/<hub>/<service>`.
//!
//! ## Built-in Services
//!
//! - **log** (`/hub/log.log`): first argument is a level (`ERROR`, `WARNING`,
//!   `INFO`, `DEBUG`), the remaining arguments form the message
//! - **system** (`/hub/system.<control>`):
//!   - `ping`: replies with the request arguments
//!   - `roots`: replies with the registered root ids
//!   - `services`: replies with the registered service names

use crate::context::RootContext;
use crate::root::Root;
use crate::services::ServiceHandler;
use std::collections::HashMap;
use tracing::{debug, error, info, warn};
use types::{Call, ErrorValue, Value};

pub const LOG_SERVICE: &str = "log";
pub const SYSTEM_SERVICE: &str = "system";

pub(crate) struct HubRoot {
    handlers: HashMap<String, Box<dyn ServiceHandler>>,
}

impl HubRoot {
    pub(crate) fn new(handlers: HashMap<String, Box<dyn ServiceHandler>>) -> Self {
        Self { handlers }
    }
}

impl Root for HubRoot {
    fn activating(&mut self, ctx: &mut RootContext) -> anyhow::Result<()> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        info!(root_id = %ctx.root_id(), services = ?names, "Hub root activating");
        ctx.set_running();
        Ok(())
    }

    fn process_call(&mut self, ctx: &mut RootContext, call: Call) -> anyhow::Result<()> {
        if !call.is_request() {
            debug!(call = %call, "Hub root ignoring response");
            return Ok(());
        }
        let component = call.to().component();
        let service = match component.id_at(1) {
            Some(service) if component.depth() == 2 => service,
            _ => {
                return Err(ErrorValue::new(
                    "UnknownControl",
                    format!("No service at {}", call.to()),
                )
                .into())
            }
        };
        let handler = self.handlers.get_mut(service).ok_or_else(|| {
            ErrorValue::new("ServiceUnavailable", format!("No service '{}'", service))
        })?;
        let result = handler.handle(ctx, call.to().control_id(), &call)?;
        if call.is_reply_required() {
            ctx.reply(&call, result)?;
        }
        Ok(())
    }
}

/// `log` service: forwards call arguments to tracing
pub(crate) fn log_service() -> Box<dyn ServiceHandler> {
    Box::new(
        |_ctx: &mut RootContext, control: &str, call: &Call| -> anyhow::Result<Vec<Value>> {
            if control != "log" {
                return Err(unknown_control(LOG_SERVICE, control).into());
            }
            let level = call.arg(0).to_string();
            let message = call
                .args()
                .iter()
                .skip(1)
                .map(Value::to_string)
                .collect::<Vec<_>>()
                .join(" ");
            let from = call.from();
            match level.as_str() {
                "ERROR" => error!(from = %from, "{}", message),
                "WARNING" => warn!(from = %from, "{}", message),
                "DEBUG" => debug!(from = %from, "{}", message),
                _ => info!(from = %from, "{}", message),
            }
            Ok(Vec::new())
        },
    )
}

/// `system` service: hub introspection
pub(crate) fn system_service() -> Box<dyn ServiceHandler> {
    Box::new(
        |ctx: &mut RootContext, control: &str, call: &Call| -> anyhow::Result<Vec<Value>> {
            match control {
                "ping" => Ok(call.args().to_vec()),
                "roots" => Ok(ctx.router().root_ids().into_iter().map(Value::from).collect()),
                "services" => Ok(ctx.services().names().into_iter().map(Value::from).collect()),
                other => Err(unknown_control(SYSTEM_SERVICE, other).into()),
            }
        },
    )
}

fn unknown_control(service: &str, control: &str) -> ErrorValue {
    ErrorValue::new(
        "UnknownControl",
        format!("Service '{}' has no control '{}'", service, control),
    )
}
