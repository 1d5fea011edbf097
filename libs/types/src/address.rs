//! # Address Model
//!
//! Immutable routing keys for the messaging kernel.
//!
//! - [`ComponentAddress`]: hierarchical path of identifiers rooted at a root id,
//!   canonical form `/root/child/grandchild`
//! - [`ControlAddress`]: component address plus control id, canonical form
//!   `/root/child.control`
//!
//! The canonical string form is used for display, for hub-level routing keys
//! and on the wire, and must round-trip exactly through `parse`.
//!
//! ## Identifier Rule
//!
//! An identifier starts with an ASCII letter followed by any number of ASCII
//! letters, digits, `-` or `_`.

use crate::error::{AddressError, AddressResult};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Check an identifier against the address identifier rule
pub fn is_valid_id(id: &str) -> bool {
    let mut chars = id.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
        }
        _ => false,
    }
}

/// Hierarchical component path rooted at a root id
///
/// Segments are shared behind an `Arc` so addresses are cheap to clone into
/// every Call that carries them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComponentAddress {
    segments: Arc<[String]>,
}

impl ComponentAddress {
    /// Parse canonical text form, e.g. `/audio/osc1`
    pub fn parse(text: &str) -> AddressResult<Self> {
        if text.is_empty() {
            return Err(AddressError::Empty);
        }
        let path = text
            .strip_prefix('/')
            .ok_or_else(|| AddressError::MissingRoot {
                input: text.to_string(),
            })?;

        let mut segments = Vec::new();
        for id in path.split('/') {
            if !is_valid_id(id) {
                return Err(AddressError::invalid_id(text, id));
            }
            segments.push(id.to_string());
        }

        Ok(Self {
            segments: segments.into(),
        })
    }

    /// Address of a root component
    pub fn root(root_id: &str) -> AddressResult<Self> {
        if !is_valid_id(root_id) {
            return Err(AddressError::invalid_id(root_id, root_id));
        }
        Ok(Self {
            segments: vec![root_id.to_string()].into(),
        })
    }

    /// Address of a direct child of this component
    pub fn child(&self, id: &str) -> AddressResult<Self> {
        if !is_valid_id(id) {
            return Err(AddressError::invalid_id(&format!("{}/{}", self, id), id));
        }
        let mut segments = self.segments.to_vec();
        segments.push(id.to_string());
        Ok(Self {
            segments: segments.into(),
        })
    }

    /// Parent address, `None` for a root
    pub fn parent(&self) -> Option<Self> {
        if self.segments.len() <= 1 {
            return None;
        }
        Some(Self {
            segments: self.segments[..self.segments.len() - 1].to_vec().into(),
        })
    }

    /// Root id used for hub-level routing
    pub fn root_id(&self) -> &str {
        &self.segments[0]
    }

    /// Last path segment
    pub fn component_id(&self) -> &str {
        &self.segments[self.segments.len() - 1]
    }

    /// Segment at the given depth (0 is the root id)
    pub fn id_at(&self, depth: usize) -> Option<&str> {
        self.segments.get(depth).map(String::as_str)
    }

    /// Number of path segments
    pub fn depth(&self) -> usize {
        self.segments.len()
    }

    pub fn is_root(&self) -> bool {
        self.segments.len() == 1
    }

    /// Control address for a control on this component
    pub fn control(&self, control_id: &str) -> AddressResult<ControlAddress> {
        ControlAddress::new(self.clone(), control_id)
    }
}

impl fmt::Display for ComponentAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for id in self.segments.iter() {
            write!(f, "/{}", id)?;
        }
        Ok(())
    }
}

impl FromStr for ComponentAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Universal routing key: component address plus control id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ControlAddress {
    component: ComponentAddress,
    control: Arc<str>,
}

impl ControlAddress {
    pub fn new(component: ComponentAddress, control_id: &str) -> AddressResult<Self> {
        if !is_valid_id(control_id) {
            return Err(AddressError::invalid_id(
                &format!("{}.{}", component, control_id),
                control_id,
            ));
        }
        Ok(Self {
            component,
            control: control_id.into(),
        })
    }

    /// Parse canonical text form, e.g. `/audio/osc1.frequency`
    ///
    /// The control id is split at the last `.`, identifiers never contain one.
    pub fn parse(text: &str) -> AddressResult<Self> {
        if text.is_empty() {
            return Err(AddressError::Empty);
        }
        let (component, control) =
            text.rsplit_once('.')
                .ok_or_else(|| AddressError::MissingControl {
                    input: text.to_string(),
                })?;
        let component = ComponentAddress::parse(component).map_err(|e| match e {
            AddressError::InvalidId { id, .. } => AddressError::invalid_id(text, &id),
            AddressError::MissingRoot { .. } | AddressError::Empty => AddressError::MissingRoot {
                input: text.to_string(),
            },
            other => other,
        })?;
        if !is_valid_id(control) {
            return Err(AddressError::invalid_id(text, control));
        }
        Ok(Self {
            component,
            control: control.into(),
        })
    }

    pub fn component(&self) -> &ComponentAddress {
        &self.component
    }

    pub fn control_id(&self) -> &str {
        &self.control
    }

    pub fn root_id(&self) -> &str {
        self.component.root_id()
    }
}

impl fmt::Display for ControlAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.component, self.control)
    }
}

impl FromStr for ControlAddress {
    type Err = AddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
