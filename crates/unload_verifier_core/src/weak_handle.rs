//! Non-owning handles over registered components.
//!
//! # Responsibility
//! - Track component instances without extending their lifetime.
//! - Report current reachability of every tracked instance on demand.
//!
//! # Invariants
//! - Capturing a handle never clones a strong reference.
//! - Resolution reads reference counts only; it never upgrades, so no strong
//!   reference outlives the call.
//! - The descriptive type name is copied at capture time and stays readable
//!   after the referent is gone.

use crate::model::component::Component;
use std::fmt::{Debug, Formatter};
use std::sync::{Arc, Weak};

/// Reachability of one tracked instance at resolution time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Something still holds a strong reference; carries the type name.
    Present(String),
    Absent,
}

impl Resolution {
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }
}

/// Weak reference to one component instance.
#[derive(Clone)]
pub struct WeakHandle {
    target: Weak<dyn Component>,
    type_name: String,
}

impl WeakHandle {
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn resolve(&self) -> Resolution {
        if self.target.strong_count() > 0 {
            Resolution::Present(self.type_name.clone())
        } else {
            Resolution::Absent
        }
    }

    /// Returns a strong reference if the instance is still alive.
    ///
    /// The caller owns the returned reference and keeps the instance alive
    /// for as long as it holds it.
    pub fn upgrade(&self) -> Option<Arc<dyn Component>> {
        self.target.upgrade()
    }
}

impl Debug for WeakHandle {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakHandle")
            .field("type_name", &self.type_name)
            .field("alive", &(self.target.strong_count() > 0))
            .finish()
    }
}

/// Wraps one instance in a weak handle.
pub fn capture(component: &Arc<dyn Component>) -> WeakHandle {
    WeakHandle {
        target: Arc::downgrade(component),
        type_name: component.type_name().to_string(),
    }
}

/// Resolves every handle in order.
pub fn resolve_all(handles: &[WeakHandle]) -> Vec<Resolution> {
    handles.iter().map(WeakHandle::resolve).collect()
}

/// Ordered collection of weak handles captured for one slot.
#[derive(Debug, Clone, Default)]
pub struct WeakHandleSet {
    handles: Vec<WeakHandle>,
}

impl WeakHandleSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capture(&mut self, component: &Arc<dyn Component>) {
        self.handles.push(capture(component));
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    pub fn handles(&self) -> &[WeakHandle] {
        &self.handles
    }

    pub fn resolve_all(&self) -> Vec<Resolution> {
        resolve_all(&self.handles)
    }

    /// Type names of every instance that is still reachable.
    pub fn alive_type_names(&self) -> Vec<String> {
        self.resolve_all()
            .into_iter()
            .filter_map(|resolution| match resolution {
                Resolution::Present(type_name) => Some(type_name),
                Resolution::Absent => None,
            })
            .collect()
    }
}
