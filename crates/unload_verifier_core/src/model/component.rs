//! Registered component instances.

use crate::model::slot::PluginId;
use std::fmt::{Debug, Formatter};
use std::sync::Arc;

/// Object registered on a slot.
///
/// Implementors only need to be thread-safe; both methods have defaults.
pub trait Component: Send + Sync + 'static {
    /// Descriptive identity reported when the instance outlives its slot.
    fn type_name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }

    /// Teardown hook invoked by registries when the instance is removed.
    ///
    /// An `Err` tells a best-effort registry to keep the instance registered.
    fn dispose(&self) -> Result<(), String> {
        Ok(())
    }
}

/// One component registered on a slot together with its owning plugin.
#[derive(Clone)]
pub struct ComponentInstance {
    pub component: Arc<dyn Component>,
    pub owner: PluginId,
}

impl ComponentInstance {
    pub fn new(owner: PluginId, component: Arc<dyn Component>) -> Self {
        Self { component, owner }
    }

    pub fn type_name(&self) -> &'static str {
        self.component.type_name()
    }

    pub fn is_owned_by(&self, plugin: &PluginId) -> bool {
        &self.owner == plugin
    }
}

impl Debug for ComponentInstance {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("type_name", &self.type_name())
            .field("owner", &self.owner)
            .finish()
    }
}
