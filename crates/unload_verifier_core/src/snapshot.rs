//! Pre-unload snapshot of dynamic slot contents.
//!
//! # Responsibility
//! - Capture weak handles to every non-base-layer instance on each slot.
//!
//! # Invariants
//! - Every input slot gets an entry, even when it holds nothing to track.
//! - Base-layer instances are never captured.
//! - Strong references obtained while enumerating are dropped before return;
//!   the registry is read, never mutated.

use crate::host::registry::ComponentRegistry;
use crate::model::slot::{PluginId, Slot};
use crate::weak_handle::WeakHandleSet;
use log::debug;

/// Weak handles captured for one slot before unload.
#[derive(Debug, Clone)]
pub struct SlotSnapshot {
    pub slot: Slot,
    pub handles: WeakHandleSet,
}

/// Captures one snapshot per slot, preserving input order.
pub fn snapshot(
    registry: &dyn ComponentRegistry,
    slots: &[Slot],
    base_layer: &PluginId,
) -> Vec<SlotSnapshot> {
    slots
        .iter()
        .map(|slot| {
            let mut handles = WeakHandleSet::new();
            let mut excluded = 0_usize;
            for instance in registry.instances_of(slot) {
                if instance.is_owned_by(base_layer) {
                    excluded += 1;
                    continue;
                }
                handles.capture(&instance.component);
            }
            debug!(
                "event=slot_snapshot module=snapshot slot={} captured={} excluded_base_layer={}",
                slot.name,
                handles.len(),
                excluded
            );
            SlotSnapshot {
                slot: slot.clone(),
                handles,
            }
        })
        .collect()
}
