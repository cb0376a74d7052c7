//! Component registry contract and in-process registry.

use crate::host::collector::DeferredReleaseQueue;
use crate::host::execution::panic_message;
use crate::model::component::{Component, ComponentInstance};
use crate::model::slot::{PluginId, Slot, SlotValidationError};
use log::debug;
use std::collections::BTreeMap;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

/// Retention predicate passed to `unregister`; `false` removes the instance.
pub type RetainFn<'a> = &'a (dyn Fn(&ComponentInstance) -> bool + Sync);

/// Best-effort result of one slot's unregister call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnregisterOutcome {
    pub removed: usize,
    /// One line per instance that could not be removed.
    pub removal_failures: Vec<String>,
}

/// Registry the harness enumerates and unloads.
pub trait ComponentRegistry: Send + Sync {
    /// Lists every slot in a stable order.
    fn list_slots(&self) -> Vec<Slot>;

    /// Returns the instances currently registered on `slot`.
    fn instances_of(&self, slot: &Slot) -> Vec<ComponentInstance>;

    /// Removes every instance of `slot` for which `retain` returns `false`.
    ///
    /// With `best_effort`, an instance that fails to tear down is recorded in
    /// the outcome and the loop continues; otherwise the first failure aborts
    /// the call with an error.
    fn unregister(
        &self,
        slot: &Slot,
        retain: RetainFn<'_>,
        best_effort: bool,
    ) -> Result<UnregisterOutcome, RegistryError>;
}

/// Registry declaration and mutation errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    InvalidSlot(SlotValidationError),
    DuplicateSlot(String),
    SlotNotFound(String),
    InstanceRejected { type_name: String, reason: String },
}

impl Display for RegistryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidSlot(err) => write!(f, "invalid slot declaration: {err}"),
            Self::DuplicateSlot(name) => write!(f, "slot already registered: {name}"),
            Self::SlotNotFound(name) => write!(f, "slot not found: {name}"),
            Self::InstanceRejected { type_name, reason } => {
                write!(f, "instance {type_name} refused removal: {reason}")
            }
        }
    }
}

impl Error for RegistryError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::InvalidSlot(err) => Some(err),
            _ => None,
        }
    }
}

impl From<SlotValidationError> for RegistryError {
    fn from(value: SlotValidationError) -> Self {
        Self::InvalidSlot(value)
    }
}

struct SlotEntry {
    slot: Slot,
    instances: Vec<ComponentInstance>,
}

/// In-process registry keyed by slot name.
///
/// Slots iterate in name order. When a `DeferredReleaseQueue` is attached,
/// removed instances are parked there until the next forced collection
/// instead of being dropped immediately.
#[derive(Default)]
pub struct InMemoryRegistry {
    slots: RwLock<BTreeMap<String, SlotEntry>>,
    release_queue: Option<Arc<DeferredReleaseQueue>>,
}

impl InMemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deferred_release(queue: Arc<DeferredReleaseQueue>) -> Self {
        Self {
            slots: RwLock::default(),
            release_queue: Some(queue),
        }
    }

    /// Declares one slot.
    pub fn register_slot(&self, slot: Slot) -> Result<(), RegistryError> {
        slot.validate()?;
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        if slots.contains_key(slot.name.as_str()) {
            return Err(RegistryError::DuplicateSlot(slot.name));
        }
        slots.insert(
            slot.name.clone(),
            SlotEntry {
                slot,
                instances: Vec::new(),
            },
        );
        Ok(())
    }

    /// Registers one component on an existing slot.
    pub fn register(
        &self,
        slot_name: &str,
        owner: PluginId,
        component: Arc<dyn Component>,
    ) -> Result<(), RegistryError> {
        let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
        let entry = slots
            .get_mut(slot_name)
            .ok_or_else(|| RegistryError::SlotNotFound(slot_name.to_string()))?;
        entry
            .instances
            .push(ComponentInstance::new(owner, component));
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of instances on one slot; zero for unknown slots.
    pub fn instance_count(&self, slot_name: &str) -> usize {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(slot_name)
            .map(|entry| entry.instances.len())
            .unwrap_or(0)
    }

    fn release(&self, removed: Vec<ComponentInstance>) {
        match &self.release_queue {
            Some(queue) => {
                for instance in removed {
                    queue.park(instance.component);
                }
            }
            None => drop(removed),
        }
    }
}

impl ComponentRegistry for InMemoryRegistry {
    fn list_slots(&self) -> Vec<Slot> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|entry| entry.slot.clone())
            .collect()
    }

    fn instances_of(&self, slot: &Slot) -> Vec<ComponentInstance> {
        self.slots
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(slot.name.as_str())
            .map(|entry| entry.instances.clone())
            .unwrap_or_default()
    }

    fn unregister(
        &self,
        slot: &Slot,
        retain: RetainFn<'_>,
        best_effort: bool,
    ) -> Result<UnregisterOutcome, RegistryError> {
        let pending = {
            let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
            let entry = slots
                .get_mut(slot.name.as_str())
                .ok_or_else(|| RegistryError::SlotNotFound(slot.name.clone()))?;
            std::mem::take(&mut entry.instances)
        };

        // Teardown runs unlocked so `dispose` may call back into the registry.
        let mut removed = Vec::new();
        let mut kept = Vec::with_capacity(pending.len());
        let mut outcome = UnregisterOutcome::default();
        let mut aborted = None;
        for instance in pending {
            if aborted.is_some() || retain(&instance) {
                kept.push(instance);
                continue;
            }
            match dispose_catching(&instance) {
                Ok(()) => removed.push(instance),
                Err(reason) if best_effort => {
                    outcome
                        .removal_failures
                        .push(format!("{}: {reason}", instance.type_name()));
                    kept.push(instance);
                }
                Err(reason) => {
                    aborted = Some(RegistryError::InstanceRejected {
                        type_name: instance.type_name().to_string(),
                        reason,
                    });
                    kept.push(instance);
                }
            }
        }

        {
            let mut slots = self.slots.write().unwrap_or_else(PoisonError::into_inner);
            if let Some(entry) = slots.get_mut(slot.name.as_str()) {
                // Instances registered while teardown ran go after the kept ones.
                kept.append(&mut entry.instances);
                entry.instances = kept;
            }
        }

        outcome.removed = removed.len();
        debug!(
            "event=registry_unregister module=registry slot={} removed={} failures={}",
            slot.name,
            outcome.removed,
            outcome.removal_failures.len()
        );
        self.release(removed);

        match aborted {
            Some(err) => Err(err),
            None => Ok(outcome),
        }
    }
}

fn dispose_catching(instance: &ComponentInstance) -> Result<(), String> {
    panic::catch_unwind(AssertUnwindSafe(|| instance.component.dispose())).unwrap_or_else(
        |payload| Err(format!("dispose panicked: {}", panic_message(&*payload))),
    )
}
