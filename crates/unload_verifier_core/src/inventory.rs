//! Dynamic slot inventory.
//!
//! # Responsibility
//! - Enumerate registry slots and keep the dynamic ones the policy admits.
//!
//! # Invariants
//! - Non-dynamic slots are never returned, whatever the policy.
//! - Output order is the registry's listing order; callers reuse the same
//!   vector for snapshot, unload and report so the order is stable per run.

use crate::host::registry::ComponentRegistry;
use crate::model::slot::Slot;
use log::debug;
use std::collections::BTreeSet;

/// Which dynamic slots are in scope for a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlotPolicy {
    /// Every dynamic slot.
    All,
    /// Only dynamic slots whose name is listed.
    Explicit(BTreeSet<String>),
}

impl SlotPolicy {
    pub fn explicit<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::Explicit(names.into_iter().map(Into::into).collect())
    }

    pub fn admits(&self, slot_name: &str) -> bool {
        match self {
            Self::All => true,
            Self::Explicit(names) => names.contains(slot_name),
        }
    }

    /// `false` when an explicit policy lists nothing; such runs are skipped.
    pub fn is_applicable(&self) -> bool {
        match self {
            Self::All => true,
            Self::Explicit(names) => !names.is_empty(),
        }
    }
}

/// Lists dynamic slots admitted by `policy`, in registry order.
pub fn list_dynamic_slots(registry: &dyn ComponentRegistry, policy: &SlotPolicy) -> Vec<Slot> {
    let all = registry.list_slots();
    let total = all.len();
    let selected: Vec<Slot> = all
        .into_iter()
        .filter(|slot| slot.is_dynamic && policy.admits(&slot.name))
        .collect();
    debug!(
        "event=slot_inventory module=inventory total={} selected={}",
        total,
        selected.len()
    );
    selected
}
