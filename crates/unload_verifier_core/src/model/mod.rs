//! Host data model seen by the unload verifier.
//!
//! # Responsibility
//! - Describe registration slots, plugin identity and registered components.
//! - Keep the model free of registry mechanics so fakes stay cheap.
//!
//! # Invariants
//! - `Slot` values are immutable for the duration of one harness run.
//! - A `ComponentInstance` belongs to exactly one slot at capture time.

pub mod component;
pub mod slot;
