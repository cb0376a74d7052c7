//! Host collaborator contracts and in-process implementations.
//!
//! # Responsibility
//! - Define the seams the harness calls into: registry, execution context,
//!   collector trigger, artifact store, watchdog and shutdown.
//! - Ship in-process implementations usable by embedders and tests.
//!
//! # Invariants
//! - Collaborators are injected; the harness never reaches for globals.
//! - Registry mutation is serialized by the execution context, not here.

pub mod artifact;
pub mod collector;
pub mod execution;
pub mod registry;
pub mod shutdown;
pub mod watchdog;
