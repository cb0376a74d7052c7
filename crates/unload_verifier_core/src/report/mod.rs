//! CI report emission.
//!
//! # Responsibility
//! - Turn per-slot results into start/finish/failure events and an
//!   aggregate verdict.
//! - Keep protocol encoding behind `ReportSink` so consumers can swap it.
//!
//! # Invariants
//! - Events follow inventory order.
//! - Every name and message reaches the sink already escaped by that sink's
//!   own scheme.

pub mod emitter;
pub mod escape;
pub mod sink;
