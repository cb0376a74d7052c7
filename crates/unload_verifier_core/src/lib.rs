//! Dynamic-component unload verification.
//!
//! Proves that components registered on dynamic slots are reclaimed after
//! their slot is unloaded: snapshot weak handles, unregister on the host's
//! mutation context, force collection, then report survivors per slot.

pub mod config;
pub mod error;
pub mod harness;
pub mod host;
pub mod inventory;
pub mod logging;
pub mod model;
pub mod report;
pub mod snapshot;
pub mod unload;
pub mod verify;
pub mod weak_handle;

pub use config::{ConfigError, HarnessConfig};
pub use error::{HarnessError, HarnessResult, Stage, UnloadFailure};
pub use harness::{HarnessSettings, RunOutcome, SkipReason, UnloadHarness};
pub use host::artifact::{ArtifactError, ArtifactId, ArtifactStore, DirectoryArtifactStore};
pub use host::collector::{CollectorTrigger, DeferredReleaseQueue, NoopCollector, SettleCollector};
pub use host::execution::{
    DedicatedThreadContext, ExecutionContext, ExecutionError, InlineExecutionContext,
};
pub use host::registry::{ComponentRegistry, InMemoryRegistry, RegistryError, UnregisterOutcome};
pub use host::shutdown::shutdown_within;
pub use host::watchdog::{Deadline, Unbounded, Watchdog};
pub use inventory::{list_dynamic_slots, SlotPolicy};
pub use logging::{default_log_level, init_logging, logging_status};
pub use model::component::{Component, ComponentInstance};
pub use model::slot::{PluginId, Slot, DEFAULT_BASE_LAYER_ID};
pub use report::emitter::{ReportEmitter, RunReport, SlotVerdict, Verdict};
pub use report::escape::escape_service_value;
pub use report::sink::{EventKind, RecordingSink, ReportEvent, ReportSink, ServiceMessageSink};
pub use snapshot::{snapshot, SlotSnapshot};
pub use verify::{run_collection_cycles, verify, CollectionProof, VerificationResult};
pub use weak_handle::{capture, resolve_all, Resolution, WeakHandle, WeakHandleSet};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
