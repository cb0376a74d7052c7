//! Liveness verification after unload.
//!
//! # Responsibility
//! - Run the forced collection cycles under the run budget.
//! - Resolve captured handles and report survivors per slot.
//!
//! # Invariants
//! - `verify` needs a `CollectionProof`, which only `run_collection_cycles`
//!   hands out after at least `MIN_COLLECTION_CYCLES` cycles.

use crate::config::MIN_COLLECTION_CYCLES;
use crate::error::{HarnessError, HarnessResult, Stage};
use crate::host::collector::CollectorTrigger;
use crate::host::execution::panic_message;
use crate::host::watchdog::Watchdog;
use crate::snapshot::SlotSnapshot;
use log::{error, info};
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Survivors of one slot after unload and collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationResult {
    pub slot: String,
    /// Type names of instances that are still reachable.
    pub alive: Vec<String>,
}

impl VerificationResult {
    pub fn is_leak(&self) -> bool {
        !self.alive.is_empty()
    }
}

/// Evidence that forced collection ran before verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectionProof {
    cycles: u32,
}

impl CollectionProof {
    pub fn cycles(&self) -> u32 {
        self.cycles
    }
}

/// Runs `cycles` forced collections (at least two) followed by `settle`.
///
/// Collection runs on a helper thread so a collector that never returns is
/// bounded by the watchdog and reported as `TimeoutExceeded`.
pub fn run_collection_cycles(
    collector: &Arc<dyn CollectorTrigger>,
    cycles: u32,
    settle: Duration,
    watchdog: &dyn Watchdog,
) -> HarnessResult<CollectionProof> {
    let cycles = cycles.max(MIN_COLLECTION_CYCLES);
    let started_at = Instant::now();
    if watchdog.expired() {
        return Err(timeout(watchdog));
    }

    let (done, completion) = mpsc::sync_channel(1);
    let collector = Arc::clone(collector);
    thread::Builder::new()
        .name("unload-verifier-collect".to_string())
        .spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(|| {
                for _ in 0..cycles {
                    collector.force_collect();
                }
                if !settle.is_zero() {
                    thread::sleep(settle);
                }
            }))
            .map_err(|payload| panic_message(&*payload));
            let _ = done.send(result);
        })
        .map_err(|err| HarnessError::ExecutionUnavailable(format!("spawn failed: {err}")))?;

    let finished = match watchdog.remaining() {
        Some(left) => completion.recv_timeout(left),
        None => completion.recv().map_err(|_| RecvTimeoutError::Disconnected),
    };

    match finished {
        Ok(Ok(())) => {
            info!(
                "event=collect module=verify status=ok cycles={} duration_ms={}",
                cycles,
                started_at.elapsed().as_millis()
            );
            Ok(CollectionProof { cycles })
        }
        Ok(Err(message)) => {
            // A panicking collector still ran; verification reports what survived.
            error!(
                "event=collect module=verify status=error error_code=collector_panicked error={}",
                message
            );
            Ok(CollectionProof { cycles })
        }
        Err(RecvTimeoutError::Timeout) => {
            error!(
                "event=collect module=verify status=error error_code=timeout duration_ms={}",
                started_at.elapsed().as_millis()
            );
            Err(timeout(watchdog))
        }
        Err(RecvTimeoutError::Disconnected) => Err(HarnessError::ExecutionUnavailable(
            "collection thread exited without reporting".to_string(),
        )),
    }
}

/// Resolves every captured handle and lists survivors per slot, in order.
pub fn verify(snapshots: &[SlotSnapshot], _proof: &CollectionProof) -> Vec<VerificationResult> {
    snapshots
        .iter()
        .map(|snapshot| VerificationResult {
            slot: snapshot.slot.name.clone(),
            alive: snapshot.handles.alive_type_names(),
        })
        .collect()
}

fn timeout(watchdog: &dyn Watchdog) -> HarnessError {
    HarnessError::TimeoutExceeded {
        stage: Stage::Collect,
        budget: watchdog.budget().unwrap_or_default(),
    }
}
