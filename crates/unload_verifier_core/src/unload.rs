//! Unload driver.
//!
//! # Responsibility
//! - Unregister every instance of each selected slot on the designated
//!   execution context, one slot at a time, in inventory order.
//!
//! # Invariants
//! - A failing, panicking or slow slot is recorded and the loop moves on.
//! - Only an expired run budget or an unreachable context ends the loop.

use crate::error::{HarnessError, HarnessResult, Stage, UnloadFailure};
use crate::host::execution::{ExecutionContext, ExecutionError};
use crate::host::registry::{ComponentRegistry, UnregisterOutcome};
use crate::host::watchdog::Watchdog;
use crate::model::slot::Slot;
use log::{error, info, warn};
use std::sync::mpsc;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Unload result for one slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnloadRecord {
    pub slot: String,
    pub result: Result<UnregisterOutcome, UnloadFailure>,
}

impl UnloadRecord {
    pub fn failure(&self) -> Option<&UnloadFailure> {
        self.result.as_ref().err()
    }

    pub fn removal_failures(&self) -> &[String] {
        match &self.result {
            Ok(outcome) => &outcome.removal_failures,
            Err(_) => &[],
        }
    }
}

/// Drives unregistration of selected slots through an execution context.
pub struct UnloadDriver<'a> {
    registry: Arc<dyn ComponentRegistry>,
    context: &'a dyn ExecutionContext,
    step_timeout: Duration,
}

impl<'a> UnloadDriver<'a> {
    pub fn new(
        registry: Arc<dyn ComponentRegistry>,
        context: &'a dyn ExecutionContext,
        step_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            context,
            step_timeout,
        }
    }

    /// Unloads every slot in order.
    ///
    /// # Errors
    /// - `TimeoutExceeded` when the watchdog budget runs out.
    /// - `ExecutionUnavailable` when the context cannot accept work.
    pub fn unload_all(
        &self,
        slots: &[Slot],
        watchdog: &dyn Watchdog,
    ) -> HarnessResult<Vec<UnloadRecord>> {
        let mut records = Vec::with_capacity(slots.len());
        for slot in slots {
            if watchdog.expired() {
                return Err(timeout(watchdog));
            }
            let result = self.unload_one(slot, watchdog)?;
            records.push(UnloadRecord {
                slot: slot.name.clone(),
                result,
            });
        }
        Ok(records)
    }

    fn unload_one(
        &self,
        slot: &Slot,
        watchdog: &dyn Watchdog,
    ) -> HarnessResult<Result<UnregisterOutcome, UnloadFailure>> {
        let started_at = Instant::now();
        let limit = watchdog.bound(self.step_timeout);
        let (sender, receiver) = mpsc::sync_channel(1);
        let registry = Arc::clone(&self.registry);
        let target = slot.clone();

        let submitted = self.context.run_and_wait(
            Box::new(move || {
                let outcome = registry.unregister(&target, &|_| false, true);
                let _ = sender.send(outcome);
            }),
            Some(limit),
        );

        let result = match submitted {
            Ok(()) => match receiver.try_recv() {
                Ok(Ok(outcome)) => Ok(outcome),
                Ok(Err(err)) => Err(UnloadFailure::Rejected(err.to_string())),
                Err(_) => Err(UnloadFailure::Rejected(
                    "unregister finished without an outcome".to_string(),
                )),
            },
            Err(ExecutionError::Panicked(message)) => Err(UnloadFailure::Panicked(message)),
            Err(ExecutionError::TimedOut(after)) => {
                if watchdog.expired() {
                    return Err(timeout(watchdog));
                }
                Err(UnloadFailure::TimedOut(after.as_millis() as u64))
            }
            Err(ExecutionError::Unavailable(reason)) => {
                error!(
                    "event=slot_unload module=unload status=error slot={} error_code=context_unavailable error={}",
                    slot.name, reason
                );
                return Err(HarnessError::ExecutionUnavailable(reason));
            }
        };

        match &result {
            Ok(outcome) => {
                for failure in &outcome.removal_failures {
                    warn!(
                        "event=slot_unload module=unload status=warn slot={} removal_failure={}",
                        slot.name, failure
                    );
                }
                info!(
                    "event=slot_unload module=unload status=ok slot={} removed={} duration_ms={}",
                    slot.name,
                    outcome.removed,
                    started_at.elapsed().as_millis()
                );
            }
            Err(failure) => error!(
                "event=slot_unload module=unload status=error slot={} duration_ms={} error={}",
                slot.name,
                started_at.elapsed().as_millis(),
                failure
            ),
        }
        Ok(result)
    }
}

fn timeout(watchdog: &dyn Watchdog) -> HarnessError {
    HarnessError::TimeoutExceeded {
        stage: Stage::Unload,
        budget: watchdog.budget().unwrap_or_default(),
    }
}
