//! Dynamic slot unload harness.
//!
//! # Responsibility
//! - Drive inventory, snapshot, unload, collection, verification and report
//!   in that order for one run.
//! - Map per-slot problems into the report and run-level problems into
//!   `HarnessError`.
//!
//! # Invariants
//! - An inapplicable policy skips the run before any event is emitted.
//! - The slot order chosen by the inventory is reused by every later stage.
//! - Snapshots are dropped before the run returns.

use crate::config::{HarnessConfig, DEFAULT_RUN_NAME, MIN_COLLECTION_CYCLES};
use crate::error::{HarnessError, HarnessResult, Stage};
use crate::host::artifact::ArtifactStore;
use crate::host::collector::CollectorTrigger;
use crate::host::execution::ExecutionContext;
use crate::host::registry::ComponentRegistry;
use crate::host::watchdog::{Deadline, Watchdog};
use crate::inventory::{list_dynamic_slots, SlotPolicy};
use crate::model::slot::PluginId;
use crate::report::emitter::{ReportEmitter, RunReport, TOTAL_TIME_STATISTIC};
use crate::report::sink::ReportSink;
use crate::snapshot::snapshot;
use crate::unload::UnloadDriver;
use crate::verify::{run_collection_cycles, verify};
use log::{error, info};
use std::fmt::{Display, Formatter};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Validated runtime settings for one harness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HarnessSettings {
    pub run_name: String,
    pub base_layer: PluginId,
    pub run_timeout: Duration,
    pub step_timeout: Duration,
    pub collect_cycles: u32,
    pub settle: Duration,
}

impl Default for HarnessSettings {
    fn default() -> Self {
        Self {
            run_name: DEFAULT_RUN_NAME.to_string(),
            base_layer: PluginId::base_layer(),
            run_timeout: Duration::from_secs(300),
            step_timeout: Duration::from_secs(60),
            collect_cycles: MIN_COLLECTION_CYCLES,
            settle: Duration::from_millis(100),
        }
    }
}

impl HarnessSettings {
    pub fn from_config(config: &HarnessConfig) -> HarnessResult<Self> {
        config.validate()?;
        Ok(Self {
            run_name: config.run_name(),
            base_layer: config.base_layer()?,
            run_timeout: config.run_timeout(),
            step_timeout: config.step_timeout(),
            collect_cycles: config.collect_cycles(),
            settle: config.settle(),
        })
    }
}

/// Why a run did not execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The explicit policy selects no slot and the override flag is unset.
    PolicyEmpty,
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::PolicyEmpty => write!(f, "no slots selected by the configured policy"),
        }
    }
}

/// Result of a harness run that did not hit a run-level error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    Skipped(SkipReason),
    Completed(RunReport),
}

impl RunOutcome {
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            Self::Completed(report) => Some(report),
            Self::Skipped(_) => None,
        }
    }

    /// `true` for skipped runs and runs whose verdict passed.
    pub fn is_success(&self) -> bool {
        self.report().map_or(true, RunReport::passed)
    }
}

/// Unload verification harness over injected collaborators.
pub struct UnloadHarness {
    registry: Arc<dyn ComponentRegistry>,
    context: Arc<dyn ExecutionContext>,
    collector: Arc<dyn CollectorTrigger>,
    artifacts: Arc<dyn ArtifactStore>,
    settings: HarnessSettings,
}

impl UnloadHarness {
    pub fn new(
        registry: Arc<dyn ComponentRegistry>,
        context: Arc<dyn ExecutionContext>,
        collector: Arc<dyn CollectorTrigger>,
        artifacts: Arc<dyn ArtifactStore>,
        settings: HarnessSettings,
    ) -> Self {
        Self {
            registry,
            context,
            collector,
            artifacts,
            settings,
        }
    }

    pub fn settings(&self) -> &HarnessSettings {
        &self.settings
    }

    /// Runs the harness under a deadline of `settings.run_timeout`.
    pub fn run(&self, policy: &SlotPolicy, sink: &mut dyn ReportSink) -> HarnessResult<RunOutcome> {
        let deadline = Deadline::after(self.settings.run_timeout);
        self.run_with_watchdog(policy, sink, &deadline)
    }

    /// Runs the harness under an externally supplied watchdog.
    ///
    /// # Errors
    /// - `TimeoutExceeded` when the watchdog fires during any stage.
    /// - `ExecutionUnavailable` when unload work cannot be scheduled.
    pub fn run_with_watchdog(
        &self,
        policy: &SlotPolicy,
        sink: &mut dyn ReportSink,
        watchdog: &dyn Watchdog,
    ) -> HarnessResult<RunOutcome> {
        let started_at = Instant::now();
        if !policy.is_applicable() {
            info!(
                "event=harness_run module=harness status=skipped run={} reason={}",
                self.settings.run_name,
                SkipReason::PolicyEmpty
            );
            return Ok(RunOutcome::Skipped(SkipReason::PolicyEmpty));
        }
        info!(
            "event=harness_run module=harness status=start run={}",
            self.settings.run_name
        );

        let result = self.run_stages(policy, sink, watchdog, started_at);
        match &result {
            Ok(report) => {
                sink.emit_statistic(TOTAL_TIME_STATISTIC, report.duration_ms);
                info!(
                    "event=harness_run module=harness status=ok run={} verdict={:?} duration_ms={}",
                    self.settings.run_name, report.verdict, report.duration_ms
                );
            }
            Err(err) => error!(
                "event=harness_run module=harness status=error run={} duration_ms={} error={}",
                self.settings.run_name,
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result.map(RunOutcome::Completed)
    }

    fn run_stages(
        &self,
        policy: &SlotPolicy,
        sink: &mut dyn ReportSink,
        watchdog: &dyn Watchdog,
        started_at: Instant,
    ) -> HarnessResult<RunReport> {
        let slots = list_dynamic_slots(self.registry.as_ref(), policy);
        let snapshots = snapshot(self.registry.as_ref(), &slots, &self.settings.base_layer);
        check_budget(watchdog, Stage::Snapshot)?;
        info!(
            "event=stage module=harness stage={} status=ok slots={} tracked={}",
            Stage::Snapshot,
            snapshots.len(),
            snapshots
                .iter()
                .map(|snapshot| snapshot.handles.len())
                .sum::<usize>()
        );

        let driver = UnloadDriver::new(
            Arc::clone(&self.registry),
            self.context.as_ref(),
            self.settings.step_timeout,
        );
        let unloads = driver.unload_all(&slots, watchdog)?;

        let proof = run_collection_cycles(
            &self.collector,
            self.settings.collect_cycles,
            self.settings.settle,
            watchdog,
        )?;

        let results = verify(&snapshots, &proof);
        drop(snapshots);
        check_budget(watchdog, Stage::Verify)?;

        let emitter = ReportEmitter::new(self.settings.run_name.as_str(), self.artifacts.as_ref());
        let duration_ms = started_at.elapsed().as_millis() as u64;
        Ok(emitter.emit(results, unloads, sink, duration_ms))
    }
}

fn check_budget(watchdog: &dyn Watchdog, stage: Stage) -> HarnessResult<()> {
    if watchdog.expired() {
        return Err(HarnessError::TimeoutExceeded {
            stage,
            budget: watchdog.budget().unwrap_or_default(),
        });
    }
    Ok(())
}
