//! Per-slot events and the aggregate run verdict.

use crate::error::UnloadFailure;
use crate::host::artifact::{ArtifactId, ArtifactStore};
use crate::report::sink::{EventKind, ReportSink};
use crate::unload::UnloadRecord;
use crate::verify::VerificationResult;
use log::{error, info};
use serde::Serialize;
use std::collections::HashMap;

/// Prefix of the per-slot test name.
pub const SLOT_TEST_PREFIX: &str = "Dynamic slot unloading ";
/// Tag passed to the artifact store when a run fails.
pub const ARTIFACT_TAG: &str = "dynamicSlots";
/// Statistic key carrying the run duration.
pub const TOTAL_TIME_STATISTIC: &str = "unloadVerifier.totalTimeMs";

/// Final state of one slot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotVerdict {
    pub slot: String,
    /// Unescaped test name.
    pub test_name: String,
    pub alive: Vec<String>,
    pub unload_failure: Option<UnloadFailure>,
    /// Instances the registry could not remove; informational.
    pub removal_failures: Vec<String>,
}

impl SlotVerdict {
    pub fn passed(&self) -> bool {
        self.alive.is_empty() && self.unload_failure.is_none()
    }

    /// Failure message body, or `None` for a passing slot.
    pub fn failure_message(&self, run_name: &str) -> Option<String> {
        if self.passed() {
            return None;
        }
        let mut message = String::new();
        if let Some(failure) = &self.unload_failure {
            message.push_str(&format!("Unload failed: {failure}\n\n"));
        }
        if !self.alive.is_empty() {
            message.push_str("Not unloaded components:\n");
            message.push_str(&self.alive.join("\n"));
            message.push_str("\n\n");
        }
        message.push_str(&format!(
            "See {run_name} output to find a diagnostic artifact"
        ));
        Some(message)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Verdict {
    Passed,
    Failed,
}

/// Aggregate result of one completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunReport {
    pub run_name: String,
    pub verdict: Verdict,
    pub slots: Vec<SlotVerdict>,
    pub artifact: Option<ArtifactId>,
    /// Why the artifact is missing from a failed run.
    pub artifact_error: Option<String>,
    pub duration_ms: u64,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.verdict == Verdict::Passed
    }

    pub fn failing_slots(&self) -> impl Iterator<Item = &SlotVerdict> {
        self.slots.iter().filter(|slot| !slot.passed())
    }

    pub fn slot(&self, name: &str) -> Option<&SlotVerdict> {
        self.slots.iter().find(|slot| slot.slot == name)
    }

    /// Aggregate failure message, or `None` when the run passed.
    pub fn failure_message(&self) -> Option<String> {
        if self.passed() {
            return None;
        }
        let failing: Vec<&str> = self.failing_slots().map(|slot| slot.slot.as_str()).collect();
        let pointer = match (&self.artifact, &self.artifact_error) {
            (Some(artifact), _) => format!("Artifact: {artifact}"),
            (None, Some(err)) => format!("Artifact capture failed: {err}"),
            (None, None) => "Artifact: none".to_string(),
        };
        Some(format!(
            "Some dynamic components have not been unloaded. See individual tests for details. \
             Failing slots: {}. {pointer}",
            failing.join(", ")
        ))
    }
}

/// Builds slot verdicts, emits their events and captures the artifact.
pub struct ReportEmitter<'a> {
    run_name: String,
    artifacts: &'a dyn ArtifactStore,
}

impl<'a> ReportEmitter<'a> {
    pub fn new(run_name: impl Into<String>, artifacts: &'a dyn ArtifactStore) -> Self {
        Self {
            run_name: run_name.into(),
            artifacts,
        }
    }

    /// Emits one event pair per slot in `results` order and returns the report.
    pub fn emit(
        &self,
        results: Vec<VerificationResult>,
        unloads: Vec<UnloadRecord>,
        sink: &mut dyn ReportSink,
        duration_ms: u64,
    ) -> RunReport {
        let mut unloads: HashMap<String, UnloadRecord> = unloads
            .into_iter()
            .map(|record| (record.slot.clone(), record))
            .collect();

        let mut slots = Vec::with_capacity(results.len());
        for result in results {
            let record = unloads.remove(&result.slot);
            let verdict = SlotVerdict {
                test_name: format!("{SLOT_TEST_PREFIX}{}", result.slot),
                unload_failure: record.as_ref().and_then(|r| r.failure().cloned()),
                removal_failures: record
                    .as_ref()
                    .map(|r| r.removal_failures().to_vec())
                    .unwrap_or_default(),
                slot: result.slot,
                alive: result.alive,
            };
            self.emit_slot(&verdict, sink);
            slots.push(verdict);
        }

        let failed = slots.iter().any(|slot| !slot.passed());
        let (artifact, artifact_error) = if failed {
            match self.artifacts.capture_artifact(ARTIFACT_TAG) {
                Ok(id) => (Some(id), None),
                Err(err) => {
                    error!(
                        "event=run_report module=report status=error error_code=artifact_failed error={}",
                        err
                    );
                    (None, Some(err.to_string()))
                }
            }
        } else {
            (None, None)
        };

        let report = RunReport {
            run_name: self.run_name.clone(),
            verdict: if failed {
                Verdict::Failed
            } else {
                Verdict::Passed
            },
            slots,
            artifact,
            artifact_error,
            duration_ms,
        };
        info!(
            "event=run_report module=report status={} slots={} failing={}",
            if failed { "failed" } else { "ok" },
            report.slots.len(),
            report.failing_slots().count()
        );
        report
    }

    fn emit_slot(&self, verdict: &SlotVerdict, sink: &mut dyn ReportSink) {
        let name = sink.escape(&verdict.test_name);
        sink.emit_event(EventKind::Start, &name, None);
        match verdict.failure_message(&self.run_name) {
            None => sink.emit_event(EventKind::Finish, &name, None),
            Some(message) => {
                let message = sink.escape(&message);
                sink.emit_event(EventKind::Failure, &name, Some(&message));
            }
        }
    }
}
