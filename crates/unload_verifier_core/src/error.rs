//! Harness error taxonomy.
//!
//! # Responsibility
//! - Separate per-slot failures (recovered and aggregated) from run-level
//!   failures (escalated to the caller).
//!
//! # Invariants
//! - `UnloadFailure` never aborts a run.
//! - `HarnessError` always terminates the run it was raised in.

use crate::config::ConfigError;
use serde::Serialize;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::time::Duration;

pub type HarnessResult<T> = Result<T, HarnessError>;

/// Harness stage used to tag run-level failures and log events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Snapshot,
    Unload,
    Collect,
    Verify,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Snapshot => "snapshot",
            Self::Unload => "unload",
            Self::Collect => "collect",
            Self::Verify => "verify",
        }
    }
}

impl Display for Stage {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why one slot's unregister call did not complete cleanly.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum UnloadFailure {
    /// The registry returned an error for the slot.
    Rejected(String),
    /// The unregister action panicked on the execution context.
    Panicked(String),
    /// The unregister action exceeded the per-step bound (milliseconds).
    TimedOut(u64),
}

impl Display for UnloadFailure {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rejected(reason) => write!(f, "unregister rejected: {reason}"),
            Self::Panicked(reason) => write!(f, "unregister panicked: {reason}"),
            Self::TimedOut(after_ms) => write!(f, "unregister timed out after {after_ms} ms"),
        }
    }
}

impl Error for UnloadFailure {}

/// Run-terminating harness errors.
#[derive(Debug)]
pub enum HarnessError {
    /// The watchdog budget ran out while `stage` was in progress.
    TimeoutExceeded { stage: Stage, budget: Duration },
    /// The designated execution context could not be reached at all.
    ExecutionUnavailable(String),
    /// The shutdown collaborator did not return within the bounded wait.
    ShutdownTimedOut(Duration),
    /// The shutdown collaborator panicked.
    ShutdownFailed(String),
    Config(ConfigError),
}

impl Display for HarnessError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TimeoutExceeded { stage, budget } => write!(
                f,
                "harness timed out during {stage} (budget {} ms)",
                budget.as_millis()
            ),
            Self::ExecutionUnavailable(reason) => {
                write!(f, "execution context unavailable: {reason}")
            }
            Self::ShutdownTimedOut(waited) => write!(
                f,
                "host shutdown did not complete within {} ms",
                waited.as_millis()
            ),
            Self::ShutdownFailed(reason) => write!(f, "host shutdown failed: {reason}"),
            Self::Config(err) => write!(f, "{err}"),
        }
    }
}

impl Error for HarnessError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Config(err) => Some(err),
            Self::TimeoutExceeded { .. }
            | Self::ExecutionUnavailable(_)
            | Self::ShutdownTimedOut(_)
            | Self::ShutdownFailed(_) => None,
        }
    }
}

impl From<ConfigError> for HarnessError {
    fn from(value: ConfigError) -> Self {
        Self::Config(value)
    }
}

#[cfg(test)]
mod tests {
    use super::{HarnessError, Stage, UnloadFailure};
    use std::time::Duration;

    #[test]
    fn timeout_message_names_stage_and_budget() {
        let err = HarnessError::TimeoutExceeded {
            stage: Stage::Collect,
            budget: Duration::from_millis(1500),
        };
        assert_eq!(
            err.to_string(),
            "harness timed out during collect (budget 1500 ms)"
        );
    }

    #[test]
    fn unload_failure_serializes_with_kind_tag() {
        let value = serde_json::to_value(UnloadFailure::TimedOut(250)).expect("serialize");
        assert_eq!(value["kind"], "timed_out");
        assert_eq!(value["detail"], 250);
    }

    #[test]
    fn stages_follow_run_order_in_logs_and_json() {
        let stages = [Stage::Snapshot, Stage::Unload, Stage::Collect, Stage::Verify];
        let names: Vec<String> = stages.iter().map(Stage::to_string).collect();
        assert_eq!(names, vec!["snapshot", "unload", "collect", "verify"]);
        let json = serde_json::to_value(stages).expect("serialize");
        assert_eq!(json, serde_json::json!(["snapshot", "unload", "collect", "verify"]));
    }
}
