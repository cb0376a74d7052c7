//! Run budget tracking.

use std::time::{Duration, Instant};

/// External bound on how long a run may take.
pub trait Watchdog: Send + Sync {
    /// Time left in the budget; `None` when the run is unbounded.
    fn remaining(&self) -> Option<Duration>;

    /// Total budget, used in timeout reports.
    fn budget(&self) -> Option<Duration>;

    fn expired(&self) -> bool {
        matches!(self.remaining(), Some(left) if left.is_zero())
    }

    /// Caps `step` by the remaining budget.
    fn bound(&self, step: Duration) -> Duration {
        match self.remaining() {
            Some(left) => step.min(left),
            None => step,
        }
    }
}

/// Fixed budget measured from construction.
#[derive(Debug, Clone, Copy)]
pub struct Deadline {
    started_at: Instant,
    budget: Duration,
}

impl Deadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            started_at: Instant::now(),
            budget,
        }
    }
}

impl Watchdog for Deadline {
    fn remaining(&self) -> Option<Duration> {
        Some(self.budget.saturating_sub(self.started_at.elapsed()))
    }

    fn budget(&self) -> Option<Duration> {
        Some(self.budget)
    }
}

/// Watchdog that never fires.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unbounded;

impl Watchdog for Unbounded {
    fn remaining(&self) -> Option<Duration> {
        None
    }

    fn budget(&self) -> Option<Duration> {
        None
    }
}
