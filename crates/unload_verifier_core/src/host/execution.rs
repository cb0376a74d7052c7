//! Serialized execution contexts.
//!
//! # Responsibility
//! - Run registry mutations on one designated context and block the caller
//!   until they complete.
//! - Turn panics and stuck actions into values instead of hangs.
//!
//! # Invariants
//! - At most one action runs on a `DedicatedThreadContext` at a time.
//! - A timed-out action keeps running on its worker; the caller stops waiting.

use log::{error, warn};
use std::any::Any;
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Mutex, PoisonError};
use std::thread::{self, ThreadId};
use std::time::Duration;

/// Unit of work submitted to an execution context.
pub type Action = Box<dyn FnOnce() + Send + 'static>;

/// Designated serialized context for registry mutation.
pub trait ExecutionContext: Send + Sync {
    /// Runs `action` on the context and blocks until it completes, or until
    /// `timeout` elapses when one is given.
    fn run_and_wait(&self, action: Action, timeout: Option<Duration>)
        -> Result<(), ExecutionError>;
}

/// Execution context failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    /// The context is closed or its worker is gone.
    Unavailable(String),
    TimedOut(Duration),
    Panicked(String),
}

impl Display for ExecutionError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Unavailable(reason) => write!(f, "execution context unavailable: {reason}"),
            Self::TimedOut(after) => {
                write!(f, "action did not finish within {} ms", after.as_millis())
            }
            Self::Panicked(message) => write!(f, "action panicked: {message}"),
        }
    }
}

impl Error for ExecutionError {}

/// Extracts a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

fn run_catching(action: Action) -> Result<(), String> {
    panic::catch_unwind(AssertUnwindSafe(action)).map_err(|payload| panic_message(&*payload))
}

/// Runs actions directly on the calling thread.
///
/// Timeouts cannot be enforced inline and are ignored.
#[derive(Debug, Clone, Copy, Default)]
pub struct InlineExecutionContext;

impl ExecutionContext for InlineExecutionContext {
    fn run_and_wait(
        &self,
        action: Action,
        _timeout: Option<Duration>,
    ) -> Result<(), ExecutionError> {
        run_catching(action).map_err(ExecutionError::Panicked)
    }
}

struct Job {
    action: Action,
    done: mpsc::SyncSender<Result<(), String>>,
}

/// Single named worker thread acting as the host's mutation thread.
pub struct DedicatedThreadContext {
    name: String,
    sender: Mutex<Option<mpsc::Sender<Job>>>,
    worker: ThreadId,
}

impl DedicatedThreadContext {
    pub fn spawn(name: &str) -> Result<Self, ExecutionError> {
        let (sender, receiver) = mpsc::channel::<Job>();
        let handle = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    let result = run_catching(job.action);
                    // The waiter may have given up after a timeout.
                    let _ = job.done.send(result);
                }
            })
            .map_err(|err| ExecutionError::Unavailable(format!("spawn failed: {err}")))?;

        Ok(Self {
            name: name.to_string(),
            sender: Mutex::new(Some(sender)),
            worker: handle.thread().id(),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stops accepting actions; the worker exits once its queue drains.
    pub fn close(&self) {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    pub fn is_closed(&self) -> bool {
        self.sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }
}

impl ExecutionContext for DedicatedThreadContext {
    fn run_and_wait(
        &self,
        action: Action,
        timeout: Option<Duration>,
    ) -> Result<(), ExecutionError> {
        // Re-entrant calls from the worker would wait on themselves.
        if thread::current().id() == self.worker {
            return run_catching(action).map_err(ExecutionError::Panicked);
        }

        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| ExecutionError::Unavailable(format!("{} is closed", self.name)))?;

        let (done, completion) = mpsc::sync_channel(1);
        sender.send(Job { action, done }).map_err(|_| {
            error!(
                "event=execution_submit module=execution status=error context={} error_code=worker_gone",
                self.name
            );
            ExecutionError::Unavailable(format!("{} worker has exited", self.name))
        })?;

        let result = match timeout {
            Some(limit) => completion.recv_timeout(limit).map_err(|err| match err {
                RecvTimeoutError::Timeout => {
                    warn!(
                        "event=execution_wait module=execution status=timeout context={} timeout_ms={}",
                        self.name,
                        limit.as_millis()
                    );
                    ExecutionError::TimedOut(limit)
                }
                RecvTimeoutError::Disconnected => {
                    ExecutionError::Unavailable(format!("{} dropped the action", self.name))
                }
            })?,
            None => completion.recv().map_err(|_| {
                ExecutionError::Unavailable(format!("{} dropped the action", self.name))
            })?,
        };
        result.map_err(ExecutionError::Panicked)
    }
}

impl Drop for DedicatedThreadContext {
    fn drop(&mut self) {
        self.close();
    }
}
