//! Bounded wait on the host's shutdown collaborator.

use crate::error::{HarnessError, HarnessResult};
use crate::host::execution::panic_message;
use log::{error, info};
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

/// Runs `shutdown` on a helper thread and waits at most `timeout` for it.
///
/// A shutdown that never returns is reported as `ShutdownTimedOut`; the
/// helper thread is left behind.
pub fn shutdown_within<F>(timeout: Duration, shutdown: F) -> HarnessResult<()>
where
    F: FnOnce() + Send + 'static,
{
    let started_at = Instant::now();
    info!(
        "event=host_shutdown module=shutdown status=start timeout_ms={}",
        timeout.as_millis()
    );

    let (done, completion) = mpsc::sync_channel(1);
    thread::Builder::new()
        .name("unload-verifier-shutdown".to_string())
        .spawn(move || {
            let result = panic::catch_unwind(AssertUnwindSafe(shutdown))
                .map_err(|payload| panic_message(&*payload));
            let _ = done.send(result);
        })
        .map_err(|err| HarnessError::ShutdownFailed(format!("spawn failed: {err}")))?;

    let outcome = match completion.recv_timeout(timeout) {
        Ok(Ok(())) => Ok(()),
        Ok(Err(message)) => Err(HarnessError::ShutdownFailed(message)),
        Err(RecvTimeoutError::Timeout) => Err(HarnessError::ShutdownTimedOut(timeout)),
        Err(RecvTimeoutError::Disconnected) => Err(HarnessError::ShutdownFailed(
            "shutdown thread exited without reporting".to_string(),
        )),
    };

    match &outcome {
        Ok(()) => info!(
            "event=host_shutdown module=shutdown status=ok duration_ms={}",
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=host_shutdown module=shutdown status=error duration_ms={} error={}",
            started_at.elapsed().as_millis(),
            err
        ),
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::shutdown_within;
    use crate::error::HarnessError;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn returns_ok_when_shutdown_completes() {
        shutdown_within(Duration::from_secs(5), || {}).expect("quick shutdown");
    }

    #[test]
    fn reports_hanging_shutdown_as_timeout() {
        let err = shutdown_within(Duration::from_millis(20), || {
            thread::sleep(Duration::from_millis(500))
        })
        .expect_err("slow shutdown must time out");
        assert!(matches!(err, HarnessError::ShutdownTimedOut(_)));
    }

    #[test]
    fn reports_panicking_shutdown() {
        let err = shutdown_within(Duration::from_secs(5), || panic!("exit hook failed"))
            .expect_err("panic must surface");
        match err {
            HarnessError::ShutdownFailed(message) => assert_eq!(message, "exit hook failed"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
