//! Delayed one-shot callbacks.
//!
//! `schedule` runs a callback after a delay unless the returned handle
//! is cancelled first. The callback fires at most once; cancelling
//! after expiry is a no-op, not an error. The motion adapter is the
//! main consumer (30 s cool-down).

use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle to a pending scheduled callback.
///
/// Dropping the handle does NOT cancel the callback; call
/// [`cancel`](Self::cancel) explicitly.
#[derive(Debug)]
pub struct TimerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl TimerHandle {
    /// Cancel the pending callback. No-op if it already fired.
    ///
    /// Consumes the handle; a cancelled timer cannot be restarted, only
    /// re-scheduled.
    pub fn cancel(self) {
        self.cancel.cancel();
        self.task.abort();
    }

    /// Whether the timer has fired or been cancelled.
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

/// Run `callback` after `delay` unless the handle is cancelled first.
pub fn schedule<F>(delay: Duration, callback: F) -> TimerHandle
where
    F: FnOnce() + Send + 'static,
{
    let cancel = CancellationToken::new();
    let task_cancel = cancel.clone();

    let task = tokio::spawn(async move {
        tokio::select! {
            biased;
            () = task_cancel.cancelled() => {}
            () = tokio::time::sleep(delay) => callback(),
        }
    });

    TimerHandle { cancel, task }
}
