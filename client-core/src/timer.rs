//! Cancellable one-shot timers.
//!
//! Every delayed callback in the client (reconnect backoff, credential expiry,
//! enrichment settle delay) is a [`ScheduledTask`]. Tasks are children of an
//! owner's [`CancellationToken`], so cancelling the owner during teardown
//! cancels every timer it ever scheduled.

use std::future::Future;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Handle to a delayed future.
///
/// The future runs only if the delay elapses before the task is cancelled.
/// Dropping the handle cancels a timer that has not fired yet.
#[derive(Debug)]
pub struct ScheduledTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

impl ScheduledTask {
    /// Schedule `fut` to run after `delay`, cancelled together with `parent`.
    pub fn spawn<Fut>(parent: &CancellationToken, delay: Duration, fut: Fut) -> Self
    where
        Fut: Future<Output = ()> + Send + 'static,
    {
        let token = parent.child_token();
        let guard = token.clone();

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = guard.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
            fut.await;
        });

        Self { token, handle }
    }

    /// Cancel the timer. No effect once the callback has started.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
