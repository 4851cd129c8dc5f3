//! Timeout plugin.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::task::AbortHandle;

use crate::{AbortController, Plugin, Request, Result};

/// Plugin aborting requests that are still running after a fixed duration.
///
/// The request gets a new [`crate::AbortSignal`] that fires when the
/// duration elapses or when the signal it already carried fires. An aborted
/// call fails with [`crate::Error::Aborted`]. Requires a Tokio runtime.
///
/// The timer is cancelled once every copy of the request is dropped, so a
/// finished call does not leave a sleeping task behind, while retries sent
/// by later plugins stay under the same deadline.
#[derive(Debug, Clone, Copy)]
pub struct TimeoutPlugin {
    timeout: Duration,
}

impl TimeoutPlugin {
    /// Abort requests after `timeout`.
    #[must_use]
    pub const fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

/// Stops a timer task when dropped.
#[derive(Debug)]
struct TimerGuard(AbortHandle);

impl Drop for TimerGuard {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Timers started for a request, alive while any copy of it is.
#[derive(Debug, Clone, Default)]
struct Timers(Vec<Arc<TimerGuard>>);

#[async_trait]
impl Plugin for TimeoutPlugin {
    fn name(&self) -> &str {
        "timeout"
    }

    async fn before_request(&self, request: Request) -> Result<Request> {
        let controller = request
            .signal()
            .map_or_else(AbortController::new, AbortController::child_of);
        let signal = controller.signal();

        let timeout = self.timeout;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            controller.abort();
        });

        let mut timers = request.extensions().get::<Timers>().cloned().unwrap_or_default();
        timers.0.push(Arc::new(TimerGuard(timer.abort_handle())));

        Ok(request.with_signal(Some(signal)).with_extension(timers))
    }
}
