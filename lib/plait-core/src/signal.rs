//! Cancellation of in-flight requests.

use std::future::Future;
use std::pin::pin;

use futures_util::future::{Either, select};
use tokio_util::sync::CancellationToken;

use crate::{Error, Result};

/// Owner side of an abort signal.
///
/// Dropping the controller does not abort; call [`AbortController::abort`].
#[derive(Debug, Clone, Default)]
pub struct AbortController {
    token: CancellationToken,
}

impl AbortController {
    /// Creates a controller whose signal has not fired.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a controller that is also aborted when `parent` fires.
    #[must_use]
    pub fn child_of(parent: &AbortSignal) -> Self {
        Self {
            token: parent.token.child_token(),
        }
    }

    /// The signal observed by requests.
    #[must_use]
    pub fn signal(&self) -> AbortSignal {
        AbortSignal {
            token: self.token.clone(),
        }
    }

    /// Fires the signal. Idempotent.
    pub fn abort(&self) {
        self.token.cancel();
    }
}

/// Observer side of an abort signal, carried by a [`crate::Request`].
#[derive(Debug, Clone)]
pub struct AbortSignal {
    token: CancellationToken,
}

impl AbortSignal {
    /// Whether the signal has fired.
    #[must_use]
    pub fn is_aborted(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Resolves once the signal fires.
    pub async fn aborted(&self) {
        self.token.cancelled().await;
    }

    /// Runs `future` unless the signal fires first.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Aborted`] when the signal has already fired or fires
    /// before `future` completes, otherwise the future's own result.
    pub async fn guard<F, T>(&self, future: F) -> Result<T>
    where
        F: Future<Output = Result<T>>,
    {
        if self.is_aborted() {
            return Err(Error::Aborted);
        }

        let cancelled = pin!(self.token.cancelled());
        let future = pin!(future);
        match select(future, cancelled).await {
            Either::Left((result, _)) => result,
            Either::Right(((), _)) => Err(Error::Aborted),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use assert2::{check, let_assert};

    use super::*;

    #[tokio::test]
    async fn guard_passes_result_through() {
        let controller = AbortController::new();
        let value = controller.signal().guard(async { Ok(42) }).await;
        check!(value.expect("not aborted") == 42);
    }

    #[tokio::test]
    async fn guard_rejects_when_already_aborted() {
        let controller = AbortController::new();
        controller.abort();

        let_assert!(Err(Error::Aborted) = controller.signal().guard(async { Ok(()) }).await);
    }

    #[tokio::test(start_paused = true)]
    async fn guard_rejects_when_aborted_in_flight() {
        let controller = AbortController::new();
        let signal = controller.signal();

        let slow = async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok("late")
        };
        let abort = async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            controller.abort();
        };

        let (result, ()) = tokio::join!(signal.guard(slow), abort);
        let_assert!(Err(err) = result);
        check!(err.is_aborted());
    }

    #[test]
    fn child_follows_parent() {
        let parent = AbortController::new();
        let child = AbortController::child_of(&parent.signal());

        child.abort();
        check!(!parent.signal().is_aborted());

        let child = AbortController::child_of(&parent.signal());
        parent.abort();
        check!(child.signal().is_aborted());
    }
}
