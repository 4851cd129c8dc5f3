//! Re-issuing a request from inside a response hook.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use tracing::debug;

use crate::{Request, Response, Result};

/// Sends a canonical request through a client's native send path.
///
/// Request hooks are not run again.
#[async_trait]
pub trait Dispatch: Send + Sync {
    /// Converts `request` to the native shape, sends it and converts the
    /// answer back.
    async fn dispatch(&self, request: Request) -> Result<Response>;
}

/// Handle given to [`crate::Plugin::after_response`] to re-send a request.
///
/// There is no built-in limit on the number of retries; plugins decide.
/// The most recently sent request becomes the current request for the
/// plugins that run afterwards.
pub struct Retry<'a> {
    dispatch: &'a dyn Dispatch,
    latest: Mutex<Option<Request>>,
    attempts: AtomicU32,
}

impl<'a> Retry<'a> {
    /// Retry handle over a dispatcher.
    #[must_use]
    pub fn new(dispatch: &'a dyn Dispatch) -> Self {
        Self {
            dispatch,
            latest: Mutex::new(None),
            attempts: AtomicU32::new(0),
        }
    }

    /// Sends `request`, which becomes the current request.
    ///
    /// The request is recorded before the send, so a failed attempt still
    /// updates it.
    ///
    /// # Errors
    ///
    /// Returns the native send error, or [`crate::Error::BodyConsumed`] when
    /// the request body was already read.
    pub async fn send(&self, request: Request) -> Result<Response> {
        let attempt = self.attempts.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            attempt,
            method = %request.method(),
            url = %request.url(),
            "retrying request"
        );

        let duplicate = request.try_clone().await?;
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(request);
        self.dispatch.dispatch(duplicate).await
    }

    /// Sends a duplicate of `request`.
    ///
    /// # Errors
    ///
    /// See [`Retry::send`].
    pub async fn resend(&self, request: &Request) -> Result<Response> {
        self.send(request.try_clone().await?).await
    }

    /// Number of sends issued through this handle.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::Relaxed)
    }

    /// The last request sent through this handle, if any.
    #[must_use]
    pub fn into_latest(self) -> Option<Request> {
        self.latest
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for Retry<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Retry")
            .field("attempts", &self.attempts())
            .finish_non_exhaustive()
    }
}
