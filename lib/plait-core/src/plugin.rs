//! The plugin contract.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{Request, Response, Result, Retry};

/// A unit of request/response processing attached to a client.
///
/// Both hooks default to passing their input through unchanged, so a plugin
/// only implements the stage it cares about.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use plait_core::{Plugin, Request, Result};
///
/// struct UserAgent;
///
/// #[async_trait]
/// impl Plugin for UserAgent {
///     fn name(&self) -> &str {
///         "user-agent"
///     }
///
///     async fn before_request(&self, request: Request) -> Result<Request> {
///         request.with_header("user-agent", "plait")
///     }
/// }
/// ```
#[async_trait]
pub trait Plugin: Send + Sync {
    /// Name used in logs and error reports.
    fn name(&self) -> &str;

    /// Rewrites the outgoing request. Returning an error aborts the call
    /// before anything is sent.
    async fn before_request(&self, request: Request) -> Result<Request> {
        Ok(request)
    }

    /// Rewrites or replaces the response.
    ///
    /// `request` is the current request, reflecting retries issued by earlier
    /// plugins. Use `retry` to re-send a (possibly modified) request; the
    /// returned response becomes the one handed to the next plugin.
    async fn after_response(
        &self,
        response: Response,
        _request: &Request,
        _retry: &Retry<'_>,
    ) -> Result<Response> {
        Ok(response)
    }
}

#[async_trait]
impl<P: Plugin + ?Sized> Plugin for Arc<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn before_request(&self, request: Request) -> Result<Request> {
        (**self).before_request(request).await
    }

    async fn after_response(
        &self,
        response: Response,
        request: &Request,
        retry: &Retry<'_>,
    ) -> Result<Response> {
        (**self).after_response(response, request, retry).await
    }
}
