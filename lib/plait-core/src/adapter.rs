//! Per-client conversion contract.

use async_trait::async_trait;
use tracing::trace;

use crate::{Dispatch, Request, Response, Result};

/// Maps one HTTP client's native request/response types to and from the
/// canonical model, and performs the native send.
///
/// Settings that only exist on the native side travel through the canonical
/// [`Request::extensions`] so that `apply_canonical_request` can restore
/// them.
#[async_trait]
pub trait Adapter: Send + Sync {
    /// The client's request type.
    type NativeRequest: Send;
    /// The client's response type.
    type NativeResponse: Send;

    /// Native request to canonical form.
    ///
    /// # Errors
    ///
    /// Returns a conversion error when the native value cannot be represented.
    fn to_canonical_request(&self, request: Self::NativeRequest) -> Result<Request>;

    /// Canonical request back onto the native shape.
    ///
    /// # Errors
    ///
    /// Returns a conversion error when the body does not match its content
    /// type, or [`crate::Error::BodyConsumed`].
    async fn apply_canonical_request(&self, request: Request) -> Result<Self::NativeRequest>;

    /// Native response to canonical form.
    ///
    /// # Errors
    ///
    /// Returns a conversion error when the native value cannot be represented.
    fn to_canonical_response(&self, response: Self::NativeResponse) -> Result<Response>;

    /// Canonical response back onto the native shape returned to the caller.
    ///
    /// `request` is the final current request of the call.
    ///
    /// # Errors
    ///
    /// Returns a conversion error, or [`crate::Error::BodyConsumed`].
    async fn apply_canonical_response(
        &self,
        response: Response,
        request: &Request,
    ) -> Result<Self::NativeResponse>;

    /// Performs the actual network call.
    ///
    /// # Errors
    ///
    /// Returns the client's transport errors.
    async fn send(&self, request: Self::NativeRequest) -> Result<Self::NativeResponse>;
}

/// [`Dispatch`] through an [`Adapter`]'s native send, racing the request's
/// abort signal.
#[derive(Debug)]
pub struct AdapterDispatch<'a, A>(pub &'a A);

#[async_trait]
impl<A: Adapter> Dispatch for AdapterDispatch<'_, A> {
    async fn dispatch(&self, request: Request) -> Result<Response> {
        let signal = request.signal().cloned();
        let native = self.0.apply_canonical_request(request).await?;
        trace!("converted canonical request to native");

        let send = self.0.send(native);
        let native = match signal {
            Some(signal) => signal.guard(send).await?,
            None => send.await?,
        };

        let response = self.0.to_canonical_response(native)?;
        trace!(status = response.status(), "converted native response to canonical");
        Ok(response)
    }
}
