//! Plugins for [`reqwest`] clients built with `reqwest-middleware`.
//!
//! [`PluginMiddleware`] runs a [`Pipeline`] around the rest of the middleware
//! chain. Retries issued by plugins go through the same downstream chain,
//! without running the request hooks again.
//!
//! The canonical fields reqwest has no notion of travel in the middleware
//! [`Extensions`]: put a [`Credentials`], a [`CacheMode`] or an
//! [`AbortSignal`] there to set them on the canonical request.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::TryStreamExt;
use http::Extensions;
use http_body_util::BodyDataStream;
use reqwest_middleware::{Middleware, Next};
use tracing::trace;

use crate::{
    AbortSignal, Adapter, Body, BodyContent, CacheMode, Credentials, Error, Headers, Method,
    Pipeline, Request, RequestParts, Response, Result,
};

/// `reqwest-middleware` middleware running a plugin [`Pipeline`].
///
/// # Example
///
/// ```ignore
/// use plait::{Pipeline, PluginMiddleware, plugins::LoggingPlugin};
/// use reqwest_middleware::ClientBuilder;
///
/// let client = ClientBuilder::new(reqwest::Client::new())
///     .with(PluginMiddleware::new(Pipeline::new().with(LoggingPlugin::new())))
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct PluginMiddleware {
    pipeline: Pipeline,
}

impl PluginMiddleware {
    /// Middleware running `pipeline`.
    #[must_use]
    pub fn new(pipeline: Pipeline) -> Self {
        Self { pipeline }
    }

    /// The plugins run by this middleware.
    #[must_use]
    pub fn pipeline(&self) -> &Pipeline {
        &self.pipeline
    }
}

#[async_trait]
impl Middleware for PluginMiddleware {
    async fn handle(
        &self,
        req: reqwest::Request,
        extensions: &mut Extensions,
        next: Next<'_>,
    ) -> reqwest_middleware::Result<reqwest::Response> {
        let adapter = ReqwestAdapter {
            next,
            extensions: extensions.clone(),
        };
        self.pipeline
            .handle(&adapter, req)
            .await
            .map_err(into_middleware_error)
    }
}

fn into_middleware_error(err: Error) -> reqwest_middleware::Error {
    reqwest_middleware::Error::middleware(err)
}

/// Downstream errors as plait errors; plait errors wrapped by an inner
/// `PluginMiddleware` come back unchanged.
fn map_downstream_error(err: reqwest_middleware::Error) -> Error {
    match err {
        reqwest_middleware::Error::Reqwest(err) => map_reqwest_error(&err),
        reqwest_middleware::Error::Middleware(err) => match err.downcast::<Error>() {
            Ok(err) => err,
            Err(err) => Error::connection(format!("{err:#}")),
        },
    }
}

fn map_reqwest_error(err: &reqwest::Error) -> Error {
    if err.is_timeout() {
        Error::Timeout
    } else if err.is_connect() {
        Error::connection(err.to_string())
    } else if err.is_builder() {
        Error::invalid_request(err.to_string())
    } else if err.is_decode() || err.is_body() {
        Error::conversion(err.to_string())
    } else {
        Error::connection(err.to_string())
    }
}

/// Per-request timeout of the native request, restored on the way out.
#[derive(Debug, Clone, Copy)]
struct RequestTimeout(Duration);

/// [`Adapter`] between `reqwest` and the canonical model, sending through
/// the remaining middleware chain.
struct ReqwestAdapter<'a> {
    next: Next<'a>,
    extensions: Extensions,
}

fn request_body(body: Option<reqwest::Body>) -> Body {
    let Some(body) = body else {
        return Body::empty();
    };
    if let Some(bytes) = body.as_bytes() {
        return if bytes.is_empty() {
            Body::empty()
        } else {
            Body::from(Bytes::copy_from_slice(bytes))
        };
    }
    Body::from_stream(
        BodyDataStream::new(body).map_err(|err| Error::connection(err.to_string())),
    )
}

fn native_body(body: Body) -> Result<Option<reqwest::Body>> {
    Ok(match body.into_content()? {
        BodyContent::Empty => None,
        BodyContent::Full(bytes) => Some(reqwest::Body::from(bytes)),
        BodyContent::Streaming(stream) => Some(reqwest::Body::wrap_stream(stream)),
    })
}

#[async_trait]
impl Adapter for ReqwestAdapter<'_> {
    type NativeRequest = reqwest::Request;
    type NativeResponse = reqwest::Response;

    fn to_canonical_request(&self, mut request: reqwest::Request) -> Result<Request> {
        let method = Method::try_from(request.method())?;
        let headers = Headers::from(request.headers());
        let body = request_body(request.body_mut().take());

        let mut extensions = Extensions::new();
        extensions.insert(request.version());
        if let Some(timeout) = request.timeout() {
            extensions.insert(RequestTimeout(*timeout));
        }

        let canonical = RequestParts {
            method,
            url: request.url().clone(),
            headers,
            body,
            signal: self.extensions.get::<AbortSignal>().cloned(),
            credentials: self
                .extensions
                .get::<Credentials>()
                .copied()
                .unwrap_or_default(),
            cache: self.extensions.get::<CacheMode>().copied().unwrap_or_default(),
            extensions,
        };
        trace!(method = %canonical.method, url = %canonical.url, "reqwest request to canonical");
        Ok(Request::from_parts(canonical))
    }

    async fn apply_canonical_request(&self, request: Request) -> Result<reqwest::Request> {
        let url = request.cache_busting_url();
        let parts = request.into_parts();

        let mut native = reqwest::Request::new(http::Method::from(parts.method), url);
        *native.headers_mut() = parts.headers.to_header_map();
        *native.body_mut() = native_body(parts.body)?;
        if let Some(version) = parts.extensions.get::<http::Version>() {
            *native.version_mut() = *version;
        }
        if let Some(timeout) = parts.extensions.get::<RequestTimeout>() {
            *native.timeout_mut() = Some(timeout.0);
        }
        Ok(native)
    }

    fn to_canonical_response(&self, response: reqwest::Response) -> Result<Response> {
        let status = response.status().as_u16();
        let headers = Headers::from(response.headers());
        let url = response.url().clone();
        let version = response.version();
        let body = response
            .bytes_stream()
            .map_err(|err| map_reqwest_error(&err));

        let response = Response::new(status, headers, Body::from_stream(body))
            .with_url(Some(url))
            .with_extension(version);
        trace!(status, "reqwest response to canonical");
        Ok(response)
    }

    async fn apply_canonical_response(
        &self,
        response: Response,
        _request: &Request,
    ) -> Result<reqwest::Response> {
        let parts = response.into_parts();
        let status = http::StatusCode::from_u16(parts.status)
            .map_err(|e| Error::conversion(format!("status {}: {e}", parts.status)))?;
        let body = native_body(parts.body)?.unwrap_or_else(|| reqwest::Body::from(Bytes::new()));

        let mut native = http::Response::new(body);
        *native.status_mut() = status;
        *native.headers_mut() = parts.headers.to_header_map();
        if let Some(version) = parts.extensions.get::<http::Version>() {
            *native.version_mut() = *version;
        }
        Ok(reqwest::Response::from(native))
    }

    async fn send(&self, request: reqwest::Request) -> Result<reqwest::Response> {
        let mut extensions = self.extensions.clone();
        self.next
            .clone()
            .run(request, &mut extensions)
            .await
            .map_err(map_downstream_error)
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use super::*;

    #[test]
    fn pipeline_errors_round_trip_through_middleware_errors() {
        let err = into_middleware_error(Error::plugin("auth", "no token"));
        let_assert!(Error::Plugin { plugin, .. } = map_downstream_error(err));
        check!(plugin == "auth");
    }

    #[test]
    fn foreign_middleware_errors_become_connection_errors() {
        let err = reqwest_middleware::Error::middleware(std::io::Error::other("boom"));
        let_assert!(Error::Connection(message) = map_downstream_error(err));
        check!(message.contains("boom"));
    }

    #[tokio::test]
    async fn buffered_request_body_is_kept() {
        let body = request_body(Some(reqwest::Body::from("hello")));
        check!(body.bytes().await.expect("bytes").as_ref() == b"hello");

        check!(request_body(None).is_absent());
        check!(request_body(Some(reqwest::Body::from(""))).is_absent());
    }

    #[tokio::test]
    async fn streaming_request_body_is_read_lazily() {
        let stream = futures_util::stream::iter(vec![
            Ok::<_, std::io::Error>(Bytes::from_static(b"he")),
            Ok(Bytes::from_static(b"llo")),
        ]);
        let body = request_body(Some(reqwest::Body::wrap_stream(stream)));
        check!(body.text().await.expect("text") == "hello");
    }
}
