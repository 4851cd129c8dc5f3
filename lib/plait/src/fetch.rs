//! Fetch-style binding: a function from `http::Request<Bytes>` to
//! `http::Response<Bytes>`.
//!
//! Fetch options that `http` has no field for travel as request extensions:
//! [`Credentials`], [`CacheMode`] and [`AbortSignal`]. Responses carry their
//! reason phrase as a [`ReasonPhrase`] extension and their URL as a
//! [`ResponseUrl`] extension.
//!
//! # Example
//!
//! ```ignore
//! use plait::{HyperFetch, Pipeline, create_fetch, plugins::BearerAuthPlugin};
//!
//! let fetch = create_fetch(HyperFetch::new(), Pipeline::new().with(BearerAuthPlugin::new("t")));
//! let response = fetch.fetch(http::Request::get("https://example.com").body(Bytes::new())?).await?;
//! ```

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http_body_util::{BodyExt, Full};
use hyper_rustls::HttpsConnector;
use hyper_util::client::legacy::{Client, connect::HttpConnector};
use hyper_util::rt::TokioExecutor;
use tracing::trace;
use url::Url;

use crate::config::ClientConfig;
use crate::connector::https_connector;
use crate::{
    AbortSignal, Adapter, Body, CacheMode, Credentials, Error, Headers, Method, Pipeline, Request,
    Response, Result,
};

/// Status reason phrase attached to fetch responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReasonPhrase(pub String);

/// Final URL attached to fetch responses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseUrl(pub Url);

/// A fetch function.
pub trait Fetch: Send + Sync {
    /// Performs the request.
    ///
    /// # Errors
    ///
    /// Returns transport errors, or [`Error::Aborted`] when the request's
    /// [`AbortSignal`] fires.
    fn fetch(
        &self,
        request: http::Request<Bytes>,
    ) -> impl Future<Output = Result<http::Response<Bytes>>> + Send;
}

// ============================================================================
// Closures
// ============================================================================

/// [`Fetch`] implemented by a closure, see [`fetch_fn`].
#[derive(Clone)]
pub struct FetchFn<F>(F);

/// Turns a closure into a [`Fetch`].
pub fn fetch_fn<F, Fut>(f: F) -> FetchFn<F>
where
    F: Fn(http::Request<Bytes>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<http::Response<Bytes>>> + Send,
{
    FetchFn(f)
}

impl<F, Fut> Fetch for FetchFn<F>
where
    F: Fn(http::Request<Bytes>) -> Fut + Send + Sync,
    Fut: Future<Output = Result<http::Response<Bytes>>> + Send,
{
    fn fetch(
        &self,
        request: http::Request<Bytes>,
    ) -> impl Future<Output = Result<http::Response<Bytes>>> + Send {
        (self.0)(request)
    }
}

impl<F> std::fmt::Debug for FetchFn<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchFn").finish_non_exhaustive()
    }
}

// ============================================================================
// Hyper transport
// ============================================================================

/// [`Fetch`] over a pooled hyper-util client with rustls.
///
/// Honors the request's [`AbortSignal`] and the configured timeout. There is
/// no cache and no cookie store, so [`CacheMode`] and [`Credentials`] are
/// ignored.
#[derive(Clone)]
pub struct HyperFetch {
    inner: Client<HttpsConnector<HttpConnector>, Full<Bytes>>,
    timeout: Duration,
}

impl HyperFetch {
    /// Create a transport with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(&ClientConfig::default())
    }

    /// Create a transport from the connection settings of `config`.
    #[must_use]
    pub fn with_config(config: &ClientConfig) -> Self {
        let inner = Client::builder(TokioExecutor::new())
            .pool_idle_timeout(config.pool.idle_timeout)
            .pool_max_idle_per_host(config.pool.max_idle_per_host)
            .build(https_connector(config));

        Self {
            inner,
            timeout: config.timeout,
        }
    }

    /// Sends `request` and reads the whole body, both under one deadline.
    async fn execute(&self, request: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
        tokio::time::timeout(self.timeout, self.exchange(request))
            .await
            .map_err(|_| Error::Timeout)?
    }

    async fn exchange(&self, request: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
        let url = Url::parse(&request.uri().to_string())?;
        let (parts, body) = request.into_parts();
        let hyper_request = http::Request::from_parts(parts, Full::new(body));

        let response = self
            .inner
            .request(hyper_request)
            .await
            .map_err(map_hyper_error)?;

        let (mut parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| Error::connection(e.to_string()))?
            .to_bytes();

        let reason = parts.status.canonical_reason().unwrap_or_default();
        parts.extensions.insert(ReasonPhrase(reason.to_string()));
        parts.extensions.insert(ResponseUrl(url));
        Ok(http::Response::from_parts(parts, body))
    }
}

#[allow(clippy::needless_pass_by_value)]
pub(crate) fn map_hyper_error(err: hyper_util::client::legacy::Error) -> Error {
    let msg = err.to_string();

    if err.is_connect() {
        return Error::connection(msg);
    }

    if msg.contains("ssl") || msg.contains("tls") || msg.contains("certificate") {
        return Error::tls(msg);
    }

    Error::connection(msg)
}

impl Default for HyperFetch {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HyperFetch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperFetch")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Fetch for HyperFetch {
    fn fetch(
        &self,
        request: http::Request<Bytes>,
    ) -> impl Future<Output = Result<http::Response<Bytes>>> + Send {
        async move {
            match request.extensions().get::<AbortSignal>().cloned() {
                Some(signal) => signal.guard(self.execute(request)).await,
                None => self.execute(request).await,
            }
        }
    }
}

// ============================================================================
// Plugin wrapper
// ============================================================================

/// A [`Fetch`] that runs a plugin pipeline around another one.
///
/// Wrapping a `PluginFetch` again layers a second pipeline on top; the outer
/// request hooks run first.
#[derive(Debug, Clone)]
pub struct PluginFetch<F> {
    inner: F,
    pipeline: Pipeline,
}

impl<F: Fetch> PluginFetch<F> {
    /// Wraps `inner` with `pipeline`.
    #[must_use]
    pub fn new(inner: F, pipeline: Pipeline) -> Self {
        Self { inner, pipeline }
    }

    /// The wrapped fetch.
    #[must_use]
    pub fn inner(&self) -> &F {
        &self.inner
    }
}

/// Wraps a fetch function with a plugin pipeline.
#[must_use]
pub fn create_fetch<F: Fetch>(fetch: F, pipeline: Pipeline) -> PluginFetch<F> {
    PluginFetch::new(fetch, pipeline)
}

impl<F: Fetch> Fetch for PluginFetch<F> {
    fn fetch(
        &self,
        request: http::Request<Bytes>,
    ) -> impl Future<Output = Result<http::Response<Bytes>>> + Send {
        async move {
            let adapter = FetchAdapter { fetch: &self.inner };
            self.pipeline.handle(&adapter, request).await
        }
    }
}

/// [`Adapter`] between fetch requests/responses and the canonical model.
#[derive(Debug)]
pub struct FetchAdapter<'a, F> {
    fetch: &'a F,
}

impl<'a, F: Fetch> FetchAdapter<'a, F> {
    /// Adapter sending through `fetch`.
    #[must_use]
    pub fn new(fetch: &'a F) -> Self {
        Self { fetch }
    }
}

fn body_from_bytes(bytes: Bytes) -> Body {
    if bytes.is_empty() {
        Body::empty()
    } else {
        Body::from(bytes)
    }
}

#[async_trait]
impl<F: Fetch> Adapter for FetchAdapter<'_, F> {
    type NativeRequest = http::Request<Bytes>;
    type NativeResponse = http::Response<Bytes>;

    fn to_canonical_request(&self, request: http::Request<Bytes>) -> Result<Request> {
        let (mut parts, body) = request.into_parts();
        let url = Url::parse(&parts.uri.to_string())?;
        let method = Method::try_from(&parts.method)?;

        let signal = parts.extensions.remove::<AbortSignal>();
        let credentials = parts.extensions.remove::<Credentials>().unwrap_or_default();
        let cache = parts.extensions.remove::<CacheMode>().unwrap_or_default();

        let mut canonical = crate::RequestParts {
            method,
            url,
            headers: Headers::from(&parts.headers),
            body: body_from_bytes(body),
            signal,
            credentials,
            cache,
            extensions: parts.extensions,
        };
        canonical.extensions.insert(parts.version);
        trace!(method = %canonical.method, url = %canonical.url, "fetch request to canonical");
        Ok(Request::from_parts(canonical))
    }

    async fn apply_canonical_request(&self, request: Request) -> Result<http::Request<Bytes>> {
        let parts = request.into_parts();
        let body = parts.body.bytes().await?;

        let mut native = http::Request::builder()
            .method(http::Method::from(parts.method))
            .uri(parts.url.as_str())
            .body(body)
            .map_err(|e| Error::invalid_request(e.to_string()))?;

        *native.headers_mut() = parts.headers.to_header_map();
        let mut extensions = parts.extensions;
        if let Some(version) = extensions.remove::<http::Version>() {
            *native.version_mut() = version;
        }
        extensions.insert(parts.credentials);
        extensions.insert(parts.cache);
        if let Some(signal) = parts.signal {
            extensions.insert(signal);
        }
        *native.extensions_mut() = extensions;
        Ok(native)
    }

    fn to_canonical_response(&self, response: http::Response<Bytes>) -> Result<Response> {
        let (mut parts, body) = response.into_parts();
        let reason = parts.extensions.remove::<ReasonPhrase>();
        let url = parts.extensions.remove::<ResponseUrl>().map(|url| url.0);

        let mut canonical = Response::from_parts(crate::ResponseParts {
            status: parts.status.as_u16(),
            status_text: String::new(),
            headers: Headers::from(&parts.headers),
            body: body_from_bytes(body),
            url,
            extensions: parts.extensions,
        });
        canonical = match reason {
            Some(reason) => canonical.with_status_text(reason.0),
            None => canonical.with_status_text(parts.status.canonical_reason().unwrap_or_default()),
        };
        Ok(canonical)
    }

    async fn apply_canonical_response(
        &self,
        response: Response,
        _request: &Request,
    ) -> Result<http::Response<Bytes>> {
        let parts = response.into_parts();
        let status = http::StatusCode::from_u16(parts.status)
            .map_err(|e| Error::conversion(format!("status {}: {e}", parts.status)))?;
        let body = parts.body.bytes().await?;

        let mut native = http::Response::new(body);
        *native.status_mut() = status;
        *native.headers_mut() = parts.headers.to_header_map();
        *native.extensions_mut() = parts.extensions;
        native
            .extensions_mut()
            .insert(ReasonPhrase(parts.status_text));
        if let Some(url) = parts.url {
            native.extensions_mut().insert(ResponseUrl(url));
        }
        Ok(native)
    }

    async fn send(&self, request: http::Request<Bytes>) -> Result<http::Response<Bytes>> {
        self.fetch.fetch(request).await
    }
}
