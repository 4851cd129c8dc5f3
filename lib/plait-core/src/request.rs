//! Canonical HTTP request.
//!
//! Use [`Request::builder`] to construct requests with headers, query parameters, and bodies.
//! Plugins transform requests by value: every `with_*` method consumes the
//! request and returns the updated one.
//!
//! # Example
//!
//! ```
//! use plait_core::{Method, Request};
//!
//! let request = Request::builder(Method::Get, "https://api.example.com".parse().unwrap())
//!     .header("Accept", "application/json")
//!     .query("page", "1")
//!     .build()
//!     .unwrap();
//!
//! let request = request.with_header("x-trace", "abc").unwrap();
//! assert_eq!(request.headers().get("accept").as_deref(), Some("application/json"));
//! ```

use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use http::Extensions;
use url::Url;

use crate::{AbortSignal, Body, Error, Form, Headers, Method, Result};

/// Whether the client should send cookies and authorization with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Credentials {
    /// Always send credentials, even cross-origin.
    Include,
    /// Never send credentials.
    Omit,
    /// Send credentials only to the request's own origin.
    #[default]
    SameOrigin,
}

/// How the request interacts with HTTP caches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CacheMode {
    /// Standard HTTP cache behaviour.
    #[default]
    Default,
    /// Bypass the cache and do not store the response.
    NoStore,
    /// Bypass the cache, store the response.
    Reload,
    /// Revalidate with the server before using a cached entry.
    NoCache,
    /// Use any cached entry, even stale.
    ForceCache,
    /// Only use the cache, never the network.
    OnlyIfCached,
}

impl CacheMode {
    /// Modes that a client without cache support emulates by making the URL
    /// unique.
    #[must_use]
    pub const fn busts_cache(&self) -> bool {
        matches!(self, Self::NoCache | Self::NoStore)
    }
}

/// Client-agnostic HTTP request.
#[derive(Debug)]
pub struct Request {
    method: Method,
    url: Url,
    headers: Headers,
    body: Body,
    signal: Option<AbortSignal>,
    credentials: Credentials,
    cache: CacheMode,
    extensions: Extensions,
}

/// Every field of a [`Request`], for adapters that take it apart.
#[derive(Debug)]
pub struct RequestParts {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL.
    pub url: Url,
    /// Headers.
    pub headers: Headers,
    /// Body.
    pub body: Body,
    /// Abort signal.
    pub signal: Option<AbortSignal>,
    /// Credentials mode.
    pub credentials: Credentials,
    /// Cache mode.
    pub cache: CacheMode,
    /// Native settings carried through the pipeline.
    pub extensions: Extensions,
}

impl Request {
    /// Request without headers or body.
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            method,
            url,
            headers: Headers::new(),
            body: Body::empty(),
            signal: None,
            credentials: Credentials::default(),
            cache: CacheMode::default(),
            extensions: Extensions::new(),
        }
    }

    /// Creates a new [`RequestBuilder`].
    #[must_use]
    pub fn builder(method: Method, url: Url) -> RequestBuilder {
        RequestBuilder::new(method, url)
    }

    /// HTTP method.
    #[must_use]
    pub const fn method(&self) -> Method {
        self.method
    }

    /// Request URL.
    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Request headers.
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Request body.
    #[must_use]
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Abort signal, if any.
    #[must_use]
    pub fn signal(&self) -> Option<&AbortSignal> {
        self.signal.as_ref()
    }

    /// Credentials mode.
    #[must_use]
    pub const fn credentials(&self) -> Credentials {
        self.credentials
    }

    /// Cache mode.
    #[must_use]
    pub const fn cache(&self) -> CacheMode {
        self.cache
    }

    /// Native settings carried through the pipeline.
    #[must_use]
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Replaces the method.
    #[must_use]
    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Replaces the URL.
    #[must_use]
    pub fn with_url(mut self, url: Url) -> Self {
        self.url = url;
        self
    }

    /// Replaces every header.
    #[must_use]
    pub fn with_headers(mut self, headers: Headers) -> Self {
        self.headers = headers;
        self
    }

    /// Sets a header, replacing previous values of the same name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidHeader`] for an invalid name or value.
    pub fn with_header(mut self, name: &str, value: &str) -> Result<Self> {
        self.headers.set(name, value)?;
        Ok(self)
    }

    /// Removes every value of a header.
    #[must_use]
    pub fn without_header(mut self, name: &str) -> Self {
        self.headers.remove(name);
        self
    }

    /// Replaces the body. A `content-length` header no longer matching is
    /// dropped; the client computes it again.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = body.into();
        self.headers.remove("content-length");
        self
    }

    /// Replaces or drops the abort signal.
    #[must_use]
    pub fn with_signal(mut self, signal: Option<AbortSignal>) -> Self {
        self.signal = signal;
        self
    }

    /// Replaces the credentials mode.
    #[must_use]
    pub fn with_credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Replaces the cache mode.
    #[must_use]
    pub fn with_cache(mut self, cache: CacheMode) -> Self {
        self.cache = cache;
        self
    }

    /// Stores a native setting, replacing any previous value of the same type.
    #[must_use]
    pub fn with_extension<T: Clone + Send + Sync + 'static>(mut self, value: T) -> Self {
        self.extensions.insert(value);
        self
    }

    /// URL to put on the wire by a client that has no cache of its own.
    ///
    /// When the cache mode is [`CacheMode::NoCache`] or [`CacheMode::NoStore`]
    /// a `_=<unix millis>` query parameter is appended.
    #[must_use]
    pub fn cache_busting_url(&self) -> Url {
        let mut url = self.url.clone();
        if self.cache.busts_cache() {
            let millis = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_millis())
                .unwrap_or(0);
            url.query_pairs_mut().append_pair("_", &millis.to_string());
        }
        url
    }

    /// Duplicates the request, body included, without consuming it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BodyConsumed`] if the body was already read.
    pub async fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            method: self.method,
            url: self.url.clone(),
            headers: self.headers.clone(),
            body: self.body.try_clone().await?,
            signal: self.signal.clone(),
            credentials: self.credentials,
            cache: self.cache,
            extensions: self.extensions.clone(),
        })
    }

    /// Reads the body.
    ///
    /// # Errors
    ///
    /// See [`Body::bytes`].
    pub async fn bytes(&self) -> Result<Bytes> {
        self.body.bytes().await
    }

    /// Reads the body as UTF-8 text.
    ///
    /// # Errors
    ///
    /// See [`Body::text`].
    pub async fn text(&self) -> Result<String> {
        self.body.text().await
    }

    /// Reads the body as JSON.
    ///
    /// # Errors
    ///
    /// See [`Body::json`].
    pub async fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        self.body.json().await
    }

    /// Reads the body as multipart form data, using the request's
    /// `Content-Type`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conversion`] without a `Content-Type`, otherwise see
    /// [`Body::form_data`].
    pub async fn form_data(&self) -> Result<Form> {
        let content_type = self
            .headers
            .first(http::header::CONTENT_TYPE.as_str())
            .ok_or_else(|| Error::conversion("form data body without content type"))?
            .to_string();
        self.body.form_data(&content_type).await
    }

    /// Takes the request apart.
    #[must_use]
    pub fn into_parts(self) -> RequestParts {
        RequestParts {
            method: self.method,
            url: self.url,
            headers: self.headers,
            body: self.body,
            signal: self.signal,
            credentials: self.credentials,
            cache: self.cache,
            extensions: self.extensions,
        }
    }

    /// Reassembles a request.
    #[must_use]
    pub fn from_parts(parts: RequestParts) -> Self {
        Self {
            method: parts.method,
            url: parts.url,
            headers: parts.headers,
            body: parts.body,
            signal: parts.signal,
            credentials: parts.credentials,
            cache: parts.cache,
            extensions: parts.extensions,
        }
    }
}

/// Builder for constructing [`Request`] instances.
///
/// Header errors are deferred to [`RequestBuilder::build`].
#[derive(Debug)]
pub struct RequestBuilder {
    request: Request,
    error: Option<Error>,
}

impl RequestBuilder {
    /// Creates a new builder.
    #[must_use]
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            request: Request::new(method, url),
            error: None,
        }
    }

    /// Sets a header.
    #[must_use]
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_none()
            && let Err(err) = self.request.headers.set(name, value)
        {
            self.error = Some(err);
        }
        self
    }

    /// Appends a header value, keeping existing ones.
    #[must_use]
    pub fn append_header(mut self, name: &str, value: &str) -> Self {
        if self.error.is_none()
            && let Err(err) = self.request.headers.append(name, value)
        {
            self.error = Some(err);
        }
        self
    }

    /// Appends a query parameter to the URL.
    #[must_use]
    pub fn query(mut self, name: &str, value: &str) -> Self {
        self.request.url.query_pairs_mut().append_pair(name, value);
        self
    }

    /// Sets the request body.
    #[must_use]
    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.request.body = body.into();
        self
    }

    /// Set a JSON body.
    #[must_use]
    pub fn json<T: serde::Serialize>(self, value: &T) -> Self {
        match crate::to_json(value) {
            Ok(body) => self.header("content-type", "application/json").body(body),
            Err(err) => self.fail(err),
        }
    }

    /// Set a form-urlencoded body.
    #[must_use]
    pub fn form<T: serde::Serialize>(self, value: &T) -> Self {
        match crate::to_form(value) {
            Ok(body) => self
                .header("content-type", "application/x-www-form-urlencoded")
                .body(body),
            Err(err) => self.fail(err),
        }
    }

    /// Set a multipart body.
    #[must_use]
    pub fn multipart(self, form: Form) -> Self {
        let (content_type, body) = form.into_body();
        self.header("content-type", &content_type).body(body)
    }

    /// Sets the abort signal.
    #[must_use]
    pub fn signal(mut self, signal: AbortSignal) -> Self {
        self.request.signal = Some(signal);
        self
    }

    /// Sets the credentials mode.
    #[must_use]
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.request.credentials = credentials;
        self
    }

    /// Sets the cache mode.
    #[must_use]
    pub fn cache(mut self, cache: CacheMode) -> Self {
        self.request.cache = cache;
        self
    }

    /// Stores a native setting.
    #[must_use]
    pub fn extension<T: Clone + Send + Sync + 'static>(mut self, value: T) -> Self {
        self.request.extensions.insert(value);
        self
    }

    fn fail(mut self, err: Error) -> Self {
        self.error.get_or_insert(err);
        self
    }

    /// Builds the [`Request`].
    ///
    /// # Errors
    ///
    /// Returns the first header or serialization error met while building.
    pub fn build(self) -> Result<Request> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.request),
        }
    }
}
