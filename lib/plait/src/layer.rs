//! Plugin pipeline as a tower layer over [`ClientRequest`] services.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use tower::{Layer, Service, ServiceExt};
use tracing::trace;
use url::Url;

use crate::message::{ClientRequest, ClientResponse, Payload, ResponseData, ResponseType};
use crate::{
    Adapter, Body, ContentType, Credentials, Error, Form, Headers, Pipeline, Request,
    RequestParts, Response, Result,
};

/// Per-request timeout of a [`ClientRequest`], kept through the pipeline.
#[derive(Debug, Clone, Copy)]
struct RequestTimeout(Duration);

/// Layer that runs a plugin pipeline around a [`ClientRequest`] service.
///
/// # Example
///
/// ```ignore
/// use plait::{HyperClient, Pipeline, PluginLayer};
///
/// let client = HyperClient::builder()
///     .layer(PluginLayer::new(Pipeline::new().with(MyPlugin)))
///     .build();
/// ```
#[derive(Debug, Clone)]
pub struct PluginLayer {
    pipeline: Pipeline,
    forced_json_parsing: bool,
}

impl PluginLayer {
    /// Create a layer running `pipeline`.
    #[must_use]
    pub fn new(pipeline: Pipeline) -> Self {
        Self {
            pipeline,
            forced_json_parsing: true,
        }
    }

    /// Whether textual responses rebuilt after the plugins are parsed as JSON.
    #[must_use]
    pub fn forced_json_parsing(mut self, forced: bool) -> Self {
        self.forced_json_parsing = forced;
        self
    }
}

impl<S> Layer<S> for PluginLayer {
    type Service = PluginService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        PluginService {
            inner,
            pipeline: self.pipeline.clone(),
            forced_json_parsing: self.forced_json_parsing,
        }
    }
}

/// Service that runs a plugin pipeline around its inner service.
#[derive(Debug, Clone)]
pub struct PluginService<S> {
    inner: S,
    pipeline: Pipeline,
    forced_json_parsing: bool,
}

impl<S> Service<ClientRequest> for PluginService<S>
where
    S: Service<ClientRequest, Response = ClientResponse, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
{
    type Response = ClientResponse;
    type Error = Error;
    type Future = Pin<Box<dyn Future<Output = Result<Self::Response>> + Send>>;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<()>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: ClientRequest) -> Self::Future {
        let adapter = HyperAdapter::new(self.inner.clone(), self.forced_json_parsing);
        let pipeline = self.pipeline.clone();
        Box::pin(async move { pipeline.handle(&adapter, request).await })
    }
}

/// [`Adapter`] between [`ClientRequest`]/[`ClientResponse`] and the
/// canonical model, sending through a tower service.
///
/// A rejection carrying a status ([`Error::Http`]) from the inner service is
/// turned back into a response, so plugins see non-2xx answers too.
pub struct HyperAdapter<S> {
    inner: Mutex<S>,
    forced_json_parsing: bool,
}

impl<S> HyperAdapter<S> {
    /// Adapter sending through `inner`.
    #[must_use]
    pub fn new(inner: S, forced_json_parsing: bool) -> Self {
        Self {
            inner: Mutex::new(inner),
            forced_json_parsing,
        }
    }
}

impl<S> std::fmt::Debug for HyperAdapter<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperAdapter")
            .field("forced_json_parsing", &self.forced_json_parsing)
            .finish_non_exhaustive()
    }
}

pub(crate) fn headers_from_map(map: &std::collections::HashMap<String, String>) -> Result<Headers> {
    let mut headers = Headers::new();
    for (name, value) in map {
        headers.set(name, value)?;
    }
    Ok(headers)
}

/// Canonical headers onto a single-valued map.
///
/// Repeated names are joined with `", "` in insertion order, as
/// [`Headers::get`] reads them.
pub(crate) fn headers_to_map(headers: &Headers) -> std::collections::HashMap<String, String> {
    let mut map = std::collections::HashMap::<String, String>::new();
    for (name, value) in headers.iter() {
        map.entry(name.to_ascii_lowercase())
            .and_modify(|joined| {
                joined.push_str(", ");
                joined.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    map
}

fn rejected_response(
    status: u16,
    message: String,
    headers: &Headers,
    body: Option<bytes::Bytes>,
) -> ClientResponse {
    let data = body
        .filter(|bytes| !bytes.is_empty())
        .map_or(ResponseData::Empty, ResponseData::Bytes);
    ClientResponse {
        status,
        status_text: message,
        headers: headers_to_map(headers),
        data,
    }
}

#[async_trait]
impl<S> Adapter for HyperAdapter<S>
where
    S: Service<ClientRequest, Response = ClientResponse, Error = Error> + Clone + Send + 'static,
    S::Future: Send,
{
    type NativeRequest = ClientRequest;
    type NativeResponse = ClientResponse;

    fn to_canonical_request(&self, request: ClientRequest) -> Result<Request> {
        let url = Url::parse(&request.url)?;
        let mut headers = headers_from_map(&request.headers)?;

        let body = match &request.data {
            None => Body::empty(),
            Some(payload) => {
                if !headers.contains("content-type") || matches!(payload, Payload::Form(_)) {
                    headers.set("content-type", &payload.content_type())?;
                }
                Body::from(payload.to_bytes()?)
            }
        };

        let credentials = if request.with_credentials {
            Credentials::Include
        } else {
            Credentials::SameOrigin
        };

        let mut parts = Request::new(request.method, url).into_parts();
        parts.headers = headers;
        parts.body = body;
        parts.signal = request.signal;
        parts.credentials = credentials;
        parts.extensions.insert(request.response_type);
        if let Some(timeout) = request.timeout {
            parts.extensions.insert(RequestTimeout(timeout));
        }
        trace!(method = %parts.method, url = %parts.url, "client request to canonical");
        Ok(Request::from_parts(parts))
    }

    async fn apply_canonical_request(&self, request: Request) -> Result<ClientRequest> {
        let url = request.cache_busting_url();
        let RequestParts {
            method,
            headers,
            body,
            signal,
            credentials,
            extensions,
            ..
        } = request.into_parts();

        let data = if body.is_absent() {
            None
        } else {
            let bytes = body.bytes().await?;
            let content_type = headers.first("content-type").map(str::to_string);
            Some(match content_type.as_deref().map(ContentType::from_mime) {
                Some(ContentType::Multipart) => {
                    let header = content_type.as_deref().unwrap_or_default();
                    Payload::Form(Form::parse(header, &bytes)?)
                }
                Some(ContentType::FormUrlEncoded | ContentType::PlainText) => Payload::Text(
                    String::from_utf8(bytes.to_vec())
                        .map_err(|e| Error::conversion(format!("text body is not UTF-8: {e}")))?,
                ),
                Some(ContentType::Json) => Payload::Json(
                    serde_json::from_slice(&bytes)
                        .map_err(|e| Error::conversion(format!("JSON body does not parse: {e}")))?,
                ),
                Some(ContentType::OctetStream) | None => Payload::Bytes(bytes),
            })
        };

        Ok(ClientRequest {
            method,
            url: url.to_string(),
            headers: headers_to_map(&headers),
            data,
            with_credentials: credentials == Credentials::Include,
            signal,
            timeout: extensions.get::<RequestTimeout>().map(|timeout| timeout.0),
            response_type: extensions
                .get::<ResponseType>()
                .copied()
                .unwrap_or_default(),
        })
    }

    fn to_canonical_response(&self, response: ClientResponse) -> Result<Response> {
        let headers = headers_from_map(&response.headers)?;
        let body = match &response.data {
            ResponseData::Empty => Body::empty(),
            data => Body::from(data.to_bytes()?),
        };
        Ok(Response::new(response.status, headers, body).with_status_text(response.status_text))
    }

    async fn apply_canonical_response(
        &self,
        response: Response,
        request: &Request,
    ) -> Result<ClientResponse> {
        let response_type = request
            .extensions()
            .get::<ResponseType>()
            .copied()
            .unwrap_or_default();
        let parts = response.into_parts();
        let data = if parts.body.is_absent() {
            ResponseData::Empty
        } else {
            ResponseData::decode(
                parts.body.bytes().await?,
                parts.headers.content_type(),
                response_type,
                self.forced_json_parsing,
            )?
        };

        Ok(ClientResponse {
            status: parts.status,
            status_text: parts.status_text,
            headers: headers_to_map(&parts.headers),
            data,
        })
    }

    async fn send(&self, request: ClientRequest) -> Result<ClientResponse> {
        let service = self
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        match service.oneshot(request).await {
            Err(Error::Http {
                status,
                message,
                headers,
                body,
            }) => Ok(rejected_response(status, message, &headers, body)),
            result => result,
        }
    }
}
