//! [`HyperClient`]: a tower stack over [`HyperFetch`], plugins on top.
//!
//! Requests flow through the plugin pipeline first, then through the tower
//! layers in the order they were added, then reach the transport. The
//! configured status validation runs last, on whatever the plugins returned.

use std::sync::{Arc, Mutex, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use futures_util::future::BoxFuture;
use tower::util::BoxCloneService;
use tower::{Layer, ServiceExt};
use tower_service::Service;
use url::Url;

use crate::config::{ClientConfig, ClientConfigBuilder, ValidateStatus};
use crate::fetch::{Fetch, HyperFetch, ReasonPhrase};
use crate::layer::{PluginLayer, headers_from_map, headers_to_map};
use crate::message::{ClientRequest, ClientResponse, ResponseData, ResponseType};
use crate::plugins::{BearerAuthPlugin, LoggingPlugin, RetryOptions, RetryPlugin};
use crate::{Error, Headers, Pipeline, Plugin, Result, is_null_body_status};

/// The type-erased stack that tower layers wrap.
pub type BoxedService = BoxCloneService<ClientRequest, ClientResponse, Error>;

/// Future returned by [`HyperClient`] as a tower service.
pub type ServiceFuture = BoxFuture<'static, Result<ClientResponse>>;

type Wrap = Box<dyn FnOnce(BoxedService) -> BoxedService + Send + Sync>;

/// Innermost service: encodes the payload, sends it and decodes the answer.
///
/// Never validates the status.
#[derive(Clone)]
struct Transport {
    fetch: HyperFetch,
    forced_json_parsing: bool,
}

impl Transport {
    fn new(config: &ClientConfig) -> Self {
        Self {
            fetch: HyperFetch::with_config(config),
            forced_json_parsing: config.forced_json_parsing,
        }
    }

    /// The payload's content type is only a default; an explicit header wins.
    fn encode(request: ClientRequest) -> Result<http::Request<Bytes>> {
        let ClientRequest {
            method,
            url,
            headers,
            data,
            signal,
            ..
        } = request;

        let url = Url::parse(&url)?;
        let mut builder = http::Request::builder()
            .method(http::Method::from(method))
            .uri(url.as_str());
        for (name, value) in &headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let body = match data {
            None => Bytes::new(),
            Some(payload) => {
                let typed = headers
                    .keys()
                    .any(|name| name.eq_ignore_ascii_case("content-type"));
                if !typed {
                    builder = builder.header(http::header::CONTENT_TYPE, payload.content_type());
                }
                payload.to_bytes()?
            }
        };

        let mut http_request = builder
            .body(body)
            .map_err(|e| Error::invalid_request(e.to_string()))?;
        if let Some(signal) = signal {
            http_request.extensions_mut().insert(signal);
        }
        Ok(http_request)
    }

    fn decode(
        &self,
        response: http::Response<Bytes>,
        response_type: ResponseType,
    ) -> Result<ClientResponse> {
        let (parts, body) = response.into_parts();
        let status = parts.status.as_u16();
        let status_text = match parts.extensions.get::<ReasonPhrase>() {
            Some(ReasonPhrase(reason)) => reason.clone(),
            None => parts
                .status
                .canonical_reason()
                .unwrap_or_default()
                .to_string(),
        };
        let headers = Headers::from(&parts.headers);

        let data = if is_null_body_status(status) {
            ResponseData::Empty
        } else {
            ResponseData::decode(
                body,
                headers.content_type(),
                response_type,
                self.forced_json_parsing,
            )?
        };

        Ok(ClientResponse {
            status,
            status_text,
            headers: headers_to_map(&headers),
            data,
        })
    }

    async fn send(self, request: ClientRequest) -> Result<ClientResponse> {
        let response_type = request.response_type;
        let per_request = request.timeout;
        let pending = self.fetch.fetch(Self::encode(request)?);

        let response = match per_request {
            None => pending.await?,
            Some(limit) => tokio::time::timeout(limit, pending)
                .await
                .map_err(|_| Error::Timeout)??,
        };
        self.decode(response, response_type)
    }
}

impl Service<ClientRequest> for Transport {
    type Response = ClientResponse;
    type Error = Error;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: ClientRequest) -> Self::Future {
        Box::pin(self.clone().send(request))
    }
}

/// `BoxCloneService` is not `Sync`; each call works on its own clone.
#[derive(Clone)]
struct Shared(Arc<Mutex<BoxedService>>);

impl Shared {
    fn new(service: BoxedService) -> Self {
        Self(Arc::new(Mutex::new(service)))
    }

    fn checkout(&self) -> BoxedService {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }
}

/// HTTP client with connection pooling, rustls, tower layers and plugins.
///
/// A response whose status fails [`ClientConfig::validate_status`] becomes
/// [`Error::Http`], carrying the body bytes.
///
/// ```ignore
/// use plait::{ClientRequest, HyperClient};
///
/// let client = HyperClient::builder()
///     .base_url("https://api.example.com/".parse()?)
///     .with_logging()
///     .with_retry(3)
///     .build();
///
/// let response = client.execute(ClientRequest::get("users/42")).await?;
/// ```
#[derive(Clone)]
pub struct HyperClient {
    service: Shared,
    config: ClientConfig,
}

impl std::fmt::Debug for HyperClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperClient")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for HyperClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HyperClient {
    /// Default settings, no layers, no plugins.
    #[must_use]
    pub fn new() -> Self {
        Self::builder().build()
    }

    /// Custom settings, no layers, no plugins.
    #[must_use]
    pub fn with_config(config: ClientConfig) -> Self {
        Self::builder().config(config).build()
    }

    /// Starts with default settings.
    #[must_use]
    pub fn builder() -> HyperClientBuilder {
        HyperClientBuilder::default()
    }

    /// Settings in effect.
    #[must_use]
    pub const fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Runs `request` through plugins, layers and transport, then validates
    /// the final status.
    ///
    /// # Errors
    ///
    /// [`Error::Http`] for a rejected status. Otherwise whatever a plugin,
    /// a layer, the conversion or the transport failed with.
    pub async fn execute(&self, mut request: ClientRequest) -> Result<ClientResponse> {
        request.url = self.config.resolve(&request.url)?.into();

        let mut service = self.service.checkout();
        let response = service.ready().await?.call(request).await?;
        reject_unless(self.config.validate_status, response)
    }

    /// Shorthand for a GET through [`HyperClient::execute`].
    ///
    /// # Errors
    ///
    /// See [`HyperClient::execute`].
    pub async fn get(&self, url: &str) -> Result<ClientResponse> {
        self.execute(ClientRequest::get(url)).await
    }
}

fn reject_unless(accept: ValidateStatus, response: ClientResponse) -> Result<ClientResponse> {
    if accept(response.status) {
        Ok(response)
    } else {
        let headers = headers_from_map(&response.headers)?;
        let body = response.data.to_bytes()?;
        Err(Error::http_response(
            response.status,
            response.status_text,
            headers,
            body,
        ))
    }
}

impl Service<ClientRequest> for HyperClient {
    type Response = ClientResponse;
    type Error = Error;
    type Future = ServiceFuture;

    fn poll_ready(&mut self, _cx: &mut Context<'_>) -> Poll<Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: ClientRequest) -> Self::Future {
        let client = self.clone();
        Box::pin(async move { client.execute(request).await })
    }
}

macro_rules! config_setters {
    ($($(#[$doc:meta])* $name:ident: $ty:ty;)*) => {$(
        $(#[$doc])*
        #[must_use]
        pub fn $name(mut self, value: $ty) -> Self {
            self.config = self.config.$name(value);
            self
        }
    )*};
}

/// Assembles a [`HyperClient`].
///
/// The plugin pipeline sits outside every tower layer, so a retried request
/// goes through the layers again.
#[derive(Default)]
pub struct HyperClientBuilder {
    config: ClientConfigBuilder,
    layers: Vec<Wrap>,
    pipeline: Pipeline,
}

impl std::fmt::Debug for HyperClientBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HyperClientBuilder")
            .field("config", &self.config)
            .field("layers", &self.layers.len())
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

impl HyperClientBuilder {
    /// Replaces every setting at once.
    #[must_use]
    pub fn config(mut self, config: ClientConfig) -> Self {
        self.config = config.into();
        self
    }

    config_setters! {
        /// Whole-exchange timeout of the transport.
        timeout: Duration;
        /// TCP connect timeout.
        connect_timeout: Duration;
        /// Idle connections kept per host.
        pool_idle_per_host: usize;
        /// Idle connection lifetime.
        pool_idle_timeout: Duration;
        /// Base for relative request URLs.
        base_url: Url;
        /// Statuses returned as `Ok`.
        validate_status: ValidateStatus;
        /// Try JSON first for textual responses.
        forced_json_parsing: bool;
    }

    /// Wraps the transport in a tower layer.
    ///
    /// The first layer added sees the request first.
    #[must_use]
    pub fn layer<L>(mut self, layer: L) -> Self
    where
        L: Layer<BoxedService> + Send + Sync + 'static,
        L::Service: Service<ClientRequest, Response = ClientResponse, Error = Error>
            + Clone
            + Send
            + 'static,
        <L::Service as Service<ClientRequest>>::Future: Send + 'static,
    {
        self.layers
            .push(Box::new(move |inner| BoxCloneService::new(layer.layer(inner))));
        self
    }

    /// Same as [`HyperClientBuilder::layer`].
    #[must_use]
    pub fn with<L>(self, layer: L) -> Self
    where
        L: Layer<BoxedService> + Send + Sync + 'static,
        L::Service: Service<ClientRequest, Response = ClientResponse, Error = Error>
            + Clone
            + Send
            + 'static,
        <L::Service as Service<ClientRequest>>::Future: Send + 'static,
    {
        self.layer(layer)
    }

    /// Appends a plugin; plugins run in the order they were added.
    #[must_use]
    pub fn plugin(mut self, plugin: impl Plugin + 'static) -> Self {
        self.pipeline = self.pipeline.with(plugin);
        self
    }

    /// Appends the plugins of `pipeline`, sharing them.
    #[must_use]
    pub fn plugins(mut self, pipeline: &Pipeline) -> Self {
        self.pipeline = pipeline
            .plugins()
            .iter()
            .fold(self.pipeline, |acc, plugin| acc.with_shared(Arc::clone(plugin)));
        self
    }

    /// Appends a [`LoggingPlugin`] at info level.
    #[must_use]
    pub fn with_logging(self) -> Self {
        self.plugin(LoggingPlugin::new())
    }

    /// Appends a [`LoggingPlugin`] at debug level.
    #[must_use]
    pub fn with_debug_logging(self) -> Self {
        self.plugin(LoggingPlugin::debug())
    }

    /// Appends a [`RetryPlugin`] allowing `limit` retries.
    #[must_use]
    pub fn with_retry(self, limit: u32) -> Self {
        self.plugin(RetryPlugin::new(RetryOptions::default().limit(limit)))
    }

    /// Appends a [`BearerAuthPlugin`].
    #[must_use]
    pub fn with_bearer_auth(self, token: impl Into<String>) -> Self {
        self.plugin(BearerAuthPlugin::new(token))
    }

    /// Stacks the plugins, the layers and the transport.
    #[must_use]
    pub fn build(self) -> HyperClient {
        let config = self.config.build();

        let transport: BoxedService = BoxCloneService::new(Transport::new(&config));
        let layered = self
            .layers
            .into_iter()
            .rev()
            .fold(transport, |inner, wrap| wrap(inner));

        let service = if self.pipeline.is_empty() {
            layered
        } else {
            let plugins =
                PluginLayer::new(self.pipeline).forced_json_parsing(config.forced_json_parsing);
            BoxCloneService::new(plugins.layer(layered))
        };

        HyperClient {
            service: Shared::new(service),
            config,
        }
    }
}
