//! Composable request/response plugins for Rust HTTP clients.
//!
//! A plugin is written once against the canonical [`Request`]/[`Response`]
//! model and runs unchanged on every supported client:
//!
//! - [`HyperClient`], a hyper-util client with Tower middleware, through
//!   [`PluginLayer`]
//! - any [`Fetch`] function (such as [`HyperFetch`]), through [`PluginFetch`]
//! - `reqwest` clients built with `reqwest-middleware`, through
//!   `PluginMiddleware` (feature `reqwest`)
//!
//! # Example
//!
//! ```ignore
//! use plait::prelude::*;
//! use plait::plugins::{LoggingPlugin, RetryPlugin};
//!
//! struct ApiKey(String);
//!
//! #[async_trait::async_trait]
//! impl Plugin for ApiKey {
//!     fn name(&self) -> &str {
//!         "api-key"
//!     }
//!
//!     async fn before_request(&self, request: Request) -> Result<Request> {
//!         request.with_header("x-api-key", &self.0)
//!     }
//! }
//!
//! let pipeline = Pipeline::new()
//!     .with(LoggingPlugin::new())
//!     .with(ApiKey("secret".into()))
//!     .with(RetryPlugin::with_limit(3));
//!
//! let fetch = create_fetch(HyperFetch::new(), pipeline);
//! ```

mod client;
mod config;
mod connector;
mod fetch;
mod layer;
mod message;
pub mod plugins;
pub mod prelude;
#[cfg(feature = "reqwest")]
mod middleware;

// Re-export client types
pub use client::{BoxedService, HyperClient, HyperClientBuilder, ServiceFuture};
pub use config::{ClientConfig, ClientConfigBuilder, PoolConfig, ValidateStatus};
pub use fetch::{
    Fetch, FetchAdapter, FetchFn, HyperFetch, PluginFetch, ReasonPhrase, ResponseUrl,
    create_fetch, fetch_fn,
};
pub use layer::{HyperAdapter, PluginLayer, PluginService};
pub use message::{ClientRequest, ClientResponse, Payload, ResponseData, ResponseType};
#[cfg(feature = "reqwest")]
pub use middleware::PluginMiddleware;

// Re-export tower for middleware composition
pub use tower;

// Re-export core types
pub use plait_core::{
    AbortController, AbortSignal, Adapter, AdapterDispatch, Body, BodyContent, BodyStream,
    CacheMode, ContentType, Credentials, Dispatch, Error, Form, Headers, Method, Part, Pipeline,
    Plugin, Request, RequestBuilder, RequestParts, Response, ResponseParts, Result, Retry,
    from_json, is_null_body_status, to_form, to_json,
};

// Re-export http types for status codes and headers
pub use plait_core::{Extensions, StatusCode, header};

pub use url;
