//! Client-agnostic plugin pipeline for HTTP clients.
//!
//! This crate provides the foundational types used by plait:
//! - [`Request`], [`Response`], [`Headers`] and [`Body`] - the canonical model
//! - [`Plugin`] - hooks run before a request is sent and after its response arrives
//! - [`Pipeline`] - the ordered plugin list and its execution
//! - [`Retry`] and [`Dispatch`] - re-sending a request from a response hook
//! - [`Adapter`] - the conversion contract each HTTP client implements
//! - [`AbortController`] and [`AbortSignal`] - request cancellation
//! - [`Error`] and [`Result`] - error handling

mod adapter;
mod body;
mod error;
mod headers;
mod method;
mod multipart;
mod pipeline;
mod plugin;
pub mod prelude;
mod request;
mod response;
mod retry;
mod signal;

pub use adapter::{Adapter, AdapterDispatch};
pub use body::{Body, BodyContent, BodyStream, ContentType, from_json, to_form, to_json};
pub use error::{Error, Result};
pub use headers::Headers;
pub use method::Method;
pub use multipart::{Form, Part};
pub use pipeline::Pipeline;
pub use plugin::Plugin;
pub use request::{CacheMode, Credentials, Request, RequestBuilder, RequestParts};
pub use response::{Response, ResponseParts, is_null_body_status};
pub use retry::{Dispatch, Retry};
pub use signal::{AbortController, AbortSignal};

// Re-export http crate types for status codes and headers
pub use http::{Extensions, StatusCode, header};
