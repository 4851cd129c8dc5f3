//! Prelude module for convenient imports.
//!
//! This module re-exports the most commonly used types and functions for
//! easy glob importing:
//!
//! ```ignore
//! use plait::prelude::*;
//! ```

pub use crate::{
    AbortController, AbortSignal, ClientConfig, ClientRequest, ClientResponse, ContentType, Error,
    Fetch, Form, Headers, HyperClient, HyperFetch, Method, Part, Payload, Pipeline, PluginFetch,
    PluginLayer, Plugin, Request, Response, Result, Retry, StatusCode, create_fetch, from_json,
    header, to_form, to_json,
};
pub use serde::{Deserialize, Serialize};
