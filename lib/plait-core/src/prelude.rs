//! Prelude module for convenient imports.
//!
//! ```
//! use plait_core::prelude::*;
//! ```

pub use crate::{
    AbortController, AbortSignal, CacheMode, ContentType, Credentials, Error, Form, Headers,
    Method, Part, Pipeline, Plugin, Request, Response, Result, Retry, from_json, to_form, to_json,
};
