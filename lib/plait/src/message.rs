//! Request and response shapes of [`crate::HyperClient`].
//!
//! Bodies are structured: a request carries a [`Payload`] and a response
//! carries decoded [`ResponseData`], chosen from the content type.

use std::collections::HashMap;
use std::time::Duration;

use bytes::Bytes;
use serde::de::DeserializeOwned;

use crate::{AbortSignal, ContentType, Error, Form, Method, Result, from_json};

/// Request body of a [`ClientRequest`].
#[derive(Debug, Clone)]
pub enum Payload {
    /// Serialized as JSON.
    Json(serde_json::Value),
    /// Sent as UTF-8 text.
    Text(String),
    /// Sent as `multipart/form-data`.
    Form(Form),
    /// Sent as is.
    Bytes(Bytes),
}

impl Payload {
    /// Content type implied by the payload.
    #[must_use]
    pub fn content_type(&self) -> String {
        match self {
            Self::Json(_) => ContentType::Json.as_str().to_string(),
            Self::Text(_) => "text/plain;charset=utf-8".to_string(),
            Self::Form(form) => form.content_type(),
            Self::Bytes(_) => ContentType::OctetStream.as_str().to_string(),
        }
    }

    /// Wire bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn to_bytes(&self) -> Result<Bytes> {
        match self {
            Self::Json(value) => crate::to_json(value),
            Self::Text(text) => Ok(Bytes::from(text.clone())),
            Self::Form(form) => Ok(form.clone().into_body().1),
            Self::Bytes(bytes) => Ok(bytes.clone()),
        }
    }
}

/// How the response body is decoded into [`ResponseData`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ResponseType {
    /// From the `Content-Type`: JSON when it parses, text for textual
    /// content, bytes otherwise.
    #[default]
    Auto,
    /// Always JSON.
    Json,
    /// Always UTF-8 text.
    Text,
    /// Raw bytes.
    Bytes,
}

/// Decoded response body of a [`ClientResponse`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ResponseData {
    /// No body.
    #[default]
    Empty,
    /// Parsed JSON.
    Json(serde_json::Value),
    /// UTF-8 text.
    Text(String),
    /// Raw bytes.
    Bytes(Bytes),
}

impl ResponseData {
    /// Decodes `bytes` according to `response_type`.
    ///
    /// With [`ResponseType::Auto`], textual content is parsed as JSON when it
    /// is declared as JSON or when `forced_json_parsing` is set, falling back
    /// to text.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Conversion`] when an explicit [`ResponseType::Json`]
    /// or [`ResponseType::Text`] does not match the content.
    pub fn decode(
        bytes: Bytes,
        content_type: Option<ContentType>,
        response_type: ResponseType,
        forced_json_parsing: bool,
    ) -> Result<Self> {
        if bytes.is_empty() {
            return Ok(Self::Empty);
        }

        match response_type {
            ResponseType::Json => serde_json::from_slice(&bytes)
                .map(Self::Json)
                .map_err(|e| Error::conversion(format!("response is not JSON: {e}"))),
            ResponseType::Text => String::from_utf8(bytes.to_vec())
                .map(Self::Text)
                .map_err(|e| Error::conversion(format!("response is not UTF-8: {e}"))),
            ResponseType::Bytes => Ok(Self::Bytes(bytes)),
            ResponseType::Auto => {
                let textual = content_type.is_some_and(|ct| ct.is_textual());
                if !textual {
                    return Ok(Self::Bytes(bytes));
                }
                let try_json = forced_json_parsing || content_type == Some(ContentType::Json);
                if try_json && let Ok(value) = serde_json::from_slice(&bytes) {
                    return Ok(Self::Json(value));
                }
                Ok(String::from_utf8(bytes.to_vec())
                    .map_or_else(|e| Self::Bytes(Bytes::from(e.into_bytes())), Self::Text))
            }
        }
    }

    /// Wire bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if JSON serialization fails.
    pub fn to_bytes(&self) -> Result<Bytes> {
        match self {
            Self::Empty => Ok(Bytes::new()),
            Self::Json(value) => crate::to_json(value),
            Self::Text(text) => Ok(Bytes::from(text.clone())),
            Self::Bytes(bytes) => Ok(bytes.clone()),
        }
    }

    /// Deserializes the body.
    ///
    /// # Errors
    ///
    /// Returns a JSON error, with the path of the offending field.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        match self {
            Self::Empty => from_json(b"null"),
            Self::Json(value) => from_json(&serde_json::to_vec(value)?),
            Self::Text(text) => from_json(text.as_bytes()),
            Self::Bytes(bytes) => from_json(bytes),
        }
    }

    /// The text body, if decoded as text.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }
}

/// Request accepted by [`crate::HyperClient`].
///
/// Header names are stored lower-cased; setting a header twice keeps the last
/// value.
#[derive(Debug, Clone)]
pub struct ClientRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute URL, or relative to the client's base URL.
    pub url: String,
    /// Headers, one value per name.
    pub headers: HashMap<String, String>,
    /// Body.
    pub data: Option<Payload>,
    /// Send cookies and authorization cross-origin.
    pub with_credentials: bool,
    /// Cancellation.
    pub signal: Option<AbortSignal>,
    /// Per-request timeout, on top of the client's one.
    pub timeout: Option<Duration>,
    /// Response decoding.
    pub response_type: ResponseType,
}

impl ClientRequest {
    /// Request without headers or body.
    #[must_use]
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            data: None,
            with_credentials: false,
            signal: None,
            timeout: None,
            response_type: ResponseType::default(),
        }
    }

    /// GET request.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    /// POST request.
    #[must_use]
    pub fn post(url: impl Into<String>) -> Self {
        Self::new(Method::Post, url)
    }

    /// Sets a header.
    #[must_use]
    pub fn header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    /// Sets a JSON body.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn json<T: serde::Serialize>(mut self, value: &T) -> Result<Self> {
        self.data = Some(Payload::Json(serde_json::to_value(value)?));
        Ok(self)
    }

    /// Sets the body.
    #[must_use]
    pub fn data(mut self, data: Payload) -> Self {
        self.data = Some(data);
        self
    }

    /// Sets the abort signal.
    #[must_use]
    pub fn signal(mut self, signal: AbortSignal) -> Self {
        self.signal = Some(signal);
        self
    }

    /// Sets the credentials flag.
    #[must_use]
    pub const fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.with_credentials = with_credentials;
        self
    }

    /// Sets the per-request timeout.
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the response decoding.
    #[must_use]
    pub const fn response_type(mut self, response_type: ResponseType) -> Self {
        self.response_type = response_type;
        self
    }

    /// Header value by name, ignoring case.
    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Response returned by [`crate::HyperClient`].
#[derive(Debug, Clone, PartialEq)]
pub struct ClientResponse {
    /// HTTP status code.
    pub status: u16,
    /// Reason phrase.
    pub status_text: String,
    /// Headers, lower-cased names; repeated values are joined with `", "`.
    pub headers: HashMap<String, String>,
    /// Decoded body.
    pub data: ResponseData,
}

impl ClientResponse {
    /// Status is 2xx.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Header value by name, ignoring case.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Deserializes the body, see [`ResponseData::json`].
    ///
    /// # Errors
    ///
    /// Returns a JSON error.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        self.data.json()
    }
}
