//! The single error type shared by adapters, plugins and bindings.
//!
//! Hooks, conversions and native sends all fail with [`Error`], so the
//! pipeline forwards whatever it receives to the caller untouched.

use bytes::Bytes;
use derive_more::{Display, Error, From};

use crate::Headers;

/// Everything that can go wrong while a request travels through plait.
#[derive(Debug, Display, Error, From)]
pub enum Error {
    // Pipeline
    /// A plugin hook returned an error of its own.
    #[display("plugin '{plugin}' failed: {message}")]
    #[from(skip)]
    Plugin {
        /// [`crate::Plugin::name`] of the failing plugin.
        plugin: String,
        /// What went wrong.
        message: String,
    },

    /// The [`crate::AbortSignal`] of the request fired.
    #[display("request aborted")]
    #[from(skip)]
    Aborted,

    /// A single-read body was read again.
    #[display("body already consumed")]
    #[from(skip)]
    BodyConsumed,

    /// An adapter could not translate between native and canonical values.
    #[display("conversion error: {_0}")]
    #[from(skip)]
    Conversion(#[error(not(source))] String),

    // Transport
    /// The client's status validation rejected the response.
    #[display("HTTP error {status}: {message}")]
    #[from(skip)]
    Http {
        /// Rejected status code.
        status: u16,
        /// Reason phrase or other description.
        message: String,
        /// Headers of the rejected response; empty when unknown.
        #[error(not(source))]
        headers: Headers,
        /// Bytes of the rejected response, when they could be read.
        #[error(not(source))]
        body: Option<Bytes>,
    },

    /// The connection could not be opened or broke mid-exchange.
    #[display("connection error: {_0}")]
    #[from(skip)]
    Connection(#[error(not(source))] String),

    /// TLS handshake or certificate failure.
    #[display("TLS error: {_0}")]
    #[from(skip)]
    Tls(#[error(not(source))] String),

    /// The client-level timeout elapsed.
    #[display("request timeout")]
    #[from(skip)]
    Timeout,

    // Building and decoding
    /// A header name or value is not valid HTTP.
    #[display("invalid header: {_0}")]
    #[from(skip)]
    InvalidHeader(#[error(not(source))] String),

    /// The request cannot be sent as described.
    #[display("invalid request: {_0}")]
    #[from(skip)]
    InvalidRequest(#[error(not(source))] String),

    /// The URL does not parse.
    #[display("invalid URL: {_0}")]
    #[from]
    InvalidUrl(url::ParseError),

    /// A value could not be written as JSON.
    #[display("JSON serialization error: {_0}")]
    #[from]
    JsonSerialization(serde_json::Error),

    /// A JSON body did not match the expected type.
    #[display("JSON deserialization error at '{path}': {message}")]
    #[from(skip)]
    JsonDeserialization {
        /// Dotted path of the offending value, e.g. `items[1].id`.
        path: String,
        /// Decoder message.
        message: String,
    },

    /// A value could not be written as `application/x-www-form-urlencoded`.
    #[display("form serialization error: {_0}")]
    #[from]
    FormSerialization(serde_urlencoded::ser::Error),
}

/// `Result` with plait's [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// [`Error::Plugin`] attributed to `plugin`.
    #[must_use]
    pub fn plugin(plugin: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Plugin {
            plugin: plugin.into(),
            message: message.into(),
        }
    }

    /// [`Error::Conversion`].
    #[must_use]
    pub fn conversion(message: impl Into<String>) -> Self {
        Self::Conversion(message.into())
    }

    /// [`Error::Http`] without a body.
    #[must_use]
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
            headers: Headers::new(),
            body: None,
        }
    }

    /// [`Error::Http`] keeping the rejected body.
    #[must_use]
    pub fn http_with_body(status: u16, message: impl Into<String>, body: Bytes) -> Self {
        Self::http_response(status, message, Headers::new(), body)
    }

    /// [`Error::Http`] keeping everything the rejected response carried.
    #[must_use]
    pub fn http_response(
        status: u16,
        message: impl Into<String>,
        headers: Headers,
        body: Bytes,
    ) -> Self {
        Self::Http {
            status,
            message: message.into(),
            headers,
            body: Some(body),
        }
    }

    /// [`Error::Connection`].
    #[must_use]
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection(message.into())
    }

    /// [`Error::Tls`].
    #[must_use]
    pub fn tls(message: impl Into<String>) -> Self {
        Self::Tls(message.into())
    }

    /// [`Error::InvalidHeader`].
    #[must_use]
    pub fn invalid_header(message: impl Into<String>) -> Self {
        Self::InvalidHeader(message.into())
    }

    /// [`Error::InvalidRequest`].
    #[must_use]
    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::InvalidRequest(message.into())
    }

    /// [`Error::JsonDeserialization`] at `path`.
    #[must_use]
    pub fn json_deserialization(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::JsonDeserialization {
            path: path.into(),
            message: message.into(),
        }
    }

    /// See [`Error::Aborted`].
    #[must_use]
    pub const fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// See [`Error::BodyConsumed`].
    #[must_use]
    pub const fn is_body_consumed(&self) -> bool {
        matches!(self, Self::BodyConsumed)
    }

    /// See [`Error::Connection`].
    #[must_use]
    pub const fn is_connection(&self) -> bool {
        matches!(self, Self::Connection(_))
    }

    /// See [`Error::Timeout`].
    #[must_use]
    pub const fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout)
    }

    /// Status of a rejected response.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        if let Self::Http { status, .. } = self {
            Some(*status)
        } else {
            None
        }
    }

    /// Bytes of a rejected response, when they were read.
    #[must_use]
    pub fn body(&self) -> Option<&Bytes> {
        if let Self::Http { body, .. } = self {
            body.as_ref()
        } else {
            None
        }
    }

    /// Headers of a rejected response.
    #[must_use]
    pub fn headers(&self) -> Option<&Headers> {
        if let Self::Http { headers, .. } = self {
            Some(headers)
        } else {
            None
        }
    }

    /// A rejected 4xx response.
    #[must_use]
    pub fn is_client_error(&self) -> bool {
        matches!(self.status(), Some(400..=499))
    }

    /// A rejected 5xx response.
    #[must_use]
    pub fn is_server_error(&self) -> bool {
        matches!(self.status(), Some(500..=599))
    }
}
