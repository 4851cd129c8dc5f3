//! Single-read bodies and body serialization utilities.

use std::fmt;
use std::pin::Pin;
use std::sync::{Mutex, PoisonError};

use bytes::{Bytes, BytesMut};
use futures_core::Stream;
use futures_util::{StreamExt, stream};

use crate::{Error, Form, Result};

/// Body families adapters distinguish when handing a body to a client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ContentType {
    /// `application/json` and `+json` suffixes.
    Json,
    /// `application/x-www-form-urlencoded`.
    FormUrlEncoded,
    /// `text/plain`.
    PlainText,
    /// `multipart/form-data`.
    Multipart,
    /// Everything else, sent as `application/octet-stream`.
    OctetStream,
}

impl ContentType {
    /// Canonical media type, without parameters.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::FormUrlEncoded => "application/x-www-form-urlencoded",
            Self::PlainText => "text/plain",
            Self::Multipart => "multipart/form-data",
            Self::OctetStream => "application/octet-stream",
        }
    }

    /// Classify a `Content-Type` header value. Parameters are ignored.
    #[must_use]
    pub fn from_mime(mime: &str) -> Self {
        let essence = mime
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match essence.as_str() {
            "multipart/form-data" => Self::Multipart,
            "application/x-www-form-urlencoded" => Self::FormUrlEncoded,
            "text/plain" => Self::PlainText,
            "application/json" => Self::Json,
            other if other.ends_with("+json") => Self::Json,
            _ => Self::OctetStream,
        }
    }

    /// Textual payloads (`text/plain`, form URL-encoded, JSON).
    #[must_use]
    pub const fn is_textual(&self) -> bool {
        matches!(self, Self::PlainText | Self::FormUrlEncoded | Self::Json)
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Chunks of a body that has not fully arrived yet.
pub type BodyStream = Pin<Box<dyn Stream<Item = Result<Bytes>> + Send>>;

enum Source {
    Empty,
    Full(Bytes),
    Streaming(BodyStream),
    // The stream broke while being buffered; every read reports it.
    Failed(Error),
}

/// Request or response body that can be read exactly once.
///
/// Reading through [`Body::bytes`], [`Body::text`], [`Body::json`] or
/// [`Body::form_data`] consumes the body; a later read fails with
/// [`Error::BodyConsumed`]. Use [`Body::try_clone`] to obtain an independent
/// copy before reading.
pub struct Body {
    // `None` once consumed.
    source: Mutex<Option<Source>>,
}

impl Body {
    fn with_source(source: Source) -> Self {
        Self {
            source: Mutex::new(Some(source)),
        }
    }

    /// An absent body.
    #[must_use]
    pub fn empty() -> Self {
        Self::with_source(Source::Empty)
    }

    /// A body fed by a stream of chunks.
    pub fn from_stream<S>(stream: S) -> Self
    where
        S: Stream<Item = Result<Bytes>> + Send + 'static,
    {
        Self::with_source(Source::Streaming(Box::pin(stream)))
    }

    fn take(&self) -> Result<Source> {
        let mut source = self.source.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(Source::Failed(err)) = &*source {
            return Err(replay(err));
        }
        source.take().ok_or(Error::BodyConsumed)
    }

    fn restore(&self, source: Source) {
        *self.source.lock().unwrap_or_else(PoisonError::into_inner) = Some(source);
    }

    /// `true` when there is no body at all (not the same as an empty string).
    ///
    /// A consumed body is not absent.
    #[must_use]
    pub fn is_absent(&self) -> bool {
        matches!(
            *self.source.lock().unwrap_or_else(PoisonError::into_inner),
            Some(Source::Empty)
        )
    }

    /// `true` once the body has been read, or failed while buffering.
    #[must_use]
    pub fn is_consumed(&self) -> bool {
        matches!(
            *self.source.lock().unwrap_or_else(PoisonError::into_inner),
            None | Some(Source::Failed(_))
        )
    }

    /// Read the whole body.
    pub async fn bytes(&self) -> Result<Bytes> {
        match self.take()? {
            Source::Empty => Ok(Bytes::new()),
            Source::Full(bytes) => Ok(bytes),
            Source::Streaming(stream) => collect(stream).await,
            Source::Failed(err) => Err(err),
        }
    }

    /// Read the whole body as UTF-8 text.
    pub async fn text(&self) -> Result<String> {
        let bytes = self.bytes().await?;
        String::from_utf8(bytes.to_vec())
            .map_err(|e| Error::conversion(format!("body is not valid UTF-8: {e}")))
    }

    /// Read and deserialize the whole body as JSON.
    pub async fn json<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        let bytes = self.bytes().await?;
        from_json(&bytes)
    }

    /// Read and decode the whole body as `multipart/form-data`.
    ///
    /// `content_type` must carry the `boundary` parameter.
    pub async fn form_data(&self, content_type: &str) -> Result<Form> {
        let bytes = self.bytes().await?;
        Form::parse(content_type, &bytes)
    }

    /// Duplicate the body without consuming it.
    ///
    /// A streaming body is buffered once; both the original and the copy then
    /// hold the buffered bytes. If the stream fails, later reads of the
    /// original fail with the same error instead of [`Error::BodyConsumed`].
    pub async fn try_clone(&self) -> Result<Self> {
        let source = self.take()?;
        let bytes = match source {
            Source::Empty => {
                self.restore(Source::Empty);
                return Ok(Self::empty());
            }
            Source::Full(bytes) => bytes,
            Source::Streaming(stream) => match collect(stream).await {
                Ok(bytes) => bytes,
                Err(err) => {
                    let reported = replay(&err);
                    self.restore(Source::Failed(err));
                    return Err(reported);
                }
            },
            Source::Failed(err) => return Err(err),
        };
        self.restore(Source::Full(bytes.clone()));
        Ok(Self::from(bytes))
    }

    /// Consume the body into a stream, without buffering.
    pub fn into_stream(self) -> Result<BodyStream> {
        match self.take()? {
            Source::Empty => Ok(Box::pin(stream::empty())),
            Source::Full(bytes) => Ok(Box::pin(stream::once(async move { Ok(bytes) }))),
            Source::Streaming(stream) => Ok(stream),
            Source::Failed(err) => Err(err),
        }
    }

    /// Consume the body into its raw content, without buffering.
    pub fn into_content(self) -> Result<BodyContent> {
        match self.take()? {
            Source::Empty => Ok(BodyContent::Empty),
            Source::Full(bytes) => Ok(BodyContent::Full(bytes)),
            Source::Streaming(stream) => Ok(BodyContent::Streaming(stream)),
            Source::Failed(err) => Err(err),
        }
    }
}

/// Raw content of an unread [`Body`].
pub enum BodyContent {
    /// No body.
    Empty,
    /// In-memory bytes.
    Full(Bytes),
    /// Chunks still to be received.
    Streaming(BodyStream),
}

impl fmt::Debug for BodyContent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Empty => f.write_str("Empty"),
            Self::Full(bytes) => f.debug_tuple("Full").field(bytes).finish(),
            Self::Streaming(_) => f.write_str("Streaming(..)"),
        }
    }
}

/// Copy of a stream error, for reporting it more than once.
fn replay(err: &Error) -> Error {
    match err {
        Error::Aborted => Error::Aborted,
        Error::Timeout => Error::Timeout,
        Error::BodyConsumed => Error::BodyConsumed,
        Error::Tls(message) => Error::tls(message.clone()),
        Error::Conversion(message) => Error::conversion(message.clone()),
        Error::Connection(message) => Error::connection(message.clone()),
        other => Error::connection(other.to_string()),
    }
}

async fn collect(mut stream: BodyStream) -> Result<Bytes> {
    let mut collected = BytesMut::new();
    while let Some(chunk) = stream.next().await {
        collected.extend_from_slice(&chunk?);
    }
    Ok(collected.freeze())
}

impl Default for Body {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for Body {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = match &*self.source.lock().unwrap_or_else(PoisonError::into_inner) {
            None => "consumed".to_string(),
            Some(Source::Empty) => "empty".to_string(),
            Some(Source::Full(bytes)) => format!("{} bytes", bytes.len()),
            Some(Source::Streaming(_)) => "streaming".to_string(),
            Some(Source::Failed(err)) => format!("failed: {err}"),
        };
        f.debug_tuple("Body").field(&state).finish()
    }
}

impl From<Bytes> for Body {
    fn from(bytes: Bytes) -> Self {
        Self::with_source(Source::Full(bytes))
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Self::from(Bytes::from(bytes))
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Self::from(Bytes::from(text))
    }
}

impl From<&'static str> for Body {
    fn from(text: &'static str) -> Self {
        Self::from(Bytes::from_static(text.as_bytes()))
    }
}

/// Encodes `value` as a JSON body.
///
/// ```
/// let bytes = plait_core::to_json(&serde_json::json!({ "ids": [1, 2] })).expect("json");
/// assert_eq!(&bytes[..], br#"{"ids":[1,2]}"#);
/// ```
///
/// # Errors
///
/// [`Error::JsonSerialization`] for values JSON cannot represent, such as
/// maps with non-string keys.
pub fn to_json<T: serde::Serialize>(value: &T) -> Result<Bytes> {
    Ok(Bytes::from(serde_json::to_vec(value)?))
}

/// Encodes `value` as an `application/x-www-form-urlencoded` body.
///
/// # Errors
///
/// [`Error::FormSerialization`] for nested values.
pub fn to_form<T: serde::Serialize>(value: &T) -> Result<Bytes> {
    Ok(Bytes::from(serde_urlencoded::to_string(value)?))
}

/// Decodes a JSON body; a mismatch reports the path of the offending value.
///
/// # Errors
///
/// [`Error::JsonDeserialization`].
pub fn from_json<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    let mut reader = serde_json::Deserializer::from_slice(bytes);
    serde_path_to_error::deserialize(&mut reader)
        .map_err(|err| Error::json_deserialization(err.path().to_string(), err.inner().to_string()))
}
