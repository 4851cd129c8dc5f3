//! Canonical HTTP response.
//!
//! [`Response`] provides access to status, headers, and a single-read body
//! with JSON/text/form decoding. Like requests, responses are replaced rather
//! than mutated.

use bytes::Bytes;
use http::Extensions;
use url::Url;

use crate::{Body, Error, Form, Headers, Result};

/// Statuses whose responses never carry a body.
const NULL_BODY_STATUSES: [u16; 5] = [101, 103, 204, 205, 304];

/// Whether responses with `status` must expose an absent body.
#[must_use]
pub fn is_null_body_status(status: u16) -> bool {
    NULL_BODY_STATUSES.contains(&status)
}

fn canonical_reason(status: u16) -> &'static str {
    http::StatusCode::from_u16(status)
        .ok()
        .and_then(|code| code.canonical_reason())
        .unwrap_or_default()
}

/// Client-agnostic HTTP response.
#[derive(Debug)]
pub struct Response {
    status: u16,
    status_text: String,
    headers: Headers,
    body: Body,
    url: Option<Url>,
    extensions: Extensions,
}

/// Every field of a [`Response`], for adapters that take it apart.
#[derive(Debug)]
pub struct ResponseParts {
    /// HTTP status code.
    pub status: u16,
    /// Reason phrase.
    pub status_text: String,
    /// Headers.
    pub headers: Headers,
    /// Body.
    pub body: Body,
    /// Final URL, when the client reports it.
    pub url: Option<Url>,
    /// Native settings carried through the pipeline.
    pub extensions: Extensions,
}

impl Response {
    /// Creates a new response with the canonical reason phrase.
    ///
    /// The body is dropped for null-body statuses.
    #[must_use]
    pub fn new(status: u16, headers: Headers, body: impl Into<Body>) -> Self {
        let body = if is_null_body_status(status) {
            Body::empty()
        } else {
            body.into()
        };
        Self {
            status,
            status_text: canonical_reason(status).to_string(),
            headers,
            body,
            url: None,
            extensions: Extensions::new(),
        }
    }

    /// HTTP status code.
    #[must_use]
    pub const fn status(&self) -> u16 {
        self.status
    }

    /// Reason phrase.
    #[must_use]
    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    /// Response headers.
    #[must_use]
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Response body.
    #[must_use]
    pub fn body(&self) -> &Body {
        &self.body
    }

    /// Final URL, when the client reports it.
    #[must_use]
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// Native settings carried through the pipeline.
    #[must_use]
    pub fn extensions(&self) -> &Extensions {
        &self.extensions
    }

    /// Status is 2xx.
    #[must_use]
    pub const fn ok(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// Status is 4xx.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        self.status >= 400 && self.status < 500
    }

    /// Status is 5xx.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        self.status >= 500 && self.status < 600
    }

    /// Replaces the status, keeping the reason phrase.
    ///
    /// Switching to a null-body status drops the body.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        if is_null_body_status(status) {
            self.body = Body::empty();
        }
        self
    }

    /// Replaces the reason phrase.
    #[must_use]
    pub fn with_status_text(mut self, status_text: impl Into<String>) -> Self {
        self.status_text = status_text.into();
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

    /// Replaces the body and drops `content-length`. Ignored for null-body
    /// statuses.
    #[must_use]
    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        if !is_null_body_status(self.status) {
            self.body = body.into();
            self.headers.remove("content-length");
        }
        self
    }

    /// Replaces the final URL.
    #[must_use]
    pub fn with_url(mut self, url: Option<Url>) -> Self {
        self.url = url;
        self
    }

    /// Stores a native setting, replacing any previous value of the same type.
    #[must_use]
    pub fn with_extension<T: Clone + Send + Sync + 'static>(mut self, value: T) -> Self {
        self.extensions.insert(value);
        self
    }

    /// Duplicates the response, body included, without consuming it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::BodyConsumed`] if the body was already read.
    pub async fn try_clone(&self) -> Result<Self> {
        Ok(Self {
            status: self.status,
            status_text: self.status_text.clone(),
            headers: self.headers.clone(),
            body: self.body.try_clone().await?,
            url: self.url.clone(),
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

    /// Reads the body as multipart form data.
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

    /// Takes the response apart.
    #[must_use]
    pub fn into_parts(self) -> ResponseParts {
        ResponseParts {
            status: self.status,
            status_text: self.status_text,
            headers: self.headers,
            body: self.body,
            url: self.url,
            extensions: self.extensions,
        }
    }

    /// Reassembles a response, enforcing the null-body rule.
    #[must_use]
    pub fn from_parts(parts: ResponseParts) -> Self {
        let body = if is_null_body_status(parts.status) {
            Body::empty()
        } else {
            parts.body
        };
        Self {
            status: parts.status,
            status_text: parts.status_text,
            headers: parts.headers,
            body,
            url: parts.url,
            extensions: parts.extensions,
        }
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};

    use super::*;

    #[tokio::test]
    async fn json_response_decodes() {
        let mut headers = Headers::new();
        headers.set("content-type", "application/json").expect("set");
        let response = Response::new(200, headers, r#"{"id":1}"#);

        check!(response.status() == 200);
        check!(response.status_text() == "OK");
        check!(response.ok());
        let value: serde_json::Value = response.json().await.expect("json");
        check!(value == serde_json::json!({ "id": 1 }));
    }

    #[test]
    fn response_status_classes() {
        check!(!Response::new(404, Headers::new(), Body::empty()).ok());
        check!(Response::new(404, Headers::new(), Body::empty()).is_client_error());
        check!(Response::new(503, Headers::new(), Body::empty()).is_server_error());
        check!(Response::new(299, Headers::new(), Body::empty()).ok());
        check!(!Response::new(300, Headers::new(), Body::empty()).ok());
    }

    #[tokio::test]
    async fn null_body_statuses_expose_absent_body() {
        for status in [101, 103, 204, 205, 304] {
            let response = Response::new(status, Headers::new(), "native bytes");
            check!(response.body().is_absent(), "status {status}");
        }

        let response = Response::new(200, Headers::new(), "x").with_status(204);
        check!(response.body().is_absent());
        check!(response.status_text() == "OK");

        let response = response.with_body("ignored");
        check!(response.bytes().await.expect("bytes").is_empty());
    }

    #[tokio::test]
    async fn with_methods_replace_values() {
        let response = Response::new(200, Headers::new(), "first")
            .with_header("x-first", "foo")
            .expect("header")
            .with_body("second")
            .with_status(201)
            .with_status_text("Made")
            .with_url(Some(Url::parse("https://example.com/").expect("url")));

        check!(response.status() == 201);
        check!(response.status_text() == "Made");
        check!(response.headers().get("x-first") == Some("foo".to_string()));
        check!(response.url().is_some());
        check!(response.text().await.expect("text") == "second");
    }

    #[test]
    fn new_body_drops_content_length() {
        let response = Response::new(200, Headers::new(), "origin")
            .with_header("content-length", "6")
            .expect("header")
            .with_body("replaced");
        check!(!response.headers().contains("content-length"));
    }

    #[tokio::test]
    async fn second_read_fails_with_body_consumed() {
        let response = Response::new(200, Headers::new(), "once");
        let copy = response.try_clone().await.expect("clone");

        check!(response.text().await.expect("first") == "once");
        let_assert!(Err(Error::BodyConsumed) = response.text().await);
        check!(copy.text().await.expect("copy") == "once");
    }

    #[test]
    fn unknown_status_has_empty_reason() {
        let response = Response::new(599, Headers::new(), Body::empty());
        check!(response.status_text().is_empty());
    }
}
