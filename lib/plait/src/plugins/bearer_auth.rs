//! Bearer token authentication plugin.
//!
//! Adds an `Authorization: Bearer <token>` header to all outgoing requests.

use std::sync::Arc;

use async_trait::async_trait;

use crate::{Plugin, Request, Result};

/// Plugin that adds bearer token authentication to requests.
///
/// An `Authorization` header already present on the request is replaced.
///
/// # Example
///
/// ```ignore
/// use plait::{Pipeline, plugins::BearerAuthPlugin};
///
/// let pipeline = Pipeline::new().with(BearerAuthPlugin::new("my-secret-token"));
/// ```
#[derive(Clone)]
pub struct BearerAuthPlugin {
    token: Arc<str>,
}

impl BearerAuthPlugin {
    /// Create a new bearer auth plugin with the given token.
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: Arc::from(token.into()),
        }
    }
}

impl std::fmt::Debug for BearerAuthPlugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerAuthPlugin")
            .field("token", &"<redacted>")
            .finish()
    }
}

#[async_trait]
impl Plugin for BearerAuthPlugin {
    fn name(&self) -> &str {
        "bearer-auth"
    }

    async fn before_request(&self, request: Request) -> Result<Request> {
        request.with_header("authorization", &format!("Bearer {}", self.token))
    }
}

#[cfg(test)]
mod tests {
    use assert2::check;
    use url::Url;

    use super::*;
    use crate::Method;

    #[tokio::test]
    async fn sets_authorization_header() {
        let request = Request::builder(Method::Get, Url::parse("https://example.com").expect("url"))
            .header("authorization", "Basic old")
            .build()
            .expect("request");

        let request = BearerAuthPlugin::new("secret")
            .before_request(request)
            .await
            .expect("hook");

        check!(request.headers().get_all("authorization") == vec!["Bearer secret"]);
    }

    #[test]
    fn debug_hides_token() {
        let debug = format!("{:?}", BearerAuthPlugin::new("secret"));
        check!(!debug.contains("secret"));
    }
}
