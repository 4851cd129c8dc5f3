//! [`LoggingPlugin`]: one `tracing` event per request and one per outcome.

use std::time::Instant;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::{Plugin, Request, Response, Result, Retry};

/// How much [`LoggingPlugin`] says.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    /// Adds headers, at debug level.
    Debug,
    /// Method, URL, status and timing.
    #[default]
    Info,
}

/// Set by `before_request`, read back by `after_response`.
#[derive(Debug, Clone, Copy)]
struct RequestStart(Instant);

impl RequestStart {
    fn elapsed_ms(self) -> u64 {
        u64::try_from(self.0.elapsed().as_millis()).unwrap_or(u64::MAX)
    }
}

/// Logs each request and how it ended.
///
/// Non-2xx outcomes are logged at warn. Registered first, the reported time
/// includes the other plugins and any retries.
///
/// ```ignore
/// use plait::{Pipeline, plugins::LoggingPlugin};
///
/// let pipeline = Pipeline::new().with(LoggingPlugin::debug());
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingPlugin {
    level: LogLevel,
}

impl LoggingPlugin {
    /// Info level.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Debug level, headers included.
    #[must_use]
    pub fn debug() -> Self {
        Self {
            level: LogLevel::Debug,
        }
    }

    /// The configured level.
    #[must_use]
    pub const fn level(&self) -> LogLevel {
        self.level
    }
}

#[async_trait]
impl Plugin for LoggingPlugin {
    fn name(&self) -> &str {
        "logging"
    }

    async fn before_request(&self, request: Request) -> Result<Request> {
        if self.level == LogLevel::Debug {
            debug!(
                method = %request.method(),
                url = %request.url(),
                headers = ?request.headers(),
                "sending request"
            );
        } else {
            info!(method = %request.method(), url = %request.url(), "sending request");
        }

        Ok(request.with_extension(RequestStart(Instant::now())))
    }

    async fn after_response(
        &self,
        response: Response,
        request: &Request,
        retry: &Retry<'_>,
    ) -> Result<Response> {
        let elapsed_ms = request
            .extensions()
            .get::<RequestStart>()
            .copied()
            .map_or(0, RequestStart::elapsed_ms);
        let status = response.status();
        let retries = retry.attempts();

        if response.ok() {
            info!(status, elapsed_ms, retries, "request completed");
        } else {
            warn!(status, elapsed_ms, retries, "request failed with HTTP error");
        }

        if self.level == LogLevel::Debug {
            debug!(status, headers = ?response.headers(), "response received");
        }

        Ok(response)
    }
}
