//! Retry plugin for HTTP requests.
//!
//! Re-sends idempotent requests answered with a transient status, waiting
//! with exponential backoff between attempts and honouring `Retry-After`.

use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use tracing::debug;

use crate::{Method, Plugin, Request, Response, Result, Retry};

const BASE_BACKOFF: Duration = Duration::from_millis(300);

/// Settings of a [`RetryPlugin`].
///
/// By default, retries twice:
/// - GET, PUT, HEAD, OPTIONS and DELETE requests
/// - answered with 408, 413, 429, 500, 502, 503 or 504
#[derive(Debug, Clone)]
pub struct RetryOptions {
    limit: u32,
    methods: Vec<Method>,
    status_codes: Vec<u16>,
    backoff_limit: Option<Duration>,
    max_retry_after: Option<Duration>,
}

impl Default for RetryOptions {
    fn default() -> Self {
        Self {
            limit: 2,
            methods: vec![
                Method::Get,
                Method::Put,
                Method::Head,
                Method::Options,
                Method::Delete,
            ],
            status_codes: vec![408, 413, 429, 500, 502, 503, 504],
            backoff_limit: None,
            max_retry_after: None,
        }
    }
}

impl RetryOptions {
    /// Maximum number of retries.
    #[must_use]
    pub const fn limit(mut self, limit: u32) -> Self {
        self.limit = limit;
        self
    }

    /// Methods that may be retried.
    #[must_use]
    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods = methods.into_iter().collect();
        self
    }

    /// Statuses that trigger a retry.
    #[must_use]
    pub fn status_codes(mut self, status_codes: impl IntoIterator<Item = u16>) -> Self {
        self.status_codes = status_codes.into_iter().collect();
        self
    }

    /// Upper bound of the exponential backoff.
    #[must_use]
    pub const fn backoff_limit(mut self, limit: Duration) -> Self {
        self.backoff_limit = Some(limit);
        self
    }

    /// Upper bound of a server supplied `Retry-After`.
    #[must_use]
    pub const fn max_retry_after(mut self, max: Duration) -> Self {
        self.max_retry_after = Some(max);
        self
    }

    fn should_retry(&self, method: Method, status: u16) -> bool {
        self.methods.contains(&method) && self.status_codes.contains(&status)
    }

    /// `0.3s * 2^(attempt - 1)`, capped by the backoff limit.
    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2_u32.saturating_pow(attempt.saturating_sub(1));
        let backoff = BASE_BACKOFF.saturating_mul(factor);
        self.backoff_limit
            .map_or(backoff, |limit| backoff.min(limit))
    }

    fn retry_after(&self, response: &Response, now: SystemTime) -> Duration {
        let Some(value) = response.headers().get("retry-after") else {
            return Duration::ZERO;
        };
        let wait = parse_retry_after(&value, now).unwrap_or(Duration::ZERO);
        self.max_retry_after.map_or(wait, |max| wait.min(max))
    }

    fn delay(&self, attempt: u32, response: &Response) -> Duration {
        self.backoff(attempt)
            .max(self.retry_after(response, SystemTime::now()))
    }
}

/// `Retry-After` as delay seconds or as an HTTP date.
fn parse_retry_after(value: &str, now: SystemTime) -> Option<Duration> {
    let value = value.trim();
    if let Ok(seconds) = value.parse::<u64>() {
        return Some(Duration::from_secs(seconds));
    }
    let date = httpdate::parse_http_date(value).ok()?;
    Some(date.duration_since(now).unwrap_or(Duration::ZERO))
}

/// Plugin re-sending requests that failed with a transient status.
///
/// Stops as soon as a response is no longer retryable. The wait between
/// attempts is cut short when the request's abort signal fires.
///
/// # Example
///
/// ```ignore
/// use plait::{Pipeline, plugins::{RetryOptions, RetryPlugin}};
///
/// let pipeline = Pipeline::new().with(RetryPlugin::new(RetryOptions::default().limit(3)));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RetryPlugin {
    options: RetryOptions,
}

impl RetryPlugin {
    /// Create a retry plugin.
    #[must_use]
    pub const fn new(options: RetryOptions) -> Self {
        Self { options }
    }

    /// Retry plugin with default options and the given limit.
    #[must_use]
    pub fn with_limit(limit: u32) -> Self {
        Self::new(RetryOptions::default().limit(limit))
    }

    /// The options in use.
    #[must_use]
    pub const fn options(&self) -> &RetryOptions {
        &self.options
    }
}

#[async_trait]
impl Plugin for RetryPlugin {
    fn name(&self) -> &str {
        "retry"
    }

    async fn after_response(
        &self,
        mut response: Response,
        request: &Request,
        retry: &Retry<'_>,
    ) -> Result<Response> {
        let method = request.method();

        for attempt in 1..=self.options.limit {
            if !self.options.should_retry(method, response.status()) {
                break;
            }

            let delay = self.options.delay(attempt, &response);
            debug!(
                attempt,
                status = response.status(),
                delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
                "scheduling retry"
            );

            let sleep = async {
                tokio::time::sleep(delay).await;
                Result::Ok(())
            };
            match request.signal() {
                Some(signal) => signal.guard(sleep).await?,
                None => sleep.await?,
            }

            response = retry.resend(request).await?;
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};
    use url::Url;

    use super::*;
    use crate::plugins::testing::Scripted;
    use crate::{AbortController, Error, Headers};

    fn request(method: Method) -> Request {
        Request::new(method, Url::parse("https://example.com/items").expect("url"))
    }

    fn response(status: u16) -> Response {
        Response::new(status, Headers::new(), "first")
    }

    #[test]
    fn default_options() {
        let options = RetryOptions::default();
        check!(options.limit == 2);
        check!(options.should_retry(Method::Get, 503));
        check!(options.should_retry(Method::Delete, 429));
        check!(!options.should_retry(Method::Post, 503));
        check!(!options.should_retry(Method::Get, 404));
        check!(!options.should_retry(Method::Get, 501));
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let options = RetryOptions::default();
        check!(options.backoff(1) == Duration::from_millis(300));
        check!(options.backoff(2) == Duration::from_millis(600));
        check!(options.backoff(3) == Duration::from_millis(1200));

        let options = options.backoff_limit(Duration::from_millis(500));
        check!(options.backoff(3) == Duration::from_millis(500));
    }

    #[test]
    fn retry_after_seconds_and_dates() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000);
        check!(parse_retry_after("120", now) == Some(Duration::from_secs(120)));

        let later = httpdate::fmt_http_date(now + Duration::from_secs(30));
        check!(parse_retry_after(&later, now) == Some(Duration::from_secs(30)));

        let earlier = httpdate::fmt_http_date(now - Duration::from_secs(30));
        check!(parse_retry_after(&earlier, now) == Some(Duration::ZERO));

        check!(parse_retry_after("soon", now).is_none());
    }

    #[test]
    fn retry_after_is_capped() {
        let options = RetryOptions::default().max_retry_after(Duration::from_secs(5));
        let response = response(429)
            .with_header("retry-after", "3600")
            .expect("header");
        check!(options.retry_after(&response, SystemTime::now()) == Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_until_success() {
        let plugin = RetryPlugin::with_limit(3);
        let dispatch = Scripted::new(&[503, 200]);
        let retry = Retry::new(&dispatch);

        let response = plugin
            .after_response(response(500), &request(Method::Get), &retry)
            .await
            .expect("retried");

        check!(response.status() == 200);
        check!(dispatch.calls() == 2);
        check!(retry.attempts() == 2);
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_limit() {
        let plugin = RetryPlugin::default();
        let dispatch = Scripted::new(&[503, 503, 503]);
        let retry = Retry::new(&dispatch);

        let response = plugin
            .after_response(response(503), &request(Method::Get), &retry)
            .await
            .expect("retried");

        check!(response.status() == 503);
        check!(dispatch.calls() == 2);
    }

    #[tokio::test(start_paused = true)]
    async fn waits_backoff_between_attempts() {
        let plugin = RetryPlugin::default();
        let dispatch = Scripted::new(&[503, 200]);
        let retry = Retry::new(&dispatch);

        let start = tokio::time::Instant::now();
        plugin
            .after_response(response(503), &request(Method::Get), &retry)
            .await
            .expect("retried");

        check!(start.elapsed() >= Duration::from_millis(900));
    }

    #[tokio::test]
    async fn leaves_non_idempotent_requests_alone() {
        let plugin = RetryPlugin::default();
        let dispatch = Scripted::new(&[]);
        let retry = Retry::new(&dispatch);

        let response = plugin
            .after_response(response(503), &request(Method::Post), &retry)
            .await
            .expect("passed through");

        check!(response.status() == 503);
        check!(response.text().await.expect("text") == "first");
        check!(dispatch.calls() == 0);
    }

    #[tokio::test(start_paused = true)]
    async fn abort_interrupts_the_wait() {
        let plugin = RetryPlugin::default();
        let dispatch = Scripted::new(&[]);
        let retry = Retry::new(&dispatch);
        let controller = AbortController::new();
        controller.abort();
        let request = request(Method::Get).with_signal(Some(controller.signal()));

        let result = plugin.after_response(response(503), &request, &retry).await;

        let_assert!(Err(Error::Aborted) = result);
        check!(dispatch.calls() == 0);
    }
}
