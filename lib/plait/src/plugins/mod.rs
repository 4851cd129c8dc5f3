//! Ready-made plugins.
//!
//! Every plugin here works with any adapter: register it on a [`crate::Pipeline`]
//! or through the [`crate::HyperClientBuilder`] helpers.
//!
//! - [`BearerAuthPlugin`] - Adds `Authorization: Bearer <token>` header
//! - [`LoggingPlugin`] - Logs requests/responses using `tracing`
//! - [`RetryPlugin`] - Re-sends idempotent requests on transient statuses
//! - [`TimeoutPlugin`] - Aborts requests that take too long

mod bearer_auth;
mod logging;
mod retry;
mod timeout;

pub use bearer_auth::BearerAuthPlugin;
pub use logging::{LogLevel, LoggingPlugin};
pub use retry::{RetryOptions, RetryPlugin};
pub use timeout::TimeoutPlugin;
