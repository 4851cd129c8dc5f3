//! Settings of [`crate::HyperClient`] and [`crate::HyperFetch`].

use std::time::Duration;

use url::Url;

/// Decides which statuses [`crate::HyperClient`] returns as `Ok`.
///
/// Runs after every plugin, on the final response.
pub type ValidateStatus = fn(u16) -> bool;

fn accept_2xx(status: u16) -> bool {
    matches!(status, 200..=299)
}

/// Connection pool settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Idle connections kept per host.
    pub max_idle_per_host: usize,
    /// How long an idle connection stays in the pool.
    pub idle_timeout: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_idle_per_host: 32,
            idle_timeout: Duration::from_secs(90),
        }
    }
}

/// Client settings; every field has a usable default.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Whole-exchange timeout, overridable per request.
    pub timeout: Duration,
    /// TCP connect timeout.
    pub connect_timeout: Duration,
    /// Connection reuse.
    pub pool: PoolConfig,
    /// Relative request URLs are joined onto this.
    pub base_url: Option<Url>,
    /// Statuses it rejects become [`crate::Error::Http`].
    pub validate_status: ValidateStatus,
    /// Try JSON first when decoding textual bodies.
    pub forced_json_parsing: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            pool: PoolConfig::default(),
            base_url: None,
            validate_status: accept_2xx,
            forced_json_parsing: true,
        }
    }
}

impl ClientConfig {
    /// Starts from the defaults.
    #[must_use]
    pub fn builder() -> ClientConfigBuilder {
        ClientConfigBuilder::default()
    }

    /// Resolves `url` against [`ClientConfig::base_url`].
    ///
    /// Absolute URLs are returned as they are.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::InvalidUrl`] if `url` is relative without a
    /// base, or does not parse.
    pub fn resolve(&self, url: &str) -> crate::Result<Url> {
        match (Url::parse(url), &self.base_url) {
            (Ok(absolute), _) => Ok(absolute),
            (Err(url::ParseError::RelativeUrlWithoutBase), Some(base)) => Ok(base.join(url)?),
            (Err(err), _) => Err(err.into()),
        }
    }
}

/// Fluent construction of a [`ClientConfig`].
#[derive(Debug, Clone, Default)]
pub struct ClientConfigBuilder(ClientConfig);

impl From<ClientConfig> for ClientConfigBuilder {
    fn from(config: ClientConfig) -> Self {
        Self(config)
    }
}

impl ClientConfigBuilder {
    /// See [`ClientConfig::timeout`].
    #[must_use]
    pub const fn timeout(mut self, timeout: Duration) -> Self {
        self.0.timeout = timeout;
        self
    }

    /// See [`ClientConfig::connect_timeout`].
    #[must_use]
    pub const fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.0.connect_timeout = timeout;
        self
    }

    /// See [`PoolConfig::max_idle_per_host`].
    #[must_use]
    pub const fn pool_idle_per_host(mut self, count: usize) -> Self {
        self.0.pool.max_idle_per_host = count;
        self
    }

    /// See [`PoolConfig::idle_timeout`].
    #[must_use]
    pub const fn pool_idle_timeout(mut self, timeout: Duration) -> Self {
        self.0.pool.idle_timeout = timeout;
        self
    }

    /// See [`ClientConfig::base_url`].
    #[must_use]
    pub fn base_url(mut self, base_url: Url) -> Self {
        self.0.base_url = Some(base_url);
        self
    }

    /// See [`ClientConfig::validate_status`].
    #[must_use]
    pub const fn validate_status(mut self, validate: ValidateStatus) -> Self {
        self.0.validate_status = validate;
        self
    }

    /// See [`ClientConfig::forced_json_parsing`].
    #[must_use]
    pub const fn forced_json_parsing(mut self, forced: bool) -> Self {
        self.0.forced_json_parsing = forced;
        self
    }

    /// Finishes the configuration.
    #[must_use]
    pub fn build(self) -> ClientConfig {
        self.0
    }
}
