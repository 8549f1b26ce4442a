//! Configuration for the sync client.

use std::net::SocketAddr;
use std::time::Duration;

/// Default time to wait for a response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_millis(3000);

/// Configuration for a replica talking to one server.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Server address.
    pub server_addr: SocketAddr,
    /// Password of the remote database.
    pub database_password: String,
    /// User name presented by `AddConnection`.
    pub user: String,
    /// User password presented by `AddConnection`.
    pub password: String,
    /// How long a request waits for its response.
    pub request_timeout: Duration,
    /// How long connecting may take per attempt.
    pub connect_timeout: Duration,
    /// Period of background pulls, if any.
    pub pull_interval: Option<Duration>,
    /// Connect retry policy.
    pub retry: RetryConfig,
}

impl SyncConfig {
    /// Creates a configuration for `server_addr` with empty credentials.
    pub fn new(server_addr: SocketAddr) -> Self {
        Self {
            server_addr,
            database_password: String::new(),
            user: String::new(),
            password: String::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            connect_timeout: Duration::from_secs(5),
            pull_interval: None,
            retry: RetryConfig::no_retry(),
        }
    }

    /// Sets the remote database password.
    #[must_use]
    pub fn with_database_password(mut self, password: impl Into<String>) -> Self {
        self.database_password = password.into();
        self
    }

    /// Sets the user credentials.
    #[must_use]
    pub fn with_credentials(mut self, user: impl Into<String>, password: impl Into<String>) -> Self {
        self.user = user.into();
        self.password = password.into();
        self
    }

    /// Sets the request timeout.
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    /// Sets the connect timeout.
    #[must_use]
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Enables background pulls every `interval`.
    #[must_use]
    pub fn with_pull_interval(mut self, interval: Duration) -> Self {
        self.pull_interval = Some(interval);
        self
    }

    /// Sets the connect retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new(SocketAddr::from(([127, 0, 0, 1], 7345)))
    }
}

/// Backoff policy for connecting.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound on any delay.
    pub max_delay: Duration,
    /// Growth factor between attempts.
    pub backoff_multiplier: u32,
}

impl RetryConfig {
    /// Retries up to `max_attempts` times in total.
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_multiplier: 2,
        }
    }

    /// A single attempt.
    pub fn no_retry() -> Self {
        Self::new(1)
    }

    /// Sets the initial delay.
    #[must_use]
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    /// Sets the maximum delay.
    #[must_use]
    pub fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    /// Delay before attempt `attempt` (0-indexed); the first attempt has none.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = self
            .backoff_multiplier
            .checked_pow(attempt - 1)
            .unwrap_or(u32::MAX);
        self.initial_delay
            .checked_mul(factor)
            .map_or(self.max_delay, |delay| delay.min(self.max_delay))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self::new(3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new("10.0.0.2:7345".parse().unwrap())
            .with_database_password("db")
            .with_credentials("admin", "secret")
            .with_request_timeout(Duration::from_millis(200))
            .with_pull_interval(Duration::from_secs(1));

        assert_eq!(config.database_password, "db");
        assert_eq!(config.user, "admin");
        assert_eq!(config.password, "secret");
        assert_eq!(config.request_timeout, Duration::from_millis(200));
        assert_eq!(config.pull_interval, Some(Duration::from_secs(1)));
    }

    #[test]
    fn default_timeout_is_three_seconds() {
        let config = SyncConfig::default();
        assert_eq!(config.request_timeout, Duration::from_secs(3));
        assert_eq!(config.retry.max_attempts, 1);
        assert!(config.pull_interval.is_none());
    }

    #[test]
    fn retry_delay_grows_and_caps() {
        let config = RetryConfig::new(10)
            .with_initial_delay(Duration::from_millis(100))
            .with_max_delay(Duration::from_millis(350));

        assert_eq!(config.delay_for_attempt(0), Duration::ZERO);
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(100));
        assert_eq!(config.delay_for_attempt(2), Duration::from_millis(200));
        assert_eq!(config.delay_for_attempt(3), Duration::from_millis(350));
        assert_eq!(config.delay_for_attempt(40), Duration::from_millis(350));
    }
}
