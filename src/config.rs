//! Pool configuration options

use std::time::Duration;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Configuration for connection pool behavior
///
/// # Examples
///
/// ```
/// use transport_pool::PoolConfig;
/// use std::time::Duration;
///
/// let config = PoolConfig::new()
///     .with_capacity(4)
///     .with_idle_timeout(Duration::from_secs(60))
///     .with_acquire_timeout(Duration::from_secs(5));
///
/// assert_eq!(config.capacity, 4);
/// assert_eq!(config.idle_timeout, Some(Duration::from_secs(60)));
/// ```
#[derive(Debug, Clone)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PoolConfig {
    /// Maximum number of simultaneous pooled connections.
    pub capacity: usize,

    /// How long a connection may sit without open sessions before it is
    /// retired. `None` or a zero duration disables idle eviction entirely.
    pub idle_timeout: Option<Duration>,

    /// Maximum time an acquire waits for a free connection slot before
    /// failing with a pool-exhausted error. `None` waits indefinitely.
    pub acquire_timeout: Option<Duration>,

    /// Interval between background eviction passes. Defaults to half the
    /// idle timeout; clamped so a pass never runs less often than the
    /// timeout itself.
    pub evictor_interval: Option<Duration>,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            capacity: 1,
            idle_timeout: Some(Duration::from_secs(30)),
            acquire_timeout: None,
            evictor_interval: None,
        }
    }
}

impl PoolConfig {
    /// Create a configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the maximum number of pooled connections
    ///
    /// # Examples
    ///
    /// ```
    /// use transport_pool::PoolConfig;
    ///
    /// let config = PoolConfig::new().with_capacity(8);
    /// assert_eq!(config.capacity, 8);
    /// ```
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the idle timeout after which unused connections are retired
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = Some(timeout);
        self
    }

    /// Disable idle eviction; connections live until the pool closes
    pub fn without_idle_eviction(mut self) -> Self {
        self.idle_timeout = None;
        self
    }

    /// Set the maximum wait for a free slot when the pool is exhausted
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = Some(timeout);
        self
    }

    /// Override the background eviction interval
    pub fn with_evictor_interval(mut self, interval: Duration) -> Self {
        self.evictor_interval = Some(interval);
        self
    }

    /// The idle timeout with the "zero disables" switch applied.
    pub(crate) fn effective_idle_timeout(&self) -> Option<Duration> {
        self.idle_timeout.filter(|timeout| !timeout.is_zero())
    }

    /// The evictor period, or `None` when idle eviction is disabled.
    pub(crate) fn effective_evictor_interval(&self) -> Option<Duration> {
        let idle_timeout = self.effective_idle_timeout()?;
        let requested = self.evictor_interval.unwrap_or(idle_timeout / 2);
        let floor = Duration::from_millis(1);
        Some(requested.clamp(floor, idle_timeout.max(floor)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_idle_timeout_disables_eviction() {
        let config = PoolConfig::new().with_idle_timeout(Duration::ZERO);
        assert_eq!(config.effective_idle_timeout(), None);
        assert_eq!(config.effective_evictor_interval(), None);
    }

    #[test]
    fn evictor_interval_defaults_to_half_the_timeout() {
        let config = PoolConfig::new().with_idle_timeout(Duration::from_millis(100));
        assert_eq!(
            config.effective_evictor_interval(),
            Some(Duration::from_millis(50))
        );
    }

    #[test]
    fn evictor_interval_never_exceeds_the_timeout() {
        let config = PoolConfig::new()
            .with_idle_timeout(Duration::from_millis(20))
            .with_evictor_interval(Duration::from_secs(5));
        assert_eq!(
            config.effective_evictor_interval(),
            Some(Duration::from_millis(20))
        );
    }

    #[test]
    fn disabling_eviction_wins_over_an_interval_override() {
        let config = PoolConfig::new()
            .without_idle_eviction()
            .with_evictor_interval(Duration::from_millis(5));
        assert_eq!(config.effective_evictor_interval(), None);
    }
}
