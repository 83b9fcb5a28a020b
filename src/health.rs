//! Health monitoring for connection pools

/// Point-in-time health snapshot of a pool
///
/// # Examples
///
/// ```
/// use transport_pool::PoolHealth;
///
/// let health = PoolHealth::new(1, 2, 4);
/// assert!(health.is_healthy());
/// assert_eq!(health.open_connections, 1);
/// ```
#[derive(Debug, Clone)]
pub struct PoolHealth {
    /// Whether the pool looks healthy
    pub is_healthy: bool,

    /// Number of warnings detected
    pub warning_count: usize,

    /// Connection slot utilization (0.0 to 1.0)
    pub utilization: f64,

    /// Connections currently pooled
    pub open_connections: usize,

    /// Sessions currently open
    pub open_sessions: usize,

    /// Maximum simultaneous connections
    pub capacity: usize,

    /// Warning messages
    pub warnings: Vec<String>,
}

impl PoolHealth {
    /// Sessions per connection above which the pool is considered oversubscribed.
    const SHARING_LIMIT: usize = 16;

    pub fn new(open_connections: usize, open_sessions: usize, capacity: usize) -> Self {
        let utilization = if capacity > 0 {
            open_connections as f64 / capacity as f64
        } else {
            0.0
        };

        let mut warnings = Vec::new();
        let mut is_healthy = true;

        if utilization >= 1.0 && capacity > 0 {
            warnings.push("every connection slot is in use".to_string());
        }

        if open_connections > 0 && open_sessions > open_connections * Self::SHARING_LIMIT {
            warnings.push(format!(
                "connections are oversubscribed: {} sessions across {} connections",
                open_sessions, open_connections
            ));
            is_healthy = false;
        }

        Self {
            is_healthy,
            warning_count: warnings.len(),
            utilization,
            open_connections,
            open_sessions,
            capacity,
            warnings,
        }
    }

    /// Check whether the pool is healthy
    pub fn is_healthy(&self) -> bool {
        self.is_healthy
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn a_quiet_pool_is_healthy() {
        let health = PoolHealth::new(0, 0, 4);
        assert!(health.is_healthy());
        assert_eq!(health.warning_count, 0);
    }

    #[test]
    fn a_full_pool_warns_but_stays_healthy() {
        let health = PoolHealth::new(4, 4, 4);
        assert!(health.is_healthy());
        assert_eq!(health.warning_count, 1);
    }

    #[test]
    fn oversubscription_is_unhealthy() {
        let health = PoolHealth::new(1, 100, 1);
        assert!(!health.is_healthy());
        assert!(health.warnings.iter().any(|w| w.contains("oversubscribed")));
    }
}
