//! Metrics collection and export for connection pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Point-in-time metrics for a pool
#[derive(Debug, Clone)]
pub struct PoolMetrics {
    /// Total successful acquisitions
    pub total_acquired: usize,

    /// Transports created through the factory
    pub connections_created: usize,

    /// Acquisitions served by an existing connection
    pub connections_reused: usize,

    /// Sessions opened against pooled connections
    pub sessions_opened: usize,

    /// Sessions closed
    pub sessions_closed: usize,

    /// Connections retired by the idle timeout
    pub idle_evictions: usize,

    /// Transport close operations that reported an error
    pub close_failures: usize,

    /// Connections currently pooled
    pub open_connections: usize,

    /// Sessions currently open
    pub open_sessions: usize,

    /// Pool connection slot utilization (0.0 to 1.0)
    pub utilization: f64,

    /// Maximum simultaneous connections
    pub capacity: usize,
}

impl PoolMetrics {
    /// Export metrics as a string map
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_acquired".to_string(), self.total_acquired.to_string());
        metrics.insert(
            "connections_created".to_string(),
            self.connections_created.to_string(),
        );
        metrics.insert(
            "connections_reused".to_string(),
            self.connections_reused.to_string(),
        );
        metrics.insert("sessions_opened".to_string(), self.sessions_opened.to_string());
        metrics.insert("sessions_closed".to_string(), self.sessions_closed.to_string());
        metrics.insert("idle_evictions".to_string(), self.idle_evictions.to_string());
        metrics.insert("close_failures".to_string(), self.close_failures.to_string());
        metrics.insert(
            "open_connections".to_string(),
            self.open_connections.to_string(),
        );
        metrics.insert("open_sessions".to_string(), self.open_sessions.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics.insert("capacity".to_string(), self.capacity.to_string());
        metrics
    }
}

/// Metrics exporter for Prometheus format
pub struct MetricsExporter;

impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        let mut output = String::new();
        let labels = Self::format_labels(pool_name, tags);

        // Gauge metrics
        output.push_str("# HELP transport_pool_connections_open Connections currently pooled\n");
        output.push_str("# TYPE transport_pool_connections_open gauge\n");
        output.push_str(&format!(
            "transport_pool_connections_open{{{}}} {}\n",
            labels, metrics.open_connections
        ));

        output.push_str("# HELP transport_pool_sessions_open Sessions currently open\n");
        output.push_str("# TYPE transport_pool_sessions_open gauge\n");
        output.push_str(&format!(
            "transport_pool_sessions_open{{{}}} {}\n",
            labels, metrics.open_sessions
        ));

        output.push_str("# HELP transport_pool_utilization Connection slot utilization\n");
        output.push_str("# TYPE transport_pool_utilization gauge\n");
        output.push_str(&format!(
            "transport_pool_utilization{{{}}} {:.2}\n",
            labels, metrics.utilization
        ));

        // Counter metrics
        output.push_str("# HELP transport_pool_acquired_total Total successful acquisitions\n");
        output.push_str("# TYPE transport_pool_acquired_total counter\n");
        output.push_str(&format!(
            "transport_pool_acquired_total{{{}}} {}\n",
            labels, metrics.total_acquired
        ));

        output.push_str("# HELP transport_pool_connections_created_total Transports created\n");
        output.push_str("# TYPE transport_pool_connections_created_total counter\n");
        output.push_str(&format!(
            "transport_pool_connections_created_total{{{}}} {}\n",
            labels, metrics.connections_created
        ));

        output.push_str("# HELP transport_pool_connections_reused_total Acquisitions served by reuse\n");
        output.push_str("# TYPE transport_pool_connections_reused_total counter\n");
        output.push_str(&format!(
            "transport_pool_connections_reused_total{{{}}} {}\n",
            labels, metrics.connections_reused
        ));

        output.push_str("# HELP transport_pool_sessions_opened_total Sessions opened\n");
        output.push_str("# TYPE transport_pool_sessions_opened_total counter\n");
        output.push_str(&format!(
            "transport_pool_sessions_opened_total{{{}}} {}\n",
            labels, metrics.sessions_opened
        ));

        output.push_str("# HELP transport_pool_sessions_closed_total Sessions closed\n");
        output.push_str("# TYPE transport_pool_sessions_closed_total counter\n");
        output.push_str(&format!(
            "transport_pool_sessions_closed_total{{{}}} {}\n",
            labels, metrics.sessions_closed
        ));

        output.push_str("# HELP transport_pool_idle_evictions_total Connections retired by idle timeout\n");
        output.push_str("# TYPE transport_pool_idle_evictions_total counter\n");
        output.push_str(&format!(
            "transport_pool_idle_evictions_total{{{}}} {}\n",
            labels, metrics.idle_evictions
        ));

        output.push_str("# HELP transport_pool_close_failures_total Transport close errors\n");
        output.push_str("# TYPE transport_pool_close_failures_total counter\n");
        output.push_str(&format!(
            "transport_pool_close_failures_total{{{}}} {}\n",
            labels, metrics.close_failures
        ));

        output
    }

    fn format_labels(pool_name: &str, tags: Option<&HashMap<String, String>>) -> String {
        let mut labels = vec![format!("pool=\"{}\"", pool_name)];

        if let Some(tags) = tags {
            for (key, value) in tags {
                labels.push(format!("{}=\"{}\"", key, value));
            }
        }

        labels.join(",")
    }
}

/// Internal metrics tracker
pub(crate) struct MetricsTracker {
    pub total_acquired: AtomicUsize,
    pub connections_created: AtomicUsize,
    pub connections_reused: AtomicUsize,
    pub sessions_opened: AtomicUsize,
    pub sessions_closed: AtomicUsize,
    pub idle_evictions: AtomicUsize,
    pub close_failures: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self {
            total_acquired: AtomicUsize::new(0),
            connections_created: AtomicUsize::new(0),
            connections_reused: AtomicUsize::new(0),
            sessions_opened: AtomicUsize::new(0),
            sessions_closed: AtomicUsize::new(0),
            idle_evictions: AtomicUsize::new(0),
            close_failures: AtomicUsize::new(0),
        }
    }

    pub fn snapshot(
        &self,
        open_connections: usize,
        open_sessions: usize,
        capacity: usize,
    ) -> PoolMetrics {
        let utilization = if capacity > 0 {
            open_connections as f64 / capacity as f64
        } else {
            0.0
        };

        PoolMetrics {
            total_acquired: self.total_acquired.load(Ordering::Relaxed),
            connections_created: self.connections_created.load(Ordering::Relaxed),
            connections_reused: self.connections_reused.load(Ordering::Relaxed),
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
            idle_evictions: self.idle_evictions.load(Ordering::Relaxed),
            close_failures: self.close_failures.load(Ordering::Relaxed),
            open_connections,
            open_sessions,
            utilization,
            capacity,
        }
    }
}

impl Default for MetricsTracker {
    fn default() -> Self {
        Self::new()
    }
}
