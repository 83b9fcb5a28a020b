//! # transport-pool
//!
//! Bounded pool of expensive transport connections with session reference
//! counting and background idle eviction.
//!
//! ## Features
//!
//! - Reuse-first checkout: an existing connection is always preferred over
//!   creating a new one
//! - Session reference counting: a connection with open sessions is never
//!   reclaimed, whatever its recorded idle time
//! - Background idle eviction on a dedicated timer thread
//! - Blocking, timeout-bounded and async acquisition
//! - Bounded LRU cache building block with a synchronous eviction hook
//! - Injectable clock and observer seams for deterministic testing
//! - Metrics with Prometheus-format export, health snapshots
//!
//! ## Quick Start
//!
//! ```rust
//! use transport_pool::{ConnectionPool, PoolConfig, Transport, TransportError};
//!
//! struct Echo;
//!
//! impl Transport for Echo {
//!     fn close(&self) -> Result<(), TransportError> {
//!         Ok(())
//!     }
//! }
//!
//! let pool = ConnectionPool::new(|| Ok::<_, TransportError>(Echo), PoolConfig::default());
//! let connection = pool.acquire().unwrap();
//! let session = connection.open_session().unwrap();
//! // the connection cannot be idled out while `session` is alive
//! drop(session);
//! drop(connection);
//! pool.close();
//! ```

mod cache;
mod config;
mod errors;
mod evictor;
mod health;
mod metrics;
mod pool;
mod resource;

pub use cache::{BoundedLruCache, OrderMode};
pub use config::PoolConfig;
pub use errors::{PoolError, PoolResult, TransportError};
pub use health::PoolHealth;
pub use metrics::{MetricsExporter, PoolMetrics};
pub use pool::{ConnectionHandle, ConnectionPool, SessionHandle};
pub use resource::{
    Clock, ConnectionId, ConnectionState, NoopObserver, PoolObserver, RetireReason, SystemClock,
    Transport, TransportFactory,
};
