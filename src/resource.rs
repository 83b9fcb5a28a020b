//! Pooled connection state and the trait seams the pool consumes.
//!
//! The pool never opens or closes transports itself: creation goes through
//! [`TransportFactory`], teardown through [`Transport::close`], time through
//! [`Clock`], and lifecycle events through [`PoolObserver`].

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::errors::{PoolError, PoolResult, TransportError};

/// Identity of one underlying transport instance.
///
/// Two handles reference the same instance exactly when their ids are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub(crate) u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// Lifecycle state of a pooled connection.
///
/// `Retired` is terminal: once reached, the connection is removed from the
/// pool and is never handed to another caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// At least one session is open against the connection.
    Active,
    /// No open sessions; the idle clock is running.
    Idle,
    /// Closed and removed from the pool.
    Retired,
}

/// The close capability the pool requires of an underlying transport.
pub trait Transport: Send + Sync + 'static {
    fn close(&self) -> Result<(), TransportError>;
}

/// Constructs raw transports on demand.
///
/// Implemented for any matching closure, so a pool can be built directly
/// from `|| { ... }`.
pub trait TransportFactory<C>: Send + Sync {
    fn create(&self) -> Result<C, TransportError>;
}

impl<C, F> TransportFactory<C> for F
where
    F: Fn() -> Result<C, TransportError> + Send + Sync,
{
    fn create(&self) -> Result<C, TransportError> {
        self()
    }
}

/// Monotonic time source; injectable for deterministic tests.
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
}

/// The process clock, used outside of tests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Why a connection left the pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetireReason {
    /// Sat idle past the configured timeout.
    IdleExpired,
    /// The pool was shut down.
    PoolClosed,
    /// Displaced by the capacity bound.
    CapacityPressure,
}

/// Receives retirement and close-failure events.
///
/// Invoked outside the pool lock, fire-and-forget; implementations must not
/// block the calling thread for long.
pub trait PoolObserver: Send + Sync {
    fn connection_retired(&self, _id: ConnectionId, _reason: RetireReason) {}
    fn close_failed(&self, _id: ConnectionId, _error: &PoolError) {}
}

/// Observer that discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl PoolObserver for NoopObserver {}

/// One pooled transport with its liveness bookkeeping.
///
/// All fields are guarded by the owning pool's mutex; methods here assume
/// that exclusion and stay free of interior locking.
pub(crate) struct PooledConnection<C> {
    id: ConnectionId,
    transport: Arc<C>,
    ref_count: usize,
    last_idle_at: Option<Instant>,
    state: ConnectionState,
}

impl<C> PooledConnection<C> {
    pub(crate) fn new(id: ConnectionId, transport: Arc<C>, now: Instant) -> Self {
        Self {
            id,
            transport,
            ref_count: 0,
            last_idle_at: Some(now),
            state: ConnectionState::Idle,
        }
    }

    pub(crate) fn id(&self) -> ConnectionId {
        self.id
    }

    pub(crate) fn transport(&self) -> Arc<C> {
        Arc::clone(&self.transport)
    }

    pub(crate) fn ref_count(&self) -> usize {
        self.ref_count
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> ConnectionState {
        self.state
    }

    /// A session opened against this connection; cancels any pending idle
    /// clock. `Idle -> Active` on the first open session.
    pub(crate) fn open_ref(&mut self) -> PoolResult<()> {
        if self.state == ConnectionState::Retired {
            return Err(PoolError::AlreadyRetired(self.id));
        }
        self.ref_count += 1;
        self.last_idle_at = None;
        self.state = ConnectionState::Active;
        Ok(())
    }

    /// A session closed; stamps the idle clock on the transition to zero.
    pub(crate) fn close_ref(&mut self, now: Instant) {
        debug_assert!(self.ref_count > 0, "close_ref without a matching open_ref");
        self.ref_count = self.ref_count.saturating_sub(1);
        if self.ref_count == 0 {
            self.state = ConnectionState::Idle;
            self.last_idle_at = Some(now);
        }
    }

    /// Restamp the idle clock; no-op while sessions are open.
    pub(crate) fn touch(&mut self, now: Instant) {
        if self.ref_count == 0 {
            self.last_idle_at = Some(now);
        }
    }

    /// Whether the connection is eligible for idle retirement. An open
    /// session always pins the connection, whatever the elapsed time says.
    pub(crate) fn is_expired(&self, idle_timeout: Duration, now: Instant) -> bool {
        self.ref_count == 0
            && self.state == ConnectionState::Idle
            && self
                .last_idle_at
                .is_some_and(|idle_since| now.duration_since(idle_since) > idle_timeout)
    }

    /// Terminal transition. The caller removes the entry from the pool and
    /// closes the transport.
    pub(crate) fn retire(&mut self) {
        self.state = ConnectionState::Retired;
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;
    use std::time::{Duration, Instant};

    use parking_lot::Mutex;

    use super::Clock;

    /// Hand-advanced clock for deterministic idle-expiry tests.
    pub(crate) struct ManualClock {
        now: Mutex<Instant>,
    }

    impl ManualClock {
        pub(crate) fn new() -> Arc<Self> {
            Arc::new(Self {
                now: Mutex::new(Instant::now()),
            })
        }

        pub(crate) fn advance(&self, by: Duration) {
            *self.now.lock() += by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.now.lock()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn connection(now: Instant) -> PooledConnection<&'static str> {
        PooledConnection::new(ConnectionId(7), Arc::new("transport"), now)
    }

    #[test]
    fn starts_idle_with_the_clock_running() {
        let now = Instant::now();
        let conn = connection(now);
        assert_eq!(conn.state(), ConnectionState::Idle);
        assert_eq!(conn.ref_count(), 0);
        assert!(conn.is_expired(Duration::from_millis(10), now + Duration::from_millis(11)));
    }

    #[test]
    fn open_session_pins_against_expiry() {
        let now = Instant::now();
        let mut conn = connection(now);
        conn.open_ref().unwrap();
        assert_eq!(conn.state(), ConnectionState::Active);
        assert!(!conn.is_expired(Duration::from_millis(10), now + Duration::from_secs(60)));
    }

    #[test]
    fn idle_clock_restarts_at_last_session_close() {
        let start = Instant::now();
        let mut conn = connection(start);
        conn.open_ref().unwrap();
        conn.open_ref().unwrap();

        let first_close = start + Duration::from_millis(50);
        conn.close_ref(first_close);
        assert_eq!(conn.state(), ConnectionState::Active, "one session still open");

        let second_close = start + Duration::from_millis(80);
        conn.close_ref(second_close);
        assert_eq!(conn.state(), ConnectionState::Idle);
        assert!(!conn.is_expired(Duration::from_millis(10), second_close + Duration::from_millis(5)));
        assert!(conn.is_expired(Duration::from_millis(10), second_close + Duration::from_millis(11)));
    }

    #[test]
    fn retired_is_terminal_for_new_sessions() {
        let mut conn = connection(Instant::now());
        conn.retire();
        assert!(matches!(conn.open_ref(), Err(PoolError::AlreadyRetired(_))));
    }

    #[test]
    fn touch_is_ignored_while_sessions_are_open() {
        let start = Instant::now();
        let mut conn = connection(start);
        conn.open_ref().unwrap();
        conn.touch(start + Duration::from_millis(5));
        assert!(!conn.is_expired(Duration::from_millis(1), start + Duration::from_secs(1)));
    }
}
