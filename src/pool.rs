//! Core connection pool implementation.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::cache::{BoundedLruCache, OrderMode};
use crate::config::PoolConfig;
use crate::errors::{PoolError, PoolResult};
use crate::evictor::IdleEvictor;
use crate::health::PoolHealth;
use crate::metrics::{MetricsExporter, MetricsTracker, PoolMetrics};
use crate::resource::{
    Clock, ConnectionId, NoopObserver, PoolObserver, PooledConnection, RetireReason, SystemClock,
    Transport, TransportFactory,
};

struct PoolInner<C> {
    entries: BoundedLruCache<ConnectionId, PooledConnection<C>>,
    /// Slots reserved by factory calls running with the mutex released;
    /// `entries.len() + pending_creates <= capacity` always holds.
    pending_creates: usize,
    next_id: u64,
    closed: bool,
}

pub(crate) struct PoolShared<C> {
    config: PoolConfig,
    factory: Box<dyn TransportFactory<C>>,
    clock: Arc<dyn Clock>,
    observer: Arc<dyn PoolObserver>,
    metrics: Arc<MetricsTracker>,
    inner: Mutex<PoolInner<C>>,
    slot_freed: Condvar,
}

/// Bounded pool of shared transport connections.
///
/// Callers borrow connections with [`acquire`](Self::acquire) and pin them
/// against idle eviction by opening sessions. Connections returned to the
/// pool stay open for reuse until they sit idle past the configured timeout
/// or the pool is closed. Clones share the same pool.
pub struct ConnectionPool<C: Transport> {
    shared: Arc<PoolShared<C>>,
    evictor: Arc<Mutex<Option<IdleEvictor>>>,
}

impl<C: Transport> Clone for ConnectionPool<C> {
    fn clone(&self) -> Self {
        Self {
            shared: Arc::clone(&self.shared),
            evictor: Arc::clone(&self.evictor),
        }
    }
}

impl<C: Transport> ConnectionPool<C> {
    /// Create a pool with the process clock and no observer.
    ///
    /// # Panics
    /// Panics if the configured capacity is zero.
    pub fn new(factory: impl TransportFactory<C> + 'static, config: PoolConfig) -> Self {
        Self::with_parts(factory, config, Arc::new(SystemClock), Arc::new(NoopObserver))
    }

    /// Create a pool with an injected clock and observer.
    ///
    /// # Panics
    /// Panics if the configured capacity is zero.
    pub fn with_parts(
        factory: impl TransportFactory<C> + 'static,
        config: PoolConfig,
        clock: Arc<dyn Clock>,
        observer: Arc<dyn PoolObserver>,
    ) -> Self {
        assert!(config.capacity > 0, "pool capacity must be positive");

        // Overflow safety net only: the pool reserves a slot before every
        // insert, so the cache bound is never breached through `put`.
        let hook_observer = Arc::clone(&observer);
        let entries = BoundedLruCache::with_eviction(
            config.capacity,
            OrderMode::Access,
            move |id: ConnectionId, conn: PooledConnection<C>| {
                if let Err(source) = conn.transport().close() {
                    hook_observer.close_failed(id, &PoolError::CloseFailed { id, source });
                }
                hook_observer.connection_retired(id, RetireReason::CapacityPressure);
            },
        );

        let shared = Arc::new(PoolShared {
            config,
            factory: Box::new(factory),
            clock,
            observer,
            metrics: Arc::new(MetricsTracker::new()),
            inner: Mutex::new(PoolInner {
                entries,
                pending_creates: 0,
                next_id: 0,
                closed: false,
            }),
            slot_freed: Condvar::new(),
        });

        let evictor = shared
            .config
            .effective_evictor_interval()
            .map(|interval| IdleEvictor::spawn(&shared, interval));

        Self {
            shared,
            evictor: Arc::new(Mutex::new(evictor)),
        }
    }

    /// Borrow a pooled connection.
    ///
    /// An existing connection is always preferred over creating a new one;
    /// among live connections the one with the fewest open sessions wins.
    /// When every slot is taken by an in-flight creation the caller blocks
    /// until one frees, failing with [`PoolError::PoolExhausted`] once the
    /// configured acquire timeout elapses.
    ///
    /// Holding the returned handle does not pin the connection; only open
    /// sessions do.
    pub fn acquire(&self) -> PoolResult<ConnectionHandle<C>> {
        let shared = &self.shared;
        let deadline = shared
            .config
            .acquire_timeout
            .map(|timeout| (timeout, Instant::now() + timeout));

        loop {
            let stale;
            let outcome: Option<PoolResult<ConnectionHandle<C>>>;
            {
                let mut inner = shared.inner.lock();
                if inner.closed {
                    return Err(PoolError::PoolClosed);
                }

                // Connections already past the idle timeout must never be
                // handed out, even between evictor passes.
                stale = shared.sweep_expired_locked(&mut inner, shared.clock.now());

                if let Some(id) = most_available(&inner.entries) {
                    let conn = inner
                        .entries
                        .get(&id)
                        .expect("reusable entry vanished under the pool lock");
                    let transport = conn.transport();
                    shared.metrics.connections_reused.fetch_add(1, Ordering::Relaxed);
                    shared.metrics.total_acquired.fetch_add(1, Ordering::Relaxed);
                    debug!(connection = %id, "reusing pooled connection");
                    outcome = Some(Ok(ConnectionHandle::new(Arc::clone(shared), id, transport)));
                } else if inner.entries.len() + inner.pending_creates < shared.config.capacity {
                    let (guard, created) = shared.create_entry(inner);
                    drop(guard);
                    outcome = Some(created.map(|(id, transport)| {
                        shared.metrics.total_acquired.fetch_add(1, Ordering::Relaxed);
                        ConnectionHandle::new(Arc::clone(shared), id, transport)
                    }));
                } else if stale.is_empty() {
                    match deadline {
                        Some((timeout, at)) => {
                            if shared.slot_freed.wait_until(&mut inner, at).timed_out() {
                                outcome = Some(Err(PoolError::PoolExhausted(timeout)));
                            } else {
                                outcome = None;
                            }
                        }
                        None => {
                            shared.slot_freed.wait(&mut inner);
                            outcome = None;
                        }
                    }
                } else {
                    outcome = None;
                }
            }

            for conn in stale {
                shared.close_retired(conn, RetireReason::IdleExpired);
            }
            if let Some(result) = outcome {
                return result;
            }
        }
    }

    /// Async [`acquire`](Self::acquire), run on a blocking thread.
    pub async fn acquire_async(&self) -> PoolResult<ConnectionHandle<C>> {
        let pool = self.clone();
        match tokio::task::spawn_blocking(move || pool.acquire()).await {
            Ok(result) => result,
            Err(join_error) if join_error.is_panic() => {
                std::panic::resume_unwind(join_error.into_panic())
            }
            Err(_) => Err(PoolError::PoolClosed),
        }
    }

    /// Run one idle-eviction pass now, returning the number of connections
    /// retired. The background evictor calls this on its own schedule; it is
    /// exposed for deterministic tests and manual maintenance.
    pub fn evict_idle(&self) -> usize {
        self.shared.evict_idle()
    }

    /// Shut down the pool.
    ///
    /// Stops the background evictor (waiting for an in-flight pass), retires
    /// every remaining connection exactly once regardless of idle state, and
    /// wakes blocked acquirers with [`PoolError::PoolClosed`]. Repeated calls
    /// are no-ops.
    pub fn close(&self) {
        let evictor = self.evictor.lock().take();
        if let Some(evictor) = evictor {
            evictor.stop();
        }

        let drained = {
            let mut inner = self.shared.inner.lock();
            if inner.closed {
                return;
            }
            inner.closed = true;
            let drained = inner.entries.drain();
            self.shared.slot_freed.notify_all();
            drained
        };

        for (id, mut conn) in drained {
            if conn.ref_count() > 0 {
                warn!(
                    connection = %id,
                    sessions = conn.ref_count(),
                    "force-retiring connection with open sessions"
                );
            }
            conn.retire();
            self.shared.close_retired(conn, RetireReason::PoolClosed);
        }
        info!("connection pool closed");
    }

    pub fn is_closed(&self) -> bool {
        self.shared.inner.lock().closed
    }

    pub fn capacity(&self) -> usize {
        self.shared.config.capacity
    }

    /// Number of connections currently pooled.
    pub fn connection_count(&self) -> usize {
        self.shared.inner.lock().entries.len()
    }

    /// Point-in-time metrics snapshot.
    pub fn metrics(&self) -> PoolMetrics {
        let (open_connections, open_sessions) = self.gauges();
        self.shared
            .metrics
            .snapshot(open_connections, open_sessions, self.shared.config.capacity)
    }

    /// Export metrics as a string map.
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.metrics().export()
    }

    /// Export metrics in Prometheus exposition format.
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> String {
        MetricsExporter::export_prometheus(&self.metrics(), pool_name, tags)
    }

    /// Point-in-time health snapshot.
    pub fn health_status(&self) -> PoolHealth {
        let (open_connections, open_sessions) = self.gauges();
        PoolHealth::new(open_connections, open_sessions, self.shared.config.capacity)
    }

    fn gauges(&self) -> (usize, usize) {
        let inner = self.shared.inner.lock();
        let open_connections = inner.entries.len();
        let open_sessions = inner.entries.iter().map(|(_, conn)| conn.ref_count()).sum();
        (open_connections, open_sessions)
    }
}

impl<C: Transport> PoolShared<C> {
    /// Run the factory with the pool mutex released, holding a pending-create
    /// reservation so capacity is never overshot. Returns the reacquired
    /// guard together with the outcome.
    fn create_entry<'a>(
        &'a self,
        mut inner: MutexGuard<'a, PoolInner<C>>,
    ) -> (MutexGuard<'a, PoolInner<C>>, PoolResult<(ConnectionId, Arc<C>)>) {
        inner.pending_creates += 1;
        drop(inner);

        let created = self.factory.create();

        let mut inner = self.inner.lock();
        inner.pending_creates -= 1;
        let result = match created {
            Ok(transport) => {
                if inner.closed {
                    // Lost the race with close(); don't leak the transport.
                    if let Err(error) = transport.close() {
                        warn!(error = %error, "failed to close transport created during pool shutdown");
                    }
                    Err(PoolError::PoolClosed)
                } else {
                    let id = ConnectionId(inner.next_id);
                    inner.next_id += 1;
                    let conn = PooledConnection::new(id, Arc::new(transport), self.clock.now());
                    let transport = conn.transport();
                    inner.entries.put(id, conn);
                    self.metrics.connections_created.fetch_add(1, Ordering::Relaxed);
                    debug!(connection = %id, "created pooled connection");
                    // The new connection is shareable; let waiters reuse it.
                    self.slot_freed.notify_all();
                    Ok((id, transport))
                }
            }
            Err(source) => {
                // The reserved slot is free again; let one waiter retry.
                self.slot_freed.notify_one();
                Err(PoolError::CreationFailed(source))
            }
        };
        (inner, result)
    }

    /// Remove and mark retired every entry past the idle timeout. Callers
    /// close the returned transports with the mutex released.
    fn sweep_expired_locked(
        &self,
        inner: &mut PoolInner<C>,
        now: Instant,
    ) -> Vec<PooledConnection<C>> {
        let Some(idle_timeout) = self.config.effective_idle_timeout() else {
            return Vec::new();
        };
        let expired: Vec<ConnectionId> = inner
            .entries
            .iter()
            .filter(|(_, conn)| conn.is_expired(idle_timeout, now))
            .map(|(id, _)| *id)
            .collect();
        let mut retired = Vec::with_capacity(expired.len());
        for id in expired {
            let mut conn = inner
                .entries
                .remove(&id)
                .expect("expired entry vanished under the pool lock");
            conn.retire();
            retired.push(conn);
        }
        if !retired.is_empty() {
            self.slot_freed.notify_all();
        }
        retired
    }

    pub(crate) fn evict_idle(&self) -> usize {
        let now = self.clock.now();
        let retired = {
            let mut inner = self.inner.lock();
            if inner.closed {
                return 0;
            }
            self.sweep_expired_locked(&mut inner, now)
        };

        let count = retired.len();
        for conn in retired {
            self.close_retired(conn, RetireReason::IdleExpired);
        }
        if count > 0 {
            info!(count, "retired idle connections");
        }
        count
    }

    /// Close a retired connection's transport and report the outcome.
    /// Retirement is already visible at this point, so a slow or failing
    /// close never stalls the pool or reaches unrelated callers.
    fn close_retired(&self, conn: PooledConnection<C>, reason: RetireReason) {
        let id = conn.id();
        if reason == RetireReason::IdleExpired {
            self.metrics.idle_evictions.fetch_add(1, Ordering::Relaxed);
        }
        if let Err(source) = conn.transport().close() {
            let error = PoolError::CloseFailed { id, source };
            warn!(connection = %id, %error, "closing retired connection failed");
            self.metrics.close_failures.fetch_add(1, Ordering::Relaxed);
            self.observer.close_failed(id, &error);
        }
        debug!(connection = %id, ?reason, "connection retired");
        self.observer.connection_retired(id, reason);
    }
}

fn most_available<C>(
    entries: &BoundedLruCache<ConnectionId, PooledConnection<C>>,
) -> Option<ConnectionId> {
    entries
        .iter()
        .min_by_key(|(_, conn)| conn.ref_count())
        .map(|(id, _)| *id)
}

struct Binding<C> {
    id: ConnectionId,
    transport: Arc<C>,
}

/// Caller-facing handle to a pooled connection.
///
/// Holding a handle does not change the connection's reference count; only
/// sessions opened through it do. Dropping the handle releases the
/// connection back to the pool - the transport stays open for reuse - and
/// restamps the idle clock when no sessions remain.
pub struct ConnectionHandle<C: Transport> {
    shared: Arc<PoolShared<C>>,
    current: Mutex<Binding<C>>,
}

impl<C: Transport> ConnectionHandle<C> {
    fn new(shared: Arc<PoolShared<C>>, id: ConnectionId, transport: Arc<C>) -> Self {
        Self {
            shared,
            current: Mutex::new(Binding { id, transport }),
        }
    }

    /// Identity of the currently bound connection.
    pub fn id(&self) -> ConnectionId {
        self.current.lock().id
    }

    /// Shared reference to the underlying transport.
    pub fn transport(&self) -> Arc<C> {
        Arc::clone(&self.current.lock().transport)
    }

    /// Open a session against this connection.
    ///
    /// The session pins the connection: it cannot be idle-evicted while any
    /// session is open, whatever the elapsed idle time was beforehand. If
    /// the bound connection was retired since the handle was acquired, the
    /// handle transparently rebinds to a live connection first.
    pub fn open_session(&self) -> PoolResult<SessionHandle<C>> {
        let shared = &self.shared;
        let mut binding = self.current.lock();
        let mut inner = shared.inner.lock();
        if inner.closed {
            return Err(PoolError::PoolClosed);
        }

        if let Some(conn) = inner.entries.get_mut(&binding.id) {
            conn.open_ref()?;
            shared.metrics.sessions_opened.fetch_add(1, Ordering::Relaxed);
            return Ok(SessionHandle::new(Arc::clone(shared), binding.id));
        }

        let (id, transport) = match most_available(&inner.entries) {
            Some(id) => {
                let conn = inner
                    .entries
                    .get_mut(&id)
                    .expect("reusable entry vanished under the pool lock");
                conn.open_ref()?;
                (id, conn.transport())
            }
            None => {
                if inner.entries.len() + inner.pending_creates >= shared.config.capacity {
                    // Every slot is held by an in-flight creation; session
                    // opens never block waiting for one.
                    return Err(PoolError::PoolExhausted(Duration::ZERO));
                }
                let (mut guard, created) = shared.create_entry(inner);
                let (id, transport) = created?;
                let conn = guard
                    .entries
                    .get_mut(&id)
                    .expect("created entry vanished under the pool lock");
                conn.open_ref()?;
                (id, transport)
            }
        };

        shared.metrics.sessions_opened.fetch_add(1, Ordering::Relaxed);
        debug!(from = %binding.id, to = %id, "rebound connection handle after concurrent retirement");
        binding.id = id;
        binding.transport = transport;
        Ok(SessionHandle::new(Arc::clone(shared), id))
    }

    /// Release the connection back to the pool explicitly; dropping the
    /// handle does the same.
    pub fn close(self) {}
}

impl<C: Transport> Drop for ConnectionHandle<C> {
    fn drop(&mut self) {
        let binding = self.current.get_mut();
        let mut inner = self.shared.inner.lock();
        if let Some(conn) = inner.entries.get_mut(&binding.id) {
            conn.touch(self.shared.clock.now());
        }
    }
}

/// RAII token for one open session.
///
/// Keeps the connection's reference count above zero while alive; closing
/// (or dropping) the last session for a connection stamps its idle clock.
pub struct SessionHandle<C: Transport> {
    shared: Arc<PoolShared<C>>,
    connection_id: ConnectionId,
    released: bool,
}

impl<C: Transport> SessionHandle<C> {
    fn new(shared: Arc<PoolShared<C>>, connection_id: ConnectionId) -> Self {
        Self {
            shared,
            connection_id,
            released: false,
        }
    }

    /// Identity of the connection this session is pinned to.
    pub fn connection_id(&self) -> ConnectionId {
        self.connection_id
    }

    /// Close the session explicitly; dropping the handle does the same.
    pub fn close(mut self) {
        self.release();
    }

    fn release(&mut self) {
        if self.released {
            return;
        }
        self.released = true;
        let mut inner = self.shared.inner.lock();
        if let Some(conn) = inner.entries.get_mut(&self.connection_id) {
            conn.close_ref(self.shared.clock.now());
            self.shared.metrics.sessions_closed.fetch_add(1, Ordering::Relaxed);
        }
        // A missing entry means the pool force-closed this connection.
    }
}

impl<C: Transport> Drop for SessionHandle<C> {
    fn drop(&mut self) {
        self.release();
    }
}
