//! Session reference counting: open sessions pin a connection against idle
//! eviction, and an observer watches retirements.
//!
//! Run with: cargo run --example sessions

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use transport_pool::{
    ConnectionId, ConnectionPool, PoolConfig, PoolObserver, RetireReason, SystemClock, Transport,
    TransportError,
};

struct BrokerLink;

impl Transport for BrokerLink {
    fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

struct PrintingObserver;

impl PoolObserver for PrintingObserver {
    fn connection_retired(&self, id: ConnectionId, reason: RetireReason) {
        println!("  [observer] {} retired: {:?}", id, reason);
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .init();

    println!("=== Sessions Pin Connections ===\n");

    let config = PoolConfig::new()
        .with_capacity(1)
        .with_idle_timeout(Duration::from_millis(40))
        .with_evictor_interval(Duration::from_millis(10));
    let pool = ConnectionPool::with_parts(
        || Ok::<_, TransportError>(BrokerLink),
        config,
        Arc::new(SystemClock),
        Arc::new(PrintingObserver),
    );

    let connection = pool.acquire().expect("acquire");
    let original = connection.transport();
    let session = connection.open_session().expect("open session");
    println!("opened a session on {}", session.connection_id());

    println!("sleeping well past the idle timeout with the session open...");
    thread::sleep(Duration::from_millis(100));

    let again = pool.acquire().expect("acquire");
    println!(
        "reacquired {} - same transport: {}",
        again.id(),
        Arc::ptr_eq(&original, &again.transport())
    );
    again.close();

    println!("closing the session; the idle clock starts now");
    session.close();
    connection.close();

    thread::sleep(Duration::from_millis(100));
    println!(
        "after the timeout the pool holds {} connection(s)",
        pool.connection_count()
    );

    pool.close();
}
