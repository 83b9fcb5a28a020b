//! Basic pool usage: acquire, reuse, idle eviction.
//!
//! Run with: cargo run --example basic

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use transport_pool::{ConnectionPool, PoolConfig, Transport, TransportError};

/// Stand-in for an expensive broker/server connection.
struct BrokerLink {
    serial: usize,
}

impl Transport for BrokerLink {
    fn close(&self) -> Result<(), TransportError> {
        println!("  [transport {}] closed", self.serial);
        Ok(())
    }
}

fn main() {
    println!("=== Basic Pool Usage ===\n");

    let serials = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&serials);
    let factory = move || {
        let serial = counter.fetch_add(1, Ordering::SeqCst);
        println!("  [factory] dialing transport {}", serial);
        Ok::<_, TransportError>(BrokerLink { serial })
    };

    let config = PoolConfig::new()
        .with_capacity(1)
        .with_idle_timeout(Duration::from_millis(50));
    let pool = ConnectionPool::new(factory, config);

    println!("1. Acquire and release:");
    let first = pool.acquire().expect("acquire");
    let original = first.transport();
    println!("  acquired {} (transport {})", first.id(), original.serial);
    first.close();

    println!("\n2. Reacquire inside the idle window - same transport:");
    let second = pool.acquire().expect("acquire");
    println!(
        "  acquired {} (transport {}, same instance: {})",
        second.id(),
        second.transport().serial,
        Arc::ptr_eq(&original, &second.transport())
    );
    second.close();

    println!("\n3. Let it idle out, then reacquire - fresh transport:");
    thread::sleep(Duration::from_millis(100));
    let third = pool.acquire().expect("acquire");
    println!(
        "  acquired {} (transport {}, same instance: {})",
        third.id(),
        third.transport().serial,
        Arc::ptr_eq(&original, &third.transport())
    );
    third.close();

    println!("\n4. Metrics:");
    let metrics = pool.metrics();
    println!("  created: {}", metrics.connections_created);
    println!("  reused:  {}", metrics.connections_reused);
    println!("  evicted: {}", metrics.idle_evictions);

    pool.close();
    println!("\npool closed");
}
