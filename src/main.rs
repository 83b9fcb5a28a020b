// transport-pool demo binary - the library lives in lib.rs.
// Run the richer walkthroughs with: cargo run --example basic

use std::time::Duration;

use transport_pool::{ConnectionPool, PoolConfig, Transport, TransportError};

struct DemoTransport;

impl Transport for DemoTransport {
    fn close(&self) -> Result<(), TransportError> {
        Ok(())
    }
}

fn main() {
    println!("=== transport-pool ===");
    println!("See demos/ for usage walkthroughs (cargo run --example basic)");
    println!();

    let config = PoolConfig::new()
        .with_capacity(2)
        .with_idle_timeout(Duration::from_secs(30));
    let pool = ConnectionPool::new(|| Ok::<_, TransportError>(DemoTransport), config);

    let connection = pool.acquire().expect("acquire connection");
    println!("acquired {}", connection.id());

    let session = connection.open_session().expect("open session");
    println!("opened a session on {}", session.connection_id());
    session.close();
    connection.close();

    println!();
    println!("{}", pool.export_metrics_prometheus("demo", None));
    pool.close();
}
