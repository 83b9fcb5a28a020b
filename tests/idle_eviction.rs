//! End-to-end pool behavior with the background evictor running: idle
//! connections are retired after the timeout, open sessions pin their
//! connection, and the same underlying transport is reused while unexpired.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use transport_pool::{
    ConnectionPool, PoolConfig, PoolError, Transport, TransportError,
};

struct FakeTransport {
    serial: usize,
    closed: AtomicBool,
}

impl Transport for FakeTransport {
    fn close(&self) -> Result<(), TransportError> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

fn counting_factory() -> (
    impl Fn() -> Result<FakeTransport, TransportError> + Send + Sync,
    Arc<AtomicUsize>,
) {
    let created = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&created);
    let factory = move || {
        let serial = counter.fetch_add(1, Ordering::SeqCst);
        Ok(FakeTransport {
            serial,
            closed: AtomicBool::new(false),
        })
    };
    (factory, created)
}

fn short_idle_config() -> PoolConfig {
    PoolConfig::new()
        .with_capacity(1)
        .with_idle_timeout(Duration::from_millis(10))
        .with_evictor_interval(Duration::from_millis(2))
}

#[test]
fn evicts_idle_connection() {
    let (factory, created) = counting_factory();
    let pool = ConnectionPool::new(factory, short_idle_config());

    let first = pool.acquire().unwrap();
    let original = first.transport();
    first.close();

    // let it idle out
    thread::sleep(Duration::from_millis(30));

    let second = pool.acquire().unwrap();
    assert_ne!(original.serial, second.transport().serial, "expected a fresh transport");
    assert!(original.closed.load(Ordering::SeqCst));
    assert_eq!(created.load(Ordering::SeqCst), 2);
    pool.close();
}

#[test]
fn in_use_connection_is_not_idled_out() {
    let (factory, _created) = counting_factory();
    let pool = ConnectionPool::new(factory, short_idle_config());

    let first = pool.acquire().unwrap();
    let session = first.open_session().unwrap();
    let original = first.transport();

    // well past the idle timeout, with the session still open
    thread::sleep(Duration::from_millis(30));

    // reacquiring must yield the same underlying transport, not a new one
    let second = pool.acquire().unwrap();
    assert!(Arc::ptr_eq(&original, &second.transport()));
    assert!(
        !original.closed.load(Ordering::SeqCst),
        "a session-pinned transport must stay open"
    );

    session.close();
    first.close();
    second.close();

    // now it may idle out
    thread::sleep(Duration::from_millis(30));

    let third = pool.acquire().unwrap();
    assert_ne!(original.serial, third.transport().serial);
    assert!(original.closed.load(Ordering::SeqCst));
    pool.close();
}

#[test]
fn disabled_idle_timeout_keeps_connections_forever() {
    let (factory, created) = counting_factory();
    let config = PoolConfig::new()
        .with_capacity(1)
        .with_idle_timeout(Duration::ZERO);
    let pool = ConnectionPool::new(factory, config);

    let first = pool.acquire().unwrap();
    let original = first.transport();
    drop(first);

    thread::sleep(Duration::from_millis(30));

    let second = pool.acquire().unwrap();
    assert!(Arc::ptr_eq(&original, &second.transport()));
    assert_eq!(created.load(Ordering::SeqCst), 1);
    drop(second);

    pool.close();
    assert!(original.closed.load(Ordering::SeqCst), "close retires the survivor");
}

#[test]
fn waiter_wakes_when_a_connection_appears() {
    let created = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&created);
    let slow_factory = move || {
        let serial = counter.fetch_add(1, Ordering::SeqCst);
        if serial == 0 {
            thread::sleep(Duration::from_millis(100));
        }
        Ok::<_, TransportError>(FakeTransport {
            serial,
            closed: AtomicBool::new(false),
        })
    };
    let pool = ConnectionPool::new(slow_factory, PoolConfig::new().with_capacity(1));

    let creator = {
        let pool = pool.clone();
        thread::spawn(move || pool.acquire().unwrap())
    };

    // land inside the slow create so the only slot is reserved
    thread::sleep(Duration::from_millis(30));
    let waiter = pool.acquire().unwrap();

    let first = creator.join().unwrap();
    assert!(Arc::ptr_eq(&first.transport(), &waiter.transport()));
    assert_eq!(created.load(Ordering::SeqCst), 1);
    pool.close();
}

#[test]
fn exhausted_acquire_times_out() {
    let slow_factory = move || {
        thread::sleep(Duration::from_millis(150));
        Ok::<_, TransportError>(FakeTransport {
            serial: 0,
            closed: AtomicBool::new(false),
        })
    };
    let config = PoolConfig::new()
        .with_capacity(1)
        .with_acquire_timeout(Duration::from_millis(20));
    let pool = ConnectionPool::new(slow_factory, config);

    let creator = {
        let pool = pool.clone();
        thread::spawn(move || pool.acquire().unwrap())
    };

    thread::sleep(Duration::from_millis(30));
    let result = pool.acquire();
    assert!(matches!(result, Err(PoolError::PoolExhausted(_))));

    drop(creator.join().unwrap());
    pool.close();
}

#[test]
fn creation_failure_reaches_the_caller() {
    let factory = || Err::<FakeTransport, TransportError>("connection refused".into());
    let pool = ConnectionPool::new(factory, short_idle_config());

    match pool.acquire() {
        Err(PoolError::CreationFailed(source)) => {
            assert!(source.to_string().contains("connection refused"));
        }
        other => panic!("expected CreationFailed, got {:?}", other.map(|_| ())),
    }
    pool.close();
}

#[tokio::test(flavor = "multi_thread")]
async fn async_acquire_reuses_connections() {
    let (factory, created) = counting_factory();
    let pool = ConnectionPool::new(factory, short_idle_config());

    let first = pool.acquire_async().await.unwrap();
    let original = first.transport();
    let session = first.open_session().unwrap();

    let second = pool.acquire_async().await.unwrap();
    assert!(Arc::ptr_eq(&original, &second.transport()));
    assert_eq!(created.load(Ordering::SeqCst), 1);

    session.close();
    drop(first);
    drop(second);
    pool.close();
    assert!(matches!(pool.acquire_async().await, Err(PoolError::PoolClosed)));
}
