//! Connection Pool Tests
//!
//! These tests verify:
//! - Borrowing creates on an empty pool and reuses returned connections
//! - Invalid connections are never handed out
//! - Sweeps evict expired and invalid connections
//! - Concurrent first returns for a key share one queue
//! - Closing drains the pool

use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use memrelay::pool::{ConnectionFactory, ConnectionPool, PoolConfig, MIN_SWEEP_INTERVAL};

// =============================================================================
// Mock Factory
// =============================================================================

#[derive(Default)]
struct Counters {
    created: AtomicUsize,
    closed: AtomicUsize,
    fail_create: AtomicBool,
}

struct MockFactory {
    counters: Arc<Counters>,
}

#[derive(Debug)]
struct MockConn {
    id: usize,
    alive: Arc<AtomicBool>,
    poisoned: bool,
}

impl ConnectionFactory for MockFactory {
    type Key = &'static str;
    type Connection = MockConn;

    fn create(&self, _key: &&'static str) -> io::Result<MockConn> {
        if self.counters.fail_create.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        }
        let id = self.counters.created.fetch_add(1, Ordering::SeqCst);
        Ok(MockConn {
            id,
            alive: Arc::new(AtomicBool::new(true)),
            poisoned: false,
        })
    }

    fn validate(&self, conn: &MockConn) -> bool {
        !conn.poisoned && conn.alive.load(Ordering::SeqCst)
    }

    fn invalidate(&self, conn: &mut MockConn) {
        conn.poisoned = true;
    }

    fn close(&self, _conn: MockConn) {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
    }
}

// =============================================================================
// Helper Functions
// =============================================================================

/// A pool whose background sweep never fires during a test
fn pool_with_ttl(ttl: Duration) -> (ConnectionPool<MockFactory>, Arc<Counters>) {
    let counters = Arc::new(Counters::default());
    let factory = MockFactory {
        counters: Arc::clone(&counters),
    };
    let config = PoolConfig {
        sweep_interval: Duration::from_secs(3600),
        time_to_live: ttl,
    };
    let pool = ConnectionPool::new("test", factory, config).unwrap();
    (pool, counters)
}

fn pool() -> (ConnectionPool<MockFactory>, Arc<Counters>) {
    pool_with_ttl(Duration::from_secs(60))
}

// =============================================================================
// Borrow / Return Tests
// =============================================================================

#[test]
fn test_borrow_from_empty_pool_creates() {
    let (pool, counters) = pool();

    let conn = pool.borrow(&"a").unwrap();
    assert_eq!(conn.id, 0);
    assert_eq!(counters.created.load(Ordering::SeqCst), 1);
    assert_eq!(pool.idle_count(&"a"), 0);
}

#[test]
fn test_returned_connection_is_reused() {
    let (pool, counters) = pool();

    let conn = pool.borrow(&"a").unwrap();
    pool.give_back("a", conn);
    assert_eq!(pool.idle_count(&"a"), 1);

    let again = pool.borrow(&"a").unwrap();
    assert_eq!(again.id, 0);
    assert_eq!(counters.created.load(Ordering::SeqCst), 1);
    assert_eq!(pool.idle_count(&"a"), 0);
}

#[test]
fn test_keys_are_independent() {
    let (pool, counters) = pool();

    let a = pool.borrow(&"a").unwrap();
    pool.give_back("a", a);

    let b = pool.borrow(&"b").unwrap();
    assert_eq!(b.id, 1);
    assert_eq!(counters.created.load(Ordering::SeqCst), 2);
    assert_eq!(pool.idle_count(&"a"), 1);
}

#[test]
fn test_invalid_return_is_closed() {
    let (pool, counters) = pool();

    let conn = pool.borrow(&"a").unwrap();
    conn.alive.store(false, Ordering::SeqCst);
    pool.give_back("a", conn);

    assert_eq!(pool.idle_count(&"a"), 0);
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);

    let fresh = pool.borrow(&"a").unwrap();
    assert_eq!(fresh.id, 1);
}

#[test]
fn test_invalidated_connection_is_closed_on_return() {
    let (pool, counters) = pool();

    let mut conn = pool.borrow(&"a").unwrap();
    pool.factory().invalidate(&mut conn);
    pool.give_back("a", conn);

    assert_eq!(pool.total_idle(), 0);
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_connection_dying_while_idle_is_skipped() {
    let (pool, counters) = pool();

    let first = pool.borrow(&"a").unwrap();
    let second = pool.borrow(&"a").unwrap();
    let first_alive = Arc::clone(&first.alive);
    pool.give_back("a", first);
    pool.give_back("a", second);

    first_alive.store(false, Ordering::SeqCst);

    let conn = pool.borrow(&"a").unwrap();
    assert_eq!(conn.id, 1);
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    assert_eq!(counters.created.load(Ordering::SeqCst), 2);
}

#[test]
fn test_create_failure_is_reported() {
    let (pool, counters) = pool();
    counters.fail_create.store(true, Ordering::SeqCst);

    assert!(pool.borrow(&"a").is_err());
}

// =============================================================================
// Sweep Tests
// =============================================================================

#[test]
fn test_sweep_evicts_expired() {
    let (pool, counters) = pool_with_ttl(Duration::from_millis(10));

    let conns: Vec<MockConn> = (0..3).map(|_| pool.borrow(&"a").unwrap()).collect();
    for conn in conns {
        pool.give_back("a", conn);
    }
    assert_eq!(pool.idle_count(&"a"), 3);

    thread::sleep(Duration::from_millis(50));

    assert_eq!(pool.sweep(), 3);
    assert_eq!(pool.total_idle(), 0);
    assert_eq!(pool.key_count(), 0);
    assert_eq!(counters.closed.load(Ordering::SeqCst), 3);
}

#[test]
fn test_sweep_keeps_fresh_connections() {
    let (pool, _counters) = pool();

    let a = pool.borrow(&"a").unwrap();
    let b = pool.borrow(&"b").unwrap();
    pool.give_back("a", a);
    pool.give_back("b", b);

    assert_eq!(pool.sweep(), 0);
    assert_eq!(pool.total_idle(), 2);
    assert_eq!(pool.key_count(), 2);
}

#[test]
fn test_sweep_evicts_invalid_fresh_connections() {
    let (pool, counters) = pool();

    let dead = pool.borrow(&"a").unwrap();
    let live = pool.borrow(&"a").unwrap();
    let dead_flag = Arc::clone(&dead.alive);
    pool.give_back("a", dead);
    pool.give_back("a", live);
    dead_flag.store(false, Ordering::SeqCst);

    assert_eq!(pool.sweep(), 1);
    assert_eq!(pool.idle_count(&"a"), 1);
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
    assert_eq!(pool.borrow(&"a").unwrap().id, 1);
}

#[test]
fn test_background_sweeper_runs() {
    let counters = Arc::new(Counters::default());
    let factory = MockFactory {
        counters: Arc::clone(&counters),
    };
    let config = PoolConfig {
        sweep_interval: Duration::from_millis(10),
        time_to_live: Duration::from_millis(10),
    };
    let pool = ConnectionPool::new("background", factory, config).unwrap();

    let conn = pool.borrow(&"a").unwrap();
    pool.give_back("a", conn);

    let mut waited = 0;
    while pool.total_idle() > 0 && waited < 2000 {
        thread::sleep(Duration::from_millis(10));
        waited += 10;
    }

    assert_eq!(pool.total_idle(), 0);
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_sweep_period_has_floor() {
    let zero = PoolConfig {
        sweep_interval: Duration::ZERO,
        time_to_live: Duration::from_secs(1),
    };
    assert_eq!(zero.sweep_period(), MIN_SWEEP_INTERVAL);

    let slow = PoolConfig {
        sweep_interval: Duration::from_secs(5),
        ..zero
    };
    assert_eq!(slow.sweep_period(), Duration::from_secs(5));
}

#[test]
fn test_zero_sweep_interval_still_sweeps_and_closes() {
    let counters = Arc::new(Counters::default());
    let factory = MockFactory {
        counters: Arc::clone(&counters),
    };
    let config = PoolConfig {
        sweep_interval: Duration::ZERO,
        time_to_live: Duration::from_millis(10),
    };
    let pool = ConnectionPool::new("zero-interval", factory, config).unwrap();

    let conn = pool.borrow(&"a").unwrap();
    pool.give_back("a", conn);

    let mut waited = 0;
    while pool.total_idle() > 0 && waited < 2000 {
        thread::sleep(Duration::from_millis(10));
        waited += 10;
    }
    assert_eq!(pool.total_idle(), 0);

    // The sweeper thread still answers the stop signal
    pool.close();
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
}

// =============================================================================
// Concurrency Tests
// =============================================================================

#[test]
fn test_concurrent_first_returns_share_one_queue() {
    let (pool, _counters) = pool();
    let pool = Arc::new(pool);
    let threads = 8;
    let barrier = Arc::new(Barrier::new(threads));

    let conns: Vec<MockConn> = (0..threads).map(|_| pool.borrow(&"hot").unwrap()).collect();

    let handles: Vec<_> = conns
        .into_iter()
        .map(|conn| {
            let pool = Arc::clone(&pool);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                pool.give_back("hot", conn);
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    assert_eq!(pool.key_count(), 1);
    assert_eq!(pool.idle_count(&"hot"), threads);
}

#[test]
fn test_concurrent_borrow_and_return() {
    let (pool, counters) = pool();
    let pool = Arc::new(pool);

    let handles: Vec<_> = (0..4)
        .map(|_| {
            let pool = Arc::clone(&pool);
            thread::spawn(move || {
                for _ in 0..100 {
                    let conn = pool.borrow(&"k").unwrap();
                    pool.give_back("k", conn);
                }
            })
        })
        .collect();
    for handle in handles {
        handle.join().unwrap();
    }

    let created = counters.created.load(Ordering::SeqCst);
    assert!((1..=4).contains(&created), "created {}", created);
    assert_eq!(pool.idle_count(&"k"), created);
}

// =============================================================================
// Close Tests
// =============================================================================

#[test]
fn test_close_drains_pool() {
    let (pool, counters) = pool();

    let conns: Vec<MockConn> = (0..3).map(|_| pool.borrow(&"a").unwrap()).collect();
    for conn in conns {
        pool.give_back("a", conn);
    }
    let other = pool.borrow(&"b").unwrap();
    pool.give_back("b", other);

    pool.close();

    assert_eq!(pool.total_idle(), 0);
    assert_eq!(pool.key_count(), 0);
    assert_eq!(counters.closed.load(Ordering::SeqCst), 4);
}

#[test]
fn test_return_after_close_is_closed() {
    let (pool, counters) = pool();
    let conn = pool.borrow(&"a").unwrap();

    pool.close();
    pool.give_back("a", conn);

    assert_eq!(pool.total_idle(), 0);
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_drop_closes_idle_connections() {
    let (pool, counters) = pool();
    let conn = pool.borrow(&"a").unwrap();
    pool.give_back("a", conn);

    drop(pool);
    assert_eq!(counters.closed.load(Ordering::SeqCst), 1);
}
