//! Connection Pool Module
//!
//! A keyed pool of reusable connections.
//!
//! ## Behaviour
//! - `borrow` hands out an idle connection for the key if a valid one is
//!   queued, and otherwise creates a fresh one. It never waits for capacity
//!   and no population limit is enforced.
//! - `give_back` validates the connection and queues it, or closes it.
//! - A sweeper thread periodically evicts idle-too-long or invalid entries
//!   and drops per-key queues once they are empty.
//!
//! ## Concurrency
//! - Per-key queues are lock-free `SegQueue`s.
//! - The key -> queue map is a sharded `DashMap`; creating a queue goes
//!   through its entry API, so concurrent first returns for a key all land in
//!   the single queue that wins.
//! - The sweeper never holds a shard lock while validating or closing.

mod tcp;

pub use tcp::{BackendStream, TcpConnectionFactory};

use std::fmt::Debug;
use std::hash::Hash;
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam::channel::{self, Sender};
use crossbeam::queue::SegQueue;
use dashmap::DashMap;
use parking_lot::Mutex;

use crate::error::Result;

/// Creates, checks and disposes of pooled connections
pub trait ConnectionFactory: Send + Sync + 'static {
    type Key: Eq + Hash + Clone + Debug + Send + Sync + 'static;
    type Connection: Send + 'static;

    /// Open a new connection for `key`
    fn create(&self, key: &Self::Key) -> io::Result<Self::Connection>;

    /// Whether the connection may be (re)used
    fn validate(&self, conn: &Self::Connection) -> bool;

    /// Mark a connection that failed mid-use so `validate` rejects it
    fn invalidate(&self, _conn: &mut Self::Connection) {}

    /// Dispose of a connection that leaves the pool for good
    fn close(&self, conn: Self::Connection) {
        drop(conn);
    }
}

/// Floor for the sweep period; `crossbeam::channel::tick` spins on zero
pub const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(1);

/// Pool housekeeping settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolConfig {
    /// Period of the background sweep, at least [`MIN_SWEEP_INTERVAL`]
    pub sweep_interval: Duration,

    /// Idle time after which a queued connection is evicted
    pub time_to_live: Duration,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            sweep_interval: Duration::from_secs(60),
            time_to_live: Duration::from_secs(30),
        }
    }
}

impl PoolConfig {
    /// The sweep period actually used by the background thread
    pub fn sweep_period(&self) -> Duration {
        self.sweep_interval.max(MIN_SWEEP_INTERVAL)
    }
}

/// A queued connection and when it was last handed back
struct Pooled<C> {
    conn: C,
    last_access: Instant,
}

/// State shared between pool handles and the sweeper thread
struct Shared<F: ConnectionFactory> {
    factory: F,
    queues: DashMap<F::Key, SegQueue<Pooled<F::Connection>>>,
    time_to_live: Duration,
    closed: AtomicBool,
}

impl<F: ConnectionFactory> Shared<F> {
    /// Pop queued connections until a valid one turns up
    fn take_idle(&self, key: &F::Key) -> Option<F::Connection> {
        loop {
            let popped = self.queues.get(key).and_then(|queue| queue.pop())?;
            if self.factory.validate(&popped.conn) {
                return Some(popped.conn);
            }
            tracing::debug!("Discarding invalid pooled connection for {:?}", key);
            self.factory.close(popped.conn);
        }
    }

    /// Evict invalid or expired entries; returns how many were closed
    fn sweep(&self) -> usize {
        let now = Instant::now();
        let keys: Vec<F::Key> = self.queues.iter().map(|entry| entry.key().clone()).collect();
        let mut evicted = 0;

        for key in keys {
            // Drain under the shard lock, judge outside it
            let drained: Vec<Pooled<F::Connection>> = match self.queues.get(&key) {
                Some(queue) => {
                    let queued = queue.len();
                    (0..queued).map_while(|_| queue.pop()).collect()
                }
                None => continue,
            };

            let mut survivors = Vec::with_capacity(drained.len());
            for pooled in drained {
                let idle = now.saturating_duration_since(pooled.last_access);
                if idle < self.time_to_live && self.factory.validate(&pooled.conn) {
                    survivors.push(pooled);
                } else {
                    self.factory.close(pooled.conn);
                    evicted += 1;
                }
            }

            if survivors.is_empty() {
                self.queues.remove_if(&key, |_, queue| queue.is_empty());
            } else {
                let queue = self.queues.entry(key).or_default();
                for pooled in survivors {
                    queue.push(pooled);
                }
            }
        }

        evicted
    }

    /// Close everything still queued
    fn drain(&self) {
        let keys: Vec<F::Key> = self.queues.iter().map(|entry| entry.key().clone()).collect();
        for key in keys {
            if let Some((_, queue)) = self.queues.remove(&key) {
                while let Some(pooled) = queue.pop() {
                    self.factory.close(pooled.conn);
                }
            }
        }
    }
}

/// Background sweep thread handle
struct Sweeper {
    stop: Sender<()>,
    handle: JoinHandle<()>,
}

/// Concurrent keyed connection pool
pub struct ConnectionPool<F: ConnectionFactory> {
    shared: Arc<Shared<F>>,
    sweeper: Mutex<Option<Sweeper>>,
}

impl<F: ConnectionFactory> ConnectionPool<F> {
    /// Create a pool and start its sweeper thread
    pub fn new(name: &str, factory: F, config: PoolConfig) -> Result<Self> {
        let shared = Arc::new(Shared {
            factory,
            queues: DashMap::new(),
            time_to_live: config.time_to_live,
            closed: AtomicBool::new(false),
        });

        let sweeper = spawn_sweeper(name, Arc::clone(&shared), config.sweep_period())?;

        Ok(Self {
            shared,
            sweeper: Mutex::new(Some(sweeper)),
        })
    }

    /// Get a connection for `key`, reusing an idle one when possible
    ///
    /// Invalid idle connections are closed silently; only a failure to
    /// create a new connection is reported.
    pub fn borrow(&self, key: &F::Key) -> Result<F::Connection> {
        if let Some(conn) = self.shared.take_idle(key) {
            return Ok(conn);
        }
        tracing::debug!("Creating new pooled connection for {:?}", key);
        Ok(self.shared.factory.create(key)?)
    }

    /// Hand a borrowed connection back
    ///
    /// Connections that fail validation, or arrive after `close`, are closed
    /// instead of queued.
    pub fn give_back(&self, key: F::Key, conn: F::Connection) {
        if self.shared.closed.load(Ordering::Acquire) || !self.shared.factory.validate(&conn) {
            tracing::debug!("Closing returned connection for {:?}", key);
            self.shared.factory.close(conn);
            return;
        }

        let pooled = Pooled {
            conn,
            last_access: Instant::now(),
        };
        self.shared.queues.entry(key).or_default().push(pooled);
    }

    /// Run one sweep now; returns the number of evicted connections
    pub fn sweep(&self) -> usize {
        self.shared.sweep()
    }

    /// Idle connections queued for `key`
    pub fn idle_count(&self, key: &F::Key) -> usize {
        self.shared.queues.get(key).map_or(0, |queue| queue.len())
    }

    /// Idle connections across all keys
    pub fn total_idle(&self) -> usize {
        self.shared.queues.iter().map(|queue| queue.len()).sum()
    }

    /// Number of keys that currently have a queue
    pub fn key_count(&self) -> usize {
        self.shared.queues.len()
    }

    pub fn factory(&self) -> &F {
        &self.shared.factory
    }

    /// Stop the sweeper and close every idle connection
    pub fn close(&self) {
        if let Some(sweeper) = self.sweeper.lock().take() {
            let _ = sweeper.stop.send(());
            if sweeper.handle.join().is_err() {
                tracing::error!("Pool sweeper thread panicked");
            }
        }
        self.shared.closed.store(true, Ordering::Release);
        self.shared.drain();
    }
}

impl<F: ConnectionFactory> Drop for ConnectionPool<F> {
    fn drop(&mut self) {
        self.close();
    }
}

fn spawn_sweeper<F: ConnectionFactory>(
    name: &str,
    shared: Arc<Shared<F>>,
    interval: Duration,
) -> Result<Sweeper> {
    let (stop, stopped) = channel::bounded::<()>(1);
    let ticker = channel::tick(interval.max(MIN_SWEEP_INTERVAL));

    let handle = thread::Builder::new()
        .name(format!("pool-sweeper-{}", name))
        .spawn(move || loop {
            crossbeam::select! {
                recv(ticker) -> _ => {
                    let evicted = shared.sweep();
                    if evicted > 0 {
                        tracing::debug!("Pool sweep evicted {} connections", evicted);
                    }
                }
                recv(stopped) -> _ => break,
            }
        })?;

    Ok(Sweeper { stop, handle })
}
