//! TCP Server
//!
//! Accepts connections and runs each one on its own worker thread.

use std::io::ErrorKind;
use std::net::{Shutdown, SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use dashmap::DashMap;

use crate::config::Config;
use crate::error::{RelayError, Result};

use super::{Connection, RequestHandler};

/// How long the accept loop sleeps when no connection is pending
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Cloneable flag that stops a running [`Server`]
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle {
    flag: Arc<AtomicBool>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_shutdown(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

/// TCP server generic over what it does with each request
pub struct Server<H: RequestHandler + ?Sized> {
    config: Config,
    handler: Arc<H>,
    listener: TcpListener,
    shutdown: ShutdownHandle,

    /// Live client sockets, so shutdown can unblock their threads
    clients: Arc<DashMap<u64, TcpStream>>,
    next_client_id: AtomicU64,
    active: Arc<AtomicUsize>,
}

impl<H: RequestHandler + ?Sized + 'static> Server<H> {
    /// Bind the listen address from `config`
    pub fn bind(config: Config, handler: Arc<H>) -> Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr).map_err(|e| {
            RelayError::Config(format!("cannot listen on {}: {}", config.listen_addr, e))
        })?;
        listener.set_nonblocking(true)?;

        Ok(Self {
            config,
            handler,
            listener,
            shutdown: ShutdownHandle::default(),
            clients: Arc::new(DashMap::new()),
            next_client_id: AtomicU64::new(0),
            active: Arc::new(AtomicUsize::new(0)),
        })
    }

    /// The bound address (useful when listening on port 0)
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Number of client connections currently being served
    pub fn active_connections(&self) -> usize {
        self.active.load(Ordering::Acquire)
    }

    /// Run the accept loop until shutdown is signalled (blocking)
    pub fn run(&self) -> Result<()> {
        tracing::info!("Listening on {}", self.local_addr()?);

        while !self.shutdown.is_shutdown() {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    if let Err(e) = self.spawn_connection(stream, addr) {
                        tracing::warn!("Failed to start connection from {}: {}", addr, e);
                    }
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => {
                    tracing::warn!("Accept failed: {}", e);
                    thread::sleep(ACCEPT_POLL_INTERVAL);
                }
            }
        }

        self.close_clients();
        tracing::info!("Server stopped accepting connections");
        Ok(())
    }

    /// Signal the accept loop to stop
    pub fn shutdown(&self) {
        self.shutdown.shutdown();
    }

    fn spawn_connection(&self, stream: TcpStream, addr: SocketAddr) -> Result<()> {
        if self.active.load(Ordering::Acquire) >= self.config.max_connections {
            tracing::warn!(
                "Rejecting {}: {} connections already open",
                addr,
                self.config.max_connections
            );
            return Ok(());
        }

        stream.set_nonblocking(false)?;

        let registered = stream.try_clone()?;
        let mut connection = Connection::new(stream, Arc::clone(&self.handler))?;
        connection.set_timeouts(self.config.read_timeout(), self.config.write_timeout())?;
        connection.set_max_body_length(self.config.max_body_length);

        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        self.clients.insert(id, registered);

        let guard = ActiveGuard::new(id, Arc::clone(&self.active), Arc::clone(&self.clients));
        thread::Builder::new()
            .name(format!("memrelay-conn-{}", id))
            .spawn(move || {
                let _guard = guard;
                if let Err(e) = connection.handle() {
                    tracing::warn!("Connection {} closed with error: {}", addr, e);
                }
            })?;

        Ok(())
    }

    fn close_clients(&self) {
        for entry in self.clients.iter() {
            let _ = entry.value().shutdown(Shutdown::Both);
        }
    }
}

/// Tracks one live connection; unregisters it when the worker exits
struct ActiveGuard {
    id: u64,
    active: Arc<AtomicUsize>,
    clients: Arc<DashMap<u64, TcpStream>>,
}

impl ActiveGuard {
    fn new(id: u64, active: Arc<AtomicUsize>, clients: Arc<DashMap<u64, TcpStream>>) -> Self {
        active.fetch_add(1, Ordering::AcqRel);
        Self {
            id,
            active,
            clients,
        }
    }
}

impl Drop for ActiveGuard {
    fn drop(&mut self) {
        self.clients.remove(&self.id);
        self.active.fetch_sub(1, Ordering::AcqRel);
    }
}
