//! Backend resolution
//!
//! Which backend owns a key.

use std::net::{SocketAddr, ToSocketAddrs};

use crate::error::{RelayError, Result};

/// Maps a key to the address of the backend that owns it
pub trait BackendResolver: Send + Sync {
    fn address_for(&self, key: &[u8]) -> SocketAddr;
}

impl<F> BackendResolver for F
where
    F: Fn(&[u8]) -> SocketAddr + Send + Sync,
{
    fn address_for(&self, key: &[u8]) -> SocketAddr {
        self(key)
    }
}

/// CRC32 of the key modulo the backend list
#[derive(Debug, Clone)]
pub struct HashResolver {
    backends: Vec<SocketAddr>,
}

impl HashResolver {
    pub fn new(backends: Vec<SocketAddr>) -> Result<Self> {
        if backends.is_empty() {
            return Err(RelayError::Config("no backends configured".to_string()));
        }
        Ok(Self { backends })
    }

    /// Resolve `host:port` strings; each must yield at least one address
    pub fn from_addrs<S: AsRef<str>>(addrs: &[S]) -> Result<Self> {
        let mut backends = Vec::with_capacity(addrs.len());
        for addr in addrs {
            let addr = addr.as_ref();
            let resolved = addr
                .to_socket_addrs()
                .map_err(|e| RelayError::Config(format!("bad backend address {}: {}", addr, e)))?
                .next()
                .ok_or_else(|| RelayError::Config(format!("{} resolved to nothing", addr)))?;
            backends.push(resolved);
        }
        Self::new(backends)
    }

    pub fn backends(&self) -> &[SocketAddr] {
        &self.backends
    }
}

impl BackendResolver for HashResolver {
    fn address_for(&self, key: &[u8]) -> SocketAddr {
        let slot = crc32fast::hash(key) as usize % self.backends.len();
        self.backends[slot]
    }
}
