//! Proxy Router
//!
//! Relays key-addressed requests to the backend that owns the key.
//!
//! ## Forwarding
//! 1. Re-encode the request (header + full body) into one buffer
//! 2. Resolve the backend from the key and borrow a pooled connection
//! 3. Write the buffer, then read one complete response frame
//! 4. Relay the frame verbatim, unless a quiet mutation succeeded
//! 5. Return the connection to the pool, whatever happened

use std::io::{Read, Write};
use std::net::SocketAddr;

use bytes::Bytes;

use crate::config::Config;
use crate::error::{RelayError, Result};
use crate::network::{Reply, RequestHandler};
use crate::pool::{ConnectionFactory, ConnectionPool, TcpConnectionFactory};
use crate::protocol::{
    opcode_name, peek_status, read_frame, Opcode, Packet, ResponseStatus, MAGIC_RESPONSE,
};

use super::BackendResolver;

/// Name given to the proxy's connection pool (and its sweeper thread)
const POOL_NAME: &str = "proxy";

/// Forwards requests to sharded backends over pooled connections
pub struct ProxyRouter<R, F = TcpConnectionFactory>
where
    F: ConnectionFactory<Key = SocketAddr>,
{
    resolver: R,
    pool: ConnectionPool<F>,
}

impl<R: BackendResolver> ProxyRouter<R, TcpConnectionFactory> {
    /// Router over TCP backends, pool and timeouts taken from `config`
    pub fn from_config(resolver: R, config: &Config) -> Result<Self> {
        let factory = TcpConnectionFactory::new(config.backend_timeout());
        let pool = ConnectionPool::new(POOL_NAME, factory, config.pool_config())?;
        Ok(Self::new(resolver, pool))
    }
}

impl<R, F> ProxyRouter<R, F>
where
    R: BackendResolver,
    F: ConnectionFactory<Key = SocketAddr>,
    F::Connection: Read + Write,
{
    pub fn new(resolver: R, pool: ConnectionPool<F>) -> Self {
        Self { resolver, pool }
    }

    pub fn pool(&self) -> &ConnectionPool<F> {
        &self.pool
    }

    /// Decide what to do with one client request
    pub fn route(&self, packet: Packet) -> Reply {
        tracing::debug!("Received request: {:?}", packet.header);

        match packet.header.command() {
            // those that must have a key
            Some(
                opcode @ (Opcode::Get
                | Opcode::GetK
                | Opcode::GetQ
                | Opcode::GetKQ
                | Opcode::Set
                | Opcode::SetQ),
            ) => match packet.key() {
                Some(key) => self.forward(opcode, &packet, key),
                None => {
                    tracing::error!("Illegal key length in {} request", opcode);
                    Reply::invalid_arguments(opcode, &packet.header)
                }
            },
            Some(Opcode::Noop) => Reply::Flush,
            Some(Opcode::QuitQ) => Reply::Close,
            Some(Opcode::Quit) => {
                tracing::warn!("Unsupported opcode = QUIT");
                Reply::status(&packet.header, ResponseStatus::NotSupported).and_close()
            }
            _ => {
                tracing::warn!("Unsupported opcode = {}", opcode_name(packet.header.opcode));
                Reply::status(&packet.header, ResponseStatus::NotSupported)
            }
        }
    }

    fn forward(&self, opcode: Opcode, request: &Packet, key: &[u8]) -> Reply {
        let outbound = request.to_bytes();
        let addr = self.resolver.address_for(key);

        let mut conn = match self.pool.borrow(&addr) {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!("No connection to backend {}: {}", addr, e);
                return Reply::status(&request.header, ResponseStatus::InternalError);
            }
        };

        let reply = match exchange(&mut conn, &outbound) {
            Ok(frame) => relay(opcode, frame, key),
            Err(e) => {
                tracing::error!(
                    "Backend {} failed during {} for key '{}': {}",
                    addr,
                    opcode,
                    String::from_utf8_lossy(key),
                    e
                );
                self.pool.factory().invalidate(&mut conn);
                Reply::status(&request.header, ResponseStatus::InternalError)
            }
        };

        self.pool.give_back(addr, conn);
        reply
    }
}

impl<R, F> RequestHandler for ProxyRouter<R, F>
where
    R: BackendResolver,
    F: ConnectionFactory<Key = SocketAddr>,
    F::Connection: Read + Write,
{
    fn handle(&self, packet: Packet) -> Result<Reply> {
        Ok(self.route(packet))
    }
}

/// Send the request and read back exactly one response frame
fn exchange<C: Read + Write>(conn: &mut C, outbound: &[u8]) -> Result<Bytes> {
    conn.write_all(outbound)?;
    conn.flush()?;

    let frame = read_frame(conn)?;
    if frame[0] != MAGIC_RESPONSE {
        return Err(RelayError::Backend(format!(
            "response frame has magic 0x{:02x}",
            frame[0]
        )));
    }
    Ok(frame)
}

/// Quiet mutations that succeeded are not relayed; everything else is
fn relay(opcode: Opcode, frame: Bytes, key: &[u8]) -> Reply {
    if opcode.suppresses_success() && peek_status(&frame) == Some(0) {
        return Reply::Silent;
    }

    tracing::debug!(
        "Relaying {} response ({} bytes) for key '{}'",
        opcode,
        frame.len(),
        String::from_utf8_lossy(key)
    );
    Reply::Send(frame)
}
