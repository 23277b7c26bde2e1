//! Connection Handler
//!
//! Handles individual client connections.

use std::io::{BufWriter, ErrorKind, Read, Write};
use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;

use crate::error::{RelayError, Result};
use crate::protocol::{opcode_name, FrameAssembler};

use super::{Reply, RequestHandler};

/// Size of a single socket read
const READ_CHUNK_SIZE: usize = 16 * 1024;

/// Handles a single client connection
pub struct Connection<H: ?Sized> {
    /// TCP stream read half
    reader: TcpStream,

    /// TCP stream writer (buffered so quiet pipelines batch up)
    writer: BufWriter<TcpStream>,

    /// Bytes received but not yet assembled into packets
    buffer: BytesMut,

    assembler: FrameAssembler,

    /// Server-mode dispatcher or proxy router
    handler: Arc<H>,

    /// Peer address for logging
    peer_addr: String,
}

impl<H: RequestHandler + ?Sized> Connection<H> {
    /// Create a new connection handler
    pub fn new(stream: TcpStream, handler: Arc<H>) -> Result<Self> {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());

        // Disable Nagle's algorithm for low latency
        stream.set_nodelay(true)?;

        let read_stream = stream.try_clone()?;
        let write_stream = stream;

        Ok(Self {
            reader: read_stream,
            writer: BufWriter::new(write_stream),
            buffer: BytesMut::with_capacity(READ_CHUNK_SIZE),
            assembler: FrameAssembler::new(),
            handler,
            peer_addr,
        })
    }

    /// Configure connection timeouts; `None` leaves a direction unbounded
    pub fn set_timeouts(&mut self, read: Option<Duration>, write: Option<Duration>) -> Result<()> {
        self.reader.set_read_timeout(read)?;
        self.writer.get_ref().set_write_timeout(write)?;
        Ok(())
    }

    /// Drop the connection on any request announcing more than `bytes` of body
    pub fn set_max_body_length(&mut self, bytes: usize) {
        self.assembler = FrameAssembler::with_max_body(bytes);
    }

    /// Handle the connection (blocking until closed)
    ///
    /// Peer hang-ups and idle timeouts end the connection quietly; framing
    /// violations and handler failures are returned as errors.
    pub fn handle(&mut self) -> Result<()> {
        tracing::debug!("Connection established from {}", self.peer_addr);

        match self.serve() {
            Ok(()) => Ok(()),
            Err(e) if e.is_disconnect() => {
                tracing::debug!("Client {} disconnected: {}", self.peer_addr, e);
                Ok(())
            }
            Err(RelayError::Io(ref e))
                if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) =>
            {
                tracing::debug!("Read timeout for client {}", self.peer_addr);
                Ok(())
            }
            Err(e) => {
                // Push out whatever was already answered before closing
                let _ = self.writer.flush();
                Err(e)
            }
        }
    }

    fn serve(&mut self) -> Result<()> {
        let mut chunk = vec![0u8; READ_CHUNK_SIZE];

        loop {
            while let Some(packet) = self.assembler.decode(&mut self.buffer)? {
                tracing::trace!(
                    "Received {} from {}: {:?}",
                    opcode_name(packet.header.opcode),
                    self.peer_addr,
                    packet.header
                );

                let reply = self.handler.handle(packet)?;
                if !self.apply(reply)? {
                    tracing::debug!("Closing connection to {}", self.peer_addr);
                    return Ok(());
                }
            }

            // Everything answerable has been answered; flush before blocking
            self.writer.flush()?;

            let n = match self.reader.read(&mut chunk) {
                Ok(0) => {
                    if !self.buffer.is_empty() {
                        tracing::debug!(
                            "Client {} closed with {} bytes of partial frame",
                            self.peer_addr,
                            self.buffer.len()
                        );
                    }
                    return Ok(());
                }
                Ok(n) => n,
                Err(e) if e.kind() == ErrorKind::Interrupted => continue,
                Err(e) => return Err(e.into()),
            };
            self.buffer.extend_from_slice(&chunk[..n]);
        }
    }

    /// Act on a reply. Returns false once the connection should close.
    fn apply(&mut self, reply: Reply) -> Result<bool> {
        match reply {
            Reply::Silent => {}
            Reply::Send(bytes) => self.writer.write_all(&bytes)?,
            Reply::Flush => self.writer.flush()?,
            Reply::SendAndClose(bytes) => {
                self.writer.write_all(&bytes)?;
                self.writer.flush()?;
                return Ok(false);
            }
            Reply::Close => {
                self.writer.flush()?;
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// Get the peer address string
    pub fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}
