//! TCP backend connections for the pool

use std::io::{self, ErrorKind, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream};
use std::time::Duration;

use super::ConnectionFactory;

/// A pooled backend socket
#[derive(Debug)]
pub struct BackendStream {
    stream: TcpStream,

    /// Set once an exchange failed part-way; the stream is out of sync
    poisoned: bool,
}

impl BackendStream {
    pub fn new(stream: TcpStream) -> Self {
        Self {
            stream,
            poisoned: false,
        }
    }

    pub fn get_ref(&self) -> &TcpStream {
        &self.stream
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    /// Open, error-free, and with nothing unsolicited waiting to be read
    fn is_reusable(&self) -> bool {
        if self.poisoned {
            return false;
        }
        if !matches!(self.stream.take_error(), Ok(None)) {
            return false;
        }
        if self.stream.set_nonblocking(true).is_err() {
            return false;
        }

        let mut peeked = [0u8; 1];
        let idle = match self.stream.peek(&mut peeked) {
            // EOF: the backend hung up
            Ok(0) => false,
            // Leftover bytes would be read as the next response
            Ok(_) => false,
            Err(e) => e.kind() == ErrorKind::WouldBlock,
        };

        self.stream.set_nonblocking(false).is_ok() && idle
    }
}

impl Read for BackendStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.stream.read(buf)
    }
}

impl Write for BackendStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.stream.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream.flush()
    }
}

/// Opens blocking TCP connections to backend addresses
#[derive(Debug, Clone, Default)]
pub struct TcpConnectionFactory {
    /// Connect, read and write timeout; `None` blocks indefinitely
    timeout: Option<Duration>,
}

impl TcpConnectionFactory {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl ConnectionFactory for TcpConnectionFactory {
    type Key = SocketAddr;
    type Connection = BackendStream;

    fn create(&self, addr: &SocketAddr) -> io::Result<BackendStream> {
        let stream = match self.timeout {
            Some(timeout) => TcpStream::connect_timeout(addr, timeout),
            None => TcpStream::connect(addr),
        }
        .map_err(|e| {
            tracing::error!("Failed to connect to backend {}: {}", addr, e);
            e
        })?;

        stream.set_nodelay(true)?;
        stream.set_read_timeout(self.timeout)?;
        stream.set_write_timeout(self.timeout)?;
        Ok(BackendStream::new(stream))
    }

    fn validate(&self, conn: &BackendStream) -> bool {
        conn.is_reusable()
    }

    fn invalidate(&self, conn: &mut BackendStream) {
        conn.poisoned = true;
    }

    fn close(&self, conn: BackendStream) {
        let _ = conn.stream.shutdown(Shutdown::Both);
    }
}
