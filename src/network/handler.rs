//! Request handler seam
//!
//! Both the local command dispatcher and the proxy router plug into the
//! connection loop through [`RequestHandler`].

use bytes::Bytes;

use crate::error::Result;
use crate::protocol::{Header, Opcode, Packet, ResponseStatus};

/// What the connection should do after a request was handled
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reply {
    /// Nothing goes on the wire
    Silent,

    /// Queue these bytes for the client
    Send(Bytes),

    /// Queue these bytes, flush, then close the connection
    SendAndClose(Bytes),

    /// Flush what is queued, no response of its own
    Flush,

    /// Flush what is queued, then close the connection
    Close,
}

impl Reply {
    /// Send an encoded packet
    pub fn packet(packet: &Packet) -> Self {
        Reply::Send(packet.to_bytes())
    }

    /// Send a header-only status response for `request`
    pub fn status(request: &Header, status: ResponseStatus) -> Self {
        Reply::Send(Bytes::copy_from_slice(
            &Header::error_for(request, status).to_bytes(),
        ))
    }

    /// INVALID_ARGUMENTS for a request whose lengths overrun its body
    ///
    /// Always sent, under the non-quiet form of `opcode`.
    pub fn invalid_arguments(opcode: Opcode, request: &Header) -> Self {
        let mut header = Header::error_for(request, ResponseStatus::InvalidArguments);
        header.opcode = opcode.sync_form() as u8;
        Reply::Send(Bytes::copy_from_slice(&header.to_bytes()))
    }

    /// Bytes this reply puts on the wire, if any
    pub fn bytes(&self) -> Option<&Bytes> {
        match self {
            Reply::Send(bytes) | Reply::SendAndClose(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// The same reply, followed by closing the connection
    pub fn and_close(self) -> Self {
        match self {
            Reply::Send(bytes) => Reply::SendAndClose(bytes),
            Reply::Silent | Reply::Flush => Reply::Close,
            other => other,
        }
    }

    pub fn closes_connection(&self) -> bool {
        matches!(self, Reply::SendAndClose(_) | Reply::Close)
    }
}

/// Turns one request packet into a [`Reply`]
///
/// Called sequentially per connection and concurrently across connections.
/// An `Err` is connection-fatal: the connection flushes and closes.
pub trait RequestHandler: Send + Sync {
    fn handle(&self, packet: Packet) -> Result<Reply>;
}
