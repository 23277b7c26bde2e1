//! Protocol codec
//!
//! Frame assembly for incoming byte streams and blocking frame I/O helpers.
//!
//! ## Wire Format
//! ```text
//! ┌───────┬────────┬─────────┬─────────┬──────────┬────────┬────────────┬────────┬─────────┐
//! │Magic 1│Opcode 1│KeyLen 2 │ExtLen 1 │DataType 1│Status 2│TotalBody 4 │Opaque 4│ CAS 8   │
//! ├───────┴────────┴─────────┴─────────┴──────────┴────────┴────────────┴────────┴─────────┤
//! │                         body = extras ‖ key ‖ value  (TotalBody bytes)                   │
//! └──────────────────────────────────────────────────────────────────────────────────────────┘
//! ```
//! All integers are big-endian.

use std::io::{Read, Write};

use bytes::{Bytes, BytesMut};

use crate::error::{RelayError, Result};

use super::header::peek_total_body;
use super::{Header, Packet, HEADER_SIZE, MAGIC_REQUEST};

/// Largest body a frame may declare before it is rejected unread
pub const DEFAULT_MAX_BODY_LENGTH: usize = 16 * 1024 * 1024;

/// Body bytes pulled off a blocking stream per read
const BODY_CHUNK_SIZE: usize = 16 * 1024;

/// Cuts complete request packets out of a growing receive buffer
///
/// Holds no state of its own: everything not yet consumed stays in the
/// caller's buffer between calls. The buffer only grows as bytes arrive;
/// a declared `total_body` is never allocated up front.
#[derive(Debug, Clone, Copy)]
pub struct FrameAssembler {
    max_body: usize,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::with_max_body(DEFAULT_MAX_BODY_LENGTH)
    }

    /// Reject frames whose header announces more than `max_body` bytes
    pub fn with_max_body(max_body: usize) -> Self {
        Self { max_body }
    }

    pub fn max_body(&self) -> usize {
        self.max_body
    }

    /// Take one packet off the front of `src`
    ///
    /// Returns `Ok(None)` until `HEADER_SIZE + total_body` bytes are
    /// buffered. A non-request magic byte or an oversized body is a
    /// protocol error; the connection is not recoverable after that.
    pub fn decode(&self, src: &mut BytesMut) -> Result<Option<Packet>> {
        if src.len() < HEADER_SIZE {
            return Ok(None);
        }

        let total_body = match peek_total_body(&src[..]) {
            Some(len) => check_body_length(len as usize, self.max_body)?,
            None => return Ok(None),
        };
        let required = HEADER_SIZE + total_body;
        if src.len() < required {
            return Ok(None);
        }

        let mut frame = src.split_to(required);
        let header = Header::decode(&mut &frame[..HEADER_SIZE])?;

        if header.magic != MAGIC_REQUEST {
            return Err(RelayError::Protocol(format!(
                "Invalid magic: 0x{:02x}",
                header.magic
            )));
        }

        let body = frame.split_off(HEADER_SIZE).freeze();
        Ok(Some(Packet::new(header, body)))
    }
}

fn check_body_length(total_body: usize, max_body: usize) -> Result<usize> {
    if total_body > max_body {
        return Err(RelayError::Protocol(format!(
            "Body of {} bytes exceeds the {} byte limit",
            total_body, max_body
        )));
    }
    Ok(total_body)
}

// =============================================================================
// Stream-based I/O helpers
// =============================================================================

/// Read one raw frame (header and body, undecoded) from a blocking stream
///
/// Bodies larger than [`DEFAULT_MAX_BODY_LENGTH`] are rejected.
pub fn read_frame<R: Read>(reader: &mut R) -> Result<Bytes> {
    read_frame_limited(reader, DEFAULT_MAX_BODY_LENGTH)
}

/// Read one raw frame whose body may be at most `max_body` bytes
///
/// The body is read in fixed-size chunks, so memory tracks the bytes that
/// actually arrived. End-of-stream or any I/O error before the frame is
/// complete fails the whole read.
pub fn read_frame_limited<R: Read>(reader: &mut R, max_body: usize) -> Result<Bytes> {
    let mut header = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header)?;

    let total_body = check_body_length(peek_total_body(&header).unwrap_or(0) as usize, max_body)?;

    let mut frame = BytesMut::with_capacity(HEADER_SIZE + total_body.min(BODY_CHUNK_SIZE));
    frame.extend_from_slice(&header);

    let mut chunk = [0u8; BODY_CHUNK_SIZE];
    let mut remaining = total_body;
    while remaining > 0 {
        let n = remaining.min(BODY_CHUNK_SIZE);
        reader.read_exact(&mut chunk[..n])?;
        frame.extend_from_slice(&chunk[..n]);
        remaining -= n;
    }

    Ok(frame.freeze())
}

/// Read and decode one packet of either direction from a blocking stream
pub fn read_packet<R: Read>(reader: &mut R) -> Result<Packet> {
    let mut frame = read_frame(reader)?;
    let header = Header::decode(&mut &frame[..HEADER_SIZE])?;
    let body = frame.split_off(HEADER_SIZE);
    Ok(Packet::new(header, body))
}

/// Write a packet to a stream and flush it
pub fn write_packet<W: Write>(writer: &mut W, packet: &Packet) -> Result<()> {
    writer.write_all(&packet.to_bytes())?;
    writer.flush()?;
    Ok(())
}
