//! Packet header
//!
//! The fixed 24-byte header shared by requests and responses.

use bytes::{Buf, BufMut};

use crate::error::{RelayError, Result};

use super::{Opcode, ResponseStatus};

/// Header size in bytes
pub const HEADER_SIZE: usize = 24;

/// Magic byte of a request packet
pub const MAGIC_REQUEST: u8 = 0x80;

/// Magic byte of a response packet
pub const MAGIC_RESPONSE: u8 = 0x81;

/// Offset of the status field
pub const STATUS_OFFSET: usize = 6;

/// Offset of the total body length field
pub const TOTAL_BODY_OFFSET: usize = 8;

/// Decoded packet header
///
/// The opcode is kept as the raw byte so that unknown opcodes survive a
/// decode/encode cycle untouched; use [`Header::command`] to interpret it.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Header {
    pub magic: u8,
    pub opcode: u8,
    pub key_length: u16,
    pub extra_length: u8,
    /// Reserved
    pub data_type: u8,
    /// Only meaningful in responses
    pub status: u16,
    /// `extra_length + key_length + value length`
    pub total_body: u32,
    /// Echoed verbatim in the response
    pub opaque: u32,
    pub cas: u64,
}

impl Header {
    /// A request header for `opcode` with an empty body
    pub fn request(opcode: Opcode) -> Self {
        Self {
            magic: MAGIC_REQUEST,
            opcode: opcode as u8,
            ..Self::default()
        }
    }

    /// The response header for a request: copies opcode and opaque
    pub fn response_to(request: &Header) -> Self {
        Self {
            magic: MAGIC_RESPONSE,
            opcode: request.opcode,
            opaque: request.opaque,
            ..Self::default()
        }
    }

    /// Response header for `request` carrying `status` and no body
    pub fn error_for(request: &Header, status: ResponseStatus) -> Self {
        let mut header = Self::response_to(request);
        header.status = status.code();
        header
    }

    /// Set the three segment lengths, keeping `total_body` consistent
    pub fn set_body_length(&mut self, extra_length: u8, key_length: u16, value_length: usize) {
        self.extra_length = extra_length;
        self.key_length = key_length;
        self.total_body = (value_length + extra_length as usize + key_length as usize) as u32;
    }

    /// The opcode, if it is one this crate knows about
    pub fn command(&self) -> Option<Opcode> {
        Opcode::from_u8(self.opcode)
    }

    /// Length of the value segment implied by the other lengths
    pub fn value_length(&self) -> Option<usize> {
        (self.total_body as usize)
            .checked_sub(self.extra_length as usize + self.key_length as usize)
    }

    pub fn is_request(&self) -> bool {
        self.magic == MAGIC_REQUEST
    }

    pub fn is_response(&self) -> bool {
        self.magic == MAGIC_RESPONSE
    }

    /// Write the header in network byte order
    pub fn encode<B: BufMut>(&self, dst: &mut B) {
        dst.put_u8(self.magic);
        dst.put_u8(self.opcode);
        dst.put_u16(self.key_length);
        dst.put_u8(self.extra_length);
        dst.put_u8(self.data_type);
        dst.put_u16(self.status);
        dst.put_u32(self.total_body);
        dst.put_u32(self.opaque);
        dst.put_u64(self.cas);
    }

    /// Encode into a fixed array
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        self.encode(&mut &mut out[..]);
        out
    }

    /// Read a header, advancing `src` by exactly [`HEADER_SIZE`] bytes
    ///
    /// Callers are expected to check availability first; a short buffer is a
    /// framing error and leaves `src` untouched.
    pub fn decode<B: Buf>(src: &mut B) -> Result<Self> {
        if src.remaining() < HEADER_SIZE {
            return Err(RelayError::Protocol(format!(
                "Incomplete header: expected {} bytes, got {}",
                HEADER_SIZE,
                src.remaining()
            )));
        }

        Ok(Self {
            magic: src.get_u8(),
            opcode: src.get_u8(),
            key_length: src.get_u16(),
            extra_length: src.get_u8(),
            data_type: src.get_u8(),
            status: src.get_u16(),
            total_body: src.get_u32(),
            opaque: src.get_u32(),
            cas: src.get_u64(),
        })
    }
}

/// Read `total_body` from a raw header without decoding the rest
pub fn peek_total_body(raw: &[u8]) -> Option<u32> {
    let field = raw.get(TOTAL_BODY_OFFSET..TOTAL_BODY_OFFSET + 4)?;
    Some(u32::from_be_bytes([field[0], field[1], field[2], field[3]]))
}

/// Read `status` from a raw header without decoding the rest
pub fn peek_status(raw: &[u8]) -> Option<u16> {
    let field = raw.get(STATUS_OFFSET..STATUS_OFFSET + 2)?;
    Some(u16::from_be_bytes([field[0], field[1]]))
}
