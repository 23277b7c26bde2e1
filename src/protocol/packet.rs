//! Packet definitions
//!
//! A header plus the body it announces, partitioned as
//! `[extras][key][value]`.

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{RelayError, Result};

use super::{Header, Opcode, HEADER_SIZE};

/// Extras length of a SET request (flags + expiry)
pub const SET_EXTRA_LENGTH: u8 = 8;

/// Extras length of a GET response (flags)
pub const GET_RESPONSE_EXTRA_LENGTH: u8 = 4;

/// One request or response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub header: Header,

    /// Exactly `header.total_body` bytes
    pub body: Bytes,
}

impl Packet {
    pub fn new(header: Header, body: Bytes) -> Self {
        Self { header, body }
    }

    /// A header-only packet
    pub fn header_only(header: Header) -> Self {
        Self {
            header,
            body: Bytes::new(),
        }
    }

    /// Build a GET-family request
    ///
    /// Fails if the key does not fit the 16-bit key length field.
    pub fn get_request(opcode: Opcode, key: &[u8], opaque: u32) -> Result<Self> {
        let key_length = checked_lengths(0, key, 0)?;
        let mut header = Header::request(opcode);
        header.opaque = opaque;
        header.set_body_length(0, key_length, 0);
        Ok(Self::new(header, Bytes::copy_from_slice(key)))
    }

    /// Build a SET-family request
    pub fn set_request(
        opcode: Opcode,
        key: &[u8],
        value: &[u8],
        flags: u32,
        expiry: u32,
        opaque: u32,
    ) -> Result<Self> {
        let key_length = checked_lengths(SET_EXTRA_LENGTH, key, value.len())?;
        let mut header = Header::request(opcode);
        header.opaque = opaque;
        header.set_body_length(SET_EXTRA_LENGTH, key_length, value.len());

        let mut body = BytesMut::with_capacity(header.total_body as usize);
        body.put_u32(flags);
        body.put_u32(expiry);
        body.put_slice(key);
        body.put_slice(value);
        Ok(Self::new(header, body.freeze()))
    }

    /// The extras segment, `None` if the header lengths overrun the body
    pub fn extras(&self) -> Option<&[u8]> {
        self.body.get(..self.header.extra_length as usize)
    }

    /// The key segment, `None` if the header lengths overrun the body
    pub fn key(&self) -> Option<&[u8]> {
        let start = self.header.extra_length as usize;
        self.body.get(start..start + self.header.key_length as usize)
    }

    /// The value segment, `None` if the header lengths overrun the body
    pub fn value(&self) -> Option<&[u8]> {
        let start = self.header.extra_length as usize + self.header.key_length as usize;
        self.body.get(start..)
    }

    /// Wire size of this packet
    pub fn encoded_len(&self) -> usize {
        HEADER_SIZE + self.body.len()
    }

    /// Encode header and body into one contiguous buffer
    pub fn to_bytes(&self) -> Bytes {
        let mut out = BytesMut::with_capacity(self.encoded_len());
        self.header.encode(&mut out);
        out.put_slice(&self.body);
        out.freeze()
    }
}

/// Key length as the header stores it, once the whole body fits the header too
fn checked_lengths(extra: u8, key: &[u8], value_len: usize) -> Result<u16> {
    let key_length = u16::try_from(key.len()).map_err(|_| {
        RelayError::InvalidValue(format!(
            "Key of {} bytes exceeds the {} byte limit",
            key.len(),
            u16::MAX
        ))
    })?;

    let total = extra as usize + key.len() + value_len;
    if u32::try_from(total).is_err() {
        return Err(RelayError::InvalidValue(format!(
            "Body of {} bytes does not fit a frame",
            total
        )));
    }

    Ok(key_length)
}
