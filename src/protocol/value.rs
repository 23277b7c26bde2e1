//! Internal value encoding
//!
//! How the server stores a value together with its client flags:
//!
//! ```text
//! flags == 0:  ┌────────┬───────────────┐
//!              │ 0x00   │ value ...     │
//!              └────────┴───────────────┘
//! flags != 0:  ┌────────┬───────────┬───────────────┐
//!              │ 0x01   │ flags (4) │ value ...     │
//!              └────────┴───────────┴───────────────┘
//! ```

use bytes::{BufMut, Bytes, BytesMut};

use crate::error::{RelayError, Result};

const TAG_PLAIN: u8 = 0;
const TAG_FLAGGED: u8 = 1;

/// Pack a value and its flags into one blob
pub fn pack(value: &[u8], flags: u32) -> Bytes {
    let mut blob = with_capacity(flags, value.len());
    blob.put_slice(value);
    blob.freeze()
}

/// Allocate a blob for a value of `value_length` bytes with the prefix
/// already written, so the value can be copied straight in after it
pub fn with_capacity(flags: u32, value_length: usize) -> BytesMut {
    if flags == 0 {
        let mut blob = BytesMut::with_capacity(1 + value_length);
        blob.put_u8(TAG_PLAIN);
        blob
    } else {
        let mut blob = BytesMut::with_capacity(5 + value_length);
        blob.put_u8(TAG_FLAGGED);
        blob.put_u32(flags);
        blob
    }
}

/// Split a stored blob back into `(value, flags)`
///
/// Any tag other than the two known ones means the store is corrupt.
pub fn unpack(blob: &Bytes) -> Result<(Bytes, u32)> {
    match blob.first() {
        Some(&TAG_PLAIN) => Ok((blob.slice(1..), 0)),
        Some(&TAG_FLAGGED) if blob.len() >= 5 => {
            let flags = u32::from_be_bytes([blob[1], blob[2], blob[3], blob[4]]);
            Ok((blob.slice(5..), flags))
        }
        Some(&tag) => Err(RelayError::InvalidValue(format!(
            "unexpected tag 0x{:02x} in {}-byte value",
            tag,
            blob.len()
        ))),
        None => Err(RelayError::InvalidValue("empty internal value".to_string())),
    }
}
