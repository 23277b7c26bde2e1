//! Protocol Module
//!
//! The memcached binary protocol as far as this crate speaks it.
//!
//! ## Packet Format
//! ```text
//! ┌─────────────────────────────┬─────────────────────────────────────┐
//! │      Header (24 bytes)      │  extras ‖ key ‖ value (TotalBody)   │
//! └─────────────────────────────┴─────────────────────────────────────┘
//! ```
//!
//! ### Magic
//! - 0x80: request
//! - 0x81: response
//!
//! ### Status Codes
//! - 0x0000: success
//! - 0x0001..0x0009: per-request failures (not found, exists, ...)
//! - 0x0081..0x0086: server side failures (not supported, internal error, ...)

mod header;
mod opcode;
mod status;
mod packet;
mod codec;
pub mod value;

pub use header::{
    peek_status, peek_total_body, Header, HEADER_SIZE, MAGIC_REQUEST, MAGIC_RESPONSE,
    STATUS_OFFSET, TOTAL_BODY_OFFSET,
};
pub use opcode::{opcode_name, Opcode};
pub use status::ResponseStatus;
pub use packet::{Packet, GET_RESPONSE_EXTRA_LENGTH, SET_EXTRA_LENGTH};
pub use codec::{
    read_frame, read_frame_limited, read_packet, write_packet, FrameAssembler,
    DEFAULT_MAX_BODY_LENGTH,
};
