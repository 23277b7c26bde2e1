//! Command Dispatcher
//!
//! Server mode: answers requests from a local [`Store`].
//!
//! ## Supported opcodes
//! - GET, GETQ, GETK, GETKQ: quiet variants say nothing on a miss
//! - SET, SETQ: SETQ says nothing on success
//! - QUITQ: flush and close without a response
//! - everything else: NOT_SUPPORTED (quiet opcodes stay silent, QUIT closes
//!   after the reply)

use bytes::{BufMut, BytesMut};

use crate::error::Result;
use crate::network::{Reply, RequestHandler};
use crate::protocol::{
    opcode_name, value, Header, Opcode, Packet, ResponseStatus, GET_RESPONSE_EXTRA_LENGTH,
    SET_EXTRA_LENGTH,
};
use crate::store::Store;

/// Maps request packets onto store calls
pub struct CommandDispatcher<S> {
    store: S,
}

impl<S: Store> CommandDispatcher<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    /// Handle one request packet
    ///
    /// Only a corrupt stored value produces an `Err`; every protocol-level
    /// problem becomes a status response.
    pub fn dispatch(&self, packet: Packet) -> Result<Reply> {
        tracing::debug!("Received request: {:?}", packet.header);

        match packet.header.command() {
            Some(
                opcode @ (Opcode::Get | Opcode::GetQ | Opcode::GetK | Opcode::GetKQ),
            ) => self.handle_get(opcode, &packet),
            Some(opcode @ (Opcode::Set | Opcode::SetQ)) => Ok(self.handle_set(opcode, &packet)),
            Some(Opcode::QuitQ) => Ok(Reply::Close),
            Some(Opcode::Quit) => {
                tracing::warn!("Unsupported opcode = QUIT");
                Ok(Reply::status(&packet.header, ResponseStatus::NotSupported).and_close())
            }
            Some(opcode) if opcode.is_quiet() => {
                tracing::warn!("Unsupported opcode = {}", opcode);
                Ok(Reply::Silent)
            }
            _ => {
                tracing::warn!("Unsupported opcode = {}", opcode_name(packet.header.opcode));
                Ok(Reply::status(&packet.header, ResponseStatus::NotSupported))
            }
        }
    }

    /// Request: no extras, key, no value.
    /// Response: flags extras, key for K variants, value on a hit.
    fn handle_get(&self, opcode: Opcode, request: &Packet) -> Result<Reply> {
        let key = match request.key() {
            Some(key) => key,
            None => return Ok(invalid_arguments(opcode, &request.header)),
        };

        let found = match self.store.get(key) {
            Some(blob) => Some(value::unpack(&blob)?),
            None if opcode.is_quiet() => {
                tracing::debug!("Quiet miss for key '{}'", String::from_utf8_lossy(key));
                return Ok(Reply::Silent);
            }
            None => None,
        };

        let echoed_key: &[u8] = if opcode.returns_key() { key } else { &[] };
        let value_length = found.as_ref().map_or(0, |(v, _)| v.len());

        let mut header = Header::response_to(&request.header);
        header.set_body_length(
            GET_RESPONSE_EXTRA_LENGTH,
            echoed_key.len() as u16,
            value_length,
        );

        let mut body = BytesMut::with_capacity(header.total_body as usize);
        match &found {
            Some((stored, flags)) => {
                body.put_u32(*flags);
                body.put_slice(echoed_key);
                body.put_slice(stored);
            }
            None => {
                header.status = ResponseStatus::KeyNotFound.code();
                body.put_u32(0);
                body.put_slice(echoed_key);
            }
        }

        tracing::debug!(
            "Sending {} response ({} body bytes) for key '{}'",
            opcode,
            body.len(),
            String::from_utf8_lossy(key)
        );
        Ok(Reply::packet(&Packet::new(header, body.freeze())))
    }

    /// Request: flags + expiry extras, key, value. Response: header only.
    fn handle_set(&self, opcode: Opcode, request: &Packet) -> Reply {
        let header = &request.header;
        if header.extra_length < SET_EXTRA_LENGTH {
            return invalid_arguments(opcode, header);
        }

        let (extras, key, stored) = match (request.extras(), request.key(), request.value()) {
            (Some(extras), Some(key), Some(stored)) => (extras, key, stored),
            _ => return invalid_arguments(opcode, header),
        };

        let flags = u32::from_be_bytes([extras[0], extras[1], extras[2], extras[3]]);
        let expiry = u32::from_be_bytes([extras[4], extras[5], extras[6], extras[7]]);

        let mut blob = value::with_capacity(flags, stored.len());
        blob.put_slice(stored);
        self.store.set(key, blob.freeze(), flags, expiry);

        if opcode == Opcode::SetQ {
            return Reply::Silent;
        }
        tracing::debug!("Stored key '{}'", String::from_utf8_lossy(key));
        Reply::packet(&Packet::header_only(Header::response_to(header)))
    }
}

impl<S: Store> RequestHandler for CommandDispatcher<S> {
    fn handle(&self, packet: Packet) -> Result<Reply> {
        self.dispatch(packet)
    }
}

fn invalid_arguments(opcode: Opcode, request: &Header) -> Reply {
    tracing::warn!("Illegal body lengths in {} request: {:?}", opcode, request);
    Reply::invalid_arguments(opcode, request)
}
