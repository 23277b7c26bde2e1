//! Store Module
//!
//! The local storage capability behind server mode.
//!
//! The dispatcher only ever hands a store opaque internal values (see
//! [`crate::protocol::value`]); flags and expiry are passed alongside for
//! stores that want to act on them.

mod memory;

pub use memory::{MemoryStore, RELATIVE_EXPIRY_LIMIT};

use std::sync::Arc;

use bytes::Bytes;

/// Key-value storage used by the command dispatcher
pub trait Store: Send + Sync {
    /// Look up the internal value stored under `key`
    fn get(&self, key: &[u8]) -> Option<Bytes>;

    /// Store an internal value
    fn set(&self, key: &[u8], value: Bytes, flags: u32, expiry: u32);
}

impl<S: Store + ?Sized> Store for Arc<S> {
    fn get(&self, key: &[u8]) -> Option<Bytes> {
        (**self).get(key)
    }

    fn set(&self, key: &[u8], value: Bytes, flags: u32, expiry: u32) {
        (**self).set(key, value, flags, expiry)
    }
}
