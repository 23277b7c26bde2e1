//! In-memory store
//!
//! HashMap-based store with RwLock for concurrency.

use std::collections::HashMap;
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use parking_lot::RwLock;

use super::Store;

/// Expiry values up to this many seconds are relative to now; larger values
/// are absolute unix timestamps
pub const RELATIVE_EXPIRY_LIMIT: u32 = 60 * 60 * 24 * 30;

#[derive(Debug, Clone)]
struct Entry {
    value: Bytes,

    /// Unix seconds after which the entry is gone, `None` = never
    expires_at: Option<u64>,
}

impl Entry {
    fn is_expired(&self, now: u64) -> bool {
        self.expires_at.map_or(false, |deadline| now >= deadline)
    }
}

/// Thread-safe in-memory store
///
/// Many readers or one writer at a time. Expired entries are removed
/// lazily by the read that notices them.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<HashMap<Vec<u8>, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries, expired ones included until they are read
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    pub fn clear(&self) {
        self.data.write().clear();
    }
}

impl Store for MemoryStore {
    fn get(&self, key: &[u8]) -> Option<Bytes> {
        let now = unix_now();
        {
            let data = self.data.read();
            match data.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired(now) => return Some(entry.value.clone()),
                Some(_) => {}
            }
        }

        let mut data = self.data.write();
        if data.get(key).map_or(false, |entry| entry.is_expired(now)) {
            data.remove(key);
        }
        None
    }

    fn set(&self, key: &[u8], value: Bytes, _flags: u32, expiry: u32) {
        let entry = Entry {
            value,
            expires_at: deadline(expiry, unix_now()),
        };
        self.data.write().insert(key.to_vec(), entry);
    }
}

/// Translate a protocol expiry into an absolute deadline
fn deadline(expiry: u32, now: u64) -> Option<u64> {
    match expiry {
        0 => None,
        secs if secs <= RELATIVE_EXPIRY_LIMIT => Some(now + secs as u64),
        absolute => Some(absolute as u64),
    }
}

fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
