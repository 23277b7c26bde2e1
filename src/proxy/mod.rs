//! Proxy Module
//!
//! Proxy mode: terminate the protocol and relay GET/SET traffic to the
//! backend that owns each key.
//!
//! Only the key-addressed read/write subset is forwarded (GET, GETK, GETQ,
//! GETKQ, SET, SETQ). NOOP flushes, QUITQ closes, and everything else is
//! answered with NOT_SUPPORTED.

mod resolver;
mod router;

pub use resolver::{BackendResolver, HashResolver};
pub use router::ProxyRouter;
