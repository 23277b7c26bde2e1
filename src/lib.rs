//! # memrelay
//!
//! A memcached binary protocol endpoint that runs in one of two modes:
//! - **Server**: answers GET/SET traffic from a local store
//! - **Proxy**: relays GET/SET traffic to the backend that owns each key,
//!   reusing pooled backend connections
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      TCP Server                              │
//! │              (one worker thread per client)                  │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ bytes
//! ┌─────────────────────▼───────────────────────────────────────┐
//! │                  Frame Assembler                             │
//! │              (24-byte header + body)                         │
//! └─────────────────────┬───────────────────────────────────────┘
//!                       │ Packet
//!          ┌────────────┴────────────┐
//!          │                         │
//!          ▼                         ▼
//!   ┌─────────────┐          ┌─────────────┐
//!   │ Dispatcher  │          │ ProxyRouter │
//!   │  (server)   │          │   (proxy)   │
//!   └──────┬──────┘          └──────┬──────┘
//!          │                        │
//!          ▼                        ▼
//!   ┌─────────────┐          ┌─────────────┐       ┌──────────┐
//!   │    Store    │          │ConnectionPool├──────►│ Backends │
//!   └─────────────┘          └─────────────┘       └──────────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod config;

pub mod protocol;
pub mod store;
pub mod pool;
pub mod network;
pub mod dispatch;
pub mod proxy;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use error::{RelayError, Result};
pub use config::Config;
pub use dispatch::CommandDispatcher;
pub use proxy::{BackendResolver, HashResolver, ProxyRouter};
pub use store::{MemoryStore, Store};

// =============================================================================
// Version Info
// =============================================================================

/// Current version of memrelay
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
