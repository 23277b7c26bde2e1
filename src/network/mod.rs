//! Network Module
//!
//! TCP server and client handling.
//!
//! ## Architecture
//! - Single acceptor thread
//! - One worker thread per client connection
//! - Requests handed to a [`RequestHandler`] (local store or proxy)

mod handler;
mod server;
mod connection;

pub use handler::{Reply, RequestHandler};
pub use server::{Server, ShutdownHandle};
pub use connection::Connection;
