//! memrelay Server Binary
//!
//! Serves the binary protocol from an in-memory store.

use std::sync::Arc;

use clap::Parser;
use memrelay::config::{ConfigBuilder, DEFAULT_SERVER_ADDR};
use memrelay::network::Server;
use memrelay::{CommandDispatcher, Config, MemoryStore};
use tracing_subscriber::{fmt, EnvFilter};

/// memrelay Server
#[derive(Parser, Debug)]
#[command(name = "memrelay-server")]
#[command(about = "Memcached binary protocol server backed by an in-memory store")]
#[command(version)]
struct Args {
    /// JSON config file; flags below override it
    #[arg(short, long)]
    config: Option<String>,

    /// Listen address (host:port) [default: 127.0.0.1:11212]
    #[arg(short, long)]
    listen: Option<String>,

    /// Maximum concurrent connections
    #[arg(short, long)]
    max_connections: Option<usize>,
}

fn main() {
    // Initialize tracing/logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,memrelay=debug"));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .init();

    let args = Args::parse();

    tracing::info!("memrelay server v{}", memrelay::VERSION);

    let base = match args.config.as_deref().map(|path| Config::from_file(path)).transpose() {
        Ok(config) => config.unwrap_or_default(),
        Err(e) => {
            tracing::error!("Failed to load config: {}", e);
            std::process::exit(1);
        }
    };

    // Without a config file, fall back to this mode's default port
    let listen = args
        .listen
        .or_else(|| args.config.is_none().then(|| DEFAULT_SERVER_ADDR.to_string()));

    let mut builder = ConfigBuilder::from_config(base);
    if let Some(listen) = listen {
        builder = builder.listen_addr(listen);
    }
    if let Some(max) = args.max_connections {
        builder = builder.max_connections(max);
    }
    let config = builder.build();

    tracing::info!("Listen address: {}", config.listen_addr);

    let dispatcher = Arc::new(CommandDispatcher::new(MemoryStore::new()));

    let server = match Server::bind(config, dispatcher) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start server: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Server stopped");
}
