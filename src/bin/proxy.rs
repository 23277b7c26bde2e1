//! memrelay Proxy Binary
//!
//! Shards GET/SET traffic across backend memcached instances.

use std::sync::Arc;

use clap::Parser;
use memrelay::config::{ConfigBuilder, DEFAULT_PROXY_ADDR};
use memrelay::network::Server;
use memrelay::{Config, HashResolver, ProxyRouter};
use tracing_subscriber::{fmt, EnvFilter};

/// memrelay Proxy
#[derive(Parser, Debug)]
#[command(name = "memrelay-proxy")]
#[command(about = "Memcached binary protocol proxy with pooled backend connections")]
#[command(version)]
struct Args {
    /// JSON config file; flags below override it
    #[arg(short, long)]
    config: Option<String>,

    /// Listen address (host:port) [default: 127.0.0.1:11211]
    #[arg(short, long)]
    listen: Option<String>,

    /// Backend address (host:port), repeat for each shard
    #[arg(short, long = "backend")]
    backends: Vec<String>,

    /// Backend read/write timeout in milliseconds (0 = none)
    #[arg(short = 't', long)]
    backend_timeout_ms: Option<u64>,

    /// Maximum concurrent client connections
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

    tracing::info!("memrelay proxy v{}", memrelay::VERSION);

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
        .or_else(|| args.config.is_none().then(|| DEFAULT_PROXY_ADDR.to_string()));

    let mut builder = ConfigBuilder::from_config(base);
    if let Some(listen) = listen {
        builder = builder.listen_addr(listen);
    }
    if !args.backends.is_empty() {
        builder = builder.backends(args.backends);
    }
    if let Some(ms) = args.backend_timeout_ms {
        builder = builder.backend_timeout_ms(ms);
    }
    if let Some(max) = args.max_connections {
        builder = builder.max_connections(max);
    }
    let config = builder.build();

    tracing::info!("Listen address: {}", config.listen_addr);
    tracing::info!("Backends: {}", config.backends.join(", "));

    let resolver = match HashResolver::from_addrs(&config.backends) {
        Ok(resolver) => resolver,
        Err(e) => {
            tracing::error!("Invalid backends: {}", e);
            std::process::exit(1);
        }
    };

    let router = match ProxyRouter::from_config(resolver, &config) {
        Ok(router) => Arc::new(router),
        Err(e) => {
            tracing::error!("Failed to create proxy router: {}", e);
            std::process::exit(1);
        }
    };

    let server = match Server::bind(config, router) {
        Ok(server) => server,
        Err(e) => {
            tracing::error!("Failed to start proxy: {}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = server.run() {
        tracing::error!("Proxy error: {}", e);
        std::process::exit(1);
    }

    tracing::info!("Proxy stopped");
}
