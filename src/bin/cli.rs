//! memrelay CLI Client
//!
//! Command-line interface for talking binary protocol to a server or proxy.

use std::net::TcpStream;
use std::time::Duration;

use clap::{Parser, Subcommand};
use memrelay::protocol::{read_packet, write_packet, Header, Opcode, Packet, ResponseStatus};

/// memrelay CLI
#[derive(Parser, Debug)]
#[command(name = "memrelay-cli")]
#[command(about = "CLI for memrelay servers and proxies")]
struct Args {
    /// Server address
    #[arg(short, long, default_value = "127.0.0.1:11211")]
    server: String,

    /// Socket timeout in milliseconds
    #[arg(short, long, default_value = "5000")]
    timeout_ms: u64,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Get a value by key
    Get {
        /// The key to get
        key: String,
    },

    /// Set a key-value pair
    Set {
        /// The key to set
        key: String,

        /// The value to set
        value: String,

        /// Client flags stored with the value
        #[arg(short, long, default_value = "0")]
        flags: u32,

        /// Expiry (seconds, or unix time beyond 30 days)
        #[arg(short, long, default_value = "0")]
        expiry: u32,
    },

    /// Send a NOOP (a proxy answers nothing; a server says not supported)
    Noop,
}

fn main() {
    let args = Args::parse();

    if let Err(e) = run(&args) {
        eprintln!("error: {}", e);
        std::process::exit(1);
    }
}

fn run(args: &Args) -> memrelay::Result<()> {
    let request = match &args.command {
        Commands::Get { key } => Packet::get_request(Opcode::Get, key.as_bytes(), 1)?,
        Commands::Set {
            key,
            value,
            flags,
            expiry,
        } => Packet::set_request(Opcode::Set, key.as_bytes(), value.as_bytes(), *flags, *expiry, 1)?,
        Commands::Noop => Packet::header_only(Header::request(Opcode::Noop)),
    };

    let mut stream = TcpStream::connect(&args.server)?;
    let timeout = Some(Duration::from_millis(args.timeout_ms.max(1)));
    stream.set_read_timeout(timeout)?;
    stream.set_write_timeout(timeout)?;

    write_packet(&mut stream, &request)?;

    if let Commands::Noop = args.command {
        // A proxy flushes without replying, so only wait briefly
        stream.set_read_timeout(Some(Duration::from_millis(200)))?;
    }

    let response = match read_packet(&mut stream) {
        Ok(response) => response,
        Err(e) if matches!(args.command, Commands::Noop) => {
            println!("no response ({})", e);
            return Ok(());
        }
        Err(e) => return Err(e),
    };

    print_response(&response);
    Ok(())
}

fn print_response(response: &Packet) {
    let status = ResponseStatus::from_u16(response.header.status)
        .map(|s| s.message().to_string())
        .unwrap_or_else(|| format!("status 0x{:04x}", response.header.status));
    println!("status: {}", status);

    if response.header.extra_length == 4 {
        if let Some(extras) = response.extras() {
            let flags = u32::from_be_bytes([extras[0], extras[1], extras[2], extras[3]]);
            println!("flags:  {}", flags);
        }
    }

    if let Some(stored) = response.value() {
        if !stored.is_empty() {
            println!("value:  {}", String::from_utf8_lossy(stored));
        }
    }
}
