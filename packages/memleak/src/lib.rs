//! A deliberately leaking service.
//!
//! A background loop appends random-filled chunks to a buffer it never
//! frees, and a small HTTP surface reports process memory alongside how much
//! has been leaked. Use it to exercise memory alerts, OOM kills and heap
//! dump collection.

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use clap::Parser;
use ops_support::LogFormat;

pub mod buffer;
pub mod leaker;
pub mod memory;
pub mod routes;

pub use buffer::{LeakBuffer, LeakStats};
pub use leaker::LeakConfig;
pub use memory::MemorySnapshot;

/// Memory leak demo - grows its heap until something stops it
#[derive(Parser, Debug, Clone)]
#[command(name = "memleak-demo")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Address to listen on
    #[arg(long, env = "SERVER_HOST", default_value = "0.0.0.0")]
    pub host: IpAddr,

    /// Port to listen on
    #[arg(long, env = "SERVER_PORT", default_value_t = 8080)]
    pub port: u16,

    /// Milliseconds between leaked chunks
    #[arg(
        long,
        env = "LEAK_INTERVAL_MS",
        default_value_t = 5000,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub interval_ms: u64,

    /// Size of each leaked chunk in MiB
    #[arg(
        long,
        env = "LEAK_CHUNK_MB",
        default_value_t = 10,
        value_parser = clap::value_parser!(u64).range(1..)
    )]
    pub chunk_mb: u64,

    /// Stop leaking after this many chunks and hold the memory
    #[arg(long, env = "LEAK_MAX_ITERATIONS")]
    pub max_iterations: Option<u64>,

    /// Log output format
    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Text)]
    pub log_format: LogFormat,
}

impl Args {
    pub fn listen_addr(&self) -> SocketAddr {
        SocketAddr::new(self.host, self.port)
    }

    pub fn leak_config(&self) -> LeakConfig {
        LeakConfig {
            interval: Duration::from_millis(self.interval_ms),
            chunk_size: self.chunk_mb as usize * buffer::MIB,
            max_iterations: self.max_iterations,
        }
    }
}
