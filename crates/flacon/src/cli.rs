use clap::Parser;

use flacon_core::fee::DEFAULT_ESTIMATED_VBYTES;
use flacon_core::provider::{DEFAULT_MAINNET_URL, DEFAULT_TESTNET_URL};

/// Flacon: lab service for building and broadcasting conflicting Bitcoin
/// transaction pairs.
#[derive(Parser)]
#[command(version, about)]
pub struct Cli {
    /// Address to bind the web server to.
    #[arg(long, default_value = "127.0.0.1", env = "FLACON_BIND")]
    pub bind: String,

    /// Port to listen on.
    #[arg(long, default_value = "10000", env = "PORT")]
    pub port: u16,

    /// mempool.space compatible API base URL for mainnet.
    #[arg(long, default_value = DEFAULT_MAINNET_URL, env = "FLACON_MAINNET_API")]
    pub mainnet_api: String,

    /// mempool.space compatible API base URL for testnet.
    #[arg(long, default_value = DEFAULT_TESTNET_URL, env = "FLACON_TESTNET_API")]
    pub testnet_api: String,

    /// Maximum outbound provider requests per second (unlimited if omitted).
    #[arg(long, env = "FLACON_REQUESTS_PER_SECOND")]
    pub requests_per_second: Option<u32>,

    /// Per-submission timeout in seconds when broadcasting a pair.
    #[arg(long, default_value = "20", env = "FLACON_SUBMIT_TIMEOUT_SECS")]
    pub submit_timeout_secs: u64,

    /// Estimated virtual size used for fee computation.
    #[arg(long, default_value_t = DEFAULT_ESTIMATED_VBYTES, env = "FLACON_ESTIMATED_VBYTES")]
    pub estimated_vbytes: u64,

    /// Extra satoshis debited from the second transaction when its value is
    /// derived.
    #[arg(long, default_value = "1000", env = "FLACON_SECOND_EXTRA_DEBIT")]
    pub second_extra_debit: u64,

    /// Only allow cross-origin requests from this origin. Any origin is
    /// allowed if omitted.
    #[arg(long, env = "FLACON_ALLOW_ORIGIN")]
    pub allow_origin: Option<String>,
}
