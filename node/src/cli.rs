//! # CLI Interface
//!
//! Defines the command-line argument structure for `atlas-node` using
//! `clap` derive. One flag per server port (defaults 50152/50153/50154),
//! plus paths for the INI configuration, the registry TLS material, and
//! the results CSV.

use clap::Parser;
use std::path::PathBuf;

/// ATLAS network-coordinate node.
///
/// Hosts the three protocol services (membership shuffle, Vivaldi
/// coordinate pull, coordinate gossip), runs their periodic client loops,
/// and exposes Prometheus metrics.
#[derive(Parser, Debug)]
#[command(
    name = "atlas-node",
    about = "ATLAS network-coordinate node",
    version,
    propagate_version = true
)]
pub struct AtlasNodeCli {
    /// Path to the node configuration file (INI).
    #[arg(long, short = 'c', env = "ATLAS_CONFIG", default_value = "config.ini")]
    pub config: PathBuf,

    /// Port for the membership (shuffle) service.
    #[arg(long, env = "ATLAS_MEMBERSHIP_PORT", default_value_t = 50152)]
    pub membership_port: u16,

    /// Port for the Vivaldi (coordinate pull) service.
    #[arg(long, env = "ATLAS_VIVALDI_PORT", default_value_t = 50153)]
    pub vivaldi_port: u16,

    /// Port for the gossip (epidemic exchange) service.
    #[arg(long, env = "ATLAS_GOSSIP_PORT", default_value_t = 50154)]
    pub gossip_port: u16,

    /// Port for the Prometheus metrics endpoint.
    #[arg(long, env = "ATLAS_METRICS_PORT", default_value_t = 50155)]
    pub metrics_port: u16,

    /// Base URL of the bootstrap registry.
    ///
    /// An `https` URL uses mutual TLS with the material under `--cert-dir`;
    /// plain `http` skips TLS for local testing.
    #[arg(long, env = "ATLAS_REGISTRY_URL", default_value = "https://10.0.0.253:50051")]
    pub registry_url: String,

    /// Directory holding `ca-cert.pem`, `client-cert.pem` and
    /// `client-key.pem` for the registry connection.
    #[arg(long, env = "ATLAS_CERT_DIR", default_value = "cert")]
    pub cert_dir: PathBuf,

    /// Path of the append-only results CSV. Writing is gated by the
    /// `ATLAS_LOG_RESULT` environment variable.
    #[arg(long, env = "ATLAS_RESULTS_PATH", default_value = "/data/results.csv")]
    pub results_path: PathBuf,

    /// Default log level when `RUST_LOG` and the category gates are unset.
    #[arg(long, env = "ATLAS_LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    #[arg(long, env = "ATLAS_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}
