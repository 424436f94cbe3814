//! # Structured Logging
//!
//! Initializes the `tracing` subscriber with configurable format (JSON or
//! pretty-printed) and environment-based filtering.
//!
//! Filtering resolves in three layers: `RUST_LOG`, when set, wins
//! outright; otherwise a default filter is assembled from the boolean
//! category gates `ATLAS_LOG` (overall), `ATLAS_LOG_MEMBERSHIP`,
//! `ATLAS_LOG_VIVALDI`, and `ATLAS_LOG_GOSSIP`, each raising its
//! subsystem's targets to debug; the `--log-level` flag supplies the base
//! level underneath the gates.

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    /// Human-readable, colored output. Suitable for local development.
    Pretty,
    /// Machine-parseable JSON lines. Suitable for production aggregation.
    Json,
}

impl LogFormat {
    /// Parse a format string. Accepts "json" or "pretty" (case-insensitive).
    /// Returns `Pretty` for any unrecognized value.
    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            _ => LogFormat::Pretty,
        }
    }
}

/// Reads a boolean environment gate. Anything but "1"/"true"/"yes"
/// (case-insensitive) — including absence — is false.
pub fn env_gate(name: &str) -> bool {
    std::env::var(name)
        .map(|value| matches!(value.to_lowercase().as_str(), "1" | "true" | "yes"))
        .unwrap_or(false)
}

/// Assembles the default filter directives from the category gates.
///
/// `base_level` applies to both crates; every enabled category raises its
/// subsystem targets to debug.
pub fn category_filter(base_level: &str) -> String {
    let base = if env_gate("ATLAS_LOG") {
        base_level
    } else {
        "warn"
    };
    let mut directives = format!("atlas_node={base},atlas_protocol={base}");

    for (gate, targets) in [
        (
            "ATLAS_LOG_MEMBERSHIP",
            &["atlas_protocol::membership", "atlas_node::loops"][..],
        ),
        (
            "ATLAS_LOG_VIVALDI",
            &["atlas_protocol::vivaldi", "atlas_protocol::stabilizer"][..],
        ),
        ("ATLAS_LOG_GOSSIP", &["atlas_protocol::gossip"][..]),
    ] {
        if env_gate(gate) {
            for target in targets {
                directives.push_str(&format!(",{target}=debug"));
            }
        }
    }

    directives
}

/// Initialize the global tracing subscriber.
///
/// Call this exactly once, early in `main()`. Subsequent calls will panic.
/// The `RUST_LOG` environment variable overrides the assembled category
/// filter wholesale when set.
pub fn init_logging(base_level: &str, format: LogFormat) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(category_filter(base_level)));

    match format {
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(
                    fmt::layer()
                        .with_target(true)
                        .with_thread_ids(false)
                        .with_file(true)
                        .with_line_number(true),
                )
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(fmt::layer().json().with_target(true))
                .init();
        }
    }

    tracing::info!("logging initialized (format={:?})", format);
}
