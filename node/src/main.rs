// Copyright (c) 2026 ATLAS Contributors. MIT License.
// See LICENSE for details.

//! # ATLAS Coordinate Node
//!
//! Entry point for the `atlas-node` binary. Parses CLI arguments,
//! initializes logging and metrics, loads the INI configuration, bootstraps
//! the partial view from the registry, and then runs the three protocol
//! services — each a server endpoint plus a periodic client loop — until a
//! shutdown signal arrives.

mod cli;
mod logging;
mod loops;
mod metrics;
mod registry;
mod results;
mod servers;

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::net::TcpListener;
use tokio::signal;
use uuid::Uuid;

use atlas_protocol::config::{FilterKind, Settings};
use atlas_protocol::coord::{RttFilter, SpaceContext};
use atlas_protocol::gossip::{CoordinateStore, GossipEngine};
use atlas_protocol::membership::{Descriptor, PartialView};
use atlas_protocol::stabilizer::Stabilizer;
use atlas_protocol::time::{Clock, SystemClock};
use atlas_protocol::vivaldi::VivaldiEngine;
use atlas_protocol::wire::NodeRecord;

use cli::AtlasNodeCli;
use logging::LogFormat;
use metrics::NodeMetrics;
use registry::RegistryClient;
use results::ResultWriter;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = AtlasNodeCli::parse();

    // --- 1. Initialize logging ---
    logging::init_logging(&cli.log_level, LogFormat::from_str_lossy(&cli.log_format));

    // --- 2. Load and validate configuration (fatal on any defect) ---
    let config_path = cli
        .config
        .to_str()
        .context("configuration path is not valid UTF-8")?;
    let settings = Settings::load(config_path)
        .with_context(|| format!("invalid configuration at {config_path}"))?;

    // --- 3. Node identity and advertised addresses ---
    let node_id = Uuid::new_v4();
    let ip = advertised_ip();
    let local_node = NodeRecord {
        id: node_id,
        membership_addr: SocketAddr::new(ip, cli.membership_port),
        vivaldi_addr: SocketAddr::new(ip, cli.vivaldi_port),
        gossip_addr: SocketAddr::new(ip, cli.gossip_port),
    };
    tracing::info!(
        %node_id,
        membership = %local_node.membership_addr,
        vivaldi = %local_node.vivaldi_addr,
        gossip = %local_node.gossip_addr,
        "node identity created"
    );

    // --- 4. Coordinate space and RTT filter ---
    let space = SpaceContext::new(
        settings.vivaldi.coordinate_space,
        settings.vivaldi.coordinate_dimensions,
    );
    let filter = Arc::new(match settings.vivaldi.filter_type {
        FilterKind::Raw => RttFilter::raw(),
        FilterKind::Ewma => RttFilter::ewma(),
        FilterKind::Mp => RttFilter::moving_percentile(settings.vivaldi.h, settings.vivaldi.p),
    });

    // --- 5. Coordinate store and retention sweeper ---
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let store = Arc::new(CoordinateStore::new(
        space,
        Arc::clone(&clock),
        settings.vivaldi_gossip.retention_seconds,
    ));
    let sweeper = Arc::clone(&store)
        .spawn_sweeper(Duration::from_secs(settings.vivaldi_gossip.retention_interval));

    // --- 6. Gossip engine ---
    let gossip = Arc::new(GossipEngine::new(
        space,
        local_node.clone(),
        Arc::clone(&store),
        settings.vivaldi_gossip.feedback_counter,
        settings.vivaldi_gossip.feedback_coords_num,
    ));

    // --- 7. Vivaldi engine and stabilizer ---
    let vivaldi = Arc::new(parking_lot::RwLock::new(VivaldiEngine::new(
        space,
        settings.vivaldi.cc,
        settings.vivaldi.ce,
    )));
    let stabilizer = Stabilizer::new(
        space,
        settings.vivaldi.window_size,
        settings.vivaldi.tau,
        settings.vivaldi.epsilon_r,
        settings.vivaldi_gossip.retention_seconds,
        local_node.clone(),
        Arc::clone(&gossip),
        Arc::clone(&clock),
    );

    // --- 8. Registry bootstrap ---
    let registry = Arc::new(
        RegistryClient::new(&cli.registry_url, &cli.cert_dir)
            .context("failed to build registry client")?,
    );
    let seed_nodes = registry
        .connect(&local_node)
        .await
        .context("registry connect failed")?;
    tracing::info!(peers = seed_nodes.len(), "bootstrap node list received");

    // --- 9. Partial view, seeded from the registry ---
    let mut view = PartialView::new(
        local_node.clone(),
        settings.membership.c,
        settings.membership.view_selection,
    );
    let mut seeds = Vec::new();
    for node in seed_nodes {
        if node.id == node_id {
            continue;
        }
        match Descriptor::establish(node.clone(), node_id).await {
            Ok(descriptor) => seeds.push(descriptor),
            Err(error) => {
                tracing::debug!(peer = %node.id, %error, "skipping unreachable bootstrap peer");
            }
        }
    }
    view.merge(seeds);
    tracing::info!(view_size = view.len(), "partial view seeded");
    let view: servers::SharedView = Arc::new(tokio::sync::RwLock::new(view));

    // --- 10. Metrics ---
    let node_metrics = Arc::new(NodeMetrics::new());
    node_metrics
        .partial_view_size
        .set(view.read().await.len() as i64);

    // --- 11. Bind the four listeners ---
    let membership_listener = bind(cli.membership_port).await?;
    let vivaldi_listener = bind(cli.vivaldi_port).await?;
    let gossip_listener = bind(cli.gossip_port).await?;
    let metrics_listener = bind(cli.metrics_port).await?;

    let membership_router = servers::membership_router(servers::MembershipState {
        view: Arc::clone(&view),
        metrics: Arc::clone(&node_metrics),
    });
    let vivaldi_router = servers::vivaldi_router(servers::VivaldiState {
        engine: Arc::clone(&vivaldi),
    });
    let gossip_router = servers::gossip_router(servers::GossipState {
        engine: Arc::clone(&gossip),
        metrics: Arc::clone(&node_metrics),
    });
    let metrics_router = axum::Router::new()
        .route("/metrics", axum::routing::get(metrics::metrics_handler))
        .with_state(Arc::clone(&node_metrics));

    // --- 12. Spawn the heartbeat and the three client loops ---
    let heartbeat = Arc::clone(&registry).spawn_heartbeat(local_node.clone());

    let membership_task = tokio::spawn(
        loops::MembershipLoop {
            view: Arc::clone(&view),
            interval_secs: settings.membership.sampling_interval,
            metrics: Arc::clone(&node_metrics),
        }
        .run(),
    );

    let results = ResultWriter::new(
        cli.results_path.clone(),
        logging::env_gate("ATLAS_LOG_RESULT"),
    );
    let vivaldi_task = tokio::spawn(
        loops::VivaldiLoop {
            view: Arc::clone(&view),
            engine: Arc::clone(&vivaldi),
            filter: Arc::clone(&filter),
            stabilizer,
            space,
            interval_secs: settings.vivaldi.sampling_interval,
            results,
            metrics: Arc::clone(&node_metrics),
        }
        .run(),
    );

    let gossip_task = tokio::spawn(
        loops::GossipLoop {
            view: Arc::clone(&view),
            engine: Arc::clone(&gossip),
            filter: Arc::clone(&filter),
            interval_secs: settings.vivaldi_gossip.sampling_interval,
            metrics: Arc::clone(&node_metrics),
        }
        .run(),
    );

    // --- 13. Startup banner ---
    print_startup_banner(&local_node, cli.metrics_port, settings.membership.c);

    // --- 14. Serve until shutdown ---
    tokio::select! {
        res = axum::serve(membership_listener, membership_router) => {
            if let Err(e) = res {
                tracing::error!("membership server error: {}", e);
            }
        }
        res = axum::serve(vivaldi_listener, vivaldi_router) => {
            if let Err(e) = res {
                tracing::error!("vivaldi server error: {}", e);
            }
        }
        res = axum::serve(gossip_listener, gossip_router) => {
            if let Err(e) = res {
                tracing::error!("gossip server error: {}", e);
            }
        }
        res = axum::serve(metrics_listener, metrics_router) => {
            if let Err(e) = res {
                tracing::error!("metrics server error: {}", e);
            }
        }
        _ = shutdown_signal() => {
            tracing::info!("shutdown signal received");
        }
    }

    // --- 15. Teardown: no graceful protocol exit beyond stopping tasks ---
    for task in [sweeper, heartbeat, membership_task, vivaldi_task, gossip_task] {
        task.abort();
    }

    tracing::info!("atlas-node stopped");
    Ok(())
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Binds a listener on all interfaces at `port`.
async fn bind(port: u16) -> Result<TcpListener> {
    TcpListener::bind(("0.0.0.0", port))
        .await
        .with_context(|| format!("failed to bind listener on port {port}"))
}

/// The IP this node advertises to peers and the registry. Falls back to
/// loopback when no routable interface is found.
fn advertised_ip() -> IpAddr {
    match local_ip_address::local_ip() {
        Ok(ip) => ip,
        Err(error) => {
            tracing::warn!(%error, "could not determine local IP; advertising loopback");
            IpAddr::V4(Ipv4Addr::LOCALHOST)
        }
    }
}

/// Prints the node startup banner with a configuration summary.
fn print_startup_banner(node: &NodeRecord, metrics_port: u16, view_capacity: usize) {
    let lines = [
        format!("  Node ID:     {}", node.id),
        format!("  Membership:  http://{}", node.membership_addr),
        format!("  Vivaldi:     http://{}", node.vivaldi_addr),
        format!("  Gossip:      http://{}", node.gossip_addr),
        format!(
            "  Metrics:     http://{}:{}/metrics",
            node.membership_addr.ip(),
            metrics_port
        ),
        format!("  View size:   c = {}", view_capacity),
    ];

    let title = format!(
        "  ATLAS \u{2014} Coordinate Node v{}",
        env!("CARGO_PKG_VERSION")
    );

    let max_width = lines
        .iter()
        .map(|l| l.len())
        .chain(std::iter::once(title.len()))
        .max()
        .unwrap_or(50)
        + 4;

    let border = "\u{2550}".repeat(max_width);

    println!();
    println!("\u{2554}{}\u{2557}", border);
    println!(
        "\u{2551}  {:<width$}  \u{2551}",
        title.trim(),
        width = max_width - 4
    );
    println!("\u{2560}{}\u{2563}", border);
    for line in &lines {
        println!(
            "\u{2551}  {:<width$}  \u{2551}",
            line.trim(),
            width = max_width - 4
        );
    }
    println!("\u{255A}{}\u{255D}", border);
    println!();
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn advertised_ip_is_usable() {
        // Whatever interface detection finds, the result must build a
        // routable socket address with the default ports.
        let ip = advertised_ip();
        let addr = SocketAddr::new(ip, 50152);
        assert_eq!(addr.port(), 50152);
    }

    #[test]
    fn startup_banner_does_not_panic() {
        let node = NodeRecord {
            id: Uuid::new_v4(),
            membership_addr: "10.0.0.5:50152".parse().unwrap(),
            vivaldi_addr: "10.0.0.5:50153".parse().unwrap(),
            gossip_addr: "10.0.0.5:50154".parse().unwrap(),
        };
        print_startup_banner(&node, 50155, 8);
    }
}
