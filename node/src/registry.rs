//! # Bootstrap Registry Client
//!
//! The only centralized collaborator: an external registry that hands a
//! joining node its initial peer list and expects periodic heartbeats
//! afterwards. The connection uses mutual TLS — the registry authenticates
//! us with the client certificate, we authenticate it against the CA
//! certificate — loaded from `{cert_dir}/{ca-cert,client-cert,client-key}.pem`.
//! Plain-HTTP registry URLs skip the TLS material for local testing.
//!
//! The registry exists purely to seed the partial view; losing it after
//! bootstrap degrades nothing but the heartbeat.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{ensure, Context, Result};
use tracing::{debug, info, warn};

use atlas_protocol::wire::NodeRecord;

/// Cadence of the heartbeat task.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(4);

/// Per-call timeout for registry RPCs.
const REGISTRY_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for the bootstrap registry.
pub struct RegistryClient {
    http: reqwest::Client,
    base: String,
}

impl RegistryClient {
    /// Builds the client. For `https` URLs, the mutual-TLS material is
    /// loaded from `cert_dir`; a missing or malformed file is fatal.
    pub fn new(base_url: &str, cert_dir: &Path) -> Result<Self> {
        let base = base_url.trim_end_matches('/').to_string();
        let mut builder = reqwest::Client::builder().timeout(REGISTRY_TIMEOUT);

        if base.starts_with("https://") {
            let read = |name: &str| {
                std::fs::read(cert_dir.join(name))
                    .with_context(|| format!("failed to read {}", cert_dir.join(name).display()))
            };
            let ca = read("ca-cert.pem")?;
            let cert = read("client-cert.pem")?;
            let key = read("client-key.pem")?;

            builder = builder
                .use_rustls_tls()
                .add_root_certificate(
                    reqwest::Certificate::from_pem(&ca).context("invalid CA certificate")?,
                )
                .identity(
                    reqwest::Identity::from_pem(&[cert, key].concat())
                        .context("invalid client certificate/key pair")?,
                );
        }

        Ok(Self {
            http: builder.build().context("failed to build registry client")?,
            base,
        })
    }

    /// Announces this node and returns the registry's current node list,
    /// which seeds the partial view.
    pub async fn connect(&self, node: &NodeRecord) -> Result<Vec<NodeRecord>> {
        let response = self
            .http
            .post(format!("{}/connect", self.base))
            .json(node)
            .send()
            .await
            .context("registry connect request failed")?;
        ensure!(
            response.status().is_success(),
            "registry connect returned {}",
            response.status()
        );

        let nodes: Vec<NodeRecord> = response
            .json()
            .await
            .context("registry connect reply was not a node list")?;
        for peer in &nodes {
            debug!(peer = %peer.id, membership = %peer.membership_addr, "bootstrap peer");
        }
        Ok(nodes)
    }

    /// Sends one heartbeat.
    pub async fn heartbeat(&self, node: &NodeRecord) -> Result<()> {
        let response = self
            .http
            .post(format!("{}/heartbeat", self.base))
            .json(node)
            .send()
            .await
            .context("registry heartbeat request failed")?;
        ensure!(
            response.status().is_success(),
            "registry heartbeat returned {}",
            response.status()
        );
        Ok(())
    }

    /// Spawns the heartbeat task: one beat every four seconds, forever.
    /// Failures are logged and retried at the next tick.
    pub fn spawn_heartbeat(self: Arc<Self>, node: NodeRecord) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            info!(interval_secs = HEARTBEAT_INTERVAL.as_secs(), "heartbeat task started");
            let mut ticker = tokio::time::interval(HEARTBEAT_INTERVAL);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if let Err(error) = self.heartbeat(&node).await {
                    warn!(%error, "registry heartbeat failed");
                }
            }
        })
    }
}
