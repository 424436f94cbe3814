//! # Peer RPC Stubs
//!
//! A [`PeerChannels`] bundles the typed client calls for one peer's three
//! service endpoints. Exactly one HTTP client is built per peer when its
//! descriptor is established; evicting the descriptor drops the client and
//! its pooled connections with it.
//!
//! There are no retries here. Every call carries a per-call timeout, and a
//! failure is reported to the caller, which evicts the peer — the periodic
//! client loops provide the natural retry cadence.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::wire::{
    GossipPayload, ShuffleReply, ShuffleRequest, WireCoordinate, GOSSIP_PATH,
    PULL_COORDINATES_PATH, SHUFFLE_PATH,
};

/// Per-call timeout applied to every peer RPC.
const RPC_TIMEOUT: Duration = Duration::from_secs(5);

/// A peer RPC failure. Any variant causes the caller to evict the peer.
#[derive(Debug, Error)]
pub enum TransportError {
    /// The request could not be sent or the response body was invalid.
    #[error("transport failure: {0}")]
    Http(#[from] reqwest::Error),

    /// The peer answered with a non-success status code.
    #[error("peer returned HTTP {0}")]
    Status(u16),

    /// A TCP-level connection (the stub-establishment probe) failed.
    #[error("connection failure: {0}")]
    Connect(#[from] std::io::Error),
}

/// Cached RPC stubs for a single peer.
#[derive(Debug, Clone)]
pub struct PeerChannels {
    http: reqwest::Client,
    shuffle_url: String,
    pull_url: String,
    gossip_url: String,
}

impl PeerChannels {
    /// Builds the stubs for a peer's three endpoints.
    ///
    /// Does not connect; connections are opened lazily on first use and
    /// pooled inside the client.
    pub fn new(
        membership: SocketAddr,
        vivaldi: SocketAddr,
        gossip: SocketAddr,
    ) -> Result<Self, TransportError> {
        let http = reqwest::Client::builder().timeout(RPC_TIMEOUT).build()?;
        Ok(Self {
            http,
            shuffle_url: format!("http://{membership}{SHUFFLE_PATH}"),
            pull_url: format!("http://{vivaldi}{PULL_COORDINATES_PATH}"),
            gossip_url: format!("http://{gossip}{GOSSIP_PATH}"),
        })
    }

    /// Calls the peer's membership shuffle endpoint.
    pub async fn shuffle_peers(
        &self,
        request: &ShuffleRequest,
    ) -> Result<ShuffleReply, TransportError> {
        let response = self.http.post(&self.shuffle_url).json(request).send().await?;
        Self::check_status(&response)?;
        Ok(response.json().await?)
    }

    /// Pulls the peer's current system coordinate.
    pub async fn pull_coordinates(&self) -> Result<WireCoordinate, TransportError> {
        let response = self.http.get(&self.pull_url).send().await?;
        Self::check_status(&response)?;
        Ok(response.json().await?)
    }

    /// Exchanges gossip records with the peer, returning its echo list.
    pub async fn gossip(&self, payload: &GossipPayload) -> Result<GossipPayload, TransportError> {
        let response = self.http.post(&self.gossip_url).json(payload).send().await?;
        Self::check_status(&response)?;
        Ok(response.json().await?)
    }

    fn check_status(response: &reqwest::Response) -> Result<(), TransportError> {
        let status = response.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(TransportError::Status(status.as_u16()))
        }
    }
}
