//! # Peer Descriptors
//!
//! A [`Descriptor`] is one entry of the partial view: the peer's advertised
//! node record, the *local-side* record this node uses to reach that peer,
//! an age in shuffle rounds, and the cached RPC stubs for the peer's three
//! endpoints.
//!
//! The local-side record exists because of NAT and route asymmetry: the
//! address a peer should use to talk back to us can differ per peer. It is
//! learned when the descriptor is established — each remote endpoint is
//! probed with a TCP connect and the socket's local address is recorded —
//! and echoed back inside shuffle messages so receivers learn the
//! asymmetric path.
//!
//! Descriptors are owned solely by the partial view. Evicting one drops its
//! stubs, closing the pooled connections to that peer.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use tokio::net::TcpStream;
use uuid::Uuid;

use crate::net::{PeerChannels, TransportError};
use crate::wire::NodeRecord;

/// Upper bound on each stub-establishment probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// One partial-view entry for a remote peer.
#[derive(Debug, Clone)]
pub struct Descriptor {
    /// The peer's advertised record (the "remote side").
    pub(crate) remote: NodeRecord,
    /// This node's record as seen on the route to that peer.
    pub(crate) local: NodeRecord,
    /// Rounds since this descriptor was last refreshed.
    pub(crate) age: u64,
    /// Cached RPC stubs for the peer's three endpoints.
    pub(crate) channels: PeerChannels,
}

impl Descriptor {
    /// Builds a descriptor from already-known remote and local records.
    ///
    /// Does not touch the network; used at bootstrap, by [`establish`], and
    /// by tests.
    pub fn new(remote: NodeRecord, local: NodeRecord) -> Result<Self, TransportError> {
        let channels = PeerChannels::new(
            remote.membership_addr,
            remote.vivaldi_addr,
            remote.gossip_addr,
        )?;
        Ok(Self {
            remote,
            local,
            age: 0,
            channels,
        })
    }

    /// Establishes a descriptor for `remote`: probes each of its three
    /// endpoints to learn the local-side addresses and builds the stubs.
    ///
    /// Any probe failure fails the whole establishment; callers skip the
    /// candidate silently.
    pub async fn establish(remote: NodeRecord, local_id: Uuid) -> Result<Self, TransportError> {
        let membership_addr = probe_local_addr(remote.membership_addr).await?;
        let vivaldi_addr = probe_local_addr(remote.vivaldi_addr).await?;
        let gossip_addr = probe_local_addr(remote.gossip_addr).await?;

        let local = NodeRecord {
            id: local_id,
            membership_addr,
            vivaldi_addr,
            gossip_addr,
        };
        Self::new(remote, local)
    }

    /// The peer's advertised record.
    pub fn remote(&self) -> &NodeRecord {
        &self.remote
    }

    /// This node's local-side record on the route to the peer.
    pub fn local(&self) -> &NodeRecord {
        &self.local
    }

    /// Rounds since last refresh.
    pub fn age(&self) -> u64 {
        self.age
    }

    /// The peer's cached RPC stubs.
    pub fn channels(&self) -> &PeerChannels {
        &self.channels
    }
}

/// Connects to `peer` and reports the local address the route assigned us.
async fn probe_local_addr(peer: SocketAddr) -> Result<SocketAddr, TransportError> {
    let stream = tokio::time::timeout(PROBE_TIMEOUT, TcpStream::connect(peer))
        .await
        .map_err(|_| io::Error::new(io::ErrorKind::TimedOut, "establishment probe timed out"))??;
    Ok(stream.local_addr()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    fn record(id: u128, addr: &str) -> NodeRecord {
        NodeRecord {
            id: Uuid::from_u128(id),
            membership_addr: addr.parse().unwrap(),
            vivaldi_addr: addr.parse().unwrap(),
            gossip_addr: addr.parse().unwrap(),
        }
    }

    #[tokio::test]
    async fn establish_learns_local_side_addresses() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let remote = record(1, &addr.to_string());
        let descriptor = Descriptor::establish(remote, Uuid::from_u128(2))
            .await
            .expect("establish against live listener");

        assert_eq!(descriptor.local().id, Uuid::from_u128(2));
        assert!(descriptor.local().membership_addr.port() != 0);
        assert_eq!(descriptor.age(), 0);
    }

    #[tokio::test]
    async fn establish_fails_when_peer_is_down() {
        // Bind-then-drop to get a port nobody is listening on.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let remote = record(1, &addr.to_string());
        assert!(Descriptor::establish(remote, Uuid::from_u128(2)).await.is_err());
    }
}
