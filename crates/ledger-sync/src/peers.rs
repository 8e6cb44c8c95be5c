//! Registry of per-peer sync state.

use crate::PeerSyncState;
use dashmap::DashMap;
use std::net::SocketAddr;
use tracing::debug;

/// Peer identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerId(pub Vec<u8>);

impl PeerId {
    /// Create from bytes.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// Create from socket address.
    pub fn from_addr(addr: &SocketAddr) -> Self {
        Self(addr.to_string().into_bytes())
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", hex::encode(&self.0))
    }
}

/// Sync state of every connected peer.
///
/// Each peer's session is the only writer of its entry. Readers get
/// snapshots that may already be stale.
#[derive(Default)]
pub struct PeerStates {
    states: DashMap<PeerId, PeerSyncState>,
}

impl PeerStates {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `peer` with default state. Existing state is kept.
    pub fn register(&self, peer: PeerId) {
        self.states.entry(peer).or_default();
    }

    /// Stop tracking `peer`, returning its last state.
    pub fn remove(&self, peer: &PeerId) -> Option<PeerSyncState> {
        let removed = self.states.remove(peer).map(|(_, state)| state);
        if removed.is_some() {
            debug!(%peer, "Peer sync state dropped");
        }
        removed
    }

    /// Snapshot of `peer`'s state.
    pub fn get(&self, peer: &PeerId) -> Option<PeerSyncState> {
        self.states.get(peer).map(|r| r.clone())
    }

    /// Apply `f` to `peer`'s state if it is tracked.
    pub fn update<R>(
        &self,
        peer: &PeerId,
        f: impl FnOnce(&mut PeerSyncState) -> R,
    ) -> Option<R> {
        self.states
            .get_mut(peer)
            .map(|mut entry| f(entry.value_mut()))
    }

    /// Peers marked for header download.
    pub fn download_peers(&self) -> Vec<PeerId> {
        self.states
            .iter()
            .filter(|entry| entry.value().is_download())
            .map(|entry| entry.key().clone())
            .collect()
    }

    /// Peers marked for block download.
    pub fn block_download_peers(&self) -> Vec<PeerId> {
        self.states
            .iter()
            .filter(|entry| entry.value().is_block_download())
            .map(|entry| entry.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}
