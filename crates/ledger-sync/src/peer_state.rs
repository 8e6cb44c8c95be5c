//! Per-peer sync bookkeeping.

use ledger_consensus::{BlockIndex, Hash256};
use ledger_state::ChainState;

/// What we know about one peer's chain and the roles it serves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerSyncState {
    is_download: bool,
    is_block_download: bool,
    best_known_block: Option<BlockIndex>,
    last_unknown_block_hash: Option<Hash256>,
    download_blocks: u32,
}

impl PeerSyncState {
    /// Fresh state: no roles, nothing known.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use this peer for header download.
    pub fn use_for_download(&mut self, flag: bool) {
        self.is_download = flag;
    }

    /// Use this peer for block body download.
    pub fn use_for_block_download(&mut self, flag: bool) {
        self.is_block_download = flag;
    }

    pub fn is_download(&self) -> bool {
        self.is_download
    }

    pub fn is_block_download(&self) -> bool {
        self.is_block_download
    }

    pub fn best_known_block(&self) -> Option<&BlockIndex> {
        self.best_known_block.as_ref()
    }

    pub fn last_unknown_block_hash(&self) -> Option<Hash256> {
        self.last_unknown_block_hash
    }

    pub fn download_blocks(&self) -> u32 {
        self.download_blocks
    }

    pub fn set_download_blocks(&mut self, count: u32) {
        self.download_blocks = count;
    }

    /// More than one block outstanding from this peer.
    pub fn has_download_blocks(&self) -> bool {
        self.download_blocks > 1
    }

    /// Record that the peer announced `hash`.
    ///
    /// A hash on our best chain becomes the peer's best known block;
    /// anything else is kept as its last unknown hash. The other field is
    /// left as it was.
    pub fn update_block_availability(&mut self, state: &ChainState, hash: &Hash256) {
        match state.chain().index_of(hash) {
            Some(index) => self.best_known_block = Some(index.clone()),
            None => self.last_unknown_block_hash = Some(*hash),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ledger_consensus::BlockHeader;
    use ledger_state::Chain;

    fn state() -> ChainState {
        let genesis = BlockHeader {
            version: 1,
            prev_block: Hash256::ZERO,
            merkle_root: Hash256::ZERO,
            timestamp: 0,
            bits: 0x207fffff,
            nonce: 0,
        };
        let mut chain = Chain::new(BlockIndex::new(0, genesis));
        let next = BlockHeader {
            prev_block: genesis.hash(),
            timestamp: 1,
            ..genesis
        };
        chain.push(BlockIndex::new(1, next)).unwrap();
        ChainState::new(chain)
    }

    #[test]
    fn test_defaults() {
        let peer = PeerSyncState::new();
        assert!(!peer.is_download());
        assert!(!peer.is_block_download());
        assert!(peer.best_known_block().is_none());
        assert!(peer.last_unknown_block_hash().is_none());
        assert_eq!(peer.download_blocks(), 0);
        assert!(!peer.has_download_blocks());
    }

    #[test]
    fn test_roles() {
        let mut peer = PeerSyncState::new();
        peer.use_for_download(true);
        peer.use_for_block_download(true);
        assert!(peer.is_download() && peer.is_block_download());
        peer.use_for_download(false);
        assert!(!peer.is_download());
    }

    #[test]
    fn test_has_download_blocks_threshold() {
        let mut peer = PeerSyncState::new();
        peer.set_download_blocks(1);
        assert!(!peer.has_download_blocks());
        peer.set_download_blocks(2);
        assert!(peer.has_download_blocks());
    }

    #[test]
    fn test_update_block_availability_touches_one_field() {
        let state = state();
        let mut peer = PeerSyncState::new();

        let unknown = Hash256([6; 32]);
        peer.update_block_availability(&state, &unknown);
        assert_eq!(peer.last_unknown_block_hash(), Some(unknown));
        assert!(peer.best_known_block().is_none());

        let known = state.chain().hash_from_height(1).unwrap();
        peer.update_block_availability(&state, &known);
        assert_eq!(peer.best_known_block().map(|i| i.hash), Some(known));
        assert_eq!(peer.last_unknown_block_hash(), Some(unknown));
    }
}
