//! Shared owner of the tracked chain state.
//!
//! Readers take short read locks. Every writer holds the commit lock:
//! header registration takes it, and block acceptance holds it for its whole
//! run, registering its own header from inside. The lock is reentrant so that
//! nested registration does not deadlock.

use crate::{Chain, ChainState, StateError, StateResult};
use ledger_consensus::{BlockHeader, BlockIndex, Hash256};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard, RwLock, RwLockReadGuard};
use tracing::{debug, info, warn};

/// Serialized access point for one chain's state.
pub struct Chains {
    best: RwLock<ChainState>,
    commit: ReentrantMutex<()>,
}

impl Chains {
    /// Wrap an initial state.
    pub fn new(state: ChainState) -> Self {
        Self {
            best: RwLock::new(state),
            commit: ReentrantMutex::new(()),
        }
    }

    /// Fresh state holding only the genesis header.
    pub fn from_genesis(genesis: BlockHeader) -> Self {
        Self::new(ChainState::new(Chain::new(BlockIndex::new(0, genesis))))
    }

    /// Read access to the current best state.
    pub fn best(&self) -> RwLockReadGuard<'_, ChainState> {
        self.best.read()
    }

    /// Copy of the last accepted block.
    pub fn last_block(&self) -> BlockIndex {
        self.best.read().last_block().clone()
    }

    /// Height of the best header.
    pub fn header_height(&self) -> u32 {
        self.best.read().chain().height()
    }

    /// Exclusive section for header registration and block acceptance.
    pub(crate) fn lock_commit(&self) -> ReentrantMutexGuard<'_, ()> {
        self.commit.lock()
    }

    /// Register a header on the best chain under a single write lock.
    ///
    /// Known hashes return their stored index. Otherwise the header must
    /// build on the best header tip. Callers hold the commit lock.
    pub(crate) fn insert_header(
        &self,
        hash: Hash256,
        header: BlockHeader,
    ) -> StateResult<BlockIndex> {
        let mut best = self.best.write();
        let chain = best.chain_mut();
        if let Some(known) = chain.index_of(&hash) {
            return Ok(known.clone());
        }

        let parent = header.prev_block;
        let parent_height = chain
            .height_from_hash(&parent)
            .ok_or(StateError::OrphanHeader { hash, parent })?;
        if parent != chain.tip().hash {
            return Err(StateError::UnsupportedFork { hash, parent });
        }

        let index = BlockIndex::new(parent_height + 1, header);
        chain.push(index.clone())?;
        debug!(height = index.height, %hash, "Header appended");
        Ok(index)
    }

    /// Drop the header of a rejected block and every header built on it.
    ///
    /// Headers at or below the accepted tip are kept.
    pub(crate) fn discard_headers(&self, index: &BlockIndex) -> usize {
        let removed = self.best.write().discard_headers(index);
        if !removed.is_empty() {
            debug!(
                height = index.height,
                hash = %index.hash,
                removed = removed.len(),
                "Headers rolled back"
            );
        }
        removed.len()
    }

    /// Advance the accepted tip.
    pub(crate) fn advance_tip(&self, index: &BlockIndex) -> StateResult<()> {
        self.best.write().update_last_block(index)?;
        info!(height = index.height, hash = %index.hash, "Chain tip advanced");
        Ok(())
    }

    /// Move the accepted tip back off `index` after a failed commit.
    pub(crate) fn revert_tip(&self, index: &BlockIndex) -> StateResult<()> {
        self.best.write().revert_last_block(index)?;
        warn!(height = index.height, hash = %index.hash, "Chain tip reverted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn header(prev: Hash256, nonce: u32) -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_block: prev,
            merkle_root: Hash256::ZERO,
            timestamp: nonce,
            bits: 0x207fffff,
            nonce,
        }
    }

    #[test]
    fn test_insert_header_idempotent() {
        let genesis = header(Hash256::ZERO, 0);
        let chains = Chains::from_genesis(genesis);

        let next = header(genesis.hash(), 1);
        let first = chains.insert_header(next.hash(), next).unwrap();
        let again = chains.insert_header(next.hash(), next).unwrap();
        assert_eq!(first, again);
        assert_eq!(first.height, 1);
        assert_eq!(chains.header_height(), 1);
    }

    #[test]
    fn test_insert_header_orphan_and_fork() {
        let genesis = header(Hash256::ZERO, 0);
        let chains = Chains::from_genesis(genesis);
        let one = header(genesis.hash(), 1);
        chains.insert_header(one.hash(), one).unwrap();

        let orphan = header(Hash256([5; 32]), 2);
        assert!(matches!(
            chains.insert_header(orphan.hash(), orphan),
            Err(StateError::OrphanHeader { .. })
        ));

        let fork = header(genesis.hash(), 99);
        assert!(matches!(
            chains.insert_header(fork.hash(), fork),
            Err(StateError::UnsupportedFork { .. })
        ));
        assert_eq!(chains.header_height(), 1);
    }

    #[test]
    fn test_advance_tip() {
        let genesis = header(Hash256::ZERO, 0);
        let chains = Chains::from_genesis(genesis);
        let one = header(genesis.hash(), 1);
        let index = chains.insert_header(one.hash(), one).unwrap();

        assert_eq!(chains.last_block().height, 0);
        chains.advance_tip(&index).unwrap();
        assert_eq!(chains.last_block(), index);
        assert!(chains.advance_tip(&index).is_err());
    }

    #[test]
    fn test_discard_headers_keeps_accepted_blocks() {
        let genesis = header(Hash256::ZERO, 0);
        let chains = Chains::from_genesis(genesis);
        let one = header(genesis.hash(), 1);
        let index = chains.insert_header(one.hash(), one).unwrap();

        chains.advance_tip(&index).unwrap();
        assert_eq!(chains.discard_headers(&index), 0);
        assert_eq!(chains.header_height(), 1);

        let two = header(one.hash(), 2);
        let three = header(two.hash(), 3);
        let index = chains.insert_header(two.hash(), two).unwrap();
        chains.insert_header(three.hash(), three).unwrap();

        // Descendants of a discarded header go with it.
        assert_eq!(chains.discard_headers(&index), 2);
        assert_eq!(chains.header_height(), 1);
        let replacement = header(one.hash(), 22);
        assert_eq!(
            chains
                .insert_header(replacement.hash(), replacement)
                .unwrap()
                .height,
            2
        );
    }

    #[test]
    fn test_revert_tip() {
        let genesis = header(Hash256::ZERO, 0);
        let chains = Chains::from_genesis(genesis);
        let one = header(genesis.hash(), 1);
        let index = chains.insert_header(one.hash(), one).unwrap();

        chains.advance_tip(&index).unwrap();
        chains.revert_tip(&index).unwrap();
        assert_eq!(chains.last_block().height, 0);
        assert_eq!(chains.header_height(), 1);
        assert!(chains.revert_tip(&index).is_err());
    }

    #[test]
    fn test_commit_lock_is_reentrant() {
        let chains = Chains::from_genesis(header(Hash256::ZERO, 0));
        let _outer = chains.lock_commit();
        let _inner = chains.lock_commit();
    }
}
