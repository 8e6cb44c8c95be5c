//! Best header chain and the per-session chain state.

use crate::{StateError, StateResult};
use ledger_consensus::{AncestorLookup, BlockIndex, ConsensusError, ConsensusResult, Hash256};
use std::collections::HashMap;

/// A linear chain of block indexes from genesis to the best header.
#[derive(Debug, Clone)]
pub struct Chain {
    /// Indexes by height.
    indexes: Vec<BlockIndex>,
    /// Hash to height.
    heights: HashMap<Hash256, u32>,
}

impl Chain {
    /// Chain holding only `genesis`.
    pub fn new(genesis: BlockIndex) -> Self {
        let mut heights = HashMap::new();
        heights.insert(genesis.hash, 0);
        let genesis = BlockIndex {
            height: 0,
            ..genesis
        };
        Self {
            indexes: vec![genesis],
            heights,
        }
    }

    /// Append `index`, which must build on the current tip.
    pub fn push(&mut self, index: BlockIndex) -> StateResult<()> {
        let tip = self.tip();
        if index.header.prev_block != tip.hash || index.height != tip.height + 1 {
            return Err(StateError::TipMismatch(format!(
                "{} at height {} does not extend {} at height {}",
                index.hash, index.height, tip.hash, tip.height
            )));
        }
        self.heights.insert(index.hash, index.height);
        self.indexes.push(index);
        Ok(())
    }

    /// Drop every index at `height` and above. Genesis is never removed.
    pub(crate) fn truncate(&mut self, height: u32) -> Vec<BlockIndex> {
        let keep = (height.max(1) as usize).min(self.indexes.len());
        let removed = self.indexes.split_off(keep);
        for index in &removed {
            self.heights.remove(&index.hash);
        }
        removed
    }

    /// Best index.
    pub fn tip(&self) -> &BlockIndex {
        // Never empty: constructed with genesis and only grows.
        &self.indexes[self.indexes.len() - 1]
    }

    /// Height of the best index.
    pub fn height(&self) -> u32 {
        self.tip().height
    }

    /// Genesis index.
    pub fn genesis(&self) -> &BlockIndex {
        &self.indexes[0]
    }

    /// Whether `hash` is on this chain.
    pub fn contains_hash(&self, hash: &Hash256) -> bool {
        self.heights.contains_key(hash)
    }

    /// Height of `hash` on this chain.
    pub fn height_from_hash(&self, hash: &Hash256) -> Option<u32> {
        self.heights.get(hash).copied()
    }

    /// Hash at `height` on this chain.
    pub fn hash_from_height(&self, height: u32) -> Option<Hash256> {
        self.indexes.get(height as usize).map(|index| index.hash)
    }

    /// Index at `height`.
    pub fn index_at(&self, height: u32) -> Option<&BlockIndex> {
        self.indexes.get(height as usize)
    }

    /// Index of `hash`.
    pub fn index_of(&self, hash: &Hash256) -> Option<&BlockIndex> {
        self.height_from_hash(hash)
            .and_then(|height| self.index_at(height))
    }

    /// Number of indexes, genesis included.
    pub fn len(&self) -> usize {
        self.indexes.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.indexes.is_empty()
    }
}

impl AncestorLookup for Chain {
    fn fetch_ancestor(&self, height: u32) -> ConsensusResult<BlockIndex> {
        self.index_at(height)
            .cloned()
            .ok_or(ConsensusError::AncestorNotFound(height))
    }
}

/// Best header chain plus the last block whose body has been accepted.
#[derive(Debug, Clone)]
pub struct ChainState {
    chain: Chain,
    last_block: BlockIndex,
}

impl ChainState {
    /// State at genesis.
    pub fn new(chain: Chain) -> Self {
        let last_block = chain.genesis().clone();
        Self { chain, last_block }
    }

    /// State whose accepted tip is `last_block`, which must be on `chain`.
    pub fn with_last_block(chain: Chain, last_block: &Hash256) -> StateResult<Self> {
        let last_block = chain
            .index_of(last_block)
            .cloned()
            .ok_or(StateError::NotOnChain(*last_block))?;
        Ok(Self { chain, last_block })
    }

    /// Best header chain.
    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    /// Last accepted block.
    pub fn last_block(&self) -> &BlockIndex {
        &self.last_block
    }

    /// Hash of the last accepted block.
    pub fn last_block_hash(&self) -> Hash256 {
        self.last_block.hash
    }

    pub(crate) fn chain_mut(&mut self) -> &mut Chain {
        &mut self.chain
    }

    /// Move the accepted tip forward by exactly one block on the chain.
    pub(crate) fn update_last_block(&mut self, index: &BlockIndex) -> StateResult<()> {
        if index.height != self.last_block.height + 1
            || index.header.prev_block != self.last_block.hash
        {
            return Err(StateError::TipMismatch(format!(
                "{} at height {} does not extend last block {} at height {}",
                index.hash, index.height, self.last_block.hash, self.last_block.height
            )));
        }
        if self.chain.hash_from_height(index.height) != Some(index.hash) {
            return Err(StateError::NotOnChain(index.hash));
        }
        self.last_block = index.clone();
        Ok(())
    }

    /// Drop the headers from `index` upward. Accepted blocks are kept.
    pub(crate) fn discard_headers(&mut self, index: &BlockIndex) -> Vec<BlockIndex> {
        if index.height <= self.last_block.height
            || self.chain.hash_from_height(index.height) != Some(index.hash)
        {
            return Vec::new();
        }
        self.chain.truncate(index.height)
    }

    /// Undo `update_last_block(index)`.
    pub(crate) fn revert_last_block(&mut self, index: &BlockIndex) -> StateResult<()> {
        if self.last_block.hash != index.hash || index.height == 0 {
            return Err(StateError::TipMismatch(format!(
                "{} is not the last block {}",
                index.hash, self.last_block.hash
            )));
        }
        let parent = self
            .chain
            .index_at(index.height - 1)
            .cloned()
            .ok_or(StateError::NotOnChain(index.header.prev_block))?;
        self.last_block = parent;
        Ok(())
    }
}
