//! Block persistence and UTXO view construction.

use crate::{StateError, StateResult};
use ledger_consensus::{
    Block, BlockIndex, Coin, ConsensusError, Hash256, OutPoint, Transaction, UtxoView,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use tracing::debug;

/// Persistent storage for block bodies and indexes.
pub trait BlockStore: Send + Sync {
    /// Store an accepted block and apply its spends and outputs.
    fn insert_block(&self, index: &BlockIndex, block: &Block) -> StateResult<()>;

    /// Block body by hash.
    fn fetch_block(&self, hash: &Hash256) -> StateResult<Block>;

    /// Block index by hash.
    fn fetch_index(&self, hash: &Hash256) -> StateResult<BlockIndex>;

    /// Store the genesis index and body.
    fn create_block_index_genesis(&self, index: &BlockIndex, block: &Block) -> StateResult<()>;
}

/// Builds the UTXO view a candidate block needs.
pub trait UtxoProvider: Send + Sync {
    /// Coins for every input in `block`, which would sit at `height`.
    ///
    /// Outputs created earlier in the same block satisfy later inputs.
    fn fetch_utxo_view(&self, block: &Block, height: u32) -> StateResult<UtxoView>;
}

#[derive(Default)]
struct StoreInner {
    blocks: HashMap<Hash256, Block>,
    indexes: HashMap<Hash256, BlockIndex>,
    utxos: HashMap<OutPoint, Coin>,
}

/// In-memory block store and UTXO set.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<StoreInner>,
}

impl MemoryStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of unspent outputs.
    pub fn utxo_count(&self) -> usize {
        self.inner.read().utxos.len()
    }

    /// Unspent coin at `outpoint`.
    pub fn coin(&self, outpoint: &OutPoint) -> Option<Coin> {
        self.inner.read().utxos.get(outpoint).cloned()
    }

    /// Number of stored block bodies.
    pub fn block_count(&self) -> usize {
        self.inner.read().blocks.len()
    }
}

fn created_coins(tx: &Transaction, height: u32) -> impl Iterator<Item = (OutPoint, Coin)> + '_ {
    let txid = tx.txid();
    let is_coinbase = tx.is_coinbase();
    tx.outputs.iter().enumerate().map(move |(vout, output)| {
        (
            OutPoint::new(txid, vout as u32),
            Coin {
                output: output.clone(),
                height,
                is_coinbase,
            },
        )
    })
}

impl BlockStore for MemoryStore {
    fn insert_block(&self, index: &BlockIndex, block: &Block) -> StateResult<()> {
        let mut inner = self.inner.write();
        for tx in &block.transactions {
            if !tx.is_coinbase() {
                for input in &tx.inputs {
                    inner.utxos.remove(&input.prev_out);
                }
            }
            inner.utxos.extend(created_coins(tx, index.height));
        }
        inner.indexes.insert(index.hash, index.clone());
        inner.blocks.insert(index.hash, block.clone());
        debug!(height = index.height, hash = %index.hash, "Block stored");
        Ok(())
    }

    fn fetch_block(&self, hash: &Hash256) -> StateResult<Block> {
        self.inner
            .read()
            .blocks
            .get(hash)
            .cloned()
            .ok_or(StateError::BlockNotFound(*hash))
    }

    fn fetch_index(&self, hash: &Hash256) -> StateResult<BlockIndex> {
        self.inner
            .read()
            .indexes
            .get(hash)
            .cloned()
            .ok_or(StateError::IndexNotFound(*hash))
    }

    fn create_block_index_genesis(&self, index: &BlockIndex, block: &Block) -> StateResult<()> {
        // Genesis outputs are not spendable.
        let mut inner = self.inner.write();
        inner.indexes.insert(index.hash, index.clone());
        inner.blocks.insert(index.hash, block.clone());
        Ok(())
    }
}

impl UtxoProvider for MemoryStore {
    fn fetch_utxo_view(&self, block: &Block, height: u32) -> StateResult<UtxoView> {
        let inner = self.inner.read();
        let mut created: HashMap<OutPoint, Coin> = HashMap::new();
        let mut view = UtxoView::new();

        for tx in &block.transactions {
            if !tx.is_coinbase() {
                let txid = tx.txid();
                for (input_idx, input) in tx.inputs.iter().enumerate() {
                    let coin = created
                        .get(&input.prev_out)
                        .or_else(|| inner.utxos.get(&input.prev_out))
                        .cloned()
                        .ok_or(ConsensusError::MissingInput { txid, input_idx })?;
                    view.insert(input.prev_out, coin);
                }
            }
            created.extend(created_coins(tx, height));
        }
        Ok(view)
    }
}
