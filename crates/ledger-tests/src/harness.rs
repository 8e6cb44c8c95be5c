//! Test harness for integration tests.
//!
//! Provides an in-memory node wired the way a real one is, a block miner
//! for regtest difficulty and a recording peer.

use crate::generators::coinbase_tx;
use ledger_consensus::{
    hash_to_uint, Block, BlockHeader, BlockIndex, CompactTarget, Consensus, ConsensusParams,
    Hash256, InlineScriptValidation, ScriptFlags, ScriptValidation, ScriptVerifier,
    StandardBlockCheck, Transaction,
};
use ledger_state::{Blocks, ChainState, Chains, HeaderChain, Headers, MemoryStore, StateResult};
use ledger_sync::{Inventory, PeerSender, SyncResult};
use parking_lot::Mutex;
use std::sync::{Arc, Once};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

/// Regtest genesis timestamp.
pub const GENESIS_TIME: u32 = 1_296_688_602;

/// Seconds between generated blocks.
pub const BLOCK_SPACING: u32 = 600;

static TRACING: Once = Once::new();

/// Install a test-friendly subscriber once per process.
pub fn init_tracing() {
    TRACING.call_once(|| {
        let subscriber = FmtSubscriber::builder()
            .with_max_level(Level::DEBUG)
            .with_target(true)
            .with_test_writer()
            .finish();
        // Another test binary may already own the global default.
        let _ = tracing::subscriber::set_global_default(subscriber);
    });
}

/// Verifier that accepts every script.
pub struct AcceptAllScripts;

impl ScriptVerifier for AcceptAllScripts {
    fn verify(&self, _: &Transaction, _: usize, _: &[u8], _: ScriptFlags) -> bool {
        true
    }
}

/// Verifier that rejects every script.
pub struct RejectAllScripts;

impl ScriptVerifier for RejectAllScripts {
    fn verify(&self, _: &Transaction, _: usize, _: &[u8], _: ScriptFlags) -> bool {
        false
    }
}

/// Increment the nonce until the header meets its own target.
pub fn mine(mut block: Block) -> Block {
    block.header.merkle_root = block.compute_merkle_root();
    let target = CompactTarget(block.header.bits)
        .to_target()
        .expect("mined block has a valid compact target");
    while hash_to_uint(&block.hash()) > target {
        block.header.nonce = block.header.nonce.wrapping_add(1);
    }
    block
}

/// Regtest genesis block.
pub fn regtest_genesis(params: &ConsensusParams) -> Block {
    mine(Block {
        header: BlockHeader {
            version: 1,
            prev_block: Hash256::ZERO,
            merkle_root: Hash256::ZERO,
            timestamp: GENESIS_TIME,
            bits: params.pow_limit_bits,
            nonce: 0,
        },
        transactions: vec![coinbase_tx(0, 50 * ledger_consensus::COIN)],
    })
}

/// A node with in-memory collaborators.
pub struct TestNode {
    pub params: Arc<ConsensusParams>,
    pub consensus: Arc<Consensus>,
    pub chains: Arc<Chains>,
    pub headers: Headers,
    pub store: Arc<MemoryStore>,
    pub blocks: Blocks,
    pub genesis: Block,
}

impl TestNode {
    /// Regtest node accepting every script.
    pub fn new() -> Self {
        Self::with_verifier(Arc::new(AcceptAllScripts))
    }

    /// Regtest node with a custom script verifier.
    pub fn with_verifier(verifier: Arc<dyn ScriptVerifier>) -> Self {
        Self::with_params(ConsensusParams::regtest(), verifier)
    }

    /// Node for arbitrary parameters.
    ///
    /// Blocks are mined at the pow limit, so it must be trivially easy.
    pub fn with_params(params: ConsensusParams, verifier: Arc<dyn ScriptVerifier>) -> Self {
        init_tracing();
        let params = Arc::new(params);
        let consensus = Arc::new(Consensus::new(Arc::clone(&params)));
        let genesis = regtest_genesis(&params);
        let chains = Arc::new(Chains::from_genesis(genesis.header));
        let headers = Headers::new(Arc::clone(&chains), Arc::clone(&params));
        let store = Arc::new(MemoryStore::new());
        let check = Arc::new(StandardBlockCheck::new(Arc::clone(&consensus), verifier));
        let blocks = Blocks::new(
            Arc::clone(&consensus),
            Arc::clone(&chains),
            check,
            store.clone(),
            store.clone(),
        );
        blocks.init(&genesis).expect("genesis initializes");
        Self {
            params,
            consensus,
            chains,
            headers,
            store,
            blocks,
            genesis,
        }
    }

    /// Last accepted block.
    pub fn tip(&self) -> BlockIndex {
        self.chains.last_block()
    }

    /// Snapshot of the chain state.
    pub fn state(&self) -> ChainState {
        self.chains.best().clone()
    }

    /// Mine a block on the accepted tip carrying `transactions` as is.
    ///
    /// The first transaction should be a coinbase.
    pub fn build_block(&self, transactions: Vec<Transaction>) -> Block {
        let tip = self.tip();
        self.build_block_on(&tip, transactions)
    }

    /// Mine a block on `parent`.
    pub fn build_block_on(&self, parent: &BlockIndex, transactions: Vec<Transaction>) -> Block {
        let bits = self
            .consensus
            .get_work_required(self.chains.best().chain(), parent)
            .expect("work required for parent");
        mine(Block {
            header: BlockHeader {
                version: 1,
                prev_block: parent.hash,
                merkle_root: Hash256::ZERO,
                timestamp: parent.header.timestamp + BLOCK_SPACING,
                bits,
                nonce: 0,
            },
            transactions,
        })
    }

    /// Next block with a coinbase claiming the full subsidy.
    pub fn next_block(&self) -> Block {
        let height = self.tip().height + 1;
        let subsidy = self.consensus.get_subsidy(height);
        self.build_block(vec![coinbase_tx(height, subsidy)])
    }

    /// Accept with inline script validation.
    pub fn accept(&self, block: &Block) -> StateResult<BlockIndex> {
        self.accept_with(block, &InlineScriptValidation::new())
    }

    /// Accept with a caller-supplied script accumulator.
    pub fn accept_with(
        &self,
        block: &Block,
        validation: &dyn ScriptValidation,
    ) -> StateResult<BlockIndex> {
        self.blocks.accept(block, &self.headers, validation)
    }

    /// Mine and accept `count` coinbase-only blocks.
    pub fn mine_blocks(&self, count: u32) -> Vec<Block> {
        (0..count)
            .map(|_| {
                let block = self.next_block();
                self.accept(&block).expect("generated block accepted");
                block
            })
            .collect()
    }

    /// Register headers only, without bodies.
    pub fn accept_headers(&self, blocks: &[Block]) -> StateResult<()> {
        for block in blocks {
            self.headers.accept(block.hash(), &block.header)?;
        }
        Ok(())
    }
}

impl Default for TestNode {
    fn default() -> Self {
        Self::new()
    }
}

/// Peer that records every request it is sent.
#[derive(Default)]
pub struct RecordingPeer {
    requests: Mutex<Vec<Vec<Inventory>>>,
}

impl RecordingPeer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every batch sent so far.
    pub fn requests(&self) -> Vec<Vec<Inventory>> {
        self.requests.lock().clone()
    }

    /// Remove and return the batches sent so far.
    pub fn take(&self) -> Vec<Vec<Inventory>> {
        std::mem::take(&mut *self.requests.lock())
    }
}

impl PeerSender for RecordingPeer {
    fn getdata(&self, inventory: Vec<Inventory>) -> SyncResult<()> {
        self.requests.lock().push(inventory);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_starts_at_genesis() {
        let node = TestNode::new();
        assert_eq!(node.tip().height, 0);
        assert_eq!(node.tip().hash, node.genesis.hash());
        assert_eq!(node.blocks.fetch(&node.genesis.hash()).unwrap(), node.genesis);
    }

    #[test]
    fn test_mine_blocks_extends_tip() {
        let node = TestNode::new();
        let blocks = node.mine_blocks(3);
        assert_eq!(node.tip().height, 3);
        assert_eq!(node.tip().hash, blocks[2].hash());
    }

    #[test]
    fn test_recording_peer() {
        let peer = RecordingPeer::new();
        peer.getdata(vec![Inventory::block(Hash256([1; 32]))]).unwrap();
        assert_eq!(peer.requests().len(), 1);
        assert_eq!(peer.take().len(), 1);
        assert!(peer.requests().is_empty());
    }
}
