//! Full block acceptance.
//!
//! Acceptance runs every check before touching the chain tip. The tip
//! advance is the single commit point, so a rejected block leaves the
//! chain state exactly as it was.

use crate::{BlockStore, Chains, HeaderChain, StateError, StateResult, UtxoProvider};
use ledger_consensus::{
    Amount, Block, BlockCheck, BlockIndex, Consensus, ConsensusError, Hash256, ScriptFlags,
    ScriptValidation,
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Accepts full blocks on top of the tracked chain.
pub struct Blocks {
    consensus: Arc<Consensus>,
    chains: Arc<Chains>,
    check: Arc<dyn BlockCheck>,
    store: Arc<dyn BlockStore>,
    utxos: Arc<dyn UtxoProvider>,
}

impl Blocks {
    /// Create an acceptor.
    pub fn new(
        consensus: Arc<Consensus>,
        chains: Arc<Chains>,
        check: Arc<dyn BlockCheck>,
        store: Arc<dyn BlockStore>,
        utxos: Arc<dyn UtxoProvider>,
    ) -> Self {
        Self {
            consensus,
            chains,
            check,
            store,
            utxos,
        }
    }

    /// Shared chain state.
    pub fn chains(&self) -> &Arc<Chains> {
        &self.chains
    }

    /// Make sure the genesis block is stored and return its index.
    pub fn init(&self, genesis: &Block) -> StateResult<BlockIndex> {
        let index = BlockIndex::new(0, genesis.header);
        let tracked = self.chains.best().chain().genesis().hash;
        if tracked != index.hash {
            return Err(StateError::TipMismatch(format!(
                "genesis {} does not match tracked genesis {}",
                index.hash, tracked
            )));
        }

        match self.store.fetch_block(&index.hash) {
            Ok(_) => debug!(hash = %index.hash, "Genesis already stored"),
            Err(StateError::BlockNotFound(_)) => {
                self.store.create_block_index_genesis(&index, genesis)?;
                info!(hash = %index.hash, "Genesis block created");
            }
            Err(e) => return Err(e),
        }
        Ok(index)
    }

    /// Stored block by hash.
    pub fn fetch(&self, hash: &Hash256) -> StateResult<Block> {
        self.store.fetch_block(hash)
    }

    /// Validate `block` against the current tip and make it the new tip.
    ///
    /// A block that builds on the accepted tip and fails validation takes its
    /// header, and every header built on it, off the best chain. A header
    /// registered by this call is dropped on any failure.
    #[instrument(skip_all, fields(hash = %block.hash()))]
    pub fn accept(
        &self,
        block: &Block,
        headers: &dyn HeaderChain,
        validation: &dyn ScriptValidation,
    ) -> StateResult<BlockIndex> {
        let _commit = self.chains.lock_commit();
        let hash = block.hash();

        if validation.is_cancelled() {
            return Err(StateError::ValidationCancelled);
        }

        let (known_height, last_hash) = {
            let best = self.chains.best();
            (best.chain().height(), best.last_block_hash())
        };
        let index = headers.accept(hash, &block.header)?;

        let outcome = self
            .validate(block, &index, validation)
            .and_then(|fees| {
                self.chains.advance_tip(&index)?;
                Ok(fees)
            });
        let fees = match outcome {
            Ok(fees) => fees,
            Err(e) => {
                if index.height > known_height || block.header.prev_block == last_hash {
                    self.chains.discard_headers(&index);
                }
                warn!(height = index.height, error = %e, "Block rejected");
                return Err(e);
            }
        };

        // The block itself is valid, so its header stays for a retry.
        if let Err(e) = self.store.insert_block(&index, block) {
            self.chains.revert_tip(&index)?;
            warn!(height = index.height, error = %e, "Block could not be stored");
            return Err(e);
        }

        debug!(
            height = index.height,
            txs = block.transactions.len(),
            fees,
            "Block accepted"
        );
        Ok(index)
    }

    /// Checks run between header registration and the tip advance.
    /// Returns the block's total fees.
    fn validate(
        &self,
        block: &Block,
        index: &BlockIndex,
        validation: &dyn ScriptValidation,
    ) -> StateResult<Amount> {
        let hash = index.hash;
        self.check.check(block)?;
        {
            let best = self.chains.best();
            self.check
                .check_contextual(block, best.last_block(), best.chain())?;
        }

        let view = self.utxos.fetch_utxo_view(block, index.height)?;

        let params = self.consensus.params();
        let flags = if block.header.timestamp >= params.p2sh_activation_time {
            ScriptFlags::P2SH
        } else {
            ScriptFlags::NONE
        };
        let max_sigops = params.max_block_sigops;

        let mut inputs = 0usize;
        let mut sigops = 0u32;
        let mut fees: Amount = 0;
        for tx in &block.transactions {
            inputs += tx.inputs.len();

            sigops = sigops.saturating_add(self.check.legacy_sigops(tx));
            if sigops > max_sigops {
                return Err(StateError::TooManySigops {
                    count: sigops,
                    max: max_sigops,
                });
            }

            if tx.is_coinbase() {
                continue;
            }

            if flags.contains(ScriptFlags::P2SH) {
                sigops = sigops.saturating_add(self.check.p2sh_sigops(&view, tx)?);
                if sigops > max_sigops {
                    return Err(StateError::TooManySigops {
                        count: sigops,
                        max: max_sigops,
                    });
                }
            }

            let fee = view
                .total_input_value(tx)?
                .saturating_sub(tx.total_output_value());
            fees = fees.saturating_add(fee);

            self.check
                .check_inputs(&view, tx, index.height, flags, validation)?;
        }

        if validation.active() && !validation.result() {
            return Err(StateError::ScriptValidationFailed(hash));
        }

        let coinbase = block
            .coinbase()
            .ok_or_else(|| ConsensusError::InvalidBlock("no transactions".to_string()))?;
        self.check
            .check_coinbase_subsidy(coinbase, fees, index.height)?;

        debug!(inputs, sigops, "Block checks passed");
        Ok(fees)
    }
}
