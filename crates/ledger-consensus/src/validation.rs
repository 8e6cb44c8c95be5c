//! Block structure, context and input checks.

use crate::block::{Amount, Block, BlockIndex, Transaction};
use crate::engine::{AncestorLookup, Consensus};
use crate::script_check::{CheckStatus, ScriptFlags, ScriptValidation};
use crate::sigops::{legacy_sigop_count, p2sh_sigop_count};
use crate::utxo::UtxoView;
use crate::{ConsensusError, ConsensusResult};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, instrument};

/// Executes one input's unlocking script against the output it spends.
pub trait ScriptVerifier: Send + Sync {
    /// Whether `script_sig` satisfies `script_pubkey` under `flags`.
    fn verify(
        &self,
        tx: &Transaction,
        input_idx: usize,
        script_pubkey: &[u8],
        flags: ScriptFlags,
    ) -> bool;
}

/// Checks a block acceptor runs against each candidate block.
pub trait BlockCheck: Send + Sync {
    /// Context-free structural checks.
    fn check(&self, block: &Block) -> ConsensusResult<()>;

    /// Checks against the block being extended.
    fn check_contextual(
        &self,
        block: &Block,
        prev: &BlockIndex,
        chain: &dyn AncestorLookup,
    ) -> ConsensusResult<()>;

    /// Sigops counted without looking at spent outputs.
    fn legacy_sigops(&self, tx: &Transaction) -> u32;

    /// Sigops of the P2SH redeem scripts `tx` spends.
    fn p2sh_sigops(&self, view: &UtxoView, tx: &Transaction) -> ConsensusResult<u32>;

    /// Value and maturity checks, then submit script checks for every input.
    fn check_inputs(
        &self,
        view: &UtxoView,
        tx: &Transaction,
        height: u32,
        flags: ScriptFlags,
        validation: &dyn ScriptValidation,
    ) -> ConsensusResult<()>;

    /// Coinbase may pay at most subsidy plus fees.
    fn check_coinbase_subsidy(
        &self,
        coinbase: &Transaction,
        fees: Amount,
        height: u32,
    ) -> ConsensusResult<()>;
}

/// Default block checker.
pub struct StandardBlockCheck {
    consensus: Arc<Consensus>,
    verifier: Arc<dyn ScriptVerifier>,
}

impl StandardBlockCheck {
    /// Create a checker using `verifier` for script execution.
    pub fn new(consensus: Arc<Consensus>, verifier: Arc<dyn ScriptVerifier>) -> Self {
        Self {
            consensus,
            verifier,
        }
    }

    fn check_transaction(&self, tx: &Transaction) -> ConsensusResult<()> {
        if tx.inputs.is_empty() {
            return Err(ConsensusError::InvalidTransaction("no inputs".to_string()));
        }
        if tx.outputs.is_empty() {
            return Err(ConsensusError::InvalidTransaction("no outputs".to_string()));
        }

        let mut total: Amount = 0;
        for output in &tx.outputs {
            if output.value < 0 {
                return Err(ConsensusError::AmountOutOfRange(output.value));
            }
            if !self.consensus.check_amount(output.value) {
                return Err(ConsensusError::AmountOutOfRange(output.value));
            }
            total = total.saturating_add(output.value);
            if !self.consensus.check_amount(total) {
                return Err(ConsensusError::AmountOutOfRange(total));
            }
        }

        if !tx.is_coinbase() && tx.inputs.iter().any(|input| input.prev_out.is_null()) {
            return Err(ConsensusError::InvalidTransaction(
                "null prevout in non-coinbase".to_string(),
            ));
        }
        Ok(())
    }
}

impl BlockCheck for StandardBlockCheck {
    fn check(&self, block: &Block) -> ConsensusResult<()> {
        let coinbase = block
            .coinbase()
            .ok_or_else(|| ConsensusError::InvalidBlock("no transactions".to_string()))?;
        if !coinbase.is_coinbase() {
            return Err(ConsensusError::InvalidBlock(
                "first transaction is not a coinbase".to_string(),
            ));
        }
        if block.transactions[1..].iter().any(|tx| tx.is_coinbase()) {
            return Err(ConsensusError::InvalidBlock(
                "more than one coinbase".to_string(),
            ));
        }

        let merkle_root = block.compute_merkle_root();
        if merkle_root != block.header.merkle_root {
            return Err(ConsensusError::InvalidBlock(format!(
                "merkle root mismatch: header {}, computed {}",
                block.header.merkle_root, merkle_root
            )));
        }

        let mut spent = HashSet::new();
        let mut sigops = 0u32;
        for tx in &block.transactions {
            self.check_transaction(tx)?;
            if !tx.is_coinbase() {
                for input in &tx.inputs {
                    if !spent.insert(input.prev_out) {
                        return Err(ConsensusError::InvalidBlock(format!(
                            "outpoint {}:{} spent twice",
                            input.prev_out.txid, input.prev_out.vout
                        )));
                    }
                }
            }
            sigops = sigops.saturating_add(legacy_sigop_count(tx));
        }

        let max = self.consensus.params().max_block_sigops;
        if sigops > max {
            return Err(ConsensusError::TooManySigops { count: sigops, max });
        }
        Ok(())
    }

    #[instrument(skip(self, block, prev, chain), fields(height = prev.height + 1))]
    fn check_contextual(
        &self,
        block: &Block,
        prev: &BlockIndex,
        chain: &dyn AncestorLookup,
    ) -> ConsensusResult<()> {
        let header = &block.header;
        if header.prev_block != prev.hash {
            return Err(ConsensusError::InvalidParent {
                got: header.prev_block,
                expected: prev.hash,
            });
        }

        let expected = self.consensus.get_work_required(chain, prev)?;
        if header.bits != expected {
            return Err(ConsensusError::InvalidDifficulty {
                got: header.bits,
                expected,
            });
        }

        let median_time_past = self.consensus.median_time_past(chain, prev)?;
        if header.timestamp <= median_time_past {
            return Err(ConsensusError::InvalidTimestamp {
                block_time: header.timestamp,
                median_time_past,
            });
        }

        debug!("Contextual checks passed");
        Ok(())
    }

    fn legacy_sigops(&self, tx: &Transaction) -> u32 {
        legacy_sigop_count(tx)
    }

    fn p2sh_sigops(&self, view: &UtxoView, tx: &Transaction) -> ConsensusResult<u32> {
        p2sh_sigop_count(view, tx)
    }

    fn check_inputs(
        &self,
        view: &UtxoView,
        tx: &Transaction,
        height: u32,
        flags: ScriptFlags,
        validation: &dyn ScriptValidation,
    ) -> ConsensusResult<()> {
        let txid = tx.txid();
        let maturity = self.consensus.params().coinbase_maturity;

        let mut value_in: Amount = 0;
        for (input_idx, input) in tx.inputs.iter().enumerate() {
            let coin = view
                .get(&input.prev_out)
                .ok_or(ConsensusError::MissingInput { txid, input_idx })?;
            if coin.is_coinbase && height.saturating_sub(coin.height) < maturity {
                return Err(ConsensusError::PrematureCoinbaseSpend {
                    created: coin.height,
                    height,
                });
            }
            if coin.output.value < 0 || !self.consensus.check_amount(coin.output.value) {
                return Err(ConsensusError::AmountOutOfRange(coin.output.value));
            }
            value_in = value_in.saturating_add(coin.output.value);
            if !self.consensus.check_amount(value_in) {
                return Err(ConsensusError::AmountOutOfRange(value_in));
            }
        }

        let value_out = tx.total_output_value();
        if value_in < value_out {
            return Err(ConsensusError::InsufficientFunds {
                value_in,
                value_out,
            });
        }
        let fee = value_in - value_out;
        if !self.consensus.check_amount(fee) {
            return Err(ConsensusError::AmountOutOfRange(fee));
        }

        let tx = Arc::new(tx.clone());
        for (input_idx, input) in tx.inputs.iter().enumerate() {
            let script_pubkey = view
                .get(&input.prev_out)
                .map(|coin| coin.output.script_pubkey.clone())
                .ok_or(ConsensusError::MissingInput { txid, input_idx })?;
            let verifier = Arc::clone(&self.verifier);
            let check_tx = Arc::clone(&tx);
            let handle = validation.submit(Box::new(move || {
                if verifier.verify(&check_tx, input_idx, &script_pubkey, flags) {
                    Ok(())
                } else {
                    Err(ConsensusError::ScriptVerificationFailed { txid, input_idx })
                }
            }));
            // Inline accumulators have already run the check.
            if !validation.active() && handle.status() == CheckStatus::Failed {
                return Err(ConsensusError::ScriptVerificationFailed { txid, input_idx });
            }
        }
        Ok(())
    }

    fn check_coinbase_subsidy(
        &self,
        coinbase: &Transaction,
        fees: Amount,
        height: u32,
    ) -> ConsensusResult<()> {
        let paid = coinbase.total_output_value();
        let limit = self.consensus.get_subsidy(height).saturating_add(fees);
        if paid > limit {
            return Err(ConsensusError::SubsidyExceeded { paid, limit });
        }
        Ok(())
    }
}
