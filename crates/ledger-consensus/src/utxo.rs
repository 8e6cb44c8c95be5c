//! Read view over the unspent outputs a block consumes.

use crate::block::{Amount, OutPoint, Transaction, TxOut};
use crate::{ConsensusError, ConsensusResult};
use std::collections::HashMap;

/// An unspent output with its creation context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Coin {
    /// The output itself.
    pub output: TxOut,
    /// Height of the block that created it.
    pub height: u32,
    /// Created by a coinbase transaction.
    pub is_coinbase: bool,
}

/// The subset of the UTXO set referenced by one block's inputs.
///
/// Built fresh for each acceptance attempt and dropped afterwards.
#[derive(Debug, Clone, Default)]
pub struct UtxoView {
    coins: HashMap<OutPoint, Coin>,
}

impl UtxoView {
    /// Empty view.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a coin to the view.
    pub fn insert(&mut self, outpoint: OutPoint, coin: Coin) {
        self.coins.insert(outpoint, coin);
    }

    /// Coin at `outpoint`.
    pub fn get(&self, outpoint: &OutPoint) -> Option<&Coin> {
        self.coins.get(outpoint)
    }

    /// Whether `outpoint` is in the view.
    pub fn contains(&self, outpoint: &OutPoint) -> bool {
        self.coins.contains_key(outpoint)
    }

    /// Number of coins.
    pub fn len(&self) -> usize {
        self.coins.len()
    }

    /// Whether the view is empty.
    pub fn is_empty(&self) -> bool {
        self.coins.is_empty()
    }

    /// Sum of the values spent by `tx`.
    pub fn total_input_value(&self, tx: &Transaction) -> ConsensusResult<Amount> {
        let txid = tx.txid();
        tx.inputs
            .iter()
            .enumerate()
            .try_fold(0 as Amount, |acc, (input_idx, input)| {
                let coin = self
                    .get(&input.prev_out)
                    .ok_or(ConsensusError::MissingInput { txid, input_idx })?;
                Ok(acc.saturating_add(coin.output.value))
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::{Hash256, TxIn};

    fn coin(value: Amount) -> Coin {
        Coin {
            output: TxOut {
                value,
                script_pubkey: vec![0x51],
            },
            height: 1,
            is_coinbase: false,
        }
    }

    fn spend(outpoints: &[OutPoint]) -> Transaction {
        Transaction {
            version: 1,
            inputs: outpoints
                .iter()
                .map(|prev_out| TxIn {
                    prev_out: *prev_out,
                    script_sig: Vec::new(),
                    sequence: u32::MAX,
                })
                .collect(),
            outputs: Vec::new(),
            lock_time: 0,
        }
    }

    #[test]
    fn test_total_input_value() {
        let a = OutPoint::new(Hash256([1; 32]), 0);
        let b = OutPoint::new(Hash256([2; 32]), 3);
        let mut view = UtxoView::new();
        view.insert(a, coin(70));
        view.insert(b, coin(30));

        assert_eq!(view.len(), 2);
        assert_eq!(view.total_input_value(&spend(&[a, b])).unwrap(), 100);
    }

    #[test]
    fn test_total_input_value_missing() {
        let a = OutPoint::new(Hash256([1; 32]), 0);
        let view = UtxoView::new();
        assert!(view.is_empty());
        assert!(matches!(
            view.total_input_value(&spend(&[a])),
            Err(ConsensusError::MissingInput { input_idx: 0, .. })
        ));
    }
}
