//! Test data generators for integration tests.

use ledger_consensus::sigops::{OP_CHECKSIG, OP_EQUAL, OP_HASH160};
use ledger_consensus::{
    Amount, BlockHeader, BlockIndex, Hash256, OutPoint, Transaction, TxIn, TxOut,
};

/// Hash with a recognizable seed byte.
pub fn test_hash(seed: u8) -> Hash256 {
    let mut bytes = [0u8; 32];
    bytes[0] = seed;
    bytes[31] = seed.wrapping_mul(7);
    Hash256(bytes)
}

/// Coinbase paying `value`. The height in the script keeps txids unique.
pub fn coinbase_tx(height: u32, value: Amount) -> Transaction {
    let mut script_sig = vec![0x04];
    script_sig.extend_from_slice(&height.to_le_bytes());
    Transaction {
        version: 1,
        inputs: vec![TxIn {
            prev_out: OutPoint::null(),
            script_sig,
            sequence: u32::MAX,
        }],
        outputs: vec![TxOut {
            value,
            script_pubkey: vec![0x51],
        }],
        lock_time: 0,
    }
}

/// Single-input transaction spending `prev_out` into one output of `value`.
pub fn spend_tx(prev_out: OutPoint, value: Amount) -> Transaction {
    Transaction {
        version: 1,
        inputs: vec![TxIn {
            prev_out,
            script_sig: vec![0x51],
            sequence: u32::MAX,
        }],
        outputs: vec![TxOut {
            value,
            script_pubkey: vec![0x51],
        }],
        lock_time: 0,
    }
}

/// `OP_HASH160 <20 bytes> OP_EQUAL`.
pub fn p2sh_script(seed: u8) -> Vec<u8> {
    let mut script = vec![OP_HASH160, 20];
    script.extend_from_slice(&[seed; 20]);
    script.push(OP_EQUAL);
    script
}

/// Script with `count` bare `OP_CHECKSIG`s.
pub fn checksig_script(count: usize) -> Vec<u8> {
    vec![OP_CHECKSIG; count]
}

/// Unmined header with the given parent, time and bits.
pub fn header_with(prev: Hash256, timestamp: u32, bits: u32) -> BlockHeader {
    BlockHeader {
        version: 1,
        prev_block: prev,
        merkle_root: Hash256::ZERO,
        timestamp,
        bits,
        nonce: 0,
    }
}

/// Linked indexes from height 0, spaced `spacing` seconds apart.
pub fn index_chain(len: u32, start_time: u32, spacing: u32, bits: u32) -> Vec<BlockIndex> {
    let mut indexes: Vec<BlockIndex> = Vec::with_capacity(len as usize);
    for height in 0..len {
        let prev = indexes.last().map(|i| i.hash).unwrap_or(Hash256::ZERO);
        let header = header_with(prev, start_time + height * spacing, bits);
        indexes.push(BlockIndex::new(height, header));
    }
    indexes
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coinbase_txids_unique_by_height() {
        assert_ne!(coinbase_tx(1, 5).txid(), coinbase_tx(2, 5).txid());
        assert!(coinbase_tx(1, 5).is_coinbase());
    }

    #[test]
    fn test_index_chain_links() {
        let chain = index_chain(4, 100, 10, 0x207fffff);
        assert_eq!(chain.len(), 4);
        for pair in chain.windows(2) {
            assert_eq!(pair[1].header.prev_block, pair[0].hash);
            assert_eq!(pair[1].height, pair[0].height + 1);
        }
        assert_eq!(chain[3].header.timestamp, 130);
    }
}
