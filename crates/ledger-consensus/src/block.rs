//! Block, transaction and chain index types.
//!
//! Hashes are BLAKE2b-256 over a fixed little-endian layout. The layout only
//! feeds hashing; network encoding lives outside this crate.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use std::fmt;

type Blake2b256 = Blake2b<U32>;

/// Monetary amount in base units.
pub type Amount = i64;

/// Base units per coin.
pub const COIN: Amount = 100_000_000;

/// 32-byte hash identifying blocks and transactions.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Hash256(pub [u8; 32]);

impl Hash256 {
    /// The all-zero hash.
    pub const ZERO: Hash256 = Hash256([0u8; 32]);

    /// Hash arbitrary bytes.
    pub fn digest(data: &[u8]) -> Self {
        let mut hasher = Blake2b256::new();
        hasher.update(data);
        let mut out = [0u8; 32];
        out.copy_from_slice(&hasher.finalize());
        Self(out)
    }

    /// Whether every byte is zero.
    pub fn is_null(&self) -> bool {
        self.0 == [0u8; 32]
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl From<[u8; 32]> for Hash256 {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Hash256 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash256({})", hex::encode(self.0))
    }
}

/// Block header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Block version.
    pub version: i32,
    /// Parent block hash.
    pub prev_block: Hash256,
    /// Merkle root of the block's transaction ids.
    pub merkle_root: Hash256,
    /// Timestamp in seconds.
    pub timestamp: u32,
    /// Compact proof-of-work target.
    pub bits: u32,
    /// Proof-of-work nonce.
    pub nonce: u32,
}

impl BlockHeader {
    /// Serialized header length.
    pub const SIZE: usize = 80;

    /// Header bytes in hashing layout.
    pub fn to_bytes(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..36].copy_from_slice(&self.prev_block.0);
        out[36..68].copy_from_slice(&self.merkle_root.0);
        out[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        out[72..76].copy_from_slice(&self.bits.to_le_bytes());
        out[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        out
    }

    /// Block hash.
    pub fn hash(&self) -> Hash256 {
        Hash256::digest(&self.to_bytes())
    }
}

/// Reference to a transaction output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OutPoint {
    /// Transaction id.
    pub txid: Hash256,
    /// Output index.
    pub vout: u32,
}

impl OutPoint {
    /// Create an outpoint.
    pub fn new(txid: Hash256, vout: u32) -> Self {
        Self { txid, vout }
    }

    /// The outpoint carried by coinbase inputs.
    pub fn null() -> Self {
        Self {
            txid: Hash256::ZERO,
            vout: u32::MAX,
        }
    }

    /// Whether this is the coinbase outpoint.
    pub fn is_null(&self) -> bool {
        self.txid.is_null() && self.vout == u32::MAX
    }
}

/// Transaction input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    /// Output being spent.
    pub prev_out: OutPoint,
    /// Unlocking script.
    pub script_sig: Vec<u8>,
    /// Sequence number.
    pub sequence: u32,
}

/// Transaction output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    /// Value in base units.
    pub value: Amount,
    /// Locking script.
    pub script_pubkey: Vec<u8>,
}

/// Transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub version: i32,
    pub inputs: Vec<TxIn>,
    pub outputs: Vec<TxOut>,
    pub lock_time: u32,
}

impl Transaction {
    /// Transaction bytes in hashing layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16 + self.inputs.len() * 48 + self.outputs.len() * 40);
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&(self.inputs.len() as u32).to_le_bytes());
        for input in &self.inputs {
            out.extend_from_slice(&input.prev_out.txid.0);
            out.extend_from_slice(&input.prev_out.vout.to_le_bytes());
            out.extend_from_slice(&(input.script_sig.len() as u32).to_le_bytes());
            out.extend_from_slice(&input.script_sig);
            out.extend_from_slice(&input.sequence.to_le_bytes());
        }
        out.extend_from_slice(&(self.outputs.len() as u32).to_le_bytes());
        for output in &self.outputs {
            out.extend_from_slice(&output.value.to_le_bytes());
            out.extend_from_slice(&(output.script_pubkey.len() as u32).to_le_bytes());
            out.extend_from_slice(&output.script_pubkey);
        }
        out.extend_from_slice(&self.lock_time.to_le_bytes());
        out
    }

    /// Transaction id.
    pub fn txid(&self) -> Hash256 {
        Hash256::digest(&self.to_bytes())
    }

    /// A coinbase has exactly one input, spending the null outpoint.
    pub fn is_coinbase(&self) -> bool {
        self.inputs.len() == 1 && self.inputs[0].prev_out.is_null()
    }

    /// Sum of output values.
    pub fn total_output_value(&self) -> Amount {
        self.outputs
            .iter()
            .fold(0, |acc: Amount, out| acc.saturating_add(out.value))
    }
}

/// Full block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub header: BlockHeader,
    pub transactions: Vec<Transaction>,
}

impl Block {
    /// Block hash (header hash).
    pub fn hash(&self) -> Hash256 {
        self.header.hash()
    }

    /// First transaction, if any.
    pub fn coinbase(&self) -> Option<&Transaction> {
        self.transactions.first()
    }

    /// Merkle root over transaction ids.
    ///
    /// Odd levels duplicate their last node. An empty block yields the zero hash.
    pub fn compute_merkle_root(&self) -> Hash256 {
        let mut level: Vec<Hash256> = self.transactions.iter().map(|tx| tx.txid()).collect();
        if level.is_empty() {
            return Hash256::ZERO;
        }
        while level.len() > 1 {
            if level.len() % 2 == 1 {
                let last = level[level.len() - 1];
                level.push(last);
            }
            level = level
                .chunks(2)
                .map(|pair| {
                    let mut buf = [0u8; 64];
                    buf[..32].copy_from_slice(&pair[0].0);
                    buf[32..].copy_from_slice(&pair[1].0);
                    Hash256::digest(&buf)
                })
                .collect();
        }
        level[0]
    }
}

/// A block's position on a chain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockIndex {
    /// Block hash.
    pub hash: Hash256,
    /// Height above genesis (genesis is 0).
    pub height: u32,
    /// Block header.
    pub header: BlockHeader,
}

impl BlockIndex {
    /// Create an index entry, hashing the header.
    pub fn new(height: u32, header: BlockHeader) -> Self {
        Self {
            hash: header.hash(),
            height,
            header,
        }
    }
}
