//! Error types for consensus validation.

use crate::block::{Amount, Hash256};
use thiserror::Error;

/// Consensus validation errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    /// Compact target could not be turned into a usable target.
    #[error("Invalid compact target {bits:#010x}: {reason}")]
    InvalidCompact { bits: u32, reason: String },

    /// Proof-of-work hash above the target.
    #[error("Invalid PoW: hash {hash} does not meet target {bits:#010x}")]
    InvalidPow { hash: Hash256, bits: u32 },

    /// Ancestor lookup outside the chain.
    #[error("Ancestor not found at height {0}")]
    AncestorNotFound(u32),

    /// Invalid block header.
    #[error("Invalid block header: {0}")]
    InvalidHeader(String),

    /// Invalid block structure.
    #[error("Invalid block: {0}")]
    InvalidBlock(String),

    /// Invalid transaction.
    #[error("Invalid transaction: {0}")]
    InvalidTransaction(String),

    /// Block does not build on the expected parent.
    #[error("Invalid parent: block builds on {got}, expected {expected}")]
    InvalidParent { got: Hash256, expected: Hash256 },

    /// Invalid timestamp.
    #[error("Invalid timestamp: block {block_time}, must be after {median_time_past}")]
    InvalidTimestamp {
        block_time: u32,
        median_time_past: u32,
    },

    /// Invalid difficulty.
    #[error("Invalid difficulty: got {got:#010x}, expected {expected:#010x}")]
    InvalidDifficulty { got: u32, expected: u32 },

    /// Signature operation count above the block limit.
    #[error("Too many sigops: {count}, max {max}")]
    TooManySigops { count: u32, max: u32 },

    /// Missing input.
    #[error("Missing input for tx {txid}: input {input_idx} not found")]
    MissingInput { txid: Hash256, input_idx: usize },

    /// Coinbase output spent before maturity.
    #[error("Premature spend of coinbase output created at height {created}, spent at {height}")]
    PrematureCoinbaseSpend { created: u32, height: u32 },

    /// Amount out of range.
    #[error("Amount out of range: {0}")]
    AmountOutOfRange(Amount),

    /// Outputs worth more than the inputs.
    #[error("Insufficient funds: inputs {value_in}, outputs {value_out}")]
    InsufficientFunds { value_in: Amount, value_out: Amount },

    /// Coinbase claims more than subsidy plus fees.
    #[error("Coinbase pays {paid}, limit is {limit}")]
    SubsidyExceeded { paid: Amount, limit: Amount },

    /// Script verification failed.
    #[error("Script verification failed for tx {txid} input {input_idx}")]
    ScriptVerificationFailed { txid: Hash256, input_idx: usize },

    /// A script check panicked instead of returning.
    #[error("Script check panicked")]
    ScriptCheckPanicked,
}

/// Result type for consensus operations.
pub type ConsensusResult<T> = Result<T, ConsensusError>;
