//! Error types for state management.

use ledger_consensus::Hash256;
use thiserror::Error;

/// State management errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StateError {
    /// Consensus error.
    #[error("Consensus error: {0}")]
    Consensus(#[from] ledger_consensus::ConsensusError),

    /// Block body not stored.
    #[error("Block not found: {0}")]
    BlockNotFound(Hash256),

    /// Block index not stored.
    #[error("Block index not found: {0}")]
    IndexNotFound(Hash256),

    /// Header's parent is unknown.
    #[error("Orphan header {hash}: parent {parent} unknown")]
    OrphanHeader { hash: Hash256, parent: Hash256 },

    /// Header builds on a block other than the best header tip.
    #[error("Header {hash} forks from the best chain at {parent}")]
    UnsupportedFork { hash: Hash256, parent: Hash256 },

    /// Supplied hash does not match the header.
    #[error("Header hash mismatch: supplied {supplied}, computed {computed}")]
    HeaderHashMismatch { supplied: Hash256, computed: Hash256 },

    /// Hash is not on the best chain.
    #[error("Hash not on chain: {0}")]
    NotOnChain(Hash256),

    /// Tip update would not extend the current tip by one block.
    #[error("Invalid tip update: {0}")]
    TipMismatch(String),

    /// Block exceeds the sigop limit.
    #[error("Too many sigops: {count}, max {max}")]
    TooManySigops { count: u32, max: u32 },

    /// Deferred script checks reported a failure.
    #[error("Script validation failed for block {0}")]
    ScriptValidationFailed(Hash256),

    /// Script accumulator was cancelled before this block started.
    #[error("Script validation already cancelled by an earlier failure")]
    ValidationCancelled,
}

/// Result type for state operations.
pub type StateResult<T> = Result<T, StateError>;
