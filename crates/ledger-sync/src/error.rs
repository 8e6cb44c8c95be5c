//! Sync error types.

use ledger_consensus::Hash256;
use thiserror::Error;

/// Sync errors.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// State error.
    #[error("State error: {0}")]
    State(#[from] ledger_state::StateError),

    /// Request start is not on the best chain.
    #[error("Hash not on chain: {0}")]
    HashNotOnChain(Hash256),

    /// The peer's command channel is closed.
    #[error("Peer channel closed")]
    ChannelClosed,
}

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;
