//! Header registration.

use crate::{Chains, StateError, StateResult};
use ledger_consensus::{check_proof_of_work, BlockHeader, BlockIndex, ConsensusParams, Hash256};
use std::sync::Arc;
use tracing::warn;

/// Registers headers into the best header chain.
pub trait HeaderChain: Send + Sync {
    /// Register `header` under `hash`, returning its index.
    ///
    /// Idempotent for known headers. Registration is serialized with block
    /// acceptance on the same chain.
    fn accept(&self, hash: Hash256, header: &BlockHeader) -> StateResult<BlockIndex>;
}

/// Header chain backed by the shared chain state.
pub struct Headers {
    chains: Arc<Chains>,
    params: Arc<ConsensusParams>,
}

impl Headers {
    /// Create a header chain over `chains`.
    pub fn new(chains: Arc<Chains>, params: Arc<ConsensusParams>) -> Self {
        Self { chains, params }
    }
}

impl HeaderChain for Headers {
    fn accept(&self, hash: Hash256, header: &BlockHeader) -> StateResult<BlockIndex> {
        let computed = header.hash();
        if computed != hash {
            return Err(StateError::HeaderHashMismatch {
                supplied: hash,
                computed,
            });
        }

        if let Err(e) = check_proof_of_work(&hash, header.bits, &self.params) {
            warn!(%hash, bits = header.bits, error = %e, "Header failed proof-of-work");
            return Err(e.into());
        }

        let _commit = self.chains.lock_commit();
        self.chains.insert_header(hash, *header)
    }
}
