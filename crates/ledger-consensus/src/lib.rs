//! # ledger-consensus
//!
//! Consensus rules for the ledger node.
//!
//! This crate provides:
//! - Block, transaction and chain-index types
//! - Per-network consensus parameters (presets and TOML loading)
//! - Compact target encoding and proof-of-work checks
//! - Subsidy schedule, amount range and difficulty retargeting
//! - Block structure, context and input checks
//! - Deferred script-check accumulation
//!
//! ## Difficulty Adjustment
//!
//! Every `pow_retarget_interval` blocks the target is scaled by the ratio of
//! the observed window duration to `pow_target_timespan`. The observed
//! duration is clamped to a factor of four either way, and the result never
//! exceeds the network's proof-of-work limit.

mod block;
mod compact;
mod engine;
mod error;
mod params;
mod script_check;
pub mod sigops;
mod utxo;
mod validation;

pub use block::{
    Amount, Block, BlockHeader, BlockIndex, Hash256, OutPoint, Transaction, TxIn, TxOut, COIN,
};
pub use compact::{
    check_proof_of_work, decode_compact, encode_compact, hash_to_uint, CompactTarget,
    DecodedCompact,
};
pub use engine::{AncestorLookup, Consensus, INITIAL_SUBSIDY, MEDIAN_TIME_SPAN};
pub use error::{ConsensusError, ConsensusResult};
pub use params::{ConsensusParams, Network, ParamsError};
pub use script_check::{
    CheckStatus, InlineScriptValidation, ScriptCheck, ScriptCheckGroup, ScriptCheckHandle,
    ScriptFlags, ScriptValidation,
};
pub use utxo::{Coin, UtxoView};
pub use validation::{BlockCheck, ScriptVerifier, StandardBlockCheck};
