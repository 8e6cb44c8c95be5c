//! # ledger-state
//!
//! Chain state tracking and full block acceptance.
//!
//! - [`Chains`]: shared owner of the best header chain and accepted tip
//! - [`Headers`]: header registration with proof-of-work checks
//! - [`Blocks`]: the block acceptor
//! - [`MemoryStore`]: in-memory block store and UTXO set
//!
//! Block acceptance is serialized per chain. Header registration, every
//! consensus check and the tip advance run under one commit lock, and a
//! rejected block leaves both the header chain and the tip untouched.

mod blocks;
mod chain;
mod chains;
mod error;
mod headers;
mod store;

pub use blocks::Blocks;
pub use chain::{Chain, ChainState};
pub use chains::Chains;
pub use error::{StateError, StateResult};
pub use headers::{HeaderChain, Headers};
pub use store::{BlockStore, MemoryStore, UtxoProvider};
