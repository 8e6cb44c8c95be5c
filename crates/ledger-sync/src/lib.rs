//! # ledger-sync
//!
//! Block body download scheduling.
//!
//! This crate provides:
//! - A per-session download window with a bounded number of in-flight blocks
//! - The command channel used to ask a peer for data
//! - Per-peer sync state and a shared registry of it
//!
//! Request timeouts and peer liveness are handled by the network layer,
//! which resolves stuck requests through [`BlockRequest::mark_received`].

mod error;
mod peer_state;
mod peers;
mod request;

pub use error::{SyncError, SyncResult};
pub use peer_state::PeerSyncState;
pub use peers::{PeerId, PeerStates};
pub use request::{
    BlockRequest, Inventory, InventoryKind, PeerSender, SyncCommand, DOWNLOAD_AMOUNT,
    MAX_IN_FLIGHT,
};
