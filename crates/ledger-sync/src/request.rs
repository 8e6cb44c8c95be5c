//! Block download window.
//!
//! A `BlockRequest` walks the best header chain forward from a cursor and
//! asks one peer for the next batch of block bodies. At most
//! [`MAX_IN_FLIGHT`] bodies are outstanding at a time and a single walk
//! never looks further than [`DOWNLOAD_AMOUNT`] heights ahead.

use crate::{SyncError, SyncResult};
use ledger_consensus::Hash256;
use ledger_state::ChainState;
use parking_lot::Mutex;
use std::collections::HashSet;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, trace};

/// Heights examined per request walk.
pub const DOWNLOAD_AMOUNT: u32 = 500;

/// Maximum blocks outstanding per window.
pub const MAX_IN_FLIGHT: usize = 32;

/// Kind of object an inventory entry refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InventoryKind {
    /// Full block.
    Block,
}

/// Reference to a network object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Inventory {
    pub kind: InventoryKind,
    pub hash: Hash256,
}

impl Inventory {
    /// Block reference.
    pub fn block(hash: Hash256) -> Self {
        Self {
            kind: InventoryKind::Block,
            hash,
        }
    }
}

/// Commands sent to a peer session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncCommand {
    /// Request the listed objects.
    GetData(Vec<Inventory>),
}

/// Outbound side of a peer connection.
pub trait PeerSender: Send + Sync {
    /// Send a batched data request. Does not wait for a reply.
    fn getdata(&self, inventory: Vec<Inventory>) -> SyncResult<()>;
}

impl PeerSender for UnboundedSender<SyncCommand> {
    fn getdata(&self, inventory: Vec<Inventory>) -> SyncResult<()> {
        self.send(SyncCommand::GetData(inventory))
            .map_err(|_| SyncError::ChannelClosed)
    }
}

#[derive(Debug, Default)]
struct Window {
    in_flight: HashSet<Hash256>,
    last_requested: Option<Hash256>,
}

/// Download window for one sync session.
#[derive(Debug, Default)]
pub struct BlockRequest {
    window: Mutex<Window>,
}

impl BlockRequest {
    /// Empty window.
    pub fn new() -> Self {
        Self::default()
    }

    /// Next batch after the last accepted block.
    pub fn next_inventory(&self, state: &ChainState) -> SyncResult<Vec<Inventory>> {
        self.relative_next_inventory(state, &state.last_block_hash())
    }

    /// Next batch after `start`, which must be on the best chain.
    pub fn relative_next_inventory(
        &self,
        state: &ChainState,
        start: &Hash256,
    ) -> SyncResult<Vec<Inventory>> {
        let window = self.window.lock();
        next_after(&window, state, start)
    }

    /// Request the next batch from `peer`, continuing from the cursor.
    ///
    /// Returns the number of blocks requested.
    pub fn request_next_blocks(
        &self,
        state: &ChainState,
        peer: &dyn PeerSender,
    ) -> SyncResult<usize> {
        let mut window = self.window.lock();
        let start = window
            .last_requested
            .unwrap_or_else(|| state.last_block_hash());
        let inventory = next_after(&window, state, &start)?;
        let Some(last) = inventory.last().map(|inv| inv.hash) else {
            trace!(in_flight = window.in_flight.len(), "Nothing to request");
            return Ok(0);
        };

        let hashes: Vec<Hash256> = inventory.iter().map(|inv| inv.hash).collect();
        peer.getdata(inventory)?;

        let count = hashes.len();
        window.in_flight.extend(hashes);
        window.last_requested = Some(last);

        debug!(
            count,
            in_flight = window.in_flight.len(),
            last = %last,
            "Requested blocks"
        );
        Ok(count)
    }

    /// Whether `hash` has been requested and not yet resolved.
    pub fn is_in_flight(&self, hash: &Hash256) -> bool {
        self.window.lock().in_flight.contains(hash)
    }

    /// Resolve a requested block, whether it was accepted or rejected.
    pub fn mark_received(&self, hash: &Hash256) {
        if self.window.lock().in_flight.remove(hash) {
            trace!(%hash, "Block resolved");
        }
    }

    /// Number of outstanding blocks.
    pub fn in_flight_count(&self) -> usize {
        self.window.lock().in_flight.len()
    }

    /// Cursor of the last requested block.
    pub fn last_requested(&self) -> Option<Hash256> {
        self.window.lock().last_requested
    }

    /// Forget every outstanding request and the cursor.
    pub fn reset(&self) {
        let mut window = self.window.lock();
        window.in_flight.clear();
        window.last_requested = None;
    }
}

fn next_after(
    window: &Window,
    state: &ChainState,
    start: &Hash256,
) -> SyncResult<Vec<Inventory>> {
    let chain = state.chain();
    let start_height = chain
        .height_from_hash(start)
        .ok_or(SyncError::HashNotOnChain(*start))?
        + 1;
    // Exclusive bound, so the header tip itself is never requested.
    let stop_height = start_height.saturating_add(DOWNLOAD_AMOUNT).min(chain.height());

    let in_flight = window.in_flight.len();
    let mut inventory = Vec::new();
    for height in start_height..stop_height {
        if in_flight + inventory.len() >= MAX_IN_FLIGHT {
            break;
        }
        if let Some(hash) = chain.hash_from_height(height) {
            inventory.push(Inventory::block(hash));
        }
    }
    Ok(inventory)
}
