//! Subsidy schedule, amount range and difficulty retargeting.
//!
//! Every function here is pure over the network parameters and, for
//! retargeting, an ancestor lookup on the chain being extended.

use crate::block::{Amount, BlockIndex, COIN};
use crate::compact::{encode_compact, CompactTarget};
use crate::params::ConsensusParams;
use crate::{ConsensusError, ConsensusResult};
use num_bigint::BigUint;
use std::sync::Arc;
use tracing::debug;

/// Number of blocks used for the median time past.
pub const MEDIAN_TIME_SPAN: u32 = 11;

/// Subsidy paid by the first block.
pub const INITIAL_SUBSIDY: Amount = 50 * COIN;

/// Lookup of blocks below the tip of a chain.
pub trait AncestorLookup {
    /// Index at `height` on this chain.
    fn fetch_ancestor(&self, height: u32) -> ConsensusResult<BlockIndex>;
}

/// Consensus rules bound to one network's parameters.
#[derive(Debug, Clone)]
pub struct Consensus {
    params: Arc<ConsensusParams>,
}

impl Consensus {
    /// Create the rule set for `params`.
    pub fn new(params: Arc<ConsensusParams>) -> Self {
        Self { params }
    }

    /// Network parameters.
    pub fn params(&self) -> &ConsensusParams {
        &self.params
    }

    /// Shared handle to the parameters.
    pub fn params_arc(&self) -> Arc<ConsensusParams> {
        Arc::clone(&self.params)
    }

    /// Upper bound check against total supply.
    ///
    /// Negative amounts pass; callers that must reject them do so separately.
    pub fn check_amount(&self, amount: Amount) -> bool {
        amount < 0 || amount < self.params.max_money.saturating_mul(COIN)
    }

    /// Block subsidy at `height`.
    pub fn get_subsidy(&self, height: u32) -> Amount {
        let halvings = height / self.params.subsidy_halving_interval;
        if halvings >= 64 {
            return 0;
        }
        INITIAL_SUBSIDY >> halvings
    }

    /// Clamp an observed window duration to `[target / 4, target * 4]`.
    pub fn calculate_work_timespan(&self, actual_timespan: i64, target_timespan: i64) -> i64 {
        let lowest = target_timespan / 4;
        let highest = target_timespan.saturating_mul(4);

        let mut timespan = actual_timespan;
        if timespan < lowest {
            timespan = lowest;
        }
        if timespan > highest {
            timespan = highest;
        }
        timespan
    }

    /// Retargeted compact bits for the block after `prev`, given the timestamp
    /// of the first block in the window.
    pub fn calculate_next_work_required(
        &self,
        prev: &BlockIndex,
        first_block_time: u32,
    ) -> ConsensusResult<u32> {
        let target = CompactTarget(prev.header.bits).to_target()?;
        let limit = CompactTarget(self.params.pow_limit_bits).to_target()?;

        let actual = i64::from(prev.header.timestamp) - i64::from(first_block_time);
        let timespan = self.calculate_work_timespan(actual, self.params.pow_target_timespan);

        // Multiply before dividing so no precision is lost.
        let timespan = BigUint::from(timespan.max(0) as u64);
        let target_timespan = BigUint::from(self.params.pow_target_timespan as u64);
        let mut next = target * timespan / target_timespan;
        if next > limit {
            next = limit;
        }

        let bits = encode_compact(&next, false);
        debug!(
            height = prev.height + 1,
            prev_bits = format!("{:#010x}", prev.header.bits),
            new_bits = format!("{:#010x}", bits),
            actual_timespan = actual,
            "Retargeted proof-of-work"
        );
        Ok(bits)
    }

    /// Compact bits required for the block following `prev`.
    ///
    /// Only looks up an ancestor when the next height starts a new window.
    pub fn get_work_required(
        &self,
        chain: &dyn AncestorLookup,
        prev: &BlockIndex,
    ) -> ConsensusResult<u32> {
        let interval = self.params.pow_retarget_interval;
        if (u64::from(prev.height) + 1) % u64::from(interval) != 0 {
            return Ok(prev.header.bits);
        }

        let first_height = prev
            .height
            .checked_sub(interval - 1)
            .ok_or(ConsensusError::AncestorNotFound(0))?;
        let first = chain.fetch_ancestor(first_height)?;
        self.calculate_next_work_required(prev, first.header.timestamp)
    }

    /// Median timestamp of the last `MEDIAN_TIME_SPAN` blocks ending at `prev`.
    pub fn median_time_past(
        &self,
        chain: &dyn AncestorLookup,
        prev: &BlockIndex,
    ) -> ConsensusResult<u32> {
        let start = prev.height.saturating_sub(MEDIAN_TIME_SPAN - 1);
        let mut times = Vec::with_capacity(MEDIAN_TIME_SPAN as usize);
        for height in start..prev.height {
            times.push(chain.fetch_ancestor(height)?.header.timestamp);
        }
        times.push(prev.header.timestamp);
        times.sort_unstable();
        Ok(times[times.len() / 2])
    }
}
