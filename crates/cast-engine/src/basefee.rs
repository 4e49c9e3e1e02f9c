//! Rolling base-fee window and next-block estimate.
//!
//! A deliberately coarse heuristic: track the last ten observed base fees
//! and project one EIP-1559 step (12.5%) in the direction of the window's
//! trend. The exact protocol formula may be substituted without changing
//! downstream contracts.

use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Window size in observed heads.
pub const WINDOW_SIZE: usize = 10;

/// Estimate returned before any head has been observed: 0.1 Gwei.
pub const DEFAULT_ESTIMATE_WEI: u128 = 100_000_000;

/// Tracks observed `baseFeePerGas` values from new heads.
pub struct BaseFeeOracle {
    window: Mutex<VecDeque<u128>>,
}

impl Default for BaseFeeOracle {
    fn default() -> Self {
        Self::new()
    }
}

impl BaseFeeOracle {
    pub fn new() -> Self {
        Self {
            window: Mutex::new(VecDeque::with_capacity(WINDOW_SIZE)),
        }
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<u128>> {
        self.window.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Records a head's base fee, discarding the oldest observation once
    /// the window is full.
    pub fn record(&self, base_fee_wei: u128) {
        let mut window = self.lock();
        if window.len() == WINDOW_SIZE {
            window.pop_front();
        }
        window.push_back(base_fee_wei);
    }

    /// Most recently observed base fee.
    pub fn last(&self) -> Option<u128> {
        self.lock().back().copied()
    }

    /// Next-block base-fee estimate: last observation stepped 12.5% in the
    /// direction of the window trend, or 0.1 Gwei with no observations.
    pub fn estimate_next(&self) -> u128 {
        let window = self.lock();
        let (Some(first), Some(last)) = (window.front(), window.back()) else {
            return DEFAULT_ESTIMATE_WEI;
        };
        let step = last / 8;
        let trend = *last as i128 - *first as i128;
        if trend > 0 {
            last.saturating_add(step)
        } else {
            last.saturating_sub(step)
        }
    }

    /// Drops all observations. Used when the node session resyncs.
    pub fn clear(&self) {
        self.lock().clear();
    }

    /// Observations currently held.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
