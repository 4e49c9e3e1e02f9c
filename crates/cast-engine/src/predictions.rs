//! In-memory forecast registrations awaiting reconciliation, plus the
//! latest observed head.
//!
//! At most one registration per block number is kept; re-registering
//! overwrites (the latest forecast wins). Registrations hold the predicted
//! transaction details so the reconciler can attempt partial matching even
//! after the mempool entries are gone.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use alloy::primitives::B256;

use cast_data::types::PendingTx;

use crate::packer::DEFAULT_BLOCK_GAS_LIMIT;

/// One forecast held for reconciliation.
#[derive(Clone, Debug, Default)]
pub struct RegisteredPrediction {
    /// Predicted hashes in order.
    pub hashes: Vec<B256>,
    /// Transaction details per predicted hash, for partial matching.
    pub details: HashMap<B256, PendingTx>,
    /// Average effective priority fee of the forecast, Gwei.
    pub gas_price_gwei: f64,
}

/// Block number → outstanding forecast.
#[derive(Default)]
pub struct PredictionBook {
    inner: Mutex<HashMap<u64, RegisteredPrediction>>,
}

impl PredictionBook {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u64, RegisteredPrediction>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Registers a forecast for a block number, overwriting any earlier
    /// one. Returns whether an earlier forecast was replaced.
    pub fn register(&self, block_number: u64, prediction: RegisteredPrediction) -> bool {
        self.lock().insert(block_number, prediction).is_some()
    }

    /// Removes and returns the forecast for a block number.
    pub fn take(&self, block_number: u64) -> Option<RegisteredPrediction> {
        self.lock().remove(&block_number)
    }

    /// Drops forecasts for block numbers at or below `cutoff`.
    pub fn drop_older_than(&self, cutoff: u64) -> usize {
        let mut inner = self.lock();
        let before = inner.len();
        inner.retain(|number, _| *number > cutoff);
        before - inner.len()
    }

    /// Drops everything. Used when the node session resyncs.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[derive(Default)]
struct HeadInfo {
    number: Option<u64>,
    gas_limit: Option<u64>,
}

/// Latest observed canonical head number and gas limit.
#[derive(Default)]
pub struct HeadTracker {
    inner: Mutex<HeadInfo>,
}

impl HeadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HeadInfo> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn update(&self, number: u64, gas_limit: u64) {
        let mut inner = self.lock();
        inner.number = Some(number);
        inner.gas_limit = Some(gas_limit);
    }

    /// Latest head number, if any head has been observed.
    pub fn latest(&self) -> Option<u64> {
        self.lock().number
    }

    /// Gas limit of the most recent head, defaulting to 30M.
    pub fn gas_limit(&self) -> u64 {
        self.lock().gas_limit.unwrap_or(DEFAULT_BLOCK_GAS_LIMIT)
    }

    pub fn clear(&self) {
        *self.lock() = HeadInfo::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn latest_registration_wins() {
        let book = PredictionBook::new();
        let first = RegisteredPrediction {
            hashes: vec![B256::repeat_byte(0x01)],
            ..Default::default()
        };
        let second = RegisteredPrediction {
            hashes: vec![B256::repeat_byte(0x02)],
            ..Default::default()
        };
        assert!(!book.register(100, first));
        assert!(book.register(100, second));
        let taken = book.take(100).unwrap();
        assert_eq!(taken.hashes, vec![B256::repeat_byte(0x02)]);
        assert!(book.take(100).is_none());
    }

    #[test]
    fn stale_forecasts_are_dropped() {
        let book = PredictionBook::new();
        for number in 95..=101 {
            book.register(number, RegisteredPrediction::default());
        }
        // Head 101: everything at or below 96 is stale.
        assert_eq!(book.drop_older_than(96), 2);
        assert!(book.take(95).is_none());
        assert!(book.take(97).is_some());
    }

    #[test]
    fn head_tracker_defaults_gas_limit() {
        let head = HeadTracker::new();
        assert_eq!(head.latest(), None);
        assert_eq!(head.gas_limit(), DEFAULT_BLOCK_GAS_LIMIT);
        head.update(18_000_000, 29_500_000);
        assert_eq!(head.latest(), Some(18_000_000));
        assert_eq!(head.gas_limit(), 29_500_000);
        head.clear();
        assert_eq!(head.latest(), None);
    }
}
