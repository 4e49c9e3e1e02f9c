//! Per-head reconciliation of outstanding forecasts.
//!
//! Heads are processed strictly in order: missed numbers between the last
//! processed head and an incoming one are fetched and replayed first.
//! Reconciliation treats the mempool as advisory, since a pending event
//! for a transaction that is already in the head may still be in flight.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use alloy::primitives::B256;
use chrono::Utc;
use eyre::Result;

use cast_data::types::{unix_ms_now, BlockComparison, PendingTx};
use cast_data::Store;
use cast_node::{FetchedBlock, NodeClient, NodeError, RateLimiter};

use crate::accuracy;
use crate::basefee::BaseFeeOracle;
use crate::mempool::MempoolState;
use crate::predictions::{HeadTracker, PredictionBook};

/// Forecasts for blocks at or below `head − 5` are dropped as stale.
pub const STALE_PREDICTION_DEPTH: u64 = 5;

/// Upper bound on how many missed heads are replayed before an incoming
/// one; a gap wider than this (deep outage) is skipped with a warning.
const MAX_REPLAY_GAP: u64 = 32;

/// Known builder `extraData` signatures, matched case-insensitively.
const BUILDER_SIGNATURES: &[(&str, &str)] = &[
    ("beaverbuild", "beaverbuild"),
    ("rsync", "rsync-builder"),
    ("titan", "Titan Builder"),
    ("flashbots", "Flashbots"),
    ("builder0x69", "builder0x69"),
    ("bloxroute", "bloXroute"),
    ("eden", "Eden Network"),
    ("penguin", "penguinbuild"),
];

/// Best-effort builder naming from a block's extra data. Returns the
/// printable extra-data text (when any) and the matched builder name,
/// defaulting to "unknown".
pub fn builder_from_extra_data(extra_data: &[u8]) -> (Option<String>, String) {
    let printable: String = extra_data
        .iter()
        .filter(|b| b.is_ascii_graphic() || **b == b' ')
        .map(|b| *b as char)
        .collect();
    let lower = printable.to_lowercase();
    for (needle, name) in BUILDER_SIGNATURES {
        if lower.contains(needle) {
            return (Some(printable), (*name).to_string());
        }
    }
    let raw = (!printable.is_empty()).then_some(printable);
    (raw, "unknown".to_string())
}

/// Pairs canonical blocks with outstanding forecasts and persists the
/// comparison.
pub struct Reconciler {
    store: Arc<Store>,
    mempool: Arc<MempoolState>,
    basefee: Arc<BaseFeeOracle>,
    head: Arc<HeadTracker>,
    predictions: Arc<PredictionBook>,
    last_processed: Mutex<Option<u64>>,
}

impl Reconciler {
    pub fn new(
        store: Arc<Store>,
        mempool: Arc<MempoolState>,
        basefee: Arc<BaseFeeOracle>,
        head: Arc<HeadTracker>,
        predictions: Arc<PredictionBook>,
    ) -> Self {
        Self {
            store,
            mempool,
            basefee,
            head,
            predictions,
            last_processed: Mutex::new(None),
        }
    }

    /// Forgets the last processed head. Called on session resync, after
    /// which derived state restarts from the next observed head.
    pub fn reset(&self) {
        *self
            .last_processed
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    fn last_processed(&self) -> Option<u64> {
        *self
            .last_processed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn mark_processed(&self, number: u64) {
        *self
            .last_processed
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(number);
    }

    /// Handles one head announcement: replays any missed numbers in order,
    /// then reconciles the incoming one. Later heads cannot overtake
    /// earlier ones; the observer awaits each call before the next.
    ///
    /// # Errors
    /// Returns error when a store write fails. Fetch failures are logged
    /// and the affected block is skipped (the event is lost).
    #[tracing::instrument(skip_all, fields(block_number = head_number))]
    pub async fn on_head(
        &self,
        head_number: u64,
        client: &NodeClient,
        limiter: &RateLimiter,
    ) -> Result<()> {
        if let Some(last) = self.last_processed() {
            if head_number <= last {
                tracing::debug!(last, "head at or below last processed, skipping");
                return Ok(());
            }
        }

        let mut start = self
            .last_processed()
            .map(|last| last + 1)
            .unwrap_or(head_number);
        if head_number - start > MAX_REPLAY_GAP {
            tracing::warn!(
                gap = head_number - start,
                "head gap exceeds replay bound, skipping ahead"
            );
            start = head_number - MAX_REPLAY_GAP;
        }

        for number in start..=head_number {
            match limiter.submit(client.fetch_block(number, true)).await {
                Ok(Some(block)) => {
                    self.reconcile_block(block)?;
                }
                Ok(None) => {
                    tracing::debug!(number, "block not yet available, skipping");
                }
                Err(NodeError::RateLimited) => {
                    tracing::warn!(number, "node rate-limited block fetch, pausing");
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
                Err(err) => {
                    tracing::warn!(number, %err, "block fetch failed, event lost");
                }
            }
            self.mark_processed(number);
        }
        Ok(())
    }

    /// Reconciles one fetched block: scores any outstanding forecast,
    /// persists the comparison, and performs cleanup.
    ///
    /// # Errors
    /// Returns error when a store write fails.
    pub fn reconcile_block(&self, block: FetchedBlock) -> Result<()> {
        let head = block.head;
        let number = head.number;
        let actual_hashes = head.transaction_hashes.clone();

        if let Some(prediction) = self.predictions.take(number) {
            let base_fee = head
                .base_fee_per_gas
                .or_else(|| self.basefee.last())
                .unwrap_or(0);
            let actual_details: HashMap<B256, PendingTx> = block
                .transactions
                .iter()
                .map(|tx| (tx.hash, tx.clone()))
                .collect();
            let breakdown = accuracy::score(
                &prediction.hashes,
                &actual_hashes,
                &prediction.details,
                &actual_details,
                base_fee,
            );
            let (builder, builder_name) = builder_from_extra_data(&head.extra_data);
            let comparison = BlockComparison {
                id: None,
                block_number: number,
                predicted_transactions: prediction.hashes,
                actual_transactions: actual_hashes.clone(),
                accuracy: breakdown.score,
                miner: head.miner,
                builder,
                builder_name: Some(builder_name),
                average_gas_price: Some(prediction.gas_price_gwei),
                timestamp: Utc::now(),
            };
            if let Some(id) = self.store.save_comparison(&comparison)? {
                tracing::info!(
                    comparison_id = id,
                    accuracy = breakdown.score,
                    exact = breakdown.exact_matches,
                    partial = breakdown.partial_matches,
                    actual = actual_hashes.len(),
                    "block reconciled"
                );
            }
        } else {
            tracing::debug!(number, "no outstanding forecast for block");
        }

        self.mempool.confirm_block(&actual_hashes);
        if let Some(base_fee) = head.base_fee_per_gas {
            self.basefee.record(base_fee);
        }
        self.head.update(number, head.gas_limit);
        self.predictions
            .drop_older_than(number.saturating_sub(STALE_PREDICTION_DEPTH));
        self.mempool.evict_stale(unix_ms_now());
        Ok(())
    }
}
