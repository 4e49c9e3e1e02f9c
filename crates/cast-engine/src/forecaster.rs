//! Cadenced forecast assembly.
//!
//! Runs on every new head and on a 3-second timer so forecasts refresh as
//! the mempool grows. Runs are reentrancy-guarded: a trigger that arrives
//! while a run is active is dropped, not queued, and the next tick picks
//! up fresh state. The latest forecast per block number wins.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use alloy::primitives::{B256, U256};
use chrono::Utc;
use eyre::Result;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use cast_data::types::{
    unix_ms_now, BlockPrediction, PendingTx, PredictionMetadata, TxAnnotation, TxKind,
};
use cast_data::Store;
use cast_decode::{selectors, Decoder};

use crate::basefee::BaseFeeOracle;
use crate::mempool::MempoolState;
use crate::packer;
use crate::predictions::{HeadTracker, PredictionBook, RegisteredPrediction};
use crate::sandwich::{self, SANDWICH_WINDOW_MS};

/// Timer cadence between head-triggered runs.
pub const FORECAST_INTERVAL: std::time::Duration = std::time::Duration::from_secs(3);

/// Assembles, persists, and registers next-block forecasts.
pub struct Forecaster {
    mempool: Arc<MempoolState>,
    basefee: Arc<BaseFeeOracle>,
    head: Arc<HeadTracker>,
    predictions: Arc<PredictionBook>,
    decoder: Arc<Decoder>,
    store: Arc<Store>,
    running: AtomicBool,
}

impl Forecaster {
    pub fn new(
        mempool: Arc<MempoolState>,
        basefee: Arc<BaseFeeOracle>,
        head: Arc<HeadTracker>,
        predictions: Arc<PredictionBook>,
        decoder: Arc<Decoder>,
        store: Arc<Store>,
    ) -> Self {
        Self {
            mempool,
            basefee,
            head,
            predictions,
            decoder,
            store,
            running: AtomicBool::new(false),
        }
    }

    /// One guarded forecast run. Returns the forecast's target block
    /// number, or `None` when the run was dropped or there was nothing to
    /// forecast.
    ///
    /// # Errors
    /// Returns error when a store write fails; the next tick retries with
    /// fresh state.
    pub async fn run_once(&self) -> Result<Option<u64>> {
        if self.running.swap(true, Ordering::SeqCst) {
            tracing::trace!("forecast already in progress, dropping trigger");
            return Ok(None);
        }
        let result = self.forecast().await;
        self.running.store(false, Ordering::SeqCst);
        result
    }

    /// Timer-driven cadence; the observer additionally calls
    /// [`Forecaster::run_once`] on each new head.
    pub async fn run_loop(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut tick = tokio::time::interval(FORECAST_INTERVAL);
        tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                _ = tick.tick() => {
                    if let Err(err) = self.run_once().await {
                        tracing::warn!(%err, "forecast run failed");
                    }
                }
            }
        }
        tracing::info!("forecast timer stopped");
    }

    async fn forecast(&self) -> Result<Option<u64>> {
        let Some(head_number) = self.head.latest() else {
            return Ok(None);
        };
        let snapshot = self.mempool.snapshot();
        if snapshot.is_empty() {
            return Ok(None);
        }

        let next_base_fee = self.basefee.estimate_next();
        let last_base_fee = self.basefee.last().unwrap_or(next_base_fee);
        let packed = packer::pack(
            snapshot,
            next_base_fee,
            last_base_fee,
            self.head.gas_limit(),
        );
        if packed.transactions.is_empty() {
            return Ok(None);
        }

        let now_ms = unix_ms_now();
        let mut annotations: BTreeMap<B256, TxAnnotation> = BTreeMap::new();
        for tx in &packed.transactions {
            let annotation = match self.mempool.cached_annotation(&tx.hash, now_ms) {
                Some(annotation) => annotation,
                None => {
                    let annotation = self.decoder.annotate(tx).await;
                    self.mempool
                        .cache_annotation(tx.hash, annotation.clone(), now_ms);
                    annotation
                }
            };
            annotations.insert(tx.hash, annotation);
        }

        let mut hashes: Vec<B256> = packed.transactions.iter().map(|tx| tx.hash).collect();

        // Sandwich candidates: the predicted swaps plus swap-shaped
        // transactions observed inside the detection window.
        let mut candidates: Vec<PendingTx> = packed
            .transactions
            .iter()
            .filter(|tx| {
                annotations
                    .get(&tx.hash)
                    .is_some_and(|ann| ann.kind == TxKind::Swap)
            })
            .cloned()
            .collect();
        for tx in self
            .mempool
            .recent_since(now_ms.saturating_sub(SANDWICH_WINDOW_MS))
        {
            if candidates.iter().any(|c| c.hash == tx.hash) {
                continue;
            }
            if tx.selector().is_some_and(selectors::is_swap) {
                candidates.push(tx);
            }
        }
        let mut fees = packed.priority_fees.clone();
        for tx in &candidates {
            fees.entry(tx.hash)
                .or_insert_with(|| packer::effective_priority_fee(tx, last_base_fee));
        }
        let triples = sandwich::detect_and_annotate(&mut hashes, &mut annotations, &candidates, &fees);
        if !triples.is_empty() {
            tracing::info!(triples = triples.len(), "sandwich triples annotated");
        }

        let mut details: HashMap<B256, PendingTx> = packed
            .transactions
            .into_iter()
            .map(|tx| (tx.hash, tx))
            .collect();
        for tx in candidates {
            details.entry(tx.hash).or_insert(tx);
        }
        details.retain(|hash, _| hashes.contains(hash));

        let transaction_details: BTreeMap<B256, TxAnnotation> = hashes
            .iter()
            .filter_map(|hash| annotations.get(hash).map(|ann| (*hash, ann.clone())))
            .collect();

        let block_number = head_number + 1;
        let prediction = BlockPrediction {
            id: None,
            block_number,
            predicted_transactions: hashes.clone(),
            predicted_gas_price: packed.predicted_gas_price_gwei,
            transaction_details,
            metadata: None,
            created_at: Utc::now(),
        };
        let id = self.store.save_prediction(&prediction)?;
        let metadata = build_metadata(&prediction.transaction_details, &details);
        self.store.update_prediction_metadata(id, &metadata)?;

        let replaced = self.predictions.register(
            block_number,
            RegisteredPrediction {
                hashes: prediction.predicted_transactions,
                details,
                gas_price_gwei: packed.predicted_gas_price_gwei,
            },
        );
        tracing::info!(
            block_number,
            tx_count = prediction.transaction_details.len(),
            gas_price_gwei = packed.predicted_gas_price_gwei,
            replaced,
            "forecast registered"
        );
        Ok(Some(block_number))
    }
}

fn build_metadata(
    annotations: &BTreeMap<B256, TxAnnotation>,
    details: &HashMap<B256, PendingTx>,
) -> PredictionMetadata {
    let mut metadata = PredictionMetadata::default();
    for annotation in annotations.values() {
        if let Some(protocol) = &annotation.protocol_label {
            *metadata.by_protocol.entry(protocol.clone()).or_insert(0) += 1;
        }
        *metadata
            .by_type
            .entry(annotation.kind.label().to_string())
            .or_insert(0) += 1;
    }
    let total: U256 = details.values().map(|tx| tx.value).sum();
    metadata.total_value_wei = total.to_string();
    metadata
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;
    use cast_data::types::TxCategory;

    #[test]
    fn metadata_aggregates_kinds_and_protocols() {
        let mut annotations = BTreeMap::new();
        let mut swap = TxAnnotation::unknown();
        swap.kind = TxKind::Swap;
        swap.category = TxCategory::Dex;
        swap.protocol_label = Some("Uniswap V2".to_string());
        annotations.insert(B256::repeat_byte(0x01), swap.clone());
        annotations.insert(B256::repeat_byte(0x02), swap);
        annotations.insert(B256::repeat_byte(0x03), TxAnnotation::unknown());

        let mut details = HashMap::new();
        details.insert(
            B256::repeat_byte(0x01),
            PendingTx {
                hash: B256::repeat_byte(0x01),
                from: Address::ZERO,
                to: None,
                value: U256::from(40u64),
                gas_limit: 0,
                nonce: None,
                gas_price: None,
                max_fee_per_gas: None,
                max_priority_fee_per_gas: None,
                input: Default::default(),
                first_seen_ms: 0,
                status: cast_data::types::TxStatus::Pending,
            },
        );

        let metadata = build_metadata(&annotations, &details);
        assert_eq!(metadata.by_type["swap"], 2);
        assert_eq!(metadata.by_type["unknown"], 1);
        assert_eq!(metadata.by_protocol["Uniswap V2"], 2);
        assert_eq!(metadata.total_value_wei, "40");
    }
}
