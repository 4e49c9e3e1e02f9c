//! End-to-end pipeline tests: forecast assembly through reconciliation
//! against an in-memory store.

mod common;

use alloy::primitives::Address;
use cast_data::types::TxKind;
use cast_engine::predictions::RegisteredPrediction;
use cast_node::FetchedBlock;
use common::{pipeline, sample_head, sample_swap, sample_tx, ETH, GWEI};

/// Pending {A, B, C} with priorities 5/3/1 Gwei and 21k gas against a
/// 30M-gas block: prediction order A, B, C at 3.0 Gwei; the block arrives
/// with exactly those transactions and scores 100.
#[tokio::test]
async fn perfect_forecast_scores_100() {
    let p = pipeline();
    p.head.update(99, 30_000_000);
    p.basefee.record(10 * GWEI);

    let a = sample_tx(0x0a, 5, 21_000);
    let b = sample_tx(0x0b, 3, 21_000);
    let c = sample_tx(0x0c, 1, 21_000);
    for tx in [&a, &b, &c] {
        assert!(p.mempool.ingest(tx.clone()));
    }

    let target = p.forecaster.run_once().await.unwrap();
    assert_eq!(target, Some(100));

    let predictions = p.store.list_recent_predictions(1).unwrap();
    assert_eq!(predictions.len(), 1);
    let prediction = &predictions[0];
    assert_eq!(prediction.block_number, 100);
    assert_eq!(prediction.predicted_transactions, vec![a.hash, b.hash, c.hash]);
    assert_eq!(prediction.predicted_gas_price, 3.0);
    assert_eq!(prediction.transaction_details.len(), 3);
    let metadata = prediction.metadata.as_ref().unwrap();
    assert_eq!(metadata.by_type["transfer"], 3);

    let block = FetchedBlock {
        head: sample_head(100, vec![a.hash, b.hash, c.hash]),
        transactions: vec![a.clone(), b.clone(), c.clone()],
    };
    p.reconciler.reconcile_block(block).unwrap();

    let comparisons = p.store.list_recent_comparisons(1).unwrap();
    assert_eq!(comparisons.len(), 1);
    let comparison = &comparisons[0];
    assert_eq!(comparison.block_number, 100);
    assert_eq!(comparison.accuracy, 100.0);
    assert_eq!(comparison.builder_name.as_deref(), Some("beaverbuild"));
    assert_eq!(comparison.average_gas_price, Some(3.0));

    // Confirmed transactions leave the mempool; the forecast is consumed.
    for tx in [&a, &b, &c] {
        assert!(p.mempool.get(&tx.hash).is_none());
    }
    assert!(p.predictions.is_empty());
}

/// A transaction whose fee ceiling is below half the estimated next base
/// fee is dropped; the viable one is predicted alone.
#[tokio::test]
async fn fee_ineligible_transaction_is_dropped() {
    let p = pipeline();
    p.head.update(199, 30_000_000);
    p.basefee.record(10 * GWEI);

    let mut cheap = sample_tx(0x0d, 1, 21_000);
    cheap.max_fee_per_gas = Some(2 * GWEI);
    cheap.max_priority_fee_per_gas = Some(1 * GWEI);
    let viable = sample_tx(0x0e, 2, 21_000);

    p.mempool.ingest(cheap.clone());
    p.mempool.ingest(viable.clone());

    p.forecaster.run_once().await.unwrap();
    let prediction = &p.store.list_recent_predictions(1).unwrap()[0];
    assert_eq!(prediction.predicted_transactions, vec![viable.hash]);
}

/// Three swaps on one token pair: the two highest-fee legs bracket the
/// high-value victim, annotated as a sandwich triple in order.
#[tokio::test]
async fn sandwich_triple_is_placed_and_flagged() {
    let p = pipeline();
    p.head.update(299, 30_000_000);
    p.basefee.record(10 * GWEI);

    let t1 = Address::repeat_byte(0x0a);
    let t2 = Address::repeat_byte(0x0b);
    let front = sample_swap(0x01, 50, ETH / 100, t1, t2);
    let victim = sample_swap(0x02, 10, ETH, t1, t2);
    let back = sample_swap(0x03, 30, ETH / 100, t1, t2);
    for tx in [&front, &victim, &back] {
        p.mempool.ingest(tx.clone());
    }

    p.forecaster.run_once().await.unwrap();
    let prediction = &p.store.list_recent_predictions(1).unwrap()[0];
    assert_eq!(
        prediction.predicted_transactions,
        vec![front.hash, victim.hash, back.hash]
    );

    let details = &prediction.transaction_details;
    assert_eq!(details[&front.hash].kind, TxKind::Sandwich);
    assert_eq!(details[&victim.hash].kind, TxKind::Sandwich);
    assert_eq!(details[&back.hash].kind, TxKind::Sandwich);
    assert_eq!(details[&victim.hash].is_sandwich_target, Some(true));
    assert_eq!(details[&front.hash].is_sandwich_target, None);
    assert_eq!(details[&back.hash].is_sandwich_target, None);
    let metadata = prediction.metadata.as_ref().unwrap();
    assert_eq!(metadata.by_type["sandwich"], 3);
}

/// Predicted {P1, P2, P3} against actual {P1, X, Y} where X mirrors P2's
/// recipient, selector, fee, and value: one exact plus one partial match
/// scores 50.
#[tokio::test]
async fn partial_match_scores_50() {
    let p = pipeline();

    let p1 = sample_tx(0x01, 5, 21_000);
    let p2 = sample_tx(0x02, 3, 21_000);
    let p3 = sample_tx(0x03, 1, 21_000);
    let mut x = sample_tx(0x04, 3, 21_000);
    x.to = p2.to;
    let mut y = sample_tx(0x05, 9, 21_000);
    y.to = Some(Address::repeat_byte(0x77));
    y.value = alloy::primitives::U256::from(5u64);

    p.predictions.register(
        400,
        RegisteredPrediction {
            hashes: vec![p1.hash, p2.hash, p3.hash],
            details: [p1.clone(), p2.clone(), p3.clone()]
                .into_iter()
                .map(|tx| (tx.hash, tx))
                .collect(),
            gas_price_gwei: 3.0,
        },
    );

    let block = FetchedBlock {
        head: sample_head(400, vec![p1.hash, x.hash, y.hash]),
        transactions: vec![p1, x, y],
    };
    p.reconciler.reconcile_block(block).unwrap();

    let comparison = &p.store.list_recent_comparisons(1).unwrap()[0];
    assert_eq!(comparison.accuracy, 50.0);
}

/// One comparison per block number: a competing reconciliation for the
/// same block is swallowed.
#[tokio::test]
async fn comparison_is_unique_per_block() {
    let p = pipeline();
    let tx = sample_tx(0x01, 5, 21_000);

    for _ in 0..2 {
        p.predictions.register(
            500,
            RegisteredPrediction {
                hashes: vec![tx.hash],
                details: [(tx.hash, tx.clone())].into_iter().collect(),
                gas_price_gwei: 1.0,
            },
        );
        let block = FetchedBlock {
            head: sample_head(500, vec![tx.hash]),
            transactions: vec![tx.clone()],
        };
        p.reconciler.reconcile_block(block).unwrap();
    }

    assert_eq!(p.store.list_recent_comparisons(10).unwrap().len(), 1);
}

/// Reconciling a head drops forecasts more than five blocks behind it.
#[tokio::test]
async fn stale_forecasts_are_dropped_on_reconciliation() {
    let p = pipeline();
    for number in 595..=600 {
        p.predictions
            .register(number, RegisteredPrediction::default());
    }

    let block = FetchedBlock {
        head: sample_head(601, Vec::new()),
        transactions: Vec::new(),
    };
    p.reconciler.reconcile_block(block).unwrap();

    // 595 and 596 are at or below 601 − 5.
    assert!(p.predictions.take(595).is_none());
    assert!(p.predictions.take(596).is_none());
    assert!(p.predictions.take(597).is_some());
}

/// The forecaster does nothing before a head is observed or when the
/// mempool is empty; with both present the latest forecast per block
/// number wins.
#[tokio::test]
async fn forecast_requires_head_and_mempool_and_latest_wins() {
    let p = pipeline();
    assert_eq!(p.forecaster.run_once().await.unwrap(), None);

    p.head.update(699, 30_000_000);
    p.basefee.record(10 * GWEI);
    assert_eq!(p.forecaster.run_once().await.unwrap(), None);

    p.mempool.ingest(sample_tx(0x01, 5, 21_000));
    assert_eq!(p.forecaster.run_once().await.unwrap(), Some(700));

    p.mempool.ingest(sample_tx(0x02, 7, 21_000));
    assert_eq!(p.forecaster.run_once().await.unwrap(), Some(700));

    let registered = p.predictions.take(700).unwrap();
    assert_eq!(registered.hashes.len(), 2);
    // Both forecasts were persisted for audit; the book held the latest.
    assert_eq!(p.store.count_predictions().unwrap(), 2);
}

/// Clearing stream-derived state leaves nothing behind: the resync path.
#[tokio::test]
async fn resync_clears_all_derived_state() {
    let p = pipeline();
    p.head.update(799, 30_000_000);
    p.basefee.record(10 * GWEI);
    p.mempool.ingest(sample_tx(0x01, 5, 21_000));
    p.forecaster.run_once().await.unwrap();
    assert!(!p.predictions.is_empty());

    p.mempool.clear();
    p.predictions.clear();
    p.basefee.clear();
    p.head.clear();
    p.reconciler.reset();

    assert!(p.mempool.is_empty());
    assert_eq!(p.mempool.annotation_count(), 0);
    assert!(p.predictions.is_empty());
    assert!(p.basefee.is_empty());
    assert_eq!(p.head.latest(), None);
}
