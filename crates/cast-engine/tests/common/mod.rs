//! Shared test helpers and factories.
//!
//! Builders produce offline-decodable transactions: plain value transfers
//! and static-table router calls never touch the network, so the pipeline
//! can run end-to-end against an in-memory store.

#![allow(dead_code)]

use std::sync::Arc;

use alloy::primitives::{Address, Bytes, B256, U256};

use cast_data::types::{BlockHead, PendingTx, TxStatus};
use cast_data::Store;
use cast_decode::{ContractRegistry, Decoder};
use cast_engine::predictions::{HeadTracker, PredictionBook};
use cast_engine::{BaseFeeOracle, Forecaster, MempoolState, Reconciler};
use cast_node::RateLimiter;

pub const GWEI: u128 = 1_000_000_000;
pub const ETH: u128 = 1_000_000_000_000_000_000;

/// Creates an in-memory SQLite store with all migrations applied.
pub fn test_store() -> Arc<Store> {
    Arc::new(Store::new(":memory:").expect("in-memory store should always open"))
}

/// Decoder wired for offline use: static registry layers only, no node
/// client, nothing that reaches the network for the transactions the
/// factories below produce.
pub fn offline_decoder(store: &Arc<Store>) -> Arc<Decoder> {
    let registry = Arc::new(ContractRegistry::new(
        store.clone(),
        RateLimiter::new(4),
        None,
        None,
    ));
    Arc::new(Decoder::new(registry))
}

/// Every shared piece of pipeline state plus a forecaster and reconciler
/// wired over it.
pub struct Pipeline {
    pub store: Arc<Store>,
    pub mempool: Arc<MempoolState>,
    pub basefee: Arc<BaseFeeOracle>,
    pub head: Arc<HeadTracker>,
    pub predictions: Arc<PredictionBook>,
    pub forecaster: Forecaster,
    pub reconciler: Reconciler,
}

pub fn pipeline() -> Pipeline {
    let store = test_store();
    let mempool = Arc::new(MempoolState::new());
    let basefee = Arc::new(BaseFeeOracle::new());
    let head = Arc::new(HeadTracker::new());
    let predictions = Arc::new(PredictionBook::new());
    let forecaster = Forecaster::new(
        mempool.clone(),
        basefee.clone(),
        head.clone(),
        predictions.clone(),
        offline_decoder(&store),
        store.clone(),
    );
    let reconciler = Reconciler::new(
        store.clone(),
        mempool.clone(),
        basefee.clone(),
        head.clone(),
        predictions.clone(),
    );
    Pipeline {
        store,
        mempool,
        basefee,
        head,
        predictions,
        forecaster,
        reconciler,
    }
}

/// EIP-1559 value transfer with a 100 Gwei fee ceiling.
pub fn sample_tx(hash_byte: u8, priority_gwei: u128, gas_limit: u64) -> PendingTx {
    PendingTx {
        hash: B256::repeat_byte(hash_byte),
        from: Address::repeat_byte(0x01),
        to: Some(Address::repeat_byte(0x02)),
        value: U256::from(ETH),
        gas_limit,
        nonce: Some(0),
        gas_price: None,
        max_fee_per_gas: Some(100 * GWEI),
        max_priority_fee_per_gas: Some(priority_gwei * GWEI),
        input: Bytes::new(),
        first_seen_ms: hash_byte as u64,
        status: TxStatus::Pending,
    }
}

/// Swap-shaped transaction to the Uniswap V2 router whose calldata
/// carries `token_a`/`token_b` in the first two ABI slots.
pub fn sample_swap(
    hash_byte: u8,
    priority_gwei: u128,
    value_wei: u128,
    token_a: Address,
    token_b: Address,
) -> PendingTx {
    let mut input = vec![0x38, 0xed, 0x17, 0x39]; // swapExactTokensForTokens
    input.extend_from_slice(&[0u8; 64]);
    input[16..36].copy_from_slice(token_a.as_slice());
    input[48..68].copy_from_slice(token_b.as_slice());
    PendingTx {
        hash: B256::repeat_byte(hash_byte),
        from: Address::repeat_byte(hash_byte),
        to: Some(cast_decode::registry::addresses::UNISWAP_V2_ROUTER),
        value: U256::from(value_wei),
        gas_limit: 200_000,
        nonce: Some(0),
        gas_price: None,
        max_fee_per_gas: Some(100 * GWEI),
        max_priority_fee_per_gas: Some(priority_gwei * GWEI),
        input: Bytes::from(input),
        first_seen_ms: hash_byte as u64,
        status: TxStatus::Pending,
    }
}

/// Canonical head carrying the supplied transaction hashes.
pub fn sample_head(number: u64, transaction_hashes: Vec<B256>) -> BlockHead {
    BlockHead {
        number,
        hash: B256::repeat_byte(0xbb),
        parent_hash: B256::repeat_byte(0xba),
        timestamp: 1_700_000_000 + number * 12,
        miner: Address::repeat_byte(0x99),
        extra_data: Bytes::from_static(b"beaverbuild.org"),
        gas_limit: 30_000_000,
        gas_used: 15_000_000,
        base_fee_per_gas: Some(10 * GWEI),
        transaction_hashes,
    }
}
