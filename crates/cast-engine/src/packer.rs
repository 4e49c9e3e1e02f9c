//! Fee-priority packing of the mempool snapshot into a candidate block.
//!
//! Mirrors validator/builder ordering at design level: filter by fee
//! viability against the estimated next base fee, order by effective
//! priority fee, and fill greedily against the gas budget. The bounds are
//! deliberately lenient (half the base fee at the floor, 14% over target
//! at the cap) to absorb estimation error. All arithmetic stays in wei.

use std::collections::HashMap;

use alloy::primitives::B256;

use cast_data::types::{wei_to_gwei, PendingTx};

/// Gas limit assumed until a head has been observed.
pub const DEFAULT_BLOCK_GAS_LIMIT: u64 = 30_000_000;

/// Target fill as a fraction of the block gas limit: 95%.
const TARGET_NUMERATOR: u64 = 95;
/// Hard cap as a fraction of the target: 114%.
const HARD_CAP_NUMERATOR: u64 = 114;

/// Ordered candidate set produced by one packing pass.
#[derive(Clone, Debug, Default)]
pub struct PackedBlock {
    /// Included transactions, highest effective priority fee first.
    pub transactions: Vec<PendingTx>,
    /// Effective priority fee per included hash, wei.
    pub priority_fees: HashMap<B256, u128>,
    /// Average effective priority fee of the included set, Gwei.
    pub predicted_gas_price_gwei: f64,
    /// Summed gas limits of the included set.
    pub gas_used: u64,
    /// Transactions dropped by the fee filter or the gas budget.
    pub rejected: usize,
}

/// Effective priority fee in wei.
///
/// EIP-1559: `min(maxPriorityFeePerGas, max(0, maxFeePerGas − baseFee))`.
/// Legacy: 10% of the gas price.
pub fn effective_priority_fee(tx: &PendingTx, base_fee_wei: u128) -> u128 {
    if let Some(max_fee) = tx.max_fee_per_gas {
        let headroom = max_fee.saturating_sub(base_fee_wei);
        tx.max_priority_fee_per_gas.unwrap_or(max_fee).min(headroom)
    } else {
        tx.gas_price.unwrap_or(0) / 10
    }
}

/// Fee ceiling used by the viability filter: `maxFeePerGas`, or the gas
/// price for legacy transactions.
fn fee_ceiling(tx: &PendingTx) -> u128 {
    tx.max_fee_per_gas.or(tx.gas_price).unwrap_or(0)
}

/// Packs a snapshot into an ordered candidate list.
///
/// `next_base_fee_wei` drives the viability filter; `last_base_fee_wei`
/// (the most recent observed value) drives priority-fee computation.
pub fn pack(
    snapshot: Vec<PendingTx>,
    next_base_fee_wei: u128,
    last_base_fee_wei: u128,
    block_gas_limit: u64,
) -> PackedBlock {
    let total_input = snapshot.len();
    let floor = next_base_fee_wei / 2;

    // Fee viability: lenient lower bound of half the estimated base fee.
    let mut viable: Vec<(u128, PendingTx)> = snapshot
        .into_iter()
        .filter(|tx| fee_ceiling(tx) >= floor)
        .map(|tx| (effective_priority_fee(&tx, last_base_fee_wei), tx))
        .collect();

    // Fee groups descending; ingestion order inside a group.
    viable.sort_by(|(fee_a, tx_a), (fee_b, tx_b)| {
        fee_b
            .cmp(fee_a)
            .then(tx_a.first_seen_ms.cmp(&tx_b.first_seen_ms))
    });

    let target = block_gas_limit / 100 * TARGET_NUMERATOR;
    let hard_cap = target / 100 * HARD_CAP_NUMERATOR;

    let mut packed = PackedBlock::default();
    let mut fee_sum: u128 = 0;
    for (fee, tx) in viable {
        if packed.gas_used >= target {
            packed.rejected += 1;
            continue;
        }
        if packed.gas_used + tx.gas_limit > hard_cap {
            packed.rejected += 1;
            continue;
        }
        packed.gas_used += tx.gas_limit;
        fee_sum += fee;
        packed.priority_fees.insert(tx.hash, fee);
        packed.transactions.push(tx);
    }
    packed.rejected += total_input - packed.transactions.len() - packed.rejected;

    if !packed.transactions.is_empty() {
        let average = fee_sum / packed.transactions.len() as u128;
        packed.predicted_gas_price_gwei = wei_to_gwei(average);
    }
    packed
}
