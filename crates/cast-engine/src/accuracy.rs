//! Forecast-to-actual scoring.
//!
//! Exact matches are hash intersections. A predicted hash missing from the
//! block can still earn a partial match against an unclaimed actual
//! transaction that looks like the same intent: same recipient, same
//! 4-byte selector, effective priority fees within 10%, values within 5%.
//! Each predicted hash claims at most one partial match.

use std::collections::{HashMap, HashSet};

use alloy::primitives::{B256, U256};

use cast_data::types::PendingTx;

use crate::packer::effective_priority_fee;

/// Score components for one reconciled block.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct AccuracyBreakdown {
    pub exact_matches: usize,
    pub partial_matches: usize,
    /// `(exact × 100 + partial × 50) / |predicted|`, clamped to [0, 100].
    pub score: f64,
}

/// Scores a prediction against the canonical transaction list.
///
/// Details maps may be sparse; a hash with no details on either side can
/// only match exactly.
pub fn score(
    predicted: &[B256],
    actual: &[B256],
    predicted_details: &HashMap<B256, PendingTx>,
    actual_details: &HashMap<B256, PendingTx>,
    base_fee_wei: u128,
) -> AccuracyBreakdown {
    if predicted.is_empty() {
        return AccuracyBreakdown::default();
    }

    let actual_set: HashSet<&B256> = actual.iter().collect();
    let predicted_set: HashSet<&B256> = predicted.iter().collect();

    let exact_matches = predicted
        .iter()
        .filter(|hash| actual_set.contains(hash))
        .count();

    let mut claimed: HashSet<B256> = HashSet::new();
    let mut partial_matches = 0;
    for hash in predicted {
        if actual_set.contains(hash) {
            continue;
        }
        let Some(predicted_tx) = predicted_details.get(hash) else {
            continue;
        };
        let matched = actual
            .iter()
            .filter(|candidate| !predicted_set.contains(candidate) && !claimed.contains(*candidate))
            .find(|candidate| {
                actual_details
                    .get(*candidate)
                    .is_some_and(|actual_tx| similar(predicted_tx, actual_tx, base_fee_wei))
            });
        if let Some(candidate) = matched {
            claimed.insert(*candidate);
            partial_matches += 1;
        }
    }

    let raw = (exact_matches * 100 + partial_matches * 50) as f64 / predicted.len() as f64;
    AccuracyBreakdown {
        exact_matches,
        partial_matches,
        score: raw.clamp(0.0, 100.0),
    }
}

fn similar(a: &PendingTx, b: &PendingTx, base_fee_wei: u128) -> bool {
    if a.to != b.to || a.selector() != b.selector() {
        return false;
    }
    let fee_a = effective_priority_fee(a, base_fee_wei);
    let fee_b = effective_priority_fee(b, base_fee_wei);
    if !within_pct(fee_a, fee_b, 10) {
        return false;
    }
    within_pct_u256(a.value, b.value, 5)
}

/// Relative difference against the larger operand.
fn within_pct(a: u128, b: u128, pct: u128) -> bool {
    let (hi, lo) = if a > b { (a, b) } else { (b, a) };
    (hi - lo).saturating_mul(100) <= hi.saturating_mul(pct)
}

fn within_pct_u256(a: U256, b: U256, pct: u64) -> bool {
    let (hi, lo) = if a > b { (a, b) } else { (b, a) };
    (hi - lo).saturating_mul(U256::from(100)) <= hi.saturating_mul(U256::from(pct))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, Bytes};
    use cast_data::types::TxStatus;

    const GWEI: u128 = 1_000_000_000;

    fn tx(hash_byte: u8, to_byte: u8, priority: u128, value: u128, selector: [u8; 4]) -> PendingTx {
        let mut input = selector.to_vec();
        input.extend_from_slice(&[0u8; 32]);
        PendingTx {
            hash: B256::repeat_byte(hash_byte),
            from: Address::repeat_byte(0x01),
            to: Some(Address::repeat_byte(to_byte)),
            value: U256::from(value),
            gas_limit: 50_000,
            nonce: Some(0),
            gas_price: None,
            max_fee_per_gas: Some(100 * GWEI),
            max_priority_fee_per_gas: Some(priority),
            input: Bytes::from(input),
            first_seen_ms: 0,
            status: TxStatus::Pending,
        }
    }

    fn details(txs: &[PendingTx]) -> HashMap<B256, PendingTx> {
        txs.iter().map(|tx| (tx.hash, tx.clone())).collect()
    }

    #[test]
    fn perfect_prediction_scores_100() {
        let txs: Vec<PendingTx> = (1u8..=3)
            .map(|i| tx(i, 0x10, 2 * GWEI, 1000, [0xa9, 0x05, 0x9c, 0xbb]))
            .collect();
        let hashes: Vec<B256> = txs.iter().map(|t| t.hash).collect();
        let result = score(&hashes, &hashes, &details(&txs), &details(&txs), 10 * GWEI);
        assert_eq!(result.exact_matches, 3);
        assert_eq!(result.score, 100.0);
    }

    #[test]
    fn disjoint_and_dissimilar_scores_0() {
        let predicted = vec![tx(0x01, 0x10, 2 * GWEI, 1000, [0x11, 0x11, 0x11, 0x11])];
        let actual = vec![tx(0x02, 0x20, 9 * GWEI, 5, [0x22, 0x22, 0x22, 0x22])];
        let predicted_hashes: Vec<B256> = predicted.iter().map(|t| t.hash).collect();
        let actual_hashes: Vec<B256> = actual.iter().map(|t| t.hash).collect();
        let result = score(
            &predicted_hashes,
            &actual_hashes,
            &details(&predicted),
            &details(&actual),
            10 * GWEI,
        );
        assert_eq!(result.score, 0.0);
    }

    #[test]
    fn partial_match_scores_half() {
        // Predicted {P1, P2, P3}; actual {P1, X, Y} with X similar to P2.
        let p1 = tx(0x01, 0x10, 2 * GWEI, 1000, [0xaa, 0xaa, 0xaa, 0xaa]);
        let p2 = tx(0x02, 0x11, 2 * GWEI, 1000, [0xbb, 0xbb, 0xbb, 0xbb]);
        let p3 = tx(0x03, 0x12, 2 * GWEI, 1000, [0xcc, 0xcc, 0xcc, 0xcc]);
        let x = tx(0x04, 0x11, 2 * GWEI, 1000, [0xbb, 0xbb, 0xbb, 0xbb]);
        let y = tx(0x05, 0x30, 7 * GWEI, 42, [0xdd, 0xdd, 0xdd, 0xdd]);

        let predicted_hashes = vec![p1.hash, p2.hash, p3.hash];
        let actual_hashes = vec![p1.hash, x.hash, y.hash];
        let result = score(
            &predicted_hashes,
            &actual_hashes,
            &details(&[p1.clone(), p2, p3]),
            &details(&[p1, x, y]),
            10 * GWEI,
        );
        assert_eq!(result.exact_matches, 1);
        assert_eq!(result.partial_matches, 1);
        assert_eq!(result.score, 50.0);
    }

    #[test]
    fn one_partial_match_per_predicted_hash() {
        // Two predicted misses, one similar actual: only one claims it.
        let p1 = tx(0x01, 0x11, 2 * GWEI, 1000, [0xbb, 0xbb, 0xbb, 0xbb]);
        let p2 = tx(0x02, 0x11, 2 * GWEI, 1000, [0xbb, 0xbb, 0xbb, 0xbb]);
        let x = tx(0x03, 0x11, 2 * GWEI, 1000, [0xbb, 0xbb, 0xbb, 0xbb]);

        let result = score(
            &[p1.hash, p2.hash],
            &[x.hash],
            &details(&[p1, p2]),
            &details(&[x]),
            10 * GWEI,
        );
        assert_eq!(result.partial_matches, 1);
        assert_eq!(result.score, 25.0);
    }

    #[test]
    fn fee_divergence_blocks_similarity() {
        let p = tx(0x01, 0x11, 2 * GWEI, 1000, [0xbb, 0xbb, 0xbb, 0xbb]);
        let far = tx(0x02, 0x11, 4 * GWEI, 1000, [0xbb, 0xbb, 0xbb, 0xbb]);
        let result = score(
            &[p.hash],
            &[far.hash],
            &details(&[p]),
            &details(&[far]),
            10 * GWEI,
        );
        assert_eq!(result.partial_matches, 0);
    }

    #[test]
    fn empty_prediction_scores_0() {
        let result = score(&[], &[B256::repeat_byte(0x01)], &HashMap::new(), &HashMap::new(), 0);
        assert_eq!(result.score, 0.0);
    }
}
