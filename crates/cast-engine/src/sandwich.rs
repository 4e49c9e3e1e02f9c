//! Sandwich-pattern detection over the candidate set.
//!
//! Within the predicted swaps plus a short window of observed swaps,
//! groups transactions by token pair and emits (frontrun, target, backrun)
//! triples: the two highest-fee legs of a group bracket any lower-fee
//! transaction moving at least 0.1 ETH. Emitted triples are placed in the
//! prediction order frontrun → target → backrun and annotated as
//! sandwiches.
//!
//! Token pairs come from fixed calldata offsets (the 20-byte suffixes of
//! the first two 32-byte ABI slots), which is reliable for
//! Uniswap-V2-style routers; when extraction fails the transaction is
//! simply not grouped.

use std::collections::{BTreeMap, HashMap};

use alloy::primitives::{Address, B256, U256};

use cast_data::types::{PendingTx, TxAnnotation, TxCategory, TxKind};

/// Observation window for swaps considered alongside the predicted set.
pub const SANDWICH_WINDOW_MS: u64 = 2_000;

/// Minimum victim transfer value: 0.1 ETH.
pub const MIN_TARGET_VALUE_WEI: u128 = 100_000_000_000_000_000;

/// Sorted token pair from the first two ABI slots of the calldata.
///
/// Returns `None` when the calldata is too short to carry both slots.
pub fn token_pair(input: &[u8]) -> Option<(Address, Address)> {
    if input.len() < 68 {
        return None;
    }
    let a = Address::from_slice(&input[16..36]);
    let b = Address::from_slice(&input[48..68]);
    if a <= b {
        Some((a, b))
    } else {
        Some((b, a))
    }
}

/// Runs detection over `candidates` and rewrites the prediction order and
/// annotations in place. Returns the emitted triples.
pub fn detect_and_annotate(
    predicted: &mut Vec<B256>,
    annotations: &mut BTreeMap<B256, TxAnnotation>,
    candidates: &[PendingTx],
    fees: &HashMap<B256, u128>,
) -> Vec<(B256, B256, B256)> {
    let mut groups: BTreeMap<(Address, Address), Vec<&PendingTx>> = BTreeMap::new();
    for tx in candidates {
        if let Some(pair) = token_pair(&tx.input) {
            let group = groups.entry(pair).or_default();
            if !group.iter().any(|existing| existing.hash == tx.hash) {
                group.push(tx);
            }
        }
    }

    let min_value = U256::from(MIN_TARGET_VALUE_WEI);
    let mut triples = Vec::new();

    for (_, mut group) in groups {
        if group.len() < 3 {
            continue;
        }
        group.sort_by(|a, b| {
            let fee_a = fees.get(&a.hash).copied().unwrap_or(0);
            let fee_b = fees.get(&b.hash).copied().unwrap_or(0);
            fee_b
                .cmp(&fee_a)
                .then(a.first_seen_ms.cmp(&b.first_seen_ms))
        });

        // Frontrun and backrun are the two best-paying legs; anything
        // they bracket qualifies as a target if it moves enough value.
        let front = group[0].hash;
        let back = group[1].hash;
        let targets: Vec<B256> = group[2..]
            .iter()
            .filter(|tx| tx.value >= min_value)
            .map(|tx| tx.hash)
            .collect();
        if targets.is_empty() {
            continue;
        }

        for target in &targets {
            triples.push((front, *target, back));
        }

        // Place the triple members as one contiguous block so every
        // emitted triple reads frontrun → target → backrun.
        let mut block = Vec::with_capacity(targets.len() + 2);
        block.push(front);
        block.extend(targets.iter().copied());
        block.push(back);

        let insert_at = predicted
            .iter()
            .position(|hash| block.contains(hash))
            .unwrap_or(predicted.len());
        predicted.retain(|hash| !block.contains(hash));
        let insert_at = insert_at.min(predicted.len());
        for (offset, hash) in block.iter().enumerate() {
            predicted.insert(insert_at + offset, *hash);
        }

        for hash in &block {
            let ann = annotations.entry(*hash).or_insert_with(|| {
                let mut ann = TxAnnotation::unknown();
                ann.category = TxCategory::Dex;
                ann
            });
            ann.kind = TxKind::Sandwich;
            if targets.contains(hash) {
                ann.is_sandwich_target = Some(true);
            }
        }
    }

    triples
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Bytes;
    use cast_data::types::TxStatus;

    const GWEI: u128 = 1_000_000_000;
    const ETH: u128 = 1_000_000_000_000_000_000;

    fn pair_calldata(token_a: Address, token_b: Address) -> Vec<u8> {
        let mut input = vec![0x38, 0xed, 0x17, 0x39];
        input.extend_from_slice(&[0u8; 64]);
        input[16..36].copy_from_slice(token_a.as_slice());
        input[48..68].copy_from_slice(token_b.as_slice());
        input
    }

    fn swap_tx(hash_byte: u8, priority_gwei: u128, value_wei: u128, input: Vec<u8>) -> PendingTx {
        PendingTx {
            hash: B256::repeat_byte(hash_byte),
            from: Address::repeat_byte(hash_byte),
            to: Some(Address::repeat_byte(0xee)),
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

    fn fee_map(txs: &[PendingTx]) -> HashMap<B256, u128> {
        txs.iter()
            .map(|tx| (tx.hash, tx.max_priority_fee_per_gas.unwrap_or(0)))
            .collect()
    }

    #[test]
    fn token_pair_extracts_and_sorts() {
        let t1 = Address::repeat_byte(0x0b);
        let t2 = Address::repeat_byte(0x0a);
        let pair = token_pair(&pair_calldata(t1, t2)).unwrap();
        assert_eq!(pair, (t2, t1));
        assert!(token_pair(&[0x38, 0xed, 0x17, 0x39]).is_none());
    }

    #[test]
    fn triple_emitted_and_placed_in_order() {
        let t1 = Address::repeat_byte(0x0a);
        let t2 = Address::repeat_byte(0x0b);
        let front = swap_tx(0x01, 50, ETH / 100, pair_calldata(t1, t2));
        let victim = swap_tx(0x02, 10, ETH, pair_calldata(t1, t2));
        let back = swap_tx(0x03, 30, ETH / 100, pair_calldata(t1, t2));

        let candidates = vec![victim.clone(), back.clone(), front.clone()];
        let fees = fee_map(&candidates);
        // Prediction order starts fee-descending: front, back, victim.
        let mut predicted = vec![front.hash, back.hash, victim.hash];
        let mut annotations = BTreeMap::new();

        let triples = detect_and_annotate(&mut predicted, &mut annotations, &candidates, &fees);
        assert_eq!(triples, vec![(front.hash, victim.hash, back.hash)]);
        assert_eq!(predicted, vec![front.hash, victim.hash, back.hash]);

        assert_eq!(annotations[&front.hash].kind, TxKind::Sandwich);
        assert_eq!(annotations[&victim.hash].kind, TxKind::Sandwich);
        assert_eq!(annotations[&back.hash].kind, TxKind::Sandwich);
        assert_eq!(annotations[&victim.hash].is_sandwich_target, Some(true));
        assert_eq!(annotations[&front.hash].is_sandwich_target, None);
        assert_eq!(annotations[&back.hash].is_sandwich_target, None);
    }

    #[test]
    fn window_swaps_are_inserted_into_the_prediction() {
        let t1 = Address::repeat_byte(0x0a);
        let t2 = Address::repeat_byte(0x0b);
        let front = swap_tx(0x01, 50, 0, pair_calldata(t1, t2));
        let victim = swap_tx(0x02, 10, 2 * ETH, pair_calldata(t1, t2));
        let back = swap_tx(0x03, 30, 0, pair_calldata(t1, t2));

        // Only the victim was predicted; the bracket comes from the window.
        let candidates = vec![front.clone(), victim.clone(), back.clone()];
        let fees = fee_map(&candidates);
        let mut predicted = vec![victim.hash];
        let mut annotations = BTreeMap::new();

        detect_and_annotate(&mut predicted, &mut annotations, &candidates, &fees);
        assert_eq!(predicted, vec![front.hash, victim.hash, back.hash]);
    }

    #[test]
    fn two_targets_share_one_bracket() {
        let t1 = Address::repeat_byte(0x0a);
        let t2 = Address::repeat_byte(0x0b);
        let front = swap_tx(0x01, 50, 0, pair_calldata(t1, t2));
        let back = swap_tx(0x02, 30, 0, pair_calldata(t1, t2));
        let victim_a = swap_tx(0x03, 10, ETH, pair_calldata(t1, t2));
        let victim_b = swap_tx(0x04, 5, ETH, pair_calldata(t1, t2));

        let candidates = vec![front.clone(), back.clone(), victim_a.clone(), victim_b.clone()];
        let fees = fee_map(&candidates);
        let mut predicted = vec![front.hash, back.hash, victim_a.hash, victim_b.hash];
        let mut annotations = BTreeMap::new();

        let triples = detect_and_annotate(&mut predicted, &mut annotations, &candidates, &fees);
        assert_eq!(
            triples,
            vec![
                (front.hash, victim_a.hash, back.hash),
                (front.hash, victim_b.hash, back.hash),
            ]
        );
        assert_eq!(
            predicted,
            vec![front.hash, victim_a.hash, victim_b.hash, back.hash]
        );
    }

    #[test]
    fn small_groups_and_small_values_are_ignored() {
        let t1 = Address::repeat_byte(0x0a);
        let t2 = Address::repeat_byte(0x0b);

        // Two transactions: no triple.
        let a = swap_tx(0x01, 50, ETH, pair_calldata(t1, t2));
        let b = swap_tx(0x02, 10, ETH, pair_calldata(t1, t2));
        let candidates = vec![a.clone(), b.clone()];
        let fees = fee_map(&candidates);
        let mut predicted = vec![a.hash, b.hash];
        let mut annotations = BTreeMap::new();
        assert!(detect_and_annotate(&mut predicted, &mut annotations, &candidates, &fees)
            .is_empty());

        // Three transactions but the bracketed one moves under 0.1 ETH.
        let c = swap_tx(0x03, 30, ETH, pair_calldata(t1, t2));
        let low = swap_tx(0x04, 5, ETH / 20, pair_calldata(t1, t2));
        let candidates = vec![a, c, low];
        let fees = fee_map(&candidates);
        assert!(detect_and_annotate(&mut predicted, &mut annotations, &candidates, &fees)
            .is_empty());
    }

    #[test]
    fn different_pairs_never_group_together() {
        let t1 = Address::repeat_byte(0x0a);
        let t2 = Address::repeat_byte(0x0b);
        let t3 = Address::repeat_byte(0x0c);
        let a = swap_tx(0x01, 50, ETH, pair_calldata(t1, t2));
        let b = swap_tx(0x02, 30, ETH, pair_calldata(t1, t3));
        let c = swap_tx(0x03, 10, ETH, pair_calldata(t2, t3));

        let candidates = vec![a, b, c];
        let fees = fee_map(&candidates);
        let mut predicted = Vec::new();
        let mut annotations = BTreeMap::new();
        assert!(detect_and_annotate(&mut predicted, &mut annotations, &candidates, &fees)
            .is_empty());
    }
}
