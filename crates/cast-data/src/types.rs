//! Type definitions for mempool observation and block forecasting.
//!
//! In-memory quantities stay in integer wei (`u128` for per-gas fees, `U256`
//! for transfer values). Serialized forms render big integers as decimal
//! strings; unit conversion to Gwei happens only at that boundary.

use std::collections::BTreeMap;

use alloy::primitives::{Address, Bytes, B256, U256};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of an observed transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxStatus {
    /// Seen in the mempool, not yet mined.
    Pending,
    /// Appeared in a canonical block.
    Included,
    /// Dropped or replaced.
    Failed,
}

/// A transaction observed as pending but not yet mined.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingTx {
    /// Transaction hash, unique across the mempool.
    pub hash: B256,
    /// Sender address.
    pub from: Address,
    /// Recipient address (None for contract creation).
    pub to: Option<Address>,
    /// Transfer value in wei.
    pub value: U256,
    /// Gas limit.
    pub gas_limit: u64,
    /// Nonce, when the node reported one.
    pub nonce: Option<u64>,
    /// Legacy gas price in wei (type-0 transactions).
    pub gas_price: Option<u128>,
    /// Max fee per gas in wei (type-2 transactions).
    pub max_fee_per_gas: Option<u128>,
    /// Max priority fee per gas in wei (type-2 transactions).
    pub max_priority_fee_per_gas: Option<u128>,
    /// Calldata.
    pub input: Bytes,
    /// First mempool observation, unix milliseconds.
    pub first_seen_ms: u64,
    /// Lifecycle state.
    pub status: TxStatus,
}

impl PendingTx {
    /// 4-byte method selector, when the calldata carries one.
    pub fn selector(&self) -> Option<[u8; 4]> {
        if self.input.len() < 4 {
            return None;
        }
        let mut sel = [0u8; 4];
        sel.copy_from_slice(&self.input[..4]);
        Some(sel)
    }
}

/// Decoded interpretation of a pending transaction.
///
/// A pure function of `(to, value, calldata)` given a fixed registry
/// snapshot; cached by hash with a TTL.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxAnnotation {
    /// Known protocol label, e.g. "Uniswap V3".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol_label: Option<String>,
    /// Transaction kind.
    #[serde(rename = "type")]
    pub kind: TxKind,
    /// Coarse category.
    pub category: TxCategory,
    /// Human method name, e.g. "swapExactTokensForTokens".
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method_name: Option<String>,
    /// Decoded argument mapping; big integers stringified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<BTreeMap<String, String>>,
    /// Set on the victim leg of a sandwich triple.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_sandwich_target: Option<bool>,
    /// Token contract involved, when recognized.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<Address>,
    /// Token symbol, when resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_symbol: Option<String>,
    /// Token decimals, when resolved.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_decimals: Option<u8>,
    /// Transferred token amount formatted by decimals, decimal string.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_amount: Option<String>,
}

impl TxAnnotation {
    /// Annotation for calldata nothing else could classify.
    pub fn unknown() -> Self {
        Self {
            protocol_label: None,
            kind: TxKind::Unknown,
            category: TxCategory::Other,
            method_name: None,
            params: None,
            is_sandwich_target: None,
            token: None,
            token_symbol: None,
            token_decimals: None,
            token_amount: None,
        }
    }
}

/// Classified transaction kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxKind {
    Swap,
    Liquidity,
    Bridge,
    Lending,
    Transfer,
    Sandwich,
    ContractCreation,
    Unknown,
}

impl TxKind {
    /// Stable lowercase label used in metadata aggregation.
    pub fn label(&self) -> &'static str {
        match self {
            TxKind::Swap => "swap",
            TxKind::Liquidity => "liquidity",
            TxKind::Bridge => "bridge",
            TxKind::Lending => "lending",
            TxKind::Transfer => "transfer",
            TxKind::Sandwich => "sandwich",
            TxKind::ContractCreation => "contract_creation",
            TxKind::Unknown => "unknown",
        }
    }
}

/// Coarse transaction category.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxCategory {
    Dex,
    Defi,
    Bridge,
    Token,
    Native,
    Deployment,
    Other,
}

/// Canonical block header observed from the heads stream or fetched on
/// demand. `transaction_hashes` is empty for streamed headers; fetched
/// blocks carry the ordered list.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct BlockHead {
    /// Block number.
    pub number: u64,
    /// Block hash.
    pub hash: B256,
    /// Parent block hash.
    pub parent_hash: B256,
    /// Timestamp in unix seconds.
    pub timestamp: u64,
    /// Fee recipient / coinbase.
    pub miner: Address,
    /// Opaque extra data; used for best-effort builder naming.
    pub extra_data: Bytes,
    /// Gas limit.
    pub gas_limit: u64,
    /// Gas used.
    pub gas_used: u64,
    /// Base fee per gas in wei (None pre-1559).
    pub base_fee_per_gas: Option<u128>,
    /// Ordered transaction hashes, when fetched with bodies.
    pub transaction_hashes: Vec<B256>,
}

/// A forecast for one future block number.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockPrediction {
    /// Surrogate row id, assigned by the store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Target block number.
    pub block_number: u64,
    /// Predicted transaction hashes in order.
    pub predicted_transactions: Vec<B256>,
    /// Average effective priority fee of the predicted set, in Gwei.
    pub predicted_gas_price: f64,
    /// Annotation per predicted hash.
    pub transaction_details: BTreeMap<B256, TxAnnotation>,
    /// Aggregate counts and totals, attached after persistence.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<PredictionMetadata>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
}

/// Aggregate counts attached to a persisted prediction.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PredictionMetadata {
    /// Predicted transactions per protocol label.
    pub by_protocol: BTreeMap<String, u32>,
    /// Predicted transactions per kind label.
    pub by_type: BTreeMap<String, u32>,
    /// Sum of transfer values across the predicted set, wei decimal string.
    pub total_value_wei: String,
}

/// Reconciliation record pairing a forecast with the canonical block.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockComparison {
    /// Surrogate row id, assigned by the store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    /// Reconciled block number; unique across comparisons.
    pub block_number: u64,
    /// Hashes the forecast named.
    pub predicted_transactions: Vec<B256>,
    /// Hashes the canonical block carried.
    pub actual_transactions: Vec<B256>,
    /// Score in [0, 100].
    pub accuracy: f64,
    /// Fee recipient of the block.
    pub miner: Address,
    /// Raw printable extra-data, when any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub builder: Option<String>,
    /// Matched builder name, "unknown" when no signature matched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub builder_name: Option<String>,
    /// Average gas price carried over from the forecast, Gwei.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub average_gas_price: Option<f64>,
    /// Reconciliation time.
    pub timestamp: DateTime<Utc>,
}

/// Contract-type tag carried by registry entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContractKind {
    Dex,
    Lending,
    Bridge,
    Oracle,
    Nft,
    Token,
}

impl ContractKind {
    /// Parse the stored lowercase tag.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "dex" => Some(ContractKind::Dex),
            "lending" => Some(ContractKind::Lending),
            "bridge" => Some(ContractKind::Bridge),
            "oracle" => Some(ContractKind::Oracle),
            "nft" => Some(ContractKind::Nft),
            "token" => Some(ContractKind::Token),
            _ => None,
        }
    }

    /// Stored lowercase tag.
    pub fn tag(&self) -> &'static str {
        match self {
            ContractKind::Dex => "dex",
            ContractKind::Lending => "lending",
            ContractKind::Bridge => "bridge",
            ContractKind::Oracle => "oracle",
            ContractKind::Nft => "nft",
            ContractKind::Token => "token",
        }
    }
}

/// Cached contract-resolution outcome, persisted per address.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContractCacheEntry {
    /// Contract address.
    pub address: Address,
    /// Resolved contract name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contract_name: Option<String>,
    /// Protocol label.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
    /// Type tag.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ContractKind>,
    /// Abbreviated decoding schema (JSON ABI fragment), when fetched.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub abi: Option<String>,
    /// Source verification status reported by the resolver.
    pub verified: bool,
    /// External lookup already failed once; do not retry.
    pub fetch_attempted: bool,
    /// Times this address was consulted.
    pub call_count: u64,
}

impl ContractCacheEntry {
    /// Fresh entry for an address nothing has resolved yet.
    pub fn empty(address: Address) -> Self {
        Self {
            address,
            contract_name: None,
            protocol: None,
            kind: None,
            abi: None,
            verified: false,
            fetch_attempted: false,
            call_count: 0,
        }
    }
}

/// Wei to Gwei, display boundary only.
pub fn wei_to_gwei(wei: u128) -> f64 {
    wei as f64 / 1e9
}

/// Current wall-clock time in unix milliseconds.
pub fn unix_ms_now() -> u64 {
    Utc::now().timestamp_millis().max(0) as u64
}
