//! Transaction annotation from calldata.
//!
//! Classification is a pure function of `(to, value, calldata)` against the
//! static registry table; [`Decoder::annotate`] layers cache- and
//! network-backed enrichment (method names, protocol labels, token
//! metadata) on top. Malformed calldata never errors; it degrades to an
//! `unknown` annotation.
//!
//! Argument decoding uses compile-time `sol!` definitions for the ERC-20
//! and Uniswap router entry points. Decoded integers are stringified in
//! decimal; addresses in lowercase hex.

use std::collections::BTreeMap;
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use alloy::sol;
use alloy::sol_types::SolCall;

use cast_data::types::{ContractKind, PendingTx, TxAnnotation, TxCategory, TxKind};

use crate::registry::{self, ContractRegistry};
use crate::selectors;

sol! {
    interface IERC20 {
        function transfer(address to, uint256 amount) external returns (bool);
        function transferFrom(address from, address to, uint256 amount) external returns (bool);
        function approve(address spender, uint256 amount) external returns (bool);
    }
}

sol! {
    interface UniswapV2Router02 {
        function swapExactTokensForTokens(
            uint256 amountIn,
            uint256 amountOutMin,
            address[] calldata path,
            address to,
            uint256 deadline
        ) external returns (uint256[] memory amounts);

        function swapTokensForExactTokens(
            uint256 amountOut,
            uint256 amountInMax,
            address[] calldata path,
            address to,
            uint256 deadline
        ) external returns (uint256[] memory amounts);

        function swapExactETHForTokens(
            uint256 amountOutMin,
            address[] calldata path,
            address to,
            uint256 deadline
        ) external payable returns (uint256[] memory amounts);

        function swapETHForExactTokens(
            uint256 amountOut,
            address[] calldata path,
            address to,
            uint256 deadline
        ) external payable returns (uint256[] memory amounts);

        function swapExactTokensForETH(
            uint256 amountIn,
            uint256 amountOutMin,
            address[] calldata path,
            address to,
            uint256 deadline
        ) external returns (uint256[] memory amounts);
    }
}

sol! {
    interface UniswapV3Router {
        struct ExactInputSingleParams {
            address tokenIn;
            address tokenOut;
            uint24 fee;
            address recipient;
            uint256 deadline;
            uint256 amountIn;
            uint256 amountOutMinimum;
            uint160 sqrtPriceLimitX96;
        }

        function exactInputSingle(ExactInputSingleParams calldata params)
            external
            payable
            returns (uint256 amountOut);
    }
}

/// Classifies a pending transaction against the embedded selector sets and
/// the static contract table. Deterministic in `(to, value, calldata)`.
pub fn classify(tx: &PendingTx) -> TxAnnotation {
    let mut ann = TxAnnotation::unknown();

    let Some(to) = tx.to else {
        if !tx.input.is_empty() {
            ann.kind = TxKind::ContractCreation;
            ann.category = TxCategory::Deployment;
        }
        return ann;
    };

    let Some(selector) = tx.selector() else {
        if tx.input.is_empty() && tx.value > U256::ZERO {
            ann.kind = TxKind::Transfer;
            ann.category = TxCategory::Native;
            ann.protocol_label = Some("Ethereum".to_string());
        }
        return ann;
    };

    if selectors::is_erc20(selector) {
        classify_erc20(tx, to, selector, &mut ann);
        return ann;
    }

    if selectors::is_swap(selector) {
        ann.kind = TxKind::Swap;
        ann.category = TxCategory::Dex;
        ann.method_name = selectors::method_name(selector).map(String::from);
        ann.protocol_label = registry::static_lookup(to).map(|known| known.label.to_string());
        let (params, token) = decode_swap_args(&tx.input);
        ann.params = params;
        ann.token = token.or_else(|| scan_token_candidates(&tx.input, to).into_iter().next());
        if let Some(token) = ann.token {
            attach_static_token(token, &mut ann);
        }
        return ann;
    }

    if selectors::is_liquidity(selector) {
        ann.kind = TxKind::Liquidity;
        ann.category = TxCategory::Dex;
        ann.method_name = selectors::method_name(selector).map(String::from);
        ann.protocol_label = registry::static_lookup(to).map(|known| known.label.to_string());
        ann.token = scan_token_candidates(&tx.input, to).into_iter().next();
        if let Some(token) = ann.token {
            attach_static_token(token, &mut ann);
        }
        return ann;
    }

    if selectors::is_lending(selector) {
        ann.kind = TxKind::Lending;
        ann.category = TxCategory::Defi;
        ann.method_name = selectors::method_name(selector).map(String::from);
        ann.protocol_label = registry::static_lookup(to).map(|known| known.label.to_string());
        return ann;
    }

    if selectors::is_bridge(selector) || registry::is_bridge_contract(to) {
        ann.kind = TxKind::Bridge;
        ann.category = TxCategory::Bridge;
        ann.method_name = selectors::method_name(selector).map(String::from);
        ann.protocol_label = registry::static_lookup(to).map(|known| known.label.to_string());
        return ann;
    }

    if let Some(known) = registry::static_lookup(to) {
        let (kind, category) = map_contract_kind(known.kind);
        ann.kind = kind;
        ann.category = category;
        ann.protocol_label = Some(known.label.to_string());
        return ann;
    }

    ann
}

fn classify_erc20(tx: &PendingTx, to: Address, selector: [u8; 4], ann: &mut TxAnnotation) {
    ann.kind = TxKind::Transfer;
    ann.category = TxCategory::Token;
    ann.method_name = selectors::method_name(selector).map(String::from);
    ann.token = Some(to);

    let mut params = BTreeMap::new();
    let mut amount = None;
    match selector {
        [0xa9, 0x05, 0x9c, 0xbb] => {
            if let Ok(call) = IERC20::transferCall::abi_decode(&tx.input) {
                params.insert("to".to_string(), format!("{:#x}", call.to));
                params.insert("amount".to_string(), call.amount.to_string());
                amount = Some(call.amount);
            }
        }
        [0x23, 0xb8, 0x72, 0xdd] => {
            if let Ok(call) = IERC20::transferFromCall::abi_decode(&tx.input) {
                params.insert("from".to_string(), format!("{:#x}", call.from));
                params.insert("to".to_string(), format!("{:#x}", call.to));
                params.insert("amount".to_string(), call.amount.to_string());
                amount = Some(call.amount);
            }
        }
        [0x09, 0x5e, 0xa7, 0xb3] => {
            if let Ok(call) = IERC20::approveCall::abi_decode(&tx.input) {
                params.insert("spender".to_string(), format!("{:#x}", call.spender));
                params.insert("amount".to_string(), call.amount.to_string());
                amount = Some(call.amount);
            }
        }
        _ => {}
    }
    if !params.is_empty() {
        ann.params = Some(params);
    }

    attach_static_token(to, ann);
    if let (Some(amount), Some(decimals)) = (amount, ann.token_decimals) {
        ann.token_amount = Some(format_units(amount, decimals));
    }
}

fn attach_static_token(token: Address, ann: &mut TxAnnotation) {
    if let Some(known) = registry::static_lookup(token) {
        if let (Some(symbol), Some(decimals)) = (known.token_symbol, known.token_decimals) {
            ann.token_symbol = Some(symbol.to_string());
            ann.token_decimals = Some(decimals);
            if ann.protocol_label.is_none() {
                ann.protocol_label = Some(known.label.to_string());
            }
        }
    }
}

/// Decodes the known router swap arguments into a name → value map and the
/// input-side token, when the calldata matches one of the compiled shapes.
fn decode_swap_args(input: &[u8]) -> (Option<BTreeMap<String, String>>, Option<Address>) {
    if let Ok(call) = UniswapV2Router02::swapExactTokensForTokensCall::abi_decode(input) {
        return (
            Some(v2_swap_params(
                [
                    ("amountIn", call.amountIn.to_string()),
                    ("amountOutMin", call.amountOutMin.to_string()),
                ],
                &call.path,
                call.to,
                call.deadline,
            )),
            call.path.first().copied(),
        );
    }
    if let Ok(call) = UniswapV2Router02::swapTokensForExactTokensCall::abi_decode(input) {
        return (
            Some(v2_swap_params(
                [
                    ("amountOut", call.amountOut.to_string()),
                    ("amountInMax", call.amountInMax.to_string()),
                ],
                &call.path,
                call.to,
                call.deadline,
            )),
            call.path.first().copied(),
        );
    }
    if let Ok(call) = UniswapV2Router02::swapExactETHForTokensCall::abi_decode(input) {
        return (
            Some(v2_swap_params(
                [("amountOutMin", call.amountOutMin.to_string())],
                &call.path,
                call.to,
                call.deadline,
            )),
            call.path.last().copied(),
        );
    }
    if let Ok(call) = UniswapV2Router02::swapETHForExactTokensCall::abi_decode(input) {
        return (
            Some(v2_swap_params(
                [("amountOut", call.amountOut.to_string())],
                &call.path,
                call.to,
                call.deadline,
            )),
            call.path.last().copied(),
        );
    }
    if let Ok(call) = UniswapV2Router02::swapExactTokensForETHCall::abi_decode(input) {
        return (
            Some(v2_swap_params(
                [
                    ("amountIn", call.amountIn.to_string()),
                    ("amountOutMin", call.amountOutMin.to_string()),
                ],
                &call.path,
                call.to,
                call.deadline,
            )),
            call.path.first().copied(),
        );
    }
    if let Ok(call) = UniswapV3Router::exactInputSingleCall::abi_decode(input) {
        let p = call.params;
        let mut params = BTreeMap::new();
        params.insert("tokenIn".to_string(), format!("{:#x}", p.tokenIn));
        params.insert("tokenOut".to_string(), format!("{:#x}", p.tokenOut));
        params.insert("fee".to_string(), p.fee.to_string());
        params.insert("recipient".to_string(), format!("{:#x}", p.recipient));
        params.insert("amountIn".to_string(), p.amountIn.to_string());
        params.insert("amountOutMinimum".to_string(), p.amountOutMinimum.to_string());
        return (Some(params), Some(p.tokenIn));
    }
    (None, None)
}

fn v2_swap_params<const N: usize>(
    amounts: [(&str, String); N],
    path: &[Address],
    to: Address,
    deadline: U256,
) -> BTreeMap<String, String> {
    let mut params = BTreeMap::new();
    for (name, value) in amounts {
        params.insert(name.to_string(), value);
    }
    let path_text = path
        .iter()
        .map(|addr| format!("{addr:#x}"))
        .collect::<Vec<_>>()
        .join(",");
    params.insert("path".to_string(), path_text);
    params.insert("to".to_string(), format!("{to:#x}"));
    params.insert("deadline".to_string(), deadline.to_string());
    params
}

/// Scans calldata at 32-byte-aligned offsets for 20-byte suffixes that
/// look like addresses. Returns up to two distinct candidates, skipping
/// the call target itself.
fn scan_token_candidates(input: &[u8], skip: Address) -> Vec<Address> {
    let mut out: Vec<Address> = Vec::new();
    let mut offset = 4;
    while offset + 32 <= input.len() && out.len() < 2 {
        let slot = &input[offset..offset + 32];
        if slot[..12].iter().all(|b| *b == 0) {
            let candidate = Address::from_slice(&slot[12..]);
            if !candidate.is_zero() && candidate != skip && !out.contains(&candidate) {
                out.push(candidate);
            }
        }
        offset += 32;
    }
    out
}

fn map_contract_kind(kind: ContractKind) -> (TxKind, TxCategory) {
    match kind {
        ContractKind::Dex => (TxKind::Swap, TxCategory::Dex),
        ContractKind::Lending => (TxKind::Lending, TxCategory::Defi),
        ContractKind::Bridge => (TxKind::Bridge, TxCategory::Bridge),
        ContractKind::Token => (TxKind::Transfer, TxCategory::Token),
        ContractKind::Oracle => (TxKind::Unknown, TxCategory::Defi),
        ContractKind::Nft => (TxKind::Unknown, TxCategory::Other),
    }
}

/// Formats a raw token amount by its decimals as a decimal string.
pub fn format_units(amount: U256, decimals: u8) -> String {
    if decimals == 0 {
        return amount.to_string();
    }
    let divisor = U256::from(10).pow(U256::from(decimals));
    let integer = amount / divisor;
    let fraction = amount % divisor;
    if fraction.is_zero() {
        return integer.to_string();
    }
    let fraction = format!("{fraction:0>width$}", width = decimals as usize);
    format!("{integer}.{}", fraction.trim_end_matches('0'))
}

/// Annotation front-end: pure classification plus registry enrichment.
pub struct Decoder {
    registry: Arc<ContractRegistry>,
}

impl Decoder {
    pub fn new(registry: Arc<ContractRegistry>) -> Self {
        Self { registry }
    }

    /// Produces the full annotation for a transaction, consulting the
    /// registry layers for method names, protocol labels, and token
    /// metadata the static pass could not fill.
    pub async fn annotate(&self, tx: &PendingTx) -> TxAnnotation {
        let mut ann = classify(tx);

        if ann.method_name.is_none() {
            if let Some(selector) = tx.selector() {
                ann.method_name = self.registry.resolve_method(selector).await;
            }
        }

        if ann.protocol_label.is_none() && !tx.input.is_empty() {
            if let Some(to) = tx.to {
                if let Some(entry) = self.registry.resolve_contract(to).await {
                    ann.protocol_label = entry.protocol.or(entry.contract_name);
                    if ann.kind == TxKind::Unknown {
                        if let Some(kind) = entry.kind {
                            let (tx_kind, category) = map_contract_kind(kind);
                            ann.kind = tx_kind;
                            ann.category = category;
                        }
                    }
                }
            }
        }

        if let Some(token) = ann.token {
            if ann.token_symbol.is_none() {
                if let Some((symbol, decimals)) = self.registry.token_metadata(token).await {
                    ann.token_symbol = Some(symbol);
                    ann.token_decimals = Some(decimals);
                    if ann.token_amount.is_none() {
                        let raw = ann
                            .params
                            .as_ref()
                            .and_then(|params| params.get("amount"))
                            .and_then(|amount| U256::from_str_radix(amount, 10).ok());
                        if let Some(raw) = raw {
                            ann.token_amount = Some(format_units(raw, decimals));
                        }
                    }
                }
            }
        }

        ann
    }
}
