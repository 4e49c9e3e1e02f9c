//! Embedded 4-byte selector tables.
//!
//! Selectors are the first 4 bytes of the Keccak-256 hash of the canonical
//! function signature. The sets below cover the common router/pool entry
//! points; anything outside them falls through to the registry layers.

/// ERC-20 transfer/transferFrom/approve.
pub fn is_erc20(selector: [u8; 4]) -> bool {
    matches!(
        selector,
        [0xa9, 0x05, 0x9c, 0xbb] // transfer(address,uint256)
            | [0x23, 0xb8, 0x72, 0xdd] // transferFrom(address,address,uint256)
            | [0x09, 0x5e, 0xa7, 0xb3] // approve(address,uint256)
    )
}

/// Common DEX swap entry points (Uniswap V2/V3 routers and variants,
/// 1inch aggregation, Curve, Balancer).
pub fn is_swap(selector: [u8; 4]) -> bool {
    matches!(
        selector,
        [0x38, 0xed, 0x17, 0x39] // swapExactTokensForTokens
            | [0x88, 0x03, 0xdb, 0xee] // swapTokensForExactTokens
            | [0x7f, 0xf3, 0x6a, 0xb5] // swapExactETHForTokens
            | [0xfb, 0x3b, 0xdb, 0x41] // swapETHForExactTokens
            | [0x18, 0xcb, 0xaf, 0xe5] // swapExactTokensForETH
            | [0x4a, 0x25, 0xd9, 0x4a] // swapTokensForExactETH
            | [0xb6, 0xf9, 0xde, 0x95] // swapExactETHForTokensSupportingFeeOnTransferTokens
            | [0x79, 0x1a, 0xc9, 0x47] // swapExactTokensForETHSupportingFeeOnTransferTokens
            | [0x5c, 0x11, 0xd7, 0x95] // swapExactTokensForTokensSupportingFeeOnTransferTokens
            | [0x41, 0x4b, 0xf3, 0x89] // exactInputSingle (V3 SwapRouter)
            | [0xc0, 0x4b, 0x8d, 0x59] // exactInput (V3 SwapRouter)
            | [0xdb, 0x3e, 0x21, 0x98] // exactOutputSingle (V3 SwapRouter)
            | [0xf2, 0x8c, 0x04, 0x98] // exactOutput (V3 SwapRouter)
            | [0x04, 0xe4, 0x5a, 0xaf] // exactInputSingle (SwapRouter02)
            | [0xb8, 0x58, 0x18, 0x3f] // exactInput (SwapRouter02)
            | [0x50, 0x23, 0xb4, 0xdf] // exactOutputSingle (SwapRouter02)
            | [0x09, 0xb8, 0x13, 0x46] // exactOutput (SwapRouter02)
            | [0x5a, 0xe4, 0x01, 0xdc] // multicall(uint256,bytes[])
            | [0x12, 0xaa, 0x3c, 0xaf] // swap (1inch v5)
            | [0x05, 0x02, 0xb1, 0xc5] // unoswap (1inch v5)
            | [0xe4, 0x49, 0x02, 0x2e] // uniswapV3Swap (1inch v5)
            | [0x3d, 0xf0, 0x21, 0x24] // exchange (Curve)
            | [0x52, 0xbb, 0xbe, 0x29] // swap (Balancer vault)
    )
}

/// Liquidity management entry points.
pub fn is_liquidity(selector: [u8; 4]) -> bool {
    matches!(
        selector,
        [0xe8, 0xe3, 0x37, 0x00] // addLiquidity
            | [0xf3, 0x05, 0xd7, 0x19] // addLiquidityETH
            | [0xba, 0xa2, 0xab, 0xde] // removeLiquidity
            | [0x02, 0x75, 0x1c, 0xec] // removeLiquidityETH
            | [0x88, 0x31, 0x64, 0x56] // mint (V3 positions)
            | [0x21, 0x9f, 0x5d, 0x17] // increaseLiquidity
            | [0x0c, 0x49, 0xcc, 0xbe] // decreaseLiquidity
            | [0xfc, 0x6f, 0x78, 0x65] // collect
            | [0x45, 0x15, 0xce, 0xf3] // add_liquidity (Curve 3pool)
    )
}

/// Lending protocol entry points (AAVE, Compound).
pub fn is_lending(selector: [u8; 4]) -> bool {
    matches!(
        selector,
        [0x61, 0x7b, 0xa0, 0x37] // supply (AAVE v3)
            | [0xe8, 0xed, 0xa9, 0xdf] // deposit (AAVE v2)
            | [0xa4, 0x15, 0xbc, 0xad] // borrow (AAVE)
            | [0x57, 0x3a, 0xde, 0x81] // repay (AAVE)
            | [0x69, 0x32, 0x8d, 0xec] // withdraw (AAVE)
            | [0xa0, 0x71, 0x2d, 0x68] // mint (Compound)
            | [0xdb, 0x00, 0x6a, 0x75] // redeem (Compound)
            | [0x85, 0x2a, 0x12, 0xe3] // redeemUnderlying (Compound)
            | [0xc5, 0xeb, 0xea, 0xec] // borrow (Compound)
            | [0x0e, 0x75, 0x27, 0x02] // repayBorrow (Compound)
    )
}

/// Canonical bridge entry points.
pub fn is_bridge(selector: [u8; 4]) -> bool {
    matches!(
        selector,
        [0x43, 0x93, 0x70, 0xb1] // depositEth (Arbitrum inbox)
            | [0x9a, 0x2a, 0xc6, 0xd5] // depositETHTo (Optimism gateway)
            | [0xb1, 0xa1, 0xa8, 0x82] // depositETH (Optimism gateway)
            | [0x4f, 0xaa, 0x8a, 0x26] // depositEtherFor (Polygon PoS)
            | [0xe3, 0xde, 0xc8, 0xfb] // depositFor (Polygon PoS)
            | [0xeb, 0x67, 0x24, 0x19] // requestL2Transaction (zkSync)
    )
}

/// Human method name for the embedded selector set.
pub fn method_name(selector: [u8; 4]) -> Option<&'static str> {
    let name = match selector {
        [0xa9, 0x05, 0x9c, 0xbb] => "transfer",
        [0x23, 0xb8, 0x72, 0xdd] => "transferFrom",
        [0x09, 0x5e, 0xa7, 0xb3] => "approve",
        [0x38, 0xed, 0x17, 0x39] => "swapExactTokensForTokens",
        [0x88, 0x03, 0xdb, 0xee] => "swapTokensForExactTokens",
        [0x7f, 0xf3, 0x6a, 0xb5] => "swapExactETHForTokens",
        [0xfb, 0x3b, 0xdb, 0x41] => "swapETHForExactTokens",
        [0x18, 0xcb, 0xaf, 0xe5] => "swapExactTokensForETH",
        [0x4a, 0x25, 0xd9, 0x4a] => "swapTokensForExactETH",
        [0xb6, 0xf9, 0xde, 0x95] => "swapExactETHForTokensSupportingFeeOnTransferTokens",
        [0x79, 0x1a, 0xc9, 0x47] => "swapExactTokensForETHSupportingFeeOnTransferTokens",
        [0x5c, 0x11, 0xd7, 0x95] => "swapExactTokensForTokensSupportingFeeOnTransferTokens",
        [0x41, 0x4b, 0xf3, 0x89] => "exactInputSingle",
        [0xc0, 0x4b, 0x8d, 0x59] => "exactInput",
        [0xdb, 0x3e, 0x21, 0x98] => "exactOutputSingle",
        [0xf2, 0x8c, 0x04, 0x98] => "exactOutput",
        [0x04, 0xe4, 0x5a, 0xaf] => "exactInputSingle",
        [0xb8, 0x58, 0x18, 0x3f] => "exactInput",
        [0x50, 0x23, 0xb4, 0xdf] => "exactOutputSingle",
        [0x09, 0xb8, 0x13, 0x46] => "exactOutput",
        [0x5a, 0xe4, 0x01, 0xdc] => "multicall",
        [0x12, 0xaa, 0x3c, 0xaf] => "swap",
        [0x05, 0x02, 0xb1, 0xc5] => "unoswap",
        [0xe4, 0x49, 0x02, 0x2e] => "uniswapV3Swap",
        [0x3d, 0xf0, 0x21, 0x24] => "exchange",
        [0x52, 0xbb, 0xbe, 0x29] => "swap",
        [0xe8, 0xe3, 0x37, 0x00] => "addLiquidity",
        [0xf3, 0x05, 0xd7, 0x19] => "addLiquidityETH",
        [0xba, 0xa2, 0xab, 0xde] => "removeLiquidity",
        [0x02, 0x75, 0x1c, 0xec] => "removeLiquidityETH",
        [0x88, 0x31, 0x64, 0x56] => "mint",
        [0x21, 0x9f, 0x5d, 0x17] => "increaseLiquidity",
        [0x0c, 0x49, 0xcc, 0xbe] => "decreaseLiquidity",
        [0xfc, 0x6f, 0x78, 0x65] => "collect",
        [0x45, 0x15, 0xce, 0xf3] => "add_liquidity",
        [0x61, 0x7b, 0xa0, 0x37] => "supply",
        [0xe8, 0xed, 0xa9, 0xdf] => "deposit",
        [0xa4, 0x15, 0xbc, 0xad] => "borrow",
        [0x57, 0x3a, 0xde, 0x81] => "repay",
        [0x69, 0x32, 0x8d, 0xec] => "withdraw",
        [0xa0, 0x71, 0x2d, 0x68] => "mint",
        [0xdb, 0x00, 0x6a, 0x75] => "redeem",
        [0x85, 0x2a, 0x12, 0xe3] => "redeemUnderlying",
        [0xc5, 0xeb, 0xea, 0xec] => "borrow",
        [0x0e, 0x75, 0x27, 0x02] => "repayBorrow",
        [0x43, 0x93, 0x70, 0xb1] => "depositEth",
        [0x9a, 0x2a, 0xc6, 0xd5] => "depositETHTo",
        [0xb1, 0xa1, 0xa8, 0x82] => "depositETH",
        [0x4f, 0xaa, 0x8a, 0x26] => "depositEtherFor",
        [0xe3, 0xde, 0xc8, 0xfb] => "depositFor",
        [0xeb, 0x67, 0x24, 0x19] => "requestL2Transaction",
        _ => return None,
    };
    Some(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn erc20_transfer_recognized() {
        assert!(is_erc20([0xa9, 0x05, 0x9c, 0xbb]));
        assert!(!is_erc20([0xde, 0xad, 0xbe, 0xef]));
    }

    #[test]
    fn sets_are_disjoint_for_swap_and_liquidity() {
        let swap = [0x38, 0xed, 0x17, 0x39];
        assert!(is_swap(swap));
        assert!(!is_liquidity(swap));
        assert!(!is_lending(swap));
        assert!(!is_bridge(swap));
    }

    #[test]
    fn method_name_covers_the_embedded_sets() {
        assert_eq!(method_name([0x7f, 0xf3, 0x6a, 0xb5]), Some("swapExactETHForTokens"));
        assert_eq!(method_name([0x61, 0x7b, 0xa0, 0x37]), Some("supply"));
        assert_eq!(method_name([0xff, 0xff, 0xff, 0xff]), None);
    }
}
