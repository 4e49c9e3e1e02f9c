//! Contract and signature registry.
//!
//! Resolution is layered: a static table of well-known mainnet contracts,
//! then the persistent cache, then optional external resolvers (Sourcify
//! first, an Etherscan-style API when configured). An external miss is
//! recorded with `fetch_attempted` so the same address is never looked up
//! twice.

use std::sync::Arc;

use alloy::primitives::Address;
use eyre::Result;

use cast_data::types::{ContractCacheEntry, ContractKind};
use cast_data::Store;
use cast_node::{NodeClient, RateLimiter};

use crate::resolvers::Resolvers;
use crate::selectors;

/// Ethereum mainnet contract addresses (compile-time constants).
pub mod addresses {
    use alloy::primitives::Address;

    /// Uniswap V2 Router02
    pub const UNISWAP_V2_ROUTER: Address =
        alloy::primitives::address!("7a250d5630B4cF539739dF2C5dAcb4c659F2488D");

    /// Uniswap V3 SwapRouter
    pub const UNISWAP_V3_ROUTER: Address =
        alloy::primitives::address!("E592427A0AEce92De3Edee1F18E0157C05861564");

    /// Uniswap V3 SwapRouter02
    pub const UNISWAP_V3_ROUTER_02: Address =
        alloy::primitives::address!("68b3465833fb72A70ecDF485E0e4C7bD8665Fc45");

    /// SushiSwap Router
    pub const SUSHISWAP_ROUTER: Address =
        alloy::primitives::address!("d9e1cE17f2641f24aE83637ab66a2cca9C378B9F");

    /// 1inch Aggregation Router v5
    pub const ONEINCH_V5_ROUTER: Address =
        alloy::primitives::address!("1111111254EEB25477B68fb85Ed929f73A960582");

    /// AAVE v2 LendingPool
    pub const AAVE_V2_POOL: Address =
        alloy::primitives::address!("7d2768dE32b0b80b7a3454c06BdAc94A69DDc7A9");

    /// AAVE v3 Pool
    pub const AAVE_V3_POOL: Address =
        alloy::primitives::address!("87870Bca3F3fD6335C3F4ce8392D69350B4fA4E2");

    /// Curve 3pool
    pub const CURVE_3POOL: Address =
        alloy::primitives::address!("bEbc44782C7dB0a1A60Cb6fe97d0b483032FF1C7");

    /// Balancer v2 Vault
    pub const BALANCER_VAULT: Address =
        alloy::primitives::address!("BA12222222228d8Ba445958a75a0704d566BF2C8");

    /// Seaport 1.5
    pub const SEAPORT: Address =
        alloy::primitives::address!("00000000000000ADc04C56Bf30aC9d3c0aAF14dC");

    /// Arbitrum delayed inbox
    pub const ARBITRUM_INBOX: Address =
        alloy::primitives::address!("4Dbd4fc535Ac27206064B68FfCf827b0A60BAB3f");

    /// Optimism L1 standard bridge
    pub const OPTIMISM_GATEWAY: Address =
        alloy::primitives::address!("99C9fc46f92E8a1c0deC1b1747d010903E884bE1");

    /// Polygon PoS bridge (RootChainManager)
    pub const POLYGON_BRIDGE: Address =
        alloy::primitives::address!("A0c68C638235ee32657e8F720a23ceC1bFc77C77");

    /// zkSync Era diamond proxy
    pub const ZKSYNC_DIAMOND: Address =
        alloy::primitives::address!("32400084C286CF3E17e7B677ea9583e60a000324");

    /// Chainlink ETH/USD aggregator
    pub const CHAINLINK_ETH_USD: Address =
        alloy::primitives::address!("5f4eC3Df9cbd43714FE2740f5E3616155c5b8419");

    /// Wrapped Ether
    pub const WETH: Address =
        alloy::primitives::address!("C02aaA39b223FE8D0A0e5C4F27eAD9083C756Cc2");

    /// USD Coin
    pub const USDC: Address =
        alloy::primitives::address!("A0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48");

    /// Tether
    pub const USDT: Address =
        alloy::primitives::address!("dAC17F958D2ee523a2206206994597C13D831ec7");

    /// Dai Stablecoin
    pub const DAI: Address =
        alloy::primitives::address!("6B175474E89094C44Da98b954EedeAC495271d0F");

    /// Wrapped Bitcoin
    pub const WBTC: Address =
        alloy::primitives::address!("2260FAC5E5542a773Aa44fBCfeDf7C193bc2C599");
}

/// One row of the static well-known table.
#[derive(Clone, Copy, Debug)]
pub struct KnownContract {
    pub address: Address,
    /// Protocol label, e.g. "Uniswap V2".
    pub label: &'static str,
    pub kind: ContractKind,
    /// Token symbol, for token entries.
    pub token_symbol: Option<&'static str>,
    /// Token decimals, for token entries.
    pub token_decimals: Option<u8>,
}

static KNOWN_CONTRACTS: &[KnownContract] = &[
    KnownContract {
        address: addresses::UNISWAP_V2_ROUTER,
        label: "Uniswap V2",
        kind: ContractKind::Dex,
        token_symbol: None,
        token_decimals: None,
    },
    KnownContract {
        address: addresses::UNISWAP_V3_ROUTER,
        label: "Uniswap V3",
        kind: ContractKind::Dex,
        token_symbol: None,
        token_decimals: None,
    },
    KnownContract {
        address: addresses::UNISWAP_V3_ROUTER_02,
        label: "Uniswap V3",
        kind: ContractKind::Dex,
        token_symbol: None,
        token_decimals: None,
    },
    KnownContract {
        address: addresses::SUSHISWAP_ROUTER,
        label: "SushiSwap",
        kind: ContractKind::Dex,
        token_symbol: None,
        token_decimals: None,
    },
    KnownContract {
        address: addresses::ONEINCH_V5_ROUTER,
        label: "1inch",
        kind: ContractKind::Dex,
        token_symbol: None,
        token_decimals: None,
    },
    KnownContract {
        address: addresses::AAVE_V2_POOL,
        label: "AAVE V2",
        kind: ContractKind::Lending,
        token_symbol: None,
        token_decimals: None,
    },
    KnownContract {
        address: addresses::AAVE_V3_POOL,
        label: "AAVE V3",
        kind: ContractKind::Lending,
        token_symbol: None,
        token_decimals: None,
    },
    KnownContract {
        address: addresses::CURVE_3POOL,
        label: "Curve",
        kind: ContractKind::Dex,
        token_symbol: None,
        token_decimals: None,
    },
    KnownContract {
        address: addresses::BALANCER_VAULT,
        label: "Balancer",
        kind: ContractKind::Dex,
        token_symbol: None,
        token_decimals: None,
    },
    KnownContract {
        address: addresses::SEAPORT,
        label: "OpenSea Seaport",
        kind: ContractKind::Nft,
        token_symbol: None,
        token_decimals: None,
    },
    KnownContract {
        address: addresses::ARBITRUM_INBOX,
        label: "Arbitrum Bridge",
        kind: ContractKind::Bridge,
        token_symbol: None,
        token_decimals: None,
    },
    KnownContract {
        address: addresses::OPTIMISM_GATEWAY,
        label: "Optimism Bridge",
        kind: ContractKind::Bridge,
        token_symbol: None,
        token_decimals: None,
    },
    KnownContract {
        address: addresses::POLYGON_BRIDGE,
        label: "Polygon Bridge",
        kind: ContractKind::Bridge,
        token_symbol: None,
        token_decimals: None,
    },
    KnownContract {
        address: addresses::ZKSYNC_DIAMOND,
        label: "zkSync Bridge",
        kind: ContractKind::Bridge,
        token_symbol: None,
        token_decimals: None,
    },
    KnownContract {
        address: addresses::CHAINLINK_ETH_USD,
        label: "Chainlink",
        kind: ContractKind::Oracle,
        token_symbol: None,
        token_decimals: None,
    },
    KnownContract {
        address: addresses::WETH,
        label: "WETH",
        kind: ContractKind::Token,
        token_symbol: Some("WETH"),
        token_decimals: Some(18),
    },
    KnownContract {
        address: addresses::USDC,
        label: "USDC",
        kind: ContractKind::Token,
        token_symbol: Some("USDC"),
        token_decimals: Some(6),
    },
    KnownContract {
        address: addresses::USDT,
        label: "USDT",
        kind: ContractKind::Token,
        token_symbol: Some("USDT"),
        token_decimals: Some(6),
    },
    KnownContract {
        address: addresses::DAI,
        label: "DAI",
        kind: ContractKind::Token,
        token_symbol: Some("DAI"),
        token_decimals: Some(18),
    },
    KnownContract {
        address: addresses::WBTC,
        label: "WBTC",
        kind: ContractKind::Token,
        token_symbol: Some("WBTC"),
        token_decimals: Some(8),
    },
];

/// Static-table lookup. Pure; the decoder's classification layer relies on
/// this never consulting the cache or network.
pub fn static_lookup(address: Address) -> Option<&'static KnownContract> {
    KNOWN_CONTRACTS.iter().find(|entry| entry.address == address)
}

/// True when the address is one of the static bridge contracts.
pub fn is_bridge_contract(address: Address) -> bool {
    matches!(
        static_lookup(address),
        Some(entry) if entry.kind == ContractKind::Bridge
    )
}

/// Layered contract/signature resolver.
pub struct ContractRegistry {
    store: Arc<Store>,
    limiter: RateLimiter,
    client: Option<NodeClient>,
    resolvers: Resolvers,
}

impl ContractRegistry {
    pub fn new(
        store: Arc<Store>,
        limiter: RateLimiter,
        client: Option<NodeClient>,
        etherscan_api_key: Option<String>,
    ) -> Self {
        Self {
            store,
            limiter,
            client,
            resolvers: Resolvers::new(etherscan_api_key),
        }
    }

    /// Resolves an address through static table → cache → external
    /// resolvers. Returns `None` when nothing recognizes the address;
    /// resolution failures degrade, they never propagate.
    pub async fn resolve_contract(&self, address: Address) -> Option<ContractCacheEntry> {
        if let Some(known) = static_lookup(address) {
            let mut entry = ContractCacheEntry::empty(address);
            entry.contract_name = Some(known.label.to_string());
            entry.protocol = Some(known.label.to_string());
            entry.kind = Some(known.kind);
            entry.verified = true;
            return Some(entry);
        }

        match self.store.lookup_contract(address) {
            Ok(Some(entry)) => {
                log_store_failure(self.store.increment_contract_call_count(address));
                let has_data =
                    entry.protocol.is_some() || entry.abi.is_some() || entry.contract_name.is_some();
                if has_data {
                    return Some(entry);
                }
                if entry.fetch_attempted {
                    // External lookup already failed for this address.
                    return None;
                }
            }
            Ok(None) => {}
            Err(err) => {
                tracing::debug!(%err, %address, "contract cache read failed");
                return None;
            }
        }

        self.resolve_external(address).await
    }

    async fn resolve_external(&self, address: Address) -> Option<ContractCacheEntry> {
        let resolved = self
            .limiter
            .submit(self.resolvers.fetch_abi(address))
            .await;

        let mut entry = ContractCacheEntry::empty(address);
        match resolved {
            Ok(Some(contract)) => {
                entry.contract_name = contract.name;
                entry.abi = contract.abi;
                entry.verified = contract.verified;
                log_store_failure(self.store.upsert_contract(&entry));
                Some(entry)
            }
            Ok(None) => {
                entry.fetch_attempted = true;
                log_store_failure(self.store.upsert_contract(&entry));
                None
            }
            Err(err) => {
                tracing::debug!(%err, %address, "external contract lookup failed");
                entry.fetch_attempted = true;
                log_store_failure(self.store.upsert_contract(&entry));
                None
            }
        }
    }

    /// Resolves a selector to a method name: embedded map, then the
    /// persisted table, then the public directory.
    pub async fn resolve_method(&self, selector: [u8; 4]) -> Option<String> {
        if let Some(name) = selectors::method_name(selector) {
            return Some(name.to_string());
        }

        match self.store.lookup_signature(selector) {
            Ok(Some(signature)) => return Some(trim_signature(&signature)),
            Ok(None) => {}
            Err(err) => {
                tracing::debug!(%err, "signature cache read failed");
            }
        }

        let signature = self
            .limiter
            .submit(self.resolvers.fetch_signature(selector))
            .await
            .ok()
            .flatten()?;
        log_store_failure(self.store.save_signature(selector, &signature));
        Some(trim_signature(&signature))
    }

    /// Token symbol and decimals: static table first, then on-chain
    /// `symbol()`/`decimals()` through the rate limiter.
    pub async fn token_metadata(&self, token: Address) -> Option<(String, u8)> {
        if let Some(known) = static_lookup(token) {
            if let (Some(symbol), Some(decimals)) = (known.token_symbol, known.token_decimals) {
                return Some((symbol.to_string(), decimals));
            }
        }

        let client = self.client.as_ref()?;
        match self.limiter.submit(client.fetch_token_metadata(token)).await {
            Ok(Some(metadata)) => Some((metadata.symbol, metadata.decimals)),
            Ok(None) => None,
            Err(err) => {
                tracing::debug!(%err, %token, "token metadata read failed");
                None
            }
        }
    }
}

fn trim_signature(signature: &str) -> String {
    signature
        .split('(')
        .next()
        .unwrap_or(signature)
        .to_string()
}

fn log_store_failure(result: Result<()>) {
    if let Err(err) = result {
        tracing::debug!(%err, "contract cache write failed");
    }
}
