//! External contract and signature resolvers.
//!
//! Sourcify is consulted first (no key required); an Etherscan-style API is
//! used when a key is configured. All requests carry bounded timeouts and a
//! miss is a normal outcome, not an error.

use alloy::primitives::Address;
use eyre::{Context, Result};
use serde::Deserialize;

const SOURCIFY_REPO_URL: &str = "https://repo.sourcify.dev/contracts";
const ETHERSCAN_API_URL: &str = "https://api.etherscan.io/api";
const OPENCHAIN_LOOKUP_URL: &str = "https://api.openchain.xyz/signature-database/v1/lookup";

/// Mainnet chain id used in resolver URLs.
const CHAIN_ID: u64 = 1;

const HTTP_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(8);

/// Outcome of an external contract lookup.
#[derive(Clone, Debug, Default)]
pub struct ResolvedContract {
    pub name: Option<String>,
    /// JSON ABI text, when the resolver returned one.
    pub abi: Option<String>,
    pub verified: bool,
}

pub struct Resolvers {
    http: reqwest::Client,
    etherscan_api_key: Option<String>,
}

#[derive(Deserialize)]
struct EtherscanResponse {
    status: String,
    result: String,
}

#[derive(Deserialize)]
struct OpenchainResponse {
    result: OpenchainResult,
}

#[derive(Deserialize)]
struct OpenchainResult {
    function: std::collections::HashMap<String, Option<Vec<OpenchainEntry>>>,
}

#[derive(Deserialize)]
struct OpenchainEntry {
    name: String,
}

impl Resolvers {
    pub fn new(etherscan_api_key: Option<String>) -> Self {
        let http = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            http,
            etherscan_api_key,
        }
    }

    /// Looks the address up on Sourcify, then Etherscan when configured.
    ///
    /// Returns `Ok(None)` when neither resolver knows the contract.
    ///
    /// # Errors
    /// Returns error only on transport failures; a clean miss is `None`.
    #[tracing::instrument(skip(self), fields(address = %address))]
    pub async fn fetch_abi(&self, address: Address) -> Result<Option<ResolvedContract>> {
        if let Some(resolved) = self.try_sourcify(address).await? {
            return Ok(Some(resolved));
        }
        if self.etherscan_api_key.is_some() {
            return self.try_etherscan(address).await;
        }
        Ok(None)
    }

    async fn try_sourcify(&self, address: Address) -> Result<Option<ResolvedContract>> {
        let url = format!("{SOURCIFY_REPO_URL}/full_match/{CHAIN_ID}/{address:#x}/metadata.json");
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .wrap_err("sourcify request failed")?;
        if !response.status().is_success() {
            return Ok(None);
        }

        let metadata: serde_json::Value = response
            .json()
            .await
            .wrap_err("sourcify metadata was not JSON")?;
        let abi = metadata
            .get("output")
            .and_then(|output| output.get("abi"))
            .map(|abi| abi.to_string());
        let name = metadata
            .get("settings")
            .and_then(|settings| settings.get("compilationTarget"))
            .and_then(|target| target.as_object())
            .and_then(|target| target.values().next())
            .and_then(|name| name.as_str())
            .map(String::from);

        if abi.is_none() {
            return Ok(None);
        }
        tracing::debug!("resolved via sourcify");
        Ok(Some(ResolvedContract {
            name,
            abi,
            verified: true,
        }))
    }

    async fn try_etherscan(&self, address: Address) -> Result<Option<ResolvedContract>> {
        let Some(key) = &self.etherscan_api_key else {
            return Ok(None);
        };
        let url = format!(
            "{ETHERSCAN_API_URL}?module=contract&action=getabi&address={address:#x}&apikey={key}"
        );
        let response: EtherscanResponse = self
            .http
            .get(&url)
            .send()
            .await
            .wrap_err("etherscan request failed")?
            .json()
            .await
            .wrap_err("etherscan response was not JSON")?;

        if response.status != "1" {
            return Ok(None);
        }
        tracing::debug!("resolved via etherscan");
        Ok(Some(ResolvedContract {
            name: None,
            abi: Some(response.result),
            verified: true,
        }))
    }

    /// Resolves a 4-byte selector through the public signature directory.
    ///
    /// # Errors
    /// Returns error only on transport failures; an unknown selector is
    /// `None`.
    pub async fn fetch_signature(&self, selector: [u8; 4]) -> Result<Option<String>> {
        let key = format!("0x{}", alloy::primitives::hex::encode(selector));
        let url = format!("{OPENCHAIN_LOOKUP_URL}?function={key}&filter=true");
        let response: OpenchainResponse = self
            .http
            .get(&url)
            .send()
            .await
            .wrap_err("signature directory request failed")?
            .json()
            .await
            .wrap_err("signature directory response was not JSON")?;

        let name = response
            .result
            .function
            .get(&key)
            .and_then(|entries| entries.as_ref())
            .and_then(|entries| entries.first())
            .map(|entry| entry.name.clone());
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn openchain_response_shape_parses() {
        let raw = r#"{
            "ok": true,
            "result": {
                "function": {
                    "0xa9059cbb": [{"name": "transfer(address,uint256)", "filtered": false}]
                }
            }
        }"#;
        let parsed: OpenchainResponse = serde_json::from_str(raw).unwrap();
        let entries = parsed.result.function["0xa9059cbb"].as_ref().unwrap();
        assert_eq!(entries[0].name, "transfer(address,uint256)");
    }

    #[test]
    fn etherscan_miss_shape_parses() {
        let raw = r#"{"status":"0","message":"NOTOK","result":"Contract source code not verified"}"#;
        let parsed: EtherscanResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.status, "0");
    }
}
