//! JSON-RPC connectivity probe for ERC-4337 bundler endpoints.

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use secrecy::{ExposeSecret, SecretString};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::domain::{AppError, Network, ProbeError};

/// Per-network bundler URLs plus the optional shared API key
#[derive(Debug, Clone, Default)]
pub struct BundlerEndpoints {
    pub urls: BTreeMap<String, (Network, String)>,
    pub api_key: Option<SecretString>,
}

impl BundlerEndpoints {
    /// Read `BUNDLER_URL_<NETWORK>` for every known network and `BUNDLER_API_KEY`
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let urls = Network::ALL
            .into_iter()
            .filter_map(|network| {
                let name = format!("BUNDLER_URL_{}", network.as_str().to_ascii_uppercase());
                lookup(&name)
                    .map(|url| url.trim().to_string())
                    .filter(|url| !url.is_empty())
                    .map(|url| (network.as_str().to_string(), (network, url)))
            })
            .collect();

        let api_key = lookup("BUNDLER_API_KEY")
            .filter(|key| !key.trim().is_empty())
            .map(SecretString::from);

        Self { urls, api_key }
    }

    /// Configured endpoints in a stable order
    pub fn iter(&self) -> impl Iterator<Item = (Network, &str)> {
        self.urls.values().map(|(network, url)| (*network, url.as_str()))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }
}

/// What a healthy endpoint reported
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ProbeReport {
    pub network: Network,
    pub chain_id: u64,
    pub entry_points: Vec<String>,
    pub latency_ms: u64,
}

#[derive(Debug, Serialize)]
struct JsonRpcRequest<T: Serialize> {
    jsonrpc: &'static str,
    id: u64,
    method: &'static str,
    params: T,
}

#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    code: i64,
    message: String,
}

/// Parse a `0x`-prefixed hex quantity
pub fn parse_hex_u64(raw: &str) -> Result<u64, ProbeError> {
    let digits = raw
        .strip_prefix("0x")
        .or_else(|| raw.strip_prefix("0X"))
        .ok_or_else(|| ProbeError::InvalidResponse(format!("not a hex quantity: {}", raw)))?;
    u64::from_str_radix(digits, 16)
        .map_err(|_| ProbeError::InvalidResponse(format!("not a hex quantity: {}", raw)))
}

/// Bundler probe over HTTP
pub struct BundlerProbe {
    http_client: reqwest::Client,
    api_key: Option<SecretString>,
}

impl BundlerProbe {
    pub fn new(timeout: Duration) -> Result<Self, AppError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ProbeError::Http(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http_client,
            api_key: None,
        })
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: Option<SecretString>) -> Self {
        self.api_key = api_key;
        self
    }

    /// Check that `url` answers JSON-RPC for `network` and lists entry points
    #[instrument(skip(self, url), fields(network = %network))]
    pub async fn probe(&self, network: Network, url: &str) -> Result<ProbeReport, AppError> {
        let started = Instant::now();

        let chain_id: String = self.call(url, "eth_chainId").await?;
        let chain_id = parse_hex_u64(&chain_id)?;
        if chain_id != network.chain_id() {
            warn!(expected = network.chain_id(), actual = chain_id, "Bundler serves another chain");
            return Err(ProbeError::ChainIdMismatch {
                expected: network.chain_id(),
                actual: chain_id,
            }
            .into());
        }

        let entry_points: Vec<String> = self.call(url, "eth_supportedEntryPoints").await?;
        if entry_points.is_empty() {
            return Err(
                ProbeError::InvalidResponse("bundler lists no entry points".to_string()).into(),
            );
        }

        let latency_ms = started.elapsed().as_millis() as u64;
        info!(chain_id, entry_points = entry_points.len(), latency_ms, "Bundler reachable");
        Ok(ProbeReport {
            network,
            chain_id,
            entry_points,
            latency_ms,
        })
    }

    async fn call<T: DeserializeOwned>(
        &self,
        url: &str,
        method: &'static str,
    ) -> Result<T, ProbeError> {
        let request = JsonRpcRequest {
            jsonrpc: "2.0",
            id: 1,
            method,
            params: Vec::<serde_json::Value>::new(),
        };

        let mut builder = self.http_client.post(url).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.query(&[("api-key", key.expose_secret())]);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| ProbeError::Http(format!("{} request failed: {}", method, e)))?;

        let status = response.status();
        if status.is_server_error() || status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(ProbeError::Http(format!("{} returned HTTP {}", method, status)));
        }
        if !status.is_success() {
            return Err(ProbeError::InvalidResponse(format!(
                "{} returned HTTP {}",
                method, status
            )));
        }

        let rpc_response: JsonRpcResponse<T> = response.json().await.map_err(|e| {
            ProbeError::InvalidResponse(format!("Failed to parse {} response: {}", method, e))
        })?;

        if let Some(error) = rpc_response.error {
            debug!(method, code = error.code, message = %error.message, "Bundler RPC error");
            return Err(ProbeError::Rpc {
                code: error.code,
                message: error.message,
            });
        }

        rpc_response
            .result
            .ok_or_else(|| ProbeError::InvalidResponse(format!("{} returned no result", method)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_parse_hex_u64() {
        assert_eq!(parse_hex_u64("0xa").unwrap(), 10);
        assert_eq!(parse_hex_u64("0x13881").unwrap(), 80001);
        assert!(parse_hex_u64("10").is_err());
        assert!(parse_hex_u64("0xzz").is_err());
    }

    #[test]
    fn test_endpoints_from_lookup() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("BUNDLER_URL_GOERLI", " https://bundler.example/goerli "),
            ("BUNDLER_URL_MUMBAI", ""),
            ("BUNDLER_API_KEY", "secret"),
        ]);
        let endpoints = BundlerEndpoints::from_lookup(|k| vars.get(k).map(|v| v.to_string()));

        let configured: Vec<_> = endpoints.iter().collect();
        assert_eq!(
            configured,
            vec![(Network::Goerli, "https://bundler.example/goerli")]
        );
        assert_eq!(
            endpoints.api_key.as_ref().map(|k| k.expose_secret().to_string()),
            Some("secret".to_string())
        );
    }

    #[test]
    fn test_endpoints_empty_without_urls() {
        let endpoints = BundlerEndpoints::from_lookup(|_| None);
        assert!(endpoints.is_empty());
        assert!(endpoints.api_key.is_none());
    }
}
