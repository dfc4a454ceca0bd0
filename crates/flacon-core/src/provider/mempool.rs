//! REST client for mempool.space compatible (Esplora-style) endpoints.
//!
//! One base URL per network. Requests share a pooled `reqwest` client and an
//! optional `governor` rate limiter; each outbound HTTP request consumes one
//! permit.

use std::num::NonZeroU32;
use std::time::Duration;

use async_trait::async_trait;
use bitcoin::{Address, Txid};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use reqwest::{header, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, trace};

use crate::error::ProviderError;
use crate::network::NetworkParams;

use super::types::{AddressUtxo, RecommendedFees};
use super::{ChainData, TxSubmitter};

pub const DEFAULT_MAINNET_URL: &str = "https://mempool.space/api";
pub const DEFAULT_TESTNET_URL: &str = "https://mempool.space/testnet/api";

type DirectRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

pub struct MempoolClient {
    client: reqwest::Client,
    mainnet_url: String,
    testnet_url: String,
    limiter: Option<DirectRateLimiter>,
}

impl MempoolClient {
    /// Create a client for the given base URLs (for example
    /// `https://mempool.space/api`). Trailing slashes are ignored.
    ///
    /// If `requests_per_second` is set, outbound requests are throttled
    /// across both networks.
    pub fn new(
        mainnet_url: &str,
        testnet_url: &str,
        requests_per_second: Option<u32>,
    ) -> Result<Self, ProviderError> {
        let mainnet_url = parse_base_url(mainnet_url)?;
        let testnet_url = parse_base_url(testnet_url)?;

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(8)
            .build()
            .map_err(ProviderError::Transport)?;

        let limiter = match requests_per_second {
            None => None,
            Some(limit) => {
                let limit = NonZeroU32::new(limit).ok_or_else(|| {
                    ProviderError::Config("requests_per_second must be at least 1".to_owned())
                })?;
                Some(RateLimiter::direct(Quota::per_second(limit)))
            }
        };

        Ok(Self {
            client,
            mainnet_url,
            testnet_url,
            limiter,
        })
    }

    pub fn with_defaults() -> Result<Self, ProviderError> {
        Self::new(DEFAULT_MAINNET_URL, DEFAULT_TESTNET_URL, None)
    }

    pub fn base_url(&self, network: NetworkParams) -> &str {
        match network {
            NetworkParams::Main => &self.mainnet_url,
            NetworkParams::Test => &self.testnet_url,
        }
    }

    async fn wait_for_rate_limit(&self) {
        if let Some(limiter) = &self.limiter {
            limiter.until_ready().await;
        }
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ProviderError> {
        self.wait_for_rate_limit().await;
        debug!(http.method = "GET", http.url = url, "provider request");

        let response = self.client.get(url).send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(http.url = url, %status, body_len = body.len(), "provider response");
        trace!(http.url = url, body = %body, "provider response body");

        if !status.is_success() {
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        serde_json::from_str(&body)
            .map_err(|e| ProviderError::InvalidResponse(format!("decode {url}: {e}; body={body}")))
    }
}

#[async_trait]
impl ChainData for MempoolClient {
    async fn get_utxos(
        &self,
        address: &Address,
        network: NetworkParams,
    ) -> Result<Vec<AddressUtxo>, ProviderError> {
        let url = format!("{}/address/{address}/utxo", self.base_url(network));
        self.get_json(&url).await
    }

    async fn get_recommended_fees(
        &self,
        network: NetworkParams,
    ) -> Result<RecommendedFees, ProviderError> {
        let url = format!("{}/v1/fees/recommended", self.base_url(network));
        self.get_json(&url).await
    }
}

#[async_trait]
impl TxSubmitter for MempoolClient {
    async fn submit_raw(&self, hex: &str, network: NetworkParams) -> Result<Txid, ProviderError> {
        self.wait_for_rate_limit().await;
        let url = format!("{}/tx", self.base_url(network));
        debug!(
            http.method = "POST",
            http.url = %url,
            tx_len = hex.len() / 2,
            "submitting transaction"
        );

        let response = self
            .client
            .post(&url)
            .header(header::CONTENT_TYPE, "text/plain")
            .body(hex.to_owned())
            .send()
            .await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(http.url = %url, %status, "submission response");

        if !status.is_success() {
            return Err(ProviderError::Rejected {
                status: status.as_u16(),
                body,
            });
        }
        parse_submitted_txid(&body)
    }
}

/// The submission endpoint answers with the bare txid as plain text.
fn parse_submitted_txid(body: &str) -> Result<Txid, ProviderError> {
    body.trim()
        .parse()
        .map_err(|e| ProviderError::InvalidResponse(format!("invalid txid `{body}`: {e}")))
}

fn parse_base_url(base: &str) -> Result<String, ProviderError> {
    let parsed = Url::parse(base).map_err(|e| {
        ProviderError::Config(format!("invalid base url `{base}`: expected HTTP(S) URL ({e})"))
    })?;
    match parsed.scheme() {
        "http" | "https" => Ok(base.trim_end_matches('/').to_owned()),
        other => Err(ProviderError::Config(format!(
            "unsupported base url scheme `{other}`; expected http or https"
        ))),
    }
}
