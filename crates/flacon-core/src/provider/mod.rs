//! Chain-data and transaction-submission collaborators.
//!
//! Defines the [`ChainData`] and [`TxSubmitter`] traits and a mempool.space
//! compatible REST implementation ([`MempoolClient`]). Nothing here retries;
//! retry policy belongs to callers.

mod mempool;
pub mod types;

pub use mempool::{MempoolClient, DEFAULT_MAINNET_URL, DEFAULT_TESTNET_URL};
pub use types::{AddressUtxo, RecommendedFees, UtxoStatus};

use async_trait::async_trait;
use bitcoin::{Address, Txid};

use crate::error::ProviderError;
use crate::network::NetworkParams;

/// UTXO discovery and fee quotation.
#[async_trait]
pub trait ChainData: Send + Sync {
    /// Unspent outputs currently paying `address`.
    async fn get_utxos(
        &self,
        address: &Address,
        network: NetworkParams,
    ) -> Result<Vec<AddressUtxo>, ProviderError>;

    /// Fee-rate recommendations in sat/vB.
    async fn get_recommended_fees(
        &self,
        network: NetworkParams,
    ) -> Result<RecommendedFees, ProviderError>;
}

/// Raw transaction submission.
#[async_trait]
pub trait TxSubmitter: Send + Sync {
    /// Submit a hex-encoded transaction and return the txid reported by the
    /// endpoint. Rejections carry the endpoint's message verbatim.
    async fn submit_raw(&self, hex: &str, network: NetworkParams) -> Result<Txid, ProviderError>;
}
