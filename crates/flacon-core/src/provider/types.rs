//! Provider response types, shaped after the mempool.space REST API.

use bitcoin::{BlockHash, Txid};
use serde::{Deserialize, Serialize};

// ==============================================================================
// UTXOs
// ==============================================================================

/// One entry of `GET /address/{address}/utxo`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddressUtxo {
    pub txid: Txid,
    pub vout: u32,
    /// Value in satoshis.
    pub value: u64,
    pub status: UtxoStatus,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UtxoStatus {
    pub confirmed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_hash: Option<BlockHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_time: Option<u64>,
}

// ==============================================================================
// Fees
// ==============================================================================

/// `GET /v1/fees/recommended`, in sat/vB.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecommendedFees {
    pub fastest_fee: f64,
    pub half_hour_fee: f64,
    pub hour_fee: f64,
    pub economy_fee: f64,
    pub minimum_fee: f64,
}
