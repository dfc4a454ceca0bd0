//! The double-spend request as received from the HTTP boundary, and its
//! validation into core types.
//!
//! Validation is all-or-nothing: a request either becomes a
//! [`ValidatedRequest`] or fails with `InvalidInput` before any transaction
//! is built. Field aliases accept the names used by earlier clients
//! (`wif`, `net`, `feeRate`, `enableRBF`), and the two destinations may be
//! sent either as `outputs` or as `outputAddress1`/`outputAddress2`.

use std::time::Duration;

use bitcoin::{Amount, ScriptBuf, Txid};
use serde::Deserialize;

use crate::error::CoreError;
use crate::key::KeyMaterial;
use crate::network::{parse_address, NetworkParams};
use crate::pair::{OutputRequest, PairRequest};
use crate::sequencer::{BroadcastMode, BroadcastPolicy};
use crate::types::Utxo;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DoubleSpendRequest {
    #[serde(default, alias = "net")]
    pub network: Option<String>,
    #[serde(alias = "wif")]
    pub secret: String,
    pub utxo: UtxoEntry,
    #[serde(default)]
    pub outputs: Vec<OutputEntry>,
    #[serde(default)]
    pub output_address1: Option<String>,
    #[serde(default)]
    pub output_address2: Option<String>,
    #[serde(rename = "feeRatePerVByte", alias = "feeRate")]
    pub fee_rate_per_vbyte: f64,
    #[serde(default, alias = "enableRBF")]
    pub enable_replace_signal: bool,
    #[serde(default)]
    pub broadcast: bool,
    #[serde(default)]
    pub broadcast_delay_ms: Option<u32>,
    #[serde(default)]
    pub broadcast_mode: BroadcastMode,
    #[serde(default = "default_true")]
    pub continue_on_first_reject: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UtxoEntry {
    pub txid: String,
    pub vout: u32,
    pub value: u64,
    #[serde(default)]
    pub script_pub_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OutputEntry {
    pub address: String,
    #[serde(default)]
    pub value: Option<u64>,
}

/// Longest accepted pause between the two submissions of a sequential
/// broadcast.
pub const MAX_BROADCAST_DELAY_MS: u32 = 60_000;

fn default_true() -> bool {
    true
}

/// A request ready for the pair builder. `broadcast` is `None` when the
/// caller only wants the signed transactions.
#[derive(Debug)]
pub struct ValidatedRequest {
    pub network: NetworkParams,
    pub pair: PairRequest,
    pub broadcast: Option<BroadcastPolicy>,
}

impl DoubleSpendRequest {
    pub fn validate(self) -> Result<ValidatedRequest, CoreError> {
        let network = NetworkParams::from_request(self.network.as_deref())?;

        let outputs = match (self.output_address1, self.output_address2) {
            (None, None) => self.outputs,
            (Some(first), Some(second)) if self.outputs.is_empty() => vec![
                OutputEntry {
                    address: first,
                    value: None,
                },
                OutputEntry {
                    address: second,
                    value: None,
                },
            ],
            (Some(_), Some(_)) => {
                return Err(CoreError::InvalidInput(
                    "give either outputs or outputAddress1/outputAddress2, not both".to_owned(),
                ))
            }
            _ => {
                return Err(CoreError::InvalidInput(
                    "outputAddress1 and outputAddress2 must be given together".to_owned(),
                ))
            }
        };
        let [first, second]: [OutputEntry; 2] = outputs.try_into().map_err(|v: Vec<_>| {
            CoreError::InvalidInput(format!("exactly two outputs are required, got {}", v.len()))
        })?;
        let outputs = [
            validate_output(first, network)?,
            validate_output(second, network)?,
        ];

        let txid: Txid = self
            .utxo
            .txid
            .trim()
            .parse()
            .map_err(|e| CoreError::InvalidInput(format!("invalid utxo txid: {e}")))?;
        let script_pubkey = self
            .utxo
            .script_pub_key
            .as_deref()
            .map(|hex| {
                ScriptBuf::from_hex(hex.trim())
                    .map_err(|e| CoreError::InvalidInput(format!("invalid utxo scriptPubKey: {e}")))
            })
            .transpose()?;
        let utxo = Utxo::new(
            txid,
            self.utxo.vout,
            Amount::from_sat(self.utxo.value),
            script_pubkey,
        )?;

        if let Some(ms) = self.broadcast_delay_ms.filter(|ms| *ms > MAX_BROADCAST_DELAY_MS) {
            return Err(CoreError::InvalidInput(format!(
                "broadcastDelayMs must be at most {MAX_BROADCAST_DELAY_MS}, got {ms}"
            )));
        }

        let key = KeyMaterial::from_wif(&self.secret, network)?;

        let broadcast = self.broadcast.then(|| BroadcastPolicy {
            mode: self.broadcast_mode,
            continue_on_first_reject: self.continue_on_first_reject,
            delay: self
                .broadcast_delay_ms
                .map(|ms| Duration::from_millis(u64::from(ms))),
            submit_timeout: None,
        });

        Ok(ValidatedRequest {
            network,
            pair: PairRequest {
                key,
                utxo,
                outputs,
                fee_rate_sat_vb: self.fee_rate_per_vbyte,
                replace_signal: self.enable_replace_signal,
            },
            broadcast,
        })
    }
}

fn validate_output(entry: OutputEntry, network: NetworkParams) -> Result<OutputRequest, CoreError> {
    Ok(OutputRequest {
        address: parse_address(&entry.address, network)?,
        value: entry.value.map(Amount::from_sat),
    })
}
