//! Domain value objects shared by the builder, signer and sequencer.

use bitcoin::hex::DisplayHex;
use bitcoin::{Address, Amount, OutPoint, ScriptBuf, TxOut, Txid};
use serde::Serialize;

use crate::error::CoreError;

// ==============================================================================
// Inputs
// ==============================================================================

/// The single output both transactions of a pair spend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Utxo {
    pub outpoint: OutPoint,
    pub value: Amount,
    /// Locking script of the spent output. `None` means "the P2WPKH script of
    /// the signing key", which is how the lab wallet funds itself.
    pub script_pubkey: Option<ScriptBuf>,
}

impl Utxo {
    pub fn new(
        txid: Txid,
        vout: u32,
        value: Amount,
        script_pubkey: Option<ScriptBuf>,
    ) -> Result<Self, CoreError> {
        if value == Amount::ZERO {
            return Err(CoreError::InvalidInput(
                "utxo value must be greater than zero".to_owned(),
            ));
        }
        Ok(Self {
            outpoint: OutPoint::new(txid, vout),
            value,
            script_pubkey,
        })
    }
}

// ==============================================================================
// Outputs
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputSpec {
    pub address: Address,
    pub value: Amount,
}

impl OutputSpec {
    pub fn to_tx_out(&self) -> TxOut {
        TxOut {
            value: self.value,
            script_pubkey: self.address.script_pubkey(),
        }
    }
}

// ==============================================================================
// Signed Transactions
// ==============================================================================

/// A finalized transaction: wire bytes plus the identifier derived from the
/// witness-stripped serialization. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTx {
    raw: Vec<u8>,
    txid: Txid,
    weight: u64,
}

impl SignedTx {
    pub(crate) fn new(raw: Vec<u8>, txid: Txid, weight: u64) -> Self {
        Self { raw, txid, weight }
    }

    pub fn raw(&self) -> &[u8] {
        &self.raw
    }

    pub fn hex(&self) -> String {
        self.raw.to_lower_hex_string()
    }

    pub fn txid(&self) -> Txid {
        self.txid
    }

    pub fn weight(&self) -> u64 {
        self.weight
    }

    pub fn vsize(&self) -> u64 {
        self.weight.div_ceil(4)
    }
}

/// Wire form of a signed transaction as returned to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TxPayload {
    pub hex: String,
    pub txid: Txid,
}

impl From<&SignedTx> for TxPayload {
    fn from(tx: &SignedTx) -> Self {
        Self {
            hex: tx.hex(),
            txid: tx.txid(),
        }
    }
}
