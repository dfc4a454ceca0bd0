//! Shared test helpers for `flacon-core` unit tests.
//!
//! Deterministic keys, txids and UTXOs so tests across modules build their
//! fixtures the same way.

use bitcoin::hashes::Hash;
use bitcoin::secp256k1::SecretKey;
use bitcoin::{Amount, Txid};

use crate::key::KeyMaterial;
use crate::network::NetworkParams;
use crate::types::{OutputSpec, Utxo};

// ==============================================================================
// Txid Helpers
// ==============================================================================

/// Create a deterministic `Txid` from a single distinguishing byte.
pub fn txid_from_byte(b: u8) -> Txid {
    let mut bytes = [0u8; 32];
    bytes[0] = b;
    Txid::from_byte_array(bytes)
}

// ==============================================================================
// Keys and Coins
// ==============================================================================

/// Testnet key whose secret scalar is `seed` repeated. Seeds in `1..=254`
/// give distinct valid scalars.
pub fn test_key(seed: u8) -> KeyMaterial {
    let secret = SecretKey::from_slice(&[seed.max(1); 32]).expect("scalar is in range");
    KeyMaterial::from_secret(secret, NetworkParams::Test)
}

/// A UTXO locked to `key`'s P2WPKH script.
pub fn p2wpkh_utxo(key: &KeyMaterial, txid: Txid, vout: u32, sats: u64) -> Utxo {
    Utxo::new(txid, vout, Amount::from_sat(sats), Some(key.script_pubkey()))
        .expect("fixture value is positive")
}

/// An output paying `sats` to `key`'s address.
pub fn output_to(key: &KeyMaterial, sats: u64) -> OutputSpec {
    OutputSpec {
        address: key.address(),
        value: Amount::from_sat(sats),
    }
}
