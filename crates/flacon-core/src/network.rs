//! Network selection and address derivation.
//!
//! Only mainnet and testnet are supported. Every request picks one
//! [`NetworkParams`] up front and all address parsing and derivation is
//! checked against it.

use std::fmt;
use std::str::FromStr;

use bitcoin::address::NetworkUnchecked;
use bitcoin::{Address, CompressedPublicKey, Network, NetworkKind};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ==============================================================================
// Network Parameters
// ==============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkParams {
    Main,
    #[default]
    Test,
}

impl NetworkParams {
    /// Parse the network names accepted on the HTTP surface. `None` selects
    /// testnet.
    pub fn from_request(name: Option<&str>) -> Result<Self, CoreError> {
        match name {
            None => Ok(Self::Test),
            Some(name) => name.parse(),
        }
    }

    pub fn network(self) -> Network {
        match self {
            Self::Main => Network::Bitcoin,
            Self::Test => Network::Testnet,
        }
    }

    pub fn kind(self) -> NetworkKind {
        self.network().into()
    }

    /// Network magic bytes as they appear on the P2P wire.
    pub fn magic(self) -> [u8; 4] {
        self.network().magic().to_bytes()
    }

    /// Bech32 human-readable prefix for witness-program addresses.
    pub fn hrp(self) -> &'static str {
        match self {
            Self::Main => "bc",
            Self::Test => "tb",
        }
    }

    pub fn wif_version(self) -> u8 {
        match self {
            Self::Main => 0x80,
            Self::Test => 0xef,
        }
    }

    pub fn p2pkh_prefix(self) -> u8 {
        match self {
            Self::Main => 0x00,
            Self::Test => 0x6f,
        }
    }

    pub fn p2sh_prefix(self) -> u8 {
        match self {
            Self::Main => 0x05,
            Self::Test => 0xc4,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Test => "test",
        }
    }
}

impl FromStr for NetworkParams {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "main" | "mainnet" => Ok(Self::Main),
            "test" | "testnet" => Ok(Self::Test),
            other => Err(CoreError::InvalidInput(format!(
                "unsupported network `{other}`; expected main or test"
            ))),
        }
    }
}

impl fmt::Display for NetworkParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ==============================================================================
// Addresses
// ==============================================================================

/// Derive the P2WPKH (witness v0) address for a serialized compressed
/// public key.
pub fn derive_address(public_key: &[u8], params: NetworkParams) -> Result<Address, CoreError> {
    let key = CompressedPublicKey::from_slice(public_key)
        .map_err(|e| CoreError::InvalidPublicKey(e.to_string()))?;
    Ok(p2wpkh_address(&key, params))
}

pub fn p2wpkh_address(key: &CompressedPublicKey, params: NetworkParams) -> Address {
    Address::p2wpkh(key, params.network())
}

/// Parse a destination address and require it to belong to `params`.
pub fn parse_address(address: &str, params: NetworkParams) -> Result<Address, CoreError> {
    let unchecked: Address<NetworkUnchecked> = address
        .trim()
        .parse()
        .map_err(|e| CoreError::InvalidInput(format!("invalid address `{address}`: {e}")))?;
    unchecked.require_network(params.network()).map_err(|_| {
        CoreError::InvalidInput(format!("address `{address}` is not valid on {params}net"))
    })
}
