//! Signing key material.
//!
//! A [`KeyMaterial`] lives for a single request. It is built from a WIF
//! secret or generated fresh, borrowed by the signer, and its scalar is
//! erased when dropped.

use bitcoin::secp256k1::{Secp256k1, SecretKey};
use bitcoin::{Address, CompressedPublicKey, PrivateKey, ScriptBuf};
use rand::Rng;

use crate::error::CoreError;
use crate::network::{p2wpkh_address, NetworkParams};

pub struct KeyMaterial {
    secret: SecretKey,
    public_key: CompressedPublicKey,
    network: NetworkParams,
}

impl KeyMaterial {
    /// Decode a WIF secret. The WIF network byte must match `network` and the
    /// key must be flagged compressed, since only P2WPKH is spendable here.
    pub fn from_wif(wif: &str, network: NetworkParams) -> Result<Self, CoreError> {
        let private_key = PrivateKey::from_wif(wif.trim())
            .map_err(|e| CoreError::InvalidInput(format!("invalid secret: {e}")))?;
        if private_key.network != network.kind() {
            return Err(CoreError::InvalidInput(format!(
                "secret is not encoded for {network}net"
            )));
        }
        if !private_key.compressed {
            return Err(CoreError::InvalidPublicKey(
                "secret encodes an uncompressed public key".to_owned(),
            ));
        }
        Ok(Self::from_secret(private_key.inner, network))
    }

    pub fn from_secret(secret: SecretKey, network: NetworkParams) -> Self {
        let secp = Secp256k1::signing_only();
        let public_key = CompressedPublicKey(secret.public_key(&secp));
        Self {
            secret,
            public_key,
            network,
        }
    }

    /// Generate a fresh key from the thread-local CSPRNG.
    pub fn generate(network: NetworkParams) -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let bytes: [u8; 32] = rng.r#gen();
            // Out-of-range scalars (zero or >= n) are astronomically rare.
            if let Ok(secret) = SecretKey::from_slice(&bytes) {
                return Self::from_secret(secret, network);
            }
        }
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret
    }

    pub fn public_key(&self) -> &CompressedPublicKey {
        &self.public_key
    }

    pub fn network(&self) -> NetworkParams {
        self.network
    }

    pub fn address(&self) -> Address {
        p2wpkh_address(&self.public_key, self.network)
    }

    /// The P2WPKH locking script this key can satisfy.
    pub fn script_pubkey(&self) -> ScriptBuf {
        ScriptBuf::new_p2wpkh(&self.public_key.wpubkey_hash())
    }

    pub fn to_wif(&self) -> String {
        PrivateKey::new(self.secret, self.network.kind()).to_wif()
    }
}

impl Drop for KeyMaterial {
    fn drop(&mut self) {
        self.secret.non_secure_erase();
    }
}

impl std::fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyMaterial")
            .field("public_key", &self.public_key)
            .field("network", &self.network)
            .finish_non_exhaustive()
    }
}
