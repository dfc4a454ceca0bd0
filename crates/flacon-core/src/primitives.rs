//! Cryptographic primitives boundary.
//!
//! Curve math and hashing are delegated to the `bitcoin` crate's bundled
//! `secp256k1` and `hashes`. The assembler and signer only see the narrow
//! [`Primitives`] trait so the backend can be swapped in tests.

use bitcoin::hashes::{sha256d, Hash};
use bitcoin::secp256k1::{ecdsa, All, Message, PublicKey, Secp256k1, SecretKey};

pub trait Primitives: Send + Sync {
    /// Double SHA-256.
    fn hash256(&self, data: &[u8]) -> [u8; 32];

    /// ECDSA over a 32-byte digest.
    fn sign_ecdsa(&self, secret: &SecretKey, digest: &[u8; 32]) -> ecdsa::Signature;

    fn verify_ecdsa(
        &self,
        public_key: &PublicKey,
        digest: &[u8; 32],
        sig: &ecdsa::Signature,
    ) -> bool;
}

/// Default backend: libsecp256k1 with RFC6979 deterministic nonces.
pub struct Secp256k1Primitives {
    secp: Secp256k1<All>,
}

impl Secp256k1Primitives {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::new(),
        }
    }
}

impl Default for Secp256k1Primitives {
    fn default() -> Self {
        Self::new()
    }
}

impl Primitives for Secp256k1Primitives {
    fn hash256(&self, data: &[u8]) -> [u8; 32] {
        sha256d::Hash::hash(data).to_byte_array()
    }

    fn sign_ecdsa(&self, secret: &SecretKey, digest: &[u8; 32]) -> ecdsa::Signature {
        self.secp.sign_ecdsa(&Message::from_digest(*digest), secret)
    }

    fn verify_ecdsa(
        &self,
        public_key: &PublicKey,
        digest: &[u8; 32],
        sig: &ecdsa::Signature,
    ) -> bool {
        self.secp
            .verify_ecdsa(&Message::from_digest(*digest), sig, public_key)
            .is_ok()
    }
}
