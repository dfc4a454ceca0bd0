//! P2WPKH input signing.

use bitcoin::ecdsa;
use bitcoin::secp256k1::ecdsa::Signature;
use bitcoin::sighash::EcdsaSighashType;
use bitcoin::{ScriptBuf, Witness};
use tracing::debug;

use crate::assembler::{compute_sighash, UnsignedTxSkeleton};
use crate::error::CoreError;
use crate::key::KeyMaterial;
use crate::primitives::Primitives;

/// Half of the secp256k1 group order, big-endian.
const HALF_CURVE_ORDER: [u8; 32] = [
    0x7f, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff, 0xff,
    0x5d, 0x57, 0x6e, 0x73, 0x57, 0xa4, 0x50, 0x1d, 0xdf, 0xe9, 0x2f, 0x46, 0x68, 0x1b, 0x20, 0xa0,
];

/// Whether the signature's S component is at most n/2.
pub fn is_low_s(sig: &Signature) -> bool {
    let compact = sig.serialize_compact();
    compact[32..] <= HALF_CURVE_ORDER[..]
}

/// Locking script of the input, defaulting to the key's own P2WPKH script.
pub fn input_script_pubkey(
    skeleton: &UnsignedTxSkeleton,
    key: &KeyMaterial,
    input_index: usize,
) -> Result<ScriptBuf, CoreError> {
    let input = skeleton.inputs.get(input_index).ok_or_else(|| {
        CoreError::InvalidInput(format!("input index {input_index} out of range"))
    })?;
    Ok(input
        .utxo
        .script_pubkey
        .clone()
        .unwrap_or_else(|| key.script_pubkey()))
}

/// Sign `sighash` for `input_index` and return the witness stack
/// `[DER signature || 0x01, compressed pubkey]`.
///
/// The key must own the input: its P2WPKH script has to equal the UTXO's
/// locking script.
pub fn sign<P: Primitives + ?Sized>(
    primitives: &P,
    skeleton: &UnsignedTxSkeleton,
    key: &KeyMaterial,
    input_index: usize,
    sighash: &[u8; 32],
) -> Result<Witness, CoreError> {
    let locking_script = input_script_pubkey(skeleton, key, input_index)?;
    if locking_script != key.script_pubkey() {
        return Err(CoreError::SigningKeyMismatch { input_index });
    }

    let mut signature = primitives.sign_ecdsa(key.secret(), sighash);
    signature.normalize_s();
    if !is_low_s(&signature) {
        return Err(CoreError::SigningBackend(format!(
            "high-S signature for input {input_index} after normalization"
        )));
    }
    if !primitives.verify_ecdsa(&key.public_key().0, sighash, &signature) {
        return Err(CoreError::SigningBackend(format!(
            "signature for input {input_index} does not verify"
        )));
    }

    let signature = ecdsa::Signature {
        signature,
        sighash_type: EcdsaSighashType::All,
    };
    debug!(input_index, sig_len = signature.to_vec().len(), "signed input");

    Ok(Witness::from_slice(&[
        signature.to_vec(),
        key.public_key().to_bytes().to_vec(),
    ]))
}

/// Compute the sighash for a P2WPKH input and sign it in one step.
pub fn sign_input<P: Primitives + ?Sized>(
    primitives: &P,
    skeleton: &UnsignedTxSkeleton,
    key: &KeyMaterial,
    input_index: usize,
) -> Result<Witness, CoreError> {
    let locking_script = input_script_pubkey(skeleton, key, input_index)?;
    let script_code = locking_script
        .p2wpkh_script_code()
        .ok_or(CoreError::SigningKeyMismatch { input_index })?;
    let value = skeleton.inputs[input_index].utxo.value;
    let sighash = compute_sighash(primitives, skeleton, input_index, &script_code, value)?;
    sign(primitives, skeleton, key, input_index, &sighash)
}

#[cfg(test)]
mod tests {
    use bitcoin::absolute::LockTime;
    use bitcoin::secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
    use bitcoin::Amount;

    use super::*;
    use crate::assembler::{build_skeleton, input_sequence};
    use crate::key::KeyMaterial;
    use crate::network::NetworkParams;
    use crate::primitives::Secp256k1Primitives;
    use crate::test_util::*;

    fn skeleton_for(key: &KeyMaterial, out_sats: u64) -> UnsignedTxSkeleton {
        let utxo = p2wpkh_utxo(key, txid_from_byte(4), 0, 100_000);
        build_skeleton(
            &utxo,
            &output_to(&test_key(200), out_sats),
            input_sequence(false),
            LockTime::ZERO,
        )
    }

    fn sighash_of(p: &Secp256k1Primitives, skeleton: &UnsignedTxSkeleton) -> [u8; 32] {
        let spk = skeleton.inputs[0].utxo.script_pubkey.clone().unwrap();
        compute_sighash(
            p,
            skeleton,
            0,
            &spk.p2wpkh_script_code().unwrap(),
            skeleton.inputs[0].utxo.value,
        )
        .unwrap()
    }

    #[test]
    fn witness_has_signature_and_pubkey() {
        let p = Secp256k1Primitives::new();
        let key = test_key(1);
        let skeleton = skeleton_for(&key, 99_250);
        let witness = sign_input(&p, &skeleton, &key, 0).expect("sign");

        assert_eq!(witness.len(), 2);
        let sig_bytes = witness.nth(0).expect("signature element");
        assert_eq!(*sig_bytes.last().unwrap(), 0x01, "SIGHASH_ALL byte");
        assert_eq!(sig_bytes[0], 0x30, "DER sequence tag");
        assert_eq!(witness.nth(1).unwrap(), &key.public_key().to_bytes()[..]);
    }

    #[test]
    fn signature_verifies_only_against_its_own_sighash() {
        let p = Secp256k1Primitives::new();
        let secp = Secp256k1::verification_only();
        let key = test_key(2);
        let skeleton = skeleton_for(&key, 99_250);
        let other = skeleton_for(&key, 98_250);
        let sighash = sighash_of(&p, &skeleton);
        let other_sighash = sighash_of(&p, &other);

        let witness = sign(&p, &skeleton, &key, 0, &sighash).expect("sign");
        let parsed = ecdsa::Signature::from_slice(witness.nth(0).unwrap()).expect("parse sig");

        secp.verify_ecdsa(
            &Message::from_digest(sighash),
            &parsed.signature,
            &key.public_key().0,
        )
        .expect("signature must verify");
        assert!(secp
            .verify_ecdsa(
                &Message::from_digest(other_sighash),
                &parsed.signature,
                &key.public_key().0,
            )
            .is_err());
        assert!(p.verify_ecdsa(&key.public_key().0, &sighash, &parsed.signature));
    }

    #[test]
    fn randomized_signatures_are_all_low_s() {
        let p = Secp256k1Primitives::new();
        for trial in 0..1000u32 {
            let key = KeyMaterial::generate(NetworkParams::Test);
            let skeleton = skeleton_for(&key, 50_000 + u64::from(trial));
            let witness = sign_input(&p, &skeleton, &key, 0).expect("sign");
            let parsed = ecdsa::Signature::from_slice(witness.nth(0).unwrap()).unwrap();
            assert!(is_low_s(&parsed.signature), "trial {trial} produced high S");
        }
    }

    #[test]
    fn high_s_is_detected() {
        // A backend that negates S must be caught by `is_low_s` before
        // normalisation.
        let p = Secp256k1Primitives::new();
        let key = test_key(3);
        let sig = p.sign_ecdsa(key.secret(), &[7u8; 32]);
        let mut compact = sig.serialize_compact();
        // s' = n - s
        let order = bitcoin::secp256k1::constants::CURVE_ORDER;
        let mut borrow = 0i16;
        for i in (0..32).rev() {
            let diff = i16::from(order[i]) - i16::from(compact[32 + i]) - borrow;
            compact[32 + i] = diff.rem_euclid(256) as u8;
            borrow = i16::from(diff < 0);
        }
        let mut high = Signature::from_compact(&compact).expect("valid compact signature");
        assert!(!is_low_s(&high));
        high.normalize_s();
        assert!(is_low_s(&high));
        assert_eq!(high, sig);
    }

    /// Signs a digest other than the one it is handed.
    struct WrongDigestPrimitives(Secp256k1Primitives);

    impl Primitives for WrongDigestPrimitives {
        fn hash256(&self, data: &[u8]) -> [u8; 32] {
            self.0.hash256(data)
        }

        fn sign_ecdsa(&self, secret: &SecretKey, digest: &[u8; 32]) -> Signature {
            let mut other = *digest;
            other[0] ^= 0xff;
            self.0.sign_ecdsa(secret, &other)
        }

        fn verify_ecdsa(&self, public_key: &PublicKey, digest: &[u8; 32], sig: &Signature) -> bool {
            self.0.verify_ecdsa(public_key, digest, sig)
        }
    }

    #[test]
    fn faulty_backend_is_not_blamed_on_the_caller() {
        let p = WrongDigestPrimitives(Secp256k1Primitives::new());
        let key = test_key(4);
        let skeleton = skeleton_for(&key, 99_000);

        let err = sign_input(&p, &skeleton, &key, 0).expect_err("signature must not verify");
        assert!(matches!(err, CoreError::SigningBackend(_)));
        assert!(err.to_string().contains("does not verify"));
    }

    #[test]
    fn foreign_key_is_a_mismatch() {
        let p = Secp256k1Primitives::new();
        let owner = test_key(5);
        let intruder = test_key(6);
        let skeleton = skeleton_for(&owner, 90_000);

        let err = sign_input(&p, &skeleton, &intruder, 0).expect_err("wrong key");
        assert!(matches!(err, CoreError::SigningKeyMismatch { input_index: 0 }));
    }

    #[test]
    fn missing_script_defaults_to_key_script() {
        let p = Secp256k1Primitives::new();
        let key = test_key(9);
        let mut skeleton = skeleton_for(&key, 90_000);
        skeleton.inputs[0].utxo.script_pubkey = None;
        skeleton.inputs[0].utxo.value = Amount::from_sat(100_000);

        let witness = sign_input(&p, &skeleton, &key, 0).expect("sign with derived script");
        assert_eq!(witness.len(), 2);
    }
}
