//! Transaction assembly: skeleton construction, the segwit v0 signature hash,
//! wire serialization and transaction identifiers.
//!
//! Field layout follows BIP143 and BIP144. Primitive encodings (little-endian
//! integers, compact-size lengths, outpoints, witness stacks) reuse the
//! `bitcoin` crate's consensus encoders; the ordering of fields is spelled
//! out here because it is what signatures commit to.

use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::VarInt;
use bitcoin::consensus::Encodable;
use bitcoin::hashes::Hash;
use bitcoin::sighash::EcdsaSighashType;
use bitcoin::transaction::Version;
use bitcoin::{Amount, Script, ScriptBuf, Sequence, Transaction, TxIn, TxOut, Txid, Witness};

use crate::error::CoreError;
use crate::primitives::Primitives;
use crate::types::{OutputSpec, SignedTx, Utxo};

pub const TX_VERSION: Version = Version::TWO;

const SEGWIT_MARKER: u8 = 0x00;
const SEGWIT_FLAG: u8 = 0x01;

// ==============================================================================
// Skeleton
// ==============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkeletonInput {
    pub utxo: Utxo,
    pub sequence: Sequence,
}

/// An unsigned transaction. Inputs carry the spent UTXO so the signer has the
/// value and locking script it commits to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnsignedTxSkeleton {
    pub version: Version,
    pub inputs: Vec<SkeletonInput>,
    pub outputs: Vec<TxOut>,
    pub lock_time: LockTime,
}

impl UnsignedTxSkeleton {
    /// Convert to the `bitcoin` crate's transaction type with the given
    /// per-input witnesses (missing witnesses are left empty).
    pub fn to_transaction(&self, witnesses: &[Witness]) -> Transaction {
        Transaction {
            version: self.version,
            lock_time: self.lock_time,
            input: self
                .inputs
                .iter()
                .enumerate()
                .map(|(i, input)| TxIn {
                    previous_output: input.utxo.outpoint,
                    script_sig: ScriptBuf::new(),
                    sequence: input.sequence,
                    witness: witnesses.get(i).cloned().unwrap_or_default(),
                })
                .collect(),
            output: self.outputs.clone(),
        }
    }

    /// Whether any input signals opt-in replace-by-fee (BIP125).
    pub fn signals_rbf(&self) -> bool {
        self.inputs.iter().any(|input| input.sequence.is_rbf())
    }
}

/// Build a one-input, one-output skeleton.
pub fn build_skeleton(
    utxo: &Utxo,
    output: &OutputSpec,
    sequence: Sequence,
    lock_time: LockTime,
) -> UnsignedTxSkeleton {
    UnsignedTxSkeleton {
        version: TX_VERSION,
        inputs: vec![SkeletonInput {
            utxo: utxo.clone(),
            sequence,
        }],
        outputs: vec![output.to_tx_out()],
        lock_time,
    }
}

/// Sequence number for the shared input: `0xFFFFFFFD` opts into RBF,
/// `0xFFFFFFFF` is final.
pub fn input_sequence(replace_signal: bool) -> Sequence {
    if replace_signal {
        Sequence::ENABLE_RBF_NO_LOCKTIME
    } else {
        Sequence::MAX
    }
}

// ==============================================================================
// Signature Hash (BIP143, SIGHASH_ALL)
// ==============================================================================

/// Compute the segwit v0 digest signed for `input_index`.
///
/// `script_code` is the script being satisfied; for P2WPKH that is the
/// P2PKH-form script of the key hash, not the witness program itself.
pub fn compute_sighash<P: Primitives + ?Sized>(
    primitives: &P,
    skeleton: &UnsignedTxSkeleton,
    input_index: usize,
    script_code: &Script,
    value: Amount,
) -> Result<[u8; 32], CoreError> {
    let input = skeleton.inputs.get(input_index).ok_or_else(|| {
        CoreError::InvalidInput(format!(
            "input index {input_index} out of range (tx has {} inputs)",
            skeleton.inputs.len()
        ))
    })?;

    let mut prevouts = Vec::with_capacity(36 * skeleton.inputs.len());
    let mut sequences = Vec::with_capacity(4 * skeleton.inputs.len());
    for txin in &skeleton.inputs {
        encode(&mut prevouts, &txin.utxo.outpoint);
        encode(&mut sequences, &txin.sequence);
    }
    let mut outputs = Vec::new();
    for txout in &skeleton.outputs {
        encode_output(&mut outputs, txout);
    }

    let mut preimage = Vec::with_capacity(156 + script_code.len());
    encode(&mut preimage, &skeleton.version.0);
    preimage.extend_from_slice(&primitives.hash256(&prevouts));
    preimage.extend_from_slice(&primitives.hash256(&sequences));
    encode(&mut preimage, &input.utxo.outpoint);
    encode_script(&mut preimage, script_code);
    encode(&mut preimage, &value.to_sat());
    encode(&mut preimage, &input.sequence);
    preimage.extend_from_slice(&primitives.hash256(&outputs));
    encode(&mut preimage, &skeleton.lock_time.to_consensus_u32());
    encode(&mut preimage, &EcdsaSighashType::All.to_u32());

    Ok(primitives.hash256(&preimage))
}

// ==============================================================================
// Serialization
// ==============================================================================

/// Serialize with witnesses. `witnesses` holds one stack per input; when every
/// stack is empty the legacy form (no marker/flag) is emitted.
pub fn serialize(
    skeleton: &UnsignedTxSkeleton,
    witnesses: &[Witness],
) -> Result<Vec<u8>, CoreError> {
    if witnesses.len() != skeleton.inputs.len() {
        return Err(CoreError::InvalidInput(format!(
            "expected {} witness stacks, got {}",
            skeleton.inputs.len(),
            witnesses.len()
        )));
    }
    let segwit = witnesses.iter().any(|w| !w.is_empty());
    Ok(write_tx(skeleton, segwit.then_some(witnesses)))
}

/// Serialize without marker, flag or witness data.
pub fn serialize_legacy(skeleton: &UnsignedTxSkeleton) -> Vec<u8> {
    write_tx(skeleton, None)
}

/// Transaction id: double hash of the witness-stripped serialization. The
/// `Txid` displays byte-reversed.
pub fn compute_txid<P: Primitives + ?Sized>(primitives: &P, skeleton: &UnsignedTxSkeleton) -> Txid {
    Txid::from_byte_array(primitives.hash256(&serialize_legacy(skeleton)))
}

/// Serialize a signed skeleton and compute its id.
pub fn finalize<P: Primitives + ?Sized>(
    primitives: &P,
    skeleton: &UnsignedTxSkeleton,
    witnesses: &[Witness],
) -> Result<SignedTx, CoreError> {
    let raw = serialize(skeleton, witnesses)?;
    let base_size = serialize_legacy(skeleton).len() as u64;
    let weight = base_size * 3 + raw.len() as u64;
    Ok(SignedTx::new(raw, compute_txid(primitives, skeleton), weight))
}

fn write_tx(skeleton: &UnsignedTxSkeleton, witnesses: Option<&[Witness]>) -> Vec<u8> {
    let mut buf = Vec::new();
    encode(&mut buf, &skeleton.version.0);
    if witnesses.is_some() {
        buf.push(SEGWIT_MARKER);
        buf.push(SEGWIT_FLAG);
    }

    encode(&mut buf, &VarInt(skeleton.inputs.len() as u64));
    for input in &skeleton.inputs {
        encode(&mut buf, &input.utxo.outpoint);
        // scriptSig is always empty for witness spends.
        encode(&mut buf, &VarInt(0));
        encode(&mut buf, &input.sequence);
    }

    encode(&mut buf, &VarInt(skeleton.outputs.len() as u64));
    for output in &skeleton.outputs {
        encode_output(&mut buf, output);
    }

    if let Some(witnesses) = witnesses {
        for witness in witnesses {
            encode(&mut buf, witness);
        }
    }

    encode(&mut buf, &skeleton.lock_time.to_consensus_u32());
    buf
}

fn encode_output(buf: &mut Vec<u8>, output: &TxOut) {
    encode(buf, &output.value.to_sat());
    encode_script(buf, &output.script_pubkey);
}

fn encode_script(buf: &mut Vec<u8>, script: &Script) {
    encode(buf, &VarInt(script.len() as u64));
    buf.extend_from_slice(script.as_bytes());
}

fn encode<T: Encodable + ?Sized>(buf: &mut Vec<u8>, value: &T) {
    value
        .consensus_encode(buf)
        .expect("writing to a Vec<u8> cannot fail");
}
