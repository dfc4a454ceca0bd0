//! Conflicting transaction pair construction.
//!
//! Both transactions spend the same single UTXO. The first pays the full
//! post-fee amount; the second, unless given an explicit value, debits an
//! extra amount so the two differ even when they pay the same address.

use bitcoin::absolute::LockTime;
use bitcoin::{Address, Amount};
use tracing::{debug, info};

use crate::assembler::{build_skeleton, finalize, input_sequence, UnsignedTxSkeleton};
use crate::error::CoreError;
use crate::fee::{
    compute_fee, derive_output_amount, DEFAULT_ESTIMATED_VBYTES, DEFAULT_SECOND_EXTRA_DEBIT,
};
use crate::key::KeyMaterial;
use crate::primitives::Primitives;
use crate::signer::sign_input;
use crate::types::{OutputSpec, SignedTx, Utxo};

/// Service-level knobs for pair construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConflictPolicy {
    pub estimated_vbytes: u64,
    pub second_extra_debit: Amount,
}

impl Default for ConflictPolicy {
    fn default() -> Self {
        Self {
            estimated_vbytes: DEFAULT_ESTIMATED_VBYTES,
            second_extra_debit: DEFAULT_SECOND_EXTRA_DEBIT,
        }
    }
}

/// A destination with an optional fixed value. Without a value the amount is
/// derived from the UTXO and fee.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputRequest {
    pub address: Address,
    pub value: Option<Amount>,
}

#[derive(Debug)]
pub struct PairRequest {
    pub key: KeyMaterial,
    pub utxo: Utxo,
    pub outputs: [OutputRequest; 2],
    pub fee_rate_sat_vb: f64,
    pub replace_signal: bool,
}

#[derive(Debug, Clone)]
pub struct ConflictPair {
    pub tx1: SignedTx,
    pub tx2: SignedTx,
    /// Fee implied by the fee rate and the size estimate.
    pub fee: Amount,
}

/// Build, sign and serialize both transactions.
///
/// All amount checks run before anything is signed; nothing is returned on
/// error.
pub fn build_conflict_pair<P: Primitives + ?Sized>(
    primitives: &P,
    request: &PairRequest,
    policy: &ConflictPolicy,
) -> Result<ConflictPair, CoreError> {
    let fee = compute_fee(request.fee_rate_sat_vb, policy.estimated_vbytes)?;
    let [first, second] = &request.outputs;

    let first = OutputSpec {
        address: first.address.clone(),
        value: resolve_value(request.utxo.value, fee, Amount::ZERO, first.value)?,
    };
    let second = OutputSpec {
        address: second.address.clone(),
        value: resolve_value(
            request.utxo.value,
            fee,
            policy.second_extra_debit,
            second.value,
        )?,
    };
    if first == second {
        return Err(CoreError::InvalidInput(
            "both outputs are identical; the transactions would not conflict".to_owned(),
        ));
    }

    let sequence = input_sequence(request.replace_signal);
    let skeletons: [UnsignedTxSkeleton; 2] = [
        build_skeleton(&request.utxo, &first, sequence, LockTime::ZERO),
        build_skeleton(&request.utxo, &second, sequence, LockTime::ZERO),
    ];
    debug!(
        outpoint = %request.utxo.outpoint,
        fee = fee.to_sat(),
        first_value = first.value.to_sat(),
        second_value = second.value.to_sat(),
        rbf = request.replace_signal,
        "built conflicting skeletons"
    );

    let [tx1, tx2] = [&skeletons[0], &skeletons[1]].map(|skeleton| {
        let witness = sign_input(primitives, skeleton, &request.key, 0)?;
        finalize(primitives, skeleton, &[witness])
    });
    let (tx1, tx2) = (tx1?, tx2?);

    info!(
        outpoint = %request.utxo.outpoint,
        tx1 = %tx1.txid(),
        tx2 = %tx2.txid(),
        "built conflicting transaction pair"
    );

    Ok(ConflictPair { tx1, tx2, fee })
}

fn resolve_value(
    utxo_value: Amount,
    fee: Amount,
    extra_debit: Amount,
    explicit: Option<Amount>,
) -> Result<Amount, CoreError> {
    let Some(value) = explicit else {
        return derive_output_amount(utxo_value, fee, extra_debit);
    };
    if value == Amount::ZERO {
        return Err(CoreError::InvalidInput(
            "output value must be greater than zero".to_owned(),
        ));
    }
    let required = value
        .checked_add(fee)
        .ok_or_else(|| CoreError::InvalidInput("output value overflows".to_owned()))?;
    if required > utxo_value {
        return Err(CoreError::InsufficientFunds {
            available: utxo_value,
            required,
        });
    }
    Ok(value)
}
