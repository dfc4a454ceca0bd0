//! Fee policy arithmetic.
//!
//! The transaction size is a configured estimate rather than the measured
//! size of the serialized transaction. 150 vB comfortably covers one P2WPKH
//! input and one output.

use bitcoin::Amount;

use crate::error::CoreError;

pub const DEFAULT_ESTIMATED_VBYTES: u64 = 150;

/// Extra amount debited from the second transaction so the pair differs in
/// value even when both outputs pay the same address.
pub const DEFAULT_SECOND_EXTRA_DEBIT: Amount = Amount::from_sat(1_000);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeePolicy {
    pub fee_rate_sat_vb: f64,
    pub estimated_vbytes: u64,
}

impl FeePolicy {
    pub fn new(fee_rate_sat_vb: f64, estimated_vbytes: u64) -> Self {
        Self {
            fee_rate_sat_vb,
            estimated_vbytes,
        }
    }

    pub fn fee(&self) -> Result<Amount, CoreError> {
        compute_fee(self.fee_rate_sat_vb, self.estimated_vbytes)
    }
}

/// `ceil(rate * vbytes)`, never below one satoshi.
pub fn compute_fee(fee_rate_sat_vb: f64, estimated_vbytes: u64) -> Result<Amount, CoreError> {
    if !fee_rate_sat_vb.is_finite() || fee_rate_sat_vb <= 0.0 {
        return Err(CoreError::InvalidFeeRate(format!(
            "fee rate must be a positive number, got {fee_rate_sat_vb}"
        )));
    }

    let fee = (fee_rate_sat_vb * estimated_vbytes as f64).ceil();
    if fee >= Amount::MAX_MONEY.to_sat() as f64 {
        return Err(CoreError::InvalidFeeRate(format!(
            "fee rate {fee_rate_sat_vb} sat/vB exceeds the money supply"
        )));
    }
    Ok(Amount::from_sat((fee as u64).max(1)))
}

/// Output value left after paying `fee` and `extra_debit` out of `utxo_value`.
pub fn derive_output_amount(
    utxo_value: Amount,
    fee: Amount,
    extra_debit: Amount,
) -> Result<Amount, CoreError> {
    let required = fee
        .checked_add(extra_debit)
        .ok_or_else(|| CoreError::InvalidInput("fee plus extra debit overflows".to_owned()))?;
    match utxo_value.checked_sub(required) {
        Some(value) if value > Amount::ZERO => Ok(value),
        _ => Err(CoreError::InsufficientFunds {
            available: utxo_value,
            required,
        }),
    }
}
