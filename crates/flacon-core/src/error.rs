use bitcoin::Amount;

use crate::sequencer::BroadcastLeg;

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid public key: {0}")]
    InvalidPublicKey(String),

    #[error("invalid fee rate: {0}")]
    InvalidFeeRate(String),

    #[error("insufficient funds: utxo holds {available}, transaction needs {required}")]
    InsufficientFunds { available: Amount, required: Amount },

    #[error("signing key does not match the locking script of input {input_index}")]
    SigningKeyMismatch { input_index: usize },

    /// The signature backend misbehaved; nothing the caller sent is at fault.
    #[error("signing backend failure: {0}")]
    SigningBackend(String),

    #[error("{leg} transaction rejected: {reason}")]
    SubmissionRejected { leg: BroadcastLeg, reason: String },

    #[error(transparent)]
    Provider(#[from] ProviderError),
}

/// Failures talking to the chain-data provider or submission endpoint.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("rejected with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("invalid provider response: {0}")]
    InvalidResponse(String),

    #[error("invalid provider configuration: {0}")]
    Config(String),
}

impl ProviderError {
    /// The text handed back to callers when a submission fails. Rejections
    /// carry the provider's body verbatim.
    pub fn reason(&self) -> String {
        match self {
            Self::Rejected { body, .. } => body.clone(),
            other => other.to_string(),
        }
    }
}
