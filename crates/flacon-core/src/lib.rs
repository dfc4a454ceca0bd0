pub mod assembler;
pub mod error;
pub mod fee;
pub mod key;
pub mod network;
pub mod pair;
pub mod primitives;
pub mod provider;
pub mod request;
pub mod sequencer;
pub mod signer;
pub mod types;

#[cfg(test)]
mod test_util;

pub use error::{CoreError, ProviderError};
pub use network::NetworkParams;
pub use pair::{build_conflict_pair, ConflictPair, ConflictPolicy};
