/// Midnight address encoding and validation
pub mod address;
/// Native token transfers
pub mod fund;
/// Remote proof server integration
pub mod prover;
/// Transaction submission to the node
pub mod submitter;

#[cfg(test)]
pub(crate) mod testing;

pub use prover::{RemoteProofServer, TransactionProver};
pub use submitter::{NodeSubmitter, TransactionSubmitter};

/// Number of decimal places for the Midnight native token (tDUST).
pub const MIDNIGHT_TOKEN_DECIMALS: u32 = 6;

/// Token type of the native token (tDUST).
pub const NATIVE_TOKEN: &str = "020000000000000000000000000000000000000000000000000000000000000000";
