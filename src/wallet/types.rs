use crate::indexer::{ApplyStage, IndexerError};
use crate::transaction::address::AddressError;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Hex-encoded token type, e.g. [`crate::transaction::NATIVE_TOKEN`].
pub type TokenType = String;

/// 32-byte wallet seed, written as 64 hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct WalletSeed(pub [u8; 32]);

impl WalletSeed {
	pub fn to_hex(&self) -> String {
		hex::encode(self.0)
	}
}

impl FromStr for WalletSeed {
	type Err = SessionError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let bytes = hex::decode(s.trim())
			.map_err(|e| SessionError::InvalidSeed(format!("not hex: {}", e)))?;
		let seed: [u8; 32] = bytes
			.try_into()
			.map_err(|b: Vec<u8>| SessionError::InvalidSeed(format!("expected 32 bytes, got {}", b.len())))?;
		Ok(Self(seed))
	}
}

impl fmt::Display for WalletSeed {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.to_hex())
	}
}

// Seeds end up in log lines through `{:?}` on containing structs.
impl fmt::Debug for WalletSeed {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "WalletSeed({}..)", &self.to_hex()[..8])
	}
}

/// Distance between the locally applied position and the two reference frontiers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLag {
	/// Relevant wallet index not yet applied locally.
	pub apply_gap: u64,
	/// Chain index the indexer has not yet scanned for relevant data.
	pub source_gap: u64,
}

/// Sync status embedded in every session state.
///
/// `synced` is authoritative; consumers must not re-derive it from the gaps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncProgress {
	pub synced: bool,
	pub lag: SyncLag,
}

impl SyncProgress {
	pub fn synced() -> Self {
		Self {
			synced: true,
			lag: SyncLag::default(),
		}
	}

	pub fn behind(apply_gap: u64, source_gap: u64) -> Self {
		Self {
			synced: false,
			lag: SyncLag {
				apply_gap,
				source_gap,
			},
		}
	}
}

/// A transaction observed for the session's account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionRecord {
	pub hash: String,
	/// Chain index at which the transaction was reported.
	pub index: u64,
	pub apply_stage: Option<ApplyStage>,
	#[serde(default)]
	pub identifiers: Vec<String>,
}

/// One emission of a session's progress source.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionState {
	pub address: String,
	pub balances: BTreeMap<TokenType, u128>,
	/// `None` until the source has reported progress at least once.
	pub sync_progress: Option<SyncProgress>,
	/// Position in the remote chain applied locally. Never decreases.
	pub offset: u64,
	pub transaction_history: Vec<TransactionRecord>,
}

impl SessionState {
	pub fn balance(&self, token_type: &str) -> u128 {
		self.balances.get(token_type).copied().unwrap_or_default()
	}

	pub fn is_synced(&self) -> bool {
		self.sync_progress.is_some_and(|progress| progress.synced)
	}

	/// Lag as reported, zero when no progress has been reported yet.
	pub fn lag(&self) -> SyncLag {
		self.sync_progress
			.map(|progress| progress.lag)
			.unwrap_or_default()
	}
}

/// A single output of a transfer intent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenTransfer {
	pub amount: u128,
	pub receiver_address: String,
	pub token_type: TokenType,
}

/// Serialized transaction awaiting a proof.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnprovenTransaction(pub Vec<u8>);

/// Serialized, proven transaction ready for submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvenTransaction(pub Vec<u8>);

/// Identifier returned by the node for a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub String);

impl fmt::Display for TransactionId {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(&self.0)
	}
}

/// Errors raised by a session or its transaction capabilities
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
	#[error("Indexer error: {0}")]
	Indexer(#[from] IndexerError),

	#[error("Snapshot error: {0}")]
	Snapshot(#[from] SnapshotError),

	#[error("Address error: {0}")]
	Address(#[from] AddressError),

	#[error("Invalid seed: {0}")]
	InvalidSeed(String),

	#[error("Invalid transfer: {0}")]
	InvalidTransfer(String),

	#[error("Proof server error: {0}")]
	Prover(String),

	#[error("Submission error: {0}")]
	Submission(String),

	#[error("Session build error: {0}")]
	Build(String),

	#[error("Session is closed")]
	Closed,
}

/// Errors raised while loading, saving or parsing persisted snapshots
#[derive(Debug, thiserror::Error)]
pub enum SnapshotError {
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("JSON error: {0}")]
	Json(#[from] serde_json::Error),

	#[error("Malformed snapshot: {0}")]
	Malformed(String),
}

/// Errors that end the startup sequence. Everything else is absorbed by a fallback.
#[derive(Debug, thiserror::Error)]
pub enum RecoveryError {
	#[error("Failed to build a fresh session: {0}")]
	FreshBuild(#[source] SessionError),

	#[error("Failed to persist session snapshot: {0}")]
	Persist(#[from] SnapshotError),

	#[error("Failed to serialize session: {0}")]
	Serialize(#[source] SessionError),
}

/// Hard failure produced when a caller converts a soft wait outcome.
#[derive(Debug, thiserror::Error)]
pub enum WaitError {
	#[error("Timed out waiting for {0}")]
	TimedOut(&'static str),

	#[error("Progress source closed while waiting for {0}")]
	SourceClosed(&'static str),
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn seed_parses_64_hex_characters() {
		let seed: WalletSeed = "0000000000000000000000000000000000000000000000000000000000000001"
			.parse()
			.unwrap();
		assert_eq!(seed.0[31], 1);
		assert_eq!(seed.to_string().len(), 64);
	}

	#[test]
	fn seed_rejects_wrong_length_and_non_hex() {
		assert!(matches!("abcd".parse::<WalletSeed>(), Err(SessionError::InvalidSeed(_))));
		assert!(matches!("zz".repeat(32).parse::<WalletSeed>(), Err(SessionError::InvalidSeed(_))));
	}

	#[test]
	fn state_without_progress_is_not_synced() {
		let mut state = SessionState::default();
		assert!(!state.is_synced());
		assert_eq!(state.lag(), SyncLag::default());

		state.sync_progress = Some(SyncProgress::behind(3, 1));
		assert!(!state.is_synced());
		assert_eq!(state.lag().apply_gap, 3);

		state.sync_progress = Some(SyncProgress::synced());
		assert!(state.is_synced());
	}
}
