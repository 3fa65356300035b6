use crate::indexer::IndexerError;
use crate::wallet::SessionError;

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

const MILLIS_PER_DAY: u64 = 1000 * 60 * 60 * 24;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProjectStatus {
	Active,
	Closed,
	Withdrawn,
	Cancelled,
}

/// A crowdfunding project as recorded in the contract's ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
	pub status: ProjectStatus,
	pub title: String,
	#[serde(rename = "desc")]
	pub description: String,
	/// Owner's public key.
	#[serde(with = "hex::serde")]
	pub owner: Vec<u8>,
	pub raised: u128,
	pub contribution_goal: u128,
	pub contributors: u64,
	/// Milliseconds since the Unix epoch.
	pub creation_date: u64,
	/// In days.
	pub duration: u64,
}

impl Project {
	pub fn expires_at(&self) -> u64 {
		self.creation_date
			.saturating_add(self.duration.saturating_mul(MILLIS_PER_DAY))
	}

	/// Whether contributions are closed by time at `now` (milliseconds since the epoch).
	pub fn is_expired(&self, now: u64) -> bool {
		self.expires_at() < now
	}

	pub fn is_settled(&self) -> bool {
		self.status != ProjectStatus::Active
	}
}

/// A coin held by the contract's pool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawPoolBalance {
	#[serde(with = "hex::serde")]
	pub nonce: Vec<u8>,
	#[serde(with = "hex::serde")]
	pub color: Vec<u8>,
	pub value: u128,
	pub mt_index: u64,
}

/// Contract ledger as decoded from the chain, keyed by hex identifiers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawLedgerState {
	/// Block height the state was read at.
	#[serde(default)]
	pub offset: u64,
	#[serde(rename = "protocolTVL", default)]
	pub protocol_tvl: BTreeMap<String, RawPoolBalance>,
	#[serde(default)]
	pub projects: BTreeMap<String, Project>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolBalance {
	pub id: String,
	#[serde(with = "hex::serde")]
	pub nonce: Vec<u8>,
	#[serde(with = "hex::serde")]
	pub color: Vec<u8>,
	pub value: u128,
	pub merkle_index: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedProject {
	pub id: String,
	pub project: Project,
}

/// Application-facing view of the contract ledger. Rebuilt on every ledger change.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DerivedLedgerState {
	#[serde(rename = "protocolTVL")]
	pub protocol_tvl: Vec<PoolBalance>,
	pub projects: Vec<DerivedProject>,
}

impl DerivedLedgerState {
	pub fn project(&self, id: &str) -> Option<&Project> {
		self.projects
			.iter()
			.find(|derived| derived.id == id)
			.map(|derived| &derived.project)
	}

	pub fn total_value_locked(&self) -> u128 {
		self.protocol_tvl
			.iter()
			.map(|balance| balance.value)
			.fold(0, u128::saturating_add)
	}
}

/// Per-account contract state that never leaves this machine.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivateState {
	pub secret_key: Vec<u8>,
}

impl fmt::Debug for PrivateState {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "PrivateState({} byte key)", self.secret_key.len())
	}
}

/// A coin offered to a circuit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoinInfo {
	#[serde(with = "hex::serde")]
	pub nonce: Vec<u8>,
	#[serde(with = "hex::serde")]
	pub color: Vec<u8>,
	pub value: u128,
}

/// Errors from the contract providers, the projection and the contract API
#[derive(Debug, thiserror::Error)]
pub enum ContractError {
	#[error("Indexer error: {0}")]
	Indexer(#[from] IndexerError),

	#[error("Session error: {0}")]
	Session(#[from] SessionError),

	#[error("Failed to decode ledger state: {0}")]
	Decode(String),

	#[error("Private state error: {0}")]
	PrivateState(String),

	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),

	#[error("Contract not found at {0}")]
	NotFound(String),

	#[error("Invalid argument: {0}")]
	InvalidArgument(String),

	#[error("Circuit execution failed: {0}")]
	Circuit(String),
}

#[cfg(test)]
mod tests {
	use super::*;

	fn project() -> Project {
		Project {
			status: ProjectStatus::Active,
			title: "Well".to_string(),
			description: "Village well".to_string(),
			owner: vec![1, 2],
			raised: 0,
			contribution_goal: 1000,
			contributors: 0,
			creation_date: 1_700_000_000_000,
			duration: 2,
		}
	}

	#[test]
	fn expiry_is_measured_in_days() {
		let project = project();
		assert_eq!(project.expires_at(), 1_700_000_000_000 + 2 * MILLIS_PER_DAY);
		assert!(!project.is_expired(project.expires_at()));
		assert!(project.is_expired(project.expires_at() + 1));
	}

	#[test]
	fn raw_ledger_state_reads_the_contract_json_layout() {
		let json = r#"{
			"offset": 4,
			"protocolTVL": {"aa": {"nonce": "01", "color": "02", "value": 10, "mt_index": 3}},
			"projects": {"bb": {
				"status": "closed", "title": "t", "desc": "d", "owner": "ff",
				"raised": 5, "contribution_goal": 9, "contributors": 1,
				"creation_date": 0, "duration": 1
			}}
		}"#;
		let state: RawLedgerState = serde_json::from_str(json).unwrap();
		assert_eq!(state.protocol_tvl["aa"].mt_index, 3);
		assert_eq!(state.projects["bb"].status, ProjectStatus::Closed);
		assert!(state.projects["bb"].is_settled());
		assert_eq!(state.projects["bb"].owner, vec![0xff]);
	}

	#[test]
	fn total_value_locked_saturates_instead_of_overflowing() {
		let pool = |id: &str| PoolBalance {
			id: id.to_string(),
			nonce: vec![0; 32],
			color: vec![0; 33],
			value: u128::MAX,
			merkle_index: 0,
		};
		let state = DerivedLedgerState {
			protocol_tvl: vec![pool("aa"), pool("bb")],
			projects: Vec::new(),
		};
		assert_eq!(state.total_value_locked(), u128::MAX);
	}

	#[test]
	fn private_state_debug_hides_the_key() {
		let state = PrivateState {
			secret_key: vec![42; 32],
		};
		assert_eq!(format!("{:?}", state), "PrivateState(32 byte key)");
	}
}
