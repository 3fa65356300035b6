//! Serialized session snapshots.
//!
//! A snapshot is an opaque JSON document produced by a session's `serialize_state`. The only
//! field the recovery logic relies on is `offset`, read through [`recorded_offset`] so that any
//! session implementation can be restored as long as it records its offset there.

use crate::wallet::types::{SessionState, SnapshotError, TokenType, TransactionRecord};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const SNAPSHOT_VERSION: u32 = 1;

/// Snapshot layout written by the sessions in this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
	pub version: u32,
	pub offset: u64,
	pub address: String,
	#[serde(default)]
	pub balances: BTreeMap<TokenType, u128>,
	#[serde(default)]
	pub transaction_history: Vec<TransactionRecord>,
	pub saved_at: String,
}

impl SessionSnapshot {
	pub fn capture(state: &SessionState) -> Self {
		Self {
			version: SNAPSHOT_VERSION,
			offset: state.offset,
			address: state.address.clone(),
			balances: state.balances.clone(),
			transaction_history: state.transaction_history.clone(),
			saved_at: chrono::Utc::now().to_rfc3339(),
		}
	}

	pub fn to_bytes(&self) -> Result<Vec<u8>, SnapshotError> {
		Ok(serde_json::to_vec(self)?)
	}

	pub fn from_bytes(blob: &[u8]) -> Result<Self, SnapshotError> {
		let snapshot: Self = serde_json::from_slice(blob)?;
		if snapshot.version > SNAPSHOT_VERSION {
			return Err(SnapshotError::Malformed(format!(
				"unsupported snapshot version {}",
				snapshot.version
			)));
		}
		Ok(snapshot)
	}

	/// Session state as it was when the snapshot was taken. Sync progress is unknown until
	/// the restored session reports again.
	pub fn into_state(self) -> SessionState {
		SessionState {
			address: self.address,
			balances: self.balances,
			sync_progress: None,
			offset: self.offset,
			transaction_history: self.transaction_history,
		}
	}
}

/// Read the `offset` member of a serialized snapshot.
///
/// Accepts a JSON number or a numeric string.
pub fn recorded_offset(blob: &[u8]) -> Result<u64, SnapshotError> {
	let value: serde_json::Value = serde_json::from_slice(blob)?;
	let offset = value
		.get("offset")
		.ok_or_else(|| SnapshotError::Malformed("missing offset".to_string()))?;

	match offset {
		serde_json::Value::Number(n) => n
			.as_u64()
			.ok_or_else(|| SnapshotError::Malformed(format!("offset {} is not a u64", n))),
		serde_json::Value::String(s) => s
			.parse::<u64>()
			.map_err(|e| SnapshotError::Malformed(format!("offset {:?}: {}", s, e))),
		other => Err(SnapshotError::Malformed(format!(
			"offset has unexpected type: {}",
			other
		))),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn recorded_offset_reads_numbers_and_numeric_strings() {
		assert_eq!(recorded_offset(br#"{"offset": 100}"#).unwrap(), 100);
		assert_eq!(recorded_offset(br#"{"offset": "42", "other": true}"#).unwrap(), 42);
	}

	#[test]
	fn recorded_offset_rejects_garbage() {
		assert!(matches!(recorded_offset(b"not json"), Err(SnapshotError::Json(_))));
		assert!(matches!(recorded_offset(br#"{"height": 1}"#), Err(SnapshotError::Malformed(_))));
		assert!(matches!(recorded_offset(br#"{"offset": -3}"#), Err(SnapshotError::Malformed(_))));
		assert!(matches!(recorded_offset(br#"{"offset": null}"#), Err(SnapshotError::Malformed(_))));
	}

	#[test]
	fn captured_snapshot_restores_without_progress() {
		let mut state = SessionState {
			address: "mn_shield-addr_undeployed1abc".to_string(),
			offset: 77,
			..Default::default()
		};
		state.balances.insert("02".to_string(), 5);
		state.sync_progress = Some(crate::wallet::SyncProgress::synced());

		let blob = SessionSnapshot::capture(&state).to_bytes().unwrap();
		assert_eq!(recorded_offset(&blob).unwrap(), 77);

		let restored = SessionSnapshot::from_bytes(&blob).unwrap().into_state();
		assert_eq!(restored.offset, 77);
		assert_eq!(restored.balance("02"), 5);
		assert_eq!(restored.sync_progress, None);
	}

	#[test]
	fn newer_snapshot_versions_are_refused() {
		let blob = br#"{"version": 99, "offset": 1, "address": "", "saved_at": ""}"#;
		assert!(matches!(SessionSnapshot::from_bytes(blob), Err(SnapshotError::Malformed(_))));
	}
}
