use crate::wallet::snapshot::recorded_offset;
use crate::wallet::{SnapshotError, WalletSeed};

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::{debug, info};

/// Identifies one persisted session snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SnapshotKey {
	pub seed: WalletSeed,
	pub filename: Option<String>,
}

impl SnapshotKey {
	/// An empty filename means "derive it from the seed".
	pub fn new(seed: WalletSeed, filename: Option<&str>) -> Self {
		Self {
			seed,
			filename: filename
				.map(str::trim)
				.filter(|name| !name.is_empty())
				.map(str::to_string),
		}
	}

	pub fn file_name(&self) -> String {
		match &self.filename {
			Some(name) => name.clone(),
			None => format!("wallet_state_{}.json", self.seed.to_hex()),
		}
	}
}

/// Repository for serialized session snapshots
#[async_trait::async_trait]
pub trait SnapshotStore: Send + Sync {
	/// `Ok(None)` when nothing was saved under `key`.
	async fn load(&self, key: &SnapshotKey) -> Result<Option<Vec<u8>>, SnapshotError>;
	async fn save(&self, key: &SnapshotKey, snapshot: &[u8]) -> Result<(), SnapshotError>;
}

/// File-based implementation of SnapshotStore
pub struct FileSnapshotStore {
	data_dir: PathBuf,
}

impl FileSnapshotStore {
	pub fn new(data_dir: PathBuf) -> Self {
		Self { data_dir }
	}

	pub fn snapshot_path(&self, key: &SnapshotKey) -> PathBuf {
		self.data_dir.join(key.file_name())
	}

	fn metadata_path(&self, key: &SnapshotKey) -> PathBuf {
		self.data_dir.join(format!("{}.meta.json", key.file_name()))
	}
}

#[async_trait::async_trait]
impl SnapshotStore for FileSnapshotStore {
	async fn load(&self, key: &SnapshotKey) -> Result<Option<Vec<u8>>, SnapshotError> {
		let filename = self.snapshot_path(key);
		if !tokio::fs::try_exists(&filename).await? {
			debug!("No snapshot at {:?}", filename);
			return Ok(None);
		}

		let snapshot = tokio::fs::read(&filename).await?;
		info!("Loaded session snapshot from {:?} ({} bytes)", filename, snapshot.len());
		Ok(Some(snapshot))
	}

	async fn save(&self, key: &SnapshotKey, snapshot: &[u8]) -> Result<(), SnapshotError> {
		tokio::fs::create_dir_all(&self.data_dir).await?;

		// The sidecar is informational; a snapshot without a readable offset is still stored.
		let metadata = serde_json::json!({
			"sync_height": recorded_offset(snapshot).ok(),
			"timestamp": chrono::Utc::now().to_rfc3339(),
		});
		tokio::fs::write(self.metadata_path(key), serde_json::to_string_pretty(&metadata)?).await?;

		let filename = self.snapshot_path(key);
		tokio::fs::write(&filename, snapshot).await?;

		info!("Saved session snapshot to {:?}", filename);
		Ok(())
	}
}

/// In-memory SnapshotStore that counts loads and can simulate storage failures.
#[derive(Default)]
pub struct MemorySnapshotStore {
	entries: Mutex<HashMap<String, Vec<u8>>>,
	loads: AtomicUsize,
	saves: AtomicUsize,
	fail_loads: bool,
}

impl MemorySnapshotStore {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn with_entry(self, key: &SnapshotKey, snapshot: impl Into<Vec<u8>>) -> Self {
		self.entries
			.lock()
			.expect("snapshot store lock poisoned")
			.insert(key.file_name(), snapshot.into());
		self
	}

	/// Every load fails with an I/O error.
	pub fn failing_loads(mut self) -> Self {
		self.fail_loads = true;
		self
	}

	pub fn loads(&self) -> usize {
		self.loads.load(Ordering::SeqCst)
	}

	pub fn saves(&self) -> usize {
		self.saves.load(Ordering::SeqCst)
	}

	pub fn get(&self, key: &SnapshotKey) -> Option<Vec<u8>> {
		self.entries
			.lock()
			.expect("snapshot store lock poisoned")
			.get(&key.file_name())
			.cloned()
	}
}

#[async_trait::async_trait]
impl SnapshotStore for MemorySnapshotStore {
	async fn load(&self, key: &SnapshotKey) -> Result<Option<Vec<u8>>, SnapshotError> {
		self.loads.fetch_add(1, Ordering::SeqCst);
		if self.fail_loads {
			return Err(SnapshotError::Io(std::io::Error::other("simulated storage failure")));
		}
		Ok(self.get(key))
	}

	async fn save(&self, key: &SnapshotKey, snapshot: &[u8]) -> Result<(), SnapshotError> {
		self.saves.fetch_add(1, Ordering::SeqCst);
		self.entries
			.lock()
			.expect("snapshot store lock poisoned")
			.insert(key.file_name(), snapshot.to_vec());
		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn key(filename: Option<&str>) -> SnapshotKey {
		SnapshotKey::new(WalletSeed([1u8; 32]), filename)
	}

	#[test]
	fn empty_filename_falls_back_to_the_seed() {
		assert_eq!(key(Some("  ")), key(None));
		assert!(key(None).file_name().starts_with("wallet_state_0101"));
		assert_eq!(key(Some("alice.json")).file_name(), "alice.json");
	}

	#[tokio::test]
	async fn file_store_round_trips_and_writes_metadata() {
		let dir = tempfile::tempdir().unwrap();
		let store = FileSnapshotStore::new(dir.path().join("cache"));
		let key = key(Some("wallet.json"));

		assert!(store.load(&key).await.unwrap().is_none());

		store.save(&key, br#"{"offset": 12}"#).await.unwrap();
		assert_eq!(store.load(&key).await.unwrap().unwrap(), br#"{"offset": 12}"#.to_vec());

		let meta = std::fs::read_to_string(dir.path().join("cache/wallet.json.meta.json")).unwrap();
		let meta: serde_json::Value = serde_json::from_str(&meta).unwrap();
		assert_eq!(meta["sync_height"], 12);
	}

	#[tokio::test]
	async fn memory_store_counts_loads_and_can_fail() {
		let store = MemorySnapshotStore::new().with_entry(&key(None), b"blob".to_vec());
		assert_eq!(store.load(&key(None)).await.unwrap(), Some(b"blob".to_vec()));
		assert_eq!(store.loads(), 1);

		let failing = MemorySnapshotStore::new().failing_loads();
		assert!(matches!(failing.load(&key(None)).await, Err(SnapshotError::Io(_))));
	}
}
