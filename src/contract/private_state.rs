use crate::contract::provider::PrivateStateProvider;
use crate::contract::types::{ContractError, PrivateState};
use crate::utils::random_bytes;

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;

/// Identifier the crowdfunding contract's private state is stored under.
pub const CROWDFUNDING_PRIVATE_STATE_ID: &str = "crowdfundingPrivateState";

/// Stored private state for `id`, or a freshly generated one that is stored before returning.
pub async fn load_or_create<P: PrivateStateProvider + ?Sized>(
	provider: &P,
	id: &str,
) -> Result<PrivateState, ContractError> {
	if let Some(existing) = provider.get(id).await? {
		return Ok(existing);
	}

	info!("No private state stored under {}, generating a new secret key", id);
	let state = PrivateState {
		secret_key: random_bytes(32),
	};
	provider.set(id, &state).await?;
	Ok(state)
}

/// Private states stored as bincode files under `<dir>/<store name>/<id>.bin`.
pub struct FilePrivateStateStore {
	dir: PathBuf,
}

impl FilePrivateStateStore {
	pub fn new(base_dir: PathBuf, store_name: &str) -> Self {
		Self {
			dir: base_dir.join(store_name),
		}
	}

	fn path(&self, id: &str) -> PathBuf {
		self.dir.join(format!("{}.bin", id))
	}
}

#[async_trait]
impl PrivateStateProvider for FilePrivateStateStore {
	async fn get(&self, id: &str) -> Result<Option<PrivateState>, ContractError> {
		let path = self.path(id);
		if !tokio::fs::try_exists(&path).await? {
			return Ok(None);
		}

		let bytes = tokio::fs::read(&path).await?;
		let state = bincode::deserialize(&bytes).map_err(|e| {
			ContractError::PrivateState(format!("Failed to deserialize {:?}: {}", path, e))
		})?;
		Ok(Some(state))
	}

	async fn set(&self, id: &str, state: &PrivateState) -> Result<(), ContractError> {
		tokio::fs::create_dir_all(&self.dir).await?;
		let bytes = bincode::serialize(state)
			.map_err(|e| ContractError::PrivateState(format!("Failed to serialize: {}", e)))?;
		tokio::fs::write(self.path(id), bytes).await?;
		Ok(())
	}
}

#[derive(Default)]
pub struct MemoryPrivateStateStore {
	states: Mutex<HashMap<String, PrivateState>>,
}

impl MemoryPrivateStateStore {
	pub fn new() -> Self {
		Self::default()
	}
}

#[async_trait]
impl PrivateStateProvider for MemoryPrivateStateStore {
	async fn get(&self, id: &str) -> Result<Option<PrivateState>, ContractError> {
		Ok(self
			.states
			.lock()
			.expect("private state lock poisoned")
			.get(id)
			.cloned())
	}

	async fn set(&self, id: &str, state: &PrivateState) -> Result<(), ContractError> {
		self.states
			.lock()
			.expect("private state lock poisoned")
			.insert(id.to_string(), state.clone());
		Ok(())
	}
}
