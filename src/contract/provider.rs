//! Contract data endpoints.
//!
//! [`PublicDataProvider`] reads the contract ledger from the chain; [`PrivateStateProvider`]
//! holds the account's private contract state. [`IndexerPublicDataProvider`] reads contract
//! actions from the indexer and turns their serialized state into a [`RawLedgerState`] with a
//! [`LedgerDecoder`].

use crate::contract::types::{ContractError, PrivateState, RawLedgerState};
use crate::indexer::{ContractActionData, MidnightIndexerClient};

use async_trait::async_trait;
use futures::StreamExt;
use futures::stream::BoxStream;
use std::sync::Arc;
use tracing::debug;

pub type LedgerStream = BoxStream<'static, Result<RawLedgerState, ContractError>>;

#[async_trait]
pub trait PublicDataProvider: Send + Sync {
	/// Current ledger state, `None` when no contract exists at `address`.
	async fn query_public_state(&self, address: &str) -> Result<Option<RawLedgerState>, ContractError>;

	/// Ledger states of `address`, starting with the current one.
	async fn subscribe_public_state(&self, address: &str) -> Result<LedgerStream, ContractError>;
}

#[async_trait]
pub trait PrivateStateProvider: Send + Sync {
	/// `None` when no private state was stored under `id` yet.
	async fn get(&self, id: &str) -> Result<Option<PrivateState>, ContractError>;
	async fn set(&self, id: &str, state: &PrivateState) -> Result<(), ContractError>;
}

/// Turns a contract action's serialized state into a [`RawLedgerState`].
pub trait LedgerDecoder: Send + Sync {
	fn decode(&self, action: &ContractActionData) -> Result<RawLedgerState, ContractError>;
}

/// Decoder for contracts whose state is hex-encoded JSON of a [`RawLedgerState`].
///
/// The offset is taken from the action's block height.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonLedgerDecoder;

impl LedgerDecoder for JsonLedgerDecoder {
	fn decode(&self, action: &ContractActionData) -> Result<RawLedgerState, ContractError> {
		let bytes = hex::decode(action.state.trim_start_matches("0x"))
			.map_err(|e| ContractError::Decode(format!("state is not hex: {}", e)))?;
		let mut state: RawLedgerState = serde_json::from_slice(&bytes)
			.map_err(|e| ContractError::Decode(format!("state is not a ledger: {}", e)))?;
		state.offset = action.block_height();
		Ok(state)
	}
}

pub struct IndexerPublicDataProvider {
	indexer: MidnightIndexerClient,
	decoder: Arc<dyn LedgerDecoder>,
}

impl IndexerPublicDataProvider {
	pub fn new(indexer: MidnightIndexerClient, decoder: Arc<dyn LedgerDecoder>) -> Self {
		Self { indexer, decoder }
	}
}

#[async_trait]
impl PublicDataProvider for IndexerPublicDataProvider {
	async fn query_public_state(&self, address: &str) -> Result<Option<RawLedgerState>, ContractError> {
		match self.indexer.query_contract_state(address).await? {
			Some(action) => Ok(Some(self.decoder.decode(&action)?)),
			None => Ok(None),
		}
	}

	async fn subscribe_public_state(&self, address: &str) -> Result<LedgerStream, ContractError> {
		debug!("Subscribing to contract actions of {}", address);
		let actions = self.indexer.subscribe_contract_actions(address).await?;
		let decoder = self.decoder.clone();

		Ok(actions
			.map(move |action| {
				let action = action?;
				decoder.decode(&action)
			})
			.boxed())
	}
}
