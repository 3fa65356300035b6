//! In-memory contract endpoints, for tests and local tooling.

use crate::contract::api::{CircuitCall, CircuitExecutor, DeployRecipe};
use crate::contract::provider::{LedgerStream, PublicDataProvider};
use crate::contract::types::{ContractError, PrivateState, RawLedgerState};
use crate::wallet::UnprovenTransaction;

use async_trait::async_trait;
use futures::StreamExt;
use futures::channel::mpsc::{UnboundedSender, unbounded};
use futures::stream;
use std::collections::HashMap;
use std::sync::Mutex;

type Subscriber = UnboundedSender<Result<RawLedgerState, ContractError>>;

#[derive(Default)]
struct Ledgers {
	states: HashMap<String, RawLedgerState>,
	subscribers: HashMap<String, Vec<Subscriber>>,
	opened: usize,
}

/// Public data provider whose ledger states are pushed by the caller.
#[derive(Default)]
pub struct MemoryPublicDataProvider {
	ledgers: Mutex<Ledgers>,
}

impl MemoryPublicDataProvider {
	pub fn new() -> Self {
		Self::default()
	}

	/// Record `state` as the current ledger of `address` and send it to every subscriber.
	pub fn publish(&self, address: &str, state: RawLedgerState) {
		let mut ledgers = self.ledgers.lock().expect("ledger lock poisoned");
		if let Some(subscribers) = ledgers.subscribers.get_mut(address) {
			subscribers.retain(|sender| sender.unbounded_send(Ok(state.clone())).is_ok());
		}
		ledgers.states.insert(address.to_string(), state);
	}

	/// Subscriptions to `address` whose receiving end is still alive.
	pub fn active_subscriptions(&self, address: &str) -> usize {
		self.ledgers
			.lock()
			.expect("ledger lock poisoned")
			.subscribers
			.get(address)
			.map(|subscribers| subscribers.iter().filter(|s| !s.is_closed()).count())
			.unwrap_or_default()
	}

	/// Subscriptions ever opened, across all addresses.
	pub fn opened_subscriptions(&self) -> usize {
		self.ledgers.lock().expect("ledger lock poisoned").opened
	}
}

#[async_trait]
impl PublicDataProvider for MemoryPublicDataProvider {
	async fn query_public_state(&self, address: &str) -> Result<Option<RawLedgerState>, ContractError> {
		Ok(self
			.ledgers
			.lock()
			.expect("ledger lock poisoned")
			.states
			.get(address)
			.cloned())
	}

	async fn subscribe_public_state(&self, address: &str) -> Result<LedgerStream, ContractError> {
		let (sender, receiver) = unbounded();
		let mut ledgers = self.ledgers.lock().expect("ledger lock poisoned");
		ledgers.opened += 1;

		let current = ledgers.states.get(address).cloned();
		ledgers
			.subscribers
			.entry(address.to_string())
			.or_default()
			.push(sender);

		Ok(stream::iter(current.map(Ok)).chain(receiver).boxed())
	}
}

/// Circuit executor that records its calls and encodes them as JSON transactions.
#[derive(Default)]
pub struct RecordingCircuitExecutor {
	contract_address: String,
	calls: Mutex<Vec<CircuitCall>>,
}

impl RecordingCircuitExecutor {
	pub fn new(contract_address: impl Into<String>) -> Self {
		Self {
			contract_address: contract_address.into(),
			calls: Mutex::new(Vec::new()),
		}
	}

	pub fn calls(&self) -> Vec<CircuitCall> {
		self.calls.lock().expect("executor lock poisoned").clone()
	}
}

#[async_trait]
impl CircuitExecutor for RecordingCircuitExecutor {
	async fn deploy(&self, _private_state: &PrivateState) -> Result<DeployRecipe, ContractError> {
		Ok(DeployRecipe {
			contract_address: self.contract_address.clone(),
			transaction: UnprovenTransaction(b"deploy".to_vec()),
		})
	}

	async fn call(
		&self,
		contract_address: &str,
		call: &CircuitCall,
		_private_state: &PrivateState,
	) -> Result<UnprovenTransaction, ContractError> {
		if contract_address != self.contract_address {
			return Err(ContractError::Circuit(format!(
				"no contract deployed at {}",
				contract_address
			)));
		}
		let bytes = serde_json::to_vec(call).map_err(|e| ContractError::Circuit(e.to_string()))?;
		self.calls.lock().expect("executor lock poisoned").push(call.clone());
		Ok(UnprovenTransaction(bytes))
	}
}
