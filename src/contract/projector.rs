//! Ledger state projection.
//!
//! [`LedgerStateProjector`] merges the contract's public ledger stream with the account's
//! private state, fetched once, into [`DerivedLedgerState`]s. Nothing is emitted until both
//! sources have produced a value; afterwards every accepted ledger state yields a new
//! projection.

use crate::contract::private_state::load_or_create;
use crate::contract::provider::{PrivateStateProvider, PublicDataProvider};
use crate::contract::types::{
	ContractError, DerivedLedgerState, DerivedProject, PoolBalance, PrivateState, RawLedgerState,
};

use futures::stream::BoxStream;
use futures::{StreamExt, future, stream};
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Project a raw ledger state. One entry per key of each raw collection, in key order.
///
/// The private state is not used by the current projection.
pub fn derive_ledger_state(raw: &RawLedgerState, _private: &PrivateState) -> DerivedLedgerState {
	DerivedLedgerState {
		protocol_tvl: raw
			.protocol_tvl
			.iter()
			.map(|(id, balance)| PoolBalance {
				id: id.clone(),
				nonce: balance.nonce.clone(),
				color: balance.color.clone(),
				value: balance.value,
				merkle_index: balance.mt_index,
			})
			.collect(),
		projects: raw
			.projects
			.iter()
			.map(|(id, project)| DerivedProject {
				id: id.clone(),
				project: project.clone(),
			})
			.collect(),
	}
}

/// Latest value of each source plus whether both have been seen.
#[derive(Debug, Default)]
pub struct MergeNode {
	public: Option<RawLedgerState>,
	private: Option<PrivateState>,
}

impl MergeNode {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn is_ready(&self) -> bool {
		self.public.is_some() && self.private.is_some()
	}

	/// Accept a ledger state. States older than the last accepted one are dropped.
	pub fn on_public(&mut self, raw: RawLedgerState) -> Option<DerivedLedgerState> {
		if let Some(current) = &self.public {
			if raw.offset < current.offset {
				warn!(
					"Dropping ledger state at offset {} older than applied offset {}",
					raw.offset, current.offset
				);
				return None;
			}
		}
		trace!("Ledger state changed at offset {}", raw.offset);
		self.public = Some(raw);
		self.derive()
	}

	pub fn on_private(&mut self, private: PrivateState) -> Option<DerivedLedgerState> {
		self.private = Some(private);
		self.derive()
	}

	fn derive(&self) -> Option<DerivedLedgerState> {
		match (&self.public, &self.private) {
			(Some(public), Some(private)) => Some(derive_ledger_state(public, private)),
			_ => None,
		}
	}
}

enum Input {
	Public(Result<RawLedgerState, ContractError>),
	Private(Result<PrivateState, ContractError>),
}

#[derive(Clone)]
pub struct LedgerStateProjector {
	public: Arc<dyn PublicDataProvider>,
	private: Arc<dyn PrivateStateProvider>,
	contract_address: String,
	private_state_id: String,
}

impl LedgerStateProjector {
	pub fn new(
		public: Arc<dyn PublicDataProvider>,
		private: Arc<dyn PrivateStateProvider>,
		contract_address: impl Into<String>,
		private_state_id: impl Into<String>,
	) -> Self {
		Self {
			public,
			private,
			contract_address: contract_address.into(),
			private_state_id: private_state_id.into(),
		}
	}

	pub fn contract_address(&self) -> &str {
		&self.contract_address
	}

	/// Subscribe to the ledger and fetch the private state, then yield a projection per
	/// accepted ledger state. Source errors are passed through.
	pub fn project(&self) -> BoxStream<'static, Result<DerivedLedgerState, ContractError>> {
		let public = self.public.clone();
		let address = self.contract_address.clone();
		let ledger = stream::once(async move { public.subscribe_public_state(&address).await })
			.flat_map(|subscribed| match subscribed {
				Ok(states) => states.map(Input::Public).boxed(),
				Err(e) => stream::once(future::ready(Input::Public(Err(e)))).boxed(),
			});

		let private = self.private.clone();
		let id = self.private_state_id.clone();
		let private_state =
			stream::once(async move { load_or_create(private.as_ref(), &id).await }).map(Input::Private);

		debug!("Projecting ledger state of {}", self.contract_address);
		stream::select(ledger, private_state)
			.scan(MergeNode::new(), |node, input| {
				let output = match input {
					Input::Public(Ok(raw)) => node.on_public(raw).map(Ok),
					Input::Private(Ok(private)) => node.on_private(private).map(Ok),
					Input::Public(Err(e)) | Input::Private(Err(e)) => Some(Err(e)),
				};
				future::ready(Some(output))
			})
			.filter_map(future::ready)
			.boxed()
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::contract::types::{Project, ProjectStatus, RawPoolBalance};

	fn private() -> PrivateState {
		PrivateState {
			secret_key: vec![1; 32],
		}
	}

	fn ledger(offset: u64, pools: usize, projects: usize) -> RawLedgerState {
		let mut state = RawLedgerState {
			offset,
			..Default::default()
		};
		for i in 0..pools {
			state.protocol_tvl.insert(
				format!("{:02x}", i),
				RawPoolBalance {
					nonce: vec![i as u8],
					color: vec![0],
					value: 100 + i as u128,
					mt_index: i as u64,
				},
			);
		}
		for i in 0..projects {
			state.projects.insert(
				format!("p{}", i),
				Project {
					status: ProjectStatus::Active,
					title: format!("project {}", i),
					description: String::new(),
					owner: vec![9],
					raised: 0,
					contribution_goal: 500,
					contributors: 0,
					creation_date: 0,
					duration: 30,
				},
			);
		}
		state
	}

	#[test]
	fn derivation_maps_every_entry_once() {
		for pools in [0, 1, 5] {
			let raw = ledger(1, pools, 3);
			let derived = derive_ledger_state(&raw, &private());
			assert_eq!(derived.protocol_tvl.len(), raw.protocol_tvl.len());
			assert_eq!(derived.projects.len(), raw.projects.len());
		}

		let raw = ledger(1, 2, 1);
		let derived = derive_ledger_state(&raw, &private());
		assert_eq!(derived.protocol_tvl[1].id, "01");
		assert_eq!(derived.protocol_tvl[1].value, 101);
		assert_eq!(derived.protocol_tvl[1].merkle_index, 1);
		assert_eq!(&derived.projects[0].project, &raw.projects["p0"]);
	}

	#[test]
	fn merge_node_waits_for_both_sources() {
		let mut node = MergeNode::new();
		assert!(node.on_public(ledger(1, 1, 0)).is_none());
		assert!(!node.is_ready());

		let first = node.on_private(private()).unwrap();
		assert_eq!(first.protocol_tvl.len(), 1);
		assert!(node.is_ready());

		let second = node.on_public(ledger(2, 2, 0)).unwrap();
		assert_eq!(second.protocol_tvl.len(), 2);
	}

	#[test]
	fn merge_node_drops_older_ledger_states() {
		let mut node = MergeNode::new();
		node.on_private(private());
		assert!(node.on_public(ledger(5, 1, 0)).is_some());
		assert!(node.on_public(ledger(4, 3, 0)).is_none());
		assert!(node.on_public(ledger(5, 2, 0)).is_some());
	}
}
