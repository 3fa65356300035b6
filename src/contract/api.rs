//! Handle on a deployed crowdfunding contract.
//!
//! Circuits are executed by a [`CircuitExecutor`], which turns a [`CircuitCall`] into an
//! unproven transaction. The resulting transaction is proven and submitted through the
//! caller's [`Session`], after which the session is given a bounded chance to catch up.

use crate::config::WaitConfig;
use crate::contract::feed::StateFeed;
use crate::contract::private_state::{CROWDFUNDING_PRIVATE_STATE_ID, load_or_create};
use crate::contract::projector::LedgerStateProjector;
use crate::contract::provider::{PrivateStateProvider, PublicDataProvider};
use crate::contract::types::{CoinInfo, ContractError, PrivateState};
use crate::transaction::NATIVE_TOKEN;
use crate::utils::random_bytes;
use crate::wallet::{Session, TransactionId, UnprovenTransaction, wait_for_sync_after_operation};

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

/// Arguments of one contract circuit invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "circuit", rename_all = "camelCase")]
pub enum CircuitCall {
	#[serde(rename_all = "camelCase")]
	CreateProject {
		#[serde(with = "hex::serde")]
		project_id: Vec<u8>,
		contribution_goal: u128,
		duration: u64,
		#[serde(with = "hex::serde")]
		coin_type: Vec<u8>,
		/// Milliseconds since the Unix epoch.
		creation_date: u64,
		title: String,
		desc: String,
	},
	#[serde(rename_all = "camelCase")]
	ContributeProject {
		coin: CoinInfo,
		#[serde(with = "hex::serde")]
		project_id: Vec<u8>,
	},
	#[serde(rename_all = "camelCase")]
	EndProject {
		#[serde(with = "hex::serde")]
		project_id: Vec<u8>,
	},
	#[serde(rename_all = "camelCase")]
	CancelProject {
		#[serde(with = "hex::serde")]
		project_id: Vec<u8>,
	},
	#[serde(rename_all = "camelCase")]
	RequestRefund {
		#[serde(with = "hex::serde")]
		project_id: Vec<u8>,
		refund_amount: u128,
		amount_deposited: u128,
	},
	#[serde(rename_all = "camelCase")]
	UpdateProject {
		#[serde(with = "hex::serde")]
		project_id: Vec<u8>,
		title: String,
		desc: String,
		contribution_goal: u128,
		duration: u64,
	},
	#[serde(rename_all = "camelCase")]
	WithdrawProjectFunds {
		#[serde(with = "hex::serde")]
		project_id: Vec<u8>,
	},
}

impl CircuitCall {
	pub fn name(&self) -> &'static str {
		match self {
			Self::CreateProject { .. } => "createProject",
			Self::ContributeProject { .. } => "contributeProject",
			Self::EndProject { .. } => "endProject",
			Self::CancelProject { .. } => "cancelProject",
			Self::RequestRefund { .. } => "requestRefund",
			Self::UpdateProject { .. } => "updateProject",
			Self::WithdrawProjectFunds { .. } => "withdrawProjectFunds",
		}
	}
}

/// Deployment transaction together with the address the contract will live at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployRecipe {
	pub contract_address: String,
	pub transaction: UnprovenTransaction,
}

/// Runs the contract's circuits and witnesses locally.
#[async_trait]
pub trait CircuitExecutor: Send + Sync {
	async fn deploy(&self, private_state: &PrivateState) -> Result<DeployRecipe, ContractError>;

	async fn call(
		&self,
		contract_address: &str,
		call: &CircuitCall,
		private_state: &PrivateState,
	) -> Result<UnprovenTransaction, ContractError>;
}

/// Everything the contract API needs besides the wallet session.
#[derive(Clone)]
pub struct ContractProviders {
	pub public: Arc<dyn PublicDataProvider>,
	pub private: Arc<dyn PrivateStateProvider>,
	pub executor: Arc<dyn CircuitExecutor>,
}

/// A circuit call that reached the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOutcome {
	pub circuit: &'static str,
	pub tx_id: TransactionId,
	/// Whether the session synced within the post-operation timeout.
	pub synced: bool,
}

pub struct CrowdfundingApi<S: Session> {
	session: Arc<S>,
	providers: ContractProviders,
	contract_address: String,
	private_state: PrivateState,
	feed: StateFeed,
	wait: WaitConfig,
}

impl<S: Session> CrowdfundingApi<S> {
	/// Deploy a new contract and return a handle on it.
	pub async fn deploy(
		session: Arc<S>,
		providers: ContractProviders,
		wait: WaitConfig,
	) -> Result<Self, ContractError> {
		info!("Deploying crowdfunding contract");
		let private_state =
			load_or_create(providers.private.as_ref(), CROWDFUNDING_PRIVATE_STATE_ID).await?;
		let recipe = providers.executor.deploy(&private_state).await?;

		let proven = session.prove_transaction(recipe.transaction).await?;
		let tx_id = session.submit_transaction(proven).await?;
		info!(
			"Deployed contract at {} in transaction {}",
			recipe.contract_address, tx_id
		);
		wait_for_sync_after_operation(session.as_ref(), &wait).await;

		Ok(Self::new(session, providers, recipe.contract_address, private_state, wait))
	}

	/// Attach to a contract that is already on chain.
	pub async fn join(
		session: Arc<S>,
		providers: ContractProviders,
		contract_address: &str,
		wait: WaitConfig,
	) -> Result<Self, ContractError> {
		info!("Joining crowdfunding contract at {}", contract_address);
		if providers
			.public
			.query_public_state(contract_address)
			.await?
			.is_none()
		{
			return Err(ContractError::NotFound(contract_address.to_string()));
		}

		let private_state =
			load_or_create(providers.private.as_ref(), CROWDFUNDING_PRIVATE_STATE_ID).await?;
		Ok(Self::new(
			session,
			providers,
			contract_address.to_string(),
			private_state,
			wait,
		))
	}

	fn new(
		session: Arc<S>,
		providers: ContractProviders,
		contract_address: String,
		private_state: PrivateState,
		wait: WaitConfig,
	) -> Self {
		let projector = LedgerStateProjector::new(
			providers.public.clone(),
			providers.private.clone(),
			contract_address.clone(),
			CROWDFUNDING_PRIVATE_STATE_ID,
		);
		Self {
			session,
			providers,
			contract_address,
			private_state,
			feed: StateFeed::new(projector),
			wait,
		}
	}

	pub fn contract_address(&self) -> &str {
		&self.contract_address
	}

	/// Shared feed of the contract's derived state.
	pub fn state(&self) -> &StateFeed {
		&self.feed
	}

	/// A fresh native-token coin worth `amount`.
	pub fn coin(&self, amount: u128) -> CoinInfo {
		CoinInfo {
			nonce: random_bytes(32),
			color: native_token_color(),
			value: amount,
		}
	}

	pub async fn create_project(
		&self,
		project_id: &str,
		title: &str,
		desc: &str,
		coin_type: &str,
		duration: u64,
		contribution_goal: u128,
	) -> Result<CallOutcome, ContractError> {
		info!("Creating project with id {}", project_id);
		let creation_date = u64::try_from(chrono::Utc::now().timestamp_millis())
			.map_err(|e| ContractError::InvalidArgument(format!("clock before epoch: {}", e)))?;
		self.execute(CircuitCall::CreateProject {
			project_id: project_id_bytes(project_id)?,
			contribution_goal,
			duration,
			coin_type: hex_bytes("coin type", coin_type)?,
			creation_date,
			title: title.to_string(),
			desc: desc.to_string(),
		})
		.await
	}

	pub async fn contribute_project(&self, project_id: &str, amount: u128) -> Result<CallOutcome, ContractError> {
		info!("Contributing {} to project with id {}", amount, project_id);
		self.execute(CircuitCall::ContributeProject {
			coin: self.coin(amount),
			project_id: project_id_bytes(project_id)?,
		})
		.await
	}

	pub async fn end_project(&self, project_id: &str) -> Result<CallOutcome, ContractError> {
		info!("Ending project with id {}", project_id);
		self.execute(CircuitCall::EndProject {
			project_id: project_id_bytes(project_id)?,
		})
		.await
	}

	pub async fn cancel_project(&self, project_id: &str) -> Result<CallOutcome, ContractError> {
		info!("Cancelling project with id {}", project_id);
		self.execute(CircuitCall::CancelProject {
			project_id: project_id_bytes(project_id)?,
		})
		.await
	}

	pub async fn request_refund(
		&self,
		project_id: &str,
		refund_amount: u128,
		amount_deposited: u128,
	) -> Result<CallOutcome, ContractError> {
		info!(
			"Refunding {} of assets deposited to project with id {}",
			refund_amount, project_id
		);
		self.execute(CircuitCall::RequestRefund {
			project_id: project_id_bytes(project_id)?,
			refund_amount,
			amount_deposited,
		})
		.await
	}

	pub async fn update_project(
		&self,
		project_id: &str,
		title: &str,
		desc: &str,
		contribution_goal: u128,
		duration: u64,
	) -> Result<CallOutcome, ContractError> {
		info!("Updating project with id {}", project_id);
		self.execute(CircuitCall::UpdateProject {
			project_id: project_id_bytes(project_id)?,
			title: title.to_string(),
			desc: desc.to_string(),
			contribution_goal,
			duration,
		})
		.await
	}

	pub async fn withdraw_project_funds(&self, project_id: &str) -> Result<CallOutcome, ContractError> {
		info!("Withdrawing funds from project with id {}", project_id);
		self.execute(CircuitCall::WithdrawProjectFunds {
			project_id: project_id_bytes(project_id)?,
		})
		.await
	}

	async fn execute(&self, call: CircuitCall) -> Result<CallOutcome, ContractError> {
		let circuit = call.name();
		let unproven = self
			.providers
			.executor
			.call(&self.contract_address, &call, &self.private_state)
			.await?;

		let proven = self.session.prove_transaction(unproven).await?;
		let tx_id = self.session.submit_transaction(proven).await?;
		debug!("Circuit {} submitted in transaction {}", circuit, tx_id);

		let synced = wait_for_sync_after_operation(self.session.as_ref(), &self.wait).await;
		Ok(CallOutcome {
			circuit,
			tx_id,
			synced,
		})
	}
}

fn native_token_color() -> Vec<u8> {
	// NATIVE_TOKEN is a compile-time hex constant.
	hex::decode(NATIVE_TOKEN).unwrap_or_default()
}

fn hex_bytes(what: &str, value: &str) -> Result<Vec<u8>, ContractError> {
	let bytes = hex::decode(value.trim_start_matches("0x"))
		.map_err(|e| ContractError::InvalidArgument(format!("{} {:?} is not hex: {}", what, value, e)))?;
	if bytes.is_empty() {
		return Err(ContractError::InvalidArgument(format!("{} is empty", what)));
	}
	Ok(bytes)
}

fn project_id_bytes(project_id: &str) -> Result<Vec<u8>, ContractError> {
	hex_bytes("project id", project_id)
}
