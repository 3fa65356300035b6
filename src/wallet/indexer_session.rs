//! Session backed by the indexer's wallet subscription.
//!
//! The session follows the `wallet` subscription for its viewing key. Viewing updates advance
//! the offset and extend the transaction history; progress updates feed the
//! [`SyncProgressTracker`] that decides the lag and the `synced` flag. The subscription is
//! reopened with exponential backoff whenever it drops or ends, resuming from the highest
//! applied index. Only transactions the chain applied enter the history.
//!
//! Balances are not derived from the chain here: decrypting coins needs the wallet's secret
//! keys. A session reports the balances it was restored with.

use crate::config::NetworkId;
use crate::indexer::{ApplyStage, MidnightIndexerClient, ViewingKeyFormat, WalletSyncEvent, ZswapChainStateUpdate};
use crate::transaction::address::validate_receiver;
use crate::transaction::{TransactionProver, TransactionSubmitter};
use crate::wallet::publisher::StatePublisher;
use crate::wallet::snapshot::SessionSnapshot;
use crate::wallet::sync::progress_tracker::{Frontier, SyncProgressTracker};
use crate::wallet::{
	ProvenTransaction, Session, SessionBuilder, SessionError, SessionState, TokenTransfer,
	TransactionId, TransactionRecord, UnprovenTransaction, WalletSeed,
};

use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, future::retry};
use futures::StreamExt;
use futures::stream::BoxStream;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Builds [`IndexerSession`]s sharing one indexer client, prover and submitter.
pub struct IndexerSessionBuilder {
	indexer: MidnightIndexerClient,
	viewing_key: ViewingKeyFormat,
	address: String,
	network: NetworkId,
	prover: Arc<dyn TransactionProver>,
	submitter: Arc<dyn TransactionSubmitter>,
}

impl IndexerSessionBuilder {
	pub fn new(
		indexer: MidnightIndexerClient,
		viewing_key: ViewingKeyFormat,
		address: String,
		network: NetworkId,
		prover: Arc<dyn TransactionProver>,
		submitter: Arc<dyn TransactionSubmitter>,
	) -> Self {
		Self {
			indexer,
			viewing_key,
			address,
			network,
			prover,
			submitter,
		}
	}

	fn session(&self, initial: SessionState) -> IndexerSession {
		IndexerSession {
			indexer: self.indexer.clone(),
			viewing_key: self.viewing_key.clone(),
			network: self.network,
			tracker: Arc::new(Mutex::new(SyncProgressTracker::new(initial.offset))),
			publisher: Arc::new(StatePublisher::new(initial)),
			follower: Mutex::new(None),
			prover: self.prover.clone(),
			submitter: self.submitter.clone(),
		}
	}
}

#[async_trait::async_trait]
impl SessionBuilder for IndexerSessionBuilder {
	type Session = IndexerSession;

	async fn build(&self, seed: &WalletSeed) -> Result<Self::Session, SessionError> {
		info!("Building session for {:?} from genesis", seed);
		Ok(self.session(SessionState {
			address: self.address.clone(),
			..Default::default()
		}))
	}

	async fn restore(&self, seed: &WalletSeed, snapshot: &[u8]) -> Result<Self::Session, SessionError> {
		let state = SessionSnapshot::from_bytes(snapshot)?.into_state();
		if state.address != self.address {
			return Err(SessionError::Build(format!(
				"snapshot belongs to {}, not {}",
				state.address, self.address
			)));
		}
		info!("Restoring session for {:?} at offset {}", seed, state.offset);
		Ok(self.session(state))
	}
}

pub struct IndexerSession {
	indexer: MidnightIndexerClient,
	viewing_key: ViewingKeyFormat,
	network: NetworkId,
	tracker: Arc<Mutex<SyncProgressTracker>>,
	publisher: Arc<StatePublisher>,
	follower: Mutex<Option<JoinHandle<()>>>,
	prover: Arc<dyn TransactionProver>,
	submitter: Arc<dyn TransactionSubmitter>,
}

impl IndexerSession {
	fn ensure_open(&self) -> Result<(), SessionError> {
		if self.publisher.is_closed() {
			return Err(SessionError::Closed);
		}
		Ok(())
	}
}

#[async_trait::async_trait]
impl Session for IndexerSession {
	async fn start(&self) -> Result<(), SessionError> {
		self.ensure_open()?;
		let mut follower = self.follower.lock().expect("follower lock poisoned");
		if follower.is_some() {
			return Ok(());
		}

		*follower = Some(tokio::spawn(follow(
			self.indexer.clone(),
			self.viewing_key.clone(),
			self.publisher.clone(),
			self.tracker.clone(),
		)));
		Ok(())
	}

	fn state(&self) -> BoxStream<'static, SessionState> {
		self.publisher.stream()
	}

	async fn close(&self) -> Result<(), SessionError> {
		if let Some(follower) = self.follower.lock().expect("follower lock poisoned").take() {
			follower.abort();
		}
		self.publisher.close();

		let stats = self.tracker.lock().expect("tracker lock poisoned").get_stats();
		info!("Session closed. {}", stats.summary());
		Ok(())
	}

	async fn serialize_state(&self) -> Result<Vec<u8>, SessionError> {
		Ok(SessionSnapshot::capture(&self.publisher.current()).to_bytes()?)
	}

	async fn transfer_transaction(
		&self,
		transfers: Vec<TokenTransfer>,
	) -> Result<UnprovenTransaction, SessionError> {
		self.ensure_open()?;
		if transfers.is_empty() {
			return Err(SessionError::InvalidTransfer("no transfers given".to_string()));
		}
		for transfer in &transfers {
			validate_receiver(&transfer.receiver_address, self.network)?;
			if transfer.amount == 0 {
				return Err(SessionError::InvalidTransfer(format!(
					"zero amount to {}",
					transfer.receiver_address
				)));
			}
		}

		let intent = serde_json::json!({
			"sender": self.publisher.current().address,
			"transfers": transfers,
		});
		let body = serde_json::to_vec(&intent)
			.map_err(|e| SessionError::InvalidTransfer(format!("Failed to encode transfer: {}", e)))?;
		Ok(UnprovenTransaction(body))
	}

	async fn prove_transaction(
		&self,
		recipe: UnprovenTransaction,
	) -> Result<ProvenTransaction, SessionError> {
		self.ensure_open()?;
		self.prover.prove(recipe).await
	}

	async fn submit_transaction(
		&self,
		transaction: ProvenTransaction,
	) -> Result<TransactionId, SessionError> {
		self.ensure_open()?;
		self.submitter.submit(transaction).await
	}
}

impl Drop for IndexerSession {
	fn drop(&mut self) {
		if let Ok(mut follower) = self.follower.lock() {
			if let Some(follower) = follower.take() {
				follower.abort();
			}
		}
	}
}

/// Follow the wallet subscription until the publisher closes, reconnecting on failure.
async fn follow(
	indexer: MidnightIndexerClient,
	viewing_key: ViewingKeyFormat,
	publisher: Arc<StatePublisher>,
	tracker: Arc<Mutex<SyncProgressTracker>>,
) {
	let policy = ExponentialBackoff {
		max_elapsed_time: None,
		..ExponentialBackoff::default()
	};
	let mut idle = policy.clone();

	while !publisher.is_closed() {
		let start_index = tracker
			.lock()
			.expect("tracker lock poisoned")
			.highest_applied_index();

		let subscribe = retry(policy.clone(), || async {
			let session_id = indexer.connect_wallet(&viewing_key).await.map_err(|e| {
				warn!("Failed to connect wallet session: {}", e);
				backoff::Error::transient(e)
			})?;
			indexer
				.subscribe_wallet(&session_id, Some(start_index), Some(true))
				.await
				.map_err(|e| {
					warn!("Failed to open wallet subscription: {}", e);
					backoff::Error::transient(e)
				})
		});

		let mut events = match subscribe.await {
			Ok(events) => events,
			Err(e) => {
				error!("Giving up on wallet subscription: {}", e);
				return;
			}
		};
		info!("Following wallet subscription from index {}", start_index);

		let mut received = false;
		while let Some(event) = events.next().await {
			match event {
				Ok(event) => {
					received = true;
					let mut tracker = tracker.lock().expect("tracker lock poisoned");
					if !publisher.update(|state| apply_event(state, &mut tracker, event)) {
						return;
					}
				}
				Err(e) => {
					warn!("Wallet subscription error: {}", e);
					break;
				}
			}
		}
		let delay = reconnect_delay(&mut idle, received);
		debug!("Wallet subscription ended, reconnecting in {:?}", delay);
		tokio::time::sleep(delay).await;
	}
}

/// Pause before reopening a subscription that ended. Grows while subscriptions keep ending
/// without delivering anything.
fn reconnect_delay(backoff: &mut ExponentialBackoff, received: bool) -> Duration {
	if received {
		backoff.reset();
	}
	backoff.next_backoff().unwrap_or(backoff.max_interval)
}

/// A settled transaction the chain did not apply. Pending ones may still succeed.
fn is_failed(stage: Option<&ApplyStage>) -> bool {
	stage.is_some_and(|stage| !matches!(stage, ApplyStage::Pending) && !stage.should_apply())
}

/// Fold one subscription event into the session state.
fn apply_event(state: &mut SessionState, tracker: &mut SyncProgressTracker, event: WalletSyncEvent) {
	match event {
		WalletSyncEvent::ViewingUpdate { index, update, .. } => {
			let records: Vec<TransactionRecord> = update
				.into_iter()
				.filter_map(|update| match update {
					ZswapChainStateUpdate::RelevantTransaction { transaction, .. } => {
						Some(TransactionRecord {
							hash: transaction.hash,
							index,
							apply_stage: transaction.apply_stage,
							identifiers: transaction.identifiers.unwrap_or_default(),
						})
					}
					ZswapChainStateUpdate::MerkleTreeCollapsedUpdate { .. } => None,
				})
				.collect();

			tracker.record_viewing_update(index, records.len());
			state.offset = state.offset.max(index);
			for record in records {
				let known = state
					.transaction_history
					.iter()
					.position(|existing| existing.hash == record.hash);
				match (known, is_failed(record.apply_stage.as_ref())) {
					(Some(at), true) => {
						state.transaction_history.remove(at);
					}
					(Some(at), false) => state.transaction_history[at].apply_stage = record.apply_stage,
					(None, true) => debug!("Skipping failed transaction {}", record.hash),
					(None, false) => state.transaction_history.push(record),
				}
			}
		}
		WalletSyncEvent::ProgressUpdate {
			highest_index,
			highest_relevant_index,
			highest_relevant_wallet_index,
			..
		} => {
			tracker.record_frontier(Frontier {
				highest_index,
				highest_relevant_index,
				highest_relevant_wallet_index,
			});
		}
	}

	if let Some(progress) = tracker.progress() {
		state.sync_progress = Some(progress);
	}
	tracker.log_progress(false);
}
