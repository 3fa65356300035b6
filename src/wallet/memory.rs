//! In-memory session double.
//!
//! Behaves like a chain-backed session without any network: restored sessions report a
//! configurable live offset when started, fresh ones start at offset zero, and tests drive
//! further progress through [`SessionHandle`].

use crate::wallet::publisher::StatePublisher;
use crate::wallet::snapshot::SessionSnapshot;
use crate::wallet::{
	ProvenTransaction, Session, SessionBuilder, SessionError, SessionState, SyncProgress, TokenTransfer,
	TokenType, TransactionId, UnprovenTransaction, WalletSeed,
};

use futures::stream::BoxStream;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tracing::debug;

/// What the simulated remote chain looks like to sessions built by [`InMemorySessionBuilder`].
#[derive(Debug, Clone)]
pub struct SimulatedChain {
	pub address: String,
	/// Offset a restored session reports once started.
	pub live_offset: u64,
	/// Whether a restored session reports itself synced once started.
	pub restored_synced: bool,
	pub restored_start: RestoredStart,
	/// Balances a fresh session discovers on start.
	pub funds: BTreeMap<TokenType, u128>,
}

impl Default for SimulatedChain {
	fn default() -> Self {
		Self {
			address: "mn_shield-addr_undeployed1memory".to_string(),
			live_offset: 0,
			restored_synced: true,
			restored_start: RestoredStart::default(),
			funds: BTreeMap::new(),
		}
	}
}

/// What a restored session publishes once started.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RestoredStart {
	/// Sync progress, synced or behind per [`SimulatedChain::restored_synced`].
	#[default]
	Progress,
	/// The live offset but never any sync progress.
	Silent,
	/// The live offset without sync progress, then the state stream ends.
	Closes,
}

/// Push-side handle onto a session's progress source.
#[derive(Clone)]
pub struct SessionHandle {
	publisher: Arc<StatePublisher>,
}

impl SessionHandle {
	pub fn push(&self, state: SessionState) -> bool {
		self.publisher.update(|current| *current = state)
	}

	pub fn update(&self, update: impl FnOnce(&mut SessionState)) -> bool {
		self.publisher.update(update)
	}

	/// Advance to `offset` and report fully synced.
	pub fn mark_synced(&self, offset: u64) -> bool {
		self.publisher.update(|state| {
			state.offset = state.offset.max(offset);
			state.sync_progress = Some(SyncProgress::synced());
		})
	}

	pub fn current(&self) -> SessionState {
		self.publisher.current()
	}

	pub fn is_closed(&self) -> bool {
		self.publisher.is_closed()
	}
}

pub struct InMemorySession {
	publisher: Arc<StatePublisher>,
	on_start: SessionState,
	close_on_start: bool,
	submitted: Mutex<Vec<ProvenTransaction>>,
}

impl InMemorySession {
	pub fn new(initial: SessionState, on_start: SessionState) -> Self {
		Self {
			publisher: Arc::new(StatePublisher::new(initial)),
			on_start,
			close_on_start: false,
			submitted: Mutex::new(Vec::new()),
		}
	}

	/// End the state stream right after publishing the started state.
	pub fn closing_on_start(mut self) -> Self {
		self.close_on_start = true;
		self
	}

	pub fn handle(&self) -> SessionHandle {
		SessionHandle {
			publisher: self.publisher.clone(),
		}
	}

	pub fn submitted(&self) -> Vec<ProvenTransaction> {
		self.submitted
			.lock()
			.expect("submitted transactions lock poisoned")
			.clone()
	}

	fn ensure_open(&self) -> Result<(), SessionError> {
		if self.publisher.is_closed() {
			return Err(SessionError::Closed);
		}
		Ok(())
	}
}

#[async_trait::async_trait]
impl Session for InMemorySession {
	async fn start(&self) -> Result<(), SessionError> {
		let on_start = self.on_start.clone();
		if !self.publisher.update(|state| *state = on_start) {
			return Err(SessionError::Closed);
		}
		if self.close_on_start {
			self.publisher.close();
		}
		Ok(())
	}

	fn state(&self) -> BoxStream<'static, SessionState> {
		self.publisher.stream()
	}

	async fn close(&self) -> Result<(), SessionError> {
		self.publisher.close();
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
		if transfers.is_empty() || transfers.iter().any(|t| t.amount == 0) {
			return Err(SessionError::InvalidTransfer(
				"transfers must be non-empty with positive amounts".to_string(),
			));
		}
		let body = serde_json::to_vec(&transfers)
			.map_err(|e| SessionError::InvalidTransfer(e.to_string()))?;
		Ok(UnprovenTransaction(body))
	}

	async fn prove_transaction(
		&self,
		recipe: UnprovenTransaction,
	) -> Result<ProvenTransaction, SessionError> {
		self.ensure_open()?;
		Ok(ProvenTransaction(recipe.0))
	}

	async fn submit_transaction(
		&self,
		transaction: ProvenTransaction,
	) -> Result<TransactionId, SessionError> {
		self.ensure_open()?;
		let mut submitted = self
			.submitted
			.lock()
			.expect("submitted transactions lock poisoned");
		submitted.push(transaction);
		Ok(TransactionId(format!("memory-tx-{}", submitted.len())))
	}
}

/// Builds [`InMemorySession`]s against a [`SimulatedChain`] and records what it built.
pub struct InMemorySessionBuilder {
	chain: SimulatedChain,
	fail_fresh_build: bool,
	builds: AtomicUsize,
	restores: AtomicUsize,
	handles: Mutex<Vec<SessionHandle>>,
}

impl InMemorySessionBuilder {
	pub fn new(chain: SimulatedChain) -> Self {
		Self {
			chain,
			fail_fresh_build: false,
			builds: AtomicUsize::new(0),
			restores: AtomicUsize::new(0),
			handles: Mutex::new(Vec::new()),
		}
	}

	/// Make every fresh build fail, for exercising the propagated error path.
	pub fn failing_fresh_builds(mut self) -> Self {
		self.fail_fresh_build = true;
		self
	}

	pub fn builds(&self) -> usize {
		self.builds.load(Ordering::SeqCst)
	}

	pub fn restores(&self) -> usize {
		self.restores.load(Ordering::SeqCst)
	}

	/// Handles of every session built so far, in build order.
	pub fn handles(&self) -> Vec<SessionHandle> {
		self.handles.lock().expect("handles lock poisoned").clone()
	}

	fn track(&self, session: InMemorySession) -> InMemorySession {
		self.handles
			.lock()
			.expect("handles lock poisoned")
			.push(session.handle());
		session
	}
}

#[async_trait::async_trait]
impl SessionBuilder for InMemorySessionBuilder {
	type Session = InMemorySession;

	async fn build(&self, seed: &WalletSeed) -> Result<Self::Session, SessionError> {
		self.builds.fetch_add(1, Ordering::SeqCst);
		if self.fail_fresh_build {
			return Err(SessionError::Build("simulated build failure".to_string()));
		}
		debug!("Building in-memory session for {:?}", seed);

		let initial = SessionState {
			address: self.chain.address.clone(),
			..Default::default()
		};
		let on_start = SessionState {
			address: self.chain.address.clone(),
			balances: self.chain.funds.clone(),
			sync_progress: Some(SyncProgress::behind(self.chain.live_offset, 0)),
			offset: 0,
			transaction_history: Vec::new(),
		};
		Ok(self.track(InMemorySession::new(initial, on_start)))
	}

	async fn restore(&self, seed: &WalletSeed, snapshot: &[u8]) -> Result<Self::Session, SessionError> {
		self.restores.fetch_add(1, Ordering::SeqCst);
		debug!("Restoring in-memory session for {:?}", seed);

		let initial = SessionSnapshot::from_bytes(snapshot)?.into_state();
		let sync_progress = match self.chain.restored_start {
			RestoredStart::Progress if self.chain.restored_synced => Some(SyncProgress::synced()),
			RestoredStart::Progress => Some(SyncProgress::behind(1, 0)),
			RestoredStart::Silent | RestoredStart::Closes => None,
		};
		let on_start = SessionState {
			offset: self.chain.live_offset,
			sync_progress,
			..initial.clone()
		};
		let session = InMemorySession::new(initial, on_start);
		let session = match self.chain.restored_start {
			RestoredStart::Closes => session.closing_on_start(),
			_ => session,
		};
		Ok(self.track(session))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use futures::StreamExt;

	fn seed() -> WalletSeed {
		WalletSeed([7u8; 32])
	}

	#[tokio::test]
	async fn restored_session_reports_live_offset_after_start() {
		let builder = InMemorySessionBuilder::new(SimulatedChain {
			live_offset: 120,
			..Default::default()
		});
		let blob = br#"{"version":1,"offset":118,"address":"a","saved_at":""}"#;
		let session = builder.restore(&seed(), blob).await.unwrap();

		assert_eq!(session.state().next().await.unwrap().offset, 118);
		session.start().await.unwrap();
		let live = session.state().next().await.unwrap();
		assert_eq!(live.offset, 120);
		assert!(live.is_synced());
		assert_eq!(builder.restores(), 1);
	}

	#[tokio::test]
	async fn transactions_are_refused_after_close() {
		let builder = InMemorySessionBuilder::new(SimulatedChain::default());
		let session = builder.build(&seed()).await.unwrap();
		session.close().await.unwrap();

		let result = session
			.transfer_transaction(vec![TokenTransfer {
				amount: 1,
				receiver_address: "mn_shield-addr_test1x".to_string(),
				token_type: "02".to_string(),
			}])
			.await;
		assert!(matches!(result, Err(SessionError::Closed)));
		assert!(builder.handles()[0].is_closed());
	}
}
