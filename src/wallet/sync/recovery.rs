//! Restore-or-rebuild decision made on every startup.
//!
//! The controller tries the persisted snapshot first and falls back to a fresh session from
//! the seed. Only the fresh build can fail the startup; every problem on the restore path is
//! logged and turned into a fallback.

use crate::config::WaitConfig;
use crate::wallet::snapshot::recorded_offset;
use crate::wallet::sync::continuity::{Continuity, check_continuity};
use crate::wallet::sync::repositories::{SnapshotKey, SnapshotStore};
use crate::wallet::sync::wait::{WaitPolicy, wait_for_sync, wait_for_sync_progress};
use crate::wallet::{RecoveryError, Session, SessionBuilder, WalletSeed};

use std::fmt;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// States the controller moves through. Every run ends in `LiveSession`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryState {
	NoSnapshot,
	SnapshotFound,
	ContinuityValid,
	ContinuityBroken,
	LiveSession,
}

/// Why the session was built from scratch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FreshReason {
	PersistenceDisabled,
	NoSnapshot,
	RestoreFailed(String),
	ChainReset { restored: u64, live: u64 },
}

impl fmt::Display for FreshReason {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			FreshReason::PersistenceDisabled => f.write_str("snapshot persistence is disabled"),
			FreshReason::NoSnapshot => f.write_str("no snapshot was found"),
			FreshReason::RestoreFailed(cause) => write!(f, "restore failed: {}", cause),
			FreshReason::ChainReset { restored, live } => write!(
				f,
				"chain was reset (snapshot offset {}, live offset {})",
				restored, live
			),
		}
	}
}

/// How the live session came to be.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryPath {
	Fresh(FreshReason),
	Restored {
		recorded_offset: u64,
		live_offset: u64,
		/// Whether the restored session synced within the restore window.
		synced: bool,
	},
}

impl RecoveryPath {
	pub fn is_restored(&self) -> bool {
		matches!(self, RecoveryPath::Restored { .. })
	}
}

/// A started session handed over to its long-lived owner.
pub struct RecoveredSession<S> {
	pub session: S,
	pub path: RecoveryPath,
	/// States visited, in order.
	pub trail: Vec<RecoveryState>,
}

enum Attempt<S> {
	Ready(S, RecoveryPath),
	Continue(FreshReason),
}

pub struct SessionRecoveryController<B: SessionBuilder> {
	builder: Arc<B>,
	store: Option<Arc<dyn SnapshotStore>>,
	key: SnapshotKey,
	wait: WaitConfig,
}

impl<B: SessionBuilder> SessionRecoveryController<B> {
	/// `store` is `None` when persistence is disabled; every startup then builds fresh.
	pub fn new(
		builder: Arc<B>,
		store: Option<Arc<dyn SnapshotStore>>,
		seed: WalletSeed,
		filename: Option<&str>,
		wait: WaitConfig,
	) -> Self {
		Self {
			builder,
			store,
			key: SnapshotKey::new(seed, filename),
			wait,
		}
	}

	pub fn key(&self) -> &SnapshotKey {
		&self.key
	}

	pub async fn recover(&self) -> Result<RecoveredSession<B::Session>, RecoveryError> {
		let mut trail = Vec::new();

		let reason = match self.try_restore(&mut trail).await {
			Attempt::Ready(session, path) => {
				trail.push(RecoveryState::LiveSession);
				return Ok(RecoveredSession {
					session,
					path,
					trail,
				});
			}
			Attempt::Continue(reason) => reason,
		};

		// Last attempt: no further fallback.
		info!("Building wallet from scratch: {}", reason);
		let session = self
			.builder
			.build(&self.key.seed)
			.await
			.map_err(RecoveryError::FreshBuild)?;
		session.start().await.map_err(RecoveryError::FreshBuild)?;

		trail.push(RecoveryState::LiveSession);
		Ok(RecoveredSession {
			session,
			path: RecoveryPath::Fresh(reason),
			trail,
		})
	}

	async fn try_restore(&self, trail: &mut Vec<RecoveryState>) -> Attempt<B::Session> {
		let Some(store) = &self.store else {
			info!("File path for save file not configured");
			trail.push(RecoveryState::NoSnapshot);
			return Attempt::Continue(FreshReason::PersistenceDisabled);
		};

		let blob = match store.load(&self.key).await {
			Ok(Some(blob)) => blob,
			Ok(None) => {
				info!("Wallet save file {} not found", self.key.file_name());
				trail.push(RecoveryState::NoSnapshot);
				return Attempt::Continue(FreshReason::NoSnapshot);
			}
			Err(e) => {
				warn!("Failed to read wallet save file {}: {}", self.key.file_name(), e);
				trail.push(RecoveryState::NoSnapshot);
				return Attempt::Continue(FreshReason::RestoreFailed(e.to_string()));
			}
		};
		trail.push(RecoveryState::SnapshotFound);
		info!("Attempting to restore state from {}", self.key.file_name());

		let restored = match recorded_offset(&blob) {
			Ok(offset) => offset,
			Err(e) => return restore_failed(e),
		};
		let session = match self.builder.restore(&self.key.seed, &blob).await {
			Ok(session) => session,
			Err(e) => return restore_failed(e),
		};

		match self.verify(&session, restored, trail).await {
			Ok(path) => Attempt::Ready(session, path),
			Err(reason) => {
				if let Err(e) = session.close().await {
					warn!("Failed to close discarded session: {}", e);
				}
				Attempt::Continue(reason)
			}
		}
	}

	/// Check a restored session against the live chain, then give it a bounded chance to sync.
	async fn verify(
		&self,
		session: &B::Session,
		restored: u64,
		trail: &mut Vec<RecoveryState>,
	) -> Result<RecoveryPath, FreshReason> {
		session
			.start()
			.await
			.map_err(|e| FreshReason::RestoreFailed(e.to_string()))?;

		let first = wait_for_sync_progress(
			session,
			self.wait.sync_interval,
			WaitPolicy::Bounded(self.wait.restore_first_state_timeout),
		)
		.await
		.into_result("sync progress")
		.map_err(|e| FreshReason::RestoreFailed(e.to_string()))?;

		info!(
			"Your offset is: {} restored offset: {}",
			first.offset, restored
		);
		match check_continuity(restored, first.offset) {
			Continuity::Broken { restored, live } => {
				trail.push(RecoveryState::ContinuityBroken);
				warn!("The chain was reset, building wallet from scratch");
				return Err(FreshReason::ChainReset { restored, live });
			}
			Continuity::Valid { .. } => trail.push(RecoveryState::ContinuityValid),
		}

		let synced = wait_for_sync(
			session,
			self.wait.sync_interval,
			WaitPolicy::Bounded(self.wait.restore_sync_timeout),
		)
		.await;

		let synced = match synced.matched() {
			Some(state) => {
				info!("Wallet was able to sync from restored state at offset {}", state.offset);
				true
			}
			None => {
				warn!(
					"Wallet did not sync within {:?}, continuing with restored state",
					self.wait.restore_sync_timeout
				);
				false
			}
		};

		Ok(RecoveryPath::Restored {
			recorded_offset: restored,
			live_offset: first.offset,
			synced,
		})
	}

	/// Serialize `session` and save it under this controller's key.
	///
	/// Returns false without touching anything when persistence is disabled.
	pub async fn persist<S: Session + ?Sized>(&self, session: &S) -> Result<bool, RecoveryError> {
		let Some(store) = &self.store else {
			debug!("Snapshot persistence disabled, not saving session");
			return Ok(false);
		};

		let snapshot = session
			.serialize_state()
			.await
			.map_err(RecoveryError::Serialize)?;
		store.save(&self.key, &snapshot).await?;
		Ok(true)
	}
}

fn restore_failed<S>(error: impl fmt::Display) -> Attempt<S> {
	warn!(
		"Wallet was not able to restore using the stored state: {}",
		error
	);
	Attempt::Continue(FreshReason::RestoreFailed(error.to_string()))
}
