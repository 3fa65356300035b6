//! Session synchronization and recovery
//!
//! - `continuity`: detects chain resets between a snapshot and the live chain.
//! - `wait`: throttled, policy-bounded waits on a session's state stream.
//! - `recovery`: the startup restore-or-rebuild controller.
//! - `progress_tracker`: turns indexer events into sync progress.
//! - `repositories`: snapshot persistence.

pub mod continuity;
pub mod progress_tracker;
pub mod recovery;
pub mod repositories;
pub mod wait;

pub use continuity::{Continuity, check_continuity, is_reset};
pub use recovery::{
	FreshReason, RecoveredSession, RecoveryPath, RecoveryState, SessionRecoveryController,
};
pub use repositories::{FileSnapshotStore, MemorySnapshotStore, SnapshotKey, SnapshotStore};
pub use wait::{
	BoundedWait, WaitOutcome, WaitPolicy, announce_and_wait_for_funds, throttle, wait_for_funds,
	wait_for_sync, wait_for_sync_after_operation, wait_for_sync_progress, wait_for_token_balance,
};
