//! Wallet sessions: the live handle to an account's view of the chain.
//!
//! A [`Session`] is the progress source the rest of the crate is built on. It publishes
//! [`SessionState`]s, can be serialized into a snapshot and later restored through a
//! [`SessionBuilder`], and passes transaction operations through to the key-holding wallet,
//! the proof server and the node.

pub mod indexer_session;
pub mod memory;
pub mod publisher;
pub mod snapshot;
pub mod sync;
pub mod types;

pub use indexer_session::{IndexerSession, IndexerSessionBuilder};
pub use sync::*;
pub use types::*;

use futures::stream::BoxStream;
use rand::Rng;

/// Capability set of a chain-connected wallet session.
///
/// The recovery and projection logic only uses `start`, `state`, `close` and
/// `serialize_state`; the transaction operations are exposed for callers.
#[async_trait::async_trait]
pub trait Session: Send + Sync {
	/// Begin following the chain. States published before this reflect restored data only.
	async fn start(&self) -> Result<(), SessionError>;

	/// Stream of states, starting with the current one. Ends when the session is closed.
	fn state(&self) -> BoxStream<'static, SessionState>;

	/// Stop following the chain and end all state streams.
	async fn close(&self) -> Result<(), SessionError>;

	/// Opaque snapshot bytes. Must be a JSON object carrying the session's `offset`.
	async fn serialize_state(&self) -> Result<Vec<u8>, SessionError>;

	async fn transfer_transaction(
		&self,
		transfers: Vec<TokenTransfer>,
	) -> Result<UnprovenTransaction, SessionError>;

	async fn prove_transaction(
		&self,
		recipe: UnprovenTransaction,
	) -> Result<ProvenTransaction, SessionError>;

	async fn submit_transaction(
		&self,
		transaction: ProvenTransaction,
	) -> Result<TransactionId, SessionError>;
}

/// Creates sessions, either from scratch or from a previously serialized snapshot.
#[async_trait::async_trait]
pub trait SessionBuilder: Send + Sync {
	type Session: Session + 'static;

	/// Build a brand-new session that syncs from genesis.
	async fn build(&self, seed: &WalletSeed) -> Result<Self::Session, SessionError>;

	/// Rebuild a session from snapshot bytes produced by `serialize_state`.
	async fn restore(&self, seed: &WalletSeed, snapshot: &[u8]) -> Result<Self::Session, SessionError>;
}

pub fn generate_random_seed() -> WalletSeed {
	let mut seed = [0u8; 32];
	rand::rng().fill(&mut seed);
	WalletSeed(seed)
}
