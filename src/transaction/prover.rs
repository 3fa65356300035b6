//!
//! Remote proof server integration.
//!
//! Unproven transactions are posted to the proof server's `prove-tx` endpoint; the response
//! body is the proven transaction.

use crate::wallet::{ProvenTransaction, SessionError, UnprovenTransaction};

use async_trait::async_trait;
use backoff::{ExponentialBackoff, future::retry};
use std::time::Duration;
use tracing::{debug, warn};

/// Turns an unproven transaction into a proven one.
#[async_trait]
pub trait TransactionProver: Send + Sync {
	async fn prove(&self, tx: UnprovenTransaction) -> Result<ProvenTransaction, SessionError>;
}

/// Remote proof server client for generating zero-knowledge proofs
pub struct RemoteProofServer {
	url: reqwest::Url,
	client: reqwest::Client,
	max_elapsed_time: Duration,
}

impl RemoteProofServer {
	/// Creates a new remote proof server client
	pub fn new(url: &str) -> Result<Self, SessionError> {
		let url = reqwest::Url::parse(url)
			.and_then(|base| base.join("prove-tx"))
			.map_err(|e| SessionError::Prover(format!("Invalid proof server URL {}: {}", url, e)))?;
		let client = reqwest::ClientBuilder::new()
			.pool_idle_timeout(None)
			.build()
			.map_err(|e| SessionError::Prover(format!("Failed to build HTTP client: {}", e)))?;

		Ok(Self {
			url,
			client,
			max_elapsed_time: Duration::from_secs(300),
		})
	}

	/// Stop retrying after `max_elapsed_time`.
	pub fn with_max_elapsed_time(mut self, max_elapsed_time: Duration) -> Self {
		self.max_elapsed_time = max_elapsed_time;
		self
	}
}

#[async_trait]
impl TransactionProver for RemoteProofServer {
	async fn prove(&self, tx: UnprovenTransaction) -> Result<ProvenTransaction, SessionError> {
		let policy = ExponentialBackoff {
			max_elapsed_time: Some(self.max_elapsed_time),
			..ExponentialBackoff::default()
		};

		let response_bytes = retry(policy, || async {
			let resp = self
				.client
				.post(self.url.clone())
				.body(tx.0.clone())
				.send()
				.await
				.map_err(|e| {
					warn!("Proof Server Send Error: {:?}", e);
					backoff::Error::transient(e.to_string())
				})?;

			let status = resp.status();
			let resp_bytes = resp.bytes().await.map_err(|e| {
				warn!("Proof Server to Bytes Error: {:?}", e);
				backoff::Error::transient(e.to_string())
			})?;

			if status.is_client_error() {
				return Err(backoff::Error::permanent(format!(
					"proof server rejected the transaction ({}): {}",
					status,
					String::from_utf8_lossy(&resp_bytes)
				)));
			}
			if !status.is_success() {
				warn!("Proof Server Response Error: {}", status);
				return Err(backoff::Error::transient(format!("proof server returned {}", status)));
			}

			Ok::<Vec<u8>, backoff::Error<String>>(resp_bytes.to_vec())
		})
		.await
		.map_err(SessionError::Prover)?;

		if response_bytes.is_empty() {
			return Err(SessionError::Prover(
				"Proof server returned empty response".to_string(),
			));
		}

		debug!("Received proven transaction ({} bytes)", response_bytes.len());
		Ok(ProvenTransaction(response_bytes))
	}
}
