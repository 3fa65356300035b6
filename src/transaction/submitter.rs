//!
//! Transaction submission to a Midnight node over JSON-RPC.

use crate::wallet::{ProvenTransaction, SessionError, TransactionId};

use async_trait::async_trait;
use serde::Deserialize;
use tracing::{debug, error, info};

/// Hands a proven transaction to the network.
#[async_trait]
pub trait TransactionSubmitter: Send + Sync {
	async fn submit(&self, tx: ProvenTransaction) -> Result<TransactionId, SessionError>;
}

pub const SUBMIT_METHOD: &str = "author_submitExtrinsic";

#[derive(Debug, Deserialize)]
struct RpcResponse {
	result: Option<String>,
	error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
struct RpcError {
	code: i64,
	message: String,
}

/// Submits transactions through the node's JSON-RPC endpoint
pub struct NodeSubmitter {
	url: reqwest::Url,
	client: reqwest::Client,
}

impl NodeSubmitter {
	pub fn new(node_url: &str) -> Result<Self, SessionError> {
		let url = reqwest::Url::parse(node_url)
			.map_err(|e| SessionError::Submission(format!("Invalid node URL {}: {}", node_url, e)))?;
		Ok(Self {
			url,
			client: reqwest::Client::new(),
		})
	}
}

#[async_trait]
impl TransactionSubmitter for NodeSubmitter {
	async fn submit(&self, tx: ProvenTransaction) -> Result<TransactionId, SessionError> {
		let request = serde_json::json!({
			"jsonrpc": "2.0",
			"id": 1,
			"method": SUBMIT_METHOD,
			"params": [format!("0x{}", hex::encode(&tx.0))],
		});

		debug!("SENDING {} bytes to {}", tx.0.len(), self.url);
		let response = self
			.client
			.post(self.url.clone())
			.json(&request)
			.send()
			.await
			.map_err(|e| SessionError::Submission(format!("Failed to reach node: {}", e)))?
			.error_for_status()
			.map_err(|e| SessionError::Submission(e.to_string()))?
			.json::<RpcResponse>()
			.await
			.map_err(|e| SessionError::Submission(format!("Invalid node response: {}", e)))?;

		if let Some(err) = response.error {
			error!("Transaction validation failed: {} ({})", err.message, err.code);
			return Err(SessionError::Submission(format!(
				"node rejected transaction: {} ({})",
				err.message, err.code
			)));
		}

		let tx_hash = response
			.result
			.ok_or_else(|| SessionError::Submission("node returned no result".to_string()))?;
		info!("Transaction {} submitted", tx_hash);
		Ok(TransactionId(tx_hash))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::transaction::testing::serve_once;

	#[tokio::test]
	async fn returns_the_hash_reported_by_the_node() {
		let (base, request) =
			serve_once("200 OK", br#"{"jsonrpc":"2.0","id":1,"result":"0xabc"}"#.to_vec()).await;
		let submitter = NodeSubmitter::new(&base).unwrap();

		let id = submitter.submit(ProvenTransaction(vec![0xde, 0xad])).await.unwrap();
		assert_eq!(id, TransactionId("0xabc".to_string()));

		let request = request.await.unwrap();
		assert!(request.contains(SUBMIT_METHOD));
		assert!(request.contains("0xdead"));
	}

	#[tokio::test]
	async fn rpc_errors_are_submission_errors() {
		let body = br#"{"jsonrpc":"2.0","id":1,"error":{"code":1010,"message":"Invalid Transaction"}}"#;
		let (base, _) = serve_once("200 OK", body.to_vec()).await;
		let submitter = NodeSubmitter::new(&base).unwrap();

		match submitter.submit(ProvenTransaction(vec![1])).await {
			Err(SessionError::Submission(message)) => assert!(message.contains("Invalid Transaction")),
			other => panic!("unexpected result: {:?}", other),
		}
	}
}
