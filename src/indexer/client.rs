//! GraphQL client for the Midnight indexer with session management.
//!
//! This module provides an async client for interacting with the Midnight GraphQL indexer.
//! It supports wallet session management, real-time subscriptions to wallet events and
//! contract actions, and GraphQL query execution. All methods are async and designed for use
//! with Tokio.

use super::types::*;
use futures_util::{SinkExt, StreamExt};
use reqwest::Client;
use serde_json::json;
use std::pin::Pin;
use std::time::Duration;
use tokio_tungstenite::{
	connect_async,
	tungstenite::{Message, client::IntoClientRequest},
};
use tracing::{debug, error, info};

/// Boxed stream of subscription items.
pub type IndexerStream<T> = Pin<Box<dyn futures_util::Stream<Item = Result<T, IndexerError>> + Send>>;

/// Midnight GraphQL indexer client
#[derive(Clone)]
pub struct MidnightIndexerClient {
	/// The underlying HTTP client for GraphQL queries.
	http_client: Client,
	/// The base URL for the indexer GraphQL HTTP endpoint.
	indexer_url: String,
	/// The WebSocket URL for real-time subscriptions.
	ws_url: String,
}

impl MidnightIndexerClient {
	/// Create a new indexer client.
	///
	/// # Arguments
	/// * `indexer_url` - The HTTP endpoint for GraphQL queries.
	/// * `ws_url` - The WebSocket endpoint for subscriptions.
	pub fn new(indexer_url: String, ws_url: String) -> Result<Self, IndexerError> {
		let http_client = Client::builder()
			.timeout(Duration::from_secs(30))
			.build()?;

		Ok(Self {
			http_client,
			indexer_url,
			ws_url,
		})
	}

	/// Establish wallet session with viewing key.
	///
	/// # Returns
	/// The session ID as a string, or an `IndexerError` if the connection fails.
	pub async fn connect_wallet(
		&self,
		viewing_key: &ViewingKeyFormat,
	) -> Result<String, IndexerError> {
		debug!("Connecting wallet session");

		let query = r#"
            mutation ConnectWallet($viewingKey: ViewingKey!) {
                connect(viewingKey: $viewingKey)
            }
        "#;

		let variables = json!({
			"viewingKey": viewing_key.as_str()
		});

		let response = self.execute_query(query, Some(variables)).await?;

		let session_id = response
			.get("data")
			.and_then(|data| data.get("connect"))
			.and_then(|connect| connect.as_str())
			.ok_or(IndexerError::NoData)?
			.to_string();

		info!("Connected wallet with session ID: {}", session_id);
		Ok(session_id)
	}

	/// Subscribe to wallet updates using session ID.
	///
	/// # Arguments
	/// * `session_id` - The wallet session ID.
	/// * `start_index` - Optional starting chain index for the subscription.
	/// * `send_progress_updates` - Whether to include progress updates in the stream.
	///
	/// # Errors
	/// Returns `IndexerError` if the WebSocket connection or subscription fails.
	pub async fn subscribe_wallet(
		&self,
		session_id: &str,
		start_index: Option<u64>,
		send_progress_updates: Option<bool>,
	) -> Result<IndexerStream<WalletSyncEvent>, IndexerError> {
		let subscription_query = format!(
			r#"
            subscription WalletSync {{
                wallet(sessionId: "{}", index: {}, sendProgressUpdates: {}) {{
                    __typename
                    ... on ViewingUpdate {{
                        index
                        update {{
                            __typename
                            ... on RelevantTransaction {{
                                transaction {{
                                    hash
                                    applyStage
                                    raw
                                    identifiers
                                    merkleTreeRoot
                                    protocolVersion
                                }}
                                start
                                end
                            }}
                            ... on MerkleTreeCollapsedUpdate {{
                                protocolVersion
                                start
                                end
                                update
                            }}
                        }}
                    }}
                    ... on ProgressUpdate {{
                        highestIndex
                        highestRelevantIndex
                        highestRelevantWalletIndex
                    }}
                }}
            }}
            "#,
			session_id,
			start_index.unwrap_or(0),
			send_progress_updates.unwrap_or(true)
		);

		self.open_subscription("wallet-sync", "wallet", subscription_query)
			.await
	}

	/// Fetch the latest action recorded for a contract, if the contract exists.
	pub async fn query_contract_state(
		&self,
		contract_address: &str,
	) -> Result<Option<ContractActionData>, IndexerError> {
		let query = r#"
            query ContractState($address: HexEncoded!) {
                contractAction(address: $address) {
                    __typename
                    state
                    transaction {
                        block {
                            height
                        }
                    }
                }
            }
        "#;

		let response = self
			.execute_query(query, Some(json!({ "address": contract_address })))
			.await?;

		match response
			.get("data")
			.and_then(|data| data.get("contractAction"))
		{
			None | Some(serde_json::Value::Null) => Ok(None),
			Some(action) => Ok(Some(serde_json::from_value(action.clone())?)),
		}
	}

	/// Subscribe to the actions of a contract, starting with its current state.
	pub async fn subscribe_contract_actions(
		&self,
		contract_address: &str,
	) -> Result<IndexerStream<ContractActionData>, IndexerError> {
		let subscription_query = format!(
			r#"
            subscription ContractActions {{
                contractActions(address: "{}") {{
                    __typename
                    state
                    transaction {{
                        block {{
                            height
                        }}
                    }}
                }}
            }}
            "#,
			contract_address
		);

		self.open_subscription("contract-actions", "contractActions", subscription_query)
			.await
	}

	/// Open a `graphql-transport-ws` subscription and decode the `field` of every `next` payload.
	async fn open_subscription<T>(
		&self,
		id: &'static str,
		field: &'static str,
		subscription_query: String,
	) -> Result<IndexerStream<T>, IndexerError>
	where
		T: serde::de::DeserializeOwned + Send + 'static,
	{
		debug!("Attempting WebSocket connection to: {}", self.ws_url);

		// Create WebSocket request with required subprotocol
		let mut request = self.ws_url.clone().into_client_request()?;
		request.headers_mut().insert(
			"Sec-WebSocket-Protocol",
			"graphql-transport-ws".parse().map_err(|_| {
				IndexerError::GraphQLError("Invalid WebSocket subprotocol header value".to_string())
			})?,
		);

		let (ws_stream, response) = connect_async(request).await?;
		debug!(
			"WebSocket connection established, response status: {}",
			response.status()
		);
		let (mut ws_sender, mut ws_receiver) = ws_stream.split();

		ws_sender
			.send(Message::Text(json!({ "type": "connection_init" }).to_string()))
			.await?;

		// Wait for connection ack
		if let Some(msg) = ws_receiver.next().await {
			match msg? {
				Message::Text(text) => {
					let parsed: serde_json::Value = serde_json::from_str(&text)?;
					if parsed.get("type").and_then(|t| t.as_str()) != Some("connection_ack") {
						return Err(IndexerError::SessionError(
							"Connection not acknowledged".to_string(),
						));
					}
				}
				_ => {
					return Err(IndexerError::SessionError(
						"Unexpected message type during handshake".to_string(),
					));
				}
			}
		}

		let start_message = json!({
			"id": id,
			"type": "subscribe",
			"payload": {
				"query": subscription_query
			}
		});

		ws_sender
			.send(Message::Text(start_message.to_string()))
			.await?;

		// The sender half is kept alive inside the stream so the server does not see a close.
		let stream = ws_receiver
			.take_while(move |msg| {
				let done = matches!(msg, Ok(Message::Text(text)) if is_complete(text));
				if done {
					debug!("Subscription {} completed", id);
				}
				futures_util::future::ready(!done)
			})
			.filter_map(move |msg| {
				let _keep_open = &ws_sender;
				futures_util::future::ready(decode_message::<T>(field, msg))
			});

		Ok(Box::pin(stream))
	}

	/// Execute a GraphQL query.
	///
	/// # Returns
	/// The JSON response from the indexer, or an `IndexerError` if the request fails.
	pub async fn execute_query(
		&self,
		query: &str,
		variables: Option<serde_json::Value>,
	) -> Result<serde_json::Value, IndexerError> {
		let request_body = json!({
			"query": query,
			"variables": variables
		});

		let response = self
			.http_client
			.post(&self.indexer_url)
			.header("Content-Type", "application/json")
			.json(&request_body)
			.send()
			.await?;

		if !response.status().is_success() {
			return Err(IndexerError::GraphQLError(format!(
				"HTTP error: {}",
				response.status()
			)));
		}

		let response_json: serde_json::Value = response.json().await?;

		if let Some(errors) = response_json.get("errors") {
			return Err(IndexerError::GraphQLError(format!(
				"GraphQL errors: {}",
				errors
			)));
		}

		Ok(response_json)
	}
}

fn is_complete(text: &str) -> bool {
	serde_json::from_str::<serde_json::Value>(text)
		.ok()
		.and_then(|parsed| {
			parsed
				.get("type")
				.and_then(|t| t.as_str())
				.map(|t| t == "complete")
		})
		.unwrap_or(false)
}

/// Decode one WebSocket frame. `None` means the frame carries nothing for the caller.
fn decode_message<T: serde::de::DeserializeOwned>(
	field: &str,
	msg: Result<Message, tokio_tungstenite::tungstenite::Error>,
) -> Option<Result<T, IndexerError>> {
	let text = match msg {
		Ok(Message::Text(text)) => text,
		Ok(Message::Ping(_)) | Ok(Message::Pong(_)) => return None,
		Ok(_) => {
			return Some(Err(IndexerError::GraphQLError(
				"Unexpected message type".to_string(),
			)));
		}
		Err(e) => return Some(Err(IndexerError::WebSocketError(e))),
	};

	let parsed = match serde_json::from_str::<serde_json::Value>(&text) {
		Ok(parsed) => parsed,
		Err(e) => return Some(Err(IndexerError::JsonError(e))),
	};

	let Some(msg_type) = parsed.get("type").and_then(|t| t.as_str()) else {
		return Some(Err(IndexerError::GraphQLError(
			"Message missing type field".to_string(),
		)));
	};

	match msg_type {
		"next" => {
			let Some(data) = parsed
				.get("payload")
				.and_then(|p| p.get("data"))
				.and_then(|d| d.get(field))
			else {
				return Some(Err(IndexerError::NoData));
			};
			match serde_json::from_value::<T>(data.clone()) {
				Ok(event) => Some(Ok(event)),
				Err(e) => {
					error!("Failed to deserialize {} payload: {}", field, e);
					debug!(
						"Raw data was: {}",
						serde_json::to_string_pretty(&data)
							.unwrap_or_else(|_| "Invalid JSON".to_string())
					);
					Some(Err(IndexerError::JsonError(e)))
				}
			}
		}
		"error" => {
			let error_msg = parsed
				.get("payload")
				.and_then(|p| p.get(0).or(Some(p)))
				.and_then(|p| p.get("message"))
				.and_then(|m| m.as_str())
				.unwrap_or("Unknown subscription error");
			Some(Err(IndexerError::GraphQLError(error_msg.to_string())))
		}
		other => {
			debug!("Ignoring message type: {}", other);
			None
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn text(value: serde_json::Value) -> Result<Message, tokio_tungstenite::tungstenite::Error> {
		Ok(Message::Text(value.to_string()))
	}

	#[test]
	fn next_frames_decode_the_requested_field() {
		let frame = text(json!({
			"id": "contract-actions",
			"type": "next",
			"payload": { "data": { "contractActions": { "state": "00", "transaction": { "block": { "height": 9 } } } } }
		}));
		let decoded = decode_message::<ContractActionData>("contractActions", frame)
			.expect("frame carries data")
			.expect("frame decodes");
		assert_eq!(decoded.block_height(), 9);
	}

	#[test]
	fn error_frames_surface_the_server_message() {
		let frame = text(json!({
			"id": "wallet-sync",
			"type": "error",
			"payload": [{ "message": "invalid session" }]
		}));
		let decoded = decode_message::<WalletSyncEvent>("wallet", frame).expect("error is reported");
		assert!(matches!(decoded, Err(IndexerError::GraphQLError(msg)) if msg == "invalid session"));
	}

	/// Accept one subscription, answer it with `frames`, then hold the socket open.
	async fn serve_subscription(frames: Vec<serde_json::Value>) -> String {
		use tokio_tungstenite::tungstenite::handshake::server::{ErrorResponse, Request, Response};
		use tokio_tungstenite::tungstenite::http::HeaderValue;

		let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
		let url = format!("ws://{}", listener.local_addr().unwrap());
		tokio::spawn(async move {
			let (socket, _) = listener.accept().await.unwrap();
			let callback = |_request: &Request, mut response: Response| {
				response.headers_mut().insert(
					"Sec-WebSocket-Protocol",
					HeaderValue::from_static("graphql-transport-ws"),
				);
				Ok::<Response, ErrorResponse>(response)
			};
			let mut ws = tokio_tungstenite::accept_hdr_async(socket, callback).await.unwrap();

			// connection_init
			ws.next().await.unwrap().unwrap();
			ws.send(Message::Text(json!({ "type": "connection_ack" }).to_string()))
				.await
				.unwrap();
			// subscribe
			ws.next().await.unwrap().unwrap();
			for frame in frames {
				ws.send(Message::Text(frame.to_string())).await.unwrap();
			}
			while let Some(Ok(_)) = ws.next().await {}
		});
		url
	}

	#[tokio::test]
	async fn completed_subscription_ends_the_stream() {
		let url = serve_subscription(vec![
			json!({ "type": "ka" }),
			json!({
				"id": "contract-actions",
				"type": "next",
				"payload": { "data": { "contractActions": { "state": "00", "transaction": { "block": { "height": 9 } } } } }
			}),
			json!({ "id": "contract-actions", "type": "complete" }),
		])
		.await;
		let client = MidnightIndexerClient::new("http://127.0.0.1:9".to_string(), url).unwrap();

		let actions: Vec<_> = tokio::time::timeout(
			Duration::from_secs(5),
			client.subscribe_contract_actions("0200aa").await.unwrap().collect::<Vec<_>>(),
		)
		.await
		.expect("stream ends after complete");

		assert_eq!(actions.len(), 1);
		assert_eq!(actions[0].as_ref().unwrap().block_height(), 9);
	}

	#[test]
	fn keepalive_frames_are_skipped() {
		let frame = text(json!({ "type": "ka" }));
		assert!(decode_message::<WalletSyncEvent>("wallet", frame).is_none());
		assert!(is_complete(&json!({ "type": "complete", "id": "x" }).to_string()));
	}
}
