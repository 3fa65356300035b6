//! Types for GraphQL indexer integration with session management

use serde::{Deserialize, Serialize};

/// Transaction application stage from the indexer
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub enum ApplyStage {
    /// Transaction is still pending
    Pending,
    /// Transaction succeeded entirely
    SucceedEntirely,
    /// Transaction succeeded partially
    SucceedPartially,
    /// Transaction failed entirely
    FailEntirely,
}

impl ApplyStage {
    /// Check if the transaction counts towards the session's history
    pub fn should_apply(&self) -> bool {
        matches!(
            self,
            ApplyStage::SucceedEntirely | ApplyStage::SucceedPartially
        )
    }
}

/// Transaction data from the indexer containing transaction details and application status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionData {
    /// The transaction hash.
    pub hash: String,
    /// Optional list of identifiers associated with the transaction.
    pub identifiers: Option<Vec<String>>,
    /// Optional raw transaction data as a hex string.
    pub raw: Option<String>,
    /// The application stage of the transaction (pending, succeeded, failed, etc.).
    #[serde(rename = "applyStage")]
    pub apply_stage: Option<ApplyStage>,
    /// Optional Merkle tree root associated with the transaction.
    #[serde(rename = "merkleTreeRoot")]
    pub merkle_tree_root: Option<String>,
    /// Optional protocol version for the transaction.
    #[serde(rename = "protocolVersion")]
    pub protocol_version: Option<u32>,
}

/// Events emitted during wallet synchronization via GraphQL subscription.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WalletSyncEvent {
    /// A viewing update event, containing Merkle updates and/or relevant transactions.
    ViewingUpdate {
        #[serde(rename = "__typename")]
        type_name: String,
        /// The chain index for this update.
        index: u64,
        /// The list of Zswap chain state updates (transactions or Merkle updates).
        update: Vec<ZswapChainStateUpdate>,
    },
    /// A progress update event, reporting sync progress indices.
    ProgressUpdate {
        #[serde(rename = "__typename")]
        type_name: String,
        /// The highest chain index seen by the indexer.
        #[serde(rename = "highestIndex")]
        highest_index: u64,
        /// The highest index the indexer has processed for relevant data.
        #[serde(rename = "highestRelevantIndex")]
        highest_relevant_index: u64,
        /// The highest index relevant to this wallet.
        #[serde(rename = "highestRelevantWalletIndex")]
        highest_relevant_wallet_index: u64,
    },
}

/// Updates to the Zswap chain state, including transactions and Merkle tree updates.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "__typename")]
pub enum ZswapChainStateUpdate {
    /// A relevant transaction update.
    RelevantTransaction {
        transaction: TransactionData,
        #[serde(default)]
        start: u64,
        #[serde(default)]
        end: u64,
    },
    /// A collapsed Merkle tree update. Only its range is tracked here.
    MerkleTreeCollapsedUpdate {
        #[serde(rename = "protocolVersion", default)]
        protocol_version: u32,
        #[serde(default)]
        start: u64,
        #[serde(default)]
        end: u64,
        #[serde(default)]
        update: String,
    },
}

/// A contract action as reported by the indexer.
///
/// `state` is the hex-encoded contract state after the action; the block height tells
/// where on the chain the action was applied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractActionData {
    #[serde(rename = "__typename", default)]
    pub type_name: String,
    /// Hex-encoded contract state.
    pub state: String,
    #[serde(default)]
    pub transaction: Option<ContractActionTransaction>,
}

impl ContractActionData {
    /// Height of the block containing the action, zero when the indexer omitted it.
    pub fn block_height(&self) -> u64 {
        self.transaction
            .as_ref()
            .map(|tx| tx.block.height)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContractActionTransaction {
    pub block: BlockRef,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlockRef {
    pub height: u64,
}

/// Formats for wallet viewing keys used to query the indexer.
#[derive(Debug, Clone)]
pub enum ViewingKeyFormat {
    /// Bech32m format (preferred): mn_shield-esk_dev1...
    Bech32m(String),
}

impl ViewingKeyFormat {
    /// Get the viewing key as a string for API calls
    pub fn as_str(&self) -> &str {
        match self {
            ViewingKeyFormat::Bech32m(key) => key,
        }
    }
}

/// Error types for indexer operations and session management
#[derive(Debug, thiserror::Error)]
pub enum IndexerError {
    #[error("GraphQL error: {0}")]
    GraphQLError(String),

    #[error("No data returned")]
    NoData,

    #[error("WebSocket error: {0}")]
    WebSocketError(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("JSON parse error: {0}")]
    JsonError(#[from] serde_json::Error),

    #[error("Session error: {0}")]
    SessionError(String),
}
