//! Indexer integration module for the Midnight blockchain
//!
//! This module provides the client and types for interacting with the Midnight GraphQL indexer.
//! The indexer tracks chain state and provides APIs for following a wallet through its
//! viewing key and for reading and following contract state.

/// GraphQL client for interacting with the Midnight indexer
mod client;
/// Type definitions for indexer data structures
mod types;

pub use client::{IndexerStream, MidnightIndexerClient};
pub use types::*;
