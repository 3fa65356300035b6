//!
//! Utility module for the crowdfunding client.
//!
//! Re-exports formatting helpers and other utility functions for use throughout the codebase.
/// Utility functions for formatting, display and randomness
pub mod index;

pub use index::{format_token_amount, random_bytes};
