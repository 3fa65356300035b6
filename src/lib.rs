//! Client core for the crowdfunding dApp on Midnight.
//!
//! Recovers a wallet session from a local snapshot or builds a fresh one, waits on session
//! progress with bounded waits, and projects the crowdfunding contract's ledger into a shared
//! feed of derived states.

pub mod config;
pub mod contract;
pub mod indexer;
pub mod transaction;
pub mod utils;
pub mod wallet;
