//! Progress tracking for indexer-backed sessions.
//!
//! This module provides the `SyncProgressTracker`, which turns the indexer's wallet
//! subscription events into the [`SyncProgress`] carried by every session state. Viewing updates
//! advance the locally applied index; progress updates move the reference frontiers the lag is
//! measured against.

use crate::wallet::{SyncLag, SyncProgress};
use tracing::info;

/// Chain indices the indexer may still be scanning when a session reports itself synced.
pub const SYNCED_SOURCE_GAP_TOLERANCE: u64 = 50;

/// Frontiers last reported by the indexer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Frontier {
    pub highest_index: u64,
    pub highest_relevant_index: u64,
    pub highest_relevant_wallet_index: u64,
}

/// Service for tracking synchronization progress
#[derive(Debug, Clone)]
pub struct SyncProgressTracker {
    /// The highest index applied locally
    highest_applied_index: u64,
    /// Track if we've seen any data events
    has_processed_data: bool,
    /// Starting index for this sync session
    start_index: u64,
    /// Total transactions processed
    transactions_processed: usize,
    /// Total viewing updates processed
    updates_processed: usize,
    /// Last index at which we logged progress
    last_logged_index: u64,
    /// Latest frontiers, `None` until the first progress update
    frontier: Option<Frontier>,
}

impl SyncProgressTracker {
    /// Create a new progress tracker starting from the given index.
    pub fn new(start_index: u64) -> Self {
        Self {
            highest_applied_index: start_index,
            has_processed_data: false,
            start_index,
            transactions_processed: 0,
            updates_processed: 0,
            last_logged_index: start_index,
            frontier: None,
        }
    }

    /// Record that we applied data at a specific index
    pub fn record_processed(&mut self, index: u64) {
        self.highest_applied_index = self.highest_applied_index.max(index);
        self.has_processed_data = true;
    }

    /// Record an applied viewing update carrying `transactions` relevant transactions
    pub fn record_viewing_update(&mut self, index: u64, transactions: usize) {
        self.record_processed(index);
        self.updates_processed += 1;
        self.transactions_processed += transactions;
    }

    /// Record the frontiers from a progress update
    pub fn record_frontier(&mut self, frontier: Frontier) {
        self.frontier = Some(frontier);
    }

    pub fn highest_applied_index(&self) -> u64 {
        self.highest_applied_index
    }

    /// Sync progress as of the latest events, `None` until the indexer has reported frontiers.
    pub fn progress(&self) -> Option<SyncProgress> {
        let frontier = self.frontier?;
        let lag = SyncLag {
            apply_gap: frontier
                .highest_relevant_wallet_index
                .saturating_sub(self.highest_applied_index),
            source_gap: frontier
                .highest_index
                .saturating_sub(frontier.highest_relevant_index),
        };
        Some(SyncProgress {
            synced: lag.apply_gap == 0 && lag.source_gap <= SYNCED_SOURCE_GAP_TOLERANCE,
            lag,
        })
    }

    /// Check if sync is complete based on the latest progress update
    pub fn is_sync_complete(&self) -> bool {
        self.progress().is_some_and(|progress| progress.synced)
    }

    /// Log progress at regular intervals or when forced
    pub fn log_progress(&mut self, force: bool) {
        // Log every 1000 indices or when forced
        let since_last_log = self
            .highest_applied_index
            .saturating_sub(self.last_logged_index);
        let should_log = force || since_last_log >= 1000;

        if should_log && self.has_processed_data {
            info!(
                "Sync progress: {} transactions in {} updates applied up to index {}",
                self.transactions_processed, self.updates_processed, self.highest_applied_index
            );
            self.last_logged_index = self.highest_applied_index;
        }
    }

    /// Get sync statistics as a SyncStats struct
    pub fn get_stats(&self) -> SyncStats {
        SyncStats {
            start_index: self.start_index,
            highest_applied_index: self.highest_applied_index,
            has_processed_data: self.has_processed_data,
            transactions_processed: self.transactions_processed,
            updates_processed: self.updates_processed,
            synced: self.is_sync_complete(),
        }
    }
}

/// Statistics about the sync progress
#[derive(Debug, Clone)]
pub struct SyncStats {
    pub start_index: u64,
    pub highest_applied_index: u64,
    pub has_processed_data: bool,
    pub transactions_processed: usize,
    pub updates_processed: usize,
    pub synced: bool,
}

impl SyncStats {
    /// Get a human-readable summary of the sync statistics
    pub fn summary(&self) -> String {
        format!(
            "Sync from {} to {}: {} transactions, {} updates{}",
            self.start_index,
            self.highest_applied_index,
            self.transactions_processed,
            self.updates_processed,
            if self.synced { " (synced)" } else { "" }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_progress_before_the_first_frontier() {
        let mut tracker = SyncProgressTracker::new(0);
        tracker.record_viewing_update(5, 1);
        assert_eq!(tracker.progress(), None);
        assert!(!tracker.is_sync_complete());
    }

    #[test]
    fn lag_is_measured_against_the_frontiers() {
        let mut tracker = SyncProgressTracker::new(10);
        tracker.record_frontier(Frontier {
            highest_index: 500,
            highest_relevant_index: 300,
            highest_relevant_wallet_index: 40,
        });

        let progress = tracker.progress().unwrap();
        assert_eq!(progress.lag.apply_gap, 30);
        assert_eq!(progress.lag.source_gap, 200);
        assert!(!progress.synced);

        tracker.record_viewing_update(40, 2);
        tracker.record_frontier(Frontier {
            highest_index: 500,
            highest_relevant_index: 480,
            highest_relevant_wallet_index: 40,
        });
        assert!(tracker.is_sync_complete());

        let stats = tracker.get_stats();
        assert_eq!(stats.transactions_processed, 2);
        assert!(stats.summary().ends_with("(synced)"));
    }

    #[test]
    fn applied_index_never_moves_backwards() {
        let mut tracker = SyncProgressTracker::new(0);
        tracker.record_viewing_update(9, 0);
        tracker.record_viewing_update(4, 0);
        assert_eq!(tracker.highest_applied_index(), 9);
    }
}
