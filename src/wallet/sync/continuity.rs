//! Chain continuity between a restored snapshot and the live chain.

use tracing::{debug, warn};

/// Outcome of comparing a snapshot's recorded offset with the live offset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Continuity {
	Valid { restored: u64, live: u64 },
	Broken { restored: u64, live: u64 },
}

impl Continuity {
	pub fn is_broken(&self) -> bool {
		matches!(self, Continuity::Broken { .. })
	}
}

/// True when the live chain has moved on past the restored position by more than one step.
///
/// A single step of difference is tolerated: the live offset may advance once between the
/// snapshot being taken and this check running.
pub fn is_reset(restored_offset: u64, live_offset: u64) -> bool {
	restored_offset.saturating_add(1) < live_offset
}

pub fn check_continuity(restored_offset: u64, live_offset: u64) -> Continuity {
	if is_reset(restored_offset, live_offset) {
		warn!(
			"Chain reset detected: snapshot offset {} is behind live offset {}",
			restored_offset, live_offset
		);
		Continuity::Broken {
			restored: restored_offset,
			live: live_offset,
		}
	} else {
		debug!(
			"Snapshot offset {} is continuous with live offset {}",
			restored_offset, live_offset
		);
		Continuity::Valid {
			restored: restored_offset,
			live: live_offset,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn one_step_of_drift_is_tolerated() {
		assert!(!is_reset(100, 100));
		assert!(!is_reset(99, 100));
		assert!(is_reset(98, 100));
	}

	#[test]
	fn snapshot_ahead_of_live_is_not_a_reset() {
		assert!(!is_reset(10, 0));
		assert!(!is_reset(0, 0));
		assert!(!is_reset(0, 1));
		assert!(is_reset(0, 2));
		assert!(!is_reset(u64::MAX, u64::MAX));
	}

	#[test]
	fn matches_the_offset_rule_over_a_range() {
		for live in 0..20u64 {
			for restored in 0..20u64 {
				assert_eq!(is_reset(restored, live), (restored as i64) < live as i64 - 1);
			}
		}
	}

	#[test]
	fn check_reports_both_offsets() {
		assert_eq!(
			check_continuity(50, 200),
			Continuity::Broken {
				restored: 50,
				live: 200
			}
		);
		assert!(!check_continuity(100, 100).is_broken());
	}
}
