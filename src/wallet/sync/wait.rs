//! Throttled waits on a session's state stream.
//!
//! Every wait in the crate (funds, sync, token balance, post-operation sync, the restore-time
//! checks) is a [`BoundedWait`]: sample the stream at most once per interval, log the sample,
//! and resolve on the first sample matching a predicate. The timeout policy decides whether
//! the wait can give up.

use crate::config::WaitConfig;
use crate::transaction::NATIVE_TOKEN;
use crate::wallet::{Session, SessionState, WaitError};

use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use std::time::Duration;
use tokio::time::Instant;
use tracing::{info, warn};

/// How long a wait may last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitPolicy {
	/// Wait until the predicate matches or the stream ends.
	Unbounded,
	/// Give up after the duration, reporting [`WaitOutcome::TimedOut`].
	Bounded(Duration),
}

/// Result of a wait. Timing out and the stream ending are reported, not raised.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitOutcome<T> {
	Matched(T),
	TimedOut,
	Closed,
}

impl<T> WaitOutcome<T> {
	pub fn is_matched(&self) -> bool {
		matches!(self, WaitOutcome::Matched(_))
	}

	pub fn matched(self) -> Option<T> {
		match self {
			WaitOutcome::Matched(value) => Some(value),
			_ => None,
		}
	}

	pub fn map<U>(self, f: impl FnOnce(T) -> U) -> WaitOutcome<U> {
		match self {
			WaitOutcome::Matched(value) => WaitOutcome::Matched(f(value)),
			WaitOutcome::TimedOut => WaitOutcome::TimedOut,
			WaitOutcome::Closed => WaitOutcome::Closed,
		}
	}

	/// Turn a soft outcome into a hard failure for callers that cannot proceed without a match.
	pub fn into_result(self, label: &'static str) -> Result<T, WaitError> {
		match self {
			WaitOutcome::Matched(value) => Ok(value),
			WaitOutcome::TimedOut => Err(WaitError::TimedOut(label)),
			WaitOutcome::Closed => Err(WaitError::SourceClosed(label)),
		}
	}
}

struct Throttle<S: Stream> {
	source: S,
	interval: Duration,
	next_sample: Option<Instant>,
	pending: Option<S::Item>,
	exhausted: bool,
}

/// Sample `source` at most once per `interval`.
///
/// The first item is sampled as soon as it arrives. Afterwards only the most recent item seen
/// when the interval elapses is sampled; the ones it replaced are dropped. An item still
/// pending when the source ends is sampled before the throttled stream ends.
pub fn throttle<S>(source: S, interval: Duration) -> BoxStream<'static, S::Item>
where
	S: Stream + Send + Unpin + 'static,
	S::Item: Send + 'static,
{
	let state = Throttle {
		source,
		interval,
		next_sample: None,
		pending: None,
		exhausted: false,
	};

	futures::stream::unfold(state, |mut st| async move {
		loop {
			if st.exhausted {
				let item = st.pending.take()?;
				return Some((item, st));
			}

			match (st.pending.is_some(), st.next_sample) {
				(false, _) => match st.source.next().await {
					Some(item) => st.pending = Some(item),
					None => st.exhausted = true,
				},
				(true, Some(at)) if Instant::now() < at => {
					tokio::select! {
						_ = tokio::time::sleep_until(at) => {}
						next = st.source.next() => match next {
							Some(item) => st.pending = Some(item),
							None => st.exhausted = true,
						},
					}
				}
				(true, _) => {
					st.next_sample = Some(Instant::now() + st.interval);
					let item = st.pending.take()?;
					return Some((item, st));
				}
			}
		}
	})
	.boxed()
}

/// A labelled, throttled wait on a stream of [`SessionState`]s.
#[derive(Debug, Clone)]
pub struct BoundedWait {
	label: &'static str,
	interval: Duration,
	policy: WaitPolicy,
}

impl BoundedWait {
	pub fn new(label: &'static str, interval: Duration, policy: WaitPolicy) -> Self {
		Self {
			label,
			interval,
			policy,
		}
	}

	pub fn unbounded(label: &'static str, interval: Duration) -> Self {
		Self::new(label, interval, WaitPolicy::Unbounded)
	}

	pub fn bounded(label: &'static str, interval: Duration, timeout: Duration) -> Self {
		Self::new(label, interval, WaitPolicy::Bounded(timeout))
	}

	pub fn label(&self) -> &'static str {
		self.label
	}

	/// Resolve with the first sampled state for which `predicate` holds.
	///
	/// Dropping the returned future stops sampling and drops the stream.
	pub async fn run<F>(&self, states: BoxStream<'static, SessionState>, mut predicate: F) -> WaitOutcome<SessionState>
	where
		F: FnMut(&SessionState) -> bool,
	{
		let label = self.label;
		let mut samples = throttle(states, self.interval);

		let search = async {
			while let Some(state) = samples.next().await {
				log_sample(label, &state);
				if predicate(&state) {
					return WaitOutcome::Matched(state);
				}
			}
			WaitOutcome::Closed
		};

		let outcome = match self.policy {
			WaitPolicy::Unbounded => search.await,
			WaitPolicy::Bounded(limit) => match tokio::time::timeout(limit, search).await {
				Ok(outcome) => outcome,
				Err(_) => {
					warn!("Timed out after {:?} waiting for {}", limit, label);
					WaitOutcome::TimedOut
				}
			},
		};

		if outcome == WaitOutcome::Closed {
			warn!("State stream ended while waiting for {}", label);
		}
		outcome
	}
}

fn log_sample(label: &str, state: &SessionState) {
	let lag = state.lag();
	info!(
		"Waiting for {}. Backend lag: {}, wallet lag: {}, transactions={}",
		label,
		lag.source_gap,
		lag.apply_gap,
		state.transaction_history.len()
	);
}

/// First state that carries sync progress at all.
pub async fn wait_for_sync_progress<S: Session + ?Sized>(
	session: &S,
	interval: Duration,
	policy: WaitPolicy,
) -> WaitOutcome<SessionState> {
	BoundedWait::new("sync progress", interval, policy)
		.run(session.state(), |state| state.sync_progress.is_some())
		.await
}

/// First state reporting the session as synced.
pub async fn wait_for_sync<S: Session + ?Sized>(
	session: &S,
	interval: Duration,
	policy: WaitPolicy,
) -> WaitOutcome<SessionState> {
	BoundedWait::new("sync", interval, policy)
		.run(session.state(), SessionState::is_synced)
		.await
}

/// Native token balance once the session is synced and holds some. Never times out.
pub async fn wait_for_funds<S: Session + ?Sized>(
	session: &S,
	config: &WaitConfig,
) -> Result<u128, WaitError> {
	BoundedWait::unbounded("funds", config.funds_interval)
		.run(session.state(), |state| {
			state.is_synced() && state.balance(NATIVE_TOKEN) > 0
		})
		.await
		.map(|state| state.balance(NATIVE_TOKEN))
		.into_result("funds")
}

/// Log the session's address and native balance, waiting for funds when it holds none.
pub async fn announce_and_wait_for_funds<S: Session + ?Sized>(
	session: &S,
	config: &WaitConfig,
) -> Result<u128, WaitError> {
	let state = session
		.state()
		.next()
		.await
		.ok_or(WaitError::SourceClosed("session state"))?;
	info!("Your wallet address is: {}", state.address);

	let mut balance = state.balance(NATIVE_TOKEN);
	if balance == 0 {
		info!("Your wallet balance is: 0");
		info!("Waiting to receive tokens...");
		balance = wait_for_funds(session, config).await?;
	}
	info!("Your wallet balance is: {}", balance);
	Ok(balance)
}

/// Balance of `token_type` once synced and at least `minimum`. Fails on timeout.
pub async fn wait_for_token_balance<S: Session + ?Sized>(
	session: &S,
	token_type: &str,
	minimum: u128,
	config: &WaitConfig,
) -> Result<u128, WaitError> {
	info!("Waiting for {} balance of at least {}", token_type, minimum);
	BoundedWait::bounded("token balance", config.balance_interval, config.balance_timeout)
		.run(session.state(), |state| {
			state.is_synced() && state.balance(token_type) >= minimum
		})
		.await
		.map(|state| state.balance(token_type))
		.into_result("token balance")
}

/// Give the session a chance to catch up after submitting a transaction.
///
/// Returns whether it did. A timeout is logged and otherwise ignored.
pub async fn wait_for_sync_after_operation<S: Session + ?Sized>(
	session: &S,
	config: &WaitConfig,
) -> bool {
	let synced = BoundedWait::bounded(
		"sync after operation",
		config.post_operation_interval,
		config.post_operation_timeout,
	)
	.run(session.state(), SessionState::is_synced)
	.await
	.is_matched();

	if synced {
		info!("Wallet sync completed after operation");
	} else {
		warn!(
			"Wallet sync not completed within {:?} after operation",
			config.post_operation_timeout
		);
	}
	synced
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::wallet::SyncProgress;
	use futures::channel::mpsc;

	fn state(offset: u64, synced: bool) -> SessionState {
		SessionState {
			offset,
			sync_progress: Some(if synced {
				SyncProgress::synced()
			} else {
				SyncProgress::behind(1, 1)
			}),
			..Default::default()
		}
	}

	#[tokio::test(start_paused = true)]
	async fn throttle_keeps_the_latest_value_per_interval() {
		let (tx, rx) = mpsc::unbounded();
		let mut sampled = throttle(rx, Duration::from_secs(5));

		tx.unbounded_send(1).unwrap();
		assert_eq!(sampled.next().await, Some(1));

		tx.unbounded_send(2).unwrap();
		tx.unbounded_send(3).unwrap();
		tx.unbounded_send(4).unwrap();
		let started = Instant::now();
		assert_eq!(sampled.next().await, Some(4));
		assert_eq!(started.elapsed(), Duration::from_secs(5));

		tx.unbounded_send(5).unwrap();
		drop(tx);
		assert_eq!(sampled.next().await, Some(5));
		assert_eq!(sampled.next().await, None);
	}

	#[tokio::test(start_paused = true)]
	async fn resolves_on_the_first_matching_sample() {
		let (tx, rx) = mpsc::unbounded();
		let producer = tokio::spawn(async move {
			for n in 1..=5u64 {
				if tx.unbounded_send(state(n, n == 3)).is_err() {
					break;
				}
				tokio::time::sleep(Duration::from_secs(2)).await;
			}
		});
		let mut evaluated = Vec::new();

		let outcome = BoundedWait::unbounded("sync", Duration::from_secs(1))
			.run(rx.boxed(), |s| {
				evaluated.push(s.offset);
				s.is_synced()
			})
			.await;

		assert_eq!(outcome.matched().map(|s| s.offset), Some(3));
		assert_eq!(evaluated, vec![1, 2, 3]);
		producer.abort();
	}

	#[tokio::test(start_paused = true)]
	async fn bounded_wait_returns_within_its_timeout() {
		let (tx, rx) = mpsc::unbounded();
		tx.unbounded_send(state(1, false)).unwrap();
		let producer = tokio::spawn(async move {
			let mut offset = 2;
			loop {
				tokio::time::sleep(Duration::from_millis(300)).await;
				if tx.unbounded_send(state(offset, false)).is_err() {
					break;
				}
				offset += 1;
			}
		});

		let started = Instant::now();
		let outcome = BoundedWait::bounded("sync", Duration::from_secs(1), Duration::from_secs(10))
			.run(rx.boxed(), SessionState::is_synced)
			.await;

		assert_eq!(outcome, WaitOutcome::TimedOut);
		assert!(started.elapsed() <= Duration::from_secs(11));
		producer.abort();
	}

	#[tokio::test(start_paused = true)]
	async fn abandoned_wait_releases_its_source() {
		let (tx, rx) = mpsc::unbounded();
		tx.unbounded_send(state(1, false)).unwrap();

		let wait = BoundedWait::unbounded("sync", Duration::from_secs(1));
		let abandoned = tokio::time::timeout(
			Duration::from_secs(5),
			wait.run(rx.boxed(), SessionState::is_synced),
		)
		.await;

		assert!(abandoned.is_err());
		assert!(tx.is_closed());
	}

	#[tokio::test(start_paused = true)]
	async fn closed_stream_is_reported_and_converts_to_an_error() {
		let outcome = BoundedWait::unbounded("funds", Duration::from_secs(10))
			.run(futures::stream::iter(vec![state(1, false)]).boxed(), SessionState::is_synced)
			.await;

		assert_eq!(outcome, WaitOutcome::Closed);
		assert!(matches!(outcome.into_result("funds"), Err(WaitError::SourceClosed("funds"))));
		assert!(matches!(
			WaitOutcome::<()>::TimedOut.into_result("balance"),
			Err(WaitError::TimedOut("balance"))
		));
	}
}
