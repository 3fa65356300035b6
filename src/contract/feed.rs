//! Multicast feed of derived ledger states.
//!
//! A [`StateFeed`] runs one projection for all of its subscribers. The projection starts with
//! the first subscription and is torn down when the last one goes away. Every subscriber gets
//! the same `Arc` for a given ledger change, in ledger order and without drops; a subscriber
//! joining a running feed first receives the latest projection.

use crate::contract::projector::LedgerStateProjector;
use crate::contract::types::{ContractError, DerivedLedgerState};

use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use futures::stream::BoxStream;
use futures::{Stream, StreamExt};
use std::collections::HashMap;
use std::pin::Pin;
use std::sync::{Arc, Mutex, Weak};
use std::task::{Context, Poll};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

pub type SubscriptionId = u64;

#[derive(Default)]
struct Shared {
	next_id: SubscriptionId,
	subscribers: HashMap<SubscriptionId, UnboundedSender<Arc<DerivedLedgerState>>>,
	latest: Option<Arc<DerivedLedgerState>>,
	driver: Option<JoinHandle<()>>,
	/// Bumped whenever a driver starts; publishes from older drivers are ignored.
	generation: u64,
}

struct FeedInner {
	projector: LedgerStateProjector,
	shared: Mutex<Shared>,
}

impl FeedInner {
	fn lock(&self) -> std::sync::MutexGuard<'_, Shared> {
		self.shared.lock().expect("state feed lock poisoned")
	}

	/// Deliver `state` to every subscriber. Returns false when the driver should stop.
	fn publish(&self, generation: u64, state: Arc<DerivedLedgerState>) -> bool {
		let mut shared = self.lock();
		if shared.generation != generation {
			return false;
		}
		shared.latest = Some(state.clone());
		shared
			.subscribers
			.retain(|_, sender| sender.unbounded_send(state.clone()).is_ok());
		if shared.subscribers.is_empty() {
			shared.driver = None;
			shared.latest = None;
			return false;
		}
		true
	}

	/// The projection ended: close every subscription.
	fn finish(&self, generation: u64) {
		let mut shared = self.lock();
		if shared.generation != generation {
			return;
		}
		shared.subscribers.clear();
		shared.driver = None;
		shared.latest = None;
	}

	fn unsubscribe(&self, id: SubscriptionId) -> bool {
		let mut shared = self.lock();
		let removed = shared.subscribers.remove(&id).is_some();
		if removed && shared.subscribers.is_empty() {
			if let Some(driver) = shared.driver.take() {
				driver.abort();
			}
			shared.latest = None;
			debug!("Last subscriber left, released ledger projection");
		}
		removed
	}
}

impl Drop for FeedInner {
	fn drop(&mut self) {
		if let Ok(shared) = self.shared.get_mut() {
			if let Some(driver) = shared.driver.take() {
				driver.abort();
			}
		}
	}
}

async fn drive(
	inner: Weak<FeedInner>,
	generation: u64,
	mut projection: BoxStream<'static, Result<DerivedLedgerState, ContractError>>,
) {
	while let Some(item) = projection.next().await {
		let Some(feed) = inner.upgrade() else {
			return;
		};
		match item {
			Ok(state) => {
				if !feed.publish(generation, Arc::new(state)) {
					return;
				}
			}
			Err(e) => warn!("Ledger state projection error: {}", e),
		}
	}

	info!("Ledger state projection ended");
	if let Some(feed) = inner.upgrade() {
		feed.finish(generation);
	}
}

/// Shared, reference-counted feed over one [`LedgerStateProjector`].
#[derive(Clone)]
pub struct StateFeed {
	inner: Arc<FeedInner>,
}

impl StateFeed {
	pub fn new(projector: LedgerStateProjector) -> Self {
		Self {
			inner: Arc::new(FeedInner {
				projector,
				shared: Mutex::new(Shared::default()),
			}),
		}
	}

	/// Start receiving projections. Must be called inside a tokio runtime.
	pub fn subscribe(&self) -> Subscription {
		let (sender, receiver) = unbounded();
		let mut shared = self.inner.lock();

		let id = shared.next_id;
		shared.next_id += 1;
		if let Some(latest) = &shared.latest {
			// Cannot fail: the receiver is still in hand.
			let _ = sender.unbounded_send(latest.clone());
		}
		shared.subscribers.insert(id, sender);

		if shared.driver.is_none() {
			shared.generation += 1;
			debug!(
				"Starting ledger projection for {}",
				self.inner.projector.contract_address()
			);
			shared.driver = Some(tokio::spawn(drive(
				Arc::downgrade(&self.inner),
				shared.generation,
				self.inner.projector.project(),
			)));
		}

		Subscription {
			id,
			receiver,
			feed: Arc::downgrade(&self.inner),
		}
	}

	/// Call `on_state` with every projection until the returned handle is cancelled or dropped.
	pub fn subscribe_with<F>(&self, mut on_state: F) -> CallbackSubscription
	where
		F: FnMut(Arc<DerivedLedgerState>) + Send + 'static,
	{
		let mut subscription = self.subscribe();
		let id = subscription.id();
		let task = tokio::spawn(async move {
			while let Some(state) = subscription.next().await {
				on_state(state);
			}
		});
		CallbackSubscription {
			id,
			task,
			feed: Arc::downgrade(&self.inner),
		}
	}

	/// Stop delivery to `subscription`. Returns false if it was already gone.
	pub fn unsubscribe(&self, subscription: Subscription) -> bool {
		let id = subscription.id;
		let removed = self.inner.unsubscribe(id);
		drop(subscription);
		removed
	}

	pub fn latest(&self) -> Option<Arc<DerivedLedgerState>> {
		self.inner.lock().latest.clone()
	}

	pub fn subscriber_count(&self) -> usize {
		self.inner.lock().subscribers.len()
	}

	/// Whether a projection is currently running.
	pub fn is_active(&self) -> bool {
		self.inner.lock().driver.is_some()
	}
}

/// Stream of projections for one subscriber. Dropping it unsubscribes.
pub struct Subscription {
	id: SubscriptionId,
	receiver: UnboundedReceiver<Arc<DerivedLedgerState>>,
	feed: Weak<FeedInner>,
}

impl Subscription {
	pub fn id(&self) -> SubscriptionId {
		self.id
	}
}

impl Stream for Subscription {
	type Item = Arc<DerivedLedgerState>;

	fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
		self.receiver.poll_next_unpin(cx)
	}
}

impl Drop for Subscription {
	fn drop(&mut self) {
		if let Some(feed) = self.feed.upgrade() {
			feed.unsubscribe(self.id);
		}
	}
}

/// Handle of a callback subscription. Dropping it unsubscribes.
pub struct CallbackSubscription {
	id: SubscriptionId,
	task: JoinHandle<()>,
	feed: Weak<FeedInner>,
}

impl CallbackSubscription {
	pub fn id(&self) -> SubscriptionId {
		self.id
	}

	pub fn cancel(self) {}
}

impl Drop for CallbackSubscription {
	fn drop(&mut self) {
		self.task.abort();
		// The aborted task drops its subscription later; release the slot now.
		if let Some(feed) = self.feed.upgrade() {
			feed.unsubscribe(self.id);
		}
	}
}
