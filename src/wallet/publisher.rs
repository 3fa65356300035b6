//! Latest-value state channel shared by the session implementations.

use crate::wallet::types::SessionState;

use futures::StreamExt;
use futures::stream::BoxStream;
use std::sync::{Arc, Mutex};
use tokio::sync::watch;

/// Holds the current [`SessionState`] and hands out streams of it.
///
/// Every stream starts with the current state and then yields each change. Intermediate
/// states may be coalesced when a reader is slow; consumers only ever need the latest one.
/// Closing drops the sender, which ends every outstanding stream.
pub struct StatePublisher {
	sender: Mutex<Option<Arc<watch::Sender<SessionState>>>>,
	receiver: watch::Receiver<SessionState>,
}

impl StatePublisher {
	pub fn new(initial: SessionState) -> Self {
		let (sender, receiver) = watch::channel(initial);
		Self {
			sender: Mutex::new(Some(Arc::new(sender))),
			receiver,
		}
	}

	/// Sender for a background task. `None` once closed.
	pub fn sender(&self) -> Option<Arc<watch::Sender<SessionState>>> {
		self.sender
			.lock()
			.expect("state publisher lock poisoned")
			.clone()
	}

	/// Apply `update` to the current state. Returns false once closed.
	pub fn update(&self, update: impl FnOnce(&mut SessionState)) -> bool {
		match self.sender() {
			Some(sender) => {
				sender.send_modify(update);
				true
			}
			None => false,
		}
	}

	pub fn current(&self) -> SessionState {
		self.receiver.borrow().clone()
	}

	pub fn stream(&self) -> BoxStream<'static, SessionState> {
		futures::stream::unfold((self.receiver.clone(), true), |(mut rx, first)| async move {
			if !first && rx.changed().await.is_err() {
				return None;
			}
			let state = rx.borrow_and_update().clone();
			Some((state, (rx, false)))
		})
		.boxed()
	}

	pub fn close(&self) {
		self.sender
			.lock()
			.expect("state publisher lock poisoned")
			.take();
	}

	pub fn is_closed(&self) -> bool {
		self.sender
			.lock()
			.expect("state publisher lock poisoned")
			.is_none()
	}
}
