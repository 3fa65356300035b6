use crowdfunding_sync::contract::memory::MemoryPublicDataProvider;
use crowdfunding_sync::contract::{
	CROWDFUNDING_PRIVATE_STATE_ID, DerivedLedgerState, LedgerStateProjector, MemoryPrivateStateStore,
	Project, ProjectStatus, RawLedgerState, RawPoolBalance, StateFeed,
};

use futures::StreamExt;
use std::sync::{Arc, Mutex};
use std::time::Duration;

const CONTRACT: &str = "0200aa";

fn project(title: &str, raised: u128) -> Project {
	Project {
		status: ProjectStatus::Active,
		title: title.to_string(),
		description: format!("{} description", title),
		owner: vec![0xaa; 32],
		raised,
		contribution_goal: 10_000,
		contributors: 1,
		creation_date: 1_700_000_000_000,
		duration: 14,
	}
}

fn ledger(offset: u64, pools: usize) -> RawLedgerState {
	let mut state = RawLedgerState {
		offset,
		..Default::default()
	};
	for i in 0..pools {
		state.protocol_tvl.insert(
			format!("{:064x}", i),
			RawPoolBalance {
				nonce: vec![i as u8; 32],
				color: vec![0; 33],
				value: 1_000 * (i as u128 + 1),
				mt_index: i as u64,
			},
		);
	}
	state.projects.insert("01".to_string(), project("well", 100));
	state.projects.insert("02".to_string(), project("school", 250));
	state.projects.insert("03".to_string(), project("bridge", 0));
	state
}

fn feed_with(initial: RawLedgerState) -> (Arc<MemoryPublicDataProvider>, StateFeed) {
	let public = Arc::new(MemoryPublicDataProvider::new());
	public.publish(CONTRACT, initial);
	let projector = LedgerStateProjector::new(
		public.clone(),
		Arc::new(MemoryPrivateStateStore::new()),
		CONTRACT,
		CROWDFUNDING_PRIVATE_STATE_ID,
	);
	(public, StateFeed::new(projector))
}

async fn released(public: &MemoryPublicDataProvider) -> bool {
	tokio::time::timeout(Duration::from_secs(1), async {
		while public.active_subscriptions(CONTRACT) > 0 {
			tokio::task::yield_now().await;
		}
	})
	.await
	.is_ok()
}

#[tokio::test]
async fn raised_update_changes_exactly_one_project() {
	let (public, feed) = feed_with(ledger(1, 2));
	let mut states = feed.subscribe();
	let before = states.next().await.unwrap();

	let mut update = ledger(2, 2);
	update.projects.get_mut("02").unwrap().raised = 900;
	public.publish(CONTRACT, update);
	let after = states.next().await.unwrap();

	assert_eq!(after.protocol_tvl, before.protocol_tvl);
	assert_eq!(after.projects.len(), before.projects.len());
	let changed: Vec<_> = before
		.projects
		.iter()
		.zip(&after.projects)
		.filter(|(old, new)| old != new)
		.collect();
	assert_eq!(changed.len(), 1);

	let (old, new) = changed[0];
	assert_eq!(new.id, "02");
	assert_eq!(new.project.raised, 900);
	let mut expected = old.project.clone();
	expected.raised = 900;
	assert_eq!(new.project, expected);
}

#[tokio::test]
async fn subscribers_share_one_projection_and_late_ones_get_the_latest() {
	let (public, feed) = feed_with(ledger(1, 1));
	let mut first = feed.subscribe();
	let initial = first.next().await.unwrap();

	let mut second = feed.subscribe();
	let replayed = second.next().await.unwrap();
	assert!(Arc::ptr_eq(&initial, &replayed));
	assert_eq!(feed.subscriber_count(), 2);
	assert_eq!(public.opened_subscriptions(), 1);

	public.publish(CONTRACT, ledger(2, 3));
	let a = first.next().await.unwrap();
	let b = second.next().await.unwrap();
	assert!(Arc::ptr_eq(&a, &b));
	assert_eq!(a.protocol_tvl.len(), 3);
}

#[tokio::test]
async fn every_ledger_change_is_delivered_in_order() {
	let (public, feed) = feed_with(ledger(1, 0));
	let mut states = feed.subscribe();
	states.next().await.unwrap();

	for pools in 1..=3 {
		public.publish(CONTRACT, ledger(1 + pools as u64, pools));
	}
	let lengths: Vec<usize> = states
		.by_ref()
		.take(3)
		.map(|state| state.protocol_tvl.len())
		.collect()
		.await;
	assert_eq!(lengths, vec![1, 2, 3]);
}

#[tokio::test]
async fn resubscribing_without_change_yields_an_equal_state() {
	let (public, feed) = feed_with(ledger(4, 2));

	let mut first = feed.subscribe();
	let a: Arc<DerivedLedgerState> = first.next().await.unwrap();
	assert!(feed.unsubscribe(first));
	assert!(!feed.is_active());

	let mut second = feed.subscribe();
	let b = second.next().await.unwrap();
	assert_eq!(*a, *b);
	assert_eq!(public.opened_subscriptions(), 2);
}

#[tokio::test]
async fn last_unsubscribe_releases_the_ledger_subscription() {
	let (public, feed) = feed_with(ledger(1, 1));
	let mut first = feed.subscribe();
	let mut second = feed.subscribe();
	first.next().await.unwrap();
	second.next().await.unwrap();
	assert_eq!(public.active_subscriptions(CONTRACT), 1);

	drop(first);
	assert!(feed.is_active());
	assert_eq!(public.active_subscriptions(CONTRACT), 1);

	drop(second);
	assert!(!feed.is_active());
	assert!(feed.latest().is_none());
	assert!(released(&public).await);
}

#[tokio::test]
async fn pool_count_matches_the_raw_ledger_including_empty() {
	for pools in [0, 1, 4] {
		let (_public, feed) = feed_with(ledger(1, pools));
		let mut states = feed.subscribe();
		let state = states.next().await.unwrap();
		assert_eq!(state.protocol_tvl.len(), pools);
		assert_eq!(state.projects.len(), 3);
	}
}

#[tokio::test]
async fn callback_subscription_stops_on_cancel() {
	let (public, feed) = feed_with(ledger(1, 1));
	let seen = Arc::new(Mutex::new(Vec::new()));

	let recorder = seen.clone();
	let subscription = feed.subscribe_with(move |state| {
		recorder.lock().unwrap().push(state.protocol_tvl.len());
	});

	tokio::time::timeout(Duration::from_secs(1), async {
		while seen.lock().unwrap().is_empty() {
			tokio::task::yield_now().await;
		}
	})
	.await
	.unwrap();
	assert_eq!(*seen.lock().unwrap(), vec![1]);

	subscription.cancel();
	assert_eq!(feed.subscriber_count(), 0);
	assert!(released(&public).await);
}

#[tokio::test]
async fn dropping_the_feed_stops_its_projection() {
	let (public, feed) = feed_with(ledger(1, 1));
	let mut states = feed.subscribe();
	states.next().await.unwrap();
	assert_eq!(public.active_subscriptions(CONTRACT), 1);

	drop(feed);
	assert!(states.next().await.is_none());
	assert!(released(&public).await);
}
