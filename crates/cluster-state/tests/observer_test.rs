use std::sync::Arc;
use std::time::Duration;

use assert_matches::assert_matches;
use keystone_cluster_state::{ClusterState, ClusterStateObserver, ObservedState, ObserverListener};
use tokio::sync::{mpsc, watch};
use tracing_test::traced_test;

fn state(version: u64) -> Arc<ClusterState> {
    Arc::new(ClusterState::builder().version(version).build())
}

#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Matched(u64),
    TimedOut(u64),
    Closed,
}

struct ChannelListener(mpsc::UnboundedSender<Outcome>);

impl ObserverListener for ChannelListener {
    fn on_new_cluster_state(self, state: Arc<ClusterState>) {
        let _ = self.0.send(Outcome::Matched(state.version()));
    }

    fn on_timeout(self, last_observed: Arc<ClusterState>) {
        let _ = self.0.send(Outcome::TimedOut(last_observed.version()));
    }

    fn on_cluster_service_close(self) {
        let _ = self.0.send(Outcome::Closed);
    }
}

#[tokio::test]
async fn test_matches_on_later_transition() {
    let (sender, receiver) = watch::channel(state(1));
    let observer = ClusterStateObserver::from_receiver(receiver, Some(Duration::from_secs(5)));

    let waiter = tokio::spawn(observer.wait_for(|state| state.version() >= 3));
    sender.send_replace(state(2));
    sender.send_replace(state(3));

    assert_matches!(waiter.await.unwrap(), ObservedState::Matched(state) if state.version() == 3);
}

#[tokio::test]
async fn test_subscription_released_after_resolution() {
    let (sender, receiver) = watch::channel(state(1));
    drop(receiver);

    let observer = ClusterStateObserver::from_receiver(sender.subscribe(), None);
    assert_eq!(sender.receiver_count(), 1);

    let waiter = tokio::spawn(observer.wait_for(|state| state.version() == 2));
    sender.send_replace(state(2));
    assert_matches!(waiter.await.unwrap(), ObservedState::Matched(_));

    assert_eq!(sender.receiver_count(), 0);
}

#[tokio::test]
#[traced_test]
async fn test_listener_receives_exactly_one_outcome() {
    let (sender, receiver) = watch::channel(state(1));
    let (outcomes, mut received) = mpsc::unbounded_channel();

    let matched = ClusterStateObserver::from_receiver(receiver, None)
        .register(|state| state.version() == 2, ChannelListener(outcomes.clone()));
    let timed_out = ClusterStateObserver::from_receiver(
        sender.subscribe(),
        Some(Duration::from_millis(20)),
    )
    .register(|_| false, ChannelListener(outcomes.clone()));
    timed_out.await.unwrap();
    assert_eq!(received.recv().await, Some(Outcome::TimedOut(1)));

    sender.send_replace(state(2));
    matched.await.unwrap();
    assert_eq!(received.recv().await, Some(Outcome::Matched(2)));

    let closed = ClusterStateObserver::from_receiver(sender.subscribe(), None)
        .register(|_| false, ChannelListener(outcomes));
    drop(sender);
    closed.await.unwrap();
    assert_eq!(received.recv().await, Some(Outcome::Closed));

    // every listener has been consumed
    assert_eq!(received.recv().await, None);
    assert!(logs_contain("closed while observing"));
}
