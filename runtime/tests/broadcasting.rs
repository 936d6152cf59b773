//! Action broadcast behavior: multiple observers, late subscription, and
//! teardown by dropping the receiver.

#![allow(clippy::unwrap_used)]

use smallvec::{SmallVec, smallvec};
use std::time::Duration;
use tirtha_core::effect::Effect;
use tirtha_core::reducer::Reducer;
use tirtha_runtime::Store;

#[derive(Debug, Clone, Default)]
struct EchoState {
    seen: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum EchoAction {
    Say(u32),
}

struct EchoReducer;

impl Reducer for EchoReducer {
    type State = EchoState;
    type Action = EchoAction;
    type Environment = ();

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        _env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        let EchoAction::Say(_) = action;
        state.seen += 1;
        smallvec![Effect::None]
    }
}

#[tokio::test]
async fn every_observer_receives_every_action() {
    let store = Store::new(EchoState::default(), EchoReducer, ());
    let mut first = store.subscribe();
    let mut second = store.subscribe();

    store.send(EchoAction::Say(1)).await;
    store.send(EchoAction::Say(2)).await;

    for receiver in [&mut first, &mut second] {
        assert_eq!(receiver.recv().await.unwrap(), EchoAction::Say(1));
        assert_eq!(receiver.recv().await.unwrap(), EchoAction::Say(2));
    }
}

#[tokio::test]
async fn late_subscribers_miss_earlier_actions() {
    let store = Store::new(EchoState::default(), EchoReducer, ());

    // No receiver yet; this action is processed but not buffered.
    store.send(EchoAction::Say(1)).await;

    let mut late = store.subscribe();
    store.send(EchoAction::Say(2)).await;

    assert_eq!(late.recv().await.unwrap(), EchoAction::Say(2));
    assert_eq!(store.state(|s| s.seen).await, 2);
}

#[tokio::test]
async fn dropping_the_receiver_is_the_unsubscribe() {
    let store = Store::new(EchoState::default(), EchoReducer, ());

    let receiver = store.subscribe();
    drop(receiver);

    // No panic, no backpressure: actions flow on without observers.
    store.send(EchoAction::Say(1)).await;
    assert_eq!(store.state(|s| s.seen).await, 1);
}

#[tokio::test]
async fn pending_effects_drain_before_shutdown() {
    let store = Store::new(EchoState::default(), EchoReducer, ());
    store.send(EchoAction::Say(1)).await;

    store.shutdown(Duration::from_secs(1)).await.unwrap();
    assert_eq!(store.pending_effects(), 0);
}
