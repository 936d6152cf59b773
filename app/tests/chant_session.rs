//! Chant session scenarios driven through the store runtime.

#![allow(clippy::unwrap_used)]

use darshan::aggregates::chant::{
    ChantAction, ChantEnvironment, ChantReducer, ChantState, ChantTarget, InputMode,
};
use darshan::collaborators::{AchievementLog, InMemoryAchievementLog, StaticChantMedia};
use darshan::types::MantraId;
use std::sync::Arc;
use std::time::Duration;
use tirtha_runtime::{EffectHandle, Store};
use tirtha_testing::test_clock;

type ChantStore = Store<ChantState, ChantAction, ChantEnvironment, ChantReducer>;

fn chant_store(speech: bool) -> (ChantStore, Arc<InMemoryAchievementLog>) {
    let log = Arc::new(InMemoryAchievementLog::new());
    let store = Store::new(
        ChantState::new(),
        ChantReducer::new(),
        ChantEnvironment::new(
            Arc::new(test_clock()),
            Arc::new(StaticChantMedia::new(speech)),
            Arc::clone(&log) as Arc<dyn AchievementLog>,
        ),
    );
    (store, log)
}

async fn drain(mut handle: EffectHandle) {
    handle.wait_with_timeout(Duration::from_secs(1)).await.unwrap();
}

#[tokio::test]
async fn target_nine_completes_exactly_once_and_resets_cleanly() {
    let (store, log) = chant_store(false);

    store
        .send(ChantAction::StartSession {
            mantra: MantraId::new(),
            target: ChantTarget::Nine,
            mode: InputMode::Manual,
        })
        .await;

    for _ in 0..9 {
        drain(store.send(ChantAction::Increment).await).await;
    }

    let session = store.state(|s| s.session.clone().unwrap()).await;
    assert_eq!(session.count, 9);
    assert!(session.completed);
    assert_eq!(log.records().len(), 1);

    // A tenth event is a no-op: no count change, no second achievement.
    drain(store.send(ChantAction::Increment).await).await;
    let session = store.state(|s| s.session.clone().unwrap()).await;
    assert_eq!(session.count, 9);
    assert_eq!(log.records().len(), 1);

    // Reset: counter zeroed, completion cleared.
    drain(store.send(ChantAction::Reset).await).await;
    let session = store.state(|s| s.session.clone().unwrap()).await;
    assert_eq!(session.count, 0);
    assert!(!session.completed);

    // A fresh sequence of nine completes again.
    for _ in 0..9 {
        drain(store.send(ChantAction::Increment).await).await;
    }
    let session = store.state(|s| s.session.clone().unwrap()).await;
    assert!(session.completed);
    assert_eq!(log.records().len(), 2);
}

#[tokio::test]
async fn voice_session_counts_one_per_keyworded_utterance() {
    let (store, _log) = chant_store(true);

    store
        .send(ChantAction::StartSession {
            mantra: MantraId::new(),
            target: ChantTarget::Custom(3),
            mode: InputMode::Voice,
        })
        .await;

    for text in [
        "om namah shivaya",         // several keywords, one count
        "hare krishna hare rama",   // same
        "chai and conversation",    // no keyword, no count
        "aum",                      // third count, completes
    ] {
        drain(
            store
                .send(ChantAction::TranscriptReceived { text: text.into() })
                .await,
        )
        .await;
    }

    let session = store.state(|s| s.session.clone().unwrap()).await;
    assert_eq!(session.count, 3);
    assert!(session.completed);
}

#[tokio::test]
async fn voice_mode_requires_speech_support() {
    let (store, _log) = chant_store(false);

    store
        .send(ChantAction::StartSession {
            mantra: MantraId::new(),
            target: ChantTarget::Nine,
            mode: InputMode::Voice,
        })
        .await;

    let (session, rejection) = store
        .state(|s| (s.session.clone(), s.last_rejection.clone()))
        .await;
    assert!(session.is_none());
    assert!(rejection.is_some());
}
