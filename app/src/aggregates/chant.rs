//! Chant practice session counter.
//!
//! One session at a time, counting repetitions toward a chosen target
//! through exactly one input mode: manual taps, speech-recognition
//! transcripts, or completed audio playbacks. The counter never passes the
//! target; reaching it completes the session exactly once, plays the
//! completion tone, and appends the achievement to the durable history.
//! Further counting input is ignored until an explicit reset.

use super::Rejection;
use crate::collaborators::{AchievementLog, ChantAchievement, ChantMedia};
use crate::types::{MantraId, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tirtha_core::{SmallVec, effect::Effect, environment::Clock, reducer::Reducer, smallvec};
use tirtha_macros::Action;

/// Sacred tokens the speech recognizer listens for.
///
/// One utterance containing any of these counts exactly one repetition,
/// however many tokens it matched.
pub const SACRED_KEYWORDS: &[&str] = &[
    "om", "aum", "namah", "shivaya", "hare", "krishna", "rama", "govinda",
];

/// Target repetition count for a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChantTarget {
    /// Nine repetitions
    Nine,
    /// One mala round, 108 repetitions
    Mala,
    /// A sahasra round, 1008 repetitions
    Sahasra,
    /// User-chosen count
    Custom(u32),
}

impl ChantTarget {
    /// The repetition count this target stands for
    #[must_use]
    pub const fn count(self) -> u32 {
        match self {
            Self::Nine => 9,
            Self::Mala => 108,
            Self::Sahasra => 1008,
            Self::Custom(n) => n,
        }
    }
}

/// The input mode driving a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    /// Explicit user increments
    Manual,
    /// Speech-recognition transcript events
    Voice,
    /// Completed audio playbacks
    Audio,
}

impl std::fmt::Display for InputMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Manual => "manual",
            Self::Voice => "voice",
            Self::Audio => "audio",
        };
        write!(f, "{name}")
    }
}

/// One practice session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChantSession {
    /// The mantra being practiced
    pub mantra: MantraId,
    /// Target repetition count
    pub target: u32,
    /// The one active input mode
    pub mode: InputMode,
    /// Repetitions so far; never exceeds `target`
    pub count: u32,
    /// Whether the target has been reached
    pub completed: bool,
    /// When the session started
    pub started_at: DateTime<Utc>,
}

/// State of the chant counter.
#[derive(Clone, Debug, Default)]
pub struct ChantState {
    /// The current session, if one was started
    pub session: Option<ChantSession>,
    /// Most recent command rejection, if any
    pub last_rejection: Option<Rejection>,
}

impl ChantState {
    /// Create state with no session
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Whether an utterance counts a repetition.
///
/// Case-insensitive whole-word match against [`SACRED_KEYWORDS`].
#[must_use]
pub fn contains_sacred_keyword(text: &str) -> bool {
    text.split(|c: char| !c.is_alphabetic())
        .filter(|word| !word.is_empty())
        .any(|word| {
            let lowered = word.to_lowercase();
            SACRED_KEYWORDS.contains(&lowered.as_str())
        })
}

/// Actions for the chant counter
#[derive(Action, Clone, Debug, Serialize, Deserialize)]
pub enum ChantAction {
    /// Begin a session (replaces a completed one; an active one must be
    /// reset first)
    #[command]
    StartSession {
        /// The mantra to practice
        mantra: MantraId,
        /// Target repetition count
        target: ChantTarget,
        /// The input mode for the whole session
        mode: InputMode,
    },

    /// Count one repetition (manual mode)
    #[command]
    Increment,

    /// A speech-recognition transcript arrived (voice mode)
    #[command]
    TranscriptReceived {
        /// The recognized utterance
        text: String,
    },

    /// The audio clip finished one playback (audio mode)
    #[command]
    PlaybackFinished,

    /// Zero the counter and stop the active input mode
    #[command]
    Reset,

    /// A session began
    #[event]
    SessionStarted {
        /// The mantra
        mantra: MantraId,
        /// Resolved target count
        target: u32,
        /// Input mode
        mode: InputMode,
        /// When it began
        started_at: DateTime<Utc>,
    },

    /// The counter advanced
    #[event]
    CountAdvanced {
        /// The new count
        count: u32,
    },

    /// The target was reached
    #[event]
    SessionCompleted {
        /// The reached target
        target: u32,
        /// When it was reached
        completed_at: DateTime<Utc>,
    },

    /// The session was reset
    #[event]
    SessionReset,

    /// A command was rejected
    #[event]
    CommandRejected {
        /// Why
        rejection: Rejection,
    },
}

/// Environment dependencies for the chant counter
#[derive(Clone)]
pub struct ChantEnvironment {
    /// Clock for session timestamps
    pub clock: Arc<dyn Clock>,
    /// Capability probe and playback control
    pub media: Arc<dyn ChantMedia>,
    /// Durable achievement history
    pub achievements: Arc<dyn AchievementLog>,
}

impl ChantEnvironment {
    /// Creates a new `ChantEnvironment`
    #[must_use]
    pub fn new(
        clock: Arc<dyn Clock>,
        media: Arc<dyn ChantMedia>,
        achievements: Arc<dyn AchievementLog>,
    ) -> Self {
        Self {
            clock,
            media,
            achievements,
        }
    }
}

/// Reducer for the chant counter
#[derive(Clone, Debug, Default)]
pub struct ChantReducer;

impl ChantReducer {
    /// Creates a new `ChantReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn reject(state: &mut ChantState, rejection: Rejection) -> SmallVec<[Effect<ChantAction>; 4]> {
        Self::apply_event(state, &ChantAction::CommandRejected { rejection });
        SmallVec::new()
    }

    /// Advance the counter by one repetition for the given input mode.
    ///
    /// Events from a non-active mode are rejected; events after completion
    /// are ignored outright (completion happens exactly once).
    fn advance(
        state: &mut ChantState,
        env: &ChantEnvironment,
        mode: InputMode,
    ) -> SmallVec<[Effect<ChantAction>; 4]> {
        let Some(session) = &state.session else {
            return Self::reject(state, Rejection::Rule("no chant session is active".into()));
        };
        if session.mode != mode {
            let active = session.mode;
            return Self::reject(
                state,
                Rejection::Rule(format!(
                    "session is in {active} mode; {mode} input is not accepted"
                )),
            );
        }
        if session.completed {
            // Idempotent completion: late events are dropped silently.
            return SmallVec::new();
        }

        let count = session.count + 1;
        let target = session.target;
        let mantra = session.mantra;
        Self::apply_event(state, &ChantAction::CountAdvanced { count });

        if count >= target {
            let completed_at = env.clock.now();
            Self::apply_event(
                state,
                &ChantAction::SessionCompleted {
                    target,
                    completed_at,
                },
            );

            let media = Arc::clone(&env.media);
            let achievements = Arc::clone(&env.achievements);
            let achievement = ChantAchievement {
                target,
                completed_at,
            };
            return smallvec![
                Effect::fire_and_forget(async move {
                    media.play_completion_tone();
                }),
                Effect::fire_and_forget(async move {
                    if let Err(error) = achievements.append(&achievement) {
                        // Session is already completed; history append is
                        // best effort.
                        tracing::warn!(%error, "failed to append chant achievement");
                    }
                }),
            ];
        }

        if mode == InputMode::Audio {
            // Keep the loop going until the target is reached.
            let media = Arc::clone(&env.media);
            return smallvec![Effect::fire_and_forget(async move {
                media.play_clip(mantra);
            })];
        }

        smallvec![Effect::None]
    }

    fn apply_event(state: &mut ChantState, action: &ChantAction) {
        match action {
            ChantAction::SessionStarted {
                mantra,
                target,
                mode,
                started_at,
            } => {
                state.session = Some(ChantSession {
                    mantra: *mantra,
                    target: *target,
                    mode: *mode,
                    count: 0,
                    completed: false,
                    started_at: *started_at,
                });
                state.last_rejection = None;
            },

            ChantAction::CountAdvanced { count } => {
                if let Some(session) = &mut state.session {
                    session.count = (*count).min(session.target);
                }
                state.last_rejection = None;
            },

            ChantAction::SessionCompleted { .. } => {
                if let Some(session) = &mut state.session {
                    session.completed = true;
                }
                state.last_rejection = None;
            },

            ChantAction::SessionReset => {
                if let Some(session) = &mut state.session {
                    session.count = 0;
                    session.completed = false;
                }
                state.last_rejection = None;
            },

            ChantAction::CommandRejected { rejection } => {
                state.last_rejection = Some(rejection.clone());
            },

            // Commands don't modify state
            ChantAction::StartSession { .. }
            | ChantAction::Increment
            | ChantAction::TranscriptReceived { .. }
            | ChantAction::PlaybackFinished
            | ChantAction::Reset => {},
        }
    }
}

impl Reducer for ChantReducer {
    type State = ChantState;
    type Action = ChantAction;
    type Environment = ChantEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            ChantAction::StartSession {
                mantra,
                target,
                mode,
            } => {
                if state
                    .session
                    .as_ref()
                    .is_some_and(|session| !session.completed)
                {
                    return Self::reject(
                        state,
                        Rejection::Rule(
                            "a chant session is already active; reset it first".into(),
                        ),
                    );
                }
                if target.count() == 0 {
                    return Self::reject(
                        state,
                        Rejection::Validation(ValidationError::ZeroChantTarget.to_string()),
                    );
                }
                // Capability failures disable the mode with an explicit
                // message, never a silent no-op.
                if mode == InputMode::Voice && !env.media.speech_available() {
                    return Self::reject(
                        state,
                        Rejection::Rule(
                            "voice mode is unavailable: speech recognition is not supported here"
                                .into(),
                        ),
                    );
                }
                if mode == InputMode::Audio && !env.media.clip_available(mantra) {
                    return Self::reject(
                        state,
                        Rejection::Rule(
                            "audio mode is unavailable: this mantra has no audio clip".into(),
                        ),
                    );
                }

                let event = ChantAction::SessionStarted {
                    mantra,
                    target: target.count(),
                    mode,
                    started_at: env.clock.now(),
                };
                Self::apply_event(state, &event);

                if mode == InputMode::Audio {
                    let media = Arc::clone(&env.media);
                    return smallvec![Effect::fire_and_forget(async move {
                        media.play_clip(mantra);
                    })];
                }
                smallvec![Effect::None]
            },

            ChantAction::Increment => Self::advance(state, env, InputMode::Manual),

            ChantAction::TranscriptReceived { text } => {
                if contains_sacred_keyword(&text) {
                    Self::advance(state, env, InputMode::Voice)
                } else if state
                    .session
                    .as_ref()
                    .is_some_and(|s| s.mode != InputMode::Voice && !s.completed)
                {
                    // Transcript into a non-voice session is still a mode
                    // violation even without a keyword.
                    Self::advance(state, env, InputMode::Voice)
                } else {
                    // Nothing recognizable; not an error.
                    SmallVec::new()
                }
            },

            ChantAction::PlaybackFinished => Self::advance(state, env, InputMode::Audio),

            ChantAction::Reset => {
                if state.session.is_none() {
                    return SmallVec::new();
                }
                Self::apply_event(state, &ChantAction::SessionReset);

                let media = Arc::clone(&env.media);
                smallvec![Effect::fire_and_forget(async move {
                    // Halt recognition and rewind any active clip.
                    media.stop();
                })]
            },

            // Events (from effects or replays)
            event => {
                Self::apply_event(state, &event);
                SmallVec::new()
            },
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::collaborators::{InMemoryAchievementLog, StaticChantMedia};
    use tirtha_testing::{ReducerTest, test_clock};

    fn env() -> ChantEnvironment {
        env_with(StaticChantMedia::new(true), InMemoryAchievementLog::new()).0
    }

    fn env_with(
        media: StaticChantMedia,
        log: InMemoryAchievementLog,
    ) -> (ChantEnvironment, Arc<InMemoryAchievementLog>) {
        let log = Arc::new(log);
        (
            ChantEnvironment::new(
                Arc::new(test_clock()),
                Arc::new(media),
                Arc::clone(&log) as Arc<dyn AchievementLog>,
            ),
            log,
        )
    }

    fn started(target: ChantTarget, mode: InputMode) -> ChantState {
        let mut state = ChantState::new();
        let mantra = MantraId::new();
        let media = StaticChantMedia::new(true).with_clip(mantra);
        let (env, _) = env_with(media, InMemoryAchievementLog::new());
        ChantReducer::new().reduce(
            &mut state,
            ChantAction::StartSession {
                mantra,
                target,
                mode,
            },
            &env,
        );
        state
    }

    #[test]
    fn session_starts_at_zero() {
        let state = started(ChantTarget::Mala, InputMode::Manual);
        let session = state.session.unwrap();
        assert_eq!(session.target, 108);
        assert_eq!(session.count, 0);
        assert!(!session.completed);
    }

    #[test]
    fn nine_increments_complete_exactly_once() {
        let mut state = started(ChantTarget::Nine, InputMode::Manual);
        let (env, _) = env_with(StaticChantMedia::new(true), InMemoryAchievementLog::new());
        let reducer = ChantReducer::new();

        for _ in 0..9 {
            reducer.reduce(&mut state, ChantAction::Increment, &env);
        }

        let session = state.session.as_ref().unwrap();
        assert_eq!(session.count, 9);
        assert!(session.completed);

        // A tenth event is a no-op
        reducer.reduce(&mut state, ChantAction::Increment, &env);
        let session = state.session.as_ref().unwrap();
        assert_eq!(session.count, 9);
        assert!(session.completed);
    }

    #[test]
    fn reset_allows_a_fresh_completion() {
        let mut state = started(ChantTarget::Nine, InputMode::Manual);
        let (env, _) = env_with(StaticChantMedia::new(true), InMemoryAchievementLog::new());
        let reducer = ChantReducer::new();

        for _ in 0..9 {
            reducer.reduce(&mut state, ChantAction::Increment, &env);
        }
        reducer.reduce(&mut state, ChantAction::Reset, &env);

        {
            let session = state.session.as_ref().unwrap();
            assert_eq!(session.count, 0);
            assert!(!session.completed);
        }

        for _ in 0..9 {
            reducer.reduce(&mut state, ChantAction::Increment, &env);
        }
        let session = state.session.as_ref().unwrap();
        assert_eq!(session.count, 9);
        assert!(session.completed);
    }

    #[test]
    fn one_utterance_counts_once_however_many_keywords() {
        let mut state = started(ChantTarget::Mala, InputMode::Voice);
        let (env, _) = env_with(StaticChantMedia::new(true), InMemoryAchievementLog::new());
        let reducer = ChantReducer::new();

        reducer.reduce(
            &mut state,
            ChantAction::TranscriptReceived {
                text: "Om namah shivaya hare krishna".into(),
            },
            &env,
        );

        assert_eq!(state.session.unwrap().count, 1);
    }

    #[test]
    fn unrecognized_utterance_counts_nothing() {
        let mut state = started(ChantTarget::Mala, InputMode::Voice);
        let (env, _) = env_with(StaticChantMedia::new(true), InMemoryAchievementLog::new());
        let reducer = ChantReducer::new();

        reducer.reduce(
            &mut state,
            ChantAction::TranscriptReceived {
                text: "the weather is pleasant today".into(),
            },
            &env,
        );

        assert_eq!(state.session.as_ref().unwrap().count, 0);
        assert!(state.last_rejection.is_none());
    }

    #[test]
    fn input_from_inactive_mode_is_rejected() {
        let mut state = started(ChantTarget::Nine, InputMode::Manual);
        let (env, _) = env_with(StaticChantMedia::new(true), InMemoryAchievementLog::new());
        let reducer = ChantReducer::new();

        reducer.reduce(&mut state, ChantAction::PlaybackFinished, &env);

        assert_eq!(state.session.as_ref().unwrap().count, 0);
        assert!(matches!(state.last_rejection, Some(Rejection::Rule(_))));
    }

    #[test]
    fn voice_mode_without_speech_support_is_disabled() {
        let mut state = ChantState::new();
        let (env, _) = env_with(StaticChantMedia::new(false), InMemoryAchievementLog::new());
        let reducer = ChantReducer::new();

        reducer.reduce(
            &mut state,
            ChantAction::StartSession {
                mantra: MantraId::new(),
                target: ChantTarget::Nine,
                mode: InputMode::Voice,
            },
            &env,
        );

        assert!(state.session.is_none());
        let rejection = state.last_rejection.unwrap();
        assert!(rejection.message().contains("speech recognition"));
    }

    #[test]
    fn audio_mode_without_clip_is_disabled() {
        let mut state = ChantState::new();
        let (env, _) = env_with(StaticChantMedia::new(true), InMemoryAchievementLog::new());
        let reducer = ChantReducer::new();

        reducer.reduce(
            &mut state,
            ChantAction::StartSession {
                mantra: MantraId::new(),
                target: ChantTarget::Nine,
                mode: InputMode::Audio,
            },
            &env,
        );

        assert!(state.session.is_none());
        let rejection = state.last_rejection.unwrap();
        assert!(rejection.message().contains("no audio clip"));
    }

    #[test]
    fn audio_playback_loops_until_target() {
        let mantra = MantraId::new();
        let media = StaticChantMedia::new(true).with_clip(mantra);
        let (env, _) = env_with(media, InMemoryAchievementLog::new());
        let reducer = ChantReducer::new();
        let mut state = ChantState::new();

        reducer.reduce(
            &mut state,
            ChantAction::StartSession {
                mantra,
                target: ChantTarget::Custom(2),
                mode: InputMode::Audio,
            },
            &env,
        );

        let effects = reducer.reduce(&mut state, ChantAction::PlaybackFinished, &env);
        // Mid-session playback completion schedules a replay
        assert_eq!(effects.len(), 1);
        assert_eq!(state.session.as_ref().unwrap().count, 1);

        let effects = reducer.reduce(&mut state, ChantAction::PlaybackFinished, &env);
        // Completion: tone + achievement, no replay
        assert_eq!(effects.len(), 2);
        let session = state.session.as_ref().unwrap();
        assert!(session.completed);
        assert_eq!(session.count, 2);
    }

    #[test]
    fn starting_over_an_active_session_is_rejected() {
        let mut state = started(ChantTarget::Nine, InputMode::Manual);
        let (env, _) = env_with(StaticChantMedia::new(true), InMemoryAchievementLog::new());
        let reducer = ChantReducer::new();

        reducer.reduce(
            &mut state,
            ChantAction::StartSession {
                mantra: MantraId::new(),
                target: ChantTarget::Mala,
                mode: InputMode::Manual,
            },
            &env,
        );

        assert_eq!(state.session.as_ref().unwrap().target, 9);
        assert!(matches!(state.last_rejection, Some(Rejection::Rule(_))));
    }

    #[test]
    fn custom_zero_target_is_rejected() {
        let mut state = ChantState::new();
        let reducer = ChantReducer::new();

        reducer.reduce(
            &mut state,
            ChantAction::StartSession {
                mantra: MantraId::new(),
                target: ChantTarget::Custom(0),
                mode: InputMode::Manual,
            },
            &env(),
        );

        assert!(state.session.is_none());
        assert!(matches!(
            state.last_rejection,
            Some(Rejection::Validation(_))
        ));
    }

    #[test]
    fn keyword_matching_is_case_insensitive_and_word_bounded() {
        assert!(contains_sacred_keyword("OM"));
        assert!(contains_sacred_keyword("hare krishna!"));
        assert!(contains_sacred_keyword("chanting rama, again"));
        assert!(!contains_sacred_keyword("dramatic")); // "rama" only as a whole word
        assert!(!contains_sacred_keyword(""));
    }

    #[tokio::test]
    async fn completion_appends_to_achievement_history() {
        use tirtha_core::environment::Clock;
        use tirtha_runtime::Store;

        let log = Arc::new(InMemoryAchievementLog::new());
        let env = ChantEnvironment::new(
            Arc::new(test_clock()),
            Arc::new(StaticChantMedia::new(true)),
            Arc::clone(&log) as Arc<dyn AchievementLog>,
        );
        let store = Store::new(ChantState::new(), ChantReducer::new(), env);

        store
            .send(ChantAction::StartSession {
                mantra: MantraId::new(),
                target: ChantTarget::Custom(2),
                mode: InputMode::Manual,
            })
            .await;
        store.send(ChantAction::Increment).await;
        let mut handle = store.send(ChantAction::Increment).await;
        handle
            .wait_with_timeout(std::time::Duration::from_secs(1))
            .await
            .unwrap();

        let records = log.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].target, 2);
        assert_eq!(records[0].completed_at, test_clock().now());
    }
}
