//! Bhakthi loyalty ledger.
//!
//! Devotees log temple visits; an admin verifies them; verified visits carry
//! points into the ledger. The discount tier is derived on every read from
//! the verified visits - nothing about the score is persisted separately,
//! so the ledger can never drift from its source records.

use super::{Actor, Rejection};
use crate::types::{TempleId, UserId, VisitId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tirtha_core::{SmallVec, effect::Effect, environment::Clock, reducer::Reducer, smallvec};
use tirtha_macros::Action;

/// Points needed to unlock the next discount tier.
pub const POINTS_PER_TIER: u32 = 1000;

/// Discount percent granted per full tier.
pub const TIER_DISCOUNT_STEP: u32 = 25;

/// Cap on the loyalty discount percent.
pub const MAX_DISCOUNT_PERCENT: u8 = 25;

/// One logged temple visit.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TempleVisit {
    /// Identity
    pub visit_id: VisitId,
    /// Visited temple
    pub temple_id: TempleId,
    /// Visiting user
    pub user_id: UserId,
    /// Points this visit will carry once verified
    pub points_earned: u32,
    /// Whether an admin has verified the visit
    pub verified: bool,
    /// When the visit happened
    pub visit_date: DateTime<Utc>,
    /// Optional photo evidence
    pub photo_url: Option<String>,
}

/// Derived loyalty standing for one user.
///
/// Recomputed from verified visits on every read; never stored.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerSummary {
    /// Total verified points
    pub score: u32,
    /// Discount tier unlocked by the score
    pub discount_percent: u8,
    /// Points gathered toward the next tier
    pub progress_to_next: u32,
}

impl LedgerSummary {
    /// Derive a summary from visit records.
    ///
    /// Unverified visits contribute nothing, whatever their
    /// `points_earned` - the filter lives here and is not assumed to have
    /// happened upstream.
    pub fn from_visits<'a>(visits: impl IntoIterator<Item = &'a TempleVisit>) -> Self {
        let score = visits
            .into_iter()
            .filter(|v| v.verified)
            .map(|v| v.points_earned)
            .sum();
        Self::from_score(score)
    }

    /// Derive a summary from a raw verified-point score.
    #[must_use]
    pub const fn from_score(score: u32) -> Self {
        Self {
            score,
            discount_percent: discount_for_score(score),
            progress_to_next: score % POINTS_PER_TIER,
        }
    }
}

/// Discount percent for a verified-point score.
///
/// Every full 1000 points unlocks another 25%, capped at 25% - so in
/// practice a single tier, but the cap is enforced here rather than assumed.
/// Monotonically non-decreasing in the score.
#[must_use]
pub const fn discount_for_score(score: u32) -> u8 {
    let tiers = score / POINTS_PER_TIER;
    let percent = tiers.saturating_mul(TIER_DISCOUNT_STEP);
    if percent > MAX_DISCOUNT_PERCENT as u32 {
        MAX_DISCOUNT_PERCENT
    } else {
        // Cap guarantees this fits in u8
        #[allow(clippy::cast_possible_truncation)]
        {
            percent as u8
        }
    }
}

/// State of the loyalty ledger.
#[derive(Clone, Debug, Default)]
pub struct LoyaltyState {
    /// All logged visits
    pub visits: HashMap<VisitId, TempleVisit>,
    /// Most recent command rejection, if any
    pub last_rejection: Option<Rejection>,
}

impl LoyaltyState {
    /// Create an empty ledger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a visit
    #[must_use]
    pub fn get(&self, visit_id: &VisitId) -> Option<&TempleVisit> {
        self.visits.get(visit_id)
    }

    /// All visits logged by a user
    pub fn visits_for(&self, user_id: UserId) -> impl Iterator<Item = &TempleVisit> {
        self.visits.values().filter(move |v| v.user_id == user_id)
    }

    /// Derived loyalty standing for a user
    #[must_use]
    pub fn summary_for(&self, user_id: UserId) -> LedgerSummary {
        LedgerSummary::from_visits(self.visits_for(user_id))
    }
}

/// Actions for the loyalty ledger
#[derive(Action, Clone, Debug, Serialize, Deserialize)]
pub enum LoyaltyAction {
    /// Log a visit (user; starts unverified)
    #[command]
    LogVisit {
        /// Identity for the new visit
        visit_id: VisitId,
        /// Visited temple
        temple_id: TempleId,
        /// Visiting user
        user_id: UserId,
        /// Points the temple awards per verified visit
        points: u32,
        /// When the visit happened
        visit_date: DateTime<Utc>,
        /// Optional photo evidence
        photo_url: Option<String>,
    },

    /// Verify a visit (admin)
    #[command]
    VerifyVisit {
        /// Visit to verify
        visit_id: VisitId,
        /// Acting caller
        actor: Actor,
    },

    /// A visit was logged
    #[event]
    VisitLogged {
        /// The logged visit
        visit: TempleVisit,
    },

    /// A visit was verified
    #[event]
    VisitVerified {
        /// Verified visit
        visit_id: VisitId,
        /// When verification happened
        verified_at: DateTime<Utc>,
    },

    /// A command was rejected
    #[event]
    CommandRejected {
        /// Why
        rejection: Rejection,
    },
}

/// Environment dependencies for the loyalty ledger
#[derive(Clone)]
pub struct LoyaltyEnvironment {
    /// Clock for verification timestamps
    pub clock: Arc<dyn Clock>,
}

impl LoyaltyEnvironment {
    /// Creates a new `LoyaltyEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

/// Reducer for the loyalty ledger
#[derive(Clone, Debug, Default)]
pub struct LoyaltyReducer;

impl LoyaltyReducer {
    /// Creates a new `LoyaltyReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn reject(
        state: &mut LoyaltyState,
        rejection: Rejection,
    ) -> SmallVec<[Effect<LoyaltyAction>; 4]> {
        Self::apply_event(state, &LoyaltyAction::CommandRejected { rejection });
        SmallVec::new()
    }

    fn apply_event(state: &mut LoyaltyState, action: &LoyaltyAction) {
        match action {
            LoyaltyAction::VisitLogged { visit } => {
                state.visits.insert(visit.visit_id, visit.clone());
                state.last_rejection = None;
            },

            LoyaltyAction::VisitVerified { visit_id, .. } => {
                if let Some(visit) = state.visits.get_mut(visit_id) {
                    visit.verified = true;
                }
                state.last_rejection = None;
            },

            LoyaltyAction::CommandRejected { rejection } => {
                state.last_rejection = Some(rejection.clone());
            },

            // Commands don't modify state
            LoyaltyAction::LogVisit { .. } | LoyaltyAction::VerifyVisit { .. } => {},
        }
    }
}

impl Reducer for LoyaltyReducer {
    type State = LoyaltyState;
    type Action = LoyaltyAction;
    type Environment = LoyaltyEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            LoyaltyAction::LogVisit {
                visit_id,
                temple_id,
                user_id,
                points,
                visit_date,
                photo_url,
            } => {
                if state.visits.contains_key(&visit_id) {
                    return Self::reject(
                        state,
                        Rejection::Rule(format!("visit {visit_id} already logged")),
                    );
                }

                let visit = TempleVisit {
                    visit_id,
                    temple_id,
                    user_id,
                    points_earned: points,
                    verified: false,
                    visit_date,
                    photo_url,
                };
                Self::apply_event(state, &LoyaltyAction::VisitLogged { visit });
                smallvec![Effect::None]
            },

            LoyaltyAction::VerifyVisit { visit_id, actor } => {
                if !actor.is_admin() {
                    return Self::reject(
                        state,
                        Rejection::Forbidden("only admins may verify visits".into()),
                    );
                }
                let Some(visit) = state.get(&visit_id) else {
                    return Self::reject(state, Rejection::NotFound(format!("visit {visit_id}")));
                };
                if visit.verified {
                    return Self::reject(
                        state,
                        Rejection::Rule(format!("visit {visit_id} is already verified")),
                    );
                }

                let event = LoyaltyAction::VisitVerified {
                    visit_id,
                    verified_at: env.clock.now(),
                };
                Self::apply_event(state, &event);
                smallvec![Effect::None]
            },

            // Events (from effects or replays)
            event => {
                Self::apply_event(state, &event);
                SmallVec::new()
            },
        }
    }
}
