//! User-submitted temple contributions.
//!
//! Devotees propose temples; an admin reviews each submission into
//! approved, rejected, or waiting. A waiting submission can be resumed
//! later; approved and rejected are final. Approval is what feeds the
//! temple catalog - the server bridges the `ContributionReviewed` event to
//! a catalog registration so approved contributions surface in discovery.

use super::{Actor, Rejection};
use crate::types::{ContributionId, ContributionStatus, GeoPoint, UserId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tirtha_core::{SmallVec, effect::Effect, environment::Clock, reducer::Reducer, smallvec};
use tirtha_macros::Action;

/// One proposed temple.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Contribution {
    /// Identity
    pub contribution_id: ContributionId,
    /// The proposing user
    pub submitted_by: UserId,
    /// Proposed temple name
    pub name: String,
    /// Proposed coordinates
    pub geo: GeoPoint,
    /// City
    pub city: String,
    /// State or province
    pub state: String,
    /// Country
    pub country: String,
    /// Optional photo evidence
    pub photo_url: Option<String>,
    /// Review status
    pub status: ContributionStatus,
    /// When submitted
    pub created_at: DateTime<Utc>,
    /// When last reviewed
    pub updated_at: DateTime<Utc>,
}

/// State of the contribution queue.
#[derive(Clone, Debug, Default)]
pub struct ContributionState {
    /// All submissions
    pub contributions: HashMap<ContributionId, Contribution>,
    /// Most recent command rejection, if any
    pub last_rejection: Option<Rejection>,
}

impl ContributionState {
    /// Create an empty queue
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a submission
    #[must_use]
    pub fn get(&self, contribution_id: &ContributionId) -> Option<&Contribution> {
        self.contributions.get(contribution_id)
    }

    /// Approved submissions, for the discovery view
    #[must_use]
    pub fn approved(&self) -> Vec<&Contribution> {
        self.contributions
            .values()
            .filter(|c| c.status == ContributionStatus::Approved)
            .collect()
    }

    /// Submissions still waiting on a reviewer
    #[must_use]
    pub fn pending_review(&self) -> Vec<&Contribution> {
        self.contributions
            .values()
            .filter(|c| {
                matches!(
                    c.status,
                    ContributionStatus::Pending | ContributionStatus::Waiting
                )
            })
            .collect()
    }
}

/// Actions for the contribution queue
#[derive(Action, Clone, Debug, Serialize, Deserialize)]
pub enum ContributionAction {
    /// Propose a temple (user)
    #[command]
    SubmitContribution {
        /// Identity for the submission
        contribution_id: ContributionId,
        /// The proposing user
        submitted_by: UserId,
        /// Proposed temple name
        name: String,
        /// Proposed coordinates
        geo: GeoPoint,
        /// City
        city: String,
        /// State or province
        state: String,
        /// Country
        country: String,
        /// Optional photo evidence
        photo_url: Option<String>,
    },

    /// Review a submission (admin)
    #[command]
    ReviewContribution {
        /// Submission under review
        contribution_id: ContributionId,
        /// The reviewer's verdict
        verdict: ContributionStatus,
        /// Acting caller
        actor: Actor,
    },

    /// A temple was proposed
    #[event]
    ContributionSubmitted {
        /// The submission
        contribution: Contribution,
    },

    /// A submission was reviewed
    #[event]
    ContributionReviewed {
        /// The submission
        contribution_id: ContributionId,
        /// The verdict
        status: ContributionStatus,
        /// When reviewed
        reviewed_at: DateTime<Utc>,
    },

    /// A command was rejected
    #[event]
    CommandRejected {
        /// Why
        rejection: Rejection,
    },
}

/// Environment dependencies for the contribution queue
#[derive(Clone)]
pub struct ContributionEnvironment {
    /// Clock for submission and review timestamps
    pub clock: Arc<dyn Clock>,
}

impl ContributionEnvironment {
    /// Creates a new `ContributionEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

/// Reducer for the contribution queue
#[derive(Clone, Debug, Default)]
pub struct ContributionReducer;

impl ContributionReducer {
    /// Creates a new `ContributionReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn reject(
        state: &mut ContributionState,
        rejection: Rejection,
    ) -> SmallVec<[Effect<ContributionAction>; 4]> {
        Self::apply_event(state, &ContributionAction::CommandRejected { rejection });
        SmallVec::new()
    }

    fn apply_event(state: &mut ContributionState, action: &ContributionAction) {
        match action {
            ContributionAction::ContributionSubmitted { contribution } => {
                state
                    .contributions
                    .insert(contribution.contribution_id, contribution.clone());
                state.last_rejection = None;
            },

            ContributionAction::ContributionReviewed {
                contribution_id,
                status,
                reviewed_at,
            } => {
                if let Some(contribution) = state.contributions.get_mut(contribution_id) {
                    contribution.status = *status;
                    contribution.updated_at = *reviewed_at;
                }
                state.last_rejection = None;
            },

            ContributionAction::CommandRejected { rejection } => {
                state.last_rejection = Some(rejection.clone());
            },

            // Commands don't modify state
            ContributionAction::SubmitContribution { .. }
            | ContributionAction::ReviewContribution { .. } => {},
        }
    }
}

impl Reducer for ContributionReducer {
    type State = ContributionState;
    type Action = ContributionAction;
    type Environment = ContributionEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            ContributionAction::SubmitContribution {
                contribution_id,
                submitted_by,
                name,
                geo,
                city,
                state: region,
                country,
                photo_url,
            } => {
                if state.contributions.contains_key(&contribution_id) {
                    return Self::reject(
                        state,
                        Rejection::Rule(format!("contribution {contribution_id} already exists")),
                    );
                }
                if name.trim().is_empty() || city.trim().is_empty() {
                    return Self::reject(
                        state,
                        Rejection::Validation("temple name and city are required".into()),
                    );
                }

                let now = env.clock.now();
                let contribution = Contribution {
                    contribution_id,
                    submitted_by,
                    name,
                    geo,
                    city,
                    state: region,
                    country,
                    photo_url,
                    status: ContributionStatus::Pending,
                    created_at: now,
                    updated_at: now,
                };
                Self::apply_event(
                    state,
                    &ContributionAction::ContributionSubmitted { contribution },
                );
                smallvec![Effect::None]
            },

            ContributionAction::ReviewContribution {
                contribution_id,
                verdict,
                actor,
            } => {
                if !actor.is_admin() {
                    return Self::reject(
                        state,
                        Rejection::Forbidden("only admins may review contributions".into()),
                    );
                }
                if verdict == ContributionStatus::Pending {
                    return Self::reject(
                        state,
                        Rejection::Validation("a review verdict cannot be pending".into()),
                    );
                }
                let Some(contribution) = state.get(&contribution_id) else {
                    return Self::reject(
                        state,
                        Rejection::NotFound(format!("contribution {contribution_id}")),
                    );
                };
                let current = contribution.status;
                if !current.can_transition_to(verdict) {
                    return Self::reject(
                        state,
                        Rejection::Rule(format!(
                            "contribution {contribution_id} cannot move from {current} to {verdict}"
                        )),
                    );
                }

                let event = ContributionAction::ContributionReviewed {
                    contribution_id,
                    status: verdict,
                    reviewed_at: env.clock.now(),
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
