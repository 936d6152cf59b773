//! Temple catalog.
//!
//! The record every other aggregate references. Temples enter the catalog
//! through an admin registration (directly, or via an approved user
//! contribution) and are mutated only by admin edits. There is no delete:
//! bookings and visits keep referencing their temple forever.

use super::{Actor, Rejection};
use crate::types::{GeoPoint, Rating, TempleId};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tirtha_core::{SmallVec, effect::Effect, environment::Clock, reducer::Reducer, smallvec};
use tirtha_macros::Action;
use serde::{Deserialize, Serialize};

/// Points a temple awards per verified visit unless an admin sets otherwise.
pub const DEFAULT_VISIT_POINTS: u32 = 100;

/// A temple in the catalog.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Temple {
    /// Identity
    pub temple_id: TempleId,
    /// Temple name
    pub name: String,
    /// Geocoordinates
    pub geo: GeoPoint,
    /// City
    pub city: String,
    /// State or province
    pub state: String,
    /// Country
    pub country: String,
    /// Rating on the 0-5 scale
    pub rating: Rating,
    /// Bhakthi points awarded per verified visit
    pub visit_points: u32,
    /// Whether darshan slots can be booked here
    pub darshan_enabled: bool,
    /// When the temple was registered
    pub created_at: DateTime<Utc>,
    /// When the temple was last edited
    pub updated_at: DateTime<Utc>,
}

/// Partial update applied by an admin edit.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TempleUpdate {
    /// New name, if changing
    pub name: Option<String>,
    /// New coordinates, if changing
    pub geo: Option<GeoPoint>,
    /// New rating, if changing
    pub rating: Option<Rating>,
    /// New per-visit point value, if changing
    pub visit_points: Option<u32>,
    /// New darshan-enabled flag, if changing
    pub darshan_enabled: Option<bool>,
}

/// State of the temple catalog.
#[derive(Clone, Debug, Default)]
pub struct TempleState {
    /// All registered temples
    pub temples: HashMap<TempleId, Temple>,
    /// Most recent command rejection, if any
    pub last_rejection: Option<Rejection>,
}

impl TempleState {
    /// Create an empty catalog
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a temple
    #[must_use]
    pub fn get(&self, temple_id: &TempleId) -> Option<&Temple> {
        self.temples.get(temple_id)
    }

    /// Whether a temple is registered
    #[must_use]
    pub fn exists(&self, temple_id: &TempleId) -> bool {
        self.temples.contains_key(temple_id)
    }

    /// Number of registered temples
    #[must_use]
    pub fn count(&self) -> usize {
        self.temples.len()
    }

    /// Temples in a city, case-insensitively
    #[must_use]
    pub fn in_city(&self, city: &str) -> Vec<&Temple> {
        self.temples
            .values()
            .filter(|t| t.city.eq_ignore_ascii_case(city))
            .collect()
    }
}

/// Actions for the temple catalog
#[derive(Action, Clone, Debug, Serialize, Deserialize)]
pub enum TempleAction {
    /// Register a temple (admin, or the contribution bridge)
    #[command]
    RegisterTemple {
        /// Identity for the new temple
        temple_id: TempleId,
        /// Temple name
        name: String,
        /// Coordinates
        geo: GeoPoint,
        /// City
        city: String,
        /// State or province
        state: String,
        /// Country
        country: String,
        /// Rating
        rating: Rating,
        /// Points per verified visit
        visit_points: u32,
        /// Whether darshan is bookable
        darshan_enabled: bool,
        /// Acting caller
        actor: Actor,
    },

    /// Edit an existing temple (admin)
    #[command]
    UpdateTemple {
        /// Temple to edit
        temple_id: TempleId,
        /// Fields to change
        update: TempleUpdate,
        /// Acting caller
        actor: Actor,
    },

    /// A temple entered the catalog
    #[event]
    TempleRegistered {
        /// The registered temple
        temple: Temple,
    },

    /// A temple was edited
    #[event]
    TempleUpdated {
        /// Temple that changed
        temple_id: TempleId,
        /// Applied changes
        update: TempleUpdate,
        /// When the edit was applied
        updated_at: DateTime<Utc>,
    },

    /// A command was rejected
    #[event]
    CommandRejected {
        /// Why
        rejection: Rejection,
    },
}

/// Environment dependencies for the temple catalog
#[derive(Clone)]
pub struct TempleEnvironment {
    /// Clock for registration and edit timestamps
    pub clock: Arc<dyn Clock>,
}

impl TempleEnvironment {
    /// Creates a new `TempleEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

/// Reducer for the temple catalog
#[derive(Clone, Debug, Default)]
pub struct TempleReducer;

impl TempleReducer {
    /// Creates a new `TempleReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn reject(state: &mut TempleState, rejection: Rejection) -> SmallVec<[Effect<TempleAction>; 4]> {
        Self::apply_event(state, &TempleAction::CommandRejected { rejection });
        SmallVec::new()
    }

    fn apply_event(state: &mut TempleState, action: &TempleAction) {
        match action {
            TempleAction::TempleRegistered { temple } => {
                state.temples.insert(temple.temple_id, temple.clone());
                state.last_rejection = None;
            },

            TempleAction::TempleUpdated {
                temple_id,
                update,
                updated_at,
            } => {
                if let Some(temple) = state.temples.get_mut(temple_id) {
                    if let Some(name) = &update.name {
                        temple.name.clone_from(name);
                    }
                    if let Some(geo) = update.geo {
                        temple.geo = geo;
                    }
                    if let Some(rating) = update.rating {
                        temple.rating = rating;
                    }
                    if let Some(points) = update.visit_points {
                        temple.visit_points = points;
                    }
                    if let Some(enabled) = update.darshan_enabled {
                        temple.darshan_enabled = enabled;
                    }
                    temple.updated_at = *updated_at;
                }
                state.last_rejection = None;
            },

            TempleAction::CommandRejected { rejection } => {
                state.last_rejection = Some(rejection.clone());
            },

            // Commands don't modify state
            TempleAction::RegisterTemple { .. } | TempleAction::UpdateTemple { .. } => {},
        }
    }
}

impl Reducer for TempleReducer {
    type State = TempleState;
    type Action = TempleAction;
    type Environment = TempleEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            TempleAction::RegisterTemple {
                temple_id,
                name,
                geo,
                city,
                state: region,
                country,
                rating,
                visit_points,
                darshan_enabled,
                actor,
            } => {
                if !actor.is_admin() {
                    return Self::reject(
                        state,
                        Rejection::Forbidden("only admins may register temples".into()),
                    );
                }
                if state.exists(&temple_id) {
                    return Self::reject(
                        state,
                        Rejection::Rule(format!("temple {temple_id} already registered")),
                    );
                }
                if name.trim().is_empty() || city.trim().is_empty() {
                    return Self::reject(
                        state,
                        Rejection::Validation("temple name and city are required".into()),
                    );
                }

                let now = env.clock.now();
                let temple = Temple {
                    temple_id,
                    name,
                    geo,
                    city,
                    state: region,
                    country,
                    rating,
                    visit_points,
                    darshan_enabled,
                    created_at: now,
                    updated_at: now,
                };
                Self::apply_event(state, &TempleAction::TempleRegistered { temple });
                smallvec![Effect::None]
            },

            TempleAction::UpdateTemple {
                temple_id,
                update,
                actor,
            } => {
                if !actor.is_admin() {
                    return Self::reject(
                        state,
                        Rejection::Forbidden("only admins may edit temples".into()),
                    );
                }
                if !state.exists(&temple_id) {
                    return Self::reject(
                        state,
                        Rejection::NotFound(format!("temple {temple_id}")),
                    );
                }
                if update.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
                    return Self::reject(
                        state,
                        Rejection::Validation("temple name must not be empty".into()),
                    );
                }

                let event = TempleAction::TempleUpdated {
                    temple_id,
                    update,
                    updated_at: env.clock.now(),
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

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::session::Role;
    use crate::types::UserId;
    use tirtha_testing::{ReducerTest, test_clock};

    fn admin() -> Actor {
        Actor {
            user_id: UserId::new(),
            role: Role::Admin,
        }
    }

    fn devotee() -> Actor {
        Actor {
            user_id: UserId::new(),
            role: Role::User,
        }
    }

    fn test_env() -> TempleEnvironment {
        TempleEnvironment::new(Arc::new(test_clock()))
    }

    fn register(temple_id: TempleId, actor: Actor) -> TempleAction {
        TempleAction::RegisterTemple {
            temple_id,
            name: "Meenakshi Amman".into(),
            geo: GeoPoint::new(9.9195, 78.1193).unwrap(),
            city: "Madurai".into(),
            state: "Tamil Nadu".into(),
            country: "India".into(),
            rating: Rating::new(4.8).unwrap(),
            visit_points: 150,
            darshan_enabled: true,
            actor,
        }
    }

    #[test]
    fn admin_registers_temple() {
        let temple_id = TempleId::new();

        ReducerTest::new(TempleReducer::new())
            .with_env(test_env())
            .given_state(TempleState::new())
            .when_action(register(temple_id, admin()))
            .then_state(move |state| {
                assert_eq!(state.count(), 1);
                let temple = state.get(&temple_id).unwrap();
                assert_eq!(temple.visit_points, 150);
                assert!(temple.darshan_enabled);
                assert!(state.last_rejection.is_none());
            })
            .run();
    }

    #[test]
    fn non_admin_registration_is_forbidden() {
        let temple_id = TempleId::new();

        ReducerTest::new(TempleReducer::new())
            .with_env(test_env())
            .given_state(TempleState::new())
            .when_action(register(temple_id, devotee()))
            .then_state(|state| {
                assert_eq!(state.count(), 0);
                assert!(matches!(
                    state.last_rejection,
                    Some(Rejection::Forbidden(_))
                ));
            })
            .run();
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let temple_id = TempleId::new();

        ReducerTest::new(TempleReducer::new())
            .with_env(test_env())
            .given_state(TempleState::new())
            .when_action(register(temple_id, admin()))
            .when_action(register(temple_id, admin()))
            .then_state(|state| {
                assert_eq!(state.count(), 1);
                assert!(matches!(state.last_rejection, Some(Rejection::Rule(_))));
            })
            .run();
    }

    #[test]
    fn update_changes_only_named_fields() {
        let temple_id = TempleId::new();

        ReducerTest::new(TempleReducer::new())
            .with_env(test_env())
            .given_state(TempleState::new())
            .when_action(register(temple_id, admin()))
            .when_action(TempleAction::UpdateTemple {
                temple_id,
                update: TempleUpdate {
                    visit_points: Some(200),
                    darshan_enabled: Some(false),
                    ..TempleUpdate::default()
                },
                actor: admin(),
            })
            .then_state(move |state| {
                let temple = state.get(&temple_id).unwrap();
                assert_eq!(temple.visit_points, 200);
                assert!(!temple.darshan_enabled);
                assert_eq!(temple.name, "Meenakshi Amman");
            })
            .run();
    }

    #[test]
    fn update_of_missing_temple_is_not_found() {
        ReducerTest::new(TempleReducer::new())
            .with_env(test_env())
            .given_state(TempleState::new())
            .when_action(TempleAction::UpdateTemple {
                temple_id: TempleId::new(),
                update: TempleUpdate::default(),
                actor: admin(),
            })
            .then_state(|state| {
                assert!(matches!(
                    state.last_rejection,
                    Some(Rejection::NotFound(_))
                ));
            })
            .run();
    }

    #[test]
    fn city_lookup_is_case_insensitive() {
        let temple_id = TempleId::new();

        ReducerTest::new(TempleReducer::new())
            .with_env(test_env())
            .given_state(TempleState::new())
            .when_action(register(temple_id, admin()))
            .then_state(|state| {
                assert_eq!(state.in_city("madurai").len(), 1);
                assert_eq!(state.in_city("Chennai").len(), 0);
            })
            .run();
    }
}
