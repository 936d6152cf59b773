//! Promo codes and discount resolution.
//!
//! Validation fails closed: any failed check means no discount and a
//! specific error for the caller. Resolution never stacks discounts - a
//! valid promo code is the sole discount applied, even when the caller's
//! loyalty tier would have been larger.
//!
//! Usage counting is deliberately tied to checkout completion, not to the
//! "apply" click: a redemption is keyed by the order it completes, so
//! repeated applies (or a retried completion) can never increment
//! `current_uses` twice.

use super::{Actor, Rejection};
use crate::types::{Money, OrderId, ValidationError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use thiserror::Error;
use tirtha_core::{SmallVec, effect::Effect, environment::Clock, reducer::Reducer, smallvec};
use tirtha_macros::Action;

/// Why a promo code failed validation.
///
/// Each step of the sequence has its own variant so the storefront can show
/// the devotee exactly what went wrong.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PromoError {
    /// No code with that name exists
    #[error("promo code not found")]
    NotFound,

    /// The code has been switched off
    #[error("promo code is no longer active")]
    Inactive,

    /// Every permitted use has been consumed
    #[error("promo code has been fully redeemed")]
    Exhausted,

    /// The code's validity window has not opened yet
    #[error("promo code is not valid yet")]
    NotYetValid,

    /// The code's validity window has closed
    #[error("promo code has expired")]
    Expired,
}

/// A redeemable discount code.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PromoCode {
    /// The code, stored upper-cased; lookups normalize input the same way
    pub code: String,
    /// Discount percent in [1, 100]
    pub discount_percent: u8,
    /// Start of the validity window, if bounded
    pub valid_from: Option<DateTime<Utc>>,
    /// End of the validity window, if bounded
    pub valid_until: Option<DateTime<Utc>>,
    /// Redemption cap, if bounded
    pub max_uses: Option<u32>,
    /// Redemptions so far; never exceeds `max_uses` when set
    pub current_uses: u32,
    /// Whether the code is switched on
    pub is_active: bool,
    /// Orders that have already redeemed this code
    pub redeemed_orders: HashSet<OrderId>,
}

impl PromoCode {
    /// Check this code against the validation sequence.
    ///
    /// # Errors
    ///
    /// Returns the first failing step: inactive, exhausted, or outside the
    /// validity window.
    pub fn check(&self, now: DateTime<Utc>) -> Result<(), PromoError> {
        if !self.is_active {
            return Err(PromoError::Inactive);
        }
        if self.max_uses.is_some_and(|max| self.current_uses >= max) {
            return Err(PromoError::Exhausted);
        }
        if self.valid_from.is_some_and(|from| now < from) {
            return Err(PromoError::NotYetValid);
        }
        if self.valid_until.is_some_and(|until| now > until) {
            return Err(PromoError::Expired);
        }
        Ok(())
    }
}

/// Where the effective discount came from.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum DiscountSource {
    /// A validated promo code
    Promo {
        /// The normalized code
        code: String,
    },
    /// The caller's loyalty tier
    Loyalty,
    /// No discount applied
    None,
}

/// The single discount applied to a cart.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct EffectiveDiscount {
    /// Discount percent in [0, 100]
    pub percent: u8,
    /// Where it came from
    pub source: DiscountSource,
}

impl EffectiveDiscount {
    /// The no-discount value
    #[must_use]
    pub const fn none() -> Self {
        Self {
            percent: 0,
            source: DiscountSource::None,
        }
    }
}

/// Resolve the single effective discount for a cart.
///
/// Discounts do not stack. A validated promo code always wins - even when
/// the loyalty percent is larger - otherwise the loyalty discount applies
/// when above zero. Pure: same inputs, same decision.
#[must_use]
pub fn resolve_discount(promo: Option<&PromoCode>, loyalty_percent: u8) -> EffectiveDiscount {
    match promo {
        Some(code) => EffectiveDiscount {
            percent: code.discount_percent,
            source: DiscountSource::Promo {
                code: code.code.clone(),
            },
        },
        None if loyalty_percent > 0 => EffectiveDiscount {
            percent: loyalty_percent,
            source: DiscountSource::Loyalty,
        },
        None => EffectiveDiscount::none(),
    }
}

/// A priced cart: the resolution decision plus the final amount.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceQuote {
    /// Cart subtotal before discounts
    pub subtotal: Money,
    /// The one discount applied
    pub discount: EffectiveDiscount,
    /// `round(subtotal * (1 - percent/100))`
    pub final_price: Money,
}

/// State of the promo-code table.
#[derive(Clone, Debug, Default)]
pub struct PromoState {
    /// Codes keyed by their upper-cased form
    pub codes: HashMap<String, PromoCode>,
    /// Most recent command rejection, if any
    pub last_rejection: Option<Rejection>,
}

impl PromoState {
    /// Create an empty table
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up and fully validate a code as entered by a user.
    ///
    /// Input is normalized to upper case before lookup, so codes are
    /// case-insensitive end to end.
    ///
    /// # Errors
    ///
    /// Returns the first failing validation step.
    pub fn validate(&self, input: &str, now: DateTime<Utc>) -> Result<&PromoCode, PromoError> {
        let normalized = input.trim().to_uppercase();
        let code = self.codes.get(&normalized).ok_or(PromoError::NotFound)?;
        code.check(now)?;
        Ok(code)
    }

    /// Price a cart: optional promo input plus the caller's loyalty percent.
    ///
    /// Read-only and idempotent - quoting never consumes a use.
    ///
    /// # Errors
    ///
    /// Returns the promo validation failure when a code was entered and it
    /// fails any step; no discount is applied in that case.
    pub fn quote(
        &self,
        promo_input: Option<&str>,
        loyalty_percent: u8,
        subtotal: Money,
        now: DateTime<Utc>,
    ) -> Result<PriceQuote, PromoError> {
        let promo = match promo_input {
            Some(input) => Some(self.validate(input, now)?),
            None => None,
        };
        let discount = resolve_discount(promo, loyalty_percent);
        Ok(PriceQuote {
            subtotal,
            final_price: subtotal.discounted(discount.percent),
            discount,
        })
    }
}

/// Actions for the promo-code table
#[derive(Action, Clone, Debug, Serialize, Deserialize)]
pub enum PromoAction {
    /// Create a code (admin)
    #[command]
    CreateCode {
        /// The code (any case; stored upper-cased)
        code: String,
        /// Discount percent in [1, 100]
        discount_percent: u8,
        /// Start of validity window, if bounded
        valid_from: Option<DateTime<Utc>>,
        /// End of validity window, if bounded
        valid_until: Option<DateTime<Utc>>,
        /// Redemption cap, if bounded
        max_uses: Option<u32>,
        /// Acting caller
        actor: Actor,
    },

    /// Switch a code off (admin)
    #[command]
    DeactivateCode {
        /// The code to deactivate
        code: String,
        /// Acting caller
        actor: Actor,
    },

    /// Redeem a code for a completed checkout
    ///
    /// Idempotent per order: the same order can never consume two uses.
    #[command]
    RedeemCode {
        /// The code as entered
        code: String,
        /// The order whose checkout completed
        order_id: OrderId,
    },

    /// A code was created
    #[event]
    CodeCreated {
        /// The created code
        promo: PromoCode,
    },

    /// A code was switched off
    #[event]
    CodeDeactivated {
        /// The normalized code
        code: String,
    },

    /// A use was consumed
    #[event]
    CodeRedeemed {
        /// The normalized code
        code: String,
        /// The redeeming order
        order_id: OrderId,
    },

    /// A command was rejected
    #[event]
    CommandRejected {
        /// Why
        rejection: Rejection,
    },
}

/// Environment dependencies for the promo table
#[derive(Clone)]
pub struct PromoEnvironment {
    /// Clock for validity-window checks
    pub clock: Arc<dyn Clock>,
}

impl PromoEnvironment {
    /// Creates a new `PromoEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

/// Reducer for the promo-code table
#[derive(Clone, Debug, Default)]
pub struct PromoReducer;

impl PromoReducer {
    /// Creates a new `PromoReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn validate_new_code(
        discount_percent: u8,
        valid_from: Option<DateTime<Utc>>,
        valid_until: Option<DateTime<Utc>>,
    ) -> Result<(), ValidationError> {
        if !(1..=100).contains(&discount_percent) {
            return Err(ValidationError::DiscountPercentOutOfRange(discount_percent));
        }
        if let (Some(from), Some(until)) = (valid_from, valid_until) {
            if until < from {
                return Err(ValidationError::InvertedValidityWindow);
            }
        }
        Ok(())
    }

    fn reject(state: &mut PromoState, rejection: Rejection) -> SmallVec<[Effect<PromoAction>; 4]> {
        Self::apply_event(state, &PromoAction::CommandRejected { rejection });
        SmallVec::new()
    }

    fn apply_event(state: &mut PromoState, action: &PromoAction) {
        match action {
            PromoAction::CodeCreated { promo } => {
                state.codes.insert(promo.code.clone(), promo.clone());
                state.last_rejection = None;
            },

            PromoAction::CodeDeactivated { code } => {
                if let Some(promo) = state.codes.get_mut(code) {
                    promo.is_active = false;
                }
                state.last_rejection = None;
            },

            PromoAction::CodeRedeemed { code, order_id } => {
                if let Some(promo) = state.codes.get_mut(code) {
                    if promo.redeemed_orders.insert(*order_id) {
                        promo.current_uses += 1;
                    }
                }
                state.last_rejection = None;
            },

            PromoAction::CommandRejected { rejection } => {
                state.last_rejection = Some(rejection.clone());
            },

            // Commands don't modify state
            PromoAction::CreateCode { .. }
            | PromoAction::DeactivateCode { .. }
            | PromoAction::RedeemCode { .. } => {},
        }
    }
}

impl Reducer for PromoReducer {
    type State = PromoState;
    type Action = PromoAction;
    type Environment = PromoEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            PromoAction::CreateCode {
                code,
                discount_percent,
                valid_from,
                valid_until,
                max_uses,
                actor,
            } => {
                if !actor.is_admin() {
                    return Self::reject(
                        state,
                        Rejection::Forbidden("only admins may create promo codes".into()),
                    );
                }
                if let Err(error) = Self::validate_new_code(discount_percent, valid_from, valid_until)
                {
                    return Self::reject(state, Rejection::Validation(error.to_string()));
                }

                let normalized = code.trim().to_uppercase();
                if normalized.is_empty() {
                    return Self::reject(
                        state,
                        Rejection::Validation("promo code must not be empty".into()),
                    );
                }
                if state.codes.contains_key(&normalized) {
                    return Self::reject(
                        state,
                        Rejection::Rule(format!("promo code {normalized} already exists")),
                    );
                }

                let promo = PromoCode {
                    code: normalized,
                    discount_percent,
                    valid_from,
                    valid_until,
                    max_uses,
                    current_uses: 0,
                    is_active: true,
                    redeemed_orders: HashSet::new(),
                };
                Self::apply_event(state, &PromoAction::CodeCreated { promo });
                smallvec![Effect::None]
            },

            PromoAction::DeactivateCode { code, actor } => {
                if !actor.is_admin() {
                    return Self::reject(
                        state,
                        Rejection::Forbidden("only admins may deactivate promo codes".into()),
                    );
                }
                let normalized = code.trim().to_uppercase();
                if !state.codes.contains_key(&normalized) {
                    return Self::reject(
                        state,
                        Rejection::NotFound(format!("promo code {normalized}")),
                    );
                }

                Self::apply_event(state, &PromoAction::CodeDeactivated { code: normalized });
                smallvec![Effect::None]
            },

            PromoAction::RedeemCode { code, order_id } => {
                let now = env.clock.now();
                let normalized = code.trim().to_uppercase();

                // Repeat of an already-counted redemption: benign no-op.
                if state
                    .codes
                    .get(&normalized)
                    .is_some_and(|p| p.redeemed_orders.contains(&order_id))
                {
                    return SmallVec::new();
                }

                if let Err(error) = state.validate(&normalized, now) {
                    return Self::reject(state, Rejection::Rule(error.to_string()));
                }

                let event = PromoAction::CodeRedeemed {
                    code: normalized,
                    order_id,
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
    use tirtha_core::environment::Clock;
    use tirtha_testing::{ReducerTest, test_clock};

    fn admin() -> Actor {
        Actor {
            user_id: UserId::new(),
            role: Role::Admin,
        }
    }

    fn test_env() -> PromoEnvironment {
        PromoEnvironment::new(Arc::new(test_clock()))
    }

    fn create(code: &str, percent: u8, max_uses: Option<u32>) -> PromoAction {
        PromoAction::CreateCode {
            code: code.into(),
            discount_percent: percent,
            valid_from: None,
            valid_until: None,
            max_uses,
            actor: admin(),
        }
    }

    fn state_with_code(code: &str, percent: u8, max_uses: Option<u32>) -> PromoState {
        let mut state = PromoState::new();
        let reducer = PromoReducer::new();
        reducer.reduce(&mut state, create(code, percent, max_uses), &test_env());
        state
    }

    #[test]
    fn codes_are_stored_and_matched_case_insensitively() {
        let state = state_with_code("diwali25", 25, None);
        let now = test_clock().now();

        assert!(state.validate("DIWALI25", now).is_ok());
        assert!(state.validate("  diwali25 ", now).is_ok());
        assert_eq!(state.validate("HOLI10", now), Err(PromoError::NotFound));
    }

    #[test]
    fn percent_outside_range_is_rejected() {
        ReducerTest::new(PromoReducer::new())
            .with_env(test_env())
            .given_state(PromoState::new())
            .when_action(create("BAD", 0, None))
            .then_state(|state| {
                assert!(state.codes.is_empty());
                assert!(matches!(
                    state.last_rejection,
                    Some(Rejection::Validation(_))
                ));
            })
            .run();
    }

    #[test]
    fn inactive_code_fails_validation() {
        let mut state = state_with_code("HOLI10", 10, None);
        let reducer = PromoReducer::new();
        reducer.reduce(
            &mut state,
            PromoAction::DeactivateCode {
                code: "holi10".into(),
                actor: admin(),
            },
            &test_env(),
        );

        assert_eq!(
            state.validate("HOLI10", test_clock().now()),
            Err(PromoError::Inactive)
        );
    }

    #[test]
    fn exhausted_code_fails_validation() {
        let mut state = state_with_code("ONCE", 15, Some(1));
        let reducer = PromoReducer::new();
        reducer.reduce(
            &mut state,
            PromoAction::RedeemCode {
                code: "ONCE".into(),
                order_id: OrderId::new(),
            },
            &test_env(),
        );

        assert_eq!(state.codes["ONCE"].current_uses, 1);
        assert_eq!(
            state.validate("ONCE", test_clock().now()),
            Err(PromoError::Exhausted)
        );
    }

    #[test]
    fn window_is_honored_in_both_directions() {
        let now = test_clock().now();
        let mut state = PromoState::new();
        let reducer = PromoReducer::new();

        reducer.reduce(
            &mut state,
            PromoAction::CreateCode {
                code: "EARLY".into(),
                discount_percent: 10,
                valid_from: Some(now + chrono::Duration::days(1)),
                valid_until: None,
                max_uses: None,
                actor: admin(),
            },
            &test_env(),
        );
        reducer.reduce(
            &mut state,
            PromoAction::CreateCode {
                code: "LATE".into(),
                discount_percent: 10,
                valid_from: None,
                valid_until: Some(now - chrono::Duration::days(1)),
                max_uses: None,
                actor: admin(),
            },
            &test_env(),
        );

        assert_eq!(state.validate("EARLY", now), Err(PromoError::NotYetValid));
        assert_eq!(state.validate("LATE", now), Err(PromoError::Expired));
    }

    #[test]
    fn promo_supersedes_larger_loyalty_discount() {
        let state = state_with_code("FEST20", 20, None);
        let quote = state
            .quote(Some("FEST20"), 25, Money::from_rupees(1000), test_clock().now())
            .unwrap();

        assert_eq!(quote.discount.percent, 20);
        assert!(matches!(quote.discount.source, DiscountSource::Promo { .. }));
        assert_eq!(quote.final_price, Money::from_rupees(800));
    }

    #[test]
    fn loyalty_applies_when_no_promo_entered() {
        let state = PromoState::new();
        let quote = state
            .quote(None, 25, Money::from_rupees(1000), test_clock().now())
            .unwrap();

        assert_eq!(quote.discount.percent, 25);
        assert_eq!(quote.discount.source, DiscountSource::Loyalty);
        assert_eq!(quote.final_price, Money::from_rupees(750));
    }

    #[test]
    fn invalid_promo_fails_closed() {
        let state = state_with_code("ONCE", 15, Some(0));
        let result = state.quote(
            Some("ONCE"),
            25,
            Money::from_rupees(1000),
            test_clock().now(),
        );

        // No silent fallback to the loyalty discount
        assert_eq!(result, Err(PromoError::Exhausted));
    }

    #[test]
    fn quoting_is_idempotent() {
        let state = state_with_code("FEST20", 20, Some(5));
        let now = test_clock().now();

        let first = state
            .quote(Some("FEST20"), 0, Money::from_rupees(500), now)
            .unwrap();
        let second = state
            .quote(Some("FEST20"), 0, Money::from_rupees(500), now)
            .unwrap();

        assert_eq!(first, second);
        assert_eq!(state.codes["FEST20"].current_uses, 0);
    }

    #[test]
    fn redemption_is_idempotent_per_order() {
        let mut state = state_with_code("FEST20", 20, Some(5));
        let reducer = PromoReducer::new();
        let order_id = OrderId::new();

        for _ in 0..3 {
            reducer.reduce(
                &mut state,
                PromoAction::RedeemCode {
                    code: "FEST20".into(),
                    order_id,
                },
                &test_env(),
            );
        }

        assert_eq!(state.codes["FEST20"].current_uses, 1);

        reducer.reduce(
            &mut state,
            PromoAction::RedeemCode {
                code: "FEST20".into(),
                order_id: OrderId::new(),
            },
            &test_env(),
        );
        assert_eq!(state.codes["FEST20"].current_uses, 2);
    }

    #[test]
    fn redeeming_exhausted_code_is_rejected() {
        let mut state = state_with_code("ONCE", 15, Some(1));
        let reducer = PromoReducer::new();

        reducer.reduce(
            &mut state,
            PromoAction::RedeemCode {
                code: "ONCE".into(),
                order_id: OrderId::new(),
            },
            &test_env(),
        );
        reducer.reduce(
            &mut state,
            PromoAction::RedeemCode {
                code: "ONCE".into(),
                order_id: OrderId::new(),
            },
            &test_env(),
        );

        assert_eq!(state.codes["ONCE"].current_uses, 1);
        assert!(matches!(state.last_rejection, Some(Rejection::Rule(_))));
    }
}
