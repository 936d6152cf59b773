//! Property tests for the loyalty tier law, the rounding law, and the
//! no-stacking promotion policy.

#![allow(clippy::unwrap_used)]

use darshan::aggregates::Actor;
use darshan::aggregates::loyalty::discount_for_score;
use darshan::aggregates::promo::{
    DiscountSource, PromoAction, PromoEnvironment, PromoError, PromoReducer, PromoState,
    resolve_discount,
};
use darshan::session::Role;
use darshan::types::{Money, OrderId, UserId};
use proptest::prelude::*;
use std::sync::Arc;
use tirtha_core::environment::Clock;
use tirtha_core::reducer::Reducer;
use tirtha_testing::test_clock;

fn admin() -> Actor {
    Actor {
        user_id: UserId::new(),
        role: Role::Admin,
    }
}

fn promo_env() -> PromoEnvironment {
    PromoEnvironment::new(Arc::new(test_clock()))
}

fn state_with_code(code: &str, percent: u8, max_uses: Option<u32>) -> PromoState {
    let mut state = PromoState::new();
    PromoReducer::new().reduce(
        &mut state,
        PromoAction::CreateCode {
            code: code.into(),
            discount_percent: percent,
            valid_from: None,
            valid_until: None,
            max_uses,
            actor: admin(),
        },
        &promo_env(),
    );
    state
}

proptest! {
    /// `discount(S) = min(floor(S/1000)*25, 25)` for all scores.
    #[test]
    fn discount_tier_law(score in 0u32..5_000_000) {
        let expected = ((u64::from(score) / 1000) * 25).min(25);
        prop_assert_eq!(u64::from(discount_for_score(score)), expected);
    }

    /// The discount is monotonically non-decreasing in the score.
    #[test]
    fn discount_is_monotone(a in 0u32..100_000, b in 0u32..100_000) {
        let (lo, hi) = if a <= b { (a, b) } else { (b, a) };
        prop_assert!(discount_for_score(lo) <= discount_for_score(hi));
    }

    /// `final = round(subtotal * (1 - d/100))`, rounding to the nearest
    /// whole currency unit.
    #[test]
    fn rounding_law(subtotal in 0u64..10_000_000, percent in 0u8..=100) {
        let expected = (subtotal as f64 * (1.0 - f64::from(percent) / 100.0)).round() as u64;
        prop_assert_eq!(
            Money::from_rupees(subtotal).discounted(percent).rupees(),
            expected
        );
    }

    /// A valid promo code supersedes the loyalty discount, whatever the
    /// two percentages are.
    #[test]
    fn promo_always_supersedes_loyalty(promo_percent in 1u8..=100, loyalty_percent in 0u8..=25) {
        let state = state_with_code("CODE", promo_percent, None);
        let quote = state
            .quote(Some("CODE"), loyalty_percent, Money::from_rupees(1000), test_clock().now())
            .unwrap();

        prop_assert_eq!(quote.discount.percent, promo_percent);
        prop_assert!(matches!(quote.discount.source, DiscountSource::Promo { .. }));
    }

    /// A code whose uses are exhausted is rejected for any cap ≥ 1.
    #[test]
    fn exhausted_code_is_rejected(max_uses in 1u32..50) {
        let mut state = state_with_code("CAPPED", 10, Some(max_uses));
        let reducer = PromoReducer::new();
        let env = promo_env();

        for _ in 0..max_uses {
            reducer.reduce(
                &mut state,
                PromoAction::RedeemCode {
                    code: "CAPPED".into(),
                    order_id: OrderId::new(),
                },
                &env,
            );
        }

        prop_assert_eq!(state.codes["CAPPED"].current_uses, max_uses);
        prop_assert_eq!(
            state.validate("CAPPED", test_clock().now()),
            Err(PromoError::Exhausted)
        );
    }

    /// Resolution is a pure function of its inputs.
    #[test]
    fn resolution_is_idempotent(percent in 1u8..=100, loyalty in 0u8..=25, subtotal in 0u64..1_000_000) {
        let state = state_with_code("SAME", percent, Some(3));
        let now = test_clock().now();

        let first = state.quote(Some("SAME"), loyalty, Money::from_rupees(subtotal), now);
        let second = state.quote(Some("SAME"), loyalty, Money::from_rupees(subtotal), now);
        prop_assert_eq!(first, second);
    }
}

#[test]
fn spec_pinned_pricing_example() {
    // P=1000, promo 20%, loyalty 25% available: promo wins, final 800.
    let state = state_with_code("FEST20", 20, None);
    let quote = state
        .quote(Some("FEST20"), 25, Money::from_rupees(1000), test_clock().now())
        .unwrap();

    assert_eq!(quote.final_price, Money::from_rupees(800));
}

#[test]
fn loyalty_used_when_no_promo() {
    let summary_discount = discount_for_score(1800);
    assert_eq!(summary_discount, 25);

    let resolved = resolve_discount(None, summary_discount);
    assert_eq!(resolved.percent, 25);
    assert_eq!(resolved.source, DiscountSource::Loyalty);
    assert_eq!(
        Money::from_rupees(1000).discounted(resolved.percent),
        Money::from_rupees(750)
    );
}
