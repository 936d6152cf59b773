//! Darshan booking lifecycle.
//!
//! Every booking is created `Awaiting` - whatever the darshan type or the
//! amount paid, including the free tier - because manual admin verification
//! is mandatory business policy. Only an admin moves a booking out of
//! `Awaiting`, into exactly one of `Confirmed`, `Cancelled`, or `Refunded`,
//! and nothing moves out of those. Re-opening means a new booking.
//!
//! The invoice number is issued at creation from a cryptographically strong
//! random source, so it can be handed to the devotee as an unguessable
//! external reference.

use super::{Actor, Rejection};
use crate::collaborators::InvoiceIssuer;
use crate::types::{
    BookingId, BookingStatus, ContactDetails, DarshanType, InvoiceNumber, Money, TempleId, UserId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tirtha_core::{SmallVec, effect::Effect, environment::Clock, reducer::Reducer, smallvec};
use tirtha_macros::Action;

/// One darshan booking.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Booking {
    /// Identity
    pub booking_id: BookingId,
    /// Temple being visited
    pub temple_id: TempleId,
    /// The devotee who booked
    pub user_id: UserId,
    /// Customer contact fields
    pub contact: ContactDetails,
    /// Which darshan offering
    pub darshan_type: DarshanType,
    /// Amount paid; zero for the free tier
    pub amount_paid: Money,
    /// The scheduled slot
    pub scheduled_for: DateTime<Utc>,
    /// Unique, unguessable invoice reference
    pub invoice: InvoiceNumber,
    /// Lifecycle status
    pub status: BookingStatus,
    /// When the booking was created
    pub created_at: DateTime<Utc>,
    /// When the status last changed
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    /// Advisory flag for the admin review queue: still awaiting verification
    /// although the scheduled slot has passed.
    ///
    /// Read-only derived condition - it never transitions the booking by
    /// itself, it just prompts an admin toward cancellation or refund.
    #[must_use]
    pub fn needs_attention(&self, now: DateTime<Utc>) -> bool {
        self.status == BookingStatus::Awaiting && self.scheduled_for < now
    }
}

/// State of the booking register.
#[derive(Clone, Debug, Default)]
pub struct BookingState {
    /// All bookings, terminal ones included - nothing is ever deleted
    pub bookings: HashMap<BookingId, Booking>,
    /// Most recent command rejection, if any
    pub last_rejection: Option<Rejection>,
}

impl BookingState {
    /// Create an empty register
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a booking
    #[must_use]
    pub fn get(&self, booking_id: &BookingId) -> Option<&Booking> {
        self.bookings.get(booking_id)
    }

    /// Whether a booking exists
    #[must_use]
    pub fn exists(&self, booking_id: &BookingId) -> bool {
        self.bookings.contains_key(booking_id)
    }

    /// Number of bookings ever created
    #[must_use]
    pub fn count(&self) -> usize {
        self.bookings.len()
    }

    /// Bookings still awaiting verification whose slot has passed
    #[must_use]
    pub fn needing_attention(&self, now: DateTime<Utc>) -> Vec<&Booking> {
        self.bookings
            .values()
            .filter(|b| b.needs_attention(now))
            .collect()
    }
}

/// Actions for the booking register
#[derive(Action, Clone, Debug, Serialize, Deserialize)]
pub enum BookingAction {
    /// Create a booking (user)
    #[command]
    CreateBooking {
        /// Identity for the new booking
        booking_id: BookingId,
        /// Temple being visited
        temple_id: TempleId,
        /// The booking devotee
        user_id: UserId,
        /// Customer contact fields
        contact: ContactDetails,
        /// Which darshan offering
        darshan_type: DarshanType,
        /// Amount paid
        amount_paid: Money,
        /// The scheduled slot
        scheduled_for: DateTime<Utc>,
    },

    /// Confirm a booking after out-of-band verification (admin)
    #[command]
    ConfirmBooking {
        /// Booking to confirm
        booking_id: BookingId,
        /// Acting caller
        actor: Actor,
    },

    /// Cancel a booking (admin)
    #[command]
    CancelBooking {
        /// Booking to cancel
        booking_id: BookingId,
        /// Acting caller
        actor: Actor,
    },

    /// Mark a paid booking refunded (admin)
    ///
    /// Records the status only; the refund itself is processed manually.
    #[command]
    RefundBooking {
        /// Booking to refund
        booking_id: BookingId,
        /// Acting caller
        actor: Actor,
    },

    /// A booking was created, awaiting verification
    #[event]
    BookingCreated {
        /// The created booking
        booking: Booking,
    },

    /// A booking was confirmed
    #[event]
    BookingConfirmed {
        /// The confirmed booking
        booking_id: BookingId,
        /// When the status changed
        updated_at: DateTime<Utc>,
    },

    /// A booking was cancelled
    #[event]
    BookingCancelled {
        /// The cancelled booking
        booking_id: BookingId,
        /// When the status changed
        updated_at: DateTime<Utc>,
    },

    /// A booking was marked refunded
    #[event]
    BookingRefunded {
        /// The refunded booking
        booking_id: BookingId,
        /// When the status changed
        updated_at: DateTime<Utc>,
    },

    /// A command was rejected
    #[event]
    CommandRejected {
        /// Why
        rejection: Rejection,
    },
}

impl BookingAction {
    /// The booking whose status this action may have changed, if any.
    ///
    /// Subscribers filtering the broadcast stream down to one booking use
    /// this as the change signal and then read store state for the truth -
    /// a rejected command broadcasts too, and re-reading state makes that
    /// harmless.
    #[must_use]
    pub const fn status_change_of(&self) -> Option<BookingId> {
        match self {
            Self::ConfirmBooking { booking_id, .. }
            | Self::CancelBooking { booking_id, .. }
            | Self::RefundBooking { booking_id, .. }
            | Self::BookingConfirmed { booking_id, .. }
            | Self::BookingCancelled { booking_id, .. }
            | Self::BookingRefunded { booking_id, .. } => Some(*booking_id),
            _ => None,
        }
    }
}

/// Environment dependencies for the booking register
#[derive(Clone)]
pub struct BookingEnvironment {
    /// Clock for creation and transition timestamps
    pub clock: Arc<dyn Clock>,
    /// Invoice issuance (CSPRNG in production)
    pub invoices: Arc<dyn InvoiceIssuer>,
}

impl BookingEnvironment {
    /// Creates a new `BookingEnvironment`
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, invoices: Arc<dyn InvoiceIssuer>) -> Self {
        Self { clock, invoices }
    }
}

/// Reducer for the booking register
#[derive(Clone, Debug, Default)]
pub struct BookingReducer;

impl BookingReducer {
    /// Creates a new `BookingReducer`
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    fn reject(
        state: &mut BookingState,
        rejection: Rejection,
    ) -> SmallVec<[Effect<BookingAction>; 4]> {
        Self::apply_event(state, &BookingAction::CommandRejected { rejection });
        SmallVec::new()
    }

    /// Shared gate for the three admin transitions.
    ///
    /// Checks actor role, existence, and that the booking is still
    /// `Awaiting` - the only state with a way out.
    fn check_transition(
        state: &BookingState,
        booking_id: BookingId,
        actor: Actor,
    ) -> Result<(), Rejection> {
        if !actor.is_admin() {
            return Err(Rejection::Forbidden(
                "only admins may change booking status".into(),
            ));
        }
        let Some(booking) = state.get(&booking_id) else {
            return Err(Rejection::NotFound(format!("booking {booking_id}")));
        };
        if booking.status.is_terminal() {
            return Err(Rejection::Rule(format!(
                "booking {booking_id} is already {}",
                booking.status
            )));
        }
        Ok(())
    }

    fn apply_event(state: &mut BookingState, action: &BookingAction) {
        match action {
            BookingAction::BookingCreated { booking } => {
                state.bookings.insert(booking.booking_id, booking.clone());
                state.last_rejection = None;
            },

            BookingAction::BookingConfirmed {
                booking_id,
                updated_at,
            } => {
                if let Some(booking) = state.bookings.get_mut(booking_id) {
                    booking.status = BookingStatus::Confirmed;
                    booking.updated_at = *updated_at;
                }
                state.last_rejection = None;
            },

            BookingAction::BookingCancelled {
                booking_id,
                updated_at,
            } => {
                if let Some(booking) = state.bookings.get_mut(booking_id) {
                    booking.status = BookingStatus::Cancelled;
                    booking.updated_at = *updated_at;
                }
                state.last_rejection = None;
            },

            BookingAction::BookingRefunded {
                booking_id,
                updated_at,
            } => {
                if let Some(booking) = state.bookings.get_mut(booking_id) {
                    booking.status = BookingStatus::Refunded;
                    booking.updated_at = *updated_at;
                }
                state.last_rejection = None;
            },

            BookingAction::CommandRejected { rejection } => {
                state.last_rejection = Some(rejection.clone());
            },

            // Commands don't modify state
            BookingAction::CreateBooking { .. }
            | BookingAction::ConfirmBooking { .. }
            | BookingAction::CancelBooking { .. }
            | BookingAction::RefundBooking { .. } => {},
        }
    }
}

impl Reducer for BookingReducer {
    type State = BookingState;
    type Action = BookingAction;
    type Environment = BookingEnvironment;

    fn reduce(
        &self,
        state: &mut Self::State,
        action: Self::Action,
        env: &Self::Environment,
    ) -> SmallVec<[Effect<Self::Action>; 4]> {
        match action {
            BookingAction::CreateBooking {
                booking_id,
                temple_id,
                user_id,
                contact,
                darshan_type,
                amount_paid,
                scheduled_for,
            } => {
                if state.exists(&booking_id) {
                    return Self::reject(
                        state,
                        Rejection::Rule(format!("booking {booking_id} already exists")),
                    );
                }

                let now = env.clock.now();
                let booking = Booking {
                    booking_id,
                    temple_id,
                    user_id,
                    contact,
                    darshan_type,
                    amount_paid,
                    scheduled_for,
                    invoice: env.invoices.issue(now),
                    // Mandatory manual verification: even free darshan
                    // starts awaiting.
                    status: BookingStatus::Awaiting,
                    created_at: now,
                    updated_at: now,
                };
                Self::apply_event(state, &BookingAction::BookingCreated { booking });
                smallvec![Effect::None]
            },

            BookingAction::ConfirmBooking { booking_id, actor } => {
                if let Err(rejection) = Self::check_transition(state, booking_id, actor) {
                    return Self::reject(state, rejection);
                }
                let event = BookingAction::BookingConfirmed {
                    booking_id,
                    updated_at: env.clock.now(),
                };
                Self::apply_event(state, &event);
                smallvec![Effect::None]
            },

            BookingAction::CancelBooking { booking_id, actor } => {
                if let Err(rejection) = Self::check_transition(state, booking_id, actor) {
                    return Self::reject(state, rejection);
                }
                let event = BookingAction::BookingCancelled {
                    booking_id,
                    updated_at: env.clock.now(),
                };
                Self::apply_event(state, &event);
                smallvec![Effect::None]
            },

            BookingAction::RefundBooking { booking_id, actor } => {
                if let Err(rejection) = Self::check_transition(state, booking_id, actor) {
                    return Self::reject(state, rejection);
                }
                let event = BookingAction::BookingRefunded {
                    booking_id,
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
    use crate::collaborators::SequentialInvoiceIssuer;
    use crate::session::Role;
    use tirtha_core::environment::Clock;
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

    fn test_env() -> BookingEnvironment {
        BookingEnvironment::new(
            Arc::new(test_clock()),
            Arc::new(SequentialInvoiceIssuer::new()),
        )
    }

    fn contact() -> ContactDetails {
        ContactDetails::new("Asha", "asha@example.com", "+919876543210").unwrap()
    }

    fn create(booking_id: BookingId, darshan_type: DarshanType, amount: u64) -> BookingAction {
        BookingAction::CreateBooking {
            booking_id,
            temple_id: TempleId::new(),
            user_id: UserId::new(),
            contact: contact(),
            darshan_type,
            amount_paid: Money::from_rupees(amount),
            scheduled_for: "2026-07-01T05:30:00Z".parse().unwrap(),
        }
    }

    #[test]
    fn every_booking_starts_awaiting_even_free() {
        for (darshan_type, amount) in [
            (DarshanType::Free, 0),
            (DarshanType::StandardTier1, 300),
            (DarshanType::Vip, 2500),
        ] {
            let booking_id = BookingId::new();
            ReducerTest::new(BookingReducer::new())
                .with_env(test_env())
                .given_state(BookingState::new())
                .when_action(create(booking_id, darshan_type, amount))
                .then_state(move |state| {
                    let booking = state.get(&booking_id).unwrap();
                    assert_eq!(booking.status, BookingStatus::Awaiting);
                })
                .run();
        }
    }

    #[test]
    fn invoice_is_issued_at_creation() {
        let booking_id = BookingId::new();

        ReducerTest::new(BookingReducer::new())
            .with_env(test_env())
            .given_state(BookingState::new())
            .when_action(create(booking_id, DarshanType::StandardTier1, 300))
            .then_state(move |state| {
                let booking = state.get(&booking_id).unwrap();
                assert_eq!(booking.invoice.as_str(), "INV-20250601-000000000000");
            })
            .run();
    }

    #[test]
    fn admin_confirms_awaiting_booking() {
        let booking_id = BookingId::new();

        ReducerTest::new(BookingReducer::new())
            .with_env(test_env())
            .given_state(BookingState::new())
            .when_action(create(booking_id, DarshanType::Free, 0))
            .when_action(BookingAction::ConfirmBooking {
                booking_id,
                actor: admin(),
            })
            .then_state(move |state| {
                let booking = state.get(&booking_id).unwrap();
                assert_eq!(booking.status, BookingStatus::Confirmed);
                assert!(state.last_rejection.is_none());
            })
            .run();
    }

    #[test]
    fn cancel_after_confirm_is_rejected() {
        let booking_id = BookingId::new();

        ReducerTest::new(BookingReducer::new())
            .with_env(test_env())
            .given_state(BookingState::new())
            .when_action(create(booking_id, DarshanType::Free, 0))
            .when_action(BookingAction::ConfirmBooking {
                booking_id,
                actor: admin(),
            })
            .when_action(BookingAction::CancelBooking {
                booking_id,
                actor: admin(),
            })
            .then_state(move |state| {
                // Terminal state holds
                let booking = state.get(&booking_id).unwrap();
                assert_eq!(booking.status, BookingStatus::Confirmed);
                assert!(matches!(state.last_rejection, Some(Rejection::Rule(_))));
            })
            .run();
    }

    #[test]
    fn non_admin_transition_is_forbidden() {
        let booking_id = BookingId::new();

        ReducerTest::new(BookingReducer::new())
            .with_env(test_env())
            .given_state(BookingState::new())
            .when_action(create(booking_id, DarshanType::Vip, 2500))
            .when_action(BookingAction::ConfirmBooking {
                booking_id,
                actor: devotee(),
            })
            .then_state(move |state| {
                let booking = state.get(&booking_id).unwrap();
                assert_eq!(booking.status, BookingStatus::Awaiting);
                assert!(matches!(
                    state.last_rejection,
                    Some(Rejection::Forbidden(_))
                ));
            })
            .run();
    }

    #[test]
    fn refund_records_status_only() {
        let booking_id = BookingId::new();

        ReducerTest::new(BookingReducer::new())
            .with_env(test_env())
            .given_state(BookingState::new())
            .when_action(create(booking_id, DarshanType::Vip, 2500))
            .when_action(BookingAction::RefundBooking {
                booking_id,
                actor: admin(),
            })
            .then_state(move |state| {
                let booking = state.get(&booking_id).unwrap();
                assert_eq!(booking.status, BookingStatus::Refunded);
                // Amount stays on record; money moves out of band
                assert_eq!(booking.amount_paid, Money::from_rupees(2500));
            })
            .run();
    }

    #[test]
    fn transition_of_missing_booking_is_not_found() {
        ReducerTest::new(BookingReducer::new())
            .with_env(test_env())
            .given_state(BookingState::new())
            .when_action(BookingAction::ConfirmBooking {
                booking_id: BookingId::new(),
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
    fn stale_awaiting_booking_needs_attention() {
        let booking_id = BookingId::new();
        let now = test_clock().now();

        ReducerTest::new(BookingReducer::new())
            .with_env(test_env())
            .given_state(BookingState::new())
            .when_action(BookingAction::CreateBooking {
                booking_id,
                temple_id: TempleId::new(),
                user_id: UserId::new(),
                contact: contact(),
                darshan_type: DarshanType::StandardTier2,
                amount_paid: Money::from_rupees(600),
                // Slot already in the past relative to the fixed clock
                scheduled_for: now - chrono::Duration::days(2),
            })
            .then_state(move |state| {
                assert_eq!(state.needing_attention(now).len(), 1);
                let booking = state.get(&booking_id).unwrap();
                assert!(booking.needs_attention(now));
                // Advisory only: still awaiting
                assert_eq!(booking.status, BookingStatus::Awaiting);
            })
            .run();
    }

    #[test]
    fn updated_at_tracks_transitions() {
        let booking_id = BookingId::new();
        let now = test_clock().now();

        ReducerTest::new(BookingReducer::new())
            .with_env(test_env())
            .given_state(BookingState::new())
            .when_action(create(booking_id, DarshanType::Free, 0))
            .when_action(BookingAction::ConfirmBooking {
                booking_id,
                actor: admin(),
            })
            .then_state(move |state| {
                let booking = state.get(&booking_id).unwrap();
                assert_eq!(booking.updated_at, now);
            })
            .run();
    }
}
