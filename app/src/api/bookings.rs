//! Booking endpoints: creation, owner view, admin transitions, and the
//! per-booking WebSocket event stream.

use super::{authenticate, rejection_error};
use crate::aggregates::Actor;
use crate::aggregates::booking::{Booking, BookingAction};
use crate::server::AppState;
use crate::types::{BookingId, BookingStatus, ContactDetails, DarshanType, Money, TempleId, UserId};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tirtha_web::{AppError, BearerToken, WebResult};
use uuid::Uuid;

/// Request body for creating a booking.
#[derive(Debug, Deserialize)]
pub struct CreateBookingRequest {
    /// Temple to visit
    pub temple_id: TempleId,
    /// Customer name
    pub name: String,
    /// Customer email
    pub email: String,
    /// Customer phone
    pub phone: String,
    /// Darshan offering
    pub darshan_type: DarshanType,
    /// Amount paid, in whole rupees
    pub amount_paid: u64,
    /// The scheduled slot
    pub scheduled_for: DateTime<Utc>,
}

/// Request body for an admin status transition.
#[derive(Debug, Deserialize)]
pub struct TransitionRequest {
    /// Target status; `awaiting` is never a valid target
    pub status: BookingStatus,
}

/// Booking as returned to callers.
#[derive(Debug, Serialize, Deserialize)]
pub struct BookingView {
    /// Booking identity
    pub booking_id: BookingId,
    /// Temple being visited
    pub temple_id: TempleId,
    /// The booking devotee
    pub user_id: UserId,
    /// Darshan offering
    pub darshan_type: DarshanType,
    /// Amount paid in whole rupees
    pub amount_paid: u64,
    /// The scheduled slot
    pub scheduled_for: DateTime<Utc>,
    /// Invoice reference
    pub invoice: String,
    /// Lifecycle status
    pub status: BookingStatus,
    /// Still awaiting although the slot has passed
    pub needs_attention: bool,
    /// When created
    pub created_at: DateTime<Utc>,
    /// When the status last changed
    pub updated_at: DateTime<Utc>,
}

impl BookingView {
    fn from_booking(booking: &Booking, now: DateTime<Utc>) -> Self {
        Self {
            booking_id: booking.booking_id,
            temple_id: booking.temple_id,
            user_id: booking.user_id,
            darshan_type: booking.darshan_type,
            amount_paid: booking.amount_paid.rupees(),
            scheduled_for: booking.scheduled_for,
            invoice: booking.invoice.to_string(),
            status: booking.status,
            needs_attention: booking.needs_attention(now),
            created_at: booking.created_at,
            updated_at: booking.updated_at,
        }
    }
}

/// `POST /api/bookings` - create a booking.
///
/// Always lands in `awaiting`; the temple must exist and offer darshan.
pub async fn create_booking(
    State(state): State<AppState>,
    bearer: BearerToken,
    Json(request): Json<CreateBookingRequest>,
) -> WebResult<Json<BookingView>> {
    let session = authenticate(&state, &bearer)?;

    let contact = ContactDetails::new(request.name, request.email, request.phone)
        .map_err(|e| AppError::validation(e.to_string()))?;

    // Referential integrity lives with the record keeper: reject bookings
    // against unknown or darshan-less temples before creating anything.
    let temple = state
        .temples
        .state(|s| s.get(&request.temple_id).cloned())
        .await
        .ok_or_else(|| AppError::not_found("Temple", request.temple_id))?;
    if !temple.darshan_enabled {
        return Err(AppError::business_rule(
            "Darshan is not offered at this temple",
        ));
    }

    let booking_id = BookingId::new();
    state
        .bookings
        .send(BookingAction::CreateBooking {
            booking_id,
            temple_id: request.temple_id,
            user_id: session.user_id,
            contact,
            darshan_type: request.darshan_type,
            amount_paid: Money::from_rupees(request.amount_paid),
            scheduled_for: request.scheduled_for,
        })
        .await;

    let now = Utc::now();
    let booking = state
        .bookings
        .state(|s| s.get(&booking_id).cloned())
        .await;
    match booking {
        Some(booking) => Ok(Json(BookingView::from_booking(&booking, now))),
        None => {
            let rejection = state.bookings.state(|s| s.last_rejection.clone()).await;
            Err(rejection_error(rejection))
        },
    }
}

/// `GET /api/bookings/:id` - booking view for its owner or an admin.
pub async fn get_booking(
    State(state): State<AppState>,
    bearer: BearerToken,
    Path(booking_id): Path<Uuid>,
) -> WebResult<Json<BookingView>> {
    let session = authenticate(&state, &bearer)?;
    let booking_id = BookingId::from_uuid(booking_id);

    let booking = state
        .bookings
        .state(|s| s.get(&booking_id).cloned())
        .await
        .ok_or_else(|| AppError::not_found("Booking", booking_id))?;

    if booking.user_id != session.user_id && !session.is_admin() {
        return Err(AppError::forbidden("Not your booking"));
    }

    Ok(Json(BookingView::from_booking(&booking, Utc::now())))
}

/// `POST /api/bookings/:id/status` - admin transition out of `awaiting`.
pub async fn transition_booking(
    State(state): State<AppState>,
    bearer: BearerToken,
    Path(booking_id): Path<Uuid>,
    Json(request): Json<TransitionRequest>,
) -> WebResult<Json<BookingView>> {
    let session = authenticate(&state, &bearer)?;
    let booking_id = BookingId::from_uuid(booking_id);
    let actor = Actor::from(&session);

    let action = match request.status {
        BookingStatus::Confirmed => BookingAction::ConfirmBooking { booking_id, actor },
        BookingStatus::Cancelled => BookingAction::CancelBooking { booking_id, actor },
        BookingStatus::Refunded => BookingAction::RefundBooking { booking_id, actor },
        BookingStatus::Awaiting => {
            return Err(AppError::validation(
                "A booking cannot be transitioned back to awaiting",
            ));
        },
    };

    state.bookings.send(action).await;

    // A repeated transition to the same terminal status must still be
    // rejected, so the reducer's verdict is consulted rather than comparing
    // the status alone.
    let (booking, rejection) = state
        .bookings
        .state(|s| (s.get(&booking_id).cloned(), s.last_rejection.clone()))
        .await;

    if let Some(rejection) = rejection {
        return Err(rejection_error(Some(rejection)));
    }
    let booking = booking.ok_or_else(|| AppError::not_found("Booking", booking_id))?;
    Ok(Json(BookingView::from_booking(&booking, Utc::now())))
}

/// One message on the booking event stream.
#[derive(Debug, Serialize, Deserialize)]
pub struct BookingEventMessage {
    /// The booking
    pub booking_id: BookingId,
    /// Its status after the change
    pub status: BookingStatus,
    /// When the status changed
    pub updated_at: DateTime<Utc>,
}

/// `GET /api/bookings/:id/events` - WebSocket push of status changes.
///
/// The ticket view subscribes here instead of polling; closing the socket
/// is the unsubscribe.
pub async fn booking_events(
    State(state): State<AppState>,
    bearer: BearerToken,
    Path(booking_id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> WebResult<Response> {
    let session = authenticate(&state, &bearer)?;
    let booking_id = BookingId::from_uuid(booking_id);

    let booking = state
        .bookings
        .state(|s| s.get(&booking_id).cloned())
        .await
        .ok_or_else(|| AppError::not_found("Booking", booking_id))?;
    if booking.user_id != session.user_id && !session.is_admin() {
        return Err(AppError::forbidden("Not your booking"));
    }

    Ok(ws.on_upgrade(move |socket| stream_booking_events(socket, state, booking_id)))
}

async fn stream_booking_events(mut socket: WebSocket, state: AppState, booking_id: BookingId) {
    let mut events = state.bookings.subscribe();

    // Current status first, so the view renders without waiting for a change.
    if let Some(booking) = state.bookings.state(|s| s.get(&booking_id).cloned()).await {
        let snapshot = BookingEventMessage {
            booking_id,
            status: booking.status,
            updated_at: booking.updated_at,
        };
        if send_json(&mut socket, &snapshot).await.is_err() {
            return;
        }
    }

    loop {
        tokio::select! {
            incoming = socket.recv() => {
                // Client closed or errored: tear down the subscription.
                match incoming {
                    None | Some(Err(_)) => break,
                    Some(Ok(_)) => {},
                }
            },
            event = events.recv() => {
                use tokio::sync::broadcast::error::RecvError;
                match event {
                    Ok(action) => {
                        if action.status_change_of() != Some(booking_id) {
                            continue;
                        }
                        let Some(booking) =
                            state.bookings.state(|s| s.get(&booking_id).cloned()).await
                        else {
                            continue;
                        };
                        let message = BookingEventMessage {
                            booking_id,
                            status: booking.status,
                            updated_at: booking.updated_at,
                        };
                        if send_json(&mut socket, &message).await.is_err() {
                            break;
                        }
                    },
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, %booking_id, "booking event stream lagged");
                    },
                    Err(RecvError::Closed) => break,
                }
            },
        }
    }
}

async fn send_json(socket: &mut WebSocket, message: &BookingEventMessage) -> Result<(), ()> {
    let Ok(text) = serde_json::to_string(message) else {
        return Err(());
    };
    socket.send(Message::Text(text)).await.map_err(|_| ())
}
