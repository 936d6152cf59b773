//! Privileged admin read endpoints.
//!
//! Contract for both: missing or invalid bearer token ⇒ 401, authenticated
//! but not admin ⇒ 403, otherwise 200 with the JSON payload.

use super::{authenticate, rejection_error, require_admin};
use crate::aggregates::Actor;
use crate::aggregates::promo::PromoAction;
use crate::server::AppState;
use crate::types::{BookingId, BookingStatus, DarshanType, TempleId, UserId};
use axum::Json;
use axum::extract::State;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tirtha_web::{BearerToken, WebResult};

/// One row of the admin booking dashboard.
#[derive(Debug, Serialize, Deserialize)]
pub struct AdminBookingRow {
    /// Booking identity
    pub booking_id: BookingId,
    /// Temple being visited
    pub temple_id: TempleId,
    /// Temple name, joined from the catalog
    pub temple_name: Option<String>,
    /// The booking devotee
    pub user_id: UserId,
    /// Customer name
    pub customer_name: String,
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
}

/// `GET /api/admin/bookings` - every booking, joined with its temple.
pub async fn list_bookings(
    State(state): State<AppState>,
    bearer: BearerToken,
) -> WebResult<Json<Vec<AdminBookingRow>>> {
    let session = authenticate(&state, &bearer)?;
    require_admin(&session)?;

    let temple_names: HashMap<TempleId, String> = state
        .temples
        .state(|s| {
            s.temples
                .values()
                .map(|t| (t.temple_id, t.name.clone()))
                .collect()
        })
        .await;

    let now = Utc::now();
    let mut rows = state
        .bookings
        .state(move |s| {
            s.bookings
                .values()
                .map(|b| AdminBookingRow {
                    booking_id: b.booking_id,
                    temple_id: b.temple_id,
                    temple_name: temple_names.get(&b.temple_id).cloned(),
                    user_id: b.user_id,
                    customer_name: b.contact.name.clone(),
                    darshan_type: b.darshan_type,
                    amount_paid: b.amount_paid.rupees(),
                    scheduled_for: b.scheduled_for,
                    invoice: b.invoice.to_string(),
                    status: b.status,
                    needs_attention: b.needs_attention(now),
                    created_at: b.created_at,
                })
                .collect::<Vec<_>>()
        })
        .await;

    // Newest first, stale-awaiting bookings surfaced on top.
    rows.sort_by(|a, b| {
        b.needs_attention
            .cmp(&a.needs_attention)
            .then(b.created_at.cmp(&a.created_at))
    });

    Ok(Json(rows))
}

/// Request body for creating a promo code.
#[derive(Debug, Deserialize)]
pub struct CreatePromoRequest {
    /// The code (any case; stored upper-cased)
    pub code: String,
    /// Discount percent in [1, 100]
    pub discount_percent: u8,
    /// Start of validity window, if bounded
    pub valid_from: Option<DateTime<Utc>>,
    /// End of validity window, if bounded
    pub valid_until: Option<DateTime<Utc>>,
    /// Redemption cap, if bounded
    pub max_uses: Option<u32>,
}

/// Promo code as returned to callers.
#[derive(Debug, Serialize, Deserialize)]
pub struct PromoView {
    /// The normalized code
    pub code: String,
    /// Discount percent
    pub discount_percent: u8,
    /// Redemptions so far
    pub current_uses: u32,
    /// Redemption cap, if bounded
    pub max_uses: Option<u32>,
    /// Whether the code is switched on
    pub is_active: bool,
}

/// `POST /api/admin/promos` - create a promo code.
pub async fn create_promo(
    State(state): State<AppState>,
    bearer: BearerToken,
    Json(request): Json<CreatePromoRequest>,
) -> WebResult<Json<PromoView>> {
    let session = authenticate(&state, &bearer)?;
    require_admin(&session)?;

    let normalized = request.code.trim().to_uppercase();
    state
        .promos
        .send(PromoAction::CreateCode {
            code: request.code,
            discount_percent: request.discount_percent,
            valid_from: request.valid_from,
            valid_until: request.valid_until,
            max_uses: request.max_uses,
            actor: Actor::from(&session),
        })
        .await;

    let promo = state
        .promos
        .state(move |s| s.codes.get(&normalized).cloned())
        .await;
    match promo {
        Some(promo) => Ok(Json(PromoView {
            code: promo.code,
            discount_percent: promo.discount_percent,
            current_uses: promo.current_uses,
            max_uses: promo.max_uses,
            is_active: promo.is_active,
        })),
        None => {
            let rejection = state.promos.state(|s| s.last_rejection.clone()).await;
            Err(rejection_error(rejection))
        },
    }
}

/// One row of the admin user dashboard.
#[derive(Debug, Serialize, Deserialize)]
pub struct AdminUserRow {
    /// The user
    pub user_id: UserId,
    /// Visits logged, verified or not
    pub total_visits: usize,
    /// Visits verified so far
    pub verified_visits: usize,
    /// Verified point score
    pub score: u32,
    /// Discount tier unlocked by the score
    pub discount_percent: u8,
    /// Points gathered toward the next tier
    pub progress_to_next: u32,
}

/// `GET /api/admin/users` - per-user visit aggregates.
pub async fn list_users(
    State(state): State<AppState>,
    bearer: BearerToken,
) -> WebResult<Json<Vec<AdminUserRow>>> {
    let session = authenticate(&state, &bearer)?;
    require_admin(&session)?;

    let mut rows = state
        .loyalty
        .state(|s| {
            let mut users: HashMap<UserId, (usize, usize)> = HashMap::new();
            for visit in s.visits.values() {
                let entry = users.entry(visit.user_id).or_default();
                entry.0 += 1;
                if visit.verified {
                    entry.1 += 1;
                }
            }

            users
                .into_iter()
                .map(|(user_id, (total, verified))| {
                    let summary = s.summary_for(user_id);
                    AdminUserRow {
                        user_id,
                        total_visits: total,
                        verified_visits: verified,
                        score: summary.score,
                        discount_percent: summary.discount_percent,
                        progress_to_next: summary.progress_to_next,
                    }
                })
                .collect::<Vec<_>>()
        })
        .await;

    rows.sort_by(|a, b| b.score.cmp(&a.score));
    Ok(Json(rows))
}
