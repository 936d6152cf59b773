//! Loyalty endpoints: visit logging, admin verification, and the derived
//! ledger summary.

use super::{authenticate, rejection_error};
use crate::aggregates::Actor;
use crate::aggregates::loyalty::{LedgerSummary, LoyaltyAction, TempleVisit};
use crate::server::AppState;
use crate::types::{TempleId, UserId, VisitId};
use axum::Json;
use axum::extract::{Path, State};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tirtha_web::{AppError, BearerToken, WebResult};
use uuid::Uuid;

/// Request body for logging a visit.
#[derive(Debug, Deserialize)]
pub struct LogVisitRequest {
    /// Visited temple
    pub temple_id: TempleId,
    /// When the visit happened; defaults to now
    pub visit_date: Option<DateTime<Utc>>,
    /// Optional photo evidence URL
    pub photo_url: Option<String>,
}

/// Visit as returned to callers.
#[derive(Debug, Serialize, Deserialize)]
pub struct VisitView {
    /// Visit identity
    pub visit_id: VisitId,
    /// Visited temple
    pub temple_id: TempleId,
    /// Visiting user
    pub user_id: UserId,
    /// Points the visit will carry once verified
    pub points_earned: u32,
    /// Whether an admin has verified the visit
    pub verified: bool,
    /// When the visit happened
    pub visit_date: DateTime<Utc>,
}

impl From<&TempleVisit> for VisitView {
    fn from(visit: &TempleVisit) -> Self {
        Self {
            visit_id: visit.visit_id,
            temple_id: visit.temple_id,
            user_id: visit.user_id,
            points_earned: visit.points_earned,
            verified: visit.verified,
            visit_date: visit.visit_date,
        }
    }
}

/// `POST /api/visits` - log a visit (starts unverified).
pub async fn log_visit(
    State(state): State<AppState>,
    bearer: BearerToken,
    Json(request): Json<LogVisitRequest>,
) -> WebResult<Json<VisitView>> {
    let session = authenticate(&state, &bearer)?;

    // Points are copied from the temple at log time.
    let temple = state
        .temples
        .state(|s| s.get(&request.temple_id).cloned())
        .await
        .ok_or_else(|| AppError::not_found("Temple", request.temple_id))?;

    let visit_id = VisitId::new();
    state
        .loyalty
        .send(LoyaltyAction::LogVisit {
            visit_id,
            temple_id: request.temple_id,
            user_id: session.user_id,
            points: temple.visit_points,
            visit_date: request.visit_date.unwrap_or_else(Utc::now),
            photo_url: request.photo_url,
        })
        .await;

    let visit = state.loyalty.state(|s| s.get(&visit_id).cloned()).await;
    match visit {
        Some(visit) => Ok(Json(VisitView::from(&visit))),
        None => {
            let rejection = state.loyalty.state(|s| s.last_rejection.clone()).await;
            Err(rejection_error(rejection))
        },
    }
}

/// `POST /api/visits/:id/verify` - admin verification.
pub async fn verify_visit(
    State(state): State<AppState>,
    bearer: BearerToken,
    Path(visit_id): Path<Uuid>,
) -> WebResult<Json<VisitView>> {
    let session = authenticate(&state, &bearer)?;
    let visit_id = VisitId::from_uuid(visit_id);
    let actor = Actor::from(&session);

    state
        .loyalty
        .send(LoyaltyAction::VerifyVisit { visit_id, actor })
        .await;

    // Verifying twice is rejected by the reducer although the visit reads
    // as verified either way, so its verdict decides.
    let (visit, rejection) = state
        .loyalty
        .state(|s| (s.get(&visit_id).cloned(), s.last_rejection.clone()))
        .await;

    if let Some(rejection) = rejection {
        return Err(rejection_error(Some(rejection)));
    }
    let visit = visit.ok_or_else(|| AppError::not_found("Visit", visit_id))?;
    Ok(Json(VisitView::from(&visit)))
}

/// `GET /api/loyalty/me` - the caller's derived ledger standing.
pub async fn my_summary(
    State(state): State<AppState>,
    bearer: BearerToken,
) -> WebResult<Json<LedgerSummary>> {
    let session = authenticate(&state, &bearer)?;
    let user_id = session.user_id;

    let summary = state
        .loyalty
        .state(move |s| s.summary_for(user_id))
        .await;
    Ok(Json(summary))
}
