//! Temple discovery and user contributions.

use super::{authenticate, rejection_error};
use crate::aggregates::Actor;
use crate::aggregates::contribution::ContributionAction;
use crate::aggregates::temple::{Temple, TempleAction, TempleUpdate};
use crate::server::AppState;
use crate::types::{ContributionId, ContributionStatus, GeoPoint, Rating, TempleId, UserId};
use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use tirtha_web::{AppError, BearerToken, WebResult};
use uuid::Uuid;

/// Query parameters for discovery.
#[derive(Debug, Default, Deserialize)]
pub struct DiscoveryQuery {
    /// Restrict to one city (case-insensitive)
    pub city: Option<String>,
    /// Restrict to temples offering darshan
    pub darshan_only: Option<bool>,
}

/// Temple as returned to callers.
#[derive(Debug, Serialize, Deserialize)]
pub struct TempleView {
    /// Temple identity
    pub temple_id: TempleId,
    /// Name
    pub name: String,
    /// Latitude
    pub latitude: f64,
    /// Longitude
    pub longitude: f64,
    /// City
    pub city: String,
    /// State or province
    pub state: String,
    /// Country
    pub country: String,
    /// Rating on the 0-5 scale
    pub rating: f32,
    /// Points per verified visit
    pub visit_points: u32,
    /// Whether darshan is bookable
    pub darshan_enabled: bool,
}

impl From<&Temple> for TempleView {
    fn from(temple: &Temple) -> Self {
        Self {
            temple_id: temple.temple_id,
            name: temple.name.clone(),
            latitude: temple.geo.latitude,
            longitude: temple.geo.longitude,
            city: temple.city.clone(),
            state: temple.state.clone(),
            country: temple.country.clone(),
            rating: temple.rating.value(),
            visit_points: temple.visit_points,
            darshan_enabled: temple.darshan_enabled,
        }
    }
}

/// `GET /api/temples` - discovery list.
///
/// Approved contributions have already been registered into the catalog by
/// the contribution bridge, so one list covers both canonical and
/// community-sourced temples.
pub async fn list_temples(
    State(state): State<AppState>,
    Query(query): Query<DiscoveryQuery>,
) -> WebResult<Json<Vec<TempleView>>> {
    let views = state
        .temples
        .state(move |s| {
            let mut temples: Vec<TempleView> = s
                .temples
                .values()
                .filter(|t| {
                    query
                        .city
                        .as_deref()
                        .is_none_or(|city| t.city.eq_ignore_ascii_case(city))
                })
                .filter(|t| !query.darshan_only.unwrap_or(false) || t.darshan_enabled)
                .map(TempleView::from)
                .collect();
            temples.sort_by(|a, b| a.name.cmp(&b.name));
            temples
        })
        .await;

    Ok(Json(views))
}

/// Request body for registering a temple.
#[derive(Debug, Deserialize)]
pub struct RegisterTempleRequest {
    /// Temple name
    pub name: String,
    /// Latitude
    pub latitude: f64,
    /// Longitude
    pub longitude: f64,
    /// City
    pub city: String,
    /// State or province
    pub state: String,
    /// Country
    pub country: String,
    /// Rating on the 0-5 scale
    pub rating: f32,
    /// Points per verified visit
    pub visit_points: u32,
    /// Whether darshan is bookable
    pub darshan_enabled: bool,
}

/// `POST /api/temples` - register a temple (admin).
pub async fn register_temple(
    State(state): State<AppState>,
    bearer: BearerToken,
    Json(request): Json<RegisterTempleRequest>,
) -> WebResult<Json<TempleView>> {
    let session = authenticate(&state, &bearer)?;

    let geo = GeoPoint::new(request.latitude, request.longitude)
        .map_err(|e| AppError::validation(e.to_string()))?;
    let rating =
        Rating::new(request.rating).map_err(|e| AppError::validation(e.to_string()))?;

    let temple_id = TempleId::new();
    state
        .temples
        .send(TempleAction::RegisterTemple {
            temple_id,
            name: request.name,
            geo,
            city: request.city,
            state: request.state,
            country: request.country,
            rating,
            visit_points: request.visit_points,
            darshan_enabled: request.darshan_enabled,
            actor: Actor::from(&session),
        })
        .await;

    let temple = state.temples.state(|s| s.get(&temple_id).cloned()).await;
    match temple {
        Some(temple) => Ok(Json(TempleView::from(&temple))),
        None => {
            let rejection = state.temples.state(|s| s.last_rejection.clone()).await;
            Err(rejection_error(rejection))
        },
    }
}

/// Request body for editing a temple.
#[derive(Debug, Default, Deserialize)]
pub struct UpdateTempleRequest {
    /// New name, if changing
    pub name: Option<String>,
    /// New rating, if changing
    pub rating: Option<f32>,
    /// New per-visit point value, if changing
    pub visit_points: Option<u32>,
    /// New darshan-enabled flag, if changing
    pub darshan_enabled: Option<bool>,
}

/// `POST /api/temples/:id` - edit a temple (admin).
pub async fn update_temple(
    State(state): State<AppState>,
    bearer: BearerToken,
    Path(temple_id): Path<Uuid>,
    Json(request): Json<UpdateTempleRequest>,
) -> WebResult<Json<TempleView>> {
    let session = authenticate(&state, &bearer)?;
    let temple_id = TempleId::from_uuid(temple_id);

    let rating = request
        .rating
        .map(Rating::new)
        .transpose()
        .map_err(|e| AppError::validation(e.to_string()))?;

    state
        .temples
        .send(TempleAction::UpdateTemple {
            temple_id,
            update: TempleUpdate {
                name: request.name,
                geo: None,
                rating,
                visit_points: request.visit_points,
                darshan_enabled: request.darshan_enabled,
            },
            actor: Actor::from(&session),
        })
        .await;

    let rejection = state.temples.state(|s| s.last_rejection.clone()).await;
    if let Some(rejection) = rejection {
        return Err(rejection_error(Some(rejection)));
    }

    let temple = state
        .temples
        .state(|s| s.get(&temple_id).cloned())
        .await
        .ok_or_else(|| AppError::not_found("Temple", temple_id))?;
    Ok(Json(TempleView::from(&temple)))
}

/// Request body for proposing a temple.
#[derive(Debug, Deserialize)]
pub struct SubmitContributionRequest {
    /// Proposed temple name
    pub name: String,
    /// Latitude
    pub latitude: f64,
    /// Longitude
    pub longitude: f64,
    /// City
    pub city: String,
    /// State or province
    pub state: String,
    /// Country
    pub country: String,
    /// Optional photo evidence URL
    pub photo_url: Option<String>,
}

/// Contribution as returned to callers.
#[derive(Debug, Serialize, Deserialize)]
pub struct ContributionView {
    /// Submission identity
    pub contribution_id: ContributionId,
    /// The proposing user
    pub submitted_by: UserId,
    /// Proposed temple name
    pub name: String,
    /// Review status
    pub status: ContributionStatus,
}

/// `POST /api/contributions` - propose a temple.
pub async fn submit_contribution(
    State(state): State<AppState>,
    bearer: BearerToken,
    Json(request): Json<SubmitContributionRequest>,
) -> WebResult<Json<ContributionView>> {
    let session = authenticate(&state, &bearer)?;

    let geo = GeoPoint::new(request.latitude, request.longitude)
        .map_err(|e| AppError::validation(e.to_string()))?;

    let contribution_id = ContributionId::new();
    state
        .contributions
        .send(ContributionAction::SubmitContribution {
            contribution_id,
            submitted_by: session.user_id,
            name: request.name,
            geo,
            city: request.city,
            state: request.state,
            country: request.country,
            photo_url: request.photo_url,
        })
        .await;

    let contribution = state
        .contributions
        .state(|s| s.get(&contribution_id).cloned())
        .await;
    match contribution {
        Some(c) => Ok(Json(ContributionView {
            contribution_id: c.contribution_id,
            submitted_by: c.submitted_by,
            name: c.name,
            status: c.status,
        })),
        None => {
            let rejection = state
                .contributions
                .state(|s| s.last_rejection.clone())
                .await;
            Err(rejection_error(rejection))
        },
    }
}

/// Request body for reviewing a contribution.
#[derive(Debug, Deserialize)]
pub struct ReviewRequest {
    /// The verdict: approved, rejected, or waiting
    pub verdict: ContributionStatus,
}

/// `POST /api/contributions/:id/review` - admin review.
pub async fn review_contribution(
    State(state): State<AppState>,
    bearer: BearerToken,
    Path(contribution_id): Path<Uuid>,
    Json(request): Json<ReviewRequest>,
) -> WebResult<Json<ContributionView>> {
    let session = authenticate(&state, &bearer)?;
    let contribution_id = ContributionId::from_uuid(contribution_id);
    let actor = Actor::from(&session);

    state
        .contributions
        .send(ContributionAction::ReviewContribution {
            contribution_id,
            verdict: request.verdict,
            actor,
        })
        .await;

    // Re-reviewing a finalized submission is rejected by the reducer even
    // when the verdict matches the current status, so its verdict decides.
    let (contribution, rejection) = state
        .contributions
        .state(|s| (s.get(&contribution_id).cloned(), s.last_rejection.clone()))
        .await;

    if let Some(rejection) = rejection {
        return Err(rejection_error(Some(rejection)));
    }
    let contribution =
        contribution.ok_or_else(|| AppError::not_found("Contribution", contribution_id))?;
    Ok(Json(ContributionView {
        contribution_id: contribution.contribution_id,
        submitted_by: contribution.submitted_by,
        name: contribution.name,
        status: contribution.status,
    }))
}
