//! HTTP handlers.
//!
//! Thin imperative shell: extract, authenticate, build an action, dispatch
//! through the store, map the outcome. All rule checking happens in the
//! reducers; handlers only translate rejections into the HTTP error
//! taxonomy.

pub mod admin;
pub mod bookings;
pub mod checkout;
pub mod loyalty;
pub mod temples;

use crate::aggregates::Rejection;
use crate::server::AppState;
use crate::session::Session;
use axum::http::StatusCode;
use tirtha_web::{AppError, BearerToken};

/// Resolve a bearer token to a session or fail with 401.
pub(crate) fn authenticate(state: &AppState, bearer: &BearerToken) -> Result<Session, AppError> {
    state
        .identity
        .authenticate(&bearer.0)
        .ok_or_else(|| AppError::unauthorized("Invalid or expired session token"))
}

/// Require the admin role or fail with 403.
pub(crate) fn require_admin(session: &Session) -> Result<(), AppError> {
    if session.is_admin() {
        Ok(())
    } else {
        Err(AppError::forbidden("Admin role required"))
    }
}

/// Translate a reducer rejection into the HTTP error taxonomy.
///
/// `None` means the command was dropped without even a rejection event,
/// which should not happen; it surfaces as a generic failure.
pub(crate) fn rejection_error(rejection: Option<Rejection>) -> AppError {
    match rejection {
        Some(Rejection::Validation(message)) => AppError::validation(message),
        Some(Rejection::Forbidden(message)) => AppError::forbidden(message),
        Some(Rejection::NotFound(message)) => AppError::new(
            StatusCode::NOT_FOUND,
            format!("{message} not found"),
            "NOT_FOUND".to_string(),
        ),
        Some(Rejection::Rule(message)) => AppError::business_rule(message),
        None => AppError::internal("The requested change was not applied"),
    }
}
