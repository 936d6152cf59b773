//! Custom Axum extractors.
//!
//! - [`BearerToken`]: extract the token from the `Authorization` header
//! - [`CorrelationId`]: extract or generate a request correlation ID
//!
//! # Examples
//!
//! ```ignore
//! use tirtha_web::extractors::{BearerToken, CorrelationId};
//!
//! async fn handler(
//!     bearer: BearerToken,
//!     correlation_id: CorrelationId,
//! ) -> Result<Json<Response>, AppError> {
//!     let session = identity.authenticate(&bearer.0)
//!         .ok_or_else(|| AppError::unauthorized("Invalid session token"))?;
//!     ...
//! }
//! ```

use crate::error::AppError;
use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use uuid::Uuid;

/// Bearer token extracted from an `Authorization: Bearer <token>` header.
///
/// Rejects with 401 when the header is missing, malformed, or empty -
/// validation of the token itself is the caller's job.
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for BearerToken
where
    S: Send + Sync,
{
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let auth_header = parts
            .headers
            .get("authorization")
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::unauthorized("Missing authorization header"))?;

        let token = auth_header
            .strip_prefix("Bearer ")
            .ok_or_else(|| {
                AppError::unauthorized("Invalid authorization format. Expected 'Bearer <token>'")
            })?
            .to_string();

        if token.is_empty() {
            return Err(AppError::unauthorized("Empty bearer token"));
        }

        Ok(Self(token))
    }
}

/// Correlation ID for request tracing.
///
/// Extracts the correlation ID from the `X-Correlation-ID` header,
/// or generates a new UUID v4 if not present.
#[derive(Debug, Clone, Copy)]
pub struct CorrelationId(pub Uuid);

#[async_trait]
impl<S> FromRequestParts<S> for CorrelationId
where
    S: Send + Sync,
{
    type Rejection = std::convert::Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let correlation_id = parts
            .headers
            .get(crate::middleware::CORRELATION_ID_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| Uuid::parse_str(s).ok())
            .unwrap_or_else(Uuid::new_v4);

        Ok(Self(correlation_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request;

    fn parts_with_auth(value: Option<&str>) -> Parts {
        let mut builder = Request::builder().uri("/");
        if let Some(v) = value {
            builder = builder.header("authorization", v);
        }
        #[allow(clippy::unwrap_used)]
        let (parts, ()) = builder.body(()).unwrap().into_parts();
        parts
    }

    #[tokio::test]
    async fn bearer_token_is_extracted() {
        let mut parts = parts_with_auth(Some("Bearer abc123"));
        #[allow(clippy::unwrap_used)]
        let token = BearerToken::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(token.0, "abc123");
    }

    #[tokio::test]
    async fn missing_header_is_unauthorized() {
        let mut parts = parts_with_auth(None);
        let result = BearerToken::from_request_parts(&mut parts, &()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn non_bearer_scheme_is_rejected() {
        let mut parts = parts_with_auth(Some("Basic dXNlcjpwYXNz"));
        let result = BearerToken::from_request_parts(&mut parts, &()).await;
        assert!(result.is_err());
    }
}
