//! Session and identity context.
//!
//! Identity issuance itself is an external collaborator; this module only
//! defines the session object handlers thread through the system and the
//! trait the server uses to turn a bearer token into one.
//!
//! There is deliberately no ambient "current user" global: a [`Session`] is
//! populated once per request from the bearer token and passed explicitly to
//! whatever needs it. It is created at sign-in and gone after sign-out -
//! revoked tokens simply stop resolving.

use crate::types::UserId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::RwLock;

/// Role claim attached to a session.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Back-office administrator
    Admin,
    /// Regular devotee account
    User,
}

/// An authenticated caller.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    /// The authenticated user
    pub user_id: UserId,
    /// The caller's role claim
    pub role: Role,
    /// When the session was issued
    pub issued_at: DateTime<Utc>,
}

impl Session {
    /// Whether this session carries the given role
    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.role == role
    }

    /// Whether this session belongs to an administrator
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Resolves bearer tokens to sessions.
///
/// The production identity provider is a hosted service; this trait is the
/// seam through which the server consumes it.
pub trait IdentityProvider: Send + Sync {
    /// Resolve a bearer token to a session, if the token is valid.
    fn authenticate(&self, token: &str) -> Option<Session>;
}

/// Token-table identity provider.
///
/// Backs development deployments and tests: tokens are registered up front
/// (or at sign-in) and removed at sign-out.
#[derive(Debug, Default)]
pub struct StaticTokenProvider {
    tokens: RwLock<HashMap<String, Session>>,
}

impl StaticTokenProvider {
    /// Create an empty provider
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a token, returning the session it will resolve to
    pub fn register(&self, token: impl Into<String>, user_id: UserId, role: Role) -> Session {
        let session = Session {
            user_id,
            role,
            issued_at: Utc::now(),
        };
        if let Ok(mut tokens) = self.tokens.write() {
            tokens.insert(token.into(), session.clone());
        }
        session
    }

    /// Invalidate a token (sign-out)
    pub fn revoke(&self, token: &str) {
        if let Ok(mut tokens) = self.tokens.write() {
            tokens.remove(token);
        }
    }
}

impl IdentityProvider for StaticTokenProvider {
    fn authenticate(&self, token: &str) -> Option<Session> {
        self.tokens.read().ok()?.get(token).cloned()
    }
}
