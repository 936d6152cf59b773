//! Business-rule aggregates.
//!
//! One reducer per business area. Commands validate against current state
//! and apply events; events are plain facts that mutate state and never
//! fail. Cross-aggregate wiring (approved contributions becoming temples)
//! happens in the server through store subscriptions, not inside reducers.

pub mod booking;
pub mod chant;
pub mod contribution;
pub mod loyalty;
pub mod order;
pub mod promo;
pub mod temple;

use crate::session::{Role, Session};
use crate::types::UserId;
use serde::{Deserialize, Serialize};
use std::fmt;

/// The acting caller attached to privileged commands.
///
/// Carries just the identity and role claim a reducer needs for its own
/// authorization check; reducers never trust the shell to have done it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    /// Acting user
    pub user_id: UserId,
    /// Role claim from the session
    pub role: Role,
}

impl Actor {
    /// Whether the actor is an administrator
    #[must_use]
    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<&Session> for Actor {
    fn from(session: &Session) -> Self {
        Self {
            user_id: session.user_id,
            role: session.role,
        }
    }
}

/// Why a command was rejected.
///
/// The shell maps each kind onto its HTTP taxonomy: validation failures,
/// authorization failures, missing records, and business-rule violations
/// each travel separately so the caller gets the right signal.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "message", rename_all = "snake_case")]
pub enum Rejection {
    /// Malformed input, rejected before any state change
    Validation(String),
    /// Caller lacks the required role
    Forbidden(String),
    /// The referenced record does not exist
    NotFound(String),
    /// A business rule forbids the operation; message is specific
    Rule(String),
}

impl Rejection {
    /// The user-facing message
    #[must_use]
    pub fn message(&self) -> &str {
        match self {
            Self::Validation(m) | Self::Forbidden(m) | Self::NotFound(m) | Self::Rule(m) => m,
        }
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Self::Validation(_) => "validation",
            Self::Forbidden(_) => "forbidden",
            Self::NotFound(_) => "not found",
            Self::Rule(_) => "rule",
        };
        write!(f, "{kind}: {}", self.message())
    }
}
