//! Configuration management for the darshan application.
//!
//! Loads configuration from environment variables with sensible defaults.

use serde::{Deserialize, Serialize};
use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP server configuration
    pub server: ServerConfig,
    /// Transactional mail configuration
    pub mail: MailConfig,
    /// Chant practice configuration
    pub chant: ChantConfig,
    /// Development identity tokens
    pub auth: AuthConfig,
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,
    /// Port to bind to
    pub port: u16,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    /// Graceful shutdown timeout in seconds
    pub shutdown_timeout: u64,
}

/// Transactional mail configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MailConfig {
    /// Status-notification endpoint URL; unset disables delivery and logs
    /// notifications instead
    pub endpoint: Option<String>,
}

/// Chant practice configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChantConfig {
    /// Path of the JSON-lines achievement history file
    pub achievements_path: String,
    /// Whether the runtime offers speech recognition
    pub speech_available: bool,
}

/// Development identity tokens.
///
/// The production identity provider is external; these seed the static
/// token table for development and automated tests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Bearer token resolving to an admin session, if set
    pub admin_token: Option<String>,
    /// Bearer token resolving to a regular user session, if set
    pub user_token: Option<String>,
}

impl Config {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        Self {
            server: ServerConfig {
                host: env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env::var("PORT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(8080),
                log_level: env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
                shutdown_timeout: env::var("SHUTDOWN_TIMEOUT")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            },
            mail: MailConfig {
                endpoint: env::var("MAIL_ENDPOINT").ok(),
            },
            chant: ChantConfig {
                achievements_path: env::var("CHANT_ACHIEVEMENTS_PATH")
                    .unwrap_or_else(|_| "chant-achievements.jsonl".to_string()),
                speech_available: env::var("CHANT_SPEECH_AVAILABLE")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(false),
            },
            auth: AuthConfig {
                admin_token: env::var("AUTH_ADMIN_TOKEN").ok(),
                user_token: env::var("AUTH_USER_TOKEN").ok(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sensible() {
        // Only asserts fields that have no env override in the test run
        let config = Config::from_env();
        assert!(!config.server.host.is_empty());
        assert!(config.server.shutdown_timeout > 0);
    }
}
