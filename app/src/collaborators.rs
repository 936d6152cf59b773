//! External collaborator traits and their implementations.
//!
//! The reducers never talk to the outside world directly; everything they
//! need beyond a clock arrives through the traits in this module, injected
//! via each aggregate's environment. Production-shaped implementations live
//! next to the in-memory ones used in tests, so every seam has both sides
//! in one place.

use crate::types::{InvoiceNumber, MantraId, Money, OrderId, OrderStatus};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use thiserror::Error;

// ============================================================================
// Transactional mail
// ============================================================================

/// Payload of an order status-change notification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StatusNotification {
    /// Recipient email address
    pub recipient: String,
    /// Recipient name
    pub name: String,
    /// The order the notification is about
    pub order_id: OrderId,
    /// Product name
    pub product: String,
    /// The new order status
    pub status: OrderStatus,
    /// Order total
    pub total: Money,
}

/// Mail delivery failure.
#[derive(Error, Debug)]
pub enum MailError {
    /// The mail endpoint could not be reached or rejected the request
    #[error("mail endpoint failure: {0}")]
    Endpoint(String),
}

/// Sends transactional status-change email.
///
/// Callers treat delivery as fire-and-forget: a failure is logged, never
/// surfaced to the user, and never blocks the status change that triggered
/// it.
#[async_trait]
pub trait Mailer: Send + Sync {
    /// Send one status-change notification.
    ///
    /// # Errors
    ///
    /// Returns [`MailError`] when the underlying endpoint fails.
    async fn send_status_update(&self, notification: &StatusNotification) -> Result<(), MailError>;
}

/// Mailer backed by the hosted transactional-email endpoint.
pub struct HttpMailer {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpMailer {
    /// Create a mailer posting to the given endpoint URL
    #[must_use]
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send_status_update(&self, notification: &StatusNotification) -> Result<(), MailError> {
        let response = self
            .client
            .post(&self.endpoint)
            .json(notification)
            .send()
            .await
            .map_err(|e| MailError::Endpoint(e.to_string()))?;

        if response.status().is_success() {
            Ok(())
        } else {
            Err(MailError::Endpoint(format!(
                "endpoint returned {}",
                response.status()
            )))
        }
    }
}

/// Mailer used when no mail endpoint is configured.
///
/// Logs the notification so the status change is still traceable.
#[derive(Debug, Clone, Copy, Default)]
pub struct DisabledMailer;

#[async_trait]
impl Mailer for DisabledMailer {
    async fn send_status_update(&self, notification: &StatusNotification) -> Result<(), MailError> {
        tracing::info!(
            order_id = %notification.order_id,
            status = %notification.status,
            "mail endpoint not configured; skipping status notification"
        );
        Ok(())
    }
}

/// Mailer that records notifications instead of sending them.
#[derive(Default)]
pub struct RecordingMailer {
    sent: Mutex<Vec<StatusNotification>>,
    fail: bool,
}

impl RecordingMailer {
    /// Create a mailer that accepts everything
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a mailer that fails every send
    #[must_use]
    pub const fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    /// Notifications recorded so far
    #[must_use]
    pub fn sent(&self) -> Vec<StatusNotification> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl Mailer for RecordingMailer {
    async fn send_status_update(&self, notification: &StatusNotification) -> Result<(), MailError> {
        if self.fail {
            return Err(MailError::Endpoint("recording mailer set to fail".into()));
        }
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(notification.clone());
        }
        Ok(())
    }
}

// ============================================================================
// Chant achievement history
// ============================================================================

/// One completed chant session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChantAchievement {
    /// The target that was reached
    pub target: u32,
    /// When the session completed
    pub completed_at: DateTime<Utc>,
}

/// Achievement persistence failure.
#[derive(Error, Debug)]
pub enum AchievementLogError {
    /// The underlying storage rejected the append
    #[error("achievement log failure: {0}")]
    Storage(String),
}

/// Durable append-only history of completed chant sessions.
pub trait AchievementLog: Send + Sync {
    /// Append one achievement record.
    ///
    /// # Errors
    ///
    /// Returns [`AchievementLogError`] when the append fails; the session
    /// itself is already completed by then, so callers only log this.
    fn append(&self, achievement: &ChantAchievement) -> Result<(), AchievementLogError>;
}

/// Achievement log appending JSON lines to a local file.
pub struct JsonlAchievementLog {
    path: PathBuf,
}

impl JsonlAchievementLog {
    /// Create a log writing to the given path
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl AchievementLog for JsonlAchievementLog {
    fn append(&self, achievement: &ChantAchievement) -> Result<(), AchievementLogError> {
        let line = serde_json::to_string(achievement)
            .map_err(|e| AchievementLogError::Storage(e.to_string()))?;

        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| AchievementLogError::Storage(e.to_string()))?;

        writeln!(file, "{line}").map_err(|e| AchievementLogError::Storage(e.to_string()))
    }
}

/// In-memory achievement log for tests.
#[derive(Default)]
pub struct InMemoryAchievementLog {
    records: Mutex<Vec<ChantAchievement>>,
}

impl InMemoryAchievementLog {
    /// Create an empty log
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Achievements appended so far
    #[must_use]
    pub fn records(&self) -> Vec<ChantAchievement> {
        self.records.lock().map(|r| r.clone()).unwrap_or_default()
    }
}

impl AchievementLog for InMemoryAchievementLog {
    fn append(&self, achievement: &ChantAchievement) -> Result<(), AchievementLogError> {
        if let Ok(mut records) = self.records.lock() {
            records.push(achievement.clone());
        }
        Ok(())
    }
}

// ============================================================================
// Invoice issuance
// ============================================================================

/// Issues globally unique invoice numbers.
pub trait InvoiceIssuer: Send + Sync {
    /// Issue an invoice number for the given issue date
    fn issue(&self, issued_on: DateTime<Utc>) -> InvoiceNumber;
}

/// Invoice issuer drawing entropy from the OS CSPRNG.
///
/// 48 bits of cryptographically strong randomness per invoice; collisions
/// and enumeration are both out of reach.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsRngInvoiceIssuer;

impl InvoiceIssuer for OsRngInvoiceIssuer {
    fn issue(&self, issued_on: DateTime<Utc>) -> InvoiceNumber {
        InvoiceNumber::from_parts(issued_on, rand::rngs::OsRng.next_u64())
    }
}

/// Deterministic invoice issuer for tests.
#[derive(Debug, Default)]
pub struct SequentialInvoiceIssuer {
    next: AtomicU64,
}

impl SequentialInvoiceIssuer {
    /// Create an issuer starting at zero
    #[must_use]
    pub const fn new() -> Self {
        Self {
            next: AtomicU64::new(0),
        }
    }
}

impl InvoiceIssuer for SequentialInvoiceIssuer {
    fn issue(&self, issued_on: DateTime<Utc>) -> InvoiceNumber {
        InvoiceNumber::from_parts(issued_on, self.next.fetch_add(1, Ordering::SeqCst))
    }
}

// ============================================================================
// Chant media capabilities
// ============================================================================

/// Capability probe and playback control for chant sessions.
///
/// The chant reducer asks this before admitting a session into voice or
/// audio mode, and instructs it through effects (completion tone, replay,
/// stop). A runtime without speech recognition, or a mantra without an
/// attached clip, disables the respective mode with an explicit message
/// rather than silently doing nothing.
pub trait ChantMedia: Send + Sync {
    /// Whether the runtime offers speech recognition
    fn speech_available(&self) -> bool;

    /// Whether the given mantra has an audio clip attached
    fn clip_available(&self, mantra: MantraId) -> bool;

    /// Start (or restart) playback of the mantra's clip
    fn play_clip(&self, mantra: MantraId);

    /// Play the short completion tone
    fn play_completion_tone(&self);

    /// Halt recognition and playback, rewinding any active clip
    fn stop(&self);
}

/// Media controller configured from static capability data.
#[derive(Default)]
pub struct StaticChantMedia {
    speech: bool,
    clips: std::collections::HashSet<MantraId>,
}

impl StaticChantMedia {
    /// Create a controller with the given speech capability
    #[must_use]
    pub fn new(speech: bool) -> Self {
        Self {
            speech,
            clips: std::collections::HashSet::new(),
        }
    }

    /// Register an audio clip for a mantra
    #[must_use]
    pub fn with_clip(mut self, mantra: MantraId) -> Self {
        self.clips.insert(mantra);
        self
    }
}

impl ChantMedia for StaticChantMedia {
    fn speech_available(&self) -> bool {
        self.speech
    }

    fn clip_available(&self, mantra: MantraId) -> bool {
        self.clips.contains(&mantra)
    }

    fn play_clip(&self, mantra: MantraId) {
        tracing::debug!(%mantra, "starting clip playback");
    }

    fn play_completion_tone(&self) {
        tracing::debug!("playing completion tone");
    }

    fn stop(&self) {
        tracing::debug!("stopping chant media");
    }
}
