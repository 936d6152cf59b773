//! Domain types for the temple-services platform.
//!
//! This module contains the identifiers, value objects, and status
//! enumerations shared by the aggregates. Anything arriving from the outside
//! world (contact details, coordinates, ratings) is validated at
//! construction; malformed values never reach a reducer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

// ============================================================================
// Identifiers
// ============================================================================

/// Unique identifier for a temple
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TempleId(Uuid);

impl TempleId {
    /// Creates a new random `TempleId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `TempleId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TempleId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TempleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a darshan booking
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BookingId(Uuid);

impl BookingId {
    /// Creates a new random `BookingId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `BookingId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BookingId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BookingId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a logged temple visit
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VisitId(Uuid);

impl VisitId {
    /// Creates a new random `VisitId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `VisitId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for VisitId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VisitId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a storefront product
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ProductId(Uuid);

impl ProductId {
    /// Creates a new random `ProductId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for ProductId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProductId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for an order
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderId(Uuid);

impl OrderId {
    /// Creates a new random `OrderId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create an `OrderId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for OrderId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for OrderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a user-submitted temple contribution
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ContributionId(Uuid);

impl ContributionId {
    /// Creates a new random `ContributionId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `ContributionId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl Default for ContributionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ContributionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a mantra in the practice library
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MantraId(Uuid);

impl MantraId {
    /// Creates a new random `MantraId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for MantraId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for MantraId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for a user
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(Uuid);

impl UserId {
    /// Creates a new random `UserId`
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Create a `UserId` from a `Uuid`
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Get the inner UUID
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UserId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Validation
// ============================================================================

/// Errors raised when constructing domain values from untrusted input.
///
/// These are rejected at the boundary, before any write is attempted.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// A required name field was empty
    #[error("name must not be empty")]
    EmptyName,

    /// The email address is not plausibly shaped
    #[error("invalid email address: {0}")]
    InvalidEmail(String),

    /// The phone number is not plausibly shaped
    #[error("invalid phone number: {0}")]
    InvalidPhone(String),

    /// Latitude outside [-90, 90]
    #[error("latitude {0} out of range [-90, 90]")]
    LatitudeOutOfRange(f64),

    /// Longitude outside [-180, 180]
    #[error("longitude {0} out of range [-180, 180]")]
    LongitudeOutOfRange(f64),

    /// Rating outside [0, 5]
    #[error("rating {0} out of range [0, 5]")]
    RatingOutOfRange(f32),

    /// Order quantity must be at least 1
    #[error("quantity must be at least 1")]
    ZeroQuantity,

    /// Chant target must be at least 1
    #[error("chant target must be at least 1")]
    ZeroChantTarget,

    /// Promo discount percent outside [1, 100]
    #[error("discount percent {0} out of range [1, 100]")]
    DiscountPercentOutOfRange(u8),

    /// Promo validity window ends before it starts
    #[error("validity window ends before it starts")]
    InvertedValidityWindow,
}

// ============================================================================
// Contact details
// ============================================================================

/// Validated customer contact fields carried on bookings and orders.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactDetails {
    /// Customer name
    pub name: String,
    /// Customer email
    pub email: String,
    /// Customer phone number
    pub phone: String,
}

impl ContactDetails {
    /// Validate and construct contact details.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] when the name is empty, the email is not
    /// plausibly shaped (single `@`, non-empty local part, dotted domain), or
    /// the phone is not 7-15 digits with an optional leading `+`.
    pub fn new(
        name: impl Into<String>,
        email: impl Into<String>,
        phone: impl Into<String>,
    ) -> Result<Self, ValidationError> {
        let name = name.into();
        let email = email.into();
        let phone = phone.into();

        if name.trim().is_empty() {
            return Err(ValidationError::EmptyName);
        }
        if !is_plausible_email(&email) {
            return Err(ValidationError::InvalidEmail(email));
        }
        if !is_plausible_phone(&phone) {
            return Err(ValidationError::InvalidPhone(phone));
        }

        Ok(Self { name, email, phone })
    }
}

/// Shape check only; deliverability is the mail provider's problem.
fn is_plausible_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() || domain.is_empty() || domain.contains('@') {
        return false;
    }
    let Some((host, tld)) = domain.rsplit_once('.') else {
        return false;
    };
    !host.is_empty() && !tld.is_empty() && !email.contains(char::is_whitespace)
}

fn is_plausible_phone(phone: &str) -> bool {
    let digits = phone.strip_prefix('+').unwrap_or(phone);
    (7..=15).contains(&digits.len()) && digits.chars().all(|c| c.is_ascii_digit())
}

// ============================================================================
// Geography and rating
// ============================================================================

/// Validated geocoordinates for a temple.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    /// Latitude in degrees
    pub latitude: f64,
    /// Longitude in degrees
    pub longitude: f64,
}

impl GeoPoint {
    /// Validate and construct a geopoint.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] when either coordinate is out of range.
    pub fn new(latitude: f64, longitude: f64) -> Result<Self, ValidationError> {
        if !(-90.0..=90.0).contains(&latitude) {
            return Err(ValidationError::LatitudeOutOfRange(latitude));
        }
        if !(-180.0..=180.0).contains(&longitude) {
            return Err(ValidationError::LongitudeOutOfRange(longitude));
        }
        Ok(Self { latitude, longitude })
    }
}

/// Temple rating on the 0-5 scale.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd, Serialize, Deserialize)]
pub struct Rating(f32);

impl Rating {
    /// Validate and construct a rating.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] when the value is outside [0, 5].
    pub fn new(value: f32) -> Result<Self, ValidationError> {
        if !(0.0..=5.0).contains(&value) {
            return Err(ValidationError::RatingOutOfRange(value));
        }
        Ok(Self(value))
    }

    /// The rating value
    #[must_use]
    pub const fn value(&self) -> f32 {
        self.0
    }
}

// ============================================================================
// Money (whole-rupee value object)
// ============================================================================

/// Represents an amount in whole currency units (rupees).
///
/// All catalogue prices and darshan fees are whole-rupee amounts, so the
/// value object stays integral and discount rounding is defined exactly
/// once, here.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Money(u64);

impl Money {
    /// Zero amount
    pub const ZERO: Self = Self(0);

    /// Creates a `Money` value from whole rupees
    #[must_use]
    pub const fn from_rupees(rupees: u64) -> Self {
        Self(rupees)
    }

    /// Returns the amount in whole rupees
    #[must_use]
    pub const fn rupees(&self) -> u64 {
        self.0
    }

    /// Checks if the amount is zero
    #[must_use]
    pub const fn is_zero(&self) -> bool {
        self.0 == 0
    }

    /// Adds two amounts with overflow checking
    #[must_use]
    pub const fn checked_add(self, other: Self) -> Option<Self> {
        match self.0.checked_add(other.0) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Multiplies the amount by a quantity with overflow checking
    #[must_use]
    pub const fn checked_multiply(self, quantity: u32) -> Option<Self> {
        match self.0.checked_mul(quantity as u64) {
            Some(result) => Some(Self(result)),
            None => None,
        }
    }

    /// Applies a percentage discount, rounding to the nearest rupee.
    ///
    /// Implements `round(amount * (1 - percent/100))` with round-half-up
    /// integer arithmetic. Percentages of 100 or more price to zero.
    #[must_use]
    pub const fn discounted(self, percent: u8) -> Self {
        if percent >= 100 {
            return Self::ZERO;
        }
        let kept = 100 - percent as u64;
        Self(self.0.saturating_mul(kept).saturating_add(50) / 100)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "₹{}", self.0)
    }
}

// ============================================================================
// Invoice numbers
// ============================================================================

/// Globally unique, unguessable invoice identifier.
///
/// Format: `INV-YYYYMMDD-<12 uppercase hex chars>`. The hex tail carries 48
/// bits drawn from a cryptographically strong random source - never a
/// counter, so invoice numbers cannot be predicted or enumerated.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InvoiceNumber(String);

impl InvoiceNumber {
    /// Assemble an invoice number from an issue date and 48 bits of entropy.
    #[must_use]
    pub fn from_parts(issued_on: DateTime<Utc>, entropy: u64) -> Self {
        let date = issued_on.format("%Y%m%d");
        let tail = entropy & 0xFFFF_FFFF_FFFF;
        Self(format!("INV-{date}-{tail:012X}"))
    }

    /// Parse and validate an invoice number.
    ///
    /// # Errors
    ///
    /// Returns the offending input when it does not match
    /// `INV-YYYYMMDD-<12 hex chars>`.
    pub fn parse(input: &str) -> Result<Self, String> {
        let mut parts = input.splitn(3, '-');
        let (prefix, date, tail) = (parts.next(), parts.next(), parts.next());

        let valid = prefix == Some("INV")
            && date.is_some_and(|d| d.len() == 8 && d.chars().all(|c| c.is_ascii_digit()))
            && tail.is_some_and(|t| t.len() == 12 && t.chars().all(|c| c.is_ascii_hexdigit()));

        if valid {
            Ok(Self(input.to_string()))
        } else {
            Err(input.to_string())
        }
    }

    /// The invoice number as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for InvoiceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Status enumerations
// ============================================================================

/// The fixed set of darshan offerings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DarshanType {
    /// Free darshan slot
    Free,
    /// Standard darshan, first tier
    StandardTier1,
    /// Standard darshan, second tier
    StandardTier2,
    /// VIP darshan
    Vip,
}

impl fmt::Display for DarshanType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Free => "free",
            Self::StandardTier1 => "standard_tier_1",
            Self::StandardTier2 => "standard_tier_2",
            Self::Vip => "vip",
        };
        write!(f, "{name}")
    }
}

/// Lifecycle status of a darshan booking.
///
/// Every booking starts `Awaiting` and an admin moves it to exactly one of
/// the terminal states. There is no way back out of a terminal state;
/// re-opening means creating a new booking.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    /// Created, pending manual admin verification
    Awaiting,
    /// Admin verified identity and payment
    Confirmed,
    /// Booking will not occur
    Cancelled,
    /// Cancelled after payment; manual refund processing required
    Refunded,
}

impl BookingStatus {
    /// Whether this status permits no further transitions
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Awaiting)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Awaiting => "awaiting",
            Self::Confirmed => "confirmed",
            Self::Cancelled => "cancelled",
            Self::Refunded => "refunded",
        };
        write!(f, "{name}")
    }
}

/// Lifecycle status of a storefront order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus {
    /// Order placed, not yet billed
    Pending,
    /// Waiting on payment
    AwaitingPayment,
    /// Payment received, being prepared
    Processing,
    /// Fulfilled
    Completed,
    /// Called off
    Cancelled,
}

impl OrderStatus {
    /// Whether an admin may move an order from `self` to `next`.
    ///
    /// The flow runs forward only; any non-terminal order can be cancelled.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::AwaitingPayment)
                | (Self::AwaitingPayment, Self::Processing)
                | (Self::Processing, Self::Completed)
                | (
                    Self::Pending | Self::AwaitingPayment | Self::Processing,
                    Self::Cancelled
                )
        )
    }

    /// Whether this status permits no further transitions
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Cancelled)
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::AwaitingPayment => "awaiting_payment",
            Self::Processing => "processing",
            Self::Completed => "completed",
            Self::Cancelled => "cancelled",
        };
        write!(f, "{name}")
    }
}

/// Review status of a user-submitted temple contribution.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContributionStatus {
    /// Submitted, not yet reviewed
    Pending,
    /// Accepted; surfaced in discovery alongside canonical temples
    Approved,
    /// Declined
    Rejected,
    /// Parked for more information
    Waiting,
}

impl ContributionStatus {
    /// Whether a reviewer may move a contribution from `self` to `next`
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Approved | Self::Rejected | Self::Waiting)
                | (Self::Waiting, Self::Approved | Self::Rejected)
        )
    }
}

impl fmt::Display for ContributionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
            Self::Waiting => "waiting",
        };
        write!(f, "{name}")
    }
}
