//! Domain records reconciled from payment provider events.
//!
//! These are the three entities the webhook path writes (donations,
//! memberships, purchases) plus the product and user-profile rows it
//! touches as side effects (stock decrements, tier updates).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payment outcome recorded on donations and purchases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus {
    /// Payment started but not yet settled
    Pending,
    /// Funds captured
    Succeeded,
    /// Payment attempt failed
    Failed,
    /// Canceled before capture
    Canceled,
}

impl PaymentStatus {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Canceled => "canceled",
        }
    }
}

/// Membership lifecycle status, mirroring the provider's subscription status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    /// Subscription is paid up
    Active,
    /// Latest invoice payment failed, retries pending
    PastDue,
    /// Subscription has been canceled
    Canceled,
    /// In a trial period
    Trialing,
    /// First payment has not completed yet
    Incomplete,
    /// First payment window expired
    IncompleteExpired,
    /// Retries exhausted without payment
    Unpaid,
    /// Collection is paused
    Paused,
    /// Any status string this crate does not know
    #[serde(other)]
    Unknown,
}

impl MembershipStatus {
    /// Parse the provider's status string, defaulting to `Unknown`.
    pub fn from_provider(status: &str) -> Self {
        match status {
            "active" => Self::Active,
            "past_due" => Self::PastDue,
            "canceled" => Self::Canceled,
            "trialing" => Self::Trialing,
            "incomplete" => Self::Incomplete,
            "incomplete_expired" => Self::IncompleteExpired,
            "unpaid" => Self::Unpaid,
            "paused" => Self::Paused,
            _ => Self::Unknown,
        }
    }

    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::PastDue => "past_due",
            Self::Canceled => "canceled",
            Self::Trialing => "trialing",
            Self::Incomplete => "incomplete",
            Self::IncompleteExpired => "incomplete_expired",
            Self::Unpaid => "unpaid",
            Self::Paused => "paused",
            Self::Unknown => "unknown",
        }
    }

    /// Check if the membership is in a "good" state
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active | Self::Trialing)
    }
}

/// A one-time donation created from a payment event.
///
/// Donations are append-only: a record is written once with its final
/// status and never updated afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Donation {
    /// Record id
    pub id: Uuid,

    /// Platform user who donated (`anonymous` when the event carries no id)
    pub user_id: String,

    /// Amount in dollars, converted from the provider's minor units
    pub amount: f64,

    /// ISO currency code, lowercase (e.g. `usd`)
    pub currency: String,

    /// Payment outcome
    pub status: PaymentStatus,

    /// Provider-side payment reference (payment intent or checkout session id)
    pub payment_ref: String,

    /// Optional free-text description carried in the event metadata
    pub description: Option<String>,

    /// When the record was written
    pub created_at: DateTime<Utc>,
}

/// Recurring membership backed by a provider subscription.
///
/// Created on subscription checkout completion and updated on
/// subscription/invoice lifecycle events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Membership {
    /// Record id
    pub id: Uuid,

    /// Platform user the membership belongs to
    pub user_id: String,

    /// Free-text tier tag (e.g. `member`, `sustainer`)
    pub tier: String,

    /// Provider subscription reference this membership mirrors
    pub subscription_ref: String,

    /// Lifecycle status mirroring the provider
    pub status: MembershipStatus,

    /// Start of the current membership
    pub started_at: DateTime<Utc>,

    /// End of the current billing period, when the provider reported one
    pub current_period_end: Option<DateTime<Utc>>,

    /// When the membership ended (set on cancellation)
    pub ended_at: Option<DateTime<Utc>>,

    /// Whether the provider will cancel at the period end
    pub cancel_at_period_end: bool,

    /// When the record was written
    pub created_at: DateTime<Utc>,

    /// Last reconciliation touch
    pub updated_at: DateTime<Utc>,
}

/// Shop purchase created from a purchase-typed payment event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Purchase {
    /// Record id
    pub id: Uuid,

    /// Platform user who purchased
    pub user_id: String,

    /// Product the purchase references
    pub product_id: String,

    /// Product display name at time of purchase
    pub product_name: String,

    /// Amount in dollars
    pub amount: f64,

    /// ISO currency code, lowercase
    pub currency: String,

    /// Payment outcome
    pub status: PaymentStatus,

    /// Provider-side payment reference
    pub payment_ref: String,

    /// When the record was written
    pub created_at: DateTime<Utc>,
}

/// Shop product with remaining stock.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Product {
    /// Product id (matches the `product_id` metadata key on events)
    pub id: String,

    /// Display name
    pub name: String,

    /// Unit price in dollars
    pub price: f64,

    /// ISO currency code, lowercase
    pub currency: String,

    /// Units remaining; a successful purchase decrements this by one
    pub stock: u32,
}

/// Minimal user profile. The webhook path only ever touches the tier tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    /// Platform user id
    pub id: String,

    /// Contact address for receipts, when known
    pub email: Option<String>,

    /// Current tier tag, kept in sync with the active membership
    pub tier: String,
}
