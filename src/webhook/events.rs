// Allow missing docs in this module - provider wire types are internal
#![allow(missing_docs)]

//! Webhook Event Types
//!
//! Strongly-typed representations of the payment provider's webhook events.
//! The envelope is parsed first; `data.object` stays raw JSON until the
//! dispatcher knows which payload shape to expect, so an unknown event type
//! never fails envelope parsing.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{WebhookError, WebhookResult};

/// Provider event types the reconciler handles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    // Checkout events
    #[serde(rename = "checkout.session.completed")]
    CheckoutSessionCompleted,

    // One-time payment events
    #[serde(rename = "payment_intent.succeeded")]
    PaymentIntentSucceeded,
    #[serde(rename = "payment_intent.payment_failed")]
    PaymentIntentFailed,

    // Subscription lifecycle events
    #[serde(rename = "customer.subscription.updated")]
    SubscriptionUpdated,
    #[serde(rename = "customer.subscription.deleted")]
    SubscriptionDeleted,

    // Invoice events
    #[serde(rename = "invoice.payment_succeeded")]
    InvoicePaymentSucceeded,
    #[serde(rename = "invoice.payment_failed")]
    InvoicePaymentFailed,

    // Catch-all for events we acknowledge but do not act on
    #[serde(other)]
    Unknown,
}

impl FromStr for EventType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "checkout.session.completed" => Self::CheckoutSessionCompleted,
            "payment_intent.succeeded" => Self::PaymentIntentSucceeded,
            "payment_intent.payment_failed" => Self::PaymentIntentFailed,
            "customer.subscription.updated" => Self::SubscriptionUpdated,
            "customer.subscription.deleted" => Self::SubscriptionDeleted,
            "invoice.payment_succeeded" => Self::InvoicePaymentSucceeded,
            "invoice.payment_failed" => Self::InvoicePaymentFailed,
            _ => Self::Unknown,
        })
    }
}

impl EventType {
    /// Get the string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CheckoutSessionCompleted => "checkout.session.completed",
            Self::PaymentIntentSucceeded => "payment_intent.succeeded",
            Self::PaymentIntentFailed => "payment_intent.payment_failed",
            Self::SubscriptionUpdated => "customer.subscription.updated",
            Self::SubscriptionDeleted => "customer.subscription.deleted",
            Self::InvoicePaymentSucceeded => "invoice.payment_succeeded",
            Self::InvoicePaymentFailed => "invoice.payment_failed",
            Self::Unknown => "unknown",
        }
    }

    /// Check if this is a known event type
    pub fn is_known(&self) -> bool {
        !matches!(self, Self::Unknown)
    }
}

/// Generic webhook event envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Unique identifier for the event (`evt_...`), the idempotency key
    pub id: String,

    /// Type of event
    #[serde(rename = "type")]
    pub event_type: String,

    /// Time of event creation (Unix timestamp)
    pub created: i64,

    /// API version used to render data
    #[serde(default)]
    pub api_version: Option<String>,

    /// Whether this is a live mode event
    pub livemode: bool,

    /// Number of times the provider has attempted to deliver
    #[serde(default)]
    pub pending_webhooks: u32,

    /// Object containing event data
    pub data: EventData,

    /// Request that caused the event (if applicable)
    #[serde(default)]
    pub request: Option<EventRequest>,
}

impl WebhookEvent {
    /// Parse from raw JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> WebhookResult<Self> {
        serde_json::from_slice(bytes).map_err(|e| WebhookError::InvalidPayload(e.to_string()))
    }

    /// Get the typed event type
    pub fn typed_event_type(&self) -> EventType {
        // Infallible error type means this can never fail
        EventType::from_str(&self.event_type).unwrap()
    }

    /// Extract a checkout session from event data
    pub fn as_checkout_session(&self) -> WebhookResult<CheckoutSessionEvent> {
        match self.typed_event_type() {
            EventType::CheckoutSessionCompleted => {
                let session: CheckoutSession = serde_json::from_value(self.data.object.clone())
                    .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;

                Ok(CheckoutSessionEvent {
                    event_id: self.id.clone(),
                    event_type: self.typed_event_type(),
                    session,
                })
            }
            _ => Err(WebhookError::InvalidPayload(format!(
                "Event {} is not a checkout event",
                self.event_type
            ))),
        }
    }

    /// Extract a payment intent from event data
    pub fn as_payment_intent(&self) -> WebhookResult<PaymentIntentEvent> {
        match self.typed_event_type() {
            EventType::PaymentIntentSucceeded | EventType::PaymentIntentFailed => {
                let intent: PaymentIntent = serde_json::from_value(self.data.object.clone())
                    .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;

                Ok(PaymentIntentEvent {
                    event_id: self.id.clone(),
                    event_type: self.typed_event_type(),
                    intent,
                })
            }
            _ => Err(WebhookError::InvalidPayload(format!(
                "Event {} is not a payment intent event",
                self.event_type
            ))),
        }
    }

    /// Extract a subscription from event data
    pub fn as_subscription(&self) -> WebhookResult<SubscriptionEvent> {
        match self.typed_event_type() {
            EventType::SubscriptionUpdated | EventType::SubscriptionDeleted => {
                let subscription: ProviderSubscription =
                    serde_json::from_value(self.data.object.clone())
                        .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;

                Ok(SubscriptionEvent {
                    event_id: self.id.clone(),
                    event_type: self.typed_event_type(),
                    subscription,
                    previous_attributes: self.data.previous_attributes.clone(),
                })
            }
            _ => Err(WebhookError::InvalidPayload(format!(
                "Event {} is not a subscription event",
                self.event_type
            ))),
        }
    }

    /// Extract an invoice from event data
    pub fn as_invoice(&self) -> WebhookResult<InvoiceEvent> {
        match self.typed_event_type() {
            EventType::InvoicePaymentSucceeded | EventType::InvoicePaymentFailed => {
                let invoice: Invoice = serde_json::from_value(self.data.object.clone())
                    .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;

                Ok(InvoiceEvent {
                    event_id: self.id.clone(),
                    event_type: self.typed_event_type(),
                    invoice,
                })
            }
            _ => Err(WebhookError::InvalidPayload(format!(
                "Event {} is not an invoice event",
                self.event_type
            ))),
        }
    }
}

/// Event data container
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventData {
    /// The actual event object (session, intent, subscription, invoice)
    pub object: serde_json::Value,

    /// Previous values for updated fields (only in *.updated events)
    #[serde(default)]
    pub previous_attributes: Option<serde_json::Value>,
}

/// Request that triggered the event
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRequest {
    /// Request ID
    pub id: Option<String>,
    /// Idempotency key used in the request
    pub idempotency_key: Option<String>,
}

/// Metadata the storefront attaches when creating sessions and intents
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventMetadata {
    /// Payment kind tag ("donation" or "purchase")
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    /// Application user id the payment belongs to
    #[serde(default)]
    pub user_id: Option<String>,
    /// Membership tier to grant (subscription checkouts)
    #[serde(default)]
    pub tier: Option<String>,
    /// Product id (purchase payments)
    #[serde(default)]
    pub product_id: Option<String>,
    /// Product display name (purchase payments)
    #[serde(default)]
    pub product_name: Option<String>,
    /// Free-text description shown on receipts
    #[serde(default)]
    pub description: Option<String>,
}

impl EventMetadata {
    /// Classify the payment. Anything without an explicit "purchase" tag is
    /// treated as a donation, matching how the storefront tags intents.
    pub fn payment_kind(&self) -> PaymentKind {
        match self.kind.as_deref() {
            Some("purchase") => PaymentKind::Purchase,
            _ => PaymentKind::Donation,
        }
    }
}

/// Payment classification derived from metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentKind {
    Donation,
    Purchase,
}

// =============================================================================
// Checkout Types
// =============================================================================

/// Checkout session event with typed data
#[derive(Debug, Clone)]
pub struct CheckoutSessionEvent {
    /// The event ID
    pub event_id: String,
    /// Type of checkout event
    pub event_type: EventType,
    /// The checkout session object
    pub session: CheckoutSession,
}

/// Provider checkout session object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutSession {
    /// Session ID (cs_...)
    pub id: String,
    /// What the session was for
    pub mode: CheckoutMode,
    /// Total amount in the smallest currency unit (cents)
    pub amount_total: Option<i64>,
    /// Currency code (lowercase ISO 4217)
    pub currency: Option<String>,
    /// Customer ID (cus_...)
    #[serde(default)]
    pub customer: Option<String>,
    /// Subscription created by the session (subscription mode only)
    #[serde(default)]
    pub subscription: Option<String>,
    /// Payment intent fulfilling the session (payment mode only)
    #[serde(default)]
    pub payment_intent: Option<String>,
    /// Application user id passed through at session creation
    #[serde(default)]
    pub client_reference_id: Option<String>,
    /// Storefront metadata
    #[serde(default)]
    pub metadata: EventMetadata,
    /// Whether this is a live mode session
    #[serde(default)]
    pub livemode: bool,
}

/// Checkout session mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckoutMode {
    /// One-time payment
    Payment,
    /// Recurring subscription
    Subscription,
    /// Save a payment method for later
    Setup,
    #[serde(other)]
    Unknown,
}

// =============================================================================
// Payment Intent Types
// =============================================================================

/// Payment intent event with typed data
#[derive(Debug, Clone)]
pub struct PaymentIntentEvent {
    /// The event ID
    pub event_id: String,
    /// Type of payment event
    pub event_type: EventType,
    /// The payment intent object
    pub intent: PaymentIntent,
}

/// Provider payment intent object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentIntent {
    /// Payment intent ID (pi_...)
    pub id: String,
    /// Amount in the smallest currency unit (cents)
    pub amount: i64,
    /// Currency code
    pub currency: String,
    /// Provider-side status string
    #[serde(default)]
    pub status: Option<String>,
    /// Customer ID, if attached
    #[serde(default)]
    pub customer: Option<String>,
    /// Storefront metadata
    #[serde(default)]
    pub metadata: EventMetadata,
    /// Whether this is a live mode intent
    #[serde(default)]
    pub livemode: bool,
}

// =============================================================================
// Subscription Types
// =============================================================================

/// Subscription event with typed data
#[derive(Debug, Clone)]
pub struct SubscriptionEvent {
    /// The event ID
    pub event_id: String,
    /// Type of subscription event
    pub event_type: EventType,
    /// The subscription object
    pub subscription: ProviderSubscription,
    /// Previous values (for updates)
    pub previous_attributes: Option<serde_json::Value>,
}

/// Provider subscription object, as carried in webhook payloads and returned
/// by the subscription detail API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSubscription {
    /// Subscription ID (sub_...)
    pub id: String,
    /// Customer ID (cus_...)
    pub customer: String,
    /// Subscription status
    pub status: crate::model::MembershipStatus,
    /// Current billing period start (Unix timestamp)
    pub current_period_start: i64,
    /// Current billing period end (Unix timestamp)
    pub current_period_end: i64,
    /// Whether the subscription will cancel at period end
    #[serde(default)]
    pub cancel_at_period_end: bool,
    /// When the subscription was canceled (if applicable)
    #[serde(default)]
    pub canceled_at: Option<i64>,
    /// When the subscription ended (if applicable)
    #[serde(default)]
    pub ended_at: Option<i64>,
    /// Storefront metadata
    #[serde(default)]
    pub metadata: EventMetadata,
    /// Whether this is a live mode subscription
    #[serde(default)]
    pub livemode: bool,
}

// =============================================================================
// Invoice Types
// =============================================================================

/// Invoice event with typed data
#[derive(Debug, Clone)]
pub struct InvoiceEvent {
    /// The event ID
    pub event_id: String,
    /// Type of invoice event
    pub event_type: EventType,
    /// The invoice object
    pub invoice: Invoice,
}

/// Provider invoice object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Invoice {
    /// Invoice ID (in_...)
    pub id: String,
    /// Customer ID
    #[serde(default)]
    pub customer: Option<String>,
    /// Associated subscription ID (if any)
    #[serde(default)]
    pub subscription: Option<String>,
    /// Total amount in cents
    pub amount_due: i64,
    /// Amount paid in cents
    pub amount_paid: i64,
    /// Currency code
    pub currency: String,
    /// Billing period start (Unix timestamp)
    #[serde(default)]
    pub period_start: i64,
    /// Billing period end (Unix timestamp)
    #[serde(default)]
    pub period_end: i64,
    /// Whether this is live mode
    #[serde(default)]
    pub livemode: bool,
}

// ============================================================================
// Tests
// ============================================================================
