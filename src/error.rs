//! Error types for Civipay
//!
//! This module provides the error type hierarchy using `thiserror`,
//! covering webhook verification, storage, the provider API client, and
//! configuration loading.

use thiserror::Error;

/// The main error type for Civipay operations
#[derive(Error, Debug)]
pub enum Error {
    /// Webhook verification and processing errors
    #[error("Webhook error: {0}")]
    Webhook(#[from] WebhookError),

    /// Storage errors
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Payment provider API errors
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Configuration errors
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with message
    #[error("{0}")]
    Generic(String),
}

/// Webhook verification and dispatch errors
#[derive(Error, Debug)]
pub enum WebhookError {
    /// No signature header was sent with the delivery
    #[error("Missing signature header")]
    MissingSignature,

    /// The signature header is malformed or does not match the payload
    #[error("Invalid webhook signature")]
    SignatureInvalid,

    /// The signed timestamp is outside the replay tolerance window
    #[error("Signed timestamp {0} outside replay tolerance")]
    TimestampOutOfTolerance(u64),

    /// The payload could not be parsed into an event envelope
    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    /// Reconciliation failed after the delivery was verified
    #[error("Processing failed: {0}")]
    ProcessingFailed(String),
}

impl WebhookError {
    /// Sender-caused errors: rejected with a 400 and no side effects.
    ///
    /// Everything else maps to a 500 so the provider redelivers.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::MissingSignature
                | Self::SignatureInvalid
                | Self::TimestampOutOfTolerance(_)
                | Self::InvalidPayload(_)
        )
    }
}

/// Storage errors
#[derive(Error, Debug)]
pub enum StoreError {
    /// Referenced product does not exist
    #[error("Product not found: {0}")]
    ProductNotFound(String),

    /// Conditional stock decrement found no remaining stock
    #[error("Product out of stock: {0}")]
    OutOfStock(String),

    /// Referenced user does not exist
    #[error("User not found: {0}")]
    UserNotFound(String),

    /// No membership matches the subscription reference
    #[error("Membership not found for subscription {0}")]
    MembershipNotFound(String),

    /// Backend write failure
    #[error("Write failed: {0}")]
    WriteFailed(String),
}

/// Payment provider API errors
#[derive(Error, Debug)]
pub enum ProviderError {
    /// No API key configured; subscription detail fetch is disabled
    #[error("Provider API is not configured")]
    NotConfigured,

    /// Transport-level request failure
    #[error("Provider request failed: {0}")]
    Request(String),

    /// Provider answered with a non-success status
    #[error("Unexpected status {status} from provider: {message}")]
    Status {
        /// HTTP status code returned by the provider
        status: u16,
        /// Response body or status text
        message: String,
    },

    /// Provider has no subscription with the given id
    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),

    /// Provider response could not be decoded
    #[error("Failed to decode provider response: {0}")]
    Decode(String),
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            ProviderError::Decode(err.to_string())
        } else {
            ProviderError::Request(err.to_string())
        }
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Required environment variable is absent
    #[error("{0} environment variable not set")]
    MissingVar(&'static str),

    /// Environment variable is present but unusable
    #[error("Invalid value for {var}: {reason}")]
    InvalidValue {
        /// Variable name
        var: &'static str,
        /// Why the value was rejected
        reason: String,
    },
}

/// Result type alias for Civipay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Result type alias for webhook verification and dispatch
pub type WebhookResult<T> = std::result::Result<T, WebhookError>;

impl Error {
    /// Create a generic error from a string
    pub fn generic<S: Into<String>>(msg: S) -> Self {
        Error::Generic(msg.into())
    }
}
