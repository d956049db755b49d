//! Payment Webhook Module
//!
//! Secure handling of the payment provider's webhook deliveries:
//!
//! - **Signature Verification**: HMAC-SHA256 validation of the signature
//!   header, constant-time comparison, replay tolerance window
//! - **Idempotency**: deduplication of at-least-once deliveries keyed by the
//!   provider's event ID
//! - **Typed Events**: envelope and payload parsing with an explicit catch-all
//!   for event types we acknowledge but ignore
//! - **Synchronous Reconciliation**: records are written before the delivery
//!   is acknowledged, so provider redelivery doubles as the retry loop
//!
//! # Architecture
//!
//! ```text
//! Request -> Signature Verify -> Parse -> Idempotency Claim -> Reconcile -> 200
//!                 |                |              |                 |
//!                 v                v              v                 v
//!                400              400      200 (duplicate)    500 (redelivered)
//! ```
//!
//! # Security
//!
//! - Webhook signing secret loaded from the environment, never logged
//! - Constant-time signature comparison to prevent timing attacks
//! - Raw body bytes verified before any JSON parsing
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use civipay::config::AppConfig;
//! use civipay::handlers::AppState;
//! use civipay::notify::LogNotifier;
//! use civipay::provider::DisabledSubscriptionFetcher;
//! use civipay::reconcile::Reconciler;
//! use civipay::store::MemoryStore;
//! use civipay::webhook::{
//!     webhook_router, InMemoryIdempotencyStore, SignatureVerifier, WebhookState,
//! };
//!
//! let config = AppConfig::from_env().expect("Config error");
//! let store = Arc::new(MemoryStore::new());
//! let reconciler = Arc::new(Reconciler::new(
//!     store,
//!     Arc::new(DisabledSubscriptionFetcher),
//!     Arc::new(LogNotifier),
//!     config.free_tier.clone(),
//! ));
//! let state = Arc::new(WebhookState::new(
//!     SignatureVerifier::new(config.webhook_secret(), config.signature_tolerance_secs),
//!     Arc::new(InMemoryIdempotencyStore::default()),
//!     reconciler,
//!     Arc::new(AppState::new()),
//! ));
//! let app = webhook_router(state);
//! // ... serve with axum
//! ```

pub mod events;
pub mod handler;
pub mod idempotency;
pub mod signature;

// Re-export commonly used items
pub use events::{
    CheckoutSession, CheckoutSessionEvent, EventType, Invoice, InvoiceEvent, PaymentIntent,
    PaymentIntentEvent, ProviderSubscription, SubscriptionEvent, WebhookEvent,
};
pub use handler::{
    payment_webhook_handler, webhook_router, WebhookAck, WebhookState, SIGNATURE_HEADER,
    WEBHOOK_PATH,
};
pub use idempotency::{ClaimOutcome, IdempotencyStore, InMemoryIdempotencyStore, ProcessingState};
pub use signature::SignatureVerifier;
