//! Civipay - Payment Webhook Reconciliation Service
//!
//! This crate provides a production-ready webhook daemon for a
//! civic-engagement platform: it verifies HMAC-signed deliveries from the
//! payment provider and reconciles them into donation, membership, and shop
//! purchase records.
//!
//! # Features
//!
//! - **Signature Verification**: Constant-time HMAC-SHA256 checks with a
//!   replay tolerance window
//! - **Idempotent Processing**: Every event is applied at most once, keyed by
//!   the provider event id
//! - **Reconciliation**: Donations, purchases (with atomic stock decrements),
//!   and membership lifecycle updates
//! - **Operational Surface**: Health, status, and Prometheus endpoints
//!
//! # Architecture
//!
//! ```text
//! Provider ──▶ POST /webhooks/payment ──▶ SignatureVerifier
//!                                              │
//!                                              ▼
//!                                       IdempotencyStore
//!                                              │ first claim
//!                                              ▼
//!                ┌─────────────────────── Reconciler ──────────────────┐
//!                │                │                │                   │
//!                ▼                ▼                ▼                   ▼
//!            Donations        Purchases       Memberships          Notifier
//!                              + Stock         + User tier       (receipts)
//!                └────────────────┴──── Store ─────┘
//! ```
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use civipay::config::AppConfig;
//! use civipay::handlers::AppState;
//! use civipay::notify::LogNotifier;
//! use civipay::provider::DisabledSubscriptionFetcher;
//! use civipay::reconcile::Reconciler;
//! use civipay::server::{build_router, serve};
//! use civipay::store::MemoryStore;
//! use civipay::webhook::handler::WebhookState;
//! use civipay::webhook::idempotency::InMemoryIdempotencyStore;
//! use civipay::webhook::signature::SignatureVerifier;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = AppConfig::from_env()?;
//!     let store = Arc::new(MemoryStore::new());
//!     let reconciler = Arc::new(Reconciler::new(
//!         store,
//!         Arc::new(DisabledSubscriptionFetcher),
//!         Arc::new(LogNotifier),
//!         config.free_tier.clone(),
//!     ));
//!     let metrics = Arc::new(AppState::new());
//!     let webhook_state = Arc::new(WebhookState::new(
//!         SignatureVerifier::new(config.webhook_secret(), config.signature_tolerance_secs),
//!         Arc::new(InMemoryIdempotencyStore::default()),
//!         reconciler,
//!         Arc::clone(&metrics),
//!     ));
//!
//!     let app = build_router(webhook_state, metrics);
//!     serve(app, config.socket_addr(8787)).await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod config;
pub mod cors;
pub mod error;
pub mod handlers;
pub mod model;
pub mod notify;
pub mod provider;
pub mod reconcile;
pub mod server;
pub mod store;
pub mod webhook;

// Re-exports for convenience
pub use config::AppConfig;
pub use error::{Error, Result, StoreError, WebhookError};
pub use model::{Donation, Membership, PaymentStatus, Product, Purchase, UserProfile};
pub use reconcile::{ReconcileOutcome, Reconciler};
pub use store::{MemoryStore, Store};
pub use webhook::{SignatureVerifier, WebhookEvent};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");
