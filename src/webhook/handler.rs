//! Webhook HTTP Handler
//!
//! The single inbound surface of the service. Processing is synchronous
//! within the request: the provider's delivery is acknowledged only after
//! reconciliation finishes, so a failure turns into a 500 and the provider's
//! redelivery becomes our retry loop.
//!
//! # Flow
//!
//! ```text
//! POST /webhooks/payment
//!        |
//!        v
//! [Verify Signature] -- bad/missing --> 400 (no side effects)
//!        |
//!        v
//! [Parse Envelope] -- malformed --> 400
//!        |
//!        v
//! [Claim Event ID] -- already seen --> 200 {"received": true}
//!        |
//!        v
//! [Reconcile] -- error --> mark Failed --> 500 (provider redelivers)
//!        |
//!        v
//! [Mark Completed] --> 200 {"received": true}
//! ```
//!
//! The raw body bytes are extracted before any JSON parsing; signature
//! verification runs over exactly what was sent on the wire.

use std::sync::Arc;
use std::time::Instant;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::{error, info, instrument, warn};

use crate::error::{WebhookError, WebhookResult};
use crate::handlers::AppState;
use crate::reconcile::Reconciler;
use crate::webhook::events::WebhookEvent;
use crate::webhook::idempotency::{ClaimOutcome, IdempotencyStore};
use crate::webhook::signature::SignatureVerifier;

/// Header carrying the provider's signature.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

/// Webhook endpoint path.
pub const WEBHOOK_PATH: &str = "/webhooks/payment";

/// Everything the webhook endpoint needs, shared across requests.
pub struct WebhookState {
    verifier: SignatureVerifier,
    idempotency: Arc<dyn IdempotencyStore>,
    reconciler: Arc<Reconciler>,
    metrics: Arc<AppState>,
}

impl WebhookState {
    /// Assemble the endpoint state.
    pub fn new(
        verifier: SignatureVerifier,
        idempotency: Arc<dyn IdempotencyStore>,
        reconciler: Arc<Reconciler>,
        metrics: Arc<AppState>,
    ) -> Self {
        Self {
            verifier,
            idempotency,
            reconciler,
            metrics,
        }
    }
}

/// Fixed-shape acknowledgement body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookAck {
    /// Always true; the provider only checks the status code
    pub received: bool,
}

impl WebhookAck {
    fn received() -> Self {
        Self { received: true }
    }
}

/// Error body returned on rejection or processing failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable description of what went wrong
    pub error: String,
}

/// Build the webhook router.
pub fn webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route(WEBHOOK_PATH, post(payment_webhook_handler))
        .with_state(state)
}

/// Handle one provider delivery.
///
/// # Route
/// `POST /webhooks/payment`
///
/// # Responses
/// - `200 OK` `{"received": true}` on success and on duplicate deliveries
/// - `400 Bad Request` for missing/invalid signatures and malformed payloads
/// - `500 Internal Server Error` when reconciliation fails (triggers the
///   provider's automatic redelivery)
#[instrument(skip_all)]
pub async fn payment_webhook_handler(
    State(state): State<Arc<WebhookState>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let started = Instant::now();
    state.metrics.record_event_received();

    let result = handle_delivery(&state, &headers, &body).await;
    state.metrics.record_latency(started.elapsed());

    match result {
        Ok(ack) => (StatusCode::OK, Json(ack)).into_response(),
        Err(e) => {
            match &e {
                WebhookError::MissingSignature
                | WebhookError::SignatureInvalid
                | WebhookError::TimestampOutOfTolerance(_) => {
                    state.metrics.record_signature_failure();
                    warn!(error = %e, "Rejected webhook delivery");
                }
                WebhookError::InvalidPayload(_) => {
                    state.metrics.record_invalid_payload();
                    warn!(error = %e, "Rejected webhook payload");
                }
                WebhookError::ProcessingFailed(_) => {
                    state.metrics.record_processing_failure();
                    error!(error = %e, "Webhook processing failed");
                }
            }

            let status = if e.is_rejection() {
                StatusCode::BAD_REQUEST
            } else {
                StatusCode::INTERNAL_SERVER_ERROR
            };
            (
                status,
                Json(ErrorResponse {
                    error: e.to_string(),
                }),
            )
                .into_response()
        }
    }
}

/// Verify, claim, and reconcile one delivery.
async fn handle_delivery(
    state: &WebhookState,
    headers: &HeaderMap,
    body: &[u8],
) -> WebhookResult<WebhookAck> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|value| value.to_str().ok())
        .ok_or(WebhookError::MissingSignature)?;

    state.verifier.verify(body, signature)?;

    let event = WebhookEvent::from_bytes(body)?;

    match state.idempotency.claim(&event.id).await? {
        ClaimOutcome::Claimed => {}
        ClaimOutcome::Duplicate(seen_state) => {
            info!(
                event_id = %event.id,
                event_type = %event.event_type,
                state = ?seen_state,
                "Duplicate delivery; acknowledging without processing"
            );
            state.metrics.record_duplicate();
            return Ok(WebhookAck::received());
        }
    }

    match state.reconciler.apply(&event).await {
        Ok(outcome) => {
            // Never bounce a processed event over bookkeeping: a 500 here
            // would cause a redelivery of work already done
            if let Err(mark_err) = state.idempotency.mark_completed(&event.id).await {
                error!(
                    event_id = %event.id,
                    error = %mark_err,
                    "Failed to record completion in idempotency store"
                );
            }
            state.metrics.record_outcome(outcome);
            Ok(WebhookAck::received())
        }
        Err(e) => {
            // Leave the claim in a retryable state for the redelivery
            if let Err(mark_err) = state
                .idempotency
                .mark_failed(&event.id, &e.to_string())
                .await
            {
                error!(
                    event_id = %event.id,
                    error = %mark_err,
                    "Failed to record failure in idempotency store"
                );
            }
            Err(e)
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
