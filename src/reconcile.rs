//! Event Reconciliation
//!
//! Applies a verified, claimed webhook event to application state: donation
//! and purchase records, membership lifecycle, product stock, and the user's
//! access tier. One event maps to at most one primary record write.
//!
//! Failure policy follows two tiers. Primary record writes propagate their
//! errors so the endpoint returns a 500 and the provider redelivers.
//! Secondary effects (stock decrement, tier updates, receipt email) are
//! best-effort: logged on failure, never escalated, because redelivering an
//! event over a side effect would double-book the primary record on stores
//! without transactional writes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use crate::error::{StoreError, WebhookError, WebhookResult};
use crate::model::{Donation, Membership, MembershipStatus, PaymentStatus, Purchase};
use crate::notify::{send_in_background, Notification, Notifier};
use crate::provider::SubscriptionFetcher;
use crate::store::Store;
use crate::webhook::events::{
    CheckoutMode, CheckoutSessionEvent, EventMetadata, EventType, InvoiceEvent, PaymentIntentEvent,
    PaymentKind, SubscriptionEvent, WebhookEvent,
};

/// User id recorded when an event carries no user reference.
pub const ANONYMOUS_USER: &str = "anonymous";

/// Tier granted when a subscription checkout names none.
pub const DEFAULT_MEMBER_TIER: &str = "member";

/// What applying an event did, for logging and counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// A donation record was written
    DonationRecorded,
    /// A purchase record was written
    PurchaseRecorded,
    /// A membership record was created
    MembershipRecorded,
    /// An existing membership record was updated
    MembershipUpdated,
    /// Known event type, nothing to change
    Noop,
    /// Event type we do not handle
    Ignored,
}

impl ReconcileOutcome {
    /// Stable label for logs and metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DonationRecorded => "donation_recorded",
            Self::PurchaseRecorded => "purchase_recorded",
            Self::MembershipRecorded => "membership_recorded",
            Self::MembershipUpdated => "membership_updated",
            Self::Noop => "noop",
            Self::Ignored => "ignored",
        }
    }

    /// Whether a record was written to the store.
    pub fn wrote_record(&self) -> bool {
        !matches!(self, Self::Noop | Self::Ignored)
    }
}

/// Applies webhook events to the store, provider, and notifier ports.
pub struct Reconciler {
    store: Arc<dyn Store>,
    subscriptions: Arc<dyn SubscriptionFetcher>,
    notifier: Arc<dyn Notifier>,
    /// Tier users revert to when their membership is canceled
    free_tier: String,
}

impl Reconciler {
    /// Wire a reconciler to its ports.
    pub fn new(
        store: Arc<dyn Store>,
        subscriptions: Arc<dyn SubscriptionFetcher>,
        notifier: Arc<dyn Notifier>,
        free_tier: impl Into<String>,
    ) -> Self {
        Self {
            store,
            subscriptions,
            notifier,
            free_tier: free_tier.into(),
        }
    }

    /// Apply one verified event.
    ///
    /// The caller has already claimed the event ID; this never checks for
    /// duplicates itself.
    #[instrument(skip_all, fields(event_id = %event.id, event_type = %event.event_type))]
    pub async fn apply(&self, event: &WebhookEvent) -> WebhookResult<ReconcileOutcome> {
        let outcome = match event.typed_event_type() {
            EventType::CheckoutSessionCompleted => {
                self.on_checkout_completed(&event.as_checkout_session()?)
                    .await?
            }
            EventType::PaymentIntentSucceeded => {
                self.on_payment(&event.as_payment_intent()?, PaymentStatus::Succeeded)
                    .await?
            }
            EventType::PaymentIntentFailed => {
                self.on_payment(&event.as_payment_intent()?, PaymentStatus::Failed)
                    .await?
            }
            EventType::SubscriptionUpdated | EventType::SubscriptionDeleted => {
                self.on_subscription_lifecycle(&event.as_subscription()?)
                    .await?
            }
            EventType::InvoicePaymentSucceeded => {
                self.on_invoice(&event.as_invoice()?, MembershipStatus::Active)
                    .await?
            }
            EventType::InvoicePaymentFailed => {
                self.on_invoice(&event.as_invoice()?, MembershipStatus::PastDue)
                    .await?
            }
            EventType::Unknown => {
                debug!("Ignoring unhandled event type");
                ReconcileOutcome::Ignored
            }
        };

        info!(outcome = outcome.as_str(), "Event reconciled");
        Ok(outcome)
    }

    /// Checkout completion: a donation for one-time payments, a membership
    /// for subscription signups.
    async fn on_checkout_completed(
        &self,
        event: &CheckoutSessionEvent,
    ) -> WebhookResult<ReconcileOutcome> {
        let session = &event.session;
        match session.mode {
            CheckoutMode::Payment => {
                let user_id =
                    resolve_user_id(session.client_reference_id.as_deref(), &session.metadata);
                let amount = minor_to_major(session.amount_total.unwrap_or(0));
                let currency = session
                    .currency
                    .clone()
                    .unwrap_or_else(|| "usd".to_string());

                let donation = Donation {
                    id: Uuid::new_v4(),
                    user_id: user_id.clone(),
                    amount,
                    currency: currency.clone(),
                    status: PaymentStatus::Succeeded,
                    payment_ref: session
                        .payment_intent
                        .clone()
                        .unwrap_or_else(|| session.id.clone()),
                    description: session.metadata.description.clone(),
                    created_at: Utc::now(),
                };

                self.store
                    .create_donation(donation)
                    .await
                    .map_err(processing_failed)?;
                info!(user_id = %user_id, amount, currency = %currency, "Donation recorded");

                self.notify_user(&user_id, |email| {
                    Notification::donation_receipt(email, amount, &currency)
                })
                .await;

                Ok(ReconcileOutcome::DonationRecorded)
            }
            CheckoutMode::Subscription => self.on_subscription_checkout(event).await,
            CheckoutMode::Setup | CheckoutMode::Unknown => {
                debug!(mode = ?session.mode, "Checkout session with no payment to reconcile");
                Ok(ReconcileOutcome::Noop)
            }
        }
    }

    /// Subscription checkout: fetch the subscription detail from the
    /// provider, record the membership, then set the user's tier.
    async fn on_subscription_checkout(
        &self,
        event: &CheckoutSessionEvent,
    ) -> WebhookResult<ReconcileOutcome> {
        let session = &event.session;
        let subscription_ref = session.subscription.clone().ok_or_else(|| {
            WebhookError::ProcessingFailed(
                "subscription checkout without subscription reference".to_string(),
            )
        })?;

        let subscription = self
            .subscriptions
            .fetch_subscription(&subscription_ref)
            .await
            .map_err(processing_failed)?;

        let user_id = resolve_user_id(session.client_reference_id.as_deref(), &session.metadata);
        let tier = session
            .metadata
            .tier
            .clone()
            .or_else(|| subscription.metadata.tier.clone())
            .unwrap_or_else(|| DEFAULT_MEMBER_TIER.to_string());
        let now = Utc::now();

        let membership = Membership {
            id: Uuid::new_v4(),
            user_id: user_id.clone(),
            tier: tier.clone(),
            subscription_ref: subscription_ref.clone(),
            status: subscription.status,
            started_at: timestamp_to_datetime(subscription.current_period_start)
                .unwrap_or(now),
            current_period_end: timestamp_to_datetime(subscription.current_period_end),
            ended_at: subscription.ended_at.and_then(timestamp_to_datetime),
            cancel_at_period_end: subscription.cancel_at_period_end,
            created_at: now,
            updated_at: now,
        };

        self.store
            .create_membership(membership)
            .await
            .map_err(processing_failed)?;
        info!(
            user_id = %user_id,
            subscription_ref = %subscription_ref,
            tier = %tier,
            "Membership recorded"
        );

        // Tier updates live on the user profile, outside the membership
        // record; a failure here must not bounce the event back
        if let Err(e) = self.store.set_user_tier(&user_id, &tier).await {
            warn!(user_id = %user_id, tier = %tier, error = %e, "Tier update failed; continuing");
        }

        self.notify_user(&user_id, |email| {
            Notification::membership_welcome(email, &tier)
        })
        .await;

        Ok(ReconcileOutcome::MembershipRecorded)
    }

    /// Direct payment events: a donation unless tagged as a purchase.
    async fn on_payment(
        &self,
        event: &PaymentIntentEvent,
        status: PaymentStatus,
    ) -> WebhookResult<ReconcileOutcome> {
        let intent = &event.intent;
        let user_id = resolve_user_id(None, &intent.metadata);

        match intent.metadata.payment_kind() {
            PaymentKind::Purchase => {
                let product_id = intent.metadata.product_id.clone().ok_or_else(|| {
                    WebhookError::ProcessingFailed(
                        "purchase payment without product_id metadata".to_string(),
                    )
                })?;
                let product_name = intent
                    .metadata
                    .product_name
                    .clone()
                    .unwrap_or_else(|| product_id.clone());

                let purchase = Purchase {
                    id: Uuid::new_v4(),
                    user_id: user_id.clone(),
                    product_id: product_id.clone(),
                    product_name,
                    amount: minor_to_major(intent.amount),
                    currency: intent.currency.clone(),
                    status,
                    payment_ref: intent.id.clone(),
                    created_at: Utc::now(),
                };

                self.store
                    .create_purchase(purchase)
                    .await
                    .map_err(processing_failed)?;
                info!(
                    user_id = %user_id,
                    product_id = %product_id,
                    status = status.as_str(),
                    "Purchase recorded"
                );

                // Stock only moves for money actually captured
                if status == PaymentStatus::Succeeded {
                    match self.store.decrement_stock(&product_id).await {
                        Ok(product) => {
                            info!(product_id = %product_id, remaining = product.stock, "Stock decremented");
                        }
                        Err(StoreError::OutOfStock(_)) => {
                            warn!(product_id = %product_id, "Purchase succeeded for product with no stock");
                        }
                        Err(e) => {
                            warn!(product_id = %product_id, error = %e, "Stock decrement failed; continuing");
                        }
                    }
                }

                Ok(ReconcileOutcome::PurchaseRecorded)
            }
            PaymentKind::Donation => {
                let amount = minor_to_major(intent.amount);
                let currency = intent.currency.clone();

                let donation = Donation {
                    id: Uuid::new_v4(),
                    user_id: user_id.clone(),
                    amount,
                    currency: currency.clone(),
                    status,
                    payment_ref: intent.id.clone(),
                    description: intent.metadata.description.clone(),
                    created_at: Utc::now(),
                };

                self.store
                    .create_donation(donation)
                    .await
                    .map_err(processing_failed)?;
                info!(user_id = %user_id, amount, status = status.as_str(), "Donation recorded");

                if status == PaymentStatus::Succeeded {
                    self.notify_user(&user_id, |email| {
                        Notification::donation_receipt(email, amount, &currency)
                    })
                    .await;
                }

                Ok(ReconcileOutcome::DonationRecorded)
            }
        }
    }

    /// Subscription updated/deleted: mirror provider state onto the
    /// membership record. Cancellations also set the ended date and reset
    /// the user's tier; deletion clears the period-end schedule flag.
    async fn on_subscription_lifecycle(
        &self,
        event: &SubscriptionEvent,
    ) -> WebhookResult<ReconcileOutcome> {
        let subscription = &event.subscription;

        let Some(mut membership) = self
            .store
            .membership_by_subscription(&subscription.id)
            .await
            .map_err(processing_failed)?
        else {
            info!(
                subscription_ref = %subscription.id,
                "Lifecycle event for unknown membership; skipping"
            );
            return Ok(ReconcileOutcome::Noop);
        };

        let now = Utc::now();
        let deleted = event.event_type == EventType::SubscriptionDeleted;
        let canceled = deleted || subscription.status == MembershipStatus::Canceled;

        membership.status = subscription.status;
        membership.current_period_end = timestamp_to_datetime(subscription.current_period_end);
        membership.cancel_at_period_end = subscription.cancel_at_period_end;
        membership.updated_at = now;

        if canceled {
            membership.status = MembershipStatus::Canceled;
            membership.ended_at = subscription
                .ended_at
                .and_then(timestamp_to_datetime)
                .or(Some(now));
        }
        if deleted {
            // A period-end cancellation delivers its final payload with the
            // schedule flag still set; nothing is scheduled once it fires.
            membership.cancel_at_period_end = false;
        }

        let user_id = membership.user_id.clone();
        self.store
            .update_membership(membership)
            .await
            .map_err(processing_failed)?;
        info!(
            subscription_ref = %subscription.id,
            status = subscription.status.as_str(),
            canceled,
            "Membership updated"
        );

        if canceled {
            if let Err(e) = self.store.set_user_tier(&user_id, &self.free_tier).await {
                warn!(user_id = %user_id, error = %e, "Tier reset failed; continuing");
            }
        }

        Ok(ReconcileOutcome::MembershipUpdated)
    }

    /// Invoice outcomes map to membership status only; billing periods are
    /// owned by subscription lifecycle events.
    async fn on_invoice(
        &self,
        event: &InvoiceEvent,
        status: MembershipStatus,
    ) -> WebhookResult<ReconcileOutcome> {
        let Some(subscription_ref) = event.invoice.subscription.clone() else {
            debug!(invoice_id = %event.invoice.id, "Invoice without subscription; skipping");
            return Ok(ReconcileOutcome::Noop);
        };

        let Some(mut membership) = self
            .store
            .membership_by_subscription(&subscription_ref)
            .await
            .map_err(processing_failed)?
        else {
            info!(
                subscription_ref = %subscription_ref,
                "Invoice for unknown membership; skipping"
            );
            return Ok(ReconcileOutcome::Noop);
        };

        membership.status = status;
        membership.updated_at = Utc::now();

        self.store
            .update_membership(membership)
            .await
            .map_err(processing_failed)?;
        info!(
            subscription_ref = %subscription_ref,
            status = status.as_str(),
            "Membership status updated from invoice"
        );

        Ok(ReconcileOutcome::MembershipUpdated)
    }

    /// Fire-and-forget a notification to the user's email, if known.
    async fn notify_user<F>(&self, user_id: &str, build: F)
    where
        F: FnOnce(String) -> Notification,
    {
        if user_id == ANONYMOUS_USER {
            return;
        }
        match self.store.user(user_id).await {
            Ok(Some(profile)) => {
                if let Some(email) = profile.email {
                    send_in_background(self.notifier.clone(), build(email));
                }
            }
            Ok(None) => {}
            Err(e) => debug!(user_id = %user_id, error = %e, "User lookup for notification failed"),
        }
    }
}

/// Pick the user a payment belongs to, preferring the checkout reference
/// over metadata; anonymous when neither exists.
fn resolve_user_id(client_reference: Option<&str>, metadata: &EventMetadata) -> String {
    client_reference
        .or(metadata.user_id.as_deref())
        .unwrap_or(ANONYMOUS_USER)
        .to_string()
}

/// Convert provider minor units (cents) to the major unit recorded on
/// donation and purchase rows.
fn minor_to_major(minor: i64) -> f64 {
    minor as f64 / 100.0
}

fn timestamp_to_datetime(secs: i64) -> Option<DateTime<Utc>> {
    DateTime::from_timestamp(secs, 0)
}

fn processing_failed<E: std::fmt::Display>(e: E) -> WebhookError {
    WebhookError::ProcessingFailed(e.to_string())
}

// ============================================================================
// Tests
// ============================================================================
