//! Receipt Notifications
//!
//! Successful donations and new memberships trigger a best-effort email to
//! the user. Sends are fire-and-forget: the webhook response never waits on
//! the mail service, and a failed send is logged and dropped. A payment
//! record must never bounce back to the provider because a receipt email
//! failed.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Client;
use serde::Serialize;
use tracing::{info, warn};

/// Default Resend-compatible API root.
const DEFAULT_MAIL_API_URL: &str = "https://api.resend.com";

/// Request timeout for mail API calls.
const SEND_TIMEOUT: Duration = Duration::from_secs(15);

/// A receipt to deliver to a user.
#[derive(Debug, Clone)]
pub struct Notification {
    /// Recipient address
    pub to: String,
    /// Subject line
    pub subject: String,
    /// Plain-text body
    pub body: String,
}

impl Notification {
    /// Receipt for a completed donation.
    pub fn donation_receipt(to: impl Into<String>, amount: f64, currency: &str) -> Self {
        Self {
            to: to.into(),
            subject: "Thank you for your donation".to_string(),
            body: format!(
                "We received your donation of {amount:.2} {}.",
                currency.to_uppercase()
            ),
        }
    }

    /// Welcome message for a new membership.
    pub fn membership_welcome(to: impl Into<String>, tier: &str) -> Self {
        Self {
            to: to.into(),
            subject: "Welcome to your new membership".to_string(),
            body: format!("Your {tier} membership is now active."),
        }
    }
}

/// Outbound notification delivery.
#[async_trait::async_trait]
pub trait Notifier: Send + Sync + 'static {
    /// Deliver one notification.
    async fn send(&self, notification: &Notification) -> anyhow::Result<()>;
}

/// Spawn a send without awaiting its outcome.
///
/// Failures are logged at warn and otherwise ignored.
pub fn send_in_background(notifier: Arc<dyn Notifier>, notification: Notification) {
    tokio::spawn(async move {
        if let Err(e) = notifier.send(&notification).await {
            warn!(
                to = %notification.to,
                subject = %notification.subject,
                error = %e,
                "Notification send failed"
            );
        }
    });
}

/// [`Notifier`] that only writes a log line. The default when no mail
/// credentials are configured.
pub struct LogNotifier;

#[async_trait::async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        info!(
            to = %notification.to,
            subject = %notification.subject,
            "Notification (log only)"
        );
        Ok(())
    }
}

/// Mail API request body.
#[derive(Debug, Clone, Serialize)]
struct EmailPayload {
    from: String,
    to: Vec<String>,
    subject: String,
    text: String,
}

/// [`Notifier`] posting to a Resend-compatible mail API.
pub struct HttpNotifier {
    api_key: String,
    from: String,
    base_url: String,
    client: Client,
}

impl HttpNotifier {
    /// Create a notifier for the hosted mail API.
    pub fn new(api_key: String, from: String) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(SEND_TIMEOUT).build()?;
        Ok(Self {
            api_key,
            from,
            base_url: DEFAULT_MAIL_API_URL.to_string(),
            client,
        })
    }

    /// Point the notifier at a different API root (tests, self-hosted relay).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_payload(&self, notification: &Notification) -> EmailPayload {
        EmailPayload {
            from: self.from.clone(),
            to: vec![notification.to.clone()],
            subject: notification.subject.clone(),
            text: notification.body.clone(),
        }
    }
}

#[async_trait::async_trait]
impl Notifier for HttpNotifier {
    async fn send(&self, notification: &Notification) -> anyhow::Result<()> {
        let payload = self.build_payload(notification);

        let response = self
            .client
            .post(format!("{}/emails", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "unreadable error body".to_string());
            anyhow::bail!("mail API error ({status}): {body}");
        }

        Ok(())
    }
}

// ============================================================================
// Tests
// ============================================================================
