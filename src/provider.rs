//! Payment Provider API Client
//!
//! Checkout completion events carry only a subscription reference; the full
//! subscription object (status, billing period, cancellation flags) has to
//! be fetched from the provider's REST API before a membership can be
//! recorded. That single read is behind the [`SubscriptionFetcher`] trait so
//! the reconciler can run against the live API, a recorded fixture, or
//! nothing at all.

use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use tracing::debug;
use url::Url;

use crate::error::ProviderError;
use crate::webhook::events::ProviderSubscription;

/// Request timeout for provider API reads.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Read access to provider-side subscription state.
#[async_trait::async_trait]
pub trait SubscriptionFetcher: Send + Sync + 'static {
    /// Fetch the full subscription object by its provider ID (`sub_...`).
    async fn fetch_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<ProviderSubscription, ProviderError>;
}

/// [`SubscriptionFetcher`] backed by the provider's REST API.
pub struct HttpProviderClient {
    base_url: Url,
    api_key: String,
    client: Client,
}

impl HttpProviderClient {
    /// Create a client for the given API root and bearer key.
    pub fn new(base_url: Url, api_key: String) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::Request(e.to_string()))?;

        Ok(Self {
            base_url,
            api_key,
            client,
        })
    }

    /// Create a client with a caller-supplied `reqwest::Client`.
    pub fn with_client(base_url: Url, api_key: String, client: Client) -> Self {
        Self {
            base_url,
            api_key,
            client,
        }
    }

    fn subscription_url(&self, subscription_id: &str) -> Result<Url, ProviderError> {
        self.base_url
            .join(&format!("/v1/subscriptions/{subscription_id}"))
            .map_err(|e| ProviderError::Request(e.to_string()))
    }
}

#[async_trait::async_trait]
impl SubscriptionFetcher for HttpProviderClient {
    async fn fetch_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<ProviderSubscription, ProviderError> {
        let url = self.subscription_url(subscription_id)?;
        debug!(subscription_id = %subscription_id, "Fetching subscription detail");

        let response = self
            .client
            .get(url)
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(ProviderError::SubscriptionNotFound(
                subscription_id.to_string(),
            ));
        }
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unreadable error body".to_string());
            return Err(ProviderError::Status {
                status: status.as_u16(),
                message,
            });
        }

        let subscription = response.json::<ProviderSubscription>().await?;
        Ok(subscription)
    }
}

/// [`SubscriptionFetcher`] reporting that no provider credentials exist.
///
/// Wired in when `CIVIPAY_PROVIDER_API_KEY` is absent; subscription checkouts
/// then fail processing (and the provider redelivers) instead of recording a
/// membership with fabricated billing periods.
pub struct DisabledSubscriptionFetcher;

#[async_trait::async_trait]
impl SubscriptionFetcher for DisabledSubscriptionFetcher {
    async fn fetch_subscription(
        &self,
        _subscription_id: &str,
    ) -> Result<ProviderSubscription, ProviderError> {
        Err(ProviderError::NotConfigured)
    }
}

/// [`SubscriptionFetcher`] over a fixed set of subscriptions, for tests.
#[derive(Default)]
pub struct StaticSubscriptions {
    subscriptions: HashMap<String, ProviderSubscription>,
}

impl StaticSubscriptions {
    /// Create an empty fixture set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subscription to the fixture set.
    pub fn insert(&mut self, subscription: ProviderSubscription) {
        self.subscriptions
            .insert(subscription.id.clone(), subscription);
    }

    /// Builder-style insertion.
    pub fn with(mut self, subscription: ProviderSubscription) -> Self {
        self.insert(subscription);
        self
    }
}

#[async_trait::async_trait]
impl SubscriptionFetcher for StaticSubscriptions {
    async fn fetch_subscription(
        &self,
        subscription_id: &str,
    ) -> Result<ProviderSubscription, ProviderError> {
        self.subscriptions
            .get(subscription_id)
            .cloned()
            .ok_or_else(|| ProviderError::SubscriptionNotFound(subscription_id.to_string()))
    }
}

// ============================================================================
// Tests
// ============================================================================
