//! Runtime Configuration for Civipay
//!
//! All settings are read from environment variables at startup so that the
//! daemon can run unchanged across local, staging, and production deployments.
//! Secrets (the webhook signing secret, provider and mailer API keys) are held
//! in memory but never printed: the manual `Debug` impl redacts them.
//!
//! # Environment Variables
//!
//! - `CIVIPAY_WEBHOOK_SECRET` (required): HMAC signing secret shared with the
//!   payment provider (`whsec_...` for Stripe endpoints)
//! - `CIVIPAY_PROVIDER_API_KEY` (optional): bearer key for provider API reads;
//!   subscription lookups are disabled without it
//! - `CIVIPAY_PROVIDER_BASE_URL` (optional): provider API root
//!   (default: `https://api.stripe.com`)
//! - `CIVIPAY_SIGNATURE_TOLERANCE_SECS` (optional): max age of a signed
//!   timestamp before the event is rejected as a replay (default: 300)
//! - `CIVIPAY_FREE_TIER` (optional): tier users fall back to when a
//!   membership ends (default: `free`)
//! - `CIVIPAY_RESEND_API_KEY` (optional): API key for outbound receipt email
//! - `CIVIPAY_NOTIFY_FROM` (optional): From address for receipt email
//! - `CIVIPAY_BIND_ALL` (optional): set to "true" to bind 0.0.0.0 (Docker)
//!
//! # Example
//!
//! ```rust,no_run
//! use civipay::config::AppConfig;
//!
//! let config = AppConfig::from_env().expect("Config error");
//! let addr = config.socket_addr(8787);
//! ```

use std::env;
use std::fmt;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use tracing::{info, warn};
use url::Url;

use crate::error::ConfigError;

/// Default provider API root (Stripe's public API host).
pub const DEFAULT_PROVIDER_BASE_URL: &str = "https://api.stripe.com";

/// Default signed-timestamp tolerance in seconds.
pub const DEFAULT_SIGNATURE_TOLERANCE_SECS: u64 = 300;

/// Default tier a user reverts to when their membership ends.
pub const DEFAULT_FREE_TIER: &str = "free";

/// Top-level runtime configuration, loaded once at startup.
#[derive(Clone)]
pub struct AppConfig {
    /// Webhook signing secret shared with the provider (never logged)
    webhook_secret: String,

    /// Provider API key for subscription lookups (never logged)
    provider_api_key: Option<String>,

    /// Provider API root, e.g. `https://api.stripe.com`
    pub provider_base_url: Url,

    /// Max age of a signed timestamp before rejection, in seconds
    pub signature_tolerance_secs: u64,

    /// Tier users fall back to when a membership is canceled
    pub free_tier: String,

    /// API key for the outbound mail service (never logged)
    resend_api_key: Option<String>,

    /// From address for receipt email
    pub notify_from: Option<String>,

    /// Whether to bind to all interfaces (for Docker)
    pub bind_all: bool,

    /// Bind address derived from the bind_all setting
    pub bind_addr: IpAddr,
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::MissingVar`] if `CIVIPAY_WEBHOOK_SECRET` is not
    /// set, and [`ConfigError::InvalidValue`] for values that are present but
    /// unusable (empty secret, malformed URL, zero or non-numeric tolerance).
    pub fn from_env() -> Result<Self, ConfigError> {
        let webhook_secret = env::var("CIVIPAY_WEBHOOK_SECRET")
            .map_err(|_| ConfigError::MissingVar("CIVIPAY_WEBHOOK_SECRET"))?;

        if webhook_secret.is_empty() {
            return Err(ConfigError::InvalidValue {
                var: "CIVIPAY_WEBHOOK_SECRET",
                reason: "secret cannot be empty".to_string(),
            });
        }

        if webhook_secret.len() < 16 {
            warn!("CIVIPAY_WEBHOOK_SECRET is shorter than 16 characters");
        }

        let provider_api_key = env::var("CIVIPAY_PROVIDER_API_KEY")
            .ok()
            .filter(|v| !v.is_empty());
        if provider_api_key.is_none() {
            warn!("CIVIPAY_PROVIDER_API_KEY not set; subscription lookups are disabled");
        }

        let provider_base_url = env::var("CIVIPAY_PROVIDER_BASE_URL")
            .unwrap_or_else(|_| DEFAULT_PROVIDER_BASE_URL.to_string());
        let provider_base_url = Self::parse_base_url(&provider_base_url)?;

        let signature_tolerance_secs = env::var("CIVIPAY_SIGNATURE_TOLERANCE_SECS")
            .unwrap_or_else(|_| DEFAULT_SIGNATURE_TOLERANCE_SECS.to_string())
            .parse::<u64>()
            .map_err(|e| ConfigError::InvalidValue {
                var: "CIVIPAY_SIGNATURE_TOLERANCE_SECS",
                reason: e.to_string(),
            })?;

        if signature_tolerance_secs == 0 {
            return Err(ConfigError::InvalidValue {
                var: "CIVIPAY_SIGNATURE_TOLERANCE_SECS",
                reason: "tolerance cannot be 0".to_string(),
            });
        }

        let free_tier =
            env::var("CIVIPAY_FREE_TIER").unwrap_or_else(|_| DEFAULT_FREE_TIER.to_string());
        if free_tier.is_empty() {
            return Err(ConfigError::InvalidValue {
                var: "CIVIPAY_FREE_TIER",
                reason: "tier name cannot be empty".to_string(),
            });
        }

        let resend_api_key = env::var("CIVIPAY_RESEND_API_KEY")
            .ok()
            .filter(|v| !v.is_empty());
        let notify_from = env::var("CIVIPAY_NOTIFY_FROM").ok().filter(|v| !v.is_empty());

        if resend_api_key.is_some() && notify_from.is_none() {
            warn!("CIVIPAY_RESEND_API_KEY set without CIVIPAY_NOTIFY_FROM; falling back to log notifications");
        }

        let bind_all = env::var("CIVIPAY_BIND_ALL")
            .map(|v| v.to_lowercase() == "true")
            .unwrap_or(false);

        let bind_addr = if bind_all {
            warn!("Binding to 0.0.0.0 (CIVIPAY_BIND_ALL=true)");
            IpAddr::V4(Ipv4Addr::new(0, 0, 0, 0))
        } else {
            info!("Binding to localhost only (127.0.0.1)");
            IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1))
        };

        info!(
            tolerance_secs = signature_tolerance_secs,
            free_tier = %free_tier,
            provider = %provider_base_url,
            "Configuration loaded"
        );

        Ok(Self {
            webhook_secret,
            provider_api_key,
            provider_base_url,
            signature_tolerance_secs,
            free_tier,
            resend_api_key,
            notify_from,
            bind_all,
            bind_addr,
        })
    }

    /// Parse and validate a provider base URL.
    fn parse_base_url(raw: &str) -> Result<Url, ConfigError> {
        let url = Url::parse(raw).map_err(|e| ConfigError::InvalidValue {
            var: "CIVIPAY_PROVIDER_BASE_URL",
            reason: e.to_string(),
        })?;

        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(ConfigError::InvalidValue {
                    var: "CIVIPAY_PROVIDER_BASE_URL",
                    reason: format!("unsupported scheme '{other}'"),
                });
            }
        }

        if url.host_str().is_none() {
            return Err(ConfigError::InvalidValue {
                var: "CIVIPAY_PROVIDER_BASE_URL",
                reason: "URL has no host".to_string(),
            });
        }

        Ok(url)
    }

    /// The webhook signing secret, for HMAC verification.
    pub fn webhook_secret(&self) -> &str {
        &self.webhook_secret
    }

    /// The provider API key, if subscription lookups are enabled.
    pub fn provider_api_key(&self) -> Option<&str> {
        self.provider_api_key.as_deref()
    }

    /// The outbound mail API key, if receipt email is enabled.
    pub fn resend_api_key(&self) -> Option<&str> {
        self.resend_api_key.as_deref()
    }

    /// Get the socket address for binding.
    pub fn socket_addr(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.bind_addr, port)
    }

    /// Create a test configuration (for testing only).
    #[cfg(test)]
    pub fn test_config() -> Self {
        Self::for_tests()
    }

    /// Fixed configuration used by unit and integration tests.
    ///
    /// Not part of the public API surface; exists so integration tests can
    /// build an app without touching process environment.
    #[doc(hidden)]
    pub fn for_tests() -> Self {
        Self {
            webhook_secret: "whsec_test_secret_for_unit_tests".to_string(),
            provider_api_key: Some("sk_test_key_for_unit_tests".to_string()),
            provider_base_url: Url::parse(DEFAULT_PROVIDER_BASE_URL).unwrap(),
            signature_tolerance_secs: DEFAULT_SIGNATURE_TOLERANCE_SECS,
            free_tier: DEFAULT_FREE_TIER.to_string(),
            resend_api_key: None,
            notify_from: None,
            bind_all: false,
            bind_addr: IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)),
        }
    }
}

impl fmt::Debug for AppConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppConfig")
            .field("webhook_secret", &"<redacted>")
            .field(
                "provider_api_key",
                &self.provider_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("provider_base_url", &self.provider_base_url.as_str())
            .field("signature_tolerance_secs", &self.signature_tolerance_secs)
            .field("free_tier", &self.free_tier)
            .field(
                "resend_api_key",
                &self.resend_api_key.as_ref().map(|_| "<redacted>"),
            )
            .field("notify_from", &self.notify_from)
            .field("bind_all", &self.bind_all)
            .field("bind_addr", &self.bind_addr)
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================
