//! Webhook Signature Verification
//!
//! Providers sign each delivery with HMAC-SHA256 over `"{timestamp}.{body}"`
//! and send the result in a header shaped like:
//!
//! ```text
//! t=1709000000,v1=5257a869e7ecebeda32affa62cdca3fa51cad7e77a0e56ff536d0ce8e108d8bd
//! ```
//!
//! A header may carry several `v1` entries (the provider rolls secrets by
//! double-signing during rotation); verification succeeds if any of them
//! matches. Signatures are compared in constant time, and the signed
//! timestamp must fall within a configured tolerance window to limit replay
//! of captured deliveries.

use hmac::{Hmac, Mac};
use sha2::Sha256;
use tracing::debug;

use crate::error::WebhookError;

type HmacSha256 = Hmac<Sha256>;

/// Scheme tag for current-generation signatures.
const SCHEME_V1: &str = "v1";

/// Verifies provider signatures against a shared signing secret.
#[derive(Clone)]
pub struct SignatureVerifier {
    secret: String,
    tolerance_secs: u64,
}

impl SignatureVerifier {
    /// Create a verifier for the given signing secret and replay tolerance.
    pub fn new(secret: impl Into<String>, tolerance_secs: u64) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs,
        }
    }

    /// Verify a signature header against the raw request body.
    ///
    /// # Errors
    ///
    /// - [`WebhookError::SignatureInvalid`] for malformed headers or when no
    ///   `v1` candidate matches
    /// - [`WebhookError::TimestampOutOfTolerance`] when the signed timestamp
    ///   is older (or further in the future) than the tolerance window
    pub fn verify(&self, payload: &[u8], signature_header: &str) -> Result<(), WebhookError> {
        self.verify_at(payload, signature_header, unix_now())
    }

    /// Verify against an explicit clock reading. Split out so tests can pin
    /// the clock instead of racing the tolerance window.
    pub fn verify_at(
        &self,
        payload: &[u8],
        signature_header: &str,
        now_unix: u64,
    ) -> Result<(), WebhookError> {
        let header = SignatureHeader::parse(signature_header)?;

        let skew = if now_unix >= header.timestamp {
            now_unix - header.timestamp
        } else {
            header.timestamp - now_unix
        };
        if skew > self.tolerance_secs {
            debug!(
                timestamp = header.timestamp,
                skew_secs = skew,
                "Signed timestamp outside tolerance"
            );
            return Err(WebhookError::TimestampOutOfTolerance(header.timestamp));
        }

        let expected = self.compute(payload, header.timestamp);
        for candidate in &header.signatures {
            if constant_time_eq(expected.as_bytes(), candidate.as_bytes()) {
                return Ok(());
            }
        }

        debug!(
            candidates = header.signatures.len(),
            "No signature candidate matched"
        );
        Err(WebhookError::SignatureInvalid)
    }

    /// Produce a signature header for a payload, as the provider would.
    ///
    /// Used by tests and benchmarks to construct valid deliveries; also handy
    /// for replaying captured events against a local endpoint.
    pub fn sign(&self, payload: &[u8], timestamp: u64) -> String {
        format!(
            "t={timestamp},{SCHEME_V1}={}",
            self.compute(payload, timestamp)
        )
    }

    /// HMAC-SHA256 over `"{timestamp}.{payload}"`, hex-encoded.
    fn compute(&self, payload: &[u8], timestamp: u64) -> String {
        let mut mac = HmacSha256::new_from_slice(self.secret.as_bytes())
            .expect("HMAC accepts keys of any length");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        hex::encode(mac.finalize().into_bytes())
    }
}

/// Parsed form of the signature header.
struct SignatureHeader {
    timestamp: u64,
    /// All `v1` candidates, in header order
    signatures: Vec<String>,
}

impl SignatureHeader {
    /// Parse `t=<unix>,v1=<hex>[,v1=<hex>...]`.
    ///
    /// Unknown schemes (e.g. `v0=`) are skipped rather than rejected so a
    /// provider can introduce new schemes without breaking old consumers.
    fn parse(header: &str) -> Result<Self, WebhookError> {
        let mut timestamp: Option<u64> = None;
        let mut signatures = Vec::new();

        for element in header.split(',') {
            let mut kv = element.splitn(2, '=');
            let (Some(key), Some(value)) = (kv.next(), kv.next()) else {
                continue;
            };
            match key.trim() {
                "t" => {
                    timestamp = Some(
                        value
                            .trim()
                            .parse::<u64>()
                            .map_err(|_| WebhookError::SignatureInvalid)?,
                    );
                }
                SCHEME_V1 => signatures.push(value.trim().to_string()),
                _ => {}
            }
        }

        let timestamp = timestamp.ok_or(WebhookError::SignatureInvalid)?;
        if signatures.is_empty() {
            return Err(WebhookError::SignatureInvalid);
        }

        Ok(Self {
            timestamp,
            signatures,
        })
    }
}

/// Constant-time equality over hex-encoded signature bytes.
///
/// Length is not secret; `subtle` short-circuits on mismatched lengths.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    subtle::ConstantTimeEq::ct_eq(a, b).into()
}

/// Seconds since the Unix epoch.
fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// ============================================================================
// Tests
// ============================================================================
