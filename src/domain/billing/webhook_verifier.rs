//! Webhook signature verification.
//!
//! The gateway signs `"{timestamp}.{raw body}"` with HMAC-SHA256 using the
//! shared webhook secret and sends `t=<unix>,v1=<hex>` in the signature
//! header. The timestamp bounds replay.

use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use super::webhook_errors::WebhookError;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying the webhook signature.
pub const SIGNATURE_HEADER: &str = "x-gateway-signature";

/// Parsed components from the signature header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignatureHeader {
    /// Unix timestamp when the signature was generated.
    pub timestamp: i64,
    /// v1 signature (HMAC-SHA256).
    pub v1_signature: Vec<u8>,
}

impl SignatureHeader {
    /// Parses a signature header string.
    ///
    /// Format: `t=<timestamp>,v1=<signature>`. Unknown keys are ignored.
    pub fn parse(header: &str) -> Result<Self, WebhookError> {
        let mut timestamp: Option<i64> = None;
        let mut v1_signature: Option<Vec<u8>> = None;

        for part in header.split(',') {
            let (key, value) = part
                .trim()
                .split_once('=')
                .ok_or_else(|| WebhookError::ParseError("invalid header format".to_string()))?;

            match key {
                "t" => {
                    timestamp = Some(value.parse().map_err(|_| {
                        WebhookError::ParseError("invalid timestamp".to_string())
                    })?);
                }
                "v1" => {
                    v1_signature = Some(hex::decode(value).map_err(|e| {
                        WebhookError::ParseError(format!("invalid v1 signature hex: {}", e))
                    })?);
                }
                _ => {}
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| WebhookError::ParseError("missing timestamp".to_string()))?;
        let v1_signature = v1_signature
            .ok_or_else(|| WebhookError::ParseError("missing v1 signature".to_string()))?;

        Ok(SignatureHeader {
            timestamp,
            v1_signature,
        })
    }
}

/// Verifier for gateway webhook signatures.
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: SecretString,
    max_event_age_secs: i64,
    max_clock_skew_secs: i64,
}

impl WebhookVerifier {
    pub fn new(secret: SecretString, max_event_age_secs: u64, max_clock_skew_secs: u64) -> Self {
        Self {
            secret,
            max_event_age_secs: i64::try_from(max_event_age_secs).unwrap_or(i64::MAX),
            max_clock_skew_secs: i64::try_from(max_clock_skew_secs).unwrap_or(i64::MAX),
        }
    }

    /// Verifies the signature of `payload` against the current clock.
    ///
    /// A missing or malformed header counts as an invalid signature so
    /// unauthenticated callers always see 401.
    pub fn verify(&self, payload: &[u8], header: Option<&str>) -> Result<(), WebhookError> {
        self.verify_at(payload, header, chrono::Utc::now().timestamp())
    }

    pub(crate) fn verify_at(
        &self,
        payload: &[u8],
        header: Option<&str>,
        now: i64,
    ) -> Result<(), WebhookError> {
        let header = header.ok_or(WebhookError::InvalidSignature)?;
        let header = SignatureHeader::parse(header).map_err(|e| {
            tracing::warn!(error = %e, "Malformed webhook signature header");
            WebhookError::InvalidSignature
        })?;

        self.validate_timestamp(header.timestamp, now)?;

        let expected = self.compute_signature(header.timestamp, payload)?;
        if !constant_time_compare(&expected, &header.v1_signature) {
            return Err(WebhookError::InvalidSignature);
        }
        Ok(())
    }

    fn validate_timestamp(&self, timestamp: i64, now: i64) -> Result<(), WebhookError> {
        let age = now.checked_sub(timestamp).ok_or_else(|| {
            tracing::warn!(
                event_timestamp = timestamp,
                current_time = now,
                "Webhook signature timestamp is not representable"
            );
            WebhookError::TimestampOutOfRange
        })?;

        if age > self.max_event_age_secs {
            tracing::warn!(
                event_timestamp = timestamp,
                age_secs = age,
                "Webhook signature too old - possible replay"
            );
            return Err(WebhookError::TimestampOutOfRange);
        }

        if age < -self.max_clock_skew_secs {
            tracing::warn!(
                event_timestamp = timestamp,
                current_time = now,
                "Webhook signature from the future"
            );
            return Err(WebhookError::InvalidTimestamp);
        }

        Ok(())
    }

    fn compute_signature(&self, timestamp: i64, payload: &[u8]) -> Result<Vec<u8>, WebhookError> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose_secret().as_bytes())
            .map_err(|_| WebhookError::InvalidSignature)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload);
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

fn constant_time_compare(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

/// Builds a valid signature header for `payload`. Used by tests and by
/// local tooling that replays captured webhooks.
pub fn sign_payload(secret: &str, timestamp: i64, payload: &[u8]) -> String {
    let mut mac = match HmacSha256::new_from_slice(secret.as_bytes()) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}
