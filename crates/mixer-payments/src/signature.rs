//! Stripe Webhook Signature Verification
//!
//! Stripe signs `"{timestamp}.{body}"` with HMAC-SHA256 and sends the result
//! in the `Stripe-Signature` header as `t=<ts>,v1=<hex>`. Several `v1` entries
//! appear while a signing secret is being rolled.

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;

use crate::error::{PaymentError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Default tolerance between the signed timestamp and now, in seconds
pub const DEFAULT_TOLERANCE_SECS: i64 = 300;

/// A verified Stripe event envelope
#[derive(Clone, Debug, Deserialize)]
pub struct StripeEvent {
    pub id: String,
    #[serde(rename = "type")]
    pub event_type: String,
    #[serde(default)]
    pub created: Option<i64>,
    #[serde(default)]
    pub livemode: bool,
    pub data: EventData,
}

#[derive(Clone, Debug, Deserialize)]
pub struct EventData {
    pub object: serde_json::Value,
}

/// Parsed `Stripe-Signature` header
#[derive(Clone, Debug)]
struct SignatureHeader {
    timestamp: i64,
    v1: Vec<Vec<u8>>,
}

impl SignatureHeader {
    fn parse(header: &str) -> Result<Self> {
        let mut timestamp = None;
        let mut v1 = Vec::new();

        for part in header.split(',') {
            let Some((key, value)) = part.trim().split_once('=') else {
                return Err(PaymentError::WebhookSignature("malformed header".into()));
            };

            match key {
                "t" => {
                    timestamp = Some(value.parse::<i64>().map_err(|_| {
                        PaymentError::WebhookSignature("invalid timestamp".into())
                    })?);
                }
                // Undecodable entries can never match, skip them
                "v1" => v1.extend(hex::decode(value).ok()),
                _ => {}
            }
        }

        let timestamp =
            timestamp.ok_or_else(|| PaymentError::WebhookSignature("missing timestamp".into()))?;
        if v1.is_empty() {
            return Err(PaymentError::WebhookSignature("no v1 signature".into()));
        }

        Ok(Self { timestamp, v1 })
    }
}

/// Verifies webhook deliveries against the endpoint's signing secret
#[derive(Clone)]
pub struct WebhookVerifier {
    secret: String,
    tolerance_secs: i64,
}

impl WebhookVerifier {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
            tolerance_secs: DEFAULT_TOLERANCE_SECS,
        }
    }

    #[must_use]
    pub fn with_tolerance(mut self, tolerance_secs: i64) -> Self {
        self.tolerance_secs = tolerance_secs;
        self
    }

    /// Verify webhook signature and parse event
    pub fn construct_event(&self, payload: &str, signature_header: &str) -> Result<StripeEvent> {
        let header = SignatureHeader::parse(signature_header)?;

        // `t` comes straight from the request, so the difference may not fit
        let age = Utc::now()
            .timestamp()
            .checked_sub(header.timestamp)
            .map(i64::unsigned_abs);
        if !age.is_some_and(|age| age <= self.tolerance_secs.unsigned_abs()) {
            return Err(PaymentError::WebhookSignature(
                "timestamp outside tolerance".into(),
            ));
        }

        let matched = header
            .v1
            .iter()
            .any(|candidate| self.mac(header.timestamp, payload).verify_slice(candidate).is_ok());
        if !matched {
            return Err(PaymentError::WebhookSignature(
                "no signature matches the payload".into(),
            ));
        }

        serde_json::from_str(payload).map_err(|e| PaymentError::WebhookParse(e.to_string()))
    }

    /// Build a `Stripe-Signature` header for a payload, as Stripe would
    pub fn sign(&self, timestamp: i64, payload: &str) -> String {
        let signature = hex::encode(self.mac(timestamp, payload).finalize().into_bytes());
        format!("t={timestamp},v1={signature}")
    }

    fn mac(&self, timestamp: i64, payload: &str) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(self.secret.as_bytes()).expect("HMAC accepts any key");
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(payload.as_bytes());
        mac
    }
}
