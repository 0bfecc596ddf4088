use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;
use roam_core::Clock;
use roam_shared::Masked;

type HmacSha256 = Hmac<Sha256>;

/// Header carrying `t=<unix seconds>,v1=<hex hmac>`.
pub const SIGNATURE_HEADER: &str = "roam-signature";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WebhookError {
    #[error("Missing signature header")]
    MissingSignature,
    #[error("Malformed signature header")]
    MalformedSignature,
    #[error("Signature does not match payload")]
    SignatureMismatch,
    #[error("Signature timestamp outside tolerance")]
    StaleTimestamp,
    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

/// Event categories the reconciliation side understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEventKind {
    AuthorizationSucceeded,
    AuthorizationFailed,
    AuthorizationCanceled,
    Other(String),
}

impl PaymentEventKind {
    fn from_type(event_type: &str) -> Self {
        match event_type {
            "payment_intent.succeeded" | "payment_intent.amount_capturable_updated" => {
                PaymentEventKind::AuthorizationSucceeded
            }
            "payment_intent.payment_failed" => PaymentEventKind::AuthorizationFailed,
            "payment_intent.canceled" => PaymentEventKind::AuthorizationCanceled,
            other => PaymentEventKind::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    id: String,
    #[serde(rename = "type")]
    event_type: String,
    data: EnvelopeData,
}

#[derive(Debug, Deserialize)]
struct EnvelopeData {
    object: EventObject,
}

#[derive(Debug, Deserialize)]
struct EventObject {
    id: String,
    status: String,
    #[serde(default)]
    amount: Option<i64>,
    #[serde(default)]
    metadata: EventMetadata,
}

#[derive(Debug, Default, Deserialize)]
struct EventMetadata {
    #[serde(default)]
    booking_id: Option<String>,
}

/// A payment event whose signature has been checked. Only
/// [`SignatureVerifier::verify`] can construct one.
#[derive(Debug, Clone)]
pub struct VerifiedPaymentEvent {
    event_id: String,
    kind: PaymentEventKind,
    authorization_id: String,
    booking_id: Option<Uuid>,
    amount_cents: Option<i64>,
}

impl VerifiedPaymentEvent {
    pub fn event_id(&self) -> &str {
        &self.event_id
    }

    pub fn kind(&self) -> &PaymentEventKind {
        &self.kind
    }

    pub fn authorization_id(&self) -> &str {
        &self.authorization_id
    }

    /// `None` when the metadata lacks a parseable booking id.
    pub fn booking_id(&self) -> Option<Uuid> {
        self.booking_id
    }

    pub fn amount_cents(&self) -> Option<i64> {
        self.amount_cents
    }
}

pub struct SignatureVerifier {
    secret: Masked<String>,
    tolerance: Duration,
    clock: Arc<dyn Clock>,
}

impl SignatureVerifier {
    pub fn new(secret: Masked<String>, tolerance: Duration, clock: Arc<dyn Clock>) -> Self {
        Self { secret, tolerance, clock }
    }

    /// Check the `Roam-Signature` header against the raw body, then parse the
    /// body into a typed event.
    pub fn verify(&self, header: Option<&str>, body: &[u8]) -> Result<VerifiedPaymentEvent, WebhookError> {
        let header = header.ok_or(WebhookError::MissingSignature)?;

        // 1. Parse t=...,v1=...[,v1=...]
        let mut timestamp: Option<i64> = None;
        let mut signatures: Vec<Vec<u8>> = Vec::new();
        for part in header.split(',') {
            let (key, value) = part
                .trim()
                .split_once('=')
                .ok_or(WebhookError::MalformedSignature)?;
            match key {
                "t" => {
                    timestamp = Some(value.parse().map_err(|_| WebhookError::MalformedSignature)?);
                }
                "v1" => {
                    signatures.push(hex::decode(value).map_err(|_| WebhookError::MalformedSignature)?);
                }
                // Unknown schemes are skipped.
                _ => {}
            }
        }
        let timestamp = timestamp.ok_or(WebhookError::MalformedSignature)?;
        if signatures.is_empty() {
            return Err(WebhookError::MalformedSignature);
        }

        // 2. Replay window
        let age = (self.clock.now().timestamp() - timestamp).unsigned_abs();
        if age > self.tolerance.as_secs() {
            warn!("Webhook signature timestamp {} is {}s away from now", timestamp, age);
            return Err(WebhookError::StaleTimestamp);
        }

        // 3. Constant-time comparison against every v1 value
        let matched = signatures.iter().any(|candidate| {
            self.mac_for(timestamp, body)
                .map(|mac| mac.verify_slice(candidate).is_ok())
                .unwrap_or(false)
        });
        if !matched {
            return Err(WebhookError::SignatureMismatch);
        }

        // 4. Strict envelope
        let envelope: Envelope =
            serde_json::from_slice(body).map_err(|e| WebhookError::MalformedPayload(e.to_string()))?;

        let kind = PaymentEventKind::from_type(&envelope.event_type);
        if kind == PaymentEventKind::AuthorizationSucceeded
            && !matches!(envelope.data.object.status.as_str(), "succeeded" | "requires_capture")
        {
            return Err(WebhookError::MalformedPayload(format!(
                "{} event carries authorization status {:?}",
                envelope.event_type, envelope.data.object.status
            )));
        }

        let booking_id = match envelope.data.object.metadata.booking_id.as_deref() {
            Some(raw) => match Uuid::parse_str(raw) {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!("Payment event {} carries unparseable booking_id {:?}", envelope.id, raw);
                    None
                }
            },
            None => None,
        };

        debug!("Verified payment event {} ({})", envelope.id, envelope.event_type);
        Ok(VerifiedPaymentEvent {
            kind,
            event_id: envelope.id,
            authorization_id: envelope.data.object.id,
            booking_id,
            amount_cents: envelope.data.object.amount,
        })
    }

    /// Header value for `body` signed at `timestamp`. Used by the sandbox
    /// and tests to produce deliveries.
    pub fn sign(&self, timestamp: i64, body: &[u8]) -> String {
        let signature = self
            .mac_for(timestamp, body)
            .map(|mac| hex::encode(mac.finalize().into_bytes()))
            .unwrap_or_default();
        format!("t={},v1={}", timestamp, signature)
    }

    fn mac_for(&self, timestamp: i64, body: &[u8]) -> Option<HmacSha256> {
        let mut mac = HmacSha256::new_from_slice(self.secret.expose().as_bytes()).ok()?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        Some(mac)
    }
}
