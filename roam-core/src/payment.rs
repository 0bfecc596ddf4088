use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, Utc};
use roam_shared::Masked;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationStatus {
    RequiresPaymentMethod,
    Succeeded,
    Canceled,
}

/// Charge authorization request. `booking_id` travels as correlation
/// metadata and comes back on every provider event.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub booking_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub idempotency_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentAuthorization {
    pub id: String, // Provider's ID (e.g., pi_123)
    pub booking_id: Uuid,
    pub amount_cents: i64,
    pub currency: String,
    pub status: AuthorizationStatus,
    pub client_secret: Masked<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PaymentError {
    #[error("Payment declined: {0}")]
    Declined(String),
    #[error("Payment gateway unavailable: {0}")]
    Unavailable(String),
    #[error("Authorization not found: {0}")]
    NotFound(String),
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Create an authorization with the provider. Repeating a request with
    /// the same idempotency key returns the original authorization.
    async fn authorize(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<PaymentAuthorization, PaymentError>;

    /// Retrieve authorization state
    async fn retrieve(&self, authorization_id: &str) -> Result<PaymentAuthorization, PaymentError>;

    /// Release an authorization that will never be captured
    async fn cancel(&self, authorization_id: &str) -> Result<(), PaymentError>;
}
