pub mod clock;
pub mod repository;
pub mod payment;

pub use clock::{Clock, ManualClock, SystemClock};
pub use repository::{BookingStore, RateWindowStore, StoreError, VehicleCatalog, WindowSnapshot};
pub use payment::{AuthorizationRequest, AuthorizationStatus, PaymentAuthorization, PaymentError, PaymentGateway};

#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Validation failed: {0}")]
    ValidationError(String),
    #[error("Identity verification failed: {0}")]
    IdentityError(String),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Validate a caller-supplied idempotency key.
pub fn validate_idempotency_key(key: &str) -> CoreResult<()> {
    if key.trim().is_empty() {
        return Err(CoreError::ValidationError("idempotency_key must not be empty".to_string()));
    }
    if key.len() > 255 {
        return Err(CoreError::ValidationError("idempotency_key must be at most 255 bytes".to_string()));
    }
    Ok(())
}

/// Validate the renter identity handed over by the auth layer.
pub fn validate_renter_id(renter_id: &str) -> CoreResult<()> {
    if renter_id.trim().is_empty() {
        return Err(CoreError::IdentityError("missing renter identity".to_string()));
    }
    Ok(())
}
