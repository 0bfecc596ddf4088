pub mod pricing;
pub mod conflict;
pub mod gateway;
pub mod orchestrator;
pub mod webhook;
pub mod reconciliation;
pub mod rate_limit;
pub mod reaper;

#[cfg(test)]
mod test_support;

pub use conflict::{ConflictCheckError, ConflictDetector};
pub use gateway::{SandboxBehavior, SandboxPaymentGateway};
pub use orchestrator::{
    OrchestratorSettings, Reservation, ReservationError, ReservationOrchestrator, ReservationRequest,
};
pub use pricing::PriceQuote;
pub use rate_limit::{RateDecision, RateLimiter};
pub use reaper::{ReaperError, StaleReservationReaper};
pub use reconciliation::{ReconcileError, ReconcileOutcome, ReconciliationHandler};
pub use webhook::{PaymentEventKind, SIGNATURE_HEADER, SignatureVerifier, VerifiedPaymentEvent, WebhookError};

use roam_core::{PaymentError, StoreError};
use std::future::Future;
use std::time::Duration;

/// Run a store call under a deadline; an elapsed deadline becomes `StoreError::Timeout`.
pub(crate) async fn store_call<T, F>(limit: Duration, fut: F) -> Result<T, StoreError>
where
    F: Future<Output = Result<T, StoreError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .unwrap_or(Err(StoreError::Timeout))
}

/// Run a gateway call under a deadline. A timeout is a failure, never an
/// assumed success.
pub(crate) async fn gateway_call<T, F>(limit: Duration, fut: F) -> Result<T, PaymentError>
where
    F: Future<Output = Result<T, PaymentError>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .unwrap_or_else(|_| Err(PaymentError::Unavailable("gateway call timed out".to_string())))
}
