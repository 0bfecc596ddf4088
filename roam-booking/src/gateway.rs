use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;
use tracing::info;
use uuid::Uuid;
use roam_core::{AuthorizationRequest, AuthorizationStatus, PaymentAuthorization, PaymentError, PaymentGateway};
use roam_shared::Masked;

/// How the sandbox answers the next authorization requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SandboxBehavior {
    Approve,
    Decline,
    Unavailable,
    /// Sleep before approving; used to exercise timeouts.
    Stall(Duration),
}

#[derive(Default)]
struct Ledger {
    authorizations: HashMap<String, PaymentAuthorization>,
    by_idempotency_key: HashMap<String, String>,
    created: usize,
}

/// In-process stand-in for the payment provider. Honours idempotency keys
/// the way a real provider does: a repeated key returns the original
/// authorization instead of creating a new one.
pub struct SandboxPaymentGateway {
    ledger: Mutex<Ledger>,
    behavior: Mutex<SandboxBehavior>,
}

impl SandboxPaymentGateway {
    pub fn new() -> Self {
        Self {
            ledger: Mutex::new(Ledger::default()),
            behavior: Mutex::new(SandboxBehavior::Approve),
        }
    }

    pub fn set_behavior(&self, behavior: SandboxBehavior) {
        *self.behavior.lock().unwrap_or_else(|e| e.into_inner()) = behavior;
    }

    /// Number of distinct authorizations ever created.
    pub fn authorizations_created(&self) -> usize {
        self.ledger.lock().unwrap_or_else(|e| e.into_inner()).created
    }

    /// Mark an authorization as paid, as the client-side checkout would.
    pub fn complete(&self, authorization_id: &str) -> Result<PaymentAuthorization, PaymentError> {
        let mut ledger = self.ledger.lock().unwrap_or_else(|e| e.into_inner());
        let auth = ledger
            .authorizations
            .get_mut(authorization_id)
            .ok_or_else(|| PaymentError::NotFound(authorization_id.to_string()))?;
        auth.status = AuthorizationStatus::Succeeded;
        Ok(auth.clone())
    }

    fn behavior(&self) -> SandboxBehavior {
        *self.behavior.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for SandboxPaymentGateway {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PaymentGateway for SandboxPaymentGateway {
    async fn authorize(
        &self,
        request: &AuthorizationRequest,
    ) -> Result<PaymentAuthorization, PaymentError> {
        match self.behavior() {
            SandboxBehavior::Approve => {}
            SandboxBehavior::Decline => {
                return Err(PaymentError::Declined("card_declined".to_string()));
            }
            SandboxBehavior::Unavailable => {
                return Err(PaymentError::Unavailable("sandbox offline".to_string()));
            }
            SandboxBehavior::Stall(delay) => tokio::time::sleep(delay).await,
        }

        let mut ledger = self.ledger.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(existing) = ledger
            .by_idempotency_key
            .get(&request.idempotency_key)
            .and_then(|id| ledger.authorizations.get(id))
        {
            return Ok(existing.clone());
        }

        let id = format!("sbx_pi_{}", Uuid::new_v4().simple());
        let authorization = PaymentAuthorization {
            id: id.clone(),
            booking_id: request.booking_id,
            amount_cents: request.amount_cents,
            currency: request.currency.clone(),
            status: AuthorizationStatus::RequiresPaymentMethod,
            client_secret: Masked::new(format!("{}_secret_{}", id, Uuid::new_v4().simple())),
            created_at: Utc::now(),
        };

        ledger.by_idempotency_key.insert(request.idempotency_key.clone(), id.clone());
        ledger.authorizations.insert(id.clone(), authorization.clone());
        ledger.created += 1;
        info!("Sandbox authorization {} created for booking {}", id, request.booking_id);
        Ok(authorization)
    }

    async fn retrieve(&self, authorization_id: &str) -> Result<PaymentAuthorization, PaymentError> {
        if self.behavior() == SandboxBehavior::Unavailable {
            return Err(PaymentError::Unavailable("sandbox offline".to_string()));
        }
        let ledger = self.ledger.lock().unwrap_or_else(|e| e.into_inner());
        ledger
            .authorizations
            .get(authorization_id)
            .cloned()
            .ok_or_else(|| PaymentError::NotFound(authorization_id.to_string()))
    }

    async fn cancel(&self, authorization_id: &str) -> Result<(), PaymentError> {
        let mut ledger = self.ledger.lock().unwrap_or_else(|e| e.into_inner());
        let auth = ledger
            .authorizations
            .get_mut(authorization_id)
            .ok_or_else(|| PaymentError::NotFound(authorization_id.to_string()))?;
        if auth.status != AuthorizationStatus::Succeeded {
            auth.status = AuthorizationStatus::Canceled;
        }
        Ok(())
    }
}
