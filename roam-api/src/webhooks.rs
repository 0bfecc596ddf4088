use axum::{
    body::Bytes,
    extract::State,
    http::{HeaderMap, StatusCode},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use roam_booking::{ReconcileOutcome, SIGNATURE_HEADER};

use crate::error::AppError;
use crate::state::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/webhooks/payments", post(handle_payment_webhook))
}

fn outcome_label(outcome: &ReconcileOutcome) -> &'static str {
    match outcome {
        ReconcileOutcome::Confirmed(_) => "confirmed",
        ReconcileOutcome::Declined(_) => "declined",
        ReconcileOutcome::NotFound => "not_found",
        ReconcileOutcome::AlreadyTerminal(_) => "already_terminal",
        ReconcileOutcome::Mismatch => "mismatch",
        ReconcileOutcome::Unroutable => "unroutable",
        ReconcileOutcome::Ignored => "ignored",
    }
}

/// POST /v1/webhooks/payments
/// Signed payment provider callbacks. The raw body is needed for the signature.
async fn handle_payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<(StatusCode, Json<Value>), AppError> {
    // 1. Verify before trusting anything in the payload
    let signature = headers.get(SIGNATURE_HEADER).and_then(|h| h.to_str().ok());
    let event = state.verifier.verify(signature, &body).map_err(|e| {
        tracing::warn!("Rejected payment webhook: {}", e);
        AppError::Validation(e.to_string())
    })?;

    tracing::info!(
        "Received payment event {} for authorization {}",
        event.event_id(),
        event.authorization_id()
    );

    // 2. Reconcile; store failures become 503 so the provider redelivers
    let outcome = state.reconciliation.handle(&event).await?;

    Ok((
        StatusCode::OK,
        Json(json!({
            "received": true,
            "outcome": outcome_label(&outcome),
        })),
    ))
}
