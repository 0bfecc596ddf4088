use axum::{
    extract::{Extension, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};

use crate::middleware::{admin_auth_middleware, AdminClaims};
use crate::state::AppState;

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/v1/admin/sweeps", post(trigger_sweep))
        .route_layer(axum::middleware::from_fn_with_state(state, admin_auth_middleware))
}

/// POST /v1/admin/sweeps
/// Wakes the sweep scheduler; the sweep itself runs in the background.
async fn trigger_sweep(
    State(state): State<AppState>,
    Extension(claims): Extension<AdminClaims>,
) -> (StatusCode, Json<Value>) {
    tracing::info!("Sweep requested by {}", claims.sub);
    state.sweeps.request();
    (StatusCode::ACCEPTED, Json(json!({ "status": "scheduled" })))
}
