use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    routing::get,
    Json, Router,
};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use roam_booking::{ConflictCheckError, PriceQuote};
use roam_shared::DateRange;

use crate::error::AppError;
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

#[derive(Debug, Serialize)]
pub struct AvailabilityResponse {
    pub vehicle_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub available: bool,
    pub quote: PriceQuote,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/v1/vehicles/{id}/availability", get(check_availability))
}

/// GET /v1/vehicles/{id}/availability?start_date=..&end_date=..
async fn check_availability(
    State(state): State<AppState>,
    Path(vehicle_id): Path<Uuid>,
    query: Result<Query<AvailabilityQuery>, QueryRejection>,
) -> Result<Json<AvailabilityResponse>, AppError> {
    let Query(query) = query.map_err(|e| AppError::Validation(e.body_text()))?;
    let range = DateRange::new(query.start_date, query.end_date)
        .map_err(|e| AppError::InvalidDateRange(e.to_string()))?;

    let vehicle = tokio::time::timeout(state.store_timeout, state.vehicles.get_vehicle(vehicle_id))
        .await
        .map_err(|_| AppError::UpstreamUnavailable("vehicle lookup timed out".to_string()))??
        .filter(|v| v.active)
        .ok_or_else(|| AppError::VehicleNotFound(format!("Vehicle {} not found", vehicle_id)))?;

    let quote = PriceQuote::compute(&vehicle, &range, state.service_fee_cents)
        .ok_or_else(|| AppError::Validation("rental total is out of range".to_string()))?;

    let available = match state.detector.has_conflict(vehicle_id, &range).await {
        Ok(conflict) => !conflict,
        Err(ConflictCheckError::Indeterminate(e)) => return Err(e.into()),
    };

    Ok(Json(AvailabilityResponse {
        vehicle_id,
        start_date: range.start,
        end_date: range.end,
        available,
        quote,
    }))
}
