use axum::{
    extract::{rejection::JsonRejection, Extension, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use roam_booking::ReservationRequest;
use roam_shared::{Booking, BookingStatus, Masked};

use crate::error::AppError;
use crate::middleware::{renter_auth_middleware, RenterClaims};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct CreateReservationRequest {
    pub vehicle_id: Uuid,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub idempotency_key: String,
}

#[derive(Debug, Serialize)]
pub struct CreateReservationResponse {
    pub booking_id: Uuid,
    pub payment_client_secret: Masked<String>,
    pub total_cents: i64,
    pub currency: String,
    pub status: BookingStatus,
}

#[derive(Debug, Serialize)]
pub struct BookingResponse {
    pub booking_id: Uuid,
    pub vehicle_id: Uuid,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_cents: i64,
    pub currency: String,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Booking> for BookingResponse {
    fn from(b: Booking) -> Self {
        Self {
            booking_id: b.id,
            vehicle_id: b.vehicle_id,
            start_date: b.start_date,
            end_date: b.end_date,
            total_cents: b.total_cents,
            currency: b.vehicle.currency,
            status: b.status,
            created_at: b.created_at,
            updated_at: b.updated_at,
        }
    }
}

pub fn routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/v1/reservations", post(create_reservation))
        .route("/v1/reservations/{id}", get(get_reservation))
        .route_layer(axum::middleware::from_fn_with_state(state, renter_auth_middleware))
}

/// POST /v1/reservations
async fn create_reservation(
    State(state): State<AppState>,
    Extension(claims): Extension<RenterClaims>,
    payload: Result<Json<CreateReservationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreateReservationResponse>), AppError> {
    let Json(req) = payload.map_err(|e| AppError::Validation(e.body_text()))?;

    let reservation = state
        .orchestrator
        .create_reservation(ReservationRequest {
            vehicle_id: req.vehicle_id,
            renter_id: claims.sub,
            start: req.start_date,
            end: req.end_date,
            idempotency_key: req.idempotency_key,
        })
        .await?;

    let booking = reservation.booking;
    Ok((
        StatusCode::CREATED,
        Json(CreateReservationResponse {
            booking_id: booking.id,
            payment_client_secret: reservation.payment_client_secret,
            total_cents: booking.total_cents,
            currency: booking.vehicle.currency,
            status: booking.status,
        }),
    ))
}

/// GET /v1/reservations/{id}
async fn get_reservation(
    State(state): State<AppState>,
    Extension(claims): Extension<RenterClaims>,
    Path(id): Path<Uuid>,
) -> Result<Json<BookingResponse>, AppError> {
    let booking = tokio::time::timeout(state.store_timeout, state.bookings.get(id))
        .await
        .map_err(|_| AppError::UpstreamUnavailable("booking lookup timed out".to_string()))??;

    // Other renters' bookings are reported as missing.
    match booking {
        Some(b) if b.renter_id == claims.sub => Ok(Json(b.into())),
        _ => Err(AppError::NotFound(format!("Booking {} not found", id))),
    }
}
