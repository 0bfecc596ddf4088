use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use roam_booking::{ReconcileError, ReservationError};
use roam_core::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Invalid date range: {0}")]
    InvalidDateRange(String),
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("{0}")]
    VehicleNotFound(String),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Payment authorization failed: {0}")]
    PaymentAuthorizationFailed(String),
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    #[error("Rate limited, retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },
    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation_error",
            AppError::InvalidDateRange(_) => "invalid_date_range",
            AppError::Unauthenticated(_) => "unauthenticated",
            AppError::Forbidden(_) => "forbidden",
            AppError::NotFound(_) => "not_found",
            AppError::VehicleNotFound(_) => "vehicle_not_found",
            AppError::Conflict(_) => "conflict",
            AppError::PaymentAuthorizationFailed(_) => "payment_authorization_failed",
            AppError::UpstreamUnavailable(_) => "upstream_unavailable",
            AppError::RateLimited { .. } => "rate_limited",
            AppError::Anyhow(_) => "internal_error",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let code = self.code();
        let mut retry_after = None;

        let (status, message) = match self {
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::InvalidDateRange(msg) => (StatusCode::BAD_REQUEST, msg),
            AppError::Unauthenticated(msg) => (StatusCode::UNAUTHORIZED, msg),
            AppError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::VehicleNotFound(msg) => (StatusCode::NOT_FOUND, msg),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            AppError::PaymentAuthorizationFailed(msg) => (StatusCode::PAYMENT_REQUIRED, msg),
            AppError::UpstreamUnavailable(detail) => {
                tracing::warn!("Upstream unavailable: {}", detail);
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    "A dependency is temporarily unavailable, please retry".to_string(),
                )
            }
            AppError::RateLimited { retry_after_secs } => {
                retry_after = Some(retry_after_secs);
                (StatusCode::TOO_MANY_REQUESTS, "Too many requests".to_string())
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal Server Error".to_string())
            }
        };

        let body = Json(json!({
            "error": {
                "code": code,
                "message": message,
            }
        }));

        let mut response = (status, body).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

impl From<ReservationError> for AppError {
    fn from(err: ReservationError) -> Self {
        match err {
            ReservationError::Unauthenticated => AppError::Unauthenticated("Authentication required".to_string()),
            ReservationError::InvalidDateRange(msg) => AppError::InvalidDateRange(msg),
            ReservationError::Validation(msg) => AppError::Validation(msg),
            ReservationError::VehicleNotFound(id) => AppError::VehicleNotFound(format!("Vehicle {} not found", id)),
            ReservationError::Conflict => {
                AppError::Conflict("Vehicle is already booked for these dates".to_string())
            }
            ReservationError::PaymentAuthorizationFailed(reason) => {
                tracing::info!("Payment authorization failed: {}", reason);
                AppError::PaymentAuthorizationFailed("The payment could not be authorized".to_string())
            }
            ReservationError::UpstreamUnavailable(detail) => AppError::UpstreamUnavailable(detail),
        }
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Unavailable(_) | StoreError::Timeout => AppError::UpstreamUnavailable(err.to_string()),
            other => AppError::Anyhow(anyhow::Error::new(other)),
        }
    }
}

impl From<ReconcileError> for AppError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::Store(e) => AppError::UpstreamUnavailable(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reservation_errors_map_to_codes() {
        let cases = [
            (ReservationError::Conflict, StatusCode::CONFLICT, "conflict"),
            (ReservationError::Unauthenticated, StatusCode::UNAUTHORIZED, "unauthenticated"),
            (
                ReservationError::PaymentAuthorizationFailed("card_declined".into()),
                StatusCode::PAYMENT_REQUIRED,
                "payment_authorization_failed",
            ),
            (
                ReservationError::UpstreamUnavailable("db down".into()),
                StatusCode::SERVICE_UNAVAILABLE,
                "upstream_unavailable",
            ),
            (
                ReservationError::InvalidDateRange("empty".into()),
                StatusCode::BAD_REQUEST,
                "invalid_date_range",
            ),
        ];

        for (err, status, code) in cases {
            let app_err = AppError::from(err);
            assert_eq!(app_err.code(), code);
            assert_eq!(app_err.into_response().status(), status);
        }
    }

    #[test]
    fn test_rate_limited_sets_retry_after() {
        let response = AppError::RateLimited { retry_after_secs: 7 }.into_response();
        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers().get(header::RETRY_AFTER).unwrap(), "7");
    }

    #[test]
    fn test_store_outage_is_retryable() {
        let err = AppError::from(StoreError::Timeout);
        assert_eq!(err.code(), "upstream_unavailable");
        assert_eq!(err.to_string(), "Upstream unavailable: Store call timed out");
    }
}
