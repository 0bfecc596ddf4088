use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::AppError;
use crate::middleware::auth::renter_id_from_headers;
use crate::state::AppState;

/// Rate-limit policy name for a request path, if the path is limited.
fn route_id(path: &str) -> Option<&'static str> {
    if path.starts_with("/v1/reservations") {
        Some("reservations")
    } else if path.starts_with("/v1/vehicles/") && path.ends_with("/availability") {
        Some("availability")
    } else {
        None
    }
}

/// Whole seconds, rounded up, never zero.
pub fn retry_after_secs(retry_after: Duration) -> u64 {
    let secs = retry_after.as_secs() + u64::from(retry_after.subsec_nanos() > 0);
    secs.max(1)
}

pub async fn rate_limit_middleware(
    State(state): State<AppState>,
    req: Request,
    next: Next,
) -> Response {
    let Some(route) = route_id(req.uri().path()) else {
        return next.run(req).await;
    };
    let Some(rule) = state.rate_limits.get(route).copied() else {
        return next.run(req).await;
    };

    // 1. Client key: authenticated renter, else peer address
    let client_key = renter_id_from_headers(&state, req.headers())
        .map(|id| format!("renter:{}", id))
        .or_else(|| {
            req.extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| format!("ip:{}", addr.ip()))
        })
        .unwrap_or_else(|| "ip:unknown".to_string());

    // 2. Sliding-window decision
    let decision = state
        .rate_limiter
        .allow(route, &client_key, rule.max_per_window, rule.window())
        .await;

    if decision.allowed {
        return next.run(req).await;
    }

    tracing::info!("Rate limited {} on {}", client_key, route);
    let retry_after_secs = retry_after_secs(decision.retry_after.unwrap_or(rule.window()));
    AppError::RateLimited { retry_after_secs }.into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_route_ids() {
        assert_eq!(route_id("/v1/reservations"), Some("reservations"));
        assert_eq!(route_id("/v1/reservations/abc"), Some("reservations"));
        assert_eq!(route_id("/v1/vehicles/abc/availability"), Some("availability"));
        assert_eq!(route_id("/v1/webhooks/payments"), None);
        assert_eq!(route_id("/health"), None);
    }

    #[test]
    fn test_retry_after_rounds_up() {
        assert_eq!(retry_after_secs(Duration::from_millis(0)), 1);
        assert_eq!(retry_after_secs(Duration::from_millis(200)), 1);
        assert_eq!(retry_after_secs(Duration::from_secs(40)), 40);
        assert_eq!(retry_after_secs(Duration::from_millis(40_001)), 41);
    }
}
