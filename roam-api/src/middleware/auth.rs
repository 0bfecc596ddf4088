use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::AppError;
use crate::state::AppState;

// ============================================================================
// JWT Claims
// ============================================================================

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RenterClaims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct AdminClaims {
    pub sub: String,
    pub role: String,
    pub exp: usize,
}

pub const RENTER_ROLE: &str = "RENTER";

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
}

fn decode_claims<T: DeserializeOwned>(state: &AppState, token: &str) -> Result<T, AppError> {
    decode::<T>(
        token,
        &DecodingKey::from_secret(state.auth.secret.expose().as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| {
        tracing::debug!("Rejected bearer token: {}", e);
        AppError::Unauthenticated("Invalid or expired token".to_string())
    })
}

/// Renter id from a valid bearer token, if any. Never rejects.
pub fn renter_id_from_headers(state: &AppState, headers: &HeaderMap) -> Option<String> {
    let token = bearer_token(headers)?;
    decode_claims::<RenterClaims>(state, token)
        .ok()
        .filter(|c| c.role == RENTER_ROLE)
        .map(|c| c.sub)
}

// ============================================================================
// Renter Authentication Middleware
// ============================================================================

pub async fn renter_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    // 1. Extract token from Authorization header
    let token = bearer_token(req.headers())
        .ok_or_else(|| AppError::Unauthenticated("Missing bearer token".to_string()))?;

    // 2. Decode and validate JWT
    let claims = decode_claims::<RenterClaims>(&state, token)?;

    // 3. Check role
    if claims.role != RENTER_ROLE {
        return Err(AppError::Forbidden("Renter role required".to_string()));
    }

    // 4. Inject claims into request extensions
    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}

// ============================================================================
// Admin Authentication Middleware
// ============================================================================

pub async fn admin_auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let token = bearer_token(req.headers())
        .ok_or_else(|| AppError::Unauthenticated("Missing bearer token".to_string()))?;

    let claims = decode_claims::<AdminClaims>(&state, token)?;

    if claims.role != "ADMIN" && claims.role != "SUPER_ADMIN" {
        return Err(AppError::Forbidden("Admin role required".to_string()));
    }

    req.extensions_mut().insert(claims);

    Ok(next.run(req).await)
}
