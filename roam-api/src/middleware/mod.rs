pub mod auth;
pub mod rate_limit;

pub use auth::{admin_auth_middleware, renter_auth_middleware, AdminClaims, RenterClaims};
pub use rate_limit::rate_limit_middleware;
