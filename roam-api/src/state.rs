use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use roam_booking::{
    ConflictDetector, OrchestratorSettings, RateLimiter, ReconciliationHandler, ReservationOrchestrator,
    SignatureVerifier, StaleReservationReaper,
};
use roam_core::{BookingStore, Clock, PaymentGateway, RateWindowStore, VehicleCatalog};
use roam_shared::Masked;
use roam_store::app_config::{Config, RateLimitRule};

use crate::worker::SweepTrigger;

// Upper bound for a rate-window round trip before failing open.
const RATE_LIMIT_TIMEOUT: Duration = Duration::from_millis(250);

#[derive(Clone)]
pub struct AuthConfig {
    pub secret: Masked<String>,
}

/// Storage and provider handles chosen at startup.
#[derive(Clone)]
pub struct Backends {
    pub bookings: Arc<dyn BookingStore>,
    pub vehicles: Arc<dyn VehicleCatalog>,
    pub rate_windows: Arc<dyn RateWindowStore>,
    pub gateway: Arc<dyn PaymentGateway>,
}

#[derive(Clone)]
pub struct AppState {
    pub bookings: Arc<dyn BookingStore>,
    pub vehicles: Arc<dyn VehicleCatalog>,
    pub orchestrator: Arc<ReservationOrchestrator>,
    pub detector: Arc<ConflictDetector>,
    pub reconciliation: Arc<ReconciliationHandler>,
    pub verifier: Arc<SignatureVerifier>,
    pub rate_limiter: Arc<RateLimiter>,
    pub rate_limits: Arc<HashMap<String, RateLimitRule>>,
    pub sweeps: SweepTrigger,
    pub auth: AuthConfig,
    pub service_fee_cents: i64,
    pub store_timeout: Duration,
}

impl AppState {
    pub fn build(config: &Config, backends: &Backends, clock: Arc<dyn Clock>, sweeps: SweepTrigger) -> Self {
        let store_timeout = config.booking.store_timeout();

        let detector = Arc::new(ConflictDetector::new(
            backends.bookings.clone(),
            config.booking.conflict_candidate_limit,
            store_timeout,
        ));

        let orchestrator = Arc::new(ReservationOrchestrator::new(
            backends.bookings.clone(),
            backends.vehicles.clone(),
            backends.gateway.clone(),
            detector.clone(),
            clock.clone(),
            OrchestratorSettings {
                service_fee_cents: config.booking.service_fee_cents,
                max_rental_days: config.booking.max_rental_days,
                store_timeout,
                authorization_timeout: config.payments.authorization_timeout(),
            },
        ));

        let reconciliation = Arc::new(ReconciliationHandler::new(
            backends.bookings.clone(),
            clock.clone(),
            store_timeout,
        ));

        let verifier = Arc::new(SignatureVerifier::new(
            config.payments.webhook_secret.clone(),
            Duration::from_secs(config.payments.signature_tolerance_seconds),
            clock.clone(),
        ));

        let rate_limiter = Arc::new(RateLimiter::new(backends.rate_windows.clone(), clock, RATE_LIMIT_TIMEOUT));

        Self {
            bookings: backends.bookings.clone(),
            vehicles: backends.vehicles.clone(),
            orchestrator,
            detector,
            reconciliation,
            verifier,
            rate_limiter,
            rate_limits: Arc::new(config.rate_limits.clone()),
            sweeps,
            auth: AuthConfig { secret: config.auth.jwt_secret.clone() },
            service_fee_cents: config.booking.service_fee_cents,
            store_timeout,
        }
    }
}

/// The reaper shares the request path's stores and gateway.
pub fn build_reaper(config: &Config, backends: &Backends, clock: Arc<dyn Clock>) -> StaleReservationReaper {
    StaleReservationReaper::new(
        backends.bookings.clone(),
        backends.gateway.clone(),
        clock,
        config.reaper.batch_size,
        config.booking.store_timeout(),
    )
}
