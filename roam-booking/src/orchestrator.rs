use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;
use roam_core::{
    validate_idempotency_key, validate_renter_id, AuthorizationRequest, BookingStore, Clock,
    CoreError, PaymentAuthorization, PaymentError, PaymentGateway, StoreError, VehicleCatalog,
};
use roam_shared::{Booking, BookingStatus, DateRange, Masked, NewBooking};

use crate::conflict::{ConflictCheckError, ConflictDetector};
use crate::pricing::PriceQuote;
use crate::{gateway_call, store_call};

#[derive(Debug, Clone)]
pub struct ReservationRequest {
    pub vehicle_id: Uuid,
    /// Identity supplied by the auth layer; not re-verified here.
    pub renter_id: String,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub idempotency_key: String,
}

#[derive(Debug, Clone)]
pub struct Reservation {
    pub booking: Booking,
    pub payment_client_secret: Masked<String>,
    /// True when this result was replayed from an earlier request with the same key.
    pub replayed: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReservationError {
    #[error("Authentication required")]
    Unauthenticated,
    #[error("Invalid date range: {0}")]
    InvalidDateRange(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Vehicle not found: {0}")]
    VehicleNotFound(Uuid),
    #[error("Vehicle is already booked for these dates")]
    Conflict,
    #[error("Payment authorization failed: {0}")]
    PaymentAuthorizationFailed(String),
    #[error("Upstream unavailable: {0}")]
    UpstreamUnavailable(String),
}

impl From<CoreError> for ReservationError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::IdentityError(_) => ReservationError::Unauthenticated,
            CoreError::ValidationError(msg) => ReservationError::Validation(msg),
        }
    }
}

fn unavailable(err: StoreError) -> ReservationError {
    ReservationError::UpstreamUnavailable(err.to_string())
}

#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub service_fee_cents: i64,
    pub max_rental_days: i64,
    pub store_timeout: Duration,
    pub authorization_timeout: Duration,
}

/// Reserve-then-pay: conflict check, pending booking, payment authorization,
/// with rollback when the authorization cannot be obtained.
pub struct ReservationOrchestrator {
    bookings: Arc<dyn BookingStore>,
    vehicles: Arc<dyn VehicleCatalog>,
    gateway: Arc<dyn PaymentGateway>,
    detector: Arc<ConflictDetector>,
    clock: Arc<dyn Clock>,
    settings: OrchestratorSettings,
}

impl ReservationOrchestrator {
    pub fn new(
        bookings: Arc<dyn BookingStore>,
        vehicles: Arc<dyn VehicleCatalog>,
        gateway: Arc<dyn PaymentGateway>,
        detector: Arc<ConflictDetector>,
        clock: Arc<dyn Clock>,
        settings: OrchestratorSettings,
    ) -> Self {
        Self { bookings, vehicles, gateway, detector, clock, settings }
    }

    pub async fn create_reservation(
        &self,
        request: ReservationRequest,
    ) -> Result<Reservation, ReservationError> {
        validate_renter_id(&request.renter_id)?;
        validate_idempotency_key(&request.idempotency_key)?;
        let range = self.validate_range(&request)?;

        // 1. Replay an earlier attempt with the same key
        let existing = store_call(
            self.settings.store_timeout,
            self.bookings.find_by_idempotency_key(&request.renter_id, &request.idempotency_key),
        )
        .await
        .map_err(unavailable)?;
        if let Some(booking) = existing {
            return self.replay(booking, &request, &range).await;
        }

        // 2. Price from the current listing
        let vehicle = store_call(self.settings.store_timeout, self.vehicles.get_vehicle(request.vehicle_id))
            .await
            .map_err(unavailable)?
            .filter(|v| v.active)
            .ok_or(ReservationError::VehicleNotFound(request.vehicle_id))?;

        let quote = PriceQuote::compute(&vehicle, &range, self.settings.service_fee_cents)
            .ok_or_else(|| ReservationError::Validation("rental total is out of range".to_string()))?;

        // 3. Conflict check, failing closed
        match self.detector.has_conflict(vehicle.id, &range).await {
            Ok(false) => {}
            // The blocking booking may be our own twin request's.
            Ok(true) => return self.replay_concurrent(&request, &range, ReservationError::Conflict).await,
            Err(ConflictCheckError::Indeterminate(e)) => return Err(unavailable(e)),
        }

        // 4. Pending booking; the store re-checks overlap atomically
        let new_booking = NewBooking {
            id: Uuid::new_v4(),
            vehicle_id: vehicle.id,
            vehicle: vehicle.snapshot(),
            renter_id: request.renter_id.clone(),
            range,
            total_cents: quote.total_cents,
            idempotency_key: request.idempotency_key.clone(),
            created_at: self.clock.now(),
        };
        let booking = match store_call(self.settings.store_timeout, self.bookings.insert_pending(new_booking)).await {
            Ok(booking) => booking,
            Err(StoreError::Overlap) => {
                return self.replay_concurrent(&request, &range, ReservationError::Conflict).await;
            }
            Err(StoreError::DuplicateIdempotencyKey) => {
                // A concurrent request with the same key won the insert.
                let vanished = ReservationError::UpstreamUnavailable("idempotent booking vanished".to_string());
                return self.replay_concurrent(&request, &range, vanished).await;
            }
            Err(e) => return Err(unavailable(e)),
        };

        info!(
            "Booking {} pending for vehicle {} ({}..{}), total {} {}",
            booking.id, booking.vehicle_id, booking.start_date, booking.end_date, quote.total_cents, quote.currency
        );

        // 5. Authorization, with rollback on any failure
        let authorization = match self.authorize(&booking).await {
            Ok(auth) => auth,
            Err(e) => {
                self.roll_back(&booking, &e).await;
                return Err(match e {
                    PaymentError::Declined(reason) => ReservationError::PaymentAuthorizationFailed(reason),
                    other => ReservationError::UpstreamUnavailable(other.to_string()),
                });
            }
        };

        let booking = self.record_authorization(booking, &authorization).await?;

        Ok(Reservation {
            booking,
            payment_client_secret: authorization.client_secret,
            replayed: false,
        })
    }

    fn validate_range(&self, request: &ReservationRequest) -> Result<DateRange, ReservationError> {
        let range = DateRange::from_instants(request.start, request.end)
            .map_err(|e| ReservationError::InvalidDateRange(e.to_string()))?;

        let today = self.clock.now().date_naive();
        if range.start < today {
            return Err(ReservationError::InvalidDateRange(format!(
                "start date {} is in the past",
                range.start
            )));
        }
        if range.days() > self.settings.max_rental_days {
            return Err(ReservationError::InvalidDateRange(format!(
                "rentals are limited to {} days",
                self.settings.max_rental_days
            )));
        }
        Ok(range)
    }

    async fn authorize(&self, booking: &Booking) -> Result<PaymentAuthorization, PaymentError> {
        let request = AuthorizationRequest {
            booking_id: booking.id,
            amount_cents: booking.total_cents,
            currency: booking.vehicle.currency.clone(),
            // Derived from the booking so every retry for it maps to one authorization.
            idempotency_key: format!("booking-{}", booking.id),
        };
        gateway_call(self.settings.authorization_timeout, self.gateway.authorize(&request)).await
    }

    /// Store the authorization id on the booking. The booking id already
    /// travels in the authorization metadata, so a failed write here is not
    /// fatal: reconciliation can still find the booking.
    async fn record_authorization(
        &self,
        mut booking: Booking,
        authorization: &PaymentAuthorization,
    ) -> Result<Booking, ReservationError> {
        let now = self.clock.now();
        match store_call(
            self.settings.store_timeout,
            self.bookings.attach_authorization(booking.id, &authorization.id, now),
        )
        .await
        {
            Ok(true) => {
                booking.payment_authorization_id = Some(authorization.id.clone());
                booking.version += 1;
                booking.updated_at = now;
                Ok(booking)
            }
            Ok(false) => {
                // The booking left `pending` (reaped) before we could link it.
                warn!(
                    "Booking {} is no longer pending; releasing authorization {}",
                    booking.id, authorization.id
                );
                self.release_authorization(&authorization.id).await;
                Err(ReservationError::UpstreamUnavailable(
                    "reservation expired before payment was set up".to_string(),
                ))
            }
            Err(e) => {
                warn!(
                    "Could not record authorization {} on booking {}: {}",
                    authorization.id, booking.id, e
                );
                Ok(booking)
            }
        }
    }

    /// Decline a booking whose authorization failed. A same-key retry may
    /// already have linked the authorization and handed it to the client;
    /// such a booking stays `pending`.
    async fn roll_back(&self, booking: &Booking, cause: &PaymentError) {
        let result = store_call(
            self.settings.store_timeout,
            self.bookings.decline_unauthorized(booking.id, self.clock.now()),
        )
        .await;

        match result {
            Ok(Some(_)) => {
                info!("Booking {} declined after authorization failure: {}", booking.id, cause);
                // A call that timed out may still have created the authorization.
                if !matches!(cause, PaymentError::Declined(_)) {
                    self.release_unrecorded_authorization(booking).await;
                }
            }
            Ok(None) => warn!(
                "Booking {} left pending or was linked to an authorization by a retry; not rolling back",
                booking.id
            ),
            Err(e) => error!(
                "Rollback of booking {} failed ({}); the stale reservation sweep will expire it",
                booking.id, e
            ),
        }
    }

    /// Cancel whatever authorization the provider holds under the booking's
    /// derived key, without it ever having been recorded.
    async fn release_unrecorded_authorization(&self, booking: &Booking) {
        match self.authorize(booking).await {
            Ok(authorization) => self.release_authorization(&authorization.id).await,
            Err(e) => warn!(
                "Could not look up authorization for declined booking {}: {}",
                booking.id, e
            ),
        }
    }

    async fn release_authorization(&self, authorization_id: &str) {
        if let Err(e) = gateway_call(self.settings.authorization_timeout, self.gateway.cancel(authorization_id)).await {
            warn!("Failed to cancel authorization {}: {}", authorization_id, e);
        }
    }

    /// Replay the booking a concurrent request with the same key created, or
    /// fail with `otherwise` when there is none.
    async fn replay_concurrent(
        &self,
        request: &ReservationRequest,
        range: &DateRange,
        otherwise: ReservationError,
    ) -> Result<Reservation, ReservationError> {
        let existing = store_call(
            self.settings.store_timeout,
            self.bookings.find_by_idempotency_key(&request.renter_id, &request.idempotency_key),
        )
        .await
        .map_err(unavailable)?;

        match existing {
            Some(booking) => self.replay(booking, request, range).await,
            None => Err(otherwise),
        }
    }

    /// Answer a repeated request from the booking the first one created.
    async fn replay(
        &self,
        booking: Booking,
        request: &ReservationRequest,
        range: &DateRange,
    ) -> Result<Reservation, ReservationError> {
        if booking.vehicle_id != request.vehicle_id || booking.range() != *range {
            return Err(ReservationError::Validation(
                "idempotency_key was already used for a different reservation".to_string(),
            ));
        }

        match booking.status {
            BookingStatus::Declined => {
                return Err(ReservationError::PaymentAuthorizationFailed(
                    "an earlier attempt with this idempotency_key was declined".to_string(),
                ));
            }
            BookingStatus::Cancelled => {
                return Err(ReservationError::Validation(
                    "the reservation for this idempotency_key has expired".to_string(),
                ));
            }
            BookingStatus::Pending | BookingStatus::Confirmed | BookingStatus::Completed => {}
        }

        info!("Replaying reservation {} for idempotency key", booking.id);

        let authorization = match &booking.payment_authorization_id {
            Some(id) => gateway_call(self.settings.authorization_timeout, self.gateway.retrieve(id)).await,
            // First request still in flight, or it could not record the id:
            // the derived gateway key returns the same authorization.
            None => self.authorize(&booking).await,
        }
        .map_err(|e| ReservationError::UpstreamUnavailable(e.to_string()))?;

        let booking = if booking.payment_authorization_id.is_none() && booking.status == BookingStatus::Pending {
            self.record_authorization(booking, &authorization).await?
        } else {
            booking
        };

        Ok(Reservation {
            booking,
            payment_client_secret: authorization.client_secret,
            replayed: true,
        })
    }
}
