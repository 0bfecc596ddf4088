use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use uuid::Uuid;
use roam_core::{BookingStore, Clock, StoreError};
use roam_shared::{Booking, BookingStatus};

use crate::store_call;
use crate::webhook::{PaymentEventKind, VerifiedPaymentEvent};

#[derive(Debug, Clone, PartialEq)]
pub enum ReconcileOutcome {
    Confirmed(Booking),
    Declined(Booking),
    /// No booking with that id. Acknowledged; a retry would not help.
    NotFound,
    /// The booking had already left `pending`; nothing changed.
    AlreadyTerminal(BookingStatus),
    /// The event does not describe this booking's authorization.
    Mismatch,
    /// Handled event type without a usable booking id.
    Unroutable,
    /// Event type we do not act on.
    Ignored,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReconcileError {
    #[error("Booking store error: {0}")]
    Store(#[from] StoreError),
}

/// Applies verified payment events to bookings with conditional transitions,
/// so duplicate or reordered deliveries are harmless.
pub struct ReconciliationHandler {
    bookings: Arc<dyn BookingStore>,
    clock: Arc<dyn Clock>,
    store_timeout: Duration,
}

impl ReconciliationHandler {
    pub fn new(bookings: Arc<dyn BookingStore>, clock: Arc<dyn Clock>, store_timeout: Duration) -> Self {
        Self { bookings, clock, store_timeout }
    }

    pub async fn handle(&self, event: &VerifiedPaymentEvent) -> Result<ReconcileOutcome, ReconcileError> {
        let target = match event.kind() {
            PaymentEventKind::Other(event_type) => {
                info!("Ignoring payment event {} of type {}", event.event_id(), event_type);
                return Ok(ReconcileOutcome::Ignored);
            }
            _ => event.booking_id(),
        };
        let Some(booking_id) = target else {
            warn!(
                "Payment event {} for authorization {} has no booking_id; acknowledging",
                event.event_id(),
                event.authorization_id()
            );
            return Ok(ReconcileOutcome::Unroutable);
        };

        match event.kind() {
            PaymentEventKind::AuthorizationSucceeded => {
                self.on_payment_confirmed(booking_id, event.authorization_id(), event.amount_cents())
                    .await
            }
            PaymentEventKind::AuthorizationFailed | PaymentEventKind::AuthorizationCanceled => {
                self.on_payment_failed(booking_id, event.authorization_id()).await
            }
            PaymentEventKind::Other(_) => Ok(ReconcileOutcome::Ignored),
        }
    }

    pub async fn on_payment_confirmed(
        &self,
        booking_id: Uuid,
        authorization_id: &str,
        amount_cents: Option<i64>,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let Some(booking) = self.load(booking_id).await? else {
            warn!("Payment confirmed for unknown booking {}", booking_id);
            return Ok(ReconcileOutcome::NotFound);
        };

        if booking.status != BookingStatus::Pending {
            if matches!(booking.status, BookingStatus::Cancelled | BookingStatus::Declined) {
                error!(
                    "Authorization {} succeeded for {} booking {}; refund required",
                    authorization_id, booking.status, booking_id
                );
            }
            return Ok(ReconcileOutcome::AlreadyTerminal(booking.status));
        }

        if !Self::matches(&booking, authorization_id, amount_cents) {
            return Ok(ReconcileOutcome::Mismatch);
        }

        self.apply(booking_id, BookingStatus::Confirmed).await
    }

    pub async fn on_payment_failed(
        &self,
        booking_id: Uuid,
        authorization_id: &str,
    ) -> Result<ReconcileOutcome, ReconcileError> {
        let Some(booking) = self.load(booking_id).await? else {
            warn!("Payment failure for unknown booking {}", booking_id);
            return Ok(ReconcileOutcome::NotFound);
        };

        if booking.status != BookingStatus::Pending {
            return Ok(ReconcileOutcome::AlreadyTerminal(booking.status));
        }
        if !Self::matches(&booking, authorization_id, None) {
            return Ok(ReconcileOutcome::Mismatch);
        }

        self.apply(booking_id, BookingStatus::Declined).await
    }

    fn matches(booking: &Booking, authorization_id: &str, amount_cents: Option<i64>) -> bool {
        if let Some(recorded) = booking.payment_authorization_id.as_deref() {
            if recorded != authorization_id {
                error!(
                    "Booking {} is linked to authorization {}, event is for {}",
                    booking.id, recorded, authorization_id
                );
                return false;
            }
        }
        if let Some(amount) = amount_cents {
            if amount != booking.total_cents {
                error!(
                    "Booking {} total is {} but authorization {} is for {}",
                    booking.id, booking.total_cents, authorization_id, amount
                );
                return false;
            }
        }
        true
    }

    async fn apply(&self, booking_id: Uuid, to: BookingStatus) -> Result<ReconcileOutcome, ReconcileError> {
        let updated = store_call(
            self.store_timeout,
            self.bookings.transition(booking_id, BookingStatus::Pending, to, self.clock.now()),
        )
        .await?;

        match updated {
            Some(booking) => {
                info!("Booking {} is now {}", booking.id, booking.status);
                Ok(match to {
                    BookingStatus::Confirmed => ReconcileOutcome::Confirmed(booking),
                    _ => ReconcileOutcome::Declined(booking),
                })
            }
            None => {
                // Lost the race: another delivery or the reaper moved it first.
                let current = self.load(booking_id).await?;
                Ok(match current {
                    Some(b) => ReconcileOutcome::AlreadyTerminal(b.status),
                    None => ReconcileOutcome::NotFound,
                })
            }
        }
    }

    async fn load(&self, booking_id: Uuid) -> Result<Option<Booking>, ReconcileError> {
        Ok(store_call(self.store_timeout, self.bookings.get(booking_id)).await?)
    }
}
