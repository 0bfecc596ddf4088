use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use roam_core::{BookingStore, Clock, PaymentGateway, StoreError};
use roam_shared::BookingStatus;

use crate::{gateway_call, store_call};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReaperError {
    #[error("Booking store error: {0}")]
    Store(#[from] StoreError),
    #[error("Invalid max age: {0:?}")]
    InvalidMaxAge(Duration),
}

/// Expires `pending` bookings whose payment never completed.
pub struct StaleReservationReaper {
    bookings: Arc<dyn BookingStore>,
    gateway: Arc<dyn PaymentGateway>,
    clock: Arc<dyn Clock>,
    batch_size: usize,
    timeout: Duration,
}

impl StaleReservationReaper {
    pub fn new(
        bookings: Arc<dyn BookingStore>,
        gateway: Arc<dyn PaymentGateway>,
        clock: Arc<dyn Clock>,
        batch_size: usize,
        timeout: Duration,
    ) -> Self {
        Self { bookings, gateway, clock, batch_size: batch_size.max(1), timeout }
    }

    /// Cancel every booking still `pending` after `max_age`. Returns how many
    /// this sweep expired; bookings that move on concurrently are skipped.
    pub async fn sweep(&self, max_age: Duration) -> Result<usize, ReaperError> {
        let age = chrono::Duration::from_std(max_age).map_err(|_| ReaperError::InvalidMaxAge(max_age))?;
        let now = self.clock.now();
        let cutoff = now.checked_sub_signed(age).ok_or(ReaperError::InvalidMaxAge(max_age))?;

        let mut expired = 0;
        loop {
            // 1. Next batch of stale pending bookings
            let batch = store_call(self.timeout, self.bookings.list_stale_pending(cutoff, self.batch_size)).await?;
            let batch_len = batch.len();

            // 2. Conditional pending -> cancelled
            let mut progressed = false;
            for booking in batch {
                let cancelled = store_call(
                    self.timeout,
                    self.bookings.transition(booking.id, BookingStatus::Pending, BookingStatus::Cancelled, now),
                )
                .await?;

                let Some(cancelled) = cancelled else {
                    continue;
                };
                progressed = true;
                expired += 1;
                info!("Expired stale booking {} created at {}", cancelled.id, cancelled.created_at);

                // 3. Release the hold on the renter's card, best effort
                if let Some(authorization_id) = cancelled.payment_authorization_id.as_deref() {
                    if let Err(e) = gateway_call(self.timeout, self.gateway.cancel(authorization_id)).await {
                        warn!(
                            "Could not cancel authorization {} for expired booking {}: {}",
                            authorization_id, cancelled.id, e
                        );
                    }
                }
            }

            // A short batch means the backlog is drained. A batch where every
            // CAS lost belongs to a concurrent sweep; stop rather than spin.
            if batch_len < self.batch_size || !progressed {
                break;
            }
        }

        if expired > 0 {
            info!("Sweep expired {} stale bookings older than {}", expired, cutoff);
        }
        Ok(expired)
    }
}
