use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;
use roam_core::{BookingStore, StoreError};
use roam_shared::{Booking, DateRange};

use crate::store_call;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConflictCheckError {
    /// The store could not answer. Never to be read as "no conflict".
    #[error("Cannot determine availability: {0}")]
    Indeterminate(StoreError),
}

/// Decides whether a vehicle is already booked for a date range.
pub struct ConflictDetector {
    bookings: Arc<dyn BookingStore>,
    candidate_limit: usize,
    timeout: Duration,
}

impl ConflictDetector {
    pub fn new(bookings: Arc<dyn BookingStore>, candidate_limit: usize, timeout: Duration) -> Self {
        Self { bookings, candidate_limit: candidate_limit.max(1), timeout }
    }

    pub async fn has_conflict(&self, vehicle_id: Uuid, range: &DateRange) -> Result<bool, ConflictCheckError> {
        Ok(self.first_conflict(vehicle_id, range).await?.is_some())
    }

    /// First booking that blocks `range` on `vehicle_id`, if any.
    pub async fn first_conflict(
        &self,
        vehicle_id: Uuid,
        range: &DateRange,
    ) -> Result<Option<Booking>, ConflictCheckError> {
        let candidates = store_call(
            self.timeout,
            self.bookings.find_overlapping(vehicle_id, range, self.candidate_limit),
        )
        .await
        .map_err(|e| {
            warn!("Conflict check for vehicle {} failed closed: {}", vehicle_id, e);
            ConflictCheckError::Indeterminate(e)
        })?;

        // The store query already narrows to `start < range.end`; status and
        // the `end > range.start` bound are re-checked here.
        let conflict = candidates
            .into_iter()
            .filter(|b| b.status.blocks_calendar())
            .find(|b| b.start_date < range.end && b.end_date > range.start);

        if let Some(b) = &conflict {
            debug!(
                "Vehicle {} already booked {}..{} by booking {}",
                vehicle_id, b.start_date, b.end_date, b.id
            );
        }
        Ok(conflict)
    }
}
