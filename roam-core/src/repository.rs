use async_trait::async_trait;
use chrono::{DateTime, Utc};
use roam_shared::{Booking, BookingStatus, DateRange, NewBooking, Vehicle};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// The write would overlap another calendar-blocking booking.
    #[error("Booking overlaps an existing reservation")]
    Overlap,
    #[error("Idempotency key already used by this renter")]
    DuplicateIdempotencyKey,
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    #[error("Store call timed out")]
    Timeout,
    #[error("Invalid status transition from {from} to {to}")]
    InvalidTransition { from: BookingStatus, to: BookingStatus },
    #[error("Corrupt record: {0}")]
    Corrupt(String),
}

/// Repository trait for booking records.
///
/// Every status mutation is a compare-and-swap on the current status: the
/// orchestrator, the reconciliation handler and the reaper may race on the
/// same booking and none of them may overwrite another's decision.
#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Insert a `pending` booking. Fails with `Overlap` if a calendar-blocking
    /// booking for the same vehicle overlaps, checked inside the same atomic write.
    async fn insert_pending(&self, booking: NewBooking) -> Result<Booking, StoreError>;

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, StoreError>;

    async fn find_by_idempotency_key(
        &self,
        renter_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<Booking>, StoreError>;

    /// Calendar-blocking bookings on `vehicle_id` that start before
    /// `range.end` and end after `range.start`, at most `limit` rows.
    async fn find_overlapping(
        &self,
        vehicle_id: Uuid,
        range: &DateRange,
        limit: usize,
    ) -> Result<Vec<Booking>, StoreError>;

    /// Record the payment authorization id while the booking is still
    /// `pending`. Returns `false` if the booking left `pending` first.
    async fn attach_authorization(
        &self,
        id: Uuid,
        authorization_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError>;

    /// Move a `pending` booking to `declined`, but only while no payment
    /// authorization is recorded on it. Returns `None` otherwise.
    async fn decline_unauthorized(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<Booking>, StoreError>;

    /// Move `id` from `from` to `to`. Returns the updated booking, or `None`
    /// when the booking is missing or no longer in `from`. Edges outside the
    /// lifecycle graph fail with `InvalidTransition` without touching the record.
    async fn transition(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Booking>, StoreError>;

    /// `pending` bookings created before `cutoff`, oldest first.
    async fn list_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Booking>, StoreError>;
}

/// Repository trait for the vehicle catalog (owned by the listing side).
#[async_trait]
pub trait VehicleCatalog: Send + Sync {
    async fn get_vehicle(&self, id: Uuid) -> Result<Option<Vehicle>, StoreError>;
}

/// State of one rate window after recording a call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WindowSnapshot {
    /// Calls inside the window, including the one just recorded.
    pub count: u64,
    /// Oldest retained timestamp.
    pub oldest: DateTime<Utc>,
}

/// Durable backing store for sliding-window rate limiting.
#[async_trait]
pub trait RateWindowStore: Send + Sync {
    /// Atomically drop timestamps older than `now - window`, append `now`,
    /// persist, and report the resulting window. Two concurrent calls on
    /// the same key must each observe the other's append.
    async fn record(
        &self,
        key: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<WindowSnapshot, StoreError>;
}
