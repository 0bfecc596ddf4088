//! In-process stores for local runs and tests.
//!
//! Each store serializes its read-modify-write sections behind one lock, which
//! gives the same atomicity the Postgres constraints and the Redis script
//! provide. They can be switched into an "unavailable" mode to exercise the
//! fail-open / fail-closed paths of their callers.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;
use roam_core::{BookingStore, RateWindowStore, StoreError, VehicleCatalog, WindowSnapshot};
use roam_shared::{Booking, BookingStatus, DateRange, NewBooking, Vehicle};

#[derive(Default)]
struct Outage(AtomicBool);

impl Outage {
    fn set(&self, down: bool) {
        self.0.store(down, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), StoreError> {
        if self.0.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("simulated outage".to_string()));
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct InMemoryBookingStore {
    bookings: RwLock<HashMap<Uuid, Booking>>,
    outage: Outage,
}

impl InMemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, down: bool) {
        self.outage.set(down);
    }

    /// Insert a booking as-is, bypassing the overlap check. Test fixtures only.
    pub async fn seed(&self, booking: Booking) {
        self.bookings.write().await.insert(booking.id, booking);
    }

    pub async fn all(&self) -> Vec<Booking> {
        self.bookings.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl BookingStore for InMemoryBookingStore {
    async fn insert_pending(&self, booking: NewBooking) -> Result<Booking, StoreError> {
        self.outage.check()?;
        let mut bookings = self.bookings.write().await;

        if bookings.values().any(|b| {
            b.renter_id == booking.renter_id && b.idempotency_key == booking.idempotency_key
        }) {
            return Err(StoreError::DuplicateIdempotencyKey);
        }
        if bookings.values().any(|b| b.conflicts_with(booking.vehicle_id, &booking.range)) {
            return Err(StoreError::Overlap);
        }

        let booking = booking.into_booking();
        bookings.insert(booking.id, booking.clone());
        Ok(booking)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        self.outage.check()?;
        Ok(self.bookings.read().await.get(&id).cloned())
    }

    async fn find_by_idempotency_key(
        &self,
        renter_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<Booking>, StoreError> {
        self.outage.check()?;
        let bookings = self.bookings.read().await;
        Ok(bookings
            .values()
            .find(|b| b.renter_id == renter_id && b.idempotency_key == idempotency_key)
            .cloned())
    }

    async fn find_overlapping(
        &self,
        vehicle_id: Uuid,
        range: &DateRange,
        limit: usize,
    ) -> Result<Vec<Booking>, StoreError> {
        self.outage.check()?;
        let bookings = self.bookings.read().await;
        let mut found: Vec<Booking> = bookings
            .values()
            .filter(|b| b.conflicts_with(vehicle_id, range))
            .cloned()
            .collect();
        found.sort_by_key(|b| b.start_date);
        found.truncate(limit);
        Ok(found)
    }

    async fn attach_authorization(
        &self,
        id: Uuid,
        authorization_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        self.outage.check()?;
        let mut bookings = self.bookings.write().await;
        match bookings.get_mut(&id) {
            Some(b) if b.status == BookingStatus::Pending => {
                match b.payment_authorization_id.as_deref() {
                    Some(existing) => Ok(existing == authorization_id),
                    None => {
                        b.payment_authorization_id = Some(authorization_id.to_string());
                        b.version += 1;
                        b.updated_at = at;
                        Ok(true)
                    }
                }
            }
            _ => Ok(false),
        }
    }

    async fn decline_unauthorized(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<Booking>, StoreError> {
        self.outage.check()?;
        let mut bookings = self.bookings.write().await;
        match bookings.get_mut(&id) {
            Some(b) if b.status == BookingStatus::Pending && b.payment_authorization_id.is_none() => {
                b.update_status(BookingStatus::Declined, at);
                Ok(Some(b.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn transition(
        &self,
        id: Uuid,
        from: BookingStatus,
        to: BookingStatus,
        at: DateTime<Utc>,
    ) -> Result<Option<Booking>, StoreError> {
        if !from.can_transition_to(to) {
            return Err(StoreError::InvalidTransition { from, to });
        }
        self.outage.check()?;
        let mut bookings = self.bookings.write().await;
        match bookings.get_mut(&id) {
            Some(b) if b.status == from => {
                b.update_status(to, at);
                Ok(Some(b.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn list_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Booking>, StoreError> {
        self.outage.check()?;
        let bookings = self.bookings.read().await;
        let mut stale: Vec<Booking> = bookings
            .values()
            .filter(|b| b.status == BookingStatus::Pending && b.created_at < cutoff)
            .cloned()
            .collect();
        stale.sort_by_key(|b| b.created_at);
        stale.truncate(limit);
        Ok(stale)
    }
}

#[derive(Default)]
pub struct InMemoryVehicleCatalog {
    vehicles: RwLock<HashMap<Uuid, Vehicle>>,
    outage: Outage,
}

impl InMemoryVehicleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, vehicle: Vehicle) {
        self.vehicles.write().await.insert(vehicle.id, vehicle);
    }

    pub fn set_unavailable(&self, down: bool) {
        self.outage.set(down);
    }
}

#[async_trait]
impl VehicleCatalog for InMemoryVehicleCatalog {
    async fn get_vehicle(&self, id: Uuid) -> Result<Option<Vehicle>, StoreError> {
        self.outage.check()?;
        Ok(self.vehicles.read().await.get(&id).cloned())
    }
}

/// Sliding-window log per key.
#[derive(Default)]
pub struct InMemoryRateWindowStore {
    windows: Mutex<HashMap<String, VecDeque<DateTime<Utc>>>>,
    outage: Outage,
}

impl InMemoryRateWindowStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_unavailable(&self, down: bool) {
        self.outage.set(down);
    }
}

#[async_trait]
impl RateWindowStore for InMemoryRateWindowStore {
    async fn record(
        &self,
        key: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<WindowSnapshot, StoreError> {
        self.outage.check()?;
        let window = chrono::Duration::from_std(window)
            .map_err(|_| StoreError::Corrupt("rate window too large".to_string()))?;
        let cutoff = now - window;

        let mut windows = self.windows.lock().await;
        let log = windows.entry(key.to_string()).or_default();
        while log.front().is_some_and(|ts| *ts <= cutoff) {
            log.pop_front();
        }
        log.push_back(now);

        // Timestamps are appended in arrival order, so the front is the oldest
        // unless a caller passes an earlier `now` than a previous call.
        let oldest = log.iter().min().copied().unwrap_or(now);
        Ok(WindowSnapshot { count: log.len() as u64, oldest })
    }
}
