use serde::{Deserialize, Serialize};
use uuid::Uuid;
use chrono::{DateTime, NaiveDate, Utc};
use std::fmt;
use std::str::FromStr;

/// Booking status in the reservation lifecycle
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Completed,
    Cancelled,
    Declined,
}

impl BookingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Confirmed => "confirmed",
            BookingStatus::Completed => "completed",
            BookingStatus::Cancelled => "cancelled",
            BookingStatus::Declined => "declined",
        }
    }

    /// Allowed edges of the lifecycle graph.
    pub fn can_transition_to(&self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Confirmed)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
                | (BookingStatus::Pending, BookingStatus::Declined)
                | (BookingStatus::Confirmed, BookingStatus::Completed)
        )
    }

    /// Statuses that occupy the vehicle's calendar and take part in overlap checks.
    pub fn blocking() -> [BookingStatus; 3] {
        [BookingStatus::Pending, BookingStatus::Confirmed, BookingStatus::Completed]
    }

    /// Whether a booking in this status occupies the vehicle's calendar.
    pub fn blocks_calendar(&self) -> bool {
        Self::blocking().contains(self)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BookingStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(BookingStatus::Pending),
            "confirmed" => Ok(BookingStatus::Confirmed),
            "completed" => Ok(BookingStatus::Completed),
            "cancelled" => Ok(BookingStatus::Cancelled),
            "declined" => Ok(BookingStatus::Declined),
            other => Err(format!("unknown booking status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DateRangeError {
    #[error("end date {end} must be after start date {start}")]
    EndNotAfterStart { start: NaiveDate, end: NaiveDate },
}

/// A rental period in calendar days. `end` is the checkout day and is not
/// occupied, so `[10, 15)` and `[15, 18)` do not overlap.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DateRangeError> {
        if start >= end {
            return Err(DateRangeError::EndNotAfterStart { start, end });
        }
        Ok(Self { start, end })
    }

    /// Build a range from two instants, truncated to their UTC calendar dates.
    pub fn from_instants(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self, DateRangeError> {
        Self::new(start.date_naive(), end.date_naive())
    }

    pub fn overlaps(&self, other: &DateRange) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn days(&self) -> i64 {
        (self.end - self.start).num_days()
    }
}

/// Vehicle data copied onto the booking at reservation time.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct VehicleSnapshot {
    pub host_id: String,
    pub price_per_day_cents: i64,
    pub currency: String,
}

/// One reservation attempt for a vehicle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Booking {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub vehicle: VehicleSnapshot,
    pub renter_id: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_cents: i64,
    pub status: BookingStatus,
    pub idempotency_key: String,
    pub payment_authorization_id: Option<String>,
    pub version: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Booking {
    pub fn range(&self) -> DateRange {
        DateRange { start: self.start_date, end: self.end_date }
    }

    /// Overlap test used by conflict checks; non-blocking statuses never conflict.
    pub fn conflicts_with(&self, vehicle_id: Uuid, range: &DateRange) -> bool {
        self.vehicle_id == vehicle_id
            && self.status.blocks_calendar()
            && self.range().overlaps(range)
    }

    /// Apply a status change in place, bumping the version.
    pub fn update_status(&mut self, new_status: BookingStatus, at: DateTime<Utc>) {
        self.status = new_status;
        self.version += 1;
        self.updated_at = at;
    }
}

/// Insert payload for a pending booking. The store assigns nothing; the
/// caller generates the id so it can be embedded in the payment request.
#[derive(Debug, Clone)]
pub struct NewBooking {
    pub id: Uuid,
    pub vehicle_id: Uuid,
    pub vehicle: VehicleSnapshot,
    pub renter_id: String,
    pub range: DateRange,
    pub total_cents: i64,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

impl NewBooking {
    pub fn into_booking(self) -> Booking {
        Booking {
            id: self.id,
            vehicle_id: self.vehicle_id,
            vehicle: self.vehicle,
            renter_id: self.renter_id,
            start_date: self.range.start,
            end_date: self.range.end,
            total_cents: self.total_cents,
            status: BookingStatus::Pending,
            idempotency_key: self.idempotency_key,
            payment_authorization_id: None,
            version: 1,
            created_at: self.created_at,
            updated_at: self.created_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn test_status_transitions() {
        assert!(BookingStatus::Pending.can_transition_to(BookingStatus::Confirmed));
        assert!(BookingStatus::Pending.can_transition_to(BookingStatus::Cancelled));
        assert!(BookingStatus::Pending.can_transition_to(BookingStatus::Declined));
        assert!(BookingStatus::Confirmed.can_transition_to(BookingStatus::Completed));

        assert!(!BookingStatus::Confirmed.can_transition_to(BookingStatus::Cancelled));
        assert!(!BookingStatus::Cancelled.can_transition_to(BookingStatus::Confirmed));
        assert!(!BookingStatus::Declined.can_transition_to(BookingStatus::Pending));
        assert!(!BookingStatus::Completed.can_transition_to(BookingStatus::Confirmed));
    }

    #[test]
    fn test_only_released_statuses_free_the_calendar() {
        assert!(BookingStatus::Pending.blocks_calendar());
        assert!(BookingStatus::Completed.blocks_calendar());
        assert!(!BookingStatus::Cancelled.blocks_calendar());
        assert!(!BookingStatus::Declined.blocks_calendar());
        assert_eq!(BookingStatus::blocking().len(), 3);
    }

    #[test]
    fn test_status_round_trips_through_str() {
        for status in [
            BookingStatus::Pending,
            BookingStatus::Confirmed,
            BookingStatus::Completed,
            BookingStatus::Cancelled,
            BookingStatus::Declined,
        ] {
            assert_eq!(status.as_str().parse::<BookingStatus>().unwrap(), status);
        }
        assert!("expired".parse::<BookingStatus>().is_err());
    }

    #[test]
    fn test_date_range_rejects_empty_and_inverted() {
        assert!(DateRange::new(date("2024-07-10"), date("2024-07-10")).is_err());
        assert!(DateRange::new(date("2024-07-11"), date("2024-07-10")).is_err());
        assert_eq!(DateRange::new(date("2024-07-10"), date("2024-07-15")).unwrap().days(), 5);
    }

    #[test]
    fn test_checkout_day_is_free() {
        let first = DateRange::new(date("2024-07-10"), date("2024-07-15")).unwrap();
        let inside = DateRange::new(date("2024-07-12"), date("2024-07-14")).unwrap();
        let adjacent = DateRange::new(date("2024-07-15"), date("2024-07-18")).unwrap();
        let before = DateRange::new(date("2024-07-05"), date("2024-07-10")).unwrap();

        assert!(first.overlaps(&inside));
        assert!(inside.overlaps(&first));
        assert!(!first.overlaps(&adjacent));
        assert!(!adjacent.overlaps(&first));
        assert!(!first.overlaps(&before));
    }

    #[test]
    fn test_from_instants_truncates_to_calendar_date() {
        let start: DateTime<Utc> = "2024-07-10T23:30:00Z".parse().unwrap();
        let end: DateTime<Utc> = "2024-07-11T00:15:00Z".parse().unwrap();
        let range = DateRange::from_instants(start, end).unwrap();
        assert_eq!(range.days(), 1);

        let same_day: DateTime<Utc> = "2024-07-10T08:00:00Z".parse().unwrap();
        assert!(DateRange::from_instants(same_day, start).is_err());
    }

    #[test]
    fn test_cancelled_booking_does_not_conflict() {
        let vehicle_id = Uuid::new_v4();
        let range = DateRange::new(date("2024-07-10"), date("2024-07-15")).unwrap();
        let mut booking = NewBooking {
            id: Uuid::new_v4(),
            vehicle_id,
            vehicle: VehicleSnapshot {
                host_id: "host-1".to_string(),
                price_per_day_cents: 5000,
                currency: "USD".to_string(),
            },
            renter_id: "renter-1".to_string(),
            range,
            total_cents: 25_000,
            idempotency_key: "key-1".to_string(),
            created_at: Utc::now(),
        }
        .into_booking();

        assert!(booking.conflicts_with(vehicle_id, &range));
        assert!(!booking.conflicts_with(Uuid::new_v4(), &range));

        booking.update_status(BookingStatus::Cancelled, Utc::now());
        assert_eq!(booking.version, 2);
        assert!(!booking.conflicts_with(vehicle_id, &range));
    }
}
