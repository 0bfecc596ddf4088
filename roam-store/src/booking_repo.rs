use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::PgPool;
use uuid::Uuid;
use roam_core::{BookingStore, StoreError};
use roam_shared::{Booking, BookingStatus, DateRange, NewBooking, VehicleSnapshot};

use crate::database::map_sqlx_error;

const BOOKING_COLUMNS: &str = "id, vehicle_id, host_id, price_per_day_cents, currency, renter_id, \
    start_date, end_date, total_cents, status, idempotency_key, payment_authorization_id, \
    version, created_at, updated_at";

pub struct PgBookingStore {
    pool: PgPool,
}

impl PgBookingStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// Internal struct for type-safe querying
#[derive(sqlx::FromRow)]
struct BookingRow {
    id: Uuid,
    vehicle_id: Uuid,
    host_id: String,
    price_per_day_cents: i64,
    currency: String,
    renter_id: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    total_cents: i64,
    status: String,
    idempotency_key: String,
    payment_authorization_id: Option<String>,
    version: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<BookingRow> for Booking {
    type Error = StoreError;

    fn try_from(row: BookingRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<BookingStatus>().map_err(StoreError::Corrupt)?;
        Ok(Booking {
            id: row.id,
            vehicle_id: row.vehicle_id,
            vehicle: VehicleSnapshot {
                host_id: row.host_id,
                price_per_day_cents: row.price_per_day_cents,
                currency: row.currency,
            },
            renter_id: row.renter_id,
            start_date: row.start_date,
            end_date: row.end_date,
            total_cents: row.total_cents,
            status,
            idempotency_key: row.idempotency_key,
            payment_authorization_id: row.payment_authorization_id,
            version: row.version,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn into_bookings(rows: Vec<BookingRow>) -> Result<Vec<Booking>, StoreError> {
    rows.into_iter().map(Booking::try_from).collect()
}

#[async_trait]
impl BookingStore for PgBookingStore {
    async fn insert_pending(&self, booking: NewBooking) -> Result<Booking, StoreError> {
        let booking = booking.into_booking();

        // bookings_no_overlap rejects the row atomically if another blocking
        // booking on the vehicle overlaps, even under concurrent inserts.
        sqlx::query(
            r#"
            INSERT INTO bookings (id, vehicle_id, host_id, price_per_day_cents, currency, renter_id,
                start_date, end_date, total_cents, status, idempotency_key, version, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
            "#,
        )
        .bind(booking.id)
        .bind(booking.vehicle_id)
        .bind(&booking.vehicle.host_id)
        .bind(booking.vehicle.price_per_day_cents)
        .bind(&booking.vehicle.currency)
        .bind(&booking.renter_id)
        .bind(booking.start_date)
        .bind(booking.end_date)
        .bind(booking.total_cents)
        .bind(booking.status.as_str())
        .bind(&booking.idempotency_key)
        .bind(booking.version)
        .bind(booking.created_at)
        .bind(booking.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(booking)
    }

    async fn get(&self, id: Uuid) -> Result<Option<Booking>, StoreError> {
        let sql = format!("SELECT {} FROM bookings WHERE id = $1", BOOKING_COLUMNS);
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(Booking::try_from).transpose()
    }

    async fn find_by_idempotency_key(
        &self,
        renter_id: &str,
        idempotency_key: &str,
    ) -> Result<Option<Booking>, StoreError> {
        let sql = format!(
            "SELECT {} FROM bookings WHERE renter_id = $1 AND idempotency_key = $2",
            BOOKING_COLUMNS
        );
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(renter_id)
            .bind(idempotency_key)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(Booking::try_from).transpose()
    }

    async fn find_overlapping(
        &self,
        vehicle_id: Uuid,
        range: &DateRange,
        limit: usize,
    ) -> Result<Vec<Booking>, StoreError> {
        let sql = format!(
            r#"
            SELECT {} FROM bookings
            WHERE vehicle_id = $1
              AND start_date < $2
              AND end_date > $3
              AND status = ANY($4)
            ORDER BY start_date
            LIMIT $5
            "#,
            BOOKING_COLUMNS
        );
        let blocking: Vec<&str> = BookingStatus::blocking().iter().map(|s| s.as_str()).collect();
        let rows = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(vehicle_id)
            .bind(range.end)
            .bind(range.start)
            .bind(blocking)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        into_bookings(rows)
    }

    async fn attach_authorization(
        &self,
        id: Uuid,
        authorization_id: &str,
        at: DateTime<Utc>,
    ) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE bookings
            SET payment_authorization_id = $2, version = version + 1, updated_at = $3
            WHERE id = $1
              AND status = 'pending'
              AND (payment_authorization_id IS NULL OR payment_authorization_id = $2)
            "#,
        )
        .bind(id)
        .bind(authorization_id)
        .bind(at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() == 1)
    }

    async fn decline_unauthorized(&self, id: Uuid, at: DateTime<Utc>) -> Result<Option<Booking>, StoreError> {
        let sql = format!(
            r#"
            UPDATE bookings
            SET status = 'declined', version = version + 1, updated_at = $2
            WHERE id = $1 AND status = 'pending' AND payment_authorization_id IS NULL
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        );
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(id)
            .bind(at)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(Booking::try_from).transpose()
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

        // Compare-and-swap on status: only one writer can move a booking out of `from`.
        let sql = format!(
            r#"
            UPDATE bookings
            SET status = $3, version = version + 1, updated_at = $4
            WHERE id = $1 AND status = $2
            RETURNING {}
            "#,
            BOOKING_COLUMNS
        );
        let row = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(id)
            .bind(from.as_str())
            .bind(to.as_str())
            .bind(at)
            .fetch_optional(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        row.map(Booking::try_from).transpose()
    }

    async fn list_stale_pending(
        &self,
        cutoff: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Booking>, StoreError> {
        let sql = format!(
            r#"
            SELECT {} FROM bookings
            WHERE status = 'pending' AND created_at < $1
            ORDER BY created_at
            LIMIT $2
            "#,
            BOOKING_COLUMNS
        );
        let rows = sqlx::query_as::<_, BookingRow>(&sql)
            .bind(cutoff)
            .bind(limit as i64)
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_error)?;

        into_bookings(rows)
    }
}
