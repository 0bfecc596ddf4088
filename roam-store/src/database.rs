use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres};
use std::time::Duration;
use tracing::info;
use roam_core::StoreError;

#[derive(Clone)]
pub struct DbClient {
    pub pool: Pool<Postgres>,
}

impl DbClient {
    pub async fn new(connection_string: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(3))
            .connect(connection_string)
            .await?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<(), sqlx::migrate::MigrateError> {
        info!("Running database migrations...");
        sqlx::migrate!("../migrations")
            .run(&self.pool)
            .await?;
        info!("Migrations completed successfully.");
        Ok(())
    }
}

const OVERLAP_CONSTRAINT: &str = "bookings_no_overlap";
const IDEMPOTENCY_CONSTRAINT: &str = "bookings_renter_idempotency_key";

/// Translate a driver error into the store taxonomy. Constraint violations
/// carry domain meaning; everything else is treated as the store being
/// unreachable so callers can fail closed.
pub(crate) fn map_sqlx_error(err: sqlx::Error) -> StoreError {
    match &err {
        sqlx::Error::Database(db) => match db.constraint() {
            Some(OVERLAP_CONSTRAINT) => StoreError::Overlap,
            Some(IDEMPOTENCY_CONSTRAINT) => StoreError::DuplicateIdempotencyKey,
            _ => StoreError::Unavailable(err.to_string()),
        },
        sqlx::Error::PoolTimedOut => StoreError::Timeout,
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => StoreError::Corrupt(err.to_string()),
        _ => StoreError::Unavailable(err.to_string()),
    }
}
