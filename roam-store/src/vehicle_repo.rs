use async_trait::async_trait;
use sqlx::PgPool;
use uuid::Uuid;
use roam_core::{StoreError, VehicleCatalog};
use roam_shared::Vehicle;

use crate::database::map_sqlx_error;

pub struct PgVehicleCatalog {
    pool: PgPool,
}

impl PgVehicleCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct VehicleRow {
    id: Uuid,
    host_id: String,
    price_per_day_cents: i64,
    currency: String,
    active: bool,
}

impl From<VehicleRow> for Vehicle {
    fn from(row: VehicleRow) -> Self {
        Vehicle {
            id: row.id,
            host_id: row.host_id,
            price_per_day_cents: row.price_per_day_cents,
            currency: row.currency,
            active: row.active,
        }
    }
}

#[async_trait]
impl VehicleCatalog for PgVehicleCatalog {
    async fn get_vehicle(&self, id: Uuid) -> Result<Option<Vehicle>, StoreError> {
        let row = sqlx::query_as::<_, VehicleRow>(
            "SELECT id, host_id, price_per_day_cents, currency, active FROM vehicles WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(Vehicle::from))
    }
}
