use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::booking::VehicleSnapshot;

/// Read-only catalog view of a listed vehicle
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Vehicle {
    pub id: Uuid,
    pub host_id: String,
    pub price_per_day_cents: i64,
    pub currency: String,
    pub active: bool,
}

impl Vehicle {
    pub fn snapshot(&self) -> VehicleSnapshot {
        VehicleSnapshot {
            host_id: self.host_id.clone(),
            price_per_day_cents: self.price_per_day_cents,
            currency: self.currency.clone(),
        }
    }
}
